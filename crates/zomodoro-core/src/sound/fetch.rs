//! Remote asset fetching.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use url::Url;

use super::FETCH_TIMEOUT;
use crate::error::LoadError;

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, LoadError>> + Send>>;

/// Source of remote sound assets.
///
/// The engine wraps every fetch in its own timeout and drops the future when
/// it fires, so implementations need not enforce one.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> FetchFuture;
}

/// HTTP(S) fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("zomodoro/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> FetchFuture {
        let request = self.client.get(url.clone());
        Box::pin(async move {
            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(LoadError::Status(status.as_u16()));
            }
            let bytes = resp.bytes().await?;
            Ok(bytes.to_vec())
        })
    }
}
