pub mod config;
pub mod sounds;
pub mod stats;
pub mod task;
pub mod timer;

use std::error::Error;
use std::sync::{Arc, Mutex};

use zomodoro_core::sound::DEFAULT_SAMPLE_RATE;
use zomodoro_core::storage::data_dir;
use zomodoro_core::{App, Catalog, Database, Event, HttpFetcher, SoftwareBackend, SystemClock};

pub type CliResult = Result<(), Box<dyn Error>>;

/// Application context plus the renderer its audio goes to.
pub struct Session {
    pub app: App,
    pub backend: Arc<Mutex<SoftwareBackend>>,
}

/// Open the app on the data directory database.
///
/// Must be called inside the tokio runtime.
pub fn open() -> Result<Session, Box<dyn Error>> {
    open_with_rate(DEFAULT_SAMPLE_RATE)
}

pub fn open_with_rate(sample_rate: u32) -> Result<Session, Box<dyn Error>> {
    let dir = data_dir()?;
    let catalog = Catalog::load(&dir)?;
    let backend = Arc::new(Mutex::new(SoftwareBackend::new(sample_rate)));
    let app = App::new(
        Box::new(Database::open()?),
        backend.clone(),
        catalog,
        Arc::new(HttpFetcher::new()?),
        Arc::new(SystemClock),
    )?;
    Ok(Session { app, backend })
}

#[cfg(not(feature = "audio-output"))]
pub const NO_AUDIO: &str = "audio output is not available; rebuild zomodoro-cli with --features audio-output";

/// Open a session whose renderer feeds the default output device.
#[cfg(feature = "audio-output")]
pub fn open_audible() -> Result<(Session, crate::audio_out::AudioOutput), Box<dyn Error>> {
    let rate = crate::audio_out::device_sample_rate()?;
    let session = open_with_rate(rate)?;
    let output = crate::audio_out::AudioOutput::start(session.backend.clone())?;
    Ok((session, output))
}

/// One event per line as JSON.
pub fn print_events(events: &[Event]) -> CliResult {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

/// Notifications go to stderr for humans; everything is still printed as
/// JSON on stdout.
pub fn announce(events: &[Event]) {
    for event in events {
        if let Event::Notification { title, message, .. } = event {
            eprintln!("{title} {message}");
        }
    }
}

pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
