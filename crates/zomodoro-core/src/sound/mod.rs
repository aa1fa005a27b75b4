//! Ambient sound mixer, notification cues and the audio graph they run on.

use std::time::Duration;

mod backend;
pub(crate) mod buffer;
mod catalog;
mod cue;
mod engine;
mod fetch;
mod generators;
mod software;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AudioBackend, AudioDecoder, Connection, FilterKind, NodeId, Param, SharedBackend, Waveform};
pub use buffer::{AssetDecoder, AudioBuffer, SymphoniaDecoder, WavDecoder};
pub use catalog::{Catalog, SoundDescriptor, SoundGroup, SourceKind, CATALOG_FILE, DEFAULT_TRACK_VOLUME};
pub use cue::{Cue, CuePlayer, Note};
pub use engine::{LoadOutcome, SoundEngine, TrackState, TrackStatus, DEFAULT_MASTER_VOLUME, PRELOAD_STAGGER};
pub use fetch::{AssetFetcher, FetchFuture, HttpFetcher};
pub use generators::{FilterSpec, Texture, TextureSpec};
pub use software::{SoftwareBackend, DEFAULT_SAMPLE_RATE};

/// Upper bound on fetching one remote asset.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on decoding one fetched asset.
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(3);
