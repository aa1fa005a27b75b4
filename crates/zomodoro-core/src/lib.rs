//! # Zomodoro Core Library
//!
//! Core logic for the Zomodoro focus timer: a Pomodoro session timer, an
//! ambient sound mixer with procedural noise generators, and the task,
//! statistics and achievement bookkeeping around them. The CLI binary is a
//! thin presentation layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer**: [`SessionTimer`] is a synchronous state machine anchored to
//!   the wall clock; [`TimerDriver`] runs its once-per-second ticker and the
//!   delayed auto-start of the next mode on tokio.
//! - **Sound**: [`SoundEngine`] mixes looping ambient tracks through a master
//!   bus on any [`AudioBackend`], loading remote assets with timeouts and
//!   falling back to generated noise. [`SoftwareBackend`] renders the graph
//!   in pure Rust.
//! - **Storage**: the whole application state is one JSON record in a
//!   [`BlobStore`] (SQLite key-value table or memory).
//! - **App**: [`App`] ties it together and reacts to timer events.
//!
//! ## Key Components
//!
//! - [`App`]: application context
//! - [`SessionTimer`] / [`TimerDriver`]: focus and break countdowns
//! - [`SoundEngine`] / [`CuePlayer`]: ambient tracks and cue tones
//! - [`Database`]: persistent key-value store

pub mod app;
pub mod error;
pub mod events;
pub mod sound;
pub mod stats;
pub mod storage;
pub mod task;
pub mod timer;

pub use app::App;
pub use error::{AudioError, ConfigError, CoreError, DatabaseError, LoadError, SoundError, ValidationError};
pub use events::Event;
pub use sound::{AudioBackend, Catalog, Cue, CuePlayer, HttpFetcher, SoftwareBackend, SoundEngine, Texture};
pub use stats::{Achievement, AchievementBook, Statistics};
pub use storage::{AppData, BlobStore, Database, MemoryStore, Settings};
pub use task::{Task, TaskList};
pub use timer::{SessionTimer, SystemClock, TimerDriver, TimerMode, TimerState};
