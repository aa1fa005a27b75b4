//! Audio graph capability used by the sound engine and cue player.
//!
//! The interface mirrors a browser-style audio graph: nodes are created,
//! wired together, started and stopped against the backend's own clock.
//! [`SoftwareBackend`](super::SoftwareBackend) renders such a graph in pure
//! Rust; tests use a recording mock.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::buffer::AudioBuffer;
use crate::error::AudioError;

/// Backend shared between the sound engine, the cue player and whoever
/// pulls samples out of it.
pub type SharedBackend = Arc<Mutex<dyn AudioBackend>>;

/// Handle to a node inside one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
}

/// Automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Gain node level.
    Gain,
    /// Oscillator or filter frequency in Hz.
    Frequency,
}

/// Target of a connection: another node's input, or one of its parameters
/// (modulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Node(NodeId),
    Param(NodeId, Param),
}

/// Turns encoded asset bytes into a buffer. Shared so decoding can run on a
/// blocking thread without holding the backend lock.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioError>;
}

/// Node-graph audio capability.
///
/// Times are in seconds on the backend clock ([`current_time`]).
/// Stopping a node that was never started or is already stopped returns
/// [`AudioError::AlreadyStopped`]; using a disposed or unknown node returns
/// [`AudioError::UnknownNode`].
///
/// [`current_time`]: AudioBackend::current_time
pub trait AudioBackend: Send {
    fn sample_rate(&self) -> u32;

    fn current_time(&self) -> f64;

    /// Final output node.
    fn destination(&self) -> NodeId;

    /// Resume a suspended output. No-op when already running.
    fn resume(&mut self) -> Result<(), AudioError>;

    fn create_buffer_source(&mut self, buffer: AudioBuffer, looped: bool) -> Result<NodeId, AudioError>;

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> Result<NodeId, AudioError>;

    fn create_gain(&mut self, gain: f32) -> Result<NodeId, AudioError>;

    fn create_filter(&mut self, kind: FilterKind, frequency: f32, q: f32) -> Result<NodeId, AudioError>;

    fn connect(&mut self, from: NodeId, to: Connection) -> Result<(), AudioError>;

    /// Set `param` to `value` at time `at`.
    fn set_param(&mut self, node: NodeId, param: Param, value: f32, at: f64) -> Result<(), AudioError>;

    /// Ramp `param` exponentially from its last scheduled value to `value`,
    /// arriving at `end`.
    fn exponential_ramp(&mut self, node: NodeId, param: Param, value: f32, end: f64) -> Result<(), AudioError>;

    /// Start a source node at `at`.
    fn start(&mut self, node: NodeId, at: f64) -> Result<(), AudioError>;

    /// Stop a source node at `at`.
    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), AudioError>;

    /// Remove every outgoing connection of `node`.
    fn disconnect(&mut self, node: NodeId) -> Result<(), AudioError>;

    /// Free `node` once the clock has passed `at`.
    fn dispose_after(&mut self, node: NodeId, at: f64) -> Result<(), AudioError>;

    fn decoder(&self) -> Arc<dyn AudioDecoder>;
}
