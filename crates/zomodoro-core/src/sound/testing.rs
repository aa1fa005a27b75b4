//! Recording backend and scripted fetchers for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use super::backend::{AudioBackend, AudioDecoder, Connection, FilterKind, NodeId, Param, SharedBackend, Waveform};
use super::buffer::{AudioBuffer, WavDecoder};
use super::fetch::{AssetFetcher, FetchFuture};
use crate::error::{AudioError, LoadError};

#[derive(Debug, Clone, PartialEq)]
pub enum MockKind {
    Destination,
    BufferSource { looped: bool, len: usize },
    Oscillator { waveform: Waveform, frequency: f32 },
    Gain,
    Filter { kind: FilterKind, frequency: f32, q: f32 },
}

impl MockKind {
    pub fn is_source(&self) -> bool {
        matches!(self, MockKind::BufferSource { .. } | MockKind::Oscillator { .. })
    }
}

#[derive(Debug, Clone)]
pub struct MockNode {
    pub kind: MockKind,
    pub started: bool,
    pub stopped: bool,
    pub disposed: bool,
    pub outputs: Vec<Connection>,
    pub gain: f32,
    pub ramps: Vec<(Param, f32, f64)>,
}

#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub create_buffer_source: bool,
    pub stop: bool,
    pub disconnect: bool,
}

pub struct MockBackend {
    nodes: BTreeMap<NodeId, MockNode>,
    next_id: u64,
    pub time: f64,
    pub fail: Failures,
    decoder: Arc<dyn AudioDecoder>,
}

impl MockBackend {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId(0), MockNode::new(MockKind::Destination));
        Self {
            nodes,
            next_id: 1,
            time: 0.0,
            fail: Failures::default(),
            decoder: Arc::new(WavDecoder),
        }
    }

    pub fn with_decoder(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            decoder,
            ..Self::new()
        }
    }

    /// Concrete handle for assertions plus the trait-object handle for the
    /// code under test.
    pub fn shared(self) -> (Arc<Mutex<MockBackend>>, SharedBackend) {
        let concrete = Arc::new(Mutex::new(self));
        let shared: SharedBackend = concrete.clone();
        (concrete, shared)
    }

    pub fn node(&self, id: NodeId) -> Option<&MockNode> {
        self.nodes.get(&id)
    }

    /// Sources started, not stopped and not disposed.
    pub fn live_sources(&self) -> Vec<(NodeId, &MockNode)> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.kind.is_source() && n.started && !n.stopped && !n.disposed)
            .map(|(id, n)| (*id, n))
            .collect()
    }

    pub fn live_kinds(&self) -> Vec<MockKind> {
        self.live_sources().into_iter().map(|(_, n)| n.kind.clone()).collect()
    }

    pub fn disposed_count(&self) -> usize {
        self.nodes.values().filter(|n| n.disposed).count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &MockNode)> {
        self.nodes.iter()
    }

    fn add(&mut self, kind: MockKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, MockNode::new(kind));
        id
    }

    fn live(&mut self, id: NodeId) -> Result<&mut MockNode, AudioError> {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.disposed => Ok(node),
            _ => Err(AudioError::UnknownNode(id)),
        }
    }
}

impl MockNode {
    fn new(kind: MockKind) -> Self {
        Self {
            kind,
            started: false,
            stopped: false,
            disposed: false,
            outputs: Vec::new(),
            gain: 1.0,
            ramps: Vec::new(),
        }
    }
}

impl AudioBackend for MockBackend {
    fn sample_rate(&self) -> u32 {
        8_000
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn destination(&self) -> NodeId {
        NodeId(0)
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn create_buffer_source(&mut self, buffer: AudioBuffer, looped: bool) -> Result<NodeId, AudioError> {
        if self.fail.create_buffer_source {
            return Err(AudioError::Backend("buffer sources disabled".into()));
        }
        Ok(self.add(MockKind::BufferSource {
            looped,
            len: buffer.len(),
        }))
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> Result<NodeId, AudioError> {
        Ok(self.add(MockKind::Oscillator { waveform, frequency }))
    }

    fn create_gain(&mut self, gain: f32) -> Result<NodeId, AudioError> {
        let id = self.add(MockKind::Gain);
        self.live(id)?.gain = gain;
        Ok(id)
    }

    fn create_filter(&mut self, kind: FilterKind, frequency: f32, q: f32) -> Result<NodeId, AudioError> {
        Ok(self.add(MockKind::Filter { kind, frequency, q }))
    }

    fn connect(&mut self, from: NodeId, to: Connection) -> Result<(), AudioError> {
        let target = match to {
            Connection::Node(id) | Connection::Param(id, _) => id,
        };
        self.live(target)?;
        self.live(from)?.outputs.push(to);
        Ok(())
    }

    fn set_param(&mut self, node: NodeId, param: Param, value: f32, _at: f64) -> Result<(), AudioError> {
        let node = self.live(node)?;
        if param == Param::Gain {
            node.gain = value;
        }
        Ok(())
    }

    fn exponential_ramp(&mut self, node: NodeId, param: Param, value: f32, end: f64) -> Result<(), AudioError> {
        self.live(node)?.ramps.push((param, value, end));
        Ok(())
    }

    fn start(&mut self, node: NodeId, _at: f64) -> Result<(), AudioError> {
        let n = self.live(node)?;
        if !n.kind.is_source() || n.started {
            return Err(AudioError::InvalidNode(node));
        }
        n.started = true;
        Ok(())
    }

    fn stop(&mut self, node: NodeId, _at: f64) -> Result<(), AudioError> {
        let fail = self.fail.stop;
        let n = self.live(node)?;
        if fail {
            return Err(AudioError::Backend("stop failed".into()));
        }
        if !n.started || n.stopped {
            return Err(AudioError::AlreadyStopped(node));
        }
        n.stopped = true;
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), AudioError> {
        let fail = self.fail.disconnect;
        let n = self.live(node)?;
        if fail {
            return Err(AudioError::Backend("disconnect failed".into()));
        }
        n.outputs.clear();
        Ok(())
    }

    fn dispose_after(&mut self, node: NodeId, _at: f64) -> Result<(), AudioError> {
        self.live(node)?.disposed = true;
        Ok(())
    }

    fn decoder(&self) -> Arc<dyn AudioDecoder> {
        Arc::clone(&self.decoder)
    }
}

/// Decoder that blocks for a fixed time before delegating to WAV.
pub struct SlowDecoder(pub Duration);

impl AudioDecoder for SlowDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        std::thread::sleep(self.0);
        WavDecoder.decode(bytes)
    }
}

/// How a [`ScriptedFetcher`] answers.
#[derive(Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Fail(LoadError),
    /// Never resolves.
    Hang,
}

/// Fetcher with a canned reply and a call counter.
pub struct ScriptedFetcher {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(reply: Reply, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for ScriptedFetcher {
    fn fetch(&self, _url: &Url) -> FetchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Reply::Bytes(bytes) => Ok(bytes),
                Reply::Fail(err) => Err(err),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}
