//! Ambient sound mixer.
//!
//! ## Track States
//!
//! ```text
//! Idle/Stopped --play--> FallbackPlaying --load ok--> FilePlaying
//!      |                      |                          |
//!      +--load--> Loading     +---------stop-------------+--> Stopped
//! ```
//!
//! A remote track that is not loaded yet starts on its generated fallback
//! right away and swaps to the decoded asset when (and if) the load
//! succeeds while the track is still playing. A failed load downgrades the
//! track to generated for the lifetime of the engine.
//!
//! Locks: the mixer lock is always taken before the backend lock and
//! neither is held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::backend::{AudioBackend, AudioDecoder, Connection, NodeId, Param, SharedBackend};
use super::buffer::AudioBuffer;
use super::catalog::{Catalog, SoundDescriptor, SoundGroup, SourceKind};
use super::fetch::AssetFetcher;
use super::generators::{FilterSpec, Texture, TextureSpec};
use super::{DECODE_TIMEOUT, FETCH_TIMEOUT};
use crate::error::{AudioError, LoadError, SoundError};

pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;

/// Spacing between the background loads started by [`SoundEngine::preload`].
pub const PRELOAD_STAGGER: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackState {
    Idle,
    Loading,
    FallbackPlaying,
    FilePlaying,
    Stopped,
}

impl TrackState {
    pub fn is_playing(self) -> bool {
        matches!(self, TrackState::FallbackPlaying | TrackState::FilePlaying)
    }
}

/// Result of [`SoundEngine::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// This call fetched and decoded the asset.
    Loaded,
    /// The asset was already decoded (possibly by a concurrent load).
    AlreadyLoaded,
    /// The track has no remote asset.
    NotRemote,
    /// The load failed; the track now plays its generated texture.
    FellBack(LoadError),
}

/// Per-track snapshot for display surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatus {
    pub name: String,
    pub group: SoundGroup,
    pub state: TrackState,
    pub playing: bool,
    pub loaded: bool,
    pub loading: bool,
    pub kind: SourceKind,
    pub volume: f32,
}

/// Live graph handles of one playing track.
#[derive(Debug, Clone, Default)]
struct Voice {
    source: Option<NodeId>,
    lfo: Option<NodeId>,
    modulation: Option<NodeId>,
    filter: Option<NodeId>,
    gain: Option<NodeId>,
}

struct Track {
    descriptor: SoundDescriptor,
    kind: SourceKind,
    state: TrackState,
    volume: f32,
    buffer: Option<AudioBuffer>,
    last_error: Option<LoadError>,
    voice: Option<Voice>,
}

impl Track {
    fn loaded(&self) -> bool {
        self.kind == SourceKind::Generated || self.buffer.is_some()
    }
}

struct Mixer {
    tracks: HashMap<String, Track>,
    order: Vec<String>,
    master: NodeId,
    master_volume: f32,
    seed: u64,
    textures: HashMap<Texture, AudioBuffer>,
    /// Names with an in-flight load. The receiver flips to `true` when it ends.
    preloading: HashMap<String, watch::Receiver<bool>>,
    background: Vec<JoinHandle<()>>,
}

struct Inner {
    mixer: Mutex<Mixer>,
    backend: SharedBackend,
    decoder: Arc<dyn AudioDecoder>,
    fetcher: Arc<dyn AssetFetcher>,
}

/// Multi-track ambient mixer over an [`AudioBackend`].
///
/// Operations that may start a background load must run inside a tokio
/// runtime; without one the track keeps playing its fallback.
pub struct SoundEngine {
    inner: Arc<Inner>,
}

enum VoiceSource {
    Buffer { buffer: AudioBuffer, filter: Option<FilterSpec> },
    Modulated(TextureSpec),
}

impl SoundEngine {
    /// Create the engine and its master bus.
    pub fn new(backend: SharedBackend, catalog: Catalog, fetcher: Arc<dyn AssetFetcher>) -> Result<Self, SoundError> {
        let (master, decoder) = {
            let mut b = lock(&backend);
            let master = b.create_gain(DEFAULT_MASTER_VOLUME)?;
            let destination = b.destination();
            b.connect(master, Connection::Node(destination))?;
            (master, b.decoder())
        };

        let mut tracks = HashMap::new();
        let mut order = Vec::new();
        for descriptor in catalog.iter().cloned() {
            order.push(descriptor.name.clone());
            tracks.insert(
                descriptor.name.clone(),
                Track {
                    kind: descriptor.kind(),
                    state: TrackState::Idle,
                    volume: descriptor.volume,
                    buffer: None,
                    last_error: None,
                    voice: None,
                    descriptor,
                },
            );
        }

        let mixer = Mixer {
            tracks,
            order,
            master,
            master_volume: DEFAULT_MASTER_VOLUME,
            seed: rand::random(),
            textures: HashMap::new(),
            preloading: HashMap::new(),
            background: Vec::new(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                mixer: Mutex::new(mixer),
                backend,
                decoder,
                fetcher,
            }),
        })
    }

    /// Fix the noise seed. Only affects textures not generated yet.
    pub fn with_seed(self, seed: u64) -> Self {
        self.inner.mixer().seed = seed;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_playing(&self, name: &str) -> bool {
        self.inner
            .mixer()
            .tracks
            .get(name)
            .is_some_and(|t| t.state.is_playing())
    }

    pub fn state(&self, name: &str) -> Option<TrackState> {
        self.inner.mixer().tracks.get(name).map(|t| t.state)
    }

    pub fn volume(&self, name: &str) -> Option<f32> {
        self.inner.mixer().tracks.get(name).map(|t| t.volume)
    }

    pub fn master_volume(&self) -> f32 {
        self.inner.mixer().master_volume
    }

    pub fn status(&self) -> Vec<TrackStatus> {
        let mixer = self.inner.mixer();
        mixer
            .order
            .iter()
            .filter_map(|name| mixer.tracks.get(name))
            .map(|t| TrackStatus {
                name: t.descriptor.name.clone(),
                group: t.descriptor.group,
                state: t.state,
                playing: t.state.is_playing(),
                loaded: t.loaded(),
                loading: mixer.preloading.contains_key(&t.descriptor.name),
                kind: t.kind,
                volume: t.volume,
            })
            .collect()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a track. No-op when it is already playing.
    pub fn play(&self, name: &str) -> Result<(), SoundError> {
        let needs_load = {
            let mut guard = self.inner.mixer();
            let mixer = &mut *guard;
            let track = mixer
                .tracks
                .get_mut(name)
                .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
            if track.state.is_playing() {
                return Ok(());
            }

            let prior = track.state;
            let mut backend = lock(&self.inner.backend);
            let source = match (&track.buffer, track.kind) {
                (Some(buffer), SourceKind::Remote) => {
                    track.state = TrackState::FilePlaying;
                    VoiceSource::Buffer {
                        buffer: buffer.clone(),
                        filter: None,
                    }
                }
                _ => {
                    track.state = TrackState::FallbackPlaying;
                    let texture = track.descriptor.fallback;
                    texture_source(&mut mixer.textures, mixer.seed, backend.sample_rate(), texture)
                }
            };
            let needs_load = track.kind == SourceKind::Remote && track.buffer.is_none();
            let volume = track.volume;

            let started = backend
                .resume()
                .and_then(|()| build_voice(&mut *backend, source, volume, mixer.master));
            match started {
                Ok(voice) => {
                    track.voice = Some(voice);
                    tracing::info!(sound = name, state = ?track.state, "playing");
                }
                Err(source) => {
                    track.state = prior;
                    return Err(SoundError::Graph {
                        name: name.to_string(),
                        source,
                    });
                }
            }
            needs_load
        };

        if needs_load {
            self.spawn_background(name.to_string(), Duration::ZERO, true);
        }
        Ok(())
    }

    /// Stop a track and release its graph. No-op when it is not playing.
    pub fn stop(&self, name: &str) -> Result<(), SoundError> {
        let mut mixer = self.inner.mixer();
        let track = mixer
            .tracks
            .get_mut(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
        if !track.state.is_playing() {
            return Ok(());
        }
        track.state = TrackState::Stopped;
        if let Some(voice) = track.voice.take() {
            release_voice(&mut *lock(&self.inner.backend), &voice, name);
        }
        tracing::info!(sound = name, "stopped");
        Ok(())
    }

    /// Set a track's volume, clamped to [0, 1], applied live.
    pub fn set_volume(&self, name: &str, level: f32) -> Result<(), SoundError> {
        let level = clamp_level(level);
        let mut mixer = self.inner.mixer();
        let track = mixer
            .tracks
            .get_mut(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
        track.volume = level;
        if let Some(gain) = track.voice.as_ref().and_then(|v| v.gain) {
            let mut backend = lock(&self.inner.backend);
            let now = backend.current_time();
            if let Err(e) = backend.set_param(gain, Param::Gain, level, now) {
                tracing::debug!(sound = name, error = %e, "could not apply volume");
            }
        }
        Ok(())
    }

    pub fn set_master_volume(&self, level: f32) {
        let level = clamp_level(level);
        let mut mixer = self.inner.mixer();
        mixer.master_volume = level;
        let mut backend = lock(&self.inner.backend);
        let now = backend.current_time();
        if let Err(e) = backend.set_param(mixer.master, Param::Gain, level, now) {
            tracing::debug!(error = %e, "could not apply master volume");
        }
    }

    /// Stop every playing track. In-flight loads keep running but will not
    /// swap anything in.
    pub fn stop_all(&self) {
        let playing: Vec<String> = {
            let mixer = self.inner.mixer();
            mixer
                .order
                .iter()
                .filter(|n| mixer.tracks.get(*n).is_some_and(|t| t.state.is_playing()))
                .cloned()
                .collect()
        };
        for name in playing {
            if let Err(e) = self.stop(&name) {
                tracing::debug!(sound = %name, error = %e, "stop_all");
            }
        }
    }

    /// Fetch and decode a remote track, or wait for the load already in
    /// flight for it. At most one fetch per track runs at a time.
    pub async fn load(&self, name: &str) -> Result<LoadOutcome, SoundError> {
        Inner::load(&self.inner, name).await
    }

    /// Load `names` in the background, staggered by [`PRELOAD_STAGGER`].
    pub fn preload(&self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if !self.inner.mixer().tracks.contains_key(name) {
                tracing::debug!(sound = %name, "skipping preload of unknown sound");
                continue;
            }
            self.spawn_background(name.clone(), PRELOAD_STAGGER * i as u32, false);
        }
    }

    /// Preload the cozy group.
    pub fn preload_defaults(&self) {
        let names: Vec<String> = {
            let mixer = self.inner.mixer();
            mixer
                .order
                .iter()
                .filter(|n| {
                    mixer
                        .tracks
                        .get(*n)
                        .is_some_and(|t| t.descriptor.group == SoundGroup::Cozy)
                })
                .cloned()
                .collect()
        };
        self.preload(&names);
    }

    /// Wait until every background load has finished.
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut self.inner.mixer().background);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::debug!(error = %e, "background load ended abnormally");
                }
            }
        }
    }

    fn spawn_background(&self, name: String, delay: Duration, swap: bool) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sound = %name, "no async runtime, keeping generated audio");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match Inner::load(&inner, &name).await {
                Ok(outcome) => {
                    tracing::debug!(sound = %name, ?outcome, "background load finished");
                    if swap {
                        inner.swap_in_file(&name);
                    }
                }
                Err(e) => tracing::debug!(sound = %name, error = %e, "background load"),
            }
        });
        let mut mixer = self.inner.mixer();
        mixer.background.retain(|h| !h.is_finished());
        mixer.background.push(handle);
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        let handles = std::mem::take(&mut self.inner.mixer().background);
        for handle in handles {
            handle.abort();
        }
        let mut mixer = self.inner.mixer();
        let mut backend = lock(&self.inner.backend);
        let names: Vec<String> = mixer.order.clone();
        for name in names {
            if let Some(track) = mixer.tracks.get_mut(&name) {
                if let Some(voice) = track.voice.take() {
                    release_voice(&mut *backend, &voice, &name);
                }
                track.state = TrackState::Stopped;
            }
        }
        let now = backend.current_time();
        let _ = backend.disconnect(mixer.master);
        let _ = backend.dispose_after(mixer.master, now);
    }
}

/// Removes the queue entry and wakes waiters when the load ends, however it
/// ends.
struct QueueSlot {
    inner: Arc<Inner>,
    name: String,
    done: watch::Sender<bool>,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.inner.mixer().preloading.remove(&self.name);
        let _ = self.done.send(true);
    }
}

enum Claim {
    Done(LoadOutcome),
    Wait(watch::Receiver<bool>),
    Fetch(Url, QueueSlot),
}

impl Inner {
    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(inner: &Arc<Inner>, name: &str) -> Result<LoadOutcome, SoundError> {
        match inner.claim(name)? {
            Claim::Done(outcome) => Ok(outcome),
            Claim::Wait(mut rx) => {
                // An Err means the loader went away; its slot already cleaned up.
                let _ = rx.wait_for(|done| *done).await;
                inner.settled_outcome(name)
            }
            Claim::Fetch(url, slot) => {
                tracing::info!(sound = name, %url, "loading");
                let result = inner.fetch_and_decode(&url).await;
                let outcome = inner.commit(name, result);
                drop(slot);
                Ok(outcome)
            }
        }
    }

    fn claim(self: &Arc<Self>, name: &str) -> Result<Claim, SoundError> {
        let mut mixer = self.mixer();
        let mixer = &mut *mixer;
        let track = mixer
            .tracks
            .get(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
        if track.buffer.is_some() {
            return Ok(Claim::Done(LoadOutcome::AlreadyLoaded));
        }
        if let Some(rx) = mixer.preloading.get(name) {
            return Ok(Claim::Wait(rx.clone()));
        }
        let url = match (track.kind, &track.descriptor.remote) {
            (SourceKind::Remote, Some(url)) => url.clone(),
            _ => return Ok(Claim::Done(generated_outcome(track))),
        };

        let (tx, rx) = watch::channel(false);
        mixer.preloading.insert(name.to_string(), rx);
        if let Some(track) = mixer.tracks.get_mut(name) {
            if track.state == TrackState::Idle {
                track.state = TrackState::Loading;
            }
        }
        Ok(Claim::Fetch(
            url,
            QueueSlot {
                inner: Arc::clone(self),
                name: name.to_string(),
                done: tx,
            },
        ))
    }

    fn settled_outcome(&self, name: &str) -> Result<LoadOutcome, SoundError> {
        let mixer = self.mixer();
        let track = mixer
            .tracks
            .get(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;
        Ok(if track.buffer.is_some() {
            LoadOutcome::AlreadyLoaded
        } else {
            generated_outcome(track)
        })
    }

    async fn fetch_and_decode(&self, url: &Url) -> Result<AudioBuffer, LoadError> {
        let bytes = tokio::time::timeout(FETCH_TIMEOUT, self.fetcher.fetch(url))
            .await
            .map_err(|_| LoadError::FetchTimeout {
                timeout_secs: FETCH_TIMEOUT.as_secs(),
            })??;

        let decoder = Arc::clone(&self.decoder);
        let decoding = tokio::task::spawn_blocking(move || decoder.decode(&bytes));
        match tokio::time::timeout(DECODE_TIMEOUT, decoding).await {
            Err(_) => Err(LoadError::DecodeTimeout {
                timeout_secs: DECODE_TIMEOUT.as_secs(),
            }),
            Ok(Err(join)) => Err(LoadError::Task(join.to_string())),
            Ok(Ok(decoded)) => {
                let buffer = decoded?;
                // An empty asset would replace the audible fallback with silence.
                if buffer.is_empty() {
                    return Err(AudioError::Decode("asset has no audio frames".into()).into());
                }
                Ok(buffer)
            }
        }
    }

    fn commit(&self, name: &str, result: Result<AudioBuffer, LoadError>) -> LoadOutcome {
        let mut mixer = self.mixer();
        let Some(track) = mixer.tracks.get_mut(name) else {
            return LoadOutcome::NotRemote;
        };
        if track.state == TrackState::Loading {
            track.state = TrackState::Idle;
        }
        match result {
            Ok(buffer) => {
                tracing::info!(sound = name, secs = buffer.duration_secs(), "loaded");
                track.buffer = Some(buffer);
                LoadOutcome::Loaded
            }
            Err(e) => {
                tracing::warn!(sound = name, error = %e, "load failed, using generated audio");
                track.kind = SourceKind::Generated;
                track.last_error = Some(e.clone());
                LoadOutcome::FellBack(e)
            }
        }
    }

    /// Replace a playing fallback with the decoded asset, in the same slot.
    fn swap_in_file(&self, name: &str) {
        let mut guard = self.mixer();
        let mixer = &mut *guard;
        let Some(track) = mixer.tracks.get_mut(name) else {
            return;
        };
        let Some(buffer) = track.buffer.clone() else {
            return;
        };
        if track.state != TrackState::FallbackPlaying {
            return;
        }

        let mut backend = lock(&self.backend);
        if let Some(voice) = track.voice.take() {
            release_voice(&mut *backend, &voice, name);
        }
        let file = VoiceSource::Buffer { buffer, filter: None };
        match build_voice(&mut *backend, file, track.volume, mixer.master) {
            Ok(voice) => {
                track.voice = Some(voice);
                track.state = TrackState::FilePlaying;
                tracing::info!(sound = name, "switched to loaded asset");
            }
            Err(e) => {
                tracing::warn!(sound = name, error = %e, "could not start loaded asset, restarting fallback");
                let rate = backend.sample_rate();
                let source = texture_source(&mut mixer.textures, mixer.seed, rate, track.descriptor.fallback);
                match build_voice(&mut *backend, source, track.volume, mixer.master) {
                    Ok(voice) => track.voice = Some(voice),
                    Err(e) => {
                        tracing::warn!(sound = name, error = %e, "fallback restart failed");
                        track.state = TrackState::Stopped;
                    }
                }
            }
        }
    }
}

fn generated_outcome(track: &Track) -> LoadOutcome {
    match &track.last_error {
        Some(e) => LoadOutcome::FellBack(e.clone()),
        None => LoadOutcome::NotRemote,
    }
}

/// Clamp to [0, 1]; NaN becomes silence.
pub(super) fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

pub(super) fn lock(backend: &SharedBackend) -> MutexGuard<'_, dyn AudioBackend + 'static> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Graph recipe for a texture, rendering and caching its buffer on first use.
fn texture_source(
    cache: &mut HashMap<Texture, AudioBuffer>,
    seed: u64,
    sample_rate: u32,
    texture: Texture,
) -> VoiceSource {
    let spec = texture.spec();
    let filter = match &spec {
        TextureSpec::Buffer { filter, .. } => *filter,
        TextureSpec::Modulated { .. } => return VoiceSource::Modulated(spec),
    };
    let buffer = cache
        .entry(texture)
        .or_insert_with(|| {
            let mut rng = Pcg32::seed_from_u64(seed ^ texture as u64);
            let samples = texture.render(sample_rate, &mut rng).unwrap_or_default();
            AudioBuffer::new(samples, sample_rate)
        })
        .clone();
    VoiceSource::Buffer { buffer, filter }
}

/// Build and start the graph for one track. Partially built graphs are
/// released before the error is returned.
fn build_voice(backend: &mut dyn AudioBackend, source: VoiceSource, volume: f32, master: NodeId) -> Result<Voice, AudioError> {
    let mut voice = Voice::default();
    match wire_voice(backend, &mut voice, source, volume, master) {
        Ok(()) => Ok(voice),
        Err(e) => {
            release_voice(backend, &voice, "partial graph");
            Err(e)
        }
    }
}

fn wire_voice(
    backend: &mut dyn AudioBackend,
    voice: &mut Voice,
    source: VoiceSource,
    volume: f32,
    master: NodeId,
) -> Result<(), AudioError> {
    let now = backend.current_time();
    let gain = backend.create_gain(volume)?;
    voice.gain = Some(gain);
    backend.set_param(gain, Param::Gain, volume, now)?;
    backend.connect(gain, Connection::Node(master))?;

    match source {
        VoiceSource::Buffer { buffer, filter } => {
            let src = backend.create_buffer_source(buffer, true)?;
            voice.source = Some(src);
            match filter {
                Some(f) => {
                    let filter = backend.create_filter(f.kind, f.frequency, f.q)?;
                    voice.filter = Some(filter);
                    backend.connect(src, Connection::Node(filter))?;
                    backend.connect(filter, Connection::Node(gain))?;
                }
                None => backend.connect(src, Connection::Node(gain))?,
            }
            backend.start(src, now)?;
        }
        VoiceSource::Modulated(TextureSpec::Modulated {
            carrier,
            frequency,
            lfo,
            lfo_frequency,
            depth,
        }) => {
            let osc = backend.create_oscillator(carrier, frequency)?;
            voice.source = Some(osc);
            let lfo = backend.create_oscillator(lfo, lfo_frequency)?;
            voice.lfo = Some(lfo);
            let modulation = backend.create_gain(depth)?;
            voice.modulation = Some(modulation);
            backend.connect(lfo, Connection::Node(modulation))?;
            backend.connect(modulation, Connection::Param(osc, Param::Frequency))?;
            backend.connect(osc, Connection::Node(gain))?;
            backend.start(osc, now)?;
            backend.start(lfo, now)?;
        }
        VoiceSource::Modulated(TextureSpec::Buffer { .. }) => {
            return Err(AudioError::Backend("buffer texture routed as oscillator".into()));
        }
    }
    Ok(())
}

/// Stop, disconnect and free every node of `voice`. Each step is attempted
/// independently; failures are logged and the rest still runs.
fn release_voice(backend: &mut dyn AudioBackend, voice: &Voice, name: &str) {
    let now = backend.current_time();
    for source in [voice.source, voice.lfo].into_iter().flatten() {
        if let Err(e) = backend.stop(source, now) {
            tracing::debug!(sound = name, node = %source, error = %e, "stop during cleanup");
        }
    }
    let all = [voice.source, voice.lfo, voice.modulation, voice.filter, voice.gain];
    for node in all.into_iter().flatten() {
        if let Err(e) = backend.disconnect(node) {
            tracing::debug!(sound = name, node = %node, error = %e, "disconnect during cleanup");
        }
        if let Err(e) = backend.dispose_after(node, now) {
            tracing::debug!(sound = name, node = %node, error = %e, "dispose during cleanup");
        }
    }
}
