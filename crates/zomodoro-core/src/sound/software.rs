//! Pure-Rust audio graph renderer.
//!
//! Renders mono `f32` samples by pulling the graph once per frame in
//! topological order. Buffer sources, oscillators (with frequency
//! modulation inputs), gains (with set/exponential-ramp automation) and
//! RBJ biquad filters are supported. The clock only advances while
//! rendering.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;
use std::sync::Arc;

use super::backend::{AudioBackend, AudioDecoder, Connection, FilterKind, NodeId, Param, Waveform};
use super::buffer::{AssetDecoder, AudioBuffer};
use crate::error::AudioError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const DESTINATION: NodeId = NodeId(0);

pub struct SoftwareBackend {
    sample_rate: u32,
    frame: u64,
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

struct Node {
    kind: NodeKind,
    outputs: Vec<Connection>,
    dispose_at: Option<f64>,
}

enum NodeKind {
    Destination,
    Buffer {
        buffer: AudioBuffer,
        looped: bool,
        position: f64,
        playback: Playback,
    },
    Oscillator {
        waveform: Waveform,
        frequency: Automation,
        phase: f64,
        playback: Playback,
    },
    Gain {
        gain: Automation,
    },
    Filter {
        kind: FilterKind,
        frequency: Automation,
        q: f32,
        biquad: Biquad,
    },
}

#[derive(Default, Clone, Copy)]
struct Playback {
    start: Option<f64>,
    stop: Option<f64>,
}

impl Playback {
    fn active(&self, t: f64) -> bool {
        match self.start {
            Some(start) => t >= start && self.stop.map_or(true, |stop| t < stop),
            None => false,
        }
    }
}

#[derive(Clone, Copy)]
enum AutomationEvent {
    Set { value: f32, at: f64 },
    Ramp { value: f32, end: f64 },
}

impl AutomationEvent {
    fn time(&self) -> f64 {
        match *self {
            AutomationEvent::Set { at, .. } => at,
            AutomationEvent::Ramp { end, .. } => end,
        }
    }
}

/// Parameter value over time.
struct Automation {
    initial: f32,
    events: Vec<AutomationEvent>,
}

impl Automation {
    fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    fn push(&mut self, event: AutomationEvent) {
        self.events.push(event);
        self.events.sort_by(|a, b| a.time().total_cmp(&b.time()));
    }

    fn value_at(&self, t: f64) -> f32 {
        let mut value = self.initial;
        let mut since = 0.0;
        for event in &self.events {
            match *event {
                AutomationEvent::Set { value: v, at } => {
                    if t < at {
                        return value;
                    }
                    value = v;
                    since = at;
                }
                AutomationEvent::Ramp { value: target, end } => {
                    if t >= end {
                        value = target;
                        since = end;
                        continue;
                    }
                    let span = end - since;
                    // Exponential ramps are undefined through zero or across signs.
                    if span <= 0.0 || value == 0.0 || target == 0.0 || (value < 0.0) != (target < 0.0) {
                        return value;
                    }
                    let progress = ((t - since) / span).clamp(0.0, 1.0);
                    return value * (target / value).powf(progress as f32);
                }
            }
        }
        value
    }
}

#[derive(Default, Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    tuned_for: f32,
}

impl Biquad {
    /// RBJ cookbook coefficients.
    fn tune(&mut self, kind: FilterKind, frequency: f32, q: f32, sample_rate: u32) {
        let nyquist = sample_rate as f32 / 2.0;
        let f = frequency.clamp(1.0, nyquist * 0.999);
        let w0 = std::f32::consts::TAU * f / sample_rate as f32;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(0.0001));
        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
            FilterKind::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos / a0;
        self.a2 = (1.0 - alpha) / a0;
        self.tuned_for = frequency;
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

fn waveform_sample(waveform: Waveform, phase: f64) -> f32 {
    let p = phase.fract();
    let v = match waveform {
        Waveform::Sine => (TAU * p).sin(),
        Waveform::Square => {
            if p < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * (p + 0.5).fract() - 1.0,
        Waveform::Triangle => 1.0 - 4.0 * ((p + 0.25).fract() - 0.5).abs(),
    };
    v as f32
}

/// Render-time wiring of one node.
#[derive(Default)]
struct Wiring {
    inputs: Vec<usize>,
    gain_mod: Vec<usize>,
    frequency_mod: Vec<usize>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl SoftwareBackend {
    pub fn new(sample_rate: u32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            DESTINATION,
            Node {
                kind: NodeKind::Destination,
                outputs: Vec::new(),
                dispose_at: None,
            },
        );
        Self {
            sample_rate: sample_rate.max(1),
            frame: 0,
            nodes,
            next_id: 1,
        }
    }

    /// Number of live nodes, destination included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Render `frames` samples and advance the clock.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render_into(&mut out);
        out
    }

    /// Fill `out` with the next samples, clamped to [-1, 1].
    pub fn render_into(&mut self, out: &mut [f32]) {
        let order = self.topological_order();
        let index: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut wiring: Vec<Wiring> = (0..order.len()).map(|_| Wiring::default()).collect();
        for (from, id) in order.iter().enumerate() {
            let Some(node) = self.nodes.get(id) else { continue };
            for connection in &node.outputs {
                match *connection {
                    Connection::Node(to) => {
                        if let Some(&to) = index.get(&to) {
                            wiring[to].inputs.push(from);
                        }
                    }
                    Connection::Param(to, param) => {
                        if let Some(&to) = index.get(&to) {
                            match param {
                                Param::Gain => wiring[to].gain_mod.push(from),
                                Param::Frequency => wiring[to].frequency_mod.push(from),
                            }
                        }
                    }
                }
            }
        }

        let mut active: Vec<(NodeId, Node)> = order
            .iter()
            .filter_map(|id| self.nodes.remove(id).map(|node| (*id, node)))
            .collect();
        let mut values = vec![0.0_f32; active.len()];
        let rate = f64::from(self.sample_rate);
        let destination = active.iter().position(|(id, _)| *id == DESTINATION);

        for sample in out.iter_mut() {
            let t = self.frame as f64 / rate;
            for i in 0..active.len() {
                let sum = |list: &[usize]| list.iter().map(|&j| values[j]).sum::<f32>();
                let input = sum(&wiring[i].inputs);
                let gain_mod = sum(&wiring[i].gain_mod);
                let frequency_mod = sum(&wiring[i].frequency_mod);
                values[i] = match &mut active[i].1.kind {
                    NodeKind::Destination => input,
                    NodeKind::Gain { gain } => input * (gain.value_at(t) + gain_mod),
                    NodeKind::Filter {
                        kind,
                        frequency,
                        q,
                        biquad,
                    } => {
                        let f = frequency.value_at(t);
                        if f != biquad.tuned_for {
                            biquad.tune(*kind, f, *q, self.sample_rate);
                        }
                        biquad.process(input)
                    }
                    NodeKind::Oscillator {
                        waveform,
                        frequency,
                        phase,
                        playback,
                    } => {
                        if playback.active(t) {
                            let v = waveform_sample(*waveform, *phase);
                            let f = f64::from(frequency.value_at(t) + frequency_mod);
                            *phase = (*phase + f / rate).rem_euclid(1.0);
                            v
                        } else {
                            0.0
                        }
                    }
                    NodeKind::Buffer {
                        buffer,
                        looped,
                        position,
                        playback,
                    } => {
                        if playback.active(t) && !buffer.is_empty() {
                            let len = buffer.len() as f64;
                            if *looped {
                                *position %= len;
                            }
                            let v = if *position < len {
                                buffer.samples()[*position as usize]
                            } else {
                                0.0
                            };
                            *position += f64::from(buffer.sample_rate()) / rate;
                            v
                        } else {
                            0.0
                        }
                    }
                };
            }
            *sample = destination.map_or(0.0, |i| values[i]).clamp(-1.0, 1.0);
            self.frame += 1;
        }

        self.nodes.extend(active);
        self.collect_disposed();
    }

    /// Nodes that feed the destination, inputs first. Cycles are cut.
    fn topological_order(&self) -> Vec<NodeId> {
        let mut feeders: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, node) in &self.nodes {
            for connection in &node.outputs {
                let to = match *connection {
                    Connection::Node(to) | Connection::Param(to, _) => to,
                };
                feeders.entry(to).or_default().push(*id);
            }
        }

        let mut order = Vec::new();
        let mut visiting = Vec::new();
        let mut done = std::collections::HashSet::new();
        fn visit(
            id: NodeId,
            feeders: &HashMap<NodeId, Vec<NodeId>>,
            visiting: &mut Vec<NodeId>,
            done: &mut std::collections::HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if done.contains(&id) || visiting.contains(&id) {
                return;
            }
            visiting.push(id);
            for &feeder in feeders.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                visit(feeder, feeders, visiting, done, order);
            }
            visiting.pop();
            done.insert(id);
            order.push(id);
        }
        visit(DESTINATION, &feeders, &mut visiting, &mut done, &mut order);
        order
    }

    fn collect_disposed(&mut self) {
        let now = self.current_time();
        let expired: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.dispose_at.is_some_and(|at| at <= now))
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }
        for id in &expired {
            self.nodes.remove(id);
        }
        for node in self.nodes.values_mut() {
            node.outputs.retain(|c| {
                let to = match *c {
                    Connection::Node(to) | Connection::Param(to, _) => to,
                };
                !expired.contains(&to)
            });
        }
    }

    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                outputs: Vec::new(),
                dispose_at: None,
            },
        );
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, AudioError> {
        self.nodes.get_mut(&id).ok_or(AudioError::UnknownNode(id))
    }

    fn automation(&mut self, id: NodeId, param: Param) -> Result<&mut Automation, AudioError> {
        match (&mut self.node_mut(id)?.kind, param) {
            (NodeKind::Gain { gain }, Param::Gain) => Ok(gain),
            (NodeKind::Oscillator { frequency, .. }, Param::Frequency)
            | (NodeKind::Filter { frequency, .. }, Param::Frequency) => Ok(frequency),
            _ => Err(AudioError::InvalidNode(id)),
        }
    }

    fn playback(&mut self, id: NodeId) -> Result<&mut Playback, AudioError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Buffer { playback, .. } | NodeKind::Oscillator { playback, .. } => Ok(playback),
            _ => Err(AudioError::InvalidNode(id)),
        }
    }
}

impl AudioBackend for SoftwareBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frame as f64 / f64::from(self.sample_rate)
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn create_buffer_source(&mut self, buffer: AudioBuffer, looped: bool) -> Result<NodeId, AudioError> {
        Ok(self.add(NodeKind::Buffer {
            buffer,
            looped,
            position: 0.0,
            playback: Playback::default(),
        }))
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> Result<NodeId, AudioError> {
        Ok(self.add(NodeKind::Oscillator {
            waveform,
            frequency: Automation::new(frequency),
            phase: 0.0,
            playback: Playback::default(),
        }))
    }

    fn create_gain(&mut self, gain: f32) -> Result<NodeId, AudioError> {
        Ok(self.add(NodeKind::Gain {
            gain: Automation::new(gain),
        }))
    }

    fn create_filter(&mut self, kind: FilterKind, frequency: f32, q: f32) -> Result<NodeId, AudioError> {
        Ok(self.add(NodeKind::Filter {
            kind,
            frequency: Automation::new(frequency),
            q,
            biquad: Biquad::default(),
        }))
    }

    fn connect(&mut self, from: NodeId, to: Connection) -> Result<(), AudioError> {
        match to {
            Connection::Node(target) => {
                self.node_mut(target)?;
            }
            Connection::Param(target, param) => {
                self.automation(target, param)?;
            }
        }
        let node = self.node_mut(from)?;
        if matches!(node.kind, NodeKind::Destination) {
            return Err(AudioError::InvalidNode(from));
        }
        if !node.outputs.contains(&to) {
            node.outputs.push(to);
        }
        Ok(())
    }

    fn set_param(&mut self, node: NodeId, param: Param, value: f32, at: f64) -> Result<(), AudioError> {
        self.automation(node, param)?.push(AutomationEvent::Set { value, at });
        Ok(())
    }

    fn exponential_ramp(&mut self, node: NodeId, param: Param, value: f32, end: f64) -> Result<(), AudioError> {
        let now = self.current_time();
        let automation = self.automation(node, param)?;
        if automation.events.is_empty() {
            // Anchor the ramp at the current value.
            let start = automation.initial;
            automation.push(AutomationEvent::Set { value: start, at: now });
        }
        automation.push(AutomationEvent::Ramp { value, end });
        Ok(())
    }

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), AudioError> {
        let playback = self.playback(node)?;
        if playback.start.is_some() {
            return Err(AudioError::InvalidNode(node));
        }
        playback.start = Some(at);
        Ok(())
    }

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), AudioError> {
        let playback = self.playback(node)?;
        if playback.start.is_none() || playback.stop.is_some() {
            return Err(AudioError::AlreadyStopped(node));
        }
        playback.stop = Some(at);
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), AudioError> {
        self.node_mut(node)?.outputs.clear();
        Ok(())
    }

    fn dispose_after(&mut self, node: NodeId, at: f64) -> Result<(), AudioError> {
        if node == DESTINATION {
            return Err(AudioError::InvalidNode(node));
        }
        self.node_mut(node)?.dispose_at = Some(at);
        if at <= self.current_time() {
            self.collect_disposed();
        }
        Ok(())
    }

    fn decoder(&self) -> Arc<dyn AudioDecoder> {
        Arc::new(AssetDecoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count()
    }

    fn tone(backend: &mut SoftwareBackend, waveform: Waveform, frequency: f32, gain: f32) -> (NodeId, NodeId) {
        let osc = backend.create_oscillator(waveform, frequency).unwrap();
        let g = backend.create_gain(gain).unwrap();
        backend.connect(osc, Connection::Node(g)).unwrap();
        backend.connect(g, Connection::Node(DESTINATION)).unwrap();
        backend.start(osc, 0.0).unwrap();
        (osc, g)
    }

    #[test]
    fn silent_without_sources() {
        let mut backend = SoftwareBackend::new(RATE);
        assert!(backend.render(100).iter().all(|s| *s == 0.0));
        assert!((backend.current_time() - 100.0 / 8_000.0).abs() < 1e-9);
    }

    #[test]
    fn sine_through_gain() {
        let mut backend = SoftwareBackend::new(RATE);
        tone(&mut backend, Waveform::Sine, 440.0, 0.5);
        let out = backend.render(RATE as usize);
        assert!((peak(&out) - 0.5).abs() < 0.01);
        let crossings = zero_crossings(&out);
        assert!((870..=890).contains(&crossings), "{crossings}");
    }

    #[test]
    fn stop_silences_source() {
        let mut backend = SoftwareBackend::new(RATE);
        let (osc, _) = tone(&mut backend, Waveform::Square, 100.0, 0.5);
        backend.stop(osc, 0.5).unwrap();
        let out = backend.render(RATE as usize);
        assert!(peak(&out[..3_900]) > 0.4);
        assert_eq!(peak(&out[4_000..]), 0.0);
        assert_eq!(backend.stop(osc, 0.6), Err(AudioError::AlreadyStopped(osc)));
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let mut backend = SoftwareBackend::new(RATE);
        let osc = backend.create_oscillator(Waveform::Sine, 100.0).unwrap();
        assert_eq!(backend.stop(osc, 0.0), Err(AudioError::AlreadyStopped(osc)));
        let gain = backend.create_gain(1.0).unwrap();
        assert_eq!(backend.start(gain, 0.0), Err(AudioError::InvalidNode(gain)));
    }

    #[test]
    fn exponential_ramp_follows_curve() {
        let mut backend = SoftwareBackend::new(RATE);
        let (_, g) = tone(&mut backend, Waveform::Square, 50.0, 1.0);
        backend.set_param(g, Param::Gain, 0.1, 0.0).unwrap();
        backend.exponential_ramp(g, Param::Gain, 0.01, 0.1).unwrap();
        let out = backend.render(RATE as usize / 5);
        // Square wave of amplitude 1 exposes the gain directly.
        assert!((out[0].abs() - 0.1).abs() < 1e-4);
        assert!((out[400].abs() - 0.0316).abs() < 0.002);
        assert!((out[1_000].abs() - 0.01).abs() < 1e-4);
    }

    #[test]
    fn low_pass_attenuates_high_tones() {
        let mut backend = SoftwareBackend::new(RATE);
        let osc = backend.create_oscillator(Waveform::Sine, 3_000.0).unwrap();
        let filter = backend.create_filter(FilterKind::LowPass, 200.0, 0.7).unwrap();
        backend.connect(osc, Connection::Node(filter)).unwrap();
        backend.connect(filter, Connection::Node(DESTINATION)).unwrap();
        backend.start(osc, 0.0).unwrap();
        let out = backend.render(RATE as usize);
        assert!(rms(&out[800..]) < 0.02);
    }

    #[test]
    fn band_pass_keeps_center_frequency() {
        let mut backend = SoftwareBackend::new(RATE);
        let osc = backend.create_oscillator(Waveform::Sine, 400.0).unwrap();
        let filter = backend.create_filter(FilterKind::BandPass, 400.0, 1.0).unwrap();
        backend.connect(osc, Connection::Node(filter)).unwrap();
        backend.connect(filter, Connection::Node(DESTINATION)).unwrap();
        backend.start(osc, 0.0).unwrap();
        let out = backend.render(RATE as usize);
        assert!(rms(&out[800..]) > 0.6);
    }

    #[test]
    fn frequency_modulation_input() {
        let mut backend = SoftwareBackend::new(RATE);
        let (carrier, _) = tone(&mut backend, Waveform::Sine, 100.0, 1.0);
        let lfo = backend.create_oscillator(Waveform::Square, 1.0).unwrap();
        let depth = backend.create_gain(100.0).unwrap();
        backend.connect(lfo, Connection::Node(depth)).unwrap();
        backend.connect(depth, Connection::Param(carrier, Param::Frequency)).unwrap();
        backend.start(lfo, 0.0).unwrap();
        let out = backend.render(RATE as usize / 2);
        // 200 Hz for the first half second instead of 100 Hz.
        assert!(zero_crossings(&out) > 150);
    }

    #[test]
    fn looped_buffer_repeats() {
        let mut backend = SoftwareBackend::new(RATE);
        let buffer = AudioBuffer::new(vec![0.5, -0.5], RATE);
        let src = backend.create_buffer_source(buffer.clone(), true).unwrap();
        backend.connect(src, Connection::Node(DESTINATION)).unwrap();
        backend.start(src, 0.0).unwrap();
        assert_eq!(backend.render(6), vec![0.5, -0.5, 0.5, -0.5, 0.5, -0.5]);

        let once = backend.create_buffer_source(buffer, false).unwrap();
        backend.disconnect(src).unwrap();
        backend.connect(once, Connection::Node(DESTINATION)).unwrap();
        backend.start(once, backend.current_time()).unwrap();
        assert_eq!(backend.render(4), vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn disposed_nodes_are_freed_after_their_time() {
        let mut backend = SoftwareBackend::new(RATE);
        let (osc, g) = tone(&mut backend, Waveform::Sine, 440.0, 0.5);
        backend.stop(osc, 0.1).unwrap();
        backend.dispose_after(osc, 0.1).unwrap();
        backend.dispose_after(g, 0.1).unwrap();
        assert_eq!(backend.node_count(), 3);
        backend.render(RATE as usize / 5);
        assert_eq!(backend.node_count(), 1);
        assert_eq!(backend.disconnect(osc), Err(AudioError::UnknownNode(osc)));
    }

    #[test]
    fn output_is_clamped() {
        let mut backend = SoftwareBackend::new(RATE);
        tone(&mut backend, Waveform::Square, 10.0, 4.0);
        assert!(peak(&backend.render(100)) <= 1.0);
    }

    #[test]
    fn unknown_nodes_are_rejected() {
        let mut backend = SoftwareBackend::new(RATE);
        let ghost = NodeId(99);
        assert_eq!(
            backend.connect(ghost, Connection::Node(DESTINATION)),
            Err(AudioError::UnknownNode(ghost))
        );
        let gain = backend.create_gain(1.0).unwrap();
        assert_eq!(
            backend.set_param(gain, Param::Frequency, 1.0, 0.0),
            Err(AudioError::InvalidNode(gain))
        );
    }
}
