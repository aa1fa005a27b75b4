//! Short synthesized notification tones.
//!
//! Cues go straight to the backend destination, bypassing the ambient
//! master bus, and free their nodes once they have finished.

use serde::{Deserialize, Serialize};

use super::backend::{AudioBackend, Connection, Param, SharedBackend, Waveform};
use super::engine::lock;
use crate::error::AudioError;

const CUE_GAIN: f32 = 0.1;
const CUE_FLOOR: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    /// Falling blip when a session starts.
    Start,
    /// C-E-G arpeggio when a session completes.
    Complete,
    /// Rising A major arpeggio for an unlocked achievement.
    Achievement,
}

/// One tone of a cue, relative to the moment the cue fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub frequency: f32,
    /// Frequency reached at the end of the note, if it glides.
    pub glide_to: Option<f32>,
    pub offset: f64,
    pub duration: f64,
}

impl Note {
    fn arpeggio(frequencies: &[f32], spacing: f64, duration: f64) -> Vec<Note> {
        frequencies
            .iter()
            .enumerate()
            .map(|(i, &frequency)| Note {
                frequency,
                glide_to: None,
                offset: i as f64 * spacing,
                duration,
            })
            .collect()
    }
}

impl Cue {
    pub fn notes(self) -> Vec<Note> {
        match self {
            Cue::Start => vec![Note {
                frequency: 800.0,
                glide_to: Some(400.0),
                offset: 0.0,
                duration: 0.1,
            }],
            Cue::Complete => Note::arpeggio(&[523.25, 659.25, 783.99], 0.15, 0.3),
            Cue::Achievement => Note::arpeggio(&[440.0, 554.37, 659.25, 880.0], 0.1, 0.2),
        }
    }
}

/// Plays [`Cue`]s while sound is enabled.
pub struct CuePlayer {
    backend: SharedBackend,
    enabled: bool,
}

impl CuePlayer {
    pub fn new(backend: SharedBackend, enabled: bool) -> Self {
        Self { backend, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Schedule `cue` on the backend. Does nothing while disabled.
    pub fn play(&self, cue: Cue) -> Result<(), AudioError> {
        if !self.enabled {
            return Ok(());
        }
        let mut backend = lock(&self.backend);
        backend.resume()?;
        let now = backend.current_time();
        for note in cue.notes() {
            schedule(&mut *backend, note, now)?;
        }
        tracing::debug!(?cue, "cue scheduled");
        Ok(())
    }
}

fn schedule(backend: &mut dyn AudioBackend, note: Note, now: f64) -> Result<(), AudioError> {
    let start = now + note.offset;
    let end = start + note.duration;
    let destination = backend.destination();

    let osc = backend.create_oscillator(Waveform::Sine, note.frequency)?;
    let gain = backend.create_gain(CUE_GAIN)?;
    backend.connect(osc, Connection::Node(gain))?;
    backend.connect(gain, Connection::Node(destination))?;

    backend.set_param(osc, Param::Frequency, note.frequency, start)?;
    if let Some(target) = note.glide_to {
        backend.exponential_ramp(osc, Param::Frequency, target, end)?;
    }
    backend.set_param(gain, Param::Gain, CUE_GAIN, start)?;
    backend.exponential_ramp(gain, Param::Gain, CUE_FLOOR, end)?;

    backend.start(osc, start)?;
    backend.stop(osc, end)?;
    backend.dispose_after(osc, end)?;
    backend.dispose_after(gain, end)
}
