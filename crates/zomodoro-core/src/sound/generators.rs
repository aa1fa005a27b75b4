//! Procedural noise textures.
//!
//! Each texture is pure data: either a looped sample buffer with an optional
//! filter, or a carrier oscillator frequency-modulated by an LFO. Building
//! the actual graph is up to the engine.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::backend::{FilterKind, Waveform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Texture {
    White,
    Pink,
    Brown,
    Violet,
    Cafe,
    Fireplace,
    Library,
    Birds,
    Fan,
    Train,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
}

/// Graph recipe for one texture.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSpec {
    /// Looped buffer of `seconds` length, rendered by [`Texture::render`].
    Buffer { seconds: u32, filter: Option<FilterSpec> },
    /// Carrier whose frequency is swept by `lfo` scaled by `depth` Hz.
    Modulated {
        carrier: Waveform,
        frequency: f32,
        lfo: Waveform,
        lfo_frequency: f32,
        depth: f32,
    },
}

impl Texture {
    pub const ALL: [Texture; 10] = [
        Texture::White,
        Texture::Pink,
        Texture::Brown,
        Texture::Violet,
        Texture::Cafe,
        Texture::Fireplace,
        Texture::Library,
        Texture::Birds,
        Texture::Fan,
        Texture::Train,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Texture::White => "white",
            Texture::Pink => "pink",
            Texture::Brown => "brown",
            Texture::Violet => "violet",
            Texture::Cafe => "cafe",
            Texture::Fireplace => "fireplace",
            Texture::Library => "library",
            Texture::Birds => "birds",
            Texture::Fan => "fan",
            Texture::Train => "train",
        }
    }

    pub fn spec(self) -> TextureSpec {
        let filter = |kind, frequency, q| Some(FilterSpec { kind, frequency, q });
        match self {
            Texture::White | Texture::Pink | Texture::Brown => TextureSpec::Buffer {
                seconds: 2,
                filter: None,
            },
            Texture::Violet => TextureSpec::Buffer {
                seconds: 2,
                filter: filter(FilterKind::HighPass, 1000.0, 0.5),
            },
            Texture::Cafe => TextureSpec::Buffer {
                seconds: 4,
                filter: filter(FilterKind::BandPass, 400.0, 1.0),
            },
            Texture::Fireplace => TextureSpec::Buffer {
                seconds: 3,
                filter: None,
            },
            Texture::Library => TextureSpec::Buffer {
                seconds: 6,
                filter: filter(FilterKind::HighPass, 1000.0, 1.0),
            },
            Texture::Fan => TextureSpec::Buffer {
                seconds: 3,
                filter: filter(FilterKind::BandPass, 120.0, 2.0),
            },
            Texture::Train => TextureSpec::Buffer {
                seconds: 6,
                filter: None,
            },
            Texture::Birds => TextureSpec::Modulated {
                carrier: Waveform::Sine,
                frequency: 800.0,
                lfo: Waveform::Triangle,
                lfo_frequency: 0.1,
                depth: 100.0,
            },
        }
    }

    /// Render the sample buffer for a buffer texture. Returns `None` for
    /// oscillator textures.
    pub fn render<R: Rng>(self, sample_rate: u32, rng: &mut R) -> Option<Vec<f32>> {
        let TextureSpec::Buffer { seconds, .. } = self.spec() else {
            return None;
        };
        let len = sample_rate as usize * seconds as usize;
        let mut white = move || rng.gen_range(-1.0_f32..=1.0);

        let samples = match self {
            Texture::White | Texture::Violet => (0..len).map(|_| white()).collect(),
            Texture::Pink => pink(len, &mut white),
            Texture::Brown => brownian(len, 0.02, 3.5, &mut white),
            Texture::Cafe => {
                let (mut b0, mut b1, mut b2) = (0.0_f32, 0.0_f32, 0.0_f32);
                (0..len)
                    .map(|_| {
                        let w = white();
                        b0 = 0.99886 * b0 + w * 0.0555179;
                        b1 = 0.99332 * b1 + w * 0.0750759;
                        b2 = 0.96900 * b2 + w * 0.1538520;
                        (b0 + b1 + b2) * 0.3
                    })
                    .collect()
            }
            Texture::Fireplace => {
                let mut out = brownian(len, 0.005, 5.0, &mut white);
                for sample in &mut out {
                    // Crackle
                    if (white() + 1.0) / 2.0 < 0.001 {
                        *sample += (white() / 2.0) * 0.5;
                    }
                }
                out
            }
            Texture::Library => (0..len)
                .map(|_| {
                    let mut s = white() * 0.1;
                    if (white() + 1.0) / 2.0 < 0.0001 {
                        s += (white() / 2.0) * 0.05;
                    }
                    s
                })
                .collect(),
            Texture::Fan => brownian(len, 0.05, 2.0, &mut white),
            Texture::Train => {
                let mut out = brownian(len, 0.01, 1.5, &mut white);
                for (i, sample) in out.iter_mut().enumerate() {
                    let rhythm = (i as f64 * 0.001).sin() * 0.2;
                    *sample *= (1.0 + rhythm) as f32;
                }
                out
            }
            Texture::Birds => return None,
        };
        Some(samples)
    }
}

/// Leaky integrator: `out = (prev + step * white) / (1 + step)`, output
/// scaled by `gain` (the unscaled value feeds back).
fn brownian(len: usize, step: f32, gain: f32, white: &mut impl FnMut() -> f32) -> Vec<f32> {
    let mut last = 0.0_f32;
    (0..len)
        .map(|_| {
            last = (last + step * white()) / (1.0 + step);
            last * gain
        })
        .collect()
}

/// Paul Kellet's refined pink noise filter.
fn pink(len: usize, white: &mut impl FnMut() -> f32) -> Vec<f32> {
    let (mut b0, mut b1, mut b2, mut b3, mut b4, mut b5, mut b6) = (0.0_f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    (0..len)
        .map(|_| {
            let w = white();
            b0 = 0.99886 * b0 + w * 0.0555179;
            b1 = 0.99332 * b1 + w * 0.0750759;
            b2 = 0.96900 * b2 + w * 0.1538520;
            b3 = 0.86650 * b3 + w * 0.3104856;
            b4 = 0.55000 * b4 + w * 0.5329522;
            b5 = -0.7616 * b5 - w * 0.0168980;
            let out = (b0 + b1 + b2 + b3 + b4 + b5 + b6 + w * 0.5362) * 0.11;
            b6 = w * 0.115926;
            out
        })
        .collect()
}

impl fmt::Display for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Texture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let s = s.strip_suffix("-noise").unwrap_or(&s);
        Texture::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown texture: {s}"))
    }
}
