use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::backend::AudioDecoder;
use crate::error::AudioError;

/// Immutable mono sample buffer. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// WAV decoder. Multi-channel input is averaged down to mono.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| AudioError::Decode(e.to_string()))?
            }
        };

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        downmix(&interleaved, channels, &mut mono);
        Ok(AudioBuffer::new(mono, spec.sample_rate))
    }
}

fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Container/codec decoder for compressed assets (MP4/AAC, MP3, FLAC,
/// Ogg Vorbis, WAV). Multi-channel input is averaged down to mono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        let decode_err = |e: SymphoniaError| AudioError::Decode(e.to_string());

        let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&Hint::new(), source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(decode_err)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track".into()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_err)?;

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(decode_err(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate.get_or_insert(spec.rate);
                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    downmix(samples.samples(), spec.channels.count(), &mut mono);
                }
                // A corrupt packet is skipped, the rest of the stream still plays.
                Err(SymphoniaError::DecodeError(e)) => tracing::debug!(error = e, "skipping bad packet"),
                Err(e) => return Err(decode_err(e)),
            }
        }

        let sample_rate = sample_rate.ok_or_else(|| AudioError::Decode("unknown sample rate".into()))?;
        Ok(AudioBuffer::new(mono, sample_rate))
    }
}

/// Picks the decoder by content: RIFF/WAVE goes to [`WavDecoder`],
/// everything else to [`SymphoniaDecoder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetDecoder;

impl AssetDecoder {
    pub fn is_wav(bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
    }
}

impl AudioDecoder for AssetDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        if Self::is_wav(bytes) {
            WavDecoder.decode(bytes)
        } else {
            SymphoniaDecoder.decode(bytes)
        }
    }
}

#[cfg(test)]
pub(crate) fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * f32::from(i16::MAX)) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mono_pcm16() {
        let bytes = wav_bytes(&[0.0, 0.5, -0.5, 0.25], 8_000, 1);
        let buffer = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.sample_rate(), 8_000);
        assert_eq!(buffer.len(), 4);
        assert!((buffer.samples()[1] - 0.5).abs() < 0.001);
        assert!((buffer.samples()[2] + 0.5).abs() < 0.001);
    }

    #[test]
    fn stereo_is_mixed_to_mono() {
        let bytes = wav_bytes(&[0.5, 0.0, -0.5, -0.5], 8_000, 2);
        let buffer = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.len(), 2);
        assert!((buffer.samples()[0] - 0.25).abs() < 0.001);
        assert!((buffer.samples()[1] + 0.5).abs() < 0.001);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = WavDecoder.decode(b"definitely not audio").unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn container_decoder_reads_wav() {
        let bytes = wav_bytes(&[0.0, 0.5, -0.5, 0.25], 8_000, 1);
        let buffer = SymphoniaDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.sample_rate(), 8_000);
        assert_eq!(buffer.len(), 4);
        assert!((buffer.samples()[1] - 0.5).abs() < 0.001);
        assert!((buffer.samples()[3] - 0.25).abs() < 0.001);
    }

    #[test]
    fn container_decoder_mixes_stereo() {
        let bytes = wav_bytes(&[0.5, 0.0, -0.5, -0.5], 8_000, 2);
        let buffer = SymphoniaDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer.len(), 2);
        assert!((buffer.samples()[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn asset_decoder_sniffs_content() {
        let wav = wav_bytes(&[0.1, 0.2], 8_000, 1);
        assert!(AssetDecoder::is_wav(&wav));
        assert_eq!(AssetDecoder.decode(&wav).unwrap().len(), 2);

        // An MP4 `ftyp` header with no playable track goes to the container
        // decoder and fails cleanly.
        let mut mp4 = vec![0, 0, 0, 24];
        mp4.extend_from_slice(b"ftypM4A \0\0\0\0M4A isom");
        assert!(!AssetDecoder::is_wav(&mp4));
        let err = AssetDecoder.decode(&mp4).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));

        let err = AssetDecoder.decode(b"definitely not audio").unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn duration_uses_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 22_050], 44_100);
        assert!((buffer.duration_secs() - 0.5).abs() < f64::EPSILON);
    }
}
