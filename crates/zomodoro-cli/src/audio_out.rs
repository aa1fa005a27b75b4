//! Streams the software renderer to the default output device.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use zomodoro_core::SoftwareBackend;

fn default_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No audio output device found")?;
    let config = device
        .default_output_config()
        .map_err(|e| format!("Failed to get audio config: {}", e))?;
    Ok((device, config))
}

/// Sample rate the renderer must use to match the device.
pub fn device_sample_rate() -> Result<u32, String> {
    let (_, config) = default_device()?;
    Ok(config.sample_rate().0)
}

/// Keeps the output stream alive.
pub struct AudioOutput {
    _stream: cpal::Stream,
}

impl AudioOutput {
    pub fn start(backend: Arc<Mutex<SoftwareBackend>>) -> Result<Self, String> {
        let (device, config) = default_device()?;
        let channels = config.channels().max(1) as usize;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            rate = config.sample_rate().0,
            channels,
            "audio output"
        );

        let mut mono = Vec::<f32>::new();
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);
                    match backend.lock() {
                        Ok(mut renderer) => renderer.render_into(&mut mono),
                        Err(_) => mono.fill(0.0),
                    }
                    for (frame, sample) in data.chunks_mut(channels).zip(&mono) {
                        frame.fill(*sample);
                    }
                },
                |err| tracing::warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| format!("Failed to build audio stream: {}", e))?;

        stream
            .play()
            .map_err(|e| format!("Failed to start audio stream: {}", e))?;

        Ok(Self { _stream: stream })
    }
}
