//! Ambient sound commands for CLI.

use std::path::{Path, PathBuf};
#[cfg(feature = "audio-output")]
use std::time::Duration;

use clap::Subcommand;
use zomodoro_core::storage::data_dir;
use zomodoro_core::Catalog;

use super::{open_with_rate, CliResult};

#[derive(Subcommand)]
pub enum SoundsAction {
    /// List the catalog with per-track state
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the active catalog as TOML (copy it to sounds.toml to customize)
    Catalog,
    /// Mix sounds offline into a WAV file
    Render {
        /// Sound names
        #[arg(required = true)]
        names: Vec<String>,
        /// Output file
        #[arg(long)]
        out: PathBuf,
        /// Length in seconds
        #[arg(long, default_value = "5")]
        seconds: f32,
        /// Volume for every listed track (0.0-1.0)
        #[arg(long)]
        volume: Option<f32>,
        /// Master volume (0.0-1.0)
        #[arg(long)]
        master: Option<f32>,
        /// Sample rate of the output file
        #[arg(long, default_value = "44100")]
        rate: u32,
    },
    /// Play sounds on the default output device
    Play {
        /// Sound names
        #[arg(required = true)]
        names: Vec<String>,
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

pub async fn run(action: SoundsAction) -> CliResult {
    match action {
        SoundsAction::List { json } => list(json),
        SoundsAction::Catalog => {
            let catalog = Catalog::load(&data_dir()?)?;
            print!("{}", catalog.to_toml()?);
            Ok(())
        }
        SoundsAction::Render {
            names,
            out,
            seconds,
            volume,
            master,
            rate,
        } => render(&names, &out, seconds, volume, master, rate).await,
        SoundsAction::Play { names, seconds } => play(&names, seconds).await,
    }
}

fn list(json: bool) -> CliResult {
    let session = super::open()?;
    let status = session.app.sounds().status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    for track in &status {
        println!(
            "{:<18} {:<10} {:<9} vol {:.2}",
            track.name,
            serde_json::to_value(track.group)?.as_str().unwrap_or("?"),
            serde_json::to_value(track.kind)?.as_str().unwrap_or("?"),
            track.volume
        );
    }
    Ok(())
}

async fn render(
    names: &[String],
    out: &Path,
    seconds: f32,
    volume: Option<f32>,
    master: Option<f32>,
    rate: u32,
) -> CliResult {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("--seconds must be positive".into());
    }
    let session = open_with_rate(rate)?;
    let sounds = session.app.sounds();

    if let Some(level) = master {
        sounds.set_master_volume(level);
    }
    for name in names {
        sounds.play(name)?;
        if let Some(level) = volume {
            sounds.set_volume(name, level)?;
        }
    }
    // Remote assets either arrive or fall back before rendering starts.
    sounds.wait_idle().await;

    let frames = (seconds * rate as f32).round() as usize;
    let samples = session
        .backend
        .lock()
        .map_err(|_| "renderer lock poisoned")?
        .render(frames);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(out, spec)?;
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    tracing::info!(path = %out.display(), frames, "rendered mix");
    println!("wrote {} ({frames} frames at {rate} Hz)", out.display());
    Ok(())
}

#[cfg(feature = "audio-output")]
async fn play(names: &[String], seconds: Option<u64>) -> CliResult {
    let (session, _output) = super::open_audible()?;
    session.app.preload_sounds();
    let sounds = session.app.sounds();
    for name in names {
        sounds.play(name)?;
    }
    eprintln!("playing {} (Ctrl-C to stop)", names.join(", "));

    match seconds {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    let notice = session.app.stop_all_sounds();
    super::announce(std::slice::from_ref(&notice));
    // Let the release ramp reach the device before the stream drops.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

#[cfg(not(feature = "audio-output"))]
async fn play(names: &[String], _seconds: Option<u64>) -> CliResult {
    // Validate names so typos are reported the same way with or without audio.
    let session = super::open()?;
    for name in names {
        if session.app.sounds().state(name).is_none() {
            return Err(format!("unknown sound: {name}").into());
        }
    }
    Err(super::NO_AUDIO.into())
}
