use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "audio-output")]
mod audio_out;
mod commands;

#[derive(Parser)]
#[command(name = "zomodoro-cli", version, about = "Zomodoro focus timer and ambient sound CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Settings management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Statistics and achievements
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Ambient sounds
    Sounds {
        #[command(subcommand)]
        action: commands::sounds::SoundsAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("ZOMODORO_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action).await,
        Commands::Task { action } => commands::task::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Sounds { action } => commands::sounds::run(action).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
