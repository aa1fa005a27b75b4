use clap::Subcommand;

use super::{open, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Pomodoro counts and streak
    Show,
    /// Achievements and whether they are unlocked
    Achievements {
        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let session = open()?;
    let app = &session.app;

    match action {
        StatsAction::Show => {
            println!("{}", serde_json::to_string_pretty(app.statistics())?);
        }
        StatsAction::Achievements { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(app.achievements())?);
            } else {
                for a in app.achievements().iter() {
                    let mark = if a.unlocked { "x" } else { " " };
                    println!("[{mark}] {} {} - {}", a.icon, a.title, a.description);
                }
                println!(
                    "{}/{} unlocked",
                    app.achievements().unlocked_count(),
                    app.achievements().iter().count()
                );
            }
        }
    }
    Ok(())
}
