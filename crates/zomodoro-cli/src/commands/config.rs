use clap::Subcommand;

use super::{announce, open, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a setting value
    Get {
        /// Setting key (e.g. "focusDuration", "auto_start_breaks")
        key: String,
    },
    /// Set a setting value
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// List all settings
    List,
    /// Reset settings to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    let mut session = open()?;
    let app = &mut session.app;

    match action {
        ConfigAction::Get { key } => match app.settings().get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            let notice = app.set_setting(&key, &value)?;
            announce(std::slice::from_ref(&notice));
            let current = app.settings().get(&key).unwrap_or_default();
            println!("{key} = {current}");
        }
        ConfigAction::List => {
            let json = serde_json::to_string_pretty(app.settings())?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            let notice = app.reset_settings()?;
            announce(std::slice::from_ref(&notice));
            println!("settings reset to defaults");
        }
    }
    Ok(())
}
