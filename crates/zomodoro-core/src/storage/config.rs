//! User settings.
//!
//! Settings live inside the persisted application blob (see
//! [`AppData`](super::AppData)) and are serialized with camelCase keys:
//!
//! - `focusDuration`, `shortBreakDuration`, `longBreakDuration` (minutes)
//! - `longBreakInterval` (focus sessions per long break)
//! - `autoStartBreaks`, `autoStartPomodoros`
//! - `soundEnabled`
//!
//! The presentation layer writes raw input through [`Settings::set`]. Bad
//! values never surface as errors: they are coerced back to the prior value.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::timer::TimerMode;

/// Timer and sound preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u32,
    #[serde(default = "default_short_break")]
    pub short_break_duration: u32,
    #[serde(default = "default_long_break")]
    pub long_break_duration: u32,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
    #[serde(default)]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_pomodoros: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
}

// Default functions
fn default_focus_duration() -> u32 {
    25
}
fn default_short_break() -> u32 {
    5
}
fn default_long_break() -> u32 {
    15
}
fn default_long_break_interval() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_duration: default_focus_duration(),
            short_break_duration: default_short_break(),
            long_break_duration: default_long_break(),
            long_break_interval: default_long_break_interval(),
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            sound_enabled: true,
        }
    }
}

impl Settings {
    /// Configured length of `mode` in minutes.
    pub fn duration_min(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_duration,
            TimerMode::ShortBreak => self.short_break_duration,
            TimerMode::LongBreak => self.long_break_duration,
        }
    }

    /// Configured length of `mode` in seconds.
    pub fn duration_secs(&self, mode: TimerMode) -> u64 {
        u64::from(self.duration_min(mode)).saturating_mul(60)
    }

    /// Long-break cadence, never below 1.
    pub fn long_break_interval(&self) -> u32 {
        self.long_break_interval.max(1)
    }

    /// Whether finishing `mode` should start the next mode automatically.
    pub fn auto_start_after(&self, mode: TimerMode) -> bool {
        match mode {
            TimerMode::Focus => self.auto_start_breaks,
            TimerMode::ShortBreak | TimerMode::LongBreak => self.auto_start_pomodoros,
        }
    }

    /// Accepts both `focusDuration` and `focus_duration`.
    fn canonical_key(key: &str) -> String {
        let mut out = String::with_capacity(key.len());
        let mut upper = false;
        for c in key.trim().chars() {
            if c == '_' || c == '-' {
                upper = true;
            } else if upper {
                out.extend(c.to_uppercase());
                upper = false;
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Get a setting value as string.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = json.get(Self::canonical_key(key))?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a setting from raw user input.
    ///
    /// Unknown keys are an error. A value that does not parse (non-numeric,
    /// zero or negative minutes, not a boolean) leaves the prior value in
    /// place and still returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKey`] if `key` names no setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = Self::canonical_key(key);
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        let obj = json
            .as_object_mut()
            .ok_or_else(|| ConfigError::ParseFailed("settings are not an object".into()))?;
        let existing = obj
            .get(&key)
            .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => parse_flag(value).map(serde_json::Value::Bool),
            serde_json::Value::Number(_) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| serde_json::Value::Number(n.into())),
            _ => None,
        };

        match new_value {
            Some(v) => {
                obj.insert(key, v);
                *self = serde_json::from_value(json)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
            }
            None => {
                tracing::debug!(%key, %value, "ignoring invalid setting value");
            }
        }
        Ok(())
    }

    /// Names of all settings, sorted.
    pub fn keys() -> Vec<String> {
        serde_json::to_value(Settings::default())
            .ok()
            .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect()))
            .unwrap_or_default()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.focus_duration, 25);
        assert_eq!(s.short_break_duration, 5);
        assert_eq!(s.long_break_duration, 15);
        assert_eq!(s.long_break_interval, 4);
        assert!(!s.auto_start_breaks);
        assert!(!s.auto_start_pomodoros);
        assert!(s.sound_enabled);
    }

    #[test]
    fn get_accepts_camel_and_snake_keys() {
        let s = Settings::default();
        assert_eq!(s.get("focusDuration").as_deref(), Some("25"));
        assert_eq!(s.get("long_break_interval").as_deref(), Some("4"));
        assert_eq!(s.get("soundEnabled").as_deref(), Some("true"));
        assert!(s.get("theme").is_none());
    }

    #[test]
    fn set_updates_number_and_flag() {
        let mut s = Settings::default();
        s.set("focusDuration", "50").unwrap();
        s.set("auto_start_breaks", "yes").unwrap();
        assert_eq!(s.focus_duration, 50);
        assert!(s.auto_start_breaks);
    }

    #[test]
    fn set_coerces_bad_input_to_prior_value() {
        let mut s = Settings::default();
        s.set("focusDuration", "40").unwrap();
        s.set("focusDuration", "abc").unwrap();
        s.set("focusDuration", "0").unwrap();
        s.set("focusDuration", "-3").unwrap();
        s.set("soundEnabled", "maybe").unwrap();
        assert_eq!(s.focus_duration, 40);
        assert!(s.sound_enabled);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut s = Settings::default();
        assert!(matches!(
            s.set("volume", "3"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"focusDuration": 45}"#).unwrap();
        assert_eq!(s.focus_duration, 45);
        assert_eq!(s.short_break_duration, 5);
        assert!(s.sound_enabled);
    }

    #[test]
    fn long_break_interval_never_zero() {
        let s = Settings {
            long_break_interval: 0,
            ..Settings::default()
        };
        assert_eq!(s.long_break_interval(), 1);
    }

    #[test]
    fn keys_lists_every_setting() {
        let keys = Settings::keys();
        assert_eq!(keys.len(), 7);
        assert!(keys.contains(&"autoStartPomodoros".to_string()));
    }
}
