use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerMode;

/// How long display surfaces keep a notification on screen.
pub const NOTIFICATION_DISMISS_AFTER: std::time::Duration = std::time::Duration::from_secs(5);

/// Every state change in the system produces an Event.
/// Presentation layers render them; the application context reacts to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A mode was armed: new label and full duration for the display.
    ModeChanged {
        mode: TimerMode,
        label: String,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStarted {
        mode: TimerMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        mode: TimerMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        mode: TimerMode,
        at: DateTime<Utc>,
    },
    TimerTick {
        mode: TimerMode,
        remaining_secs: u64,
        total_secs: u64,
    },
    /// A countdown reached zero.
    SessionCompleted {
        finished: TimerMode,
        next: TimerMode,
        session_count: u32,
        /// The next mode starts by itself after the auto-start delay.
        auto_start: bool,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        id: String,
        title: String,
        icon: String,
        at: DateTime<Utc>,
    },
    /// User-facing message for toast/OS notification surfaces.
    Notification {
        title: String,
        message: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        mode: TimerMode,
        label: String,
        running: bool,
        remaining_secs: u64,
        total_secs: u64,
        session_count: u32,
        long_break_interval: u32,
        progress: f64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn notification(title: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Notification {
            title: title.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}
