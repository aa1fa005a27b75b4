//! Session timer state machine.
//!
//! The timer is a plain state machine with no internal thread. The caller
//! (see [`TimerDriver`](super::TimerDriver)) invokes `tick()` once per second
//! and `resync()` whenever the process may have missed ticks.
//!
//! ## State Transitions
//!
//! ```text
//! Focus -> (ShortBreak | LongBreak) -> Focus -> ...
//!   each mode is either Stopped or Running
//! ```
//!
//! Remaining time is anchored to the wall clock: while running,
//! `time_left == total - floor((now - start_epoch_ms) / 1000)`, clamped at
//! zero. Ticks are a display convenience; `resync` is the source of truth.
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = SessionTimer::new(Settings::default());
//! timer.start(now_ms);
//! // Once per second:
//! let events = timer.tick();
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::mode::TimerMode;
use crate::events::Event;
use crate::storage::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Stopped,
    Running,
}

/// Core session timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTimer {
    settings: Settings,
    mode: TimerMode,
    state: TimerState,
    time_left_secs: u64,
    total_secs: u64,
    /// Wall-clock anchor (ms since epoch) of a virtual start at full
    /// duration. Only set while running.
    #[serde(default)]
    start_epoch_ms: Option<u64>,
    /// Completed focus sessions; drives long-break cadence.
    session_count: u32,
    /// Lifetime completed focus sessions.
    completed_pomodoros: u32,
}

impl SessionTimer {
    /// Create a timer in Focus mode, stopped, with the full focus duration.
    pub fn new(settings: Settings) -> Self {
        Self::with_counts(settings, 0, 0)
    }

    /// Create a timer that continues previously persisted counters.
    pub fn with_counts(settings: Settings, session_count: u32, completed_pomodoros: u32) -> Self {
        let total_secs = settings.duration_secs(TimerMode::Focus);
        Self {
            settings,
            mode: TimerMode::Focus,
            state: TimerState::Stopped,
            time_left_secs: total_secs,
            total_secs,
            start_epoch_ms: None,
            session_count,
            completed_pomodoros,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn time_left_secs(&self) -> u64 {
        self.time_left_secs
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn start_epoch_ms(&self) -> Option<u64> {
        self.start_epoch_ms
    }

    pub fn session_count(&self) -> u32 {
        self.session_count
    }

    pub fn completed_pomodoros(&self) -> u32 {
        self.completed_pomodoros
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 1-based position of the next focus session within the long-break
    /// cycle ("Session 2 of 4").
    pub fn cycle_position(&self) -> u32 {
        (self.session_count % self.settings.long_break_interval()) + 1
    }

    /// 0.0 .. 1.0 progress within the current mode.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        1.0 - (self.time_left_secs as f64 / self.total_secs as f64)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            mode: self.mode,
            label: self.mode.label().to_string(),
            running: self.is_running(),
            remaining_secs: self.time_left_secs,
            total_secs: self.total_secs,
            session_count: self.session_count,
            long_break_interval: self.settings.long_break_interval(),
            progress: self.progress(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm `mode` at its full configured duration, stopping any countdown.
    pub fn set_mode(&mut self, mode: TimerMode) -> Event {
        self.mode = mode;
        self.state = TimerState::Stopped;
        self.start_epoch_ms = None;
        self.total_secs = self.settings.duration_secs(mode);
        self.time_left_secs = self.total_secs;
        Event::ModeChanged {
            mode,
            label: mode.label().to_string(),
            total_secs: self.total_secs,
            at: Utc::now(),
        }
    }

    /// Start (or resume) the countdown at wall-clock time `now_ms`.
    ///
    /// An exhausted countdown is re-armed first. Starting while already
    /// running does nothing and returns no events.
    pub fn start(&mut self, now_ms: u64) -> Vec<Event> {
        if self.is_running() {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.time_left_secs == 0 {
            events.push(self.set_mode(self.mode));
        }
        self.state = TimerState::Running;
        let elapsed_ms = (self.total_secs - self.time_left_secs).saturating_mul(1000);
        self.start_epoch_ms = Some(now_ms.saturating_sub(elapsed_ms));
        events.push(Event::TimerStarted {
            mode: self.mode,
            remaining_secs: self.time_left_secs,
            at: Utc::now(),
        });
        events
    }

    /// Stop the countdown. Idempotent: only the running -> stopped
    /// transition produces an event.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.is_running() {
            return None;
        }
        self.state = TimerState::Stopped;
        self.start_epoch_ms = None;
        Some(Event::TimerPaused {
            mode: self.mode,
            remaining_secs: self.time_left_secs,
            at: Utc::now(),
        })
    }

    /// Pause and re-arm the current mode.
    pub fn reset(&mut self) -> Vec<Event> {
        let mut events: Vec<Event> = self.pause().into_iter().collect();
        events.push(Event::TimerReset {
            mode: self.mode,
            at: Utc::now(),
        });
        events.push(self.set_mode(self.mode));
        events
    }

    /// Advance one second. Completes the session when time runs out.
    pub fn tick(&mut self) -> Vec<Event> {
        if !self.is_running() {
            return Vec::new();
        }
        self.time_left_secs = self.time_left_secs.saturating_sub(1);
        if self.time_left_secs == 0 {
            return self.complete_session();
        }
        vec![self.tick_event()]
    }

    /// Recompute remaining time from the wall-clock anchor.
    ///
    /// Call whenever periodic ticks may have been missed (process
    /// suspended, window hidden). Completes immediately if the countdown
    /// ran out in the meantime.
    pub fn resync(&mut self, now_ms: u64) -> Vec<Event> {
        let Some(anchor) = self.start_epoch_ms.filter(|_| self.is_running()) else {
            return Vec::new();
        };
        let elapsed_secs = now_ms.saturating_sub(anchor) / 1000;
        self.time_left_secs = self.total_secs.saturating_sub(elapsed_secs);
        if self.time_left_secs == 0 {
            return self.complete_session();
        }
        vec![self.tick_event()]
    }

    /// Replace the settings and re-arm the current mode.
    pub fn set_config(&mut self, settings: Settings) -> Vec<Event> {
        self.settings = settings;
        let mut events: Vec<Event> = self.pause().into_iter().collect();
        events.push(self.set_mode(self.mode));
        events
    }

    /// Finish the current mode and pick the next one.
    ///
    /// When the matching auto-start flag is off the next mode is armed
    /// immediately. When it is on, the current mode stays exhausted and the
    /// caller is expected to arm and start `next` after the auto-start
    /// delay (see [`AUTO_START_DELAY`](super::AUTO_START_DELAY)).
    pub fn complete_session(&mut self) -> Vec<Event> {
        self.state = TimerState::Stopped;
        self.start_epoch_ms = None;
        self.time_left_secs = 0;

        let finished = self.mode;
        let (next, title, message) = match finished {
            TimerMode::Focus => {
                self.session_count += 1;
                self.completed_pomodoros += 1;
                // Post-increment count: the Nth session earns the long break.
                let next = if self.session_count % self.settings.long_break_interval() == 0 {
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                };
                (next, "Focus Session Complete!", "Great job! Time for a break.")
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => {
                (TimerMode::Focus, "Break Complete!", "Ready to get back to work?")
            }
        };
        let auto_start = self.settings.auto_start_after(finished);

        let mut events = vec![
            Event::SessionCompleted {
                finished,
                next,
                session_count: self.session_count,
                auto_start,
                at: Utc::now(),
            },
            Event::notification(title, message),
        ];
        if !auto_start {
            events.push(self.set_mode(next));
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn tick_event(&self) -> Event {
        Event::TimerTick {
            mode: self.mode,
            remaining_secs: self.time_left_secs,
            total_secs: self.total_secs,
        }
    }
}

/// Helper for callers that only care about completion.
pub fn completion(events: &[Event]) -> Option<(TimerMode, TimerMode, bool)> {
    events.iter().find_map(|e| match e {
        Event::SessionCompleted {
            finished,
            next,
            auto_start,
            ..
        } => Some((*finished, *next, *auto_start)),
        _ => None,
    })
}
