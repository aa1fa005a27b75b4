//! Pomodoro statistics.
//!
//! Counts completed focus sessions per day, per week (weeks start on
//! Sunday) and in total, and tracks a streak of consecutive active days.

pub mod achievements;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub use achievements::{Achievement, AchievementBook};

/// Weeks of history kept in [`Statistics::weekly_data`].
pub const WEEKS_RETAINED: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekTotal {
    /// First day (Sunday) of the week.
    pub week: NaiveDate,
    pub pomodoros: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub today_pomodoros: u32,
    pub week_pomodoros: u32,
    pub total_pomodoros: u32,
    pub current_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub weekly_data: Vec<WeekTotal>,
}

/// Sunday on or before `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

impl Statistics {
    /// Record one completed focus session on `today`.
    pub fn record_pomodoro(&mut self, today: NaiveDate) {
        self.total_pomodoros += 1;

        if self.last_activity_date == Some(today) {
            self.today_pomodoros += 1;
        } else {
            let yesterday = today.pred_opt();
            if self.last_activity_date.is_some() && self.last_activity_date == yesterday {
                self.current_streak += 1;
            } else {
                self.current_streak = 1;
            }
            self.today_pomodoros = 1;
            self.last_activity_date = Some(today);
        }

        let week = week_start(today);
        match self.weekly_data.iter_mut().find(|w| w.week == week) {
            Some(entry) => entry.pomodoros += 1,
            None => self.weekly_data.push(WeekTotal { week, pomodoros: 1 }),
        }
        self.week_pomodoros = self
            .weekly_data
            .iter()
            .find(|w| w.week == week)
            .map(|w| w.pomodoros)
            .unwrap_or(0);

        if self.weekly_data.len() > WEEKS_RETAINED {
            let excess = self.weekly_data.len() - WEEKS_RETAINED;
            self.weekly_data.drain(..excess);
        }
    }

    /// Bring day/week counters up to date at startup.
    ///
    /// A gap of more than one day breaks the streak; any new day resets the
    /// daily counter.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if let Some(last) = self.last_activity_date {
            if last != today {
                if Some(last) != today.pred_opt() {
                    self.current_streak = 0;
                }
                self.today_pomodoros = 0;
            }
        }

        let week = week_start(today);
        self.week_pomodoros = self
            .weekly_data
            .iter()
            .find(|w| w.week == week)
            .map(|w| w.pomodoros)
            .unwrap_or(0);
    }
}
