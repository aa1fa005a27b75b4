//! Achievement book.

use serde::{Deserialize, Serialize};

use super::Statistics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    #[serde(default)]
    pub unlocked: bool,
    pub requirement: u32,
}

impl Achievement {
    fn new(id: &str, title: &str, description: &str, icon: &str, requirement: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            icon: icon.into(),
            unlocked: false,
            requirement,
        }
    }

    /// Progress value this achievement compares against its requirement.
    fn progress(&self, stats: &Statistics, completed_tasks: usize) -> Option<u32> {
        let value = match self.id.as_str() {
            "first_pomodoro" | "centurion" => stats.total_pomodoros,
            "daily_warrior" => stats.today_pomodoros,
            "week_champion" => stats.week_pomodoros,
            "streak_master" => stats.current_streak,
            "task_master" => u32::try_from(completed_tasks).unwrap_or(u32::MAX),
            _ => return None,
        };
        Some(value)
    }
}

/// All achievements with their unlock state. Serialized as a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AchievementBook {
    entries: Vec<Achievement>,
}

impl Default for AchievementBook {
    fn default() -> Self {
        Self {
            entries: vec![
                Achievement::new("first_pomodoro", "Getting Started", "Complete your first Pomodoro", "🍅", 1),
                Achievement::new("daily_warrior", "Daily Warrior", "Complete 5 Pomodoros in one day", "⚔️", 5),
                Achievement::new("week_champion", "Week Champion", "Complete 25 Pomodoros in one week", "🏆", 25),
                Achievement::new("streak_master", "Streak Master", "Maintain a 7-day streak", "🔥", 7),
                Achievement::new("centurion", "Centurion", "Complete 100 total Pomodoros", "💯", 100),
                Achievement::new("task_master", "Task Master", "Complete 10 tasks", "✅", 10),
            ],
        }
    }
}

impl AchievementBook {
    pub fn iter(&self) -> impl Iterator<Item = &Achievement> {
        self.entries.iter()
    }

    pub fn unlocked_count(&self) -> usize {
        self.entries.iter().filter(|a| a.unlocked).count()
    }

    /// Rebuild from a persisted list: known definitions keep their current
    /// text and pick up the stored unlock flag; unknown ids are dropped.
    pub fn merge_saved(saved: &[Achievement]) -> Self {
        let mut book = Self::default();
        for entry in &mut book.entries {
            entry.unlocked = saved.iter().any(|s| s.id == entry.id && s.unlocked);
        }
        book
    }

    /// Unlock every achievement whose requirement is now met and return the
    /// newly unlocked ones.
    pub fn check(&mut self, stats: &Statistics, completed_tasks: usize) -> Vec<Achievement> {
        let mut unlocked = Vec::new();
        for entry in self.entries.iter_mut().filter(|a| !a.unlocked) {
            let met = entry
                .progress(stats, completed_tasks)
                .is_some_and(|value| value >= entry.requirement);
            if met {
                entry.unlocked = true;
                unlocked.push(entry.clone());
            }
        }
        unlocked
    }
}
