//! Task list.
//!
//! Tasks are estimated in pomodoros. Each completed focus session is
//! credited to the first open task that still has pomodoros outstanding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub required_pomodoros: u32,
    #[serde(default)]
    pub completed_pomodoros: u32,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new open task. A zero estimate is raised to one pomodoro.
    pub fn new(name: impl Into<String>, required_pomodoros: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            required_pomodoros: required_pomodoros.max(1),
            completed_pomodoros: 0,
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// Still accepting pomodoros.
    pub fn is_open(&self) -> bool {
        !self.completed && self.completed_pomodoros < self.required_pomodoros
    }
}

/// Ordered collection of tasks, serialized as a plain JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    /// Append a task. The name is trimmed and must not be empty.
    ///
    /// # Errors
    /// Returns [`ValidationError::Empty`] for a blank name.
    pub fn add(&mut self, name: &str, required_pomodoros: u32) -> Result<&Task, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "name".into(),
            });
        }
        self.tasks.push(Task::new(name, required_pomodoros));
        let last = self.tasks.len() - 1;
        Ok(&self.tasks[last])
    }

    /// Remove a task. Returns the removed task, if any.
    pub fn delete(&mut self, id: &str) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(pos))
    }

    /// Flip the completed flag. Returns the new flag.
    ///
    /// # Errors
    /// Returns [`ValidationError::NotFound`] when no task has `id`.
    pub fn toggle(&mut self, id: &str) -> Result<bool, ValidationError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ValidationError::NotFound {
                kind: "task".into(),
                id: id.to_string(),
            })?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    /// Drop every task and return how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }

    /// Credit one pomodoro to the first open task.
    ///
    /// The task completes once its estimate is reached. Returns the id of
    /// the credited task.
    pub fn assign_pomodoro(&mut self) -> Option<String> {
        let task = self.tasks.iter_mut().find(|t| t.is_open())?;
        task.completed_pomodoros += 1;
        if task.completed_pomodoros >= task.required_pomodoros {
            task.completed = true;
        }
        Some(task.id.clone())
    }
}
