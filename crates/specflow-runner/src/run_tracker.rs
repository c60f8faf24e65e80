use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of one coordinated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Final (or current) record of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub id: String,
    pub status: TaskStatus,
    /// Output of the final execution attempt.
    pub output: String,
    /// Every line streamed by this task, across retry attempts.
    pub lines: Vec<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskOutcome {
    fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: TaskStatus::Pending,
            output: String::new(),
            lines: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Results map shared by coordinator workers, keyed by task id.
///
/// Callers wrap it in a mutex; every transition is a read-modify-write.
pub struct RunTracker {
    tasks: HashMap<String, TaskOutcome>,
}

impl RunTracker {
    /// Register every task as pending.
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            tasks: ids
                .into_iter()
                .map(|id| (id.to_string(), TaskOutcome::pending(id)))
                .collect(),
        }
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(t) = self.tasks.get_mut(id) {
            t.status = TaskStatus::Running;
            t.started_at = Some(Utc::now());
        }
    }

    pub fn mark_cancelled(&mut self, id: &str) {
        if let Some(t) = self.tasks.get_mut(id) {
            t.status = TaskStatus::Cancelled;
            t.finished_at = Some(Utc::now());
        }
    }

    /// Record the terminal state of a task that ran.
    pub fn finish(
        &mut self,
        id: &str,
        succeeded: bool,
        output: String,
        lines: Vec<String>,
        error: Option<String>,
    ) {
        if let Some(t) = self.tasks.get_mut(id) {
            t.status = if succeeded {
                TaskStatus::Succeeded
            } else {
                TaskStatus::Failed
            };
            t.output = output;
            t.lines = lines;
            t.error = error;
            t.finished_at = Some(Utc::now());
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    /// Remove and return the outcome for `id`.
    pub fn take(&mut self, id: &str) -> Option<TaskOutcome> {
        self.tasks.remove(id)
    }
}
