//! Lifecycle statuses and priorities shared by jobs, stages and tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, no task claimed yet
    Pending,
    /// At least one task has been claimed
    InProgress,
    /// Every task of every stage completed
    Completed,
    /// A task failed terminally
    Failed,
}

/// Stage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// No task claimed yet
    Pending,
    /// At least one task has been claimed
    InProgress,
    /// Every task completed
    Completed,
    /// A task failed terminally
    Failed,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created but not yet queued
    Created,
    /// Waiting to be claimed
    Pending,
    /// Claimed by a worker
    InProgress,
    /// Handler succeeded
    Completed,
    /// Attempts exhausted
    Failed,
    /// Failed attempt, waiting to be requeued
    Retried,
}

impl TaskStatus {
    /// Whether the engine will never hand this task out again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Created => write!(f, "CREATED"),
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Retried => write!(f, "RETRIED"),
        }
    }
}

/// Job priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Highest
    VeryHigh,
    /// High
    High,
    /// Normal
    #[default]
    Medium,
    /// Low
    Low,
    /// Lowest
    VeryLow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!(TaskStatus::InProgress.to_string(), "IN_PROGRESS");

        let priority: Priority = serde_json::from_str("\"VERY_HIGH\"").unwrap();
        assert_eq!(priority, Priority::VeryHigh);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Retried.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }
}
