//! Persisted task monitoring state.
//!
//! `TaskPollingState` is owned by the background monitor and shared by read
//! with any number of observers. It deliberately survives the UI that
//! started the task.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Monitor-level task state machine:
/// `planning -> executing -> waiting -> (complete | error)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Planning,
    Executing,
    /// Human intervention required; polling continues.
    Waiting,
    Complete,
    Error,
}

impl MonitorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Durable per-task monitoring snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPollingState {
    pub task_id: String,
    pub status: MonitorStatus,
    /// 0..=100
    pub progress: u8,
    pub current_step: String,
    pub message: String,
    /// Bounded log of recent activity, oldest first.
    #[serde(default)]
    pub thought_process: VecDeque<String>,
    pub last_updated: DateTime<Utc>,
}

impl TaskPollingState {
    /// Fresh state for a task just handed to background monitoring.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: MonitorStatus::Planning,
            progress: 0,
            current_step: String::new(),
            message: String::new(),
            thought_process: VecDeque::new(),
            last_updated: Utc::now(),
        }
    }

    /// Append a log line, evicting the oldest entries beyond `depth`.
    pub fn push_thought(&mut self, line: impl Into<String>, depth: usize) {
        let depth = depth.max(1);
        while self.thought_process.len() >= depth {
            self.thought_process.pop_front();
        }
        self.thought_process.push_back(line.into());
    }

    /// Refresh the last-updated timestamp.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Time since the last update.
    pub fn age(&self) -> Duration {
        Utc::now() - self.last_updated
    }

    /// Clamp and set progress.
    pub fn set_progress(&mut self, percent: f32) {
        self.progress = percent.clamp(0.0, 100.0).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thought_log_is_bounded() {
        let mut state = TaskPollingState::new("t1");
        for i in 0..8 {
            state.push_thought(format!("tick {i}"), 5);
        }
        assert_eq!(state.thought_process.len(), 5);
        assert_eq!(state.thought_process.front().unwrap(), "tick 3");
        assert_eq!(state.thought_process.back().unwrap(), "tick 7");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(MonitorStatus::Complete.is_terminal());
        assert!(MonitorStatus::Error.is_terminal());
        assert!(!MonitorStatus::Waiting.is_terminal());
        assert!(!MonitorStatus::Executing.is_terminal());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut state = TaskPollingState::new("t1");
        state.set_progress(140.0);
        assert_eq!(state.progress, 100);
        state.set_progress(-3.0);
        assert_eq!(state.progress, 0);
    }
}
