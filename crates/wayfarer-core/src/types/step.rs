//! Step type definitions
//!
//! Step represents one typed, parameterized unit of work in a task graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Strongly-typed Step ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Closed set of actions the step interpreter knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Extract,
    Wait,
    Search,
    Scrape,
    Parse,
    Loop,
    Verify,
    Submit,
    Apply,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::Extract => "extract",
            Self::Wait => "wait",
            Self::Search => "search",
            Self::Scrape => "scrape",
            Self::Parse => "parse",
            Self::Loop => "loop",
            Self::Verify => "verify",
            Self::Submit => "submit",
            Self::Apply => "apply",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step lifecycle states.
///
/// `pending -> running -> (completed | failed | skipped)` is the normal
/// path. `paused` and `cancelled` are reachable only through external
/// intervention, never set by the interpreter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Paused,
    Cancelled,
}

impl StepStatus {
    /// True once the step can no longer change state on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// True when the step ended without failing (ran to completion or was
    /// legitimately passed over).
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// A single node in the task graph.
///
/// Immutable once scheduled except for `status`, `error` and `duration_ms`,
/// which are written only by the scheduler and the step driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within the graph
    pub id: StepId,
    /// Human-readable name, surfaced in progress reporting
    pub name: String,
    /// What to do
    pub action: ActionKind,
    /// Action-specific parameters, validated at the interpreter boundary
    #[serde(default)]
    pub payload: Value,
    /// IDs of steps that must resolve before this one may start
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    /// Current lifecycle state
    #[serde(default)]
    pub status: StepStatus,
    /// Last error message, if the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the last execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Step {
    /// Create a new pending step.
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, action: ActionKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action,
            payload: Value::Null,
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            error: None,
            duration_ms: None,
        }
    }

    /// Set the action payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<StepId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Retry budget for this step, read from the payload (default 1).
    pub fn retries(&self) -> u32 {
        self.payload
            .get("retries")
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }
}
