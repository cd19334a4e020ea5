//! Step outcome and reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::step::StepId;

/// Result of interpreting one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    /// Success with no data.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Success carrying extracted data.
    pub fn ok_with(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failure with an error message.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Execution metadata attached to a reported attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMeta {
    /// 1-based attempt number within the retry loop
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl StepMeta {
    pub fn for_attempt(attempt: u32) -> Self {
        Self {
            attempt,
            timestamp: Utc::now(),
        }
    }
}

/// Wire shape pushed to the reporting collaborator for every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub task_id: String,
    pub step_id: StepId,
    pub step_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub meta: StepMeta,
}

impl StepReport {
    /// Package an attempt outcome for reporting.
    pub fn from_outcome(
        task_id: impl Into<String>,
        step_id: StepId,
        step_name: impl Into<String>,
        outcome: &StepOutcome,
        attempt: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            step_id,
            step_name: step_name.into(),
            success: outcome.success,
            data: outcome.data.clone(),
            error: outcome.error.clone(),
            meta: StepMeta::for_attempt(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_constructors() {
        assert!(StepOutcome::ok().is_success());
        let with_data = StepOutcome::ok_with(json!({"total": 3}));
        assert_eq!(with_data.data.unwrap()["total"], 3);

        let failed = StepOutcome::fail("element not found: #x");
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("element not found: #x"));
    }

    #[test]
    fn test_report_carries_attempt_meta() {
        let outcome = StepOutcome::fail("boom");
        let report = StepReport::from_outcome("t1", "s1".into(), "click", &outcome, 2);
        assert_eq!(report.meta.attempt, 2);
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("boom"));
    }
}
