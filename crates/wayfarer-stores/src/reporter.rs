//! StepReporter implementations.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

use wayfarer_core::report::{ReportError, StepReporter};
use wayfarer_core::types::StepReport;

/// Records every report in memory. For development and testing.
pub struct MemoryReporter {
    reports: Mutex<Vec<StepReport>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything reported so far.
    pub fn reports(&self) -> Vec<StepReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|reports| reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepReporter for MemoryReporter {
    async fn report(&self, report: StepReport) -> Result<(), ReportError> {
        self.reports
            .lock()
            .map_err(|e| ReportError::Transport(e.to_string()))?
            .push(report);
        Ok(())
    }
}

/// Pushes reports to an external persistence endpoint.
///
/// Strictly best-effort: callers already swallow errors, and nothing here
/// blocks or fails a step.
pub struct HttpReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl StepReporter for HttpReporter {
    async fn report(&self, report: StepReport) -> Result<(), ReportError> {
        let body = json!({
            "action": "stepResult",
            "task_id": report.task_id,
            "step_id": report.step_id,
            "step_name": report.step_name,
            "success": report.success,
            "data": report.data,
            "error": report.error,
            "meta": report.meta,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReportError::Rejected(format!(
                "{} from {}",
                response.status(),
                self.endpoint
            )));
        }

        tracing::debug!(
            task_id = %report.task_id,
            step_id = %report.step_id,
            attempt = report.meta.attempt,
            "step report delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::types::{StepOutcome, StepReport};

    #[test]
    fn test_memory_reporter_records_in_order() {
        tokio_test::block_on(async {
            let reporter = MemoryReporter::new();
            for attempt in 1..=3 {
                let outcome = StepOutcome::fail("still broken");
                let report =
                    StepReport::from_outcome("t1", "s1".into(), "click", &outcome, attempt);
                reporter.report(report).await.unwrap();
            }

            let reports = reporter.reports();
            assert_eq!(reports.len(), 3);
            let attempts: Vec<u32> = reports.iter().map(|r| r.meta.attempt).collect();
            assert_eq!(attempts, vec![1, 2, 3]);
        });
    }
}
