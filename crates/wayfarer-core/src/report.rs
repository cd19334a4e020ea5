//! Step result reporting.
//!
//! Reporting is a one-way, best-effort push to an external collaborator.
//! A failed report is logged and swallowed; it never fails the step.

use async_trait::async_trait;
use thiserror::Error;

pub use crate::types::StepReport;

/// Reporting failures. Callers log these and carry on.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("collaborator rejected report: {0}")]
    Rejected(String),
}

/// Sink for per-attempt step reports.
#[async_trait]
pub trait StepReporter: Send + Sync {
    async fn report(&self, report: StepReport) -> Result<(), ReportError>;
}

/// Reporter that discards everything.
pub struct NoopReporter;

#[async_trait]
impl StepReporter for NoopReporter {
    async fn report(&self, _report: StepReport) -> Result<(), ReportError> {
        Ok(())
    }
}
