//! Per-step retry with linear backoff.
//!
//! The controller wraps a whole step invocation, not individual branches
//! inside it. Attempts are strictly sequential and every attempt's outcome
//! is reported before deciding whether to retry.

use std::future::Future;
use std::time::Duration;

use crate::report::StepReporter;
use crate::types::{Step, StepOutcome, StepReport};

/// Linear backoff policy: `delay = base * attempt`.
///
/// Connection-level reconnects elsewhere use their own schedule; this one
/// only governs step attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Policy with no delay between attempts, for tests and dry runs.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Delay to sleep after a failed attempt number `attempt` (1-based).
    /// Non-decreasing in `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Drive `attempt_fn` up to the step's retry budget.
///
/// Success short-circuits; the final failure carries the last error. Each
/// attempt is reported with its attempt number and timestamp; reporting
/// failures are logged and never escalate to step failure.
pub async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    reporter: &dyn StepReporter,
    task_id: &str,
    step: &Step,
    mut attempt_fn: F,
) -> StepOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StepOutcome>,
{
    let retries = step.retries();
    let mut last = StepOutcome::fail("step was never attempted");

    for attempt in 1..=retries {
        let outcome = attempt_fn(attempt).await;

        let report = StepReport::from_outcome(
            task_id,
            step.id.clone(),
            step.name.clone(),
            &outcome,
            attempt,
        );
        if let Err(e) = reporter.report(report).await {
            tracing::warn!(
                task_id = %task_id,
                step_id = %step.id,
                attempt,
                error = %e,
                "step report dropped"
            );
        }

        if outcome.is_success() {
            return outcome;
        }

        tracing::debug!(
            task_id = %task_id,
            step_id = %step.id,
            attempt,
            of = retries,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "step attempt failed"
        );
        last = outcome;

        if attempt < retries {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    last
}
