//! Step driver: interpreter + retry + reporting, plus the tagged command
//! surface a controlling process dispatches through.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::interpreter::{InterpreterConfig, StepInterpreter};
use crate::page::PageContext;
use crate::report::{NoopReporter, StepReporter};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::types::{Step, StepId, StepOutcome};

use super::StepExecutor;

/// Commands accepted from a controlling process. Closed tagged set; each
/// variant has exactly one handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Run one step through the retry controller.
    ExecuteStep { task_id: String, step: Step },
    /// Run steps strictly in order, stopping at the first failure.
    ExecuteSteps { task_id: String, steps: Vec<Step> },
}

/// One executed step within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct StepRun {
    pub step_id: StepId,
    pub outcome: StepOutcome,
}

/// Result of a batch command.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub runs: Vec<StepRun>,
    /// Set when the batch stopped early on a failed step.
    pub halted_on: Option<StepId>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.halted_on.is_none()
    }
}

/// Production [`StepExecutor`]: wraps the interpreter with per-step retry
/// and best-effort reporting.
pub struct StepDriver {
    interpreter: StepInterpreter,
    policy: RetryPolicy,
    reporter: Arc<dyn StepReporter>,
}

impl StepDriver {
    pub fn new(page: Arc<dyn PageContext>) -> Self {
        Self {
            interpreter: StepInterpreter::new(page),
            policy: RetryPolicy::default(),
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_interpreter_config(page: Arc<dyn PageContext>, config: InterpreterConfig) -> Self {
        Self {
            interpreter: StepInterpreter::with_config(page, config),
            policy: RetryPolicy::default(),
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StepReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run a batch of steps sequentially, stopping on the first failure.
    pub async fn execute_steps(&self, task_id: &str, steps: &[Step]) -> BatchOutcome {
        let mut runs = Vec::with_capacity(steps.len());
        for step in steps {
            let outcome = self.execute(task_id, step).await;
            let failed = !outcome.is_success();
            runs.push(StepRun {
                step_id: step.id.clone(),
                outcome,
            });
            if failed {
                tracing::info!(
                    task_id = %task_id,
                    step_id = %step.id,
                    "batch halted on failed step"
                );
                return BatchOutcome {
                    runs,
                    halted_on: Some(step.id.clone()),
                };
            }
        }
        BatchOutcome {
            runs,
            halted_on: None,
        }
    }

    /// Handle one dispatched command.
    pub async fn handle(&self, command: Command) -> BatchOutcome {
        match command {
            Command::ExecuteStep { task_id, step } => {
                let outcome = self.execute(&task_id, &step).await;
                let halted_on = (!outcome.is_success()).then(|| step.id.clone());
                BatchOutcome {
                    runs: vec![StepRun {
                        step_id: step.id,
                        outcome,
                    }],
                    halted_on,
                }
            }
            Command::ExecuteSteps { task_id, steps } => self.execute_steps(&task_id, &steps).await,
        }
    }
}

#[async_trait]
impl StepExecutor for StepDriver {
    async fn execute(&self, task_id: &str, step: &Step) -> StepOutcome {
        run_with_retry(&self.policy, self.reporter.as_ref(), task_id, step, |_| {
            self.interpreter.execute(task_id, step)
        })
        .await
    }
}
