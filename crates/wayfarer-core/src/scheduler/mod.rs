//! Task graph scheduler
//!
//! Owns graph-traversal state for the duration of one run: validates the
//! graph, resolves dependency readiness round by round, and dispatches
//! ready nodes level-parallel. A node never starts before every dependency
//! has completed; dependents of a failed node are skipped, transitively.

mod driver;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::types::{GraphError, Step, StepId, StepOutcome, StepStatus, TaskGraph};

pub use driver::{BatchOutcome, Command, StepDriver, StepRun};

/// Seam between scheduling and step execution. The production implementation
/// is [`StepDriver`]; tests substitute recording executors.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, task_id: &str, step: &Step) -> StepOutcome;
}

/// Result of one whole-graph run.
#[derive(Debug)]
pub struct GraphRunReport {
    /// Unique id for this run.
    pub run_id: String,
    /// Final status per step.
    pub statuses: HashMap<StepId, StepStatus>,
    /// Outcome per dispatched step.
    pub outcomes: HashMap<StepId, StepOutcome>,
    /// Steps in the order they were handed to the executor.
    pub dispatch_order: Vec<StepId>,
}

impl GraphRunReport {
    pub fn status_of(&self, id: &StepId) -> Option<StepStatus> {
        self.statuses.get(id).copied()
    }

    pub fn outcome_of(&self, id: &StepId) -> Option<&StepOutcome> {
        self.outcomes.get(id)
    }

    /// True when every step either completed or was legitimately skipped.
    pub fn success(&self) -> bool {
        self.statuses.values().all(|status| status.is_resolved())
    }
}

/// Drives a validated task graph to completion.
pub struct GraphRunner {
    executor: Arc<dyn StepExecutor>,
    cancellation: CancellationToken,
}

impl GraphRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            executor,
            cancellation: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token. Cancelling stops further
    /// dispatch; in-flight steps run to completion.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Execute the whole graph. Structural defects (including cycles) are
    /// surfaced before any node runs.
    pub async fn run(&self, task_id: &str, graph: &TaskGraph) -> Result<GraphRunReport, GraphError> {
        graph.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let deps = graph.resolved_dependencies();
        let mut statuses: HashMap<StepId, StepStatus> = graph
            .nodes
            .iter()
            .map(|step| (step.id.clone(), StepStatus::Pending))
            .collect();
        let mut outcomes: HashMap<StepId, StepOutcome> = HashMap::new();
        let mut dispatch_order: Vec<StepId> = Vec::new();

        tracing::info!(
            task_id = %task_id,
            run_id = %run_id,
            steps = graph.nodes.len(),
            "starting graph run"
        );

        loop {
            if self.cancellation.is_cancelled() {
                for status in statuses.values_mut() {
                    if *status == StepStatus::Pending {
                        *status = StepStatus::Cancelled;
                    }
                }
                tracing::info!(task_id = %task_id, run_id = %run_id, "graph run cancelled");
                break;
            }

            self.propagate_skips(graph, &deps, &mut statuses);

            let ready: Vec<&Step> = graph
                .nodes
                .iter()
                .filter(|step| {
                    statuses.get(&step.id) == Some(&StepStatus::Pending)
                        && deps
                            .get(&step.id)
                            .map(|list| {
                                list.iter().all(|dep| {
                                    statuses.get(dep) == Some(&StepStatus::Completed)
                                })
                            })
                            .unwrap_or(true)
                })
                .collect();

            if ready.is_empty() {
                let unresolved = statuses
                    .iter()
                    .find(|(_, status)| !status.is_terminal())
                    .map(|(id, _)| id.to_string());
                if let Some(stuck) = unresolved {
                    // validate() makes this unreachable, but a scheduling
                    // round that cannot progress must not spin forever.
                    return Err(GraphError::CycleDetected(stuck));
                }
                break;
            }

            for step in &ready {
                statuses.insert(step.id.clone(), StepStatus::Running);
                dispatch_order.push(step.id.clone());
            }
            tracing::debug!(
                task_id = %task_id,
                run_id = %run_id,
                level = ?ready.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "dispatching level"
            );

            // Nodes in the same level have no mutual ordering; overlap their
            // waits. DOM mutations still serialize inside the page context.
            let mut handles = Vec::with_capacity(ready.len());
            for step in &ready {
                let executor = Arc::clone(&self.executor);
                let task_id = task_id.to_string();
                let step = (*step).clone();
                let id = step.id.clone();
                handles.push((
                    id,
                    tokio::spawn(async move { executor.execute(&task_id, &step).await }),
                ));
            }

            for (id, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => StepOutcome::fail(format!("step execution aborted: {e}")),
                };
                let status = if outcome.is_success() {
                    StepStatus::Completed
                } else {
                    StepStatus::Failed
                };
                statuses.insert(id.clone(), status);
                outcomes.insert(id, outcome);
            }
        }

        let report = GraphRunReport {
            run_id,
            statuses,
            outcomes,
            dispatch_order,
        };
        tracing::info!(
            task_id = %task_id,
            run_id = %report.run_id,
            success = report.success(),
            dispatched = report.dispatch_order.len(),
            "graph run finished"
        );
        Ok(report)
    }

    /// Mark pending nodes whose dependencies failed, were skipped or were
    /// cancelled as skipped, until no more change. They are never
    /// dispatched.
    fn propagate_skips(
        &self,
        graph: &TaskGraph,
        deps: &HashMap<StepId, Vec<StepId>>,
        statuses: &mut HashMap<StepId, StepStatus>,
    ) {
        loop {
            let mut changed = false;
            for step in &graph.nodes {
                if statuses.get(&step.id) != Some(&StepStatus::Pending) {
                    continue;
                }
                let blocked = deps
                    .get(&step.id)
                    .map(|list| {
                        list.iter().any(|dep| {
                            matches!(
                                statuses.get(dep),
                                Some(StepStatus::Failed)
                                    | Some(StepStatus::Skipped)
                                    | Some(StepStatus::Cancelled)
                            )
                        })
                    })
                    .unwrap_or(false);
                if blocked {
                    tracing::debug!(
                        step_id = %step.id,
                        "skipping step due to unresolved prerequisite"
                    );
                    statuses.insert(step.id.clone(), StepStatus::Skipped);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, GraphEdge};
    use std::sync::Mutex;

    /// Executor that records dispatch order and fails configured steps.
    struct ScriptedExecutor {
        trace: Mutex<Vec<StepId>>,
        failing: Vec<StepId>,
    }

    impl ScriptedExecutor {
        fn new(failing: &[&str]) -> Self {
            Self {
                trace: Mutex::new(Vec::new()),
                failing: failing.iter().map(|id| StepId::from(*id)).collect(),
            }
        }

        fn trace(&self) -> Vec<StepId> {
            self.trace.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, _task_id: &str, step: &Step) -> StepOutcome {
            self.trace.lock().unwrap().push(step.id.clone());
            if self.failing.contains(&step.id) {
                StepOutcome::fail("scripted failure")
            } else {
                StepOutcome::ok()
            }
        }
    }

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, id, ActionKind::Wait)
            .with_dependencies(deps.iter().map(|d| StepId::from(*d)).collect())
    }

    #[test]
    fn test_runs_levels_in_dependency_order() {
        tokio_test::block_on(async {
            let executor = Arc::new(ScriptedExecutor::new(&[]));
            let runner = GraphRunner::new(Arc::clone(&executor) as Arc<dyn StepExecutor>);
            let graph = TaskGraph::from_nodes(vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ]);

            let report = runner.run("t1", &graph).await.unwrap();
            assert!(report.success());

            let trace = executor.trace();
            let pos = |id: &str| trace.iter().position(|s| s.as_str() == id).unwrap();
            assert!(pos("a") < pos("b"));
            assert!(pos("a") < pos("c"));
            assert!(pos("b") < pos("d"));
            assert!(pos("c") < pos("d"));
        });
    }

    #[test]
    fn test_cycle_rejected_before_any_dispatch() {
        tokio_test::block_on(async {
            let executor = Arc::new(ScriptedExecutor::new(&[]));
            let runner = GraphRunner::new(Arc::clone(&executor) as Arc<dyn StepExecutor>);
            let graph = TaskGraph::from_nodes(vec![step("a", &["b"]), step("b", &["a"])]);

            let result = runner.run("t1", &graph).await;
            assert!(matches!(result, Err(GraphError::CycleDetected(_))));
            assert!(executor.trace().is_empty());
        });
    }

    #[test]
    fn test_failed_dependency_skips_dependents_transitively() {
        tokio_test::block_on(async {
            let executor = Arc::new(ScriptedExecutor::new(&["b"]));
            let runner = GraphRunner::new(Arc::clone(&executor) as Arc<dyn StepExecutor>);
            let graph = TaskGraph::from_nodes(vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["b"]),
                step("d", &["c"]),
                step("e", &["a"]),
            ]);

            let report = runner.run("t1", &graph).await.unwrap();
            assert_eq!(report.status_of(&"b".into()), Some(StepStatus::Failed));
            assert_eq!(report.status_of(&"c".into()), Some(StepStatus::Skipped));
            assert_eq!(report.status_of(&"d".into()), Some(StepStatus::Skipped));
            // Independent branch still runs.
            assert_eq!(report.status_of(&"e".into()), Some(StepStatus::Completed));
            assert!(!report.success());

            // Skipped steps never reach the executor.
            let trace = executor.trace();
            assert!(!trace.iter().any(|id| id.as_str() == "c" || id.as_str() == "d"));
        });
    }

    #[test]
    fn test_edges_participate_in_scheduling() {
        tokio_test::block_on(async {
            let executor = Arc::new(ScriptedExecutor::new(&[]));
            let runner = GraphRunner::new(Arc::clone(&executor) as Arc<dyn StepExecutor>);
            let graph = TaskGraph::new(
                vec![step("a", &[]), step("b", &[])],
                vec![GraphEdge::new("a", "b")],
            );

            let report = runner.run("t1", &graph).await.unwrap();
            assert!(report.success());
            let trace = executor.trace();
            assert_eq!(trace[0], "a");
            assert_eq!(trace[1], "b");
        });
    }

    #[test]
    fn test_cancellation_stops_further_dispatch() {
        tokio_test::block_on(async {
            let executor = Arc::new(ScriptedExecutor::new(&[]));
            let runner = GraphRunner::new(Arc::clone(&executor) as Arc<dyn StepExecutor>);
            runner.cancellation_token().cancel();

            let graph = TaskGraph::from_nodes(vec![step("a", &[]), step("b", &["a"])]);
            let report = runner.run("t1", &graph).await.unwrap();

            assert!(executor.trace().is_empty());
            assert_eq!(report.status_of(&"a".into()), Some(StepStatus::Cancelled));
            assert_eq!(report.status_of(&"b".into()), Some(StepStatus::Cancelled));
            assert!(!report.success());
        });
    }
}
