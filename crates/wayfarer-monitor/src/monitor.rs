//! Persistent task monitor.
//!
//! State machine per task: `planning -> executing -> waiting -> complete |
//! error`. The monitor is the single writer of persisted task state; its
//! poll tick (and the explicit step-report handler) are the only mutation
//! paths. Any number of observers read through `get_task_state`.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use wayfarer_core::store::{StoreError, TaskStateStore};
use wayfarer_core::types::{MonitorStatus, StepReport, TaskPollingState};

use crate::config::MonitorConfig;
use crate::notify::{Notification, Notifier};
use crate::registry::TaskRegistry;
use crate::status::{StatusClient, StatusPoll};

/// Monitor-level failures.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What startup recovery did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Non-terminal tasks forced to error because they went stale.
    pub stale: usize,
    /// Non-terminal tasks whose polling resumed transparently.
    pub resumed: usize,
}

/// Outcome of one poll tick.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickFlow {
    Continue,
    Stop,
}

/// Long-lived monitor for one or more in-flight tasks.
///
/// Cheap to clone; clones share the same store, registry and sinks.
#[derive(Clone)]
pub struct TaskMonitor {
    store: Arc<dyn TaskStateStore>,
    client: Arc<dyn StatusClient>,
    notifier: Arc<dyn Notifier>,
    registry: TaskRegistry,
    config: MonitorConfig,
}

impl TaskMonitor {
    pub fn new(
        store: Arc<dyn TaskStateStore>,
        client: Arc<dyn StatusClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            registry: TaskRegistry::new(),
            config: MonitorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Monitor backed by the in-memory store, for development and tests.
    pub fn in_memory(client: Arc<dyn StatusClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            Arc::new(wayfarer_stores::InMemoryTaskStateStore::new()),
            client,
            notifier,
        )
    }

    /// Hand a task to background monitoring. Persists initial state and
    /// spawns a fixed-interval poll loop that outlives any caller. A task
    /// already being watched is left alone.
    pub async fn watch(&self, task_id: &str) -> Result<(), MonitorError> {
        let Some(token) = self.registry.start(task_id).await else {
            tracing::debug!(task_id = %task_id, "task already watched");
            return Ok(());
        };

        if let Err(e) = self.persist_initial_state(task_id).await {
            // Release the claim so a later watch can try again.
            self.registry.stop(task_id).await;
            return Err(e);
        }

        tracing::info!(
            task_id = %task_id,
            interval_ms = self.config.poll_interval_ms,
            "task handed to background monitoring"
        );

        let monitor = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            monitor.poll_loop(task_id, token).await;
        });
        Ok(())
    }

    async fn persist_initial_state(&self, task_id: &str) -> Result<(), MonitorError> {
        let state = match self.store.get(task_id).await? {
            Some(existing) if !existing.status.is_terminal() => existing,
            _ => TaskPollingState::new(task_id),
        };
        self.store.put(&state).await?;
        Ok(())
    }

    async fn poll_loop(self, task_id: String, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        let mut attempts: u32 = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(task_id = %task_id, "poller cancelled");
                    break;
                }
                _ = interval.tick() => {
                    attempts += 1;
                    match self.poll_tick(&task_id, attempts).await {
                        Ok(TickFlow::Continue) => {}
                        Ok(TickFlow::Stop) => break,
                        Err(e) => {
                            // Store trouble is transient from the poller's
                            // point of view; keep ticking.
                            tracing::warn!(task_id = %task_id, error = %e, "poll tick failed");
                        }
                    }
                }
            }
        }
    }

    /// One poll round. Separated from the loop so the terminal/notification
    /// ordering is testable without timers.
    pub(crate) async fn poll_tick(
        &self,
        task_id: &str,
        attempt: u32,
    ) -> Result<TickFlow, MonitorError> {
        let Some(mut state) = self.store.get(task_id).await? else {
            tracing::warn!(task_id = %task_id, "state disappeared; stopping poller");
            self.registry.stop(task_id).await;
            return Ok(TickFlow::Stop);
        };

        if state.status.is_terminal() {
            // Already terminal, e.g. a racing tick got there first. The
            // notification has fired; never fire it again.
            self.registry.stop(task_id).await;
            return Ok(TickFlow::Stop);
        }

        if attempt > self.config.max_poll_attempts {
            state.status = MonitorStatus::Error;
            state.message = format!(
                "backend did not reach a terminal state within {} polls",
                self.config.max_poll_attempts
            );
            state.push_thought("polling ceiling reached", self.config.thought_log_depth);
            state.touch();
            self.registry.stop(task_id).await;
            self.store.put(&state).await?;
            self.notify_terminal(&state).await;
            return Ok(TickFlow::Stop);
        }

        let poll = match self.client.fetch(task_id).await {
            Ok(poll) => poll,
            Err(e) => {
                tracing::warn!(task_id = %task_id, attempt, error = %e, "status poll failed");
                return Ok(TickFlow::Continue);
            }
        };

        self.apply_poll(&mut state, &poll);
        state.touch();

        let terminal = state.status.is_terminal();
        if terminal {
            // Stop polling before the notification so a duplicate terminal
            // response cannot fire twice.
            self.registry.stop(task_id).await;
        }
        self.store.put(&state).await?;

        if terminal {
            self.notify_terminal(&state).await;
            return Ok(TickFlow::Stop);
        }
        Ok(TickFlow::Continue)
    }

    /// Merge a poll response into persisted state. Missing fields keep the
    /// previous value.
    fn apply_poll(&self, state: &mut TaskPollingState, poll: &StatusPoll) {
        if let Some(raw) = poll.status.as_deref() {
            match map_status(raw) {
                Some(mapped) => state.status = mapped,
                None => {
                    tracing::warn!(task_id = %state.task_id, status = raw, "unknown status value");
                }
            }
        }
        if let Some(percent) = poll.progress_percent {
            state.set_progress(percent);
        }
        if let Some(step) = &poll.current_step {
            state.current_step = step.clone();
        }
        if let Some(message) = &poll.message {
            state.message = message.clone();
        }
        if let Some(error) = &poll.error_message {
            state.message = error.clone();
        }

        let entry = if !state.current_step.is_empty() {
            state.current_step.clone()
        } else if !state.message.is_empty() {
            state.message.clone()
        } else {
            "waiting for status".to_string()
        };
        state.push_thought(entry, self.config.thought_log_depth);
    }

    async fn notify_terminal(&self, state: &TaskPollingState) {
        let (title, fallback) = match state.status {
            MonitorStatus::Complete => ("Task complete", "The task finished successfully."),
            _ => ("Task failed", "The task ended with an error."),
        };
        let message = if state.message.is_empty() {
            fallback.to_string()
        } else {
            state.message.clone()
        };
        self.notifier
            .notify(Notification::new(title, message))
            .await;
    }

    /// Snapshot for any observer. Reads may lag a write by up to one poll
    /// interval.
    pub async fn get_task_state(
        &self,
        task_id: &str,
    ) -> Result<Option<TaskPollingState>, MonitorError> {
        Ok(self.store.get(task_id).await?)
    }

    /// Fold an externally reported step result into the task's state.
    pub async fn record_step(&self, report: &StepReport) -> Result<(), MonitorError> {
        let Some(mut state) = self.store.get(&report.task_id).await? else {
            return Ok(());
        };
        if state.status.is_terminal() {
            return Ok(());
        }

        state.current_step = report.step_name.clone();
        if !report.success {
            if let Some(error) = &report.error {
                state.message = error.clone();
            }
        }
        let verdict = if report.success { "ok" } else { "failed" };
        state.push_thought(
            format!("{}: {}", report.step_name, verdict),
            self.config.thought_log_depth,
        );
        state.touch();
        self.store.put(&state).await?;
        Ok(())
    }

    /// Startup recovery: stale non-terminal tasks are forced to `error` and
    /// not re-polled; fresh ones resume polling transparently.
    pub async fn recover(&self) -> Result<RecoverySummary, MonitorError> {
        let mut summary = RecoverySummary::default();
        for state in self.store.list().await? {
            if state.status.is_terminal() {
                continue;
            }

            if state.age() > self.config.stale_after() {
                let mut state = state;
                tracing::warn!(
                    task_id = %state.task_id,
                    age_secs = state.age().num_seconds(),
                    "recovered stale task; forcing error"
                );
                state.status = MonitorStatus::Error;
                state.message =
                    "task timed out: no progress while the monitor was offline".to_string();
                state.push_thought("marked stale at startup", self.config.thought_log_depth);
                state.touch();
                self.store.put(&state).await?;
                self.notify_terminal(&state).await;
                summary.stale += 1;
            } else {
                self.watch(&state.task_id).await?;
                summary.resumed += 1;
            }
        }
        Ok(summary)
    }

    /// Stop polling a task, leaving its persisted state in place.
    pub async fn stop(&self, task_id: &str) -> bool {
        self.registry.stop(task_id).await
    }

    /// Stop polling and clear the task's persisted state.
    pub async fn reset(&self, task_id: &str) -> Result<bool, MonitorError> {
        self.registry.stop(task_id).await;
        Ok(self.store.remove(task_id).await?)
    }

    pub async fn is_watching(&self, task_id: &str) -> bool {
        self.registry.has(task_id).await
    }
}

fn map_status(raw: &str) -> Option<MonitorStatus> {
    match raw {
        "completed" | "success" => Some(MonitorStatus::Complete),
        "failed" | "error" | "cancelled" => Some(MonitorStatus::Error),
        "waiting_intervention" => Some(MonitorStatus::Waiting),
        "planning" | "pending" => Some(MonitorStatus::Planning),
        "executing" | "running" => Some(MonitorStatus::Executing),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PollError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use wayfarer_core::types::{StepOutcome, StepReport};
    use wayfarer_stores::InMemoryTaskStateStore;

    /// Replays a scripted sequence of polls; repeats the last one forever.
    struct ScriptedClient {
        polls: Mutex<VecDeque<StatusPoll>>,
        last: Mutex<Option<StatusPoll>>,
    }

    impl ScriptedClient {
        fn new(polls: Vec<StatusPoll>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl StatusClient for ScriptedClient {
        async fn fetch(&self, _task_id: &str) -> Result<StatusPoll, PollError> {
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(poll) => {
                    *self.last.lock().unwrap() = Some(poll.clone());
                    Ok(poll)
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| PollError::Transport("no scripted polls left".to_string())),
            }
        }
    }

    struct CountingNotifier {
        count: AtomicUsize,
        last: Mutex<Option<Notification>>,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                count: AtomicUsize::new(0),
                last: Mutex::new(None),
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, notification: Notification) {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(notification);
        }
    }

    fn poll(status: &str) -> StatusPoll {
        StatusPoll {
            status: Some(status.to_string()),
            ..StatusPoll::default()
        }
    }

    fn quick_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 5,
            max_poll_attempts: 60,
            stale_after_secs: 3_600,
            thought_log_depth: 5,
        }
    }

    fn monitor_with(
        client: ScriptedClient,
        notifier: Arc<CountingNotifier>,
    ) -> (Arc<InMemoryTaskStateStore>, TaskMonitor) {
        let store = Arc::new(InMemoryTaskStateStore::new());
        let monitor = TaskMonitor::new(
            Arc::clone(&store) as Arc<dyn TaskStateStore>,
            Arc::new(client),
            notifier as Arc<dyn Notifier>,
        )
        .with_config(quick_config());
        (store, monitor)
    }

    #[test]
    fn test_terminal_poll_notifies_exactly_once() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            // Backend reports completed twice in a row (terminal race).
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("completed"), poll("completed")]),
                Arc::clone(&notifier),
            );
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            let first = monitor.poll_tick("t1", 1).await.unwrap();
            assert_eq!(first, TickFlow::Stop);
            assert_eq!(notifier.count(), 1);

            // A racing second tick sees terminal state and stays quiet.
            let second = monitor.poll_tick("t1", 2).await.unwrap();
            assert_eq!(second, TickFlow::Stop);
            assert_eq!(notifier.count(), 1);

            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Complete);
            assert!(!monitor.is_watching("t1").await);
        });
    }

    #[test]
    fn test_poll_ceiling_forces_timeout_error() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("executing")]),
                Arc::clone(&notifier),
            );
            let mut config = quick_config();
            config.max_poll_attempts = 2;
            let monitor = monitor.with_config(config);
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            assert_eq!(monitor.poll_tick("t1", 1).await.unwrap(), TickFlow::Continue);
            assert_eq!(monitor.poll_tick("t1", 2).await.unwrap(), TickFlow::Continue);
            assert_eq!(monitor.poll_tick("t1", 3).await.unwrap(), TickFlow::Stop);

            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Error);
            assert!(state.message.contains("terminal state within 2 polls"));
            assert_eq!(notifier.count(), 1);
        });
    }

    #[test]
    fn test_stale_task_forced_to_error_and_not_repolled() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("executing")]),
                Arc::clone(&notifier),
            );

            let mut stale = TaskPollingState::new("t-stale");
            stale.status = MonitorStatus::Executing;
            stale.last_updated = Utc::now() - chrono::Duration::hours(2);
            store.put(&stale).await.unwrap();

            let summary = monitor.recover().await.unwrap();
            assert_eq!(summary, RecoverySummary { stale: 1, resumed: 0 });

            let state = monitor.get_task_state("t-stale").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Error);
            assert!(state.message.contains("timed out"));
            assert!(!monitor.is_watching("t-stale").await);
            assert_eq!(notifier.count(), 1);
        });
    }

    #[test]
    fn test_recover_resumes_fresh_task() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("executing")]),
                Arc::clone(&notifier),
            );

            let mut fresh = TaskPollingState::new("t-fresh");
            fresh.status = MonitorStatus::Executing;
            store.put(&fresh).await.unwrap();

            let summary = monitor.recover().await.unwrap();
            assert_eq!(summary, RecoverySummary { stale: 0, resumed: 1 });
            assert!(monitor.is_watching("t-fresh").await);

            monitor.stop("t-fresh").await;
        });
    }

    #[test]
    fn test_missing_poll_fields_keep_previous_values() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![
                    StatusPoll {
                        status: Some("executing".to_string()),
                        progress_percent: Some(40.0),
                        current_step: Some("searching listings".to_string()),
                        message: Some("scanning results".to_string()),
                        error_message: None,
                    },
                    // Degraded response: only progress.
                    StatusPoll {
                        progress_percent: Some(55.0),
                        ..StatusPoll::default()
                    },
                ]),
                Arc::clone(&notifier),
            );
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            monitor.poll_tick("t1", 1).await.unwrap();
            monitor.poll_tick("t1", 2).await.unwrap();

            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Executing);
            assert_eq!(state.progress, 55);
            assert_eq!(state.current_step, "searching listings");
            assert_eq!(state.message, "scanning results");
        });
    }

    #[test]
    fn test_poll_errors_are_transient() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            // Empty script: every fetch errors.
            let (store, monitor) =
                monitor_with(ScriptedClient::new(vec![]), Arc::clone(&notifier));
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            assert_eq!(monitor.poll_tick("t1", 1).await.unwrap(), TickFlow::Continue);
            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Planning);
            assert_eq!(notifier.count(), 0);
        });
    }

    #[test]
    fn test_waiting_intervention_keeps_polling() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("waiting_intervention"), poll("completed")]),
                Arc::clone(&notifier),
            );
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            assert_eq!(monitor.poll_tick("t1", 1).await.unwrap(), TickFlow::Continue);
            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.status, MonitorStatus::Waiting);
            assert_eq!(notifier.count(), 0);

            assert_eq!(monitor.poll_tick("t1", 2).await.unwrap(), TickFlow::Stop);
            assert_eq!(notifier.count(), 1);
        });
    }

    #[test]
    fn test_record_step_updates_state() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) =
                monitor_with(ScriptedClient::new(vec![]), Arc::clone(&notifier));
            store.put(&TaskPollingState::new("t1")).await.unwrap();

            let outcome = StepOutcome::fail("element not found: #apply");
            let report = StepReport::from_outcome("t1", "s2".into(), "click apply", &outcome, 1);
            monitor.record_step(&report).await.unwrap();

            let state = monitor.get_task_state("t1").await.unwrap().unwrap();
            assert_eq!(state.current_step, "click apply");
            assert_eq!(state.message, "element not found: #apply");
            assert_eq!(state.thought_process.back().unwrap(), "click apply: failed");
        });
    }

    #[test]
    fn test_watch_polls_until_terminal_in_background() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (_, monitor) = monitor_with(
                ScriptedClient::new(vec![
                    poll("executing"),
                    poll("executing"),
                    poll("completed"),
                ]),
                Arc::clone(&notifier),
            );

            monitor.watch("t1").await.unwrap();
            // Watching twice is a no-op while the first poller is active.
            monitor.watch("t1").await.unwrap();

            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            loop {
                let state = monitor.get_task_state("t1").await.unwrap();
                if matches!(state, Some(ref s) if s.status.is_terminal()) {
                    break;
                }
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "task never reached terminal state"
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            // Give a potential duplicate notification a chance to fire.
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(notifier.count(), 1);
            assert!(!monitor.is_watching("t1").await);
        });
    }

    #[test]
    fn test_reset_clears_state_and_poller() {
        tokio_test::block_on(async {
            let notifier = Arc::new(CountingNotifier::new());
            let (store, monitor) = monitor_with(
                ScriptedClient::new(vec![poll("executing")]),
                Arc::clone(&notifier),
            );
            store.put(&TaskPollingState::new("t1")).await.unwrap();
            monitor.watch("t1").await.unwrap();

            assert!(monitor.reset("t1").await.unwrap());
            assert!(monitor.get_task_state("t1").await.unwrap().is_none());
            assert!(!monitor.is_watching("t1").await);
        });
    }
}
