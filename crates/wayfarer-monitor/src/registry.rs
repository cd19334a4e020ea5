//! Active poller registry.
//!
//! One explicit object owns the mapping from task id to its cancellation
//! handle, preserving the at-most-one-poller-per-task invariant without
//! process-wide timer maps.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Registry of cancellation handles for active pollers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the task for a new poller. Returns a fresh token, or `None`
    /// when a poller is already active for this task.
    pub async fn start(&self, task_id: &str) -> Option<CancellationToken> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(task_id) {
            return None;
        }
        let token = CancellationToken::new();
        inner.insert(task_id.to_string(), token.clone());
        Some(token)
    }

    /// Cancel and remove the task's poller. Returns whether one was active.
    pub async fn stop(&self, task_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.remove(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn has(&self, task_id: &str) -> bool {
        self.inner.read().await.contains_key(task_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Cancel every active poller.
    pub async fn stop_all(&self) {
        let mut inner = self.inner.write().await;
        for (_, token) in inner.drain() {
            token.cancel();
        }
    }
}
