//! TaskStateStore in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use wayfarer_core::store::{StoreError, TaskStateStore};
use wayfarer_core::types::TaskPollingState;

/// In-memory implementation for development and testing.
pub struct InMemoryTaskStateStore {
    states: RwLock<HashMap<String, TaskPollingState>>,
}

impl InMemoryTaskStateStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStateStore for InMemoryTaskStateStore {
    async fn put(&self, state: &TaskPollingState) -> Result<(), StoreError> {
        let mut states = self
            .states
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        states.insert(state.task_id.clone(), state.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskPollingState>, StoreError> {
        let states = self
            .states
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(states.get(task_id).cloned())
    }

    async fn remove(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut states = self
            .states
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(states.remove(task_id).is_some())
    }

    async fn list(&self) -> Result<Vec<TaskPollingState>, StoreError> {
        let states = self
            .states
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(states.values().cloned().collect())
    }
}
