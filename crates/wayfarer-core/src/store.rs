//! Storage abstractions
//!
//! The monitor persists [`TaskPollingState`] through this trait so task
//! lifetime is decoupled from any particular observer. Implementations live
//! in the `wayfarer-stores` crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::TaskPollingState;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Durable keyed store of per-task monitoring state.
///
/// Mutated only by the monitor's own poll/report handlers; reads are
/// unrestricted and may lag a write by up to one poll interval.
#[async_trait]
pub trait TaskStateStore: Send + Sync {
    async fn put(&self, state: &TaskPollingState) -> Result<(), StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskPollingState>, StoreError>;

    async fn remove(&self, task_id: &str) -> Result<bool, StoreError>;

    /// All persisted states, in no particular order.
    async fn list(&self) -> Result<Vec<TaskPollingState>, StoreError>;
}
