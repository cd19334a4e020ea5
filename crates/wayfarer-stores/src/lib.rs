//! # Wayfarer Stores
//!
//! Concrete implementations of the storage and reporting traits defined in
//! `wayfarer-core`:
//! - `InMemoryTaskStateStore`: task monitoring state for development/tests
//! - `MemoryReporter`: records step reports for inspection
//! - `HttpReporter`: fire-and-forget push to a reporting endpoint

mod reporter;
mod state_store;

pub use reporter::{HttpReporter, MemoryReporter};
pub use state_store::InMemoryTaskStateStore;
