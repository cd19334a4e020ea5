//! # Wayfarer Monitor
//!
//! Long-lived background monitoring for in-flight tasks. The monitor owns
//! durable [`wayfarer_core::types::TaskPollingState`], polls an external
//! status endpoint on a fixed interval, and fires exactly one user-facing
//! notification per terminal transition. Task lifetime is decoupled from
//! any observer: closing and reopening a UI neither loses nor duplicates
//! progress.

mod config;
mod monitor;
mod notify;
mod registry;
mod status;

pub use config::{load_config, ConfigError, MonitorConfig};
pub use monitor::{MonitorError, RecoverySummary, TaskMonitor};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use registry::TaskRegistry;
pub use status::{HttpStatusClient, PollError, StatusClient, StatusPoll};
