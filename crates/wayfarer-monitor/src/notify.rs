//! Terminal task notifications.

use async_trait::async_trait;

/// User-visible signal fired once per terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Notification sink. Implementations decide how the signal surfaces
/// (desktop notification, chat message, log line).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Default sink: structured log line.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            title = %notification.title,
            message = %notification.message,
            "task notification"
        );
    }
}
