//! Notification sinks for build lifecycle events.
//!
//! The runner never lets a sink affect a build: every call goes through a
//! [`Notifier`], which logs and swallows sink errors and panics.

mod sink;

pub use sink::{
    CollectingNotificationSink, FanoutNotificationSink, LoggingNotificationSink,
    NoOpNotificationSink, NotificationEvent, NotificationSink,
};

#[cfg(test)]
pub(crate) use sink::MockNotificationSink;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// Guarded handle to a notification sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    /// Wraps a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Delivers one event, logging and discarding any failure.
    pub async fn send(&self, event: NotificationEvent, payload: serde_json::Value) {
        match AssertUnwindSafe(self.sink.notify(event, payload)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(event = %event, error = %e, "Notification sink failed");
            }
            Err(_) => {
                warn!(event = %event, "Notification sink panicked");
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(NoOpNotificationSink))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
