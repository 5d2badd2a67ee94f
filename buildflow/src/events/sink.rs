//! Notification sink trait and implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, Level};

/// Build lifecycle events delivered to a [`NotificationSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationEvent {
    /// A build began.
    BuildStarted,
    /// A build finished successfully.
    BuildSuccess,
    /// A build finished with a failure.
    BuildFailed,
    /// A stage began.
    StageStarted,
    /// A stage ended successfully or from the cache.
    StageSuccess,
    /// A stage failed, timed out or was cancelled.
    StageFailed,
}

impl NotificationEvent {
    /// Returns the wire name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BuildStarted => "build-started",
            Self::BuildSuccess => "build-success",
            Self::BuildFailed => "build-failed",
            Self::StageStarted => "stage-started",
            Self::StageSuccess => "stage-success",
            Self::StageFailed => "stage-failed",
        }
    }

    /// Returns true for build-level events.
    #[must_use]
    pub const fn is_build_event(&self) -> bool {
        matches!(self, Self::BuildStarted | Self::BuildSuccess | Self::BuildFailed)
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of build lifecycle events.
///
/// Implementations may fail; the runner logs and discards the error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one event.
    async fn notify(&self, event: NotificationEvent, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// A sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotificationSink;

#[async_trait]
impl NotificationSink for NoOpNotificationSink {
    async fn notify(&self, _event: NotificationEvent, _payload: serde_json::Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingNotificationSink {
    level: Level,
}

impl Default for LoggingNotificationSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingNotificationSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, event: NotificationEvent, payload: serde_json::Value) -> anyhow::Result<()> {
        if self.level == Level::DEBUG {
            debug!(event = %event, payload = %payload, "Notification: {}", event);
        } else {
            info!(event = %event, payload = %payload, "Notification: {}", event);
        }
        Ok(())
    }
}

/// A sink that keeps every event in memory, for tests and inspection.
#[derive(Debug, Default)]
pub struct CollectingNotificationSink {
    events: parking_lot::RwLock<Vec<(NotificationEvent, serde_json::Value)>>,
}

impl CollectingNotificationSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<(NotificationEvent, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event kinds in delivery order.
    #[must_use]
    pub fn kinds(&self) -> Vec<NotificationEvent> {
        self.events.read().iter().map(|(e, _)| *e).collect()
    }

    /// Returns the payloads of one event kind.
    #[must_use]
    pub fn payloads_of(&self, event: NotificationEvent) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl NotificationSink for CollectingNotificationSink {
    async fn notify(&self, event: NotificationEvent, payload: serde_json::Value) -> anyhow::Result<()> {
        self.events.write().push((event, payload));
        Ok(())
    }
}

/// A sink that forwards every event to several sinks.
///
/// Every sink receives the event even if an earlier one fails; the
/// failures are reported together.
#[derive(Default)]
pub struct FanoutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotificationSink {
    /// Creates an empty fan-out sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a downstream sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl NotificationSink for FanoutNotificationSink {
    async fn notify(&self, event: NotificationEvent, payload: serde_json::Value) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event, payload.clone()).await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} of {} sinks failed: {}",
                failures.len(),
                self.sinks.len(),
                failures.join("; ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        assert_eq!(NotificationEvent::BuildStarted.as_str(), "build-started");
        assert_eq!(NotificationEvent::StageSuccess.to_string(), "stage-success");
        assert_eq!(
            serde_json::to_string(&NotificationEvent::BuildFailed).unwrap(),
            r#""build-failed""#
        );
        assert!(NotificationEvent::BuildSuccess.is_build_event());
        assert!(!NotificationEvent::StageFailed.is_build_event());
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpNotificationSink
            .notify(NotificationEvent::BuildStarted, json!({}))
            .await
            .unwrap();
        LoggingNotificationSink::debug()
            .notify(NotificationEvent::StageStarted, json!({"stage": "lint"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingNotificationSink::new();
        assert!(sink.is_empty());

        sink.notify(NotificationEvent::StageStarted, json!({"stage": "a"})).await.unwrap();
        sink.notify(NotificationEvent::StageSuccess, json!({"stage": "a"})).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.kinds(),
            vec![NotificationEvent::StageStarted, NotificationEvent::StageSuccess]
        );
        assert_eq!(sink.payloads_of(NotificationEvent::StageSuccess)[0]["stage"], "a");

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_all_and_reports_failures() {
        let collected = Arc::new(CollectingNotificationSink::new());
        let mut failing = MockNotificationSink::new();
        failing
            .expect_notify()
            .returning(|_, _| Err(anyhow::anyhow!("webhook returned 500")));

        let fanout = FanoutNotificationSink::new()
            .with_sink(Arc::new(failing))
            .with_sink(collected.clone());

        let err = fanout
            .notify(NotificationEvent::BuildFailed, json!({}))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("webhook returned 500"));
        assert_eq!(collected.len(), 1);
    }
}
