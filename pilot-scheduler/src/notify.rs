//! Notification sink for failure and decision events.
//!
//! The executor emits a `TaskFailure` when a task reaches terminal FAILED,
//! and the approval gateway emits a `DecisionResolution` on approve/reject.
//! Delivery failures are logged, never raised into the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Event emitted when a task fails terminally.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub action_type: String,
    pub error: String,
}

/// Event emitted when a pending decision is approved or rejected.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionResolution {
    pub decision_id: String,
    pub status: String,
}

/// Receiver of controller events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// A task exhausted its retry budget or failed fatally.
    async fn task_failed(&self, event: &TaskFailure);

    /// A pending decision was approved or rejected.
    async fn decision_resolved(&self, event: &DecisionResolution);
}

/// Sink that drops events, logging them at debug level.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn task_failed(&self, event: &TaskFailure) {
        tracing::debug!(task_id = %event.task_id, error = %event.error, "Notification disabled, dropping task failure event");
    }

    async fn decision_resolved(&self, event: &DecisionResolution) {
        tracing::debug!(decision_id = %event.decision_id, status = %event.status, "Notification disabled, dropping decision event");
    }
}

#[derive(Debug, Serialize)]
struct WebhookEvent<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    payload: &'a T,
}

/// Sink that POSTs events as JSON to a webhook endpoint.
pub struct WebhookNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn post<T: Serialize>(&self, event: &str, payload: &T) {
        let body = WebhookEvent { event, payload };
        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    event = %event,
                    "Notification endpoint returned error status"
                );
            }
            Ok(_) => {
                tracing::debug!(endpoint = %self.endpoint, event = %event, "Notification delivered");
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, event = %event, error = %e, "Failed to deliver notification");
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn task_failed(&self, event: &TaskFailure) {
        self.post("task_failed", event).await;
    }

    async fn decision_resolved(&self, event: &DecisionResolution) {
        self.post("decision_resolved", event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink recording events for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub failures: Mutex<Vec<TaskFailure>>,
        pub resolutions: Mutex<Vec<DecisionResolution>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn task_failed(&self, event: &TaskFailure) {
            self.failures.lock().unwrap().push(event.clone());
        }

        async fn decision_resolved(&self, event: &DecisionResolution) {
            self.resolutions.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn test_recording_sink_captures_events() {
        let sink = RecordingSink::default();
        sink.task_failed(&TaskFailure {
            task_id: "t-1".into(),
            action_type: "send_alert".into(),
            error: "boom".into(),
        })
        .await;
        sink.decision_resolved(&DecisionResolution {
            decision_id: "d-1".into(),
            status: "approved".into(),
        })
        .await;

        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert_eq!(sink.resolutions.lock().unwrap()[0].status, "approved");
    }

    #[tokio::test]
    async fn test_null_notifier_swallows_events() {
        let sink = NullNotifier;
        sink.task_failed(&TaskFailure {
            task_id: "t-1".into(),
            action_type: "send_alert".into(),
            error: "boom".into(),
        })
        .await;
    }

    #[test]
    fn test_webhook_event_serialization() {
        let event = TaskFailure {
            task_id: "t-1".into(),
            action_type: "create_content".into(),
            error: "timeout".into(),
        };
        let body = WebhookEvent {
            event: "task_failed",
            payload: &event,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["event"], "task_failed");
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["error"], "timeout");
    }
}
