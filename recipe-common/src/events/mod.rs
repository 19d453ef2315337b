//! Event types for the recipe extraction event system
//!
//! Provides the shared `ExtractionEvent` definitions and the `EventBus`
//! used to fan job progress out to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Extraction job lifecycle events
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every event carries the owning `user_id` so streams can be filtered per caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtractionEvent {
    /// Job accepted and queued for background processing
    JobSubmitted {
        job_id: Uuid,
        user_id: String,
        video_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Stage transition or progress change
    JobProgressUpdate {
        job_id: Uuid,
        user_id: String,
        /// Job status name (e.g. "DOWNLOADING")
        status: String,
        /// Human-readable step description
        current_step: String,
        /// Percentage complete (0-100)
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline finished and recipes are available
    JobCompleted {
        job_id: Uuid,
        user_id: String,
        recipe_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline failed
    JobFailed {
        job_id: Uuid,
        user_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Job cancelled by its owner
    JobCancelled {
        job_id: Uuid,
        user_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExtractionEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ExtractionEvent::JobSubmitted { .. } => "JobSubmitted",
            ExtractionEvent::JobProgressUpdate { .. } => "JobProgressUpdate",
            ExtractionEvent::JobCompleted { .. } => "JobCompleted",
            ExtractionEvent::JobFailed { .. } => "JobFailed",
            ExtractionEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    /// Owner of the job this event describes
    pub fn user_id(&self) -> &str {
        match self {
            ExtractionEvent::JobSubmitted { user_id, .. }
            | ExtractionEvent::JobProgressUpdate { user_id, .. }
            | ExtractionEvent::JobCompleted { user_id, .. }
            | ExtractionEvent::JobFailed { user_id, .. }
            | ExtractionEvent::JobCancelled { user_id, .. } => user_id,
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            ExtractionEvent::JobSubmitted { job_id, .. }
            | ExtractionEvent::JobProgressUpdate { job_id, .. }
            | ExtractionEvent::JobCompleted { job_id, .. }
            | ExtractionEvent::JobFailed { job_id, .. }
            | ExtractionEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus for extraction events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the pipeline)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use recipe_common::events::{EventBus, ExtractionEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ExtractionEvent::JobCancelled {
///     job_id: uuid::Uuid::new_v4(),
///     user_id: "user-1".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExtractionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are dropped
    /// for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ExtractionEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers (connected SSE clients)
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event(user: &str) -> ExtractionEvent {
        ExtractionEvent::JobProgressUpdate {
            job_id: Uuid::new_v4(),
            user_id: user.to_string(),
            status: "DOWNLOADING".to_string(),
            current_step: "Downloading video...".to_string(),
            progress: 10,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(progress_event("u1"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_lossy(progress_event("u1"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "JobProgressUpdate");
        assert_eq!(received.user_id(), "u1");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(progress_event("u2")).unwrap();
        assert_eq!(json["type"], "JobProgressUpdate");
        assert_eq!(json["status"], "DOWNLOADING");
        assert_eq!(json["progress"], 10);
    }
}
