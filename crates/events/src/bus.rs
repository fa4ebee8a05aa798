//! Broadcast channel carrying engine notifications.
//!
//! The engine publishes [`EngineEvent`]s through one shared [`EventBus`];
//! anything watching a migration (dashboards, the project-phase state
//! machine, tests) attaches a receiver and reads the stream. Delivery is
//! fire-and-forget: the engine never waits on a listener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use syncline_core::consistency::HealthStatus;
use syncline_core::types::EntityId;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// A typed notification emitted by the migration engine.
///
/// Events are observational: no engine behavior depends on whether anyone
/// is listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: EntityId,
        total_records: usize,
        started_at: DateTime<Utc>,
    },
    RunProgress {
        run_id: EntityId,
        processed: usize,
        total_records: usize,
        migrated: usize,
        failed: usize,
    },
    RunCompleted {
        run_id: EntityId,
        migrated: usize,
        failed: usize,
        duration_ms: u64,
    },
    RunFailed {
        run_id: EntityId,
        reason: String,
    },
    HealthCheckCompleted {
        status: HealthStatus,
        issue_count: usize,
    },
    RecoveryApplied {
        fixed: usize,
        failed: usize,
    },
    CascadeCompleted {
        entity_id: EntityId,
        operation: String,
        deleted: usize,
        errors: usize,
    },
}

impl EngineEvent {
    /// Stable event name, for logging and external routing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::RunProgress { .. } => "run.progress",
            Self::RunCompleted { .. } => "run.completed",
            Self::RunFailed { .. } => "run.failed",
            Self::HealthCheckCompleted { .. } => "health.completed",
            Self::RecoveryApplied { .. } => "recovery.applied",
            Self::CascadeCompleted { .. } => "cascade.completed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// How many undelivered events the channel holds per subscriber.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub for [`EngineEvent`]s, shared across the engine as
/// `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Bus holding up to `capacity` undelivered events.
    ///
    /// A subscriber that falls further behind than that loses its oldest
    /// entries and sees `RecvError::Lagged` on its next receive.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Hand an event to every attached receiver.
    ///
    /// With nobody attached the event is dropped; publishing never fails
    /// from the engine's point of view.
    pub fn publish(&self, event: EngineEvent) {
        tracing::trace!(event = event.name(), "Publishing engine event");
        // A send error only signals zero receivers.
        let _ = self.sender.send(event);
    }

    /// Attach a receiver; it observes events published from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
