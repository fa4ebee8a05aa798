//! `syncline-store` library crate.
//!
//! Persistence seam for the migration engine. [`MigrationStore`] is the
//! only interface the engine knows; [`MemoryStore`] is the bundled
//! implementation, used both in production for dry runs and throughout
//! the test suites. The store is a single-writer resource: no
//! transactions are exposed, so callers rely on idempotent writes and
//! post-hoc auditing.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use syncline_core::model::{LegacyMeeting, LifecycleEvent, Project, QueuedJob, Schedule, Snapshot};
use syncline_core::types::{EntityId, Timestamp};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: EntityId },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: EntityId },

    #[error("Store backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Run history
// ---------------------------------------------------------------------------

/// Persisted outcome of one migration run.
///
/// Read back on startup so the engine can enforce its cooldown window
/// without keeping state in memory across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: EntityId,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Terminal state name (`completed`, `failed`, `cancelled`).
    pub state: String,
    pub migrated: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// CRUD access to every entity kind the engine touches.
///
/// All writes must be idempotent at the caller level: `update_*` on a
/// missing id is an error, `create_*` on a taken id is an error, and
/// `delete_*` on a missing id is a no-op success.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    // -- projects --

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;
    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError>;
    async fn create_project(&self, project: Project) -> Result<(), StoreError>;
    async fn update_project(&self, project: Project) -> Result<(), StoreError>;
    async fn delete_project(&self, id: &str) -> Result<(), StoreError>;

    // -- schedules --

    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError>;
    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StoreError>;
    async fn create_schedule(&self, schedule: Schedule) -> Result<(), StoreError>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<(), StoreError>;
    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError>;
    async fn schedules_by_project(&self, project_id: &str) -> Result<Vec<Schedule>, StoreError>;

    // -- legacy meetings --

    async fn list_legacy_meetings(&self) -> Result<Vec<LegacyMeeting>, StoreError>;
    async fn get_legacy_meeting(&self, id: &str) -> Result<Option<LegacyMeeting>, StoreError>;
    async fn create_legacy_meeting(&self, meeting: LegacyMeeting) -> Result<(), StoreError>;

    // -- lifecycle events --

    async fn append_event(&self, event: LifecycleEvent) -> Result<(), StoreError>;
    async fn events_for_project(&self, project_id: &str)
        -> Result<Vec<LifecycleEvent>, StoreError>;
    async fn delete_event(&self, id: &str) -> Result<(), StoreError>;

    // -- snapshots --

    async fn create_stored_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError>;
    async fn snapshots_for_entity(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError>;
    async fn delete_snapshot(&self, id: &str) -> Result<(), StoreError>;

    // -- queued jobs --

    async fn enqueue_job(&self, job: QueuedJob) -> Result<(), StoreError>;
    async fn jobs_for_project(&self, project_id: &str) -> Result<Vec<QueuedJob>, StoreError>;
    async fn delete_job(&self, id: &str) -> Result<(), StoreError>;

    // -- run history --

    async fn append_run_record(&self, record: RunRecord) -> Result<(), StoreError>;
    async fn list_run_records(&self) -> Result<Vec<RunRecord>, StoreError>;
}
