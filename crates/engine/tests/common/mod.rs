//! Shared fixtures for engine integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use syncline_core::model::{LegacyMeeting, LifecycleEvent, Project, QueuedJob, Schedule, Snapshot};
use syncline_core::types::Timestamp;
use syncline_engine::{MemoryRetryPolicy, MigrationEngine};
use syncline_store::{MemoryStore, MigrationStore, RunRecord, StoreError};

pub fn fixed_time(hour: u32, minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
}

pub fn project(id: &str, phase: &str) -> Project {
    Project {
        id: id.to_string(),
        name: format!("Project {id}"),
        phase: phase.to_string(),
        archived: false,
        created_at: fixed_time(8, 0),
    }
}

pub fn schedule(id: &str, project_id: &str, start_hour: u32, end_hour: u32) -> Schedule {
    Schedule {
        id: id.to_string(),
        project_id: project_id.to_string(),
        title: format!("Meeting {id}"),
        starts_at: fixed_time(start_hour, 0),
        ends_at: fixed_time(end_hour, 0),
        sequence_type: "planning".to_string(),
        sequence_ordinal: 1,
        status: "confirmed".to_string(),
        attendees: vec!["ana".to_string()],
        created_by: "importer".to_string(),
        draft: false,
        archived: false,
        source_meeting_id: None,
        created_at: fixed_time(8, 0),
        updated_at: fixed_time(8, 0),
    }
}

pub fn meeting(id: &str, project_id: &str, sequence: i32) -> LegacyMeeting {
    LegacyMeeting {
        id: id.to_string(),
        project_id: project_id.to_string(),
        title: format!("Legacy {id}"),
        starts_at: format!("2026-03-02T{:02}:00:00Z", 9 + (sequence as u32 % 8)),
        ends_at: format!("2026-03-02T{:02}:00:00Z", 10 + (sequence as u32 % 8)),
        meeting_type: "planning".to_string(),
        sequence,
        attendees: vec!["ana".to_string()],
        created_by: "importer".to_string(),
        draft: false,
    }
}

/// Build an engine over a fresh seeded memory store.
pub async fn build_engine(
    projects: Vec<Project>,
    schedules: Vec<Schedule>,
    meetings: Vec<LegacyMeeting>,
) -> (MigrationEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.seed(projects, schedules, meetings).await;
    let engine = MigrationEngine::new(
        Arc::clone(&store) as Arc<dyn MigrationStore>,
        Arc::new(MemoryRetryPolicy::default()),
    )
    .await
    .expect("engine construction");
    (engine, store)
}

// ---------------------------------------------------------------------------
// GatedStore
// ---------------------------------------------------------------------------

/// Store wrapper that parks `list_legacy_meetings` until released, so a
/// test can hold a migration mid-run deterministically. It can also be
/// told to refuse schedule deletes, for exercising cascade error paths.
pub struct GatedStore {
    pub inner: Arc<MemoryStore>,
    /// Signalled when a run reaches the gate.
    pub entered: Notify,
    /// Permits released by the test to let the run proceed.
    pub release: Semaphore,
    /// When set, `delete_schedule` fails with a backend error.
    pub fail_schedule_deletes: AtomicBool,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Semaphore::new(0),
            fail_schedule_deletes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MigrationStore for GatedStore {
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.inner.list_projects().await
    }
    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        self.inner.get_project(id).await
    }
    async fn create_project(&self, project: Project) -> Result<(), StoreError> {
        self.inner.create_project(project).await
    }
    async fn update_project(&self, project: Project) -> Result<(), StoreError> {
        self.inner.update_project(project).await
    }
    async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_project(id).await
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        self.inner.list_schedules().await
    }
    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StoreError> {
        self.inner.get_schedule(id).await
    }
    async fn create_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        self.inner.create_schedule(schedule).await
    }
    async fn update_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        self.inner.update_schedule(schedule).await
    }
    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError> {
        if self.fail_schedule_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("schedule delete refused".to_string()));
        }
        self.inner.delete_schedule(id).await
    }
    async fn schedules_by_project(&self, project_id: &str) -> Result<Vec<Schedule>, StoreError> {
        self.inner.schedules_by_project(project_id).await
    }

    async fn list_legacy_meetings(&self) -> Result<Vec<LegacyMeeting>, StoreError> {
        self.entered.notify_one();
        let permit = self.release.acquire().await.expect("gate closed");
        permit.forget();
        self.inner.list_legacy_meetings().await
    }
    async fn get_legacy_meeting(&self, id: &str) -> Result<Option<LegacyMeeting>, StoreError> {
        self.inner.get_legacy_meeting(id).await
    }
    async fn create_legacy_meeting(&self, meeting: LegacyMeeting) -> Result<(), StoreError> {
        self.inner.create_legacy_meeting(meeting).await
    }

    async fn append_event(&self, event: LifecycleEvent) -> Result<(), StoreError> {
        self.inner.append_event(event).await
    }
    async fn events_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<LifecycleEvent>, StoreError> {
        self.inner.events_for_project(project_id).await
    }
    async fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_event(id).await
    }

    async fn create_stored_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.inner.create_stored_snapshot(snapshot).await
    }
    async fn snapshots_for_entity(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        self.inner.snapshots_for_entity(entity_id).await
    }
    async fn delete_snapshot(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_snapshot(id).await
    }

    async fn enqueue_job(&self, job: QueuedJob) -> Result<(), StoreError> {
        self.inner.enqueue_job(job).await
    }
    async fn jobs_for_project(&self, project_id: &str) -> Result<Vec<QueuedJob>, StoreError> {
        self.inner.jobs_for_project(project_id).await
    }
    async fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_job(id).await
    }

    async fn append_run_record(&self, record: RunRecord) -> Result<(), StoreError> {
        self.inner.append_run_record(record).await
    }
    async fn list_run_records(&self) -> Result<Vec<RunRecord>, StoreError> {
        self.inner.list_run_records().await
    }
}
