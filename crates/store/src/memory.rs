//! In-memory [`MigrationStore`] backed by `tokio::sync::RwLock` maps.
//!
//! Thread-safe via interior locking; designed to be wrapped in `Arc` and
//! shared across the engine. List results are sorted by id so callers see
//! deterministic ordering regardless of insertion history.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use syncline_core::model::{LegacyMeeting, LifecycleEvent, Project, QueuedJob, Schedule, Snapshot};

use crate::{MigrationStore, RunRecord, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    schedules: RwLock<HashMap<String, Schedule>>,
    legacy_meetings: RwLock<HashMap<String, LegacyMeeting>>,
    events: RwLock<HashMap<String, LifecycleEvent>>,
    snapshots: RwLock<HashMap<String, Snapshot>>,
    jobs: RwLock<HashMap<String, QueuedJob>>,
    run_records: RwLock<Vec<RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load fixture data. Convenience for tests and dry runs.
    pub async fn seed(
        &self,
        projects: Vec<Project>,
        schedules: Vec<Schedule>,
        meetings: Vec<LegacyMeeting>,
    ) {
        let mut p = self.projects.write().await;
        for project in projects {
            p.insert(project.id.clone(), project);
        }
        let mut s = self.schedules.write().await;
        for schedule in schedules {
            s.insert(schedule.id.clone(), schedule);
        }
        let mut m = self.legacy_meetings.write().await;
        for meeting in meetings {
            m.insert(meeting.id.clone(), meeting);
        }
        tracing::debug!(
            projects = p.len(),
            schedules = s.len(),
            meetings = m.len(),
            "Seeded in-memory store"
        );
    }
}

fn sorted_by_id<T, F>(map: &HashMap<String, T>, key: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    let mut items: Vec<T> = map.values().cloned().collect();
    items.sort_by(|a, b| key(a).cmp(key(b)));
    items
}

#[async_trait]
impl MigrationStore for MemoryStore {
    // -- projects --

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(sorted_by_id(&*self.projects.read().await, |p| &p.id))
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn create_project(&self, project: Project) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.id) {
            return Err(StoreError::AlreadyExists {
                kind: "project",
                id: project.id,
            });
        }
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn update_project(&self, project: Project) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        if !projects.contains_key(&project.id) {
            return Err(StoreError::NotFound {
                kind: "project",
                id: project.id,
            });
        }
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.projects.write().await.remove(id);
        Ok(())
    }

    // -- schedules --

    async fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        Ok(sorted_by_id(&*self.schedules.read().await, |s| &s.id))
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StoreError> {
        Ok(self.schedules.read().await.get(id).cloned())
    }

    async fn create_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        let mut schedules = self.schedules.write().await;
        if schedules.contains_key(&schedule.id) {
            return Err(StoreError::AlreadyExists {
                kind: "schedule",
                id: schedule.id,
            });
        }
        schedules.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        let mut schedules = self.schedules.write().await;
        if !schedules.contains_key(&schedule.id) {
            return Err(StoreError::NotFound {
                kind: "schedule",
                id: schedule.id,
            });
        }
        schedules.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StoreError> {
        self.schedules.write().await.remove(id);
        Ok(())
    }

    async fn schedules_by_project(&self, project_id: &str) -> Result<Vec<Schedule>, StoreError> {
        let schedules = self.schedules.read().await;
        let mut matching: Vec<Schedule> = schedules
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    // -- legacy meetings --

    async fn list_legacy_meetings(&self) -> Result<Vec<LegacyMeeting>, StoreError> {
        Ok(sorted_by_id(&*self.legacy_meetings.read().await, |m| &m.id))
    }

    async fn get_legacy_meeting(&self, id: &str) -> Result<Option<LegacyMeeting>, StoreError> {
        Ok(self.legacy_meetings.read().await.get(id).cloned())
    }

    async fn create_legacy_meeting(&self, meeting: LegacyMeeting) -> Result<(), StoreError> {
        let mut meetings = self.legacy_meetings.write().await;
        if meetings.contains_key(&meeting.id) {
            return Err(StoreError::AlreadyExists {
                kind: "legacy meeting",
                id: meeting.id,
            });
        }
        meetings.insert(meeting.id.clone(), meeting);
        Ok(())
    }

    // -- lifecycle events --

    async fn append_event(&self, event: LifecycleEvent) -> Result<(), StoreError> {
        self.events.write().await.insert(event.id.clone(), event);
        Ok(())
    }

    async fn events_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<LifecycleEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<LifecycleEvent> = events
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.events.write().await.remove(id);
        Ok(())
    }

    // -- snapshots --

    async fn create_stored_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    async fn snapshots_for_entity(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let snapshots = self.snapshots.read().await;
        let mut matching: Vec<Snapshot> = snapshots
            .values()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), StoreError> {
        self.snapshots.write().await.remove(id);
        Ok(())
    }

    // -- queued jobs --

    async fn enqueue_job(&self, job: QueuedJob) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn jobs_for_project(&self, project_id: &str) -> Result<Vec<QueuedJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<QueuedJob> = jobs
            .values()
            .filter(|j| j.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        self.jobs.write().await.remove(id);
        Ok(())
    }

    // -- run history --

    async fn append_run_record(&self, record: RunRecord) -> Result<(), StoreError> {
        self.run_records.write().await.push(record);
        Ok(())
    }

    async fn list_run_records(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.run_records.read().await.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: format!("Project {id}"),
            phase: "planning".to_string(),
            archived: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn schedule(id: &str, project_id: &str) -> Schedule {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        Schedule {
            id: id.to_string(),
            project_id: project_id.to_string(),
            title: format!("Meeting {id}"),
            starts_at: start,
            ends_at: start + chrono::Duration::hours(1),
            sequence_type: "planning".to_string(),
            sequence_ordinal: 1,
            status: "confirmed".to_string(),
            attendees: vec![],
            created_by: "importer".to_string(),
            draft: false,
            archived: false,
            source_meeting_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = MemoryStore::new();
        store.create_project(project("P1")).await.unwrap();
        let fetched = store.get_project("P1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "Project P1");
    }

    #[tokio::test]
    async fn create_duplicate_id_is_rejected() {
        let store = MemoryStore::new();
        store.create_schedule(schedule("S1", "P1")).await.unwrap();
        let err = store.create_schedule(schedule("S1", "P1")).await.unwrap_err();
        assert_matches!(err, StoreError::AlreadyExists { kind: "schedule", .. });
    }

    #[tokio::test]
    async fn update_missing_id_is_rejected() {
        let store = MemoryStore::new();
        let err = store.update_schedule(schedule("S1", "P1")).await.unwrap_err();
        assert_matches!(err, StoreError::NotFound { kind: "schedule", .. });
    }

    #[tokio::test]
    async fn delete_missing_id_is_a_noop() {
        let store = MemoryStore::new();
        store.delete_schedule("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_sorted_by_id() {
        let store = MemoryStore::new();
        store.create_project(project("P3")).await.unwrap();
        store.create_project(project("P1")).await.unwrap();
        store.create_project(project("P2")).await.unwrap();
        let ids: Vec<String> = store
            .list_projects()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
    }

    #[tokio::test]
    async fn schedules_by_project_filters() {
        let store = MemoryStore::new();
        store.create_schedule(schedule("S1", "P1")).await.unwrap();
        store.create_schedule(schedule("S2", "P2")).await.unwrap();
        store.create_schedule(schedule("S3", "P1")).await.unwrap();
        let ids: Vec<String> = store
            .schedules_by_project("P1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["S1", "S3"]);
    }

    #[tokio::test]
    async fn run_records_append_in_order() {
        let store = MemoryStore::new();
        for n in 0..3 {
            store
                .append_run_record(RunRecord {
                    run_id: format!("run-{n}"),
                    started_at: Utc.with_ymd_and_hms(2026, 1, 1, n, 0, 0).unwrap(),
                    finished_at: Utc.with_ymd_and_hms(2026, 1, 1, n, 30, 0).unwrap(),
                    state: "completed".to_string(),
                    migrated: n as usize,
                    failed: 0,
                })
                .await
                .unwrap();
        }
        let records = store.list_run_records().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].run_id, "run-2");
    }
}
