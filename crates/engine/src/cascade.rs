//! Cascade operations: safe deletion, archiving, and transfer of a project
//! and everything it owns.
//!
//! Destructive work is preceded by impact analysis and, when requested, a
//! backup that is round-trip verified before the first delete. Steps are
//! isolated: a failure in one is recorded and the remaining steps still
//! run. A failed backup or a surviving schedule is unrecoverable and
//! blocks the final entity removal; losing peripheral records (events,
//! snapshots, jobs) does not.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use syncline_core::model::{is_active_phase, LifecycleEvent, Project, QueuedJob, Schedule, Snapshot};
use syncline_core::types::{EntityId, Timestamp};
use syncline_events::{EngineEvent, EventBus};
use syncline_store::MigrationStore;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Risk analysis
// ---------------------------------------------------------------------------

/// Related-record volume above which deletion risk is raised even without
/// upcoming meetings.
const HIGH_VOLUME_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// What a deletion would touch, surfaced to the caller before anything
/// destructive happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionImpact {
    pub entity_id: EntityId,
    pub schedule_count: usize,
    /// Schedules starting after the analysis time.
    pub upcoming_meeting_count: usize,
    pub event_count: usize,
    pub snapshot_count: usize,
    pub job_count: usize,
    #[serde(skip_deserializing)]
    pub connected_subsystems: Vec<&'static str>,
    pub estimated_payload_bytes: usize,
    pub risk: RiskLevel,
}

/// Confirmation prompt derived from an impact analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfirmation {
    pub impact: DeletionImpact,
    /// High and critical risk deletions should not proceed without a
    /// backup.
    pub backup_recommended: bool,
    pub prompt: String,
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeOperation {
    Delete,
    Archive,
    Transfer,
}

impl CascadeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Transfer => "transfer",
        }
    }
}

/// One failed cascade step. `recoverable` steps leave the operation able
/// to finish; an unrecoverable error blocks the final entity removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeStepError {
    #[serde(skip_deserializing)]
    pub step: &'static str,
    pub message: String,
    pub recoverable: bool,
}

/// Snapshot of a project and all records it owns, taken before a
/// destructive cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CascadeBackup {
    pub project: Project,
    pub schedules: Vec<Schedule>,
    pub events: Vec<LifecycleEvent>,
    pub snapshots: Vec<Snapshot>,
    pub jobs: Vec<QueuedJob>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub operation: CascadeOperation,
    pub entity_id: EntityId,
    pub affected_schedules: Vec<EntityId>,
    pub affected_events: Vec<EntityId>,
    pub affected_snapshots: Vec<EntityId>,
    pub affected_jobs: Vec<EntityId>,
    /// Whether the entity itself was removed / archived / transferred.
    pub entity_processed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<CascadeStepError>,
    pub backup: Option<CascadeBackup>,
    pub duration_ms: u64,
}

/// Options for `delete_cascade`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeOptions {
    pub create_backup: bool,
}

/// How transferred children merge into the new parent's record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Re-number transferred schedules after the target's existing ones.
    Append,
    /// Delete the target's existing schedules first.
    Replace,
    /// Keep the target's schedule on a sequence-slot collision, drop the
    /// transferred one.
    Merge,
}

// ---------------------------------------------------------------------------
// CascadeManager
// ---------------------------------------------------------------------------

pub struct CascadeManager {
    store: Arc<dyn MigrationStore>,
    bus: Arc<EventBus>,
}

impl CascadeManager {
    pub fn new(store: Arc<dyn MigrationStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub(crate) fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    async fn load_project(&self, entity_id: &str) -> Result<Project, EngineError> {
        self.store
            .get_project(entity_id)
            .await?
            .ok_or_else(|| EngineError::UnknownProject(entity_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Impact analysis
    // -----------------------------------------------------------------------

    /// Compute what deleting this project would touch, and how risky it is.
    pub async fn analyze_deletion_impact(
        &self,
        entity_id: &str,
    ) -> Result<DeletionConfirmation, EngineError> {
        let project = self.load_project(entity_id).await?;
        let schedules = self.store.schedules_by_project(entity_id).await?;
        let events = self.store.events_for_project(entity_id).await?;
        let snapshots = self.store.snapshots_for_entity(entity_id).await?;
        let jobs = self.store.jobs_for_project(entity_id).await?;

        let now = Utc::now();
        let upcoming = schedules.iter().filter(|s| s.starts_at > now).count();
        let total_related = schedules.len() + events.len() + snapshots.len() + jobs.len();
        let active = is_active_phase(&project.phase);

        let mut connected_subsystems = vec!["schedules"];
        if !events.is_empty() {
            connected_subsystems.push("lifecycle_events");
        }
        if !snapshots.is_empty() {
            connected_subsystems.push("snapshots");
        }
        if !jobs.is_empty() {
            connected_subsystems.push("job_queue");
        }

        let estimated_payload_bytes = serde_json::to_vec(&project).map(|v| v.len()).unwrap_or(0)
            + schedules
                .iter()
                .filter_map(|s| serde_json::to_vec(s).ok())
                .map(|v| v.len())
                .sum::<usize>()
            + events
                .iter()
                .filter_map(|e| serde_json::to_vec(e).ok())
                .map(|v| v.len())
                .sum::<usize>();

        let risk = deletion_risk(upcoming, active, total_related);
        let impact = DeletionImpact {
            entity_id: entity_id.to_string(),
            schedule_count: schedules.len(),
            upcoming_meeting_count: upcoming,
            event_count: events.len(),
            snapshot_count: snapshots.len(),
            job_count: jobs.len(),
            connected_subsystems,
            estimated_payload_bytes,
            risk,
        };
        let backup_recommended = risk >= RiskLevel::High;
        let prompt = format!(
            "Deleting project '{}' ({}) removes {} schedule(s) ({} upcoming), {} event(s), {} snapshot(s), {} queued job(s). Risk: {:?}.",
            project.name,
            project.id,
            impact.schedule_count,
            impact.upcoming_meeting_count,
            impact.event_count,
            impact.snapshot_count,
            impact.job_count,
            risk,
        );
        Ok(DeletionConfirmation {
            impact,
            backup_recommended,
            prompt,
        })
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete a project and everything it owns.
    ///
    /// With `create_backup`, a snapshot of every record is taken and
    /// round-trip verified before the first destructive step. Steps are
    /// best-effort and isolated; the project itself is removed only when no
    /// unrecoverable error occurred.
    pub async fn delete_cascade(
        &self,
        entity_id: &str,
        options: CascadeOptions,
    ) -> Result<CascadeOutcome, EngineError> {
        let clock = std::time::Instant::now();
        let project = self.load_project(entity_id).await?;
        let schedules = self.store.schedules_by_project(entity_id).await?;
        let events = self.store.events_for_project(entity_id).await?;
        let snapshots = self.store.snapshots_for_entity(entity_id).await?;
        let jobs = self.store.jobs_for_project(entity_id).await?;

        let mut outcome = CascadeOutcome {
            operation: CascadeOperation::Delete,
            entity_id: entity_id.to_string(),
            affected_schedules: Vec::new(),
            affected_events: Vec::new(),
            affected_snapshots: Vec::new(),
            affected_jobs: Vec::new(),
            entity_processed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            backup: None,
            duration_ms: 0,
        };

        if options.create_backup {
            let backup = CascadeBackup {
                project: project.clone(),
                schedules: schedules.clone(),
                events: events.clone(),
                snapshots: snapshots.clone(),
                jobs: jobs.clone(),
                created_at: Utc::now(),
            };
            if verify_backup(&backup) {
                outcome.backup = Some(backup);
            } else {
                // Nothing destructive may run without a verified backup.
                outcome.errors.push(CascadeStepError {
                    step: "backup",
                    message: "backup failed round-trip verification".to_string(),
                    recoverable: false,
                });
                outcome.duration_ms = clock.elapsed().as_millis() as u64;
                tracing::error!(entity_id, "Cascade aborted: backup verification failed");
                return Ok(outcome);
            }
        }

        for schedule in &schedules {
            match self.store.delete_schedule(&schedule.id).await {
                Ok(()) => outcome.affected_schedules.push(schedule.id.clone()),
                // A surviving schedule would be orphaned by the project
                // delete, so this blocks the entity removal.
                Err(e) => outcome.errors.push(step_error("delete_schedules", e, false)),
            }
        }
        for event in &events {
            match self.store.delete_event(&event.id).await {
                Ok(()) => outcome.affected_events.push(event.id.clone()),
                Err(e) => outcome.errors.push(step_error("delete_events", e, true)),
            }
        }
        for snapshot in &snapshots {
            match self.store.delete_snapshot(&snapshot.id).await {
                Ok(()) => outcome.affected_snapshots.push(snapshot.id.clone()),
                Err(e) => outcome.errors.push(step_error("delete_snapshots", e, true)),
            }
        }
        for job in &jobs {
            match self.store.delete_job(&job.id).await {
                Ok(()) => outcome.affected_jobs.push(job.id.clone()),
                Err(e) => outcome.errors.push(step_error("delete_jobs", e, true)),
            }
        }

        if outcome.errors.iter().any(|e| !e.recoverable) {
            outcome
                .warnings
                .push("entity retained: unrecoverable step error".to_string());
        } else {
            match self.store.delete_project(entity_id).await {
                Ok(()) => outcome.entity_processed = true,
                Err(e) => outcome.errors.push(step_error("delete_entity", e, true)),
            }
        }

        outcome.duration_ms = clock.elapsed().as_millis() as u64;
        self.publish_completed(&outcome);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    /// Archive a project and propagate the flag to its schedules instead
    /// of deleting anything.
    pub async fn archive_cascade(&self, entity_id: &str) -> Result<CascadeOutcome, EngineError> {
        let clock = std::time::Instant::now();
        let mut project = self.load_project(entity_id).await?;
        let schedules = self.store.schedules_by_project(entity_id).await?;

        let mut outcome = CascadeOutcome {
            operation: CascadeOperation::Archive,
            entity_id: entity_id.to_string(),
            affected_schedules: Vec::new(),
            affected_events: Vec::new(),
            affected_snapshots: Vec::new(),
            affected_jobs: Vec::new(),
            entity_processed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            backup: None,
            duration_ms: 0,
        };

        for mut schedule in schedules {
            if schedule.archived {
                continue;
            }
            schedule.archived = true;
            schedule.updated_at = Utc::now();
            let id = schedule.id.clone();
            match self.store.update_schedule(schedule).await {
                Ok(()) => outcome.affected_schedules.push(id),
                Err(e) => outcome.errors.push(step_error("archive_schedules", e, true)),
            }
        }

        project.archived = true;
        match self.store.update_project(project).await {
            Ok(()) => outcome.entity_processed = true,
            Err(e) => outcome.errors.push(step_error("archive_entity", e, true)),
        }

        outcome.duration_ms = clock.elapsed().as_millis() as u64;
        self.publish_completed(&outcome);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    /// Move a project's schedules to another project under a merge
    /// strategy. The source project keeps its other records and is left in
    /// place, childless.
    pub async fn transfer_cascade(
        &self,
        entity_id: &str,
        new_parent_id: &str,
        strategy: MergeStrategy,
    ) -> Result<CascadeOutcome, EngineError> {
        let clock = std::time::Instant::now();
        self.load_project(entity_id).await?;
        self.load_project(new_parent_id).await?;
        let source = self.store.schedules_by_project(entity_id).await?;
        let target = self.store.schedules_by_project(new_parent_id).await?;

        let mut outcome = CascadeOutcome {
            operation: CascadeOperation::Transfer,
            entity_id: entity_id.to_string(),
            affected_schedules: Vec::new(),
            affected_events: Vec::new(),
            affected_snapshots: Vec::new(),
            affected_jobs: Vec::new(),
            entity_processed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            backup: None,
            duration_ms: 0,
        };

        if strategy == MergeStrategy::Replace {
            for schedule in &target {
                match self.store.delete_schedule(&schedule.id).await {
                    Ok(()) => outcome.affected_schedules.push(schedule.id.clone()),
                    Err(e) => outcome.errors.push(step_error("replace_target", e, true)),
                }
            }
        }

        let mut next_ordinal = match strategy {
            MergeStrategy::Append => {
                target.iter().map(|s| s.sequence_ordinal).max().unwrap_or(0) + 1
            }
            _ => 0,
        };
        let taken: Vec<String> = if strategy == MergeStrategy::Merge {
            target.iter().map(|s| s.sequence_key()).collect()
        } else {
            Vec::new()
        };

        for mut schedule in source {
            schedule.project_id = new_parent_id.to_string();
            if strategy == MergeStrategy::Append {
                schedule.sequence_ordinal = next_ordinal;
                next_ordinal += 1;
            }
            if strategy == MergeStrategy::Merge && taken.contains(&schedule.sequence_key()) {
                outcome
                    .warnings
                    .push(format!("schedule '{}' dropped: slot taken on target", schedule.id));
                match self.store.delete_schedule(&schedule.id).await {
                    Ok(()) => outcome.affected_schedules.push(schedule.id.clone()),
                    Err(e) => outcome.errors.push(step_error("merge_drop", e, true)),
                }
                continue;
            }
            schedule.updated_at = Utc::now();
            let id = schedule.id.clone();
            match self.store.update_schedule(schedule).await {
                Ok(()) => outcome.affected_schedules.push(id),
                Err(e) => outcome.errors.push(step_error("transfer_schedules", e, true)),
            }
        }

        outcome.entity_processed = true;
        outcome.duration_ms = clock.elapsed().as_millis() as u64;
        self.publish_completed(&outcome);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Recreate every record captured in a backup. Records that already
    /// exist are reported as warnings, not errors, so a partially-failed
    /// cascade can be restored over its own leftovers.
    pub async fn restore_backup(&self, backup: &CascadeBackup) -> Result<usize, EngineError> {
        let mut restored = 0usize;
        if self.store.get_project(&backup.project.id).await?.is_none() {
            self.store.create_project(backup.project.clone()).await?;
            restored += 1;
        }
        for schedule in &backup.schedules {
            if self.store.get_schedule(&schedule.id).await?.is_none() {
                self.store.create_schedule(schedule.clone()).await?;
                restored += 1;
            }
        }
        for event in &backup.events {
            self.store.append_event(event.clone()).await?;
            restored += 1;
        }
        for snapshot in &backup.snapshots {
            self.store.create_stored_snapshot(snapshot.clone()).await?;
            restored += 1;
        }
        for job in &backup.jobs {
            self.store.enqueue_job(job.clone()).await?;
            restored += 1;
        }
        tracing::info!(project = %backup.project.id, restored, "Backup restored");
        Ok(restored)
    }

    fn publish_completed(&self, outcome: &CascadeOutcome) {
        tracing::info!(
            entity_id = %outcome.entity_id,
            operation = outcome.operation.as_str(),
            affected = outcome.affected_schedules.len(),
            errors = outcome.errors.len(),
            "Cascade finished"
        );
        self.bus.publish(EngineEvent::CascadeCompleted {
            entity_id: outcome.entity_id.clone(),
            operation: outcome.operation.as_str().to_string(),
            deleted: outcome.affected_schedules.len()
                + outcome.affected_events.len()
                + outcome.affected_snapshots.len()
                + outcome.affected_jobs.len(),
            errors: outcome.errors.len(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deletion risk from upcoming meetings, lifecycle activity, and volume.
fn deletion_risk(upcoming: usize, active: bool, total_related: usize) -> RiskLevel {
    if upcoming > 10 || (active && upcoming > 5) {
        RiskLevel::Critical
    } else if active && upcoming > 0 {
        RiskLevel::High
    } else if upcoming > 0 || total_related > HIGH_VOLUME_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// A backup is restorable iff it survives a serialize/deserialize
/// round-trip intact.
fn verify_backup(backup: &CascadeBackup) -> bool {
    let Ok(raw) = serde_json::to_vec(backup) else {
        return false;
    };
    match serde_json::from_slice::<CascadeBackup>(&raw) {
        Ok(restored) => restored == *backup,
        Err(_) => false,
    }
}

fn step_error(
    step: &'static str,
    err: syncline_store::StoreError,
    recoverable: bool,
) -> CascadeStepError {
    CascadeStepError {
        step,
        message: err.to_string(),
        recoverable,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
