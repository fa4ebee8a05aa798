//! Consistency auditing against the live store, and best-effort recovery.
//!
//! Detection is delegated to `syncline_core::consistency`; this module
//! pulls the data, applies one deterministic fix per auto-fixable finding,
//! and records every fix with its before/after values. One item's failure
//! never blocks recovery of the others.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use syncline_core::consistency::{
    perform_health_check, Inconsistency, RecoveryStrategy, SystemHealthReport,
};
use syncline_core::model::DEFAULT_PHASE;
use syncline_core::types::EntityId;
use syncline_events::{EngineEvent, EventBus};
use syncline_store::MigrationStore;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Action records
// ---------------------------------------------------------------------------

/// One applied (or attempted) fix, with enough detail to audit it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub strategy: RecoveryStrategy,
    pub entity_id: EntityId,
    /// Entity state before the fix (`null` when the entity did not exist).
    pub before: serde_json::Value,
    /// Entity state after the fix (`null` when the fix deleted it).
    pub after: serde_json::Value,
    pub succeeded: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub actions: Vec<RecoveryAction>,
    pub fixed: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// RecoveryManager
// ---------------------------------------------------------------------------

pub struct RecoveryManager {
    store: Arc<dyn MigrationStore>,
    bus: Arc<EventBus>,
}

impl RecoveryManager {
    pub fn new(store: Arc<dyn MigrationStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Run the six detectors over the current store contents.
    pub async fn health_check(&self) -> Result<SystemHealthReport, EngineError> {
        let projects = self.store.list_projects().await?;
        let schedules = self.store.list_schedules().await?;
        let meetings = self.store.list_legacy_meetings().await?;
        let report = perform_health_check(&projects, &schedules, &meetings, Utc::now());
        tracing::info!(
            status = report.status.as_str(),
            issues = report.issues.len(),
            "Health check completed"
        );
        self.bus.publish(EngineEvent::HealthCheckCompleted {
            status: report.status,
            issue_count: report.issues.len(),
        });
        Ok(report)
    }

    /// Apply one deterministic fix per auto-fixable finding.
    ///
    /// Best-effort: individual failures are recorded in the returned
    /// report, never propagated.
    pub async fn auto_recover(
        &self,
        issues: &[Inconsistency],
    ) -> Result<RecoveryReport, EngineError> {
        let mut actions = Vec::new();
        for issue in issues.iter().filter(|i| i.auto_fixable) {
            match issue.suggested_strategy {
                RecoveryStrategy::DeleteOrphan | RecoveryStrategy::DeleteBrokenReference => {
                    self.delete_schedules(issue, &mut actions).await;
                }
                RecoveryStrategy::RecreateFromSource => {
                    self.recreate_from_source(issue, &mut actions).await;
                }
                RecoveryStrategy::KeepNewest => {
                    self.keep_newest(issue, &mut actions).await;
                }
                RecoveryStrategy::ResetPhase => {
                    self.reset_phases(issue, &mut actions).await;
                }
                RecoveryStrategy::RepairTimestamps => {
                    self.repair_timestamps(issue, &mut actions).await;
                }
            }
        }

        let fixed = actions.iter().filter(|a| a.succeeded).count();
        let failed = actions.len() - fixed;
        tracing::info!(fixed, failed, "Auto-recovery finished");
        self.bus.publish(EngineEvent::RecoveryApplied { fixed, failed });
        Ok(RecoveryReport { actions, fixed, failed })
    }

    // -----------------------------------------------------------------------
    // Strategies
    // -----------------------------------------------------------------------

    async fn delete_schedules(&self, issue: &Inconsistency, actions: &mut Vec<RecoveryAction>) {
        for id in &issue.affected_schedules {
            let before = match self.store.get_schedule(id).await {
                Ok(Some(s)) => serde_json::to_value(&s).unwrap_or_default(),
                _ => serde_json::Value::Null,
            };
            let result = self.store.delete_schedule(id).await;
            actions.push(action(
                issue.suggested_strategy,
                id.clone(),
                before,
                serde_json::Value::Null,
                result.map_err(|e| e.to_string()),
            ));
        }
    }

    async fn recreate_from_source(&self, issue: &Inconsistency, actions: &mut Vec<RecoveryAction>) {
        for meeting_id in &issue.affected_meetings {
            let result = self.recreate_one(meeting_id).await;
            let (after, result) = match result {
                Ok(value) => (value, Ok(())),
                Err(message) => (serde_json::Value::Null, Err(message)),
            };
            actions.push(action(
                RecoveryStrategy::RecreateFromSource,
                meeting_id.clone(),
                serde_json::Value::Null,
                after,
                result,
            ));
        }
    }

    async fn recreate_one(&self, meeting_id: &str) -> Result<serde_json::Value, String> {
        let meeting = self
            .store
            .get_legacy_meeting(meeting_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("legacy meeting '{meeting_id}' not found"))?;
        let schedule = meeting.to_schedule(Utc::now()).map_err(|e| e.to_string())?;
        let value = serde_json::to_value(&schedule).unwrap_or_default();
        self.store
            .create_schedule(schedule)
            .await
            .map_err(|e| e.to_string())?;
        Ok(value)
    }

    async fn keep_newest(&self, issue: &Inconsistency, actions: &mut Vec<RecoveryAction>) {
        let mut members = Vec::new();
        for id in &issue.affected_schedules {
            if let Ok(Some(s)) = self.store.get_schedule(id).await {
                members.push(s);
            }
        }
        // Deterministic winner: latest update, id as tie-breaker.
        let Some(keep) = members
            .iter()
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
            .map(|s| s.id.clone())
        else {
            return;
        };
        for schedule in members.into_iter().filter(|s| s.id != keep) {
            let before = serde_json::to_value(&schedule).unwrap_or_default();
            let result = self.store.delete_schedule(&schedule.id).await;
            actions.push(action(
                RecoveryStrategy::KeepNewest,
                schedule.id,
                before,
                serde_json::Value::Null,
                result.map_err(|e| e.to_string()),
            ));
        }
    }

    async fn reset_phases(&self, issue: &Inconsistency, actions: &mut Vec<RecoveryAction>) {
        for id in &issue.affected_projects {
            let result = self.reset_one_phase(id).await;
            let (before, result) = match result {
                Ok(old_phase) => (serde_json::json!({ "phase": old_phase }), Ok(())),
                Err(message) => (serde_json::Value::Null, Err(message)),
            };
            actions.push(action(
                RecoveryStrategy::ResetPhase,
                id.clone(),
                before,
                serde_json::json!({ "phase": DEFAULT_PHASE }),
                result,
            ));
        }
    }

    async fn reset_one_phase(&self, project_id: &str) -> Result<String, String> {
        let mut project = self
            .store
            .get_project(project_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("project '{project_id}' not found"))?;
        let old_phase = std::mem::replace(&mut project.phase, DEFAULT_PHASE.to_string());
        self.store
            .update_project(project)
            .await
            .map_err(|e| e.to_string())?;
        Ok(old_phase)
    }

    async fn repair_timestamps(&self, issue: &Inconsistency, actions: &mut Vec<RecoveryAction>) {
        for id in &issue.affected_schedules {
            let result = self.repair_one_timestamp(id).await;
            let (before, after, result) = match result {
                Ok((before, after)) => (before, after, Ok(())),
                Err(message) => (serde_json::Value::Null, serde_json::Value::Null, Err(message)),
            };
            actions.push(action(
                RecoveryStrategy::RepairTimestamps,
                id.clone(),
                before,
                after,
                result,
            ));
        }
    }

    async fn repair_one_timestamp(
        &self,
        schedule_id: &str,
    ) -> Result<(serde_json::Value, serde_json::Value), String> {
        let mut schedule = self
            .store
            .get_schedule(schedule_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("schedule '{schedule_id}' not found"))?;
        let before = serde_json::to_value(&schedule).unwrap_or_default();
        schedule.ends_at = schedule.starts_at + Duration::hours(1);
        schedule.updated_at = Utc::now();
        let after = serde_json::to_value(&schedule).unwrap_or_default();
        self.store
            .update_schedule(schedule)
            .await
            .map_err(|e| e.to_string())?;
        Ok((before, after))
    }
}

fn action(
    strategy: RecoveryStrategy,
    entity_id: EntityId,
    before: serde_json::Value,
    after: serde_json::Value,
    result: Result<(), String>,
) -> RecoveryAction {
    let (succeeded, error) = match result {
        Ok(()) => (true, None),
        Err(message) => (false, Some(message)),
    };
    RecoveryAction {
        strategy,
        entity_id,
        before,
        after,
        succeeded,
        error,
    }
}
