//! `syncline-engine` library crate.
//!
//! Async orchestration over the pure domain logic in `syncline-core`:
//! the migration run state machine, consistency auditing and recovery,
//! cascade operations, run history, and the retry seam. [`MigrationEngine`]
//! is the embedding surface; everything it needs is injected at
//! construction.

pub mod cascade;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod recovery;
pub mod retry;
pub mod run;
pub mod telemetry;

use std::sync::Arc;

use tokio::sync::broadcast;

use syncline_core::consistency::SystemHealthReport;
use syncline_events::{EngineEvent, EventBus};
use syncline_store::MigrationStore;

pub use cascade::{
    CascadeManager, CascadeOptions, CascadeOutcome, DeletionConfirmation, MergeStrategy,
};
pub use error::EngineError;
pub use orchestrator::MigrationOrchestrator;
pub use recovery::{RecoveryManager, RecoveryReport};
pub use retry::{MemoryRetryPolicy, RetryPolicy};
pub use run::{MigrationOptions, MigrationReport, RunState};

// ---------------------------------------------------------------------------
// MigrationEngine
// ---------------------------------------------------------------------------

/// Facade over the orchestrator, recovery manager, and cascade manager.
///
/// Expected failures (rule failures, per-record errors, cascade step
/// errors) live inside the returned result objects; `Err` means the call
/// itself was invalid or a collaborator failed outright.
pub struct MigrationEngine {
    orchestrator: MigrationOrchestrator,
    recovery: RecoveryManager,
    cascade: CascadeManager,
    bus: Arc<EventBus>,
}

impl MigrationEngine {
    /// Wire an engine to its store and retry collaborators.
    pub async fn new(
        store: Arc<dyn MigrationStore>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Result<Self, EngineError> {
        let bus = Arc::new(EventBus::default());
        Ok(Self {
            orchestrator: MigrationOrchestrator::new(
                Arc::clone(&store),
                retry,
                Arc::clone(&bus),
            )
            .await?,
            recovery: RecoveryManager::new(Arc::clone(&store), Arc::clone(&bus)),
            cascade: CascadeManager::new(store, Arc::clone(&bus)),
            bus,
        })
    }

    /// Run one migration. See [`MigrationOrchestrator::migrate`].
    pub async fn migrate(
        &self,
        options: MigrationOptions,
    ) -> Result<MigrationReport, EngineError> {
        self.orchestrator.migrate(options).await
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.orchestrator.pause()
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.orchestrator.resume()
    }

    pub fn cancel(&self) -> Result<(), EngineError> {
        self.orchestrator.cancel()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.orchestrator.state()
    }

    /// Audit the store for inconsistencies.
    pub async fn health_check(&self) -> Result<SystemHealthReport, EngineError> {
        self.recovery.health_check().await
    }

    /// Apply deterministic fixes for auto-fixable findings.
    pub async fn auto_recover(
        &self,
        issues: &[syncline_core::consistency::Inconsistency],
    ) -> Result<RecoveryReport, EngineError> {
        self.recovery.auto_recover(issues).await
    }

    /// Impact analysis for a prospective deletion.
    pub async fn analyze_deletion_impact(
        &self,
        entity_id: &str,
    ) -> Result<DeletionConfirmation, EngineError> {
        self.cascade.analyze_deletion_impact(entity_id).await
    }

    pub async fn delete_cascade(
        &self,
        entity_id: &str,
        options: CascadeOptions,
    ) -> Result<CascadeOutcome, EngineError> {
        self.cascade.delete_cascade(entity_id, options).await
    }

    pub async fn archive_cascade(&self, entity_id: &str) -> Result<CascadeOutcome, EngineError> {
        self.cascade.archive_cascade(entity_id).await
    }

    pub async fn transfer_cascade(
        &self,
        entity_id: &str,
        new_parent_id: &str,
        strategy: MergeStrategy,
    ) -> Result<CascadeOutcome, EngineError> {
        self.cascade
            .transfer_cascade(entity_id, new_parent_id, strategy)
            .await
    }

    /// Detect time conflicts between a committed schedule and the rest of
    /// the data set.
    pub async fn schedule_conflicts(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<syncline_core::conflict::time::ScheduleConflict>, EngineError> {
        let store = self.cascade.store();
        let schedule = store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| EngineError::UnknownSchedule(schedule_id.to_string()))?;
        let others: Vec<_> = store
            .list_schedules()
            .await?
            .into_iter()
            .filter(|s| s.id != schedule.id)
            .collect();
        Ok(syncline_core::conflict::time::detect_conflicts(
            &schedule, &others,
        ))
    }

    /// Restore the records captured by a cascade backup.
    pub async fn restore_backup(
        &self,
        backup: &cascade::CascadeBackup,
    ) -> Result<usize, EngineError> {
        self.cascade.restore_backup(backup).await
    }

    /// Subscribe to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }
}
