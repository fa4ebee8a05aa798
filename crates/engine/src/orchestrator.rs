//! Migration orchestrator.
//!
//! Drives one run at a time through the full pipeline: retry and cooldown
//! gates, fail-fast pre-validation, scope resolution, per-record
//! conversion and identity resolution with partial-success error
//! collection, commit, post-validation, and reporting. Pause and cancel
//! are cooperative and honored between records only, so no partial record
//! is ever committed twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use syncline_core::conflict::identity::{resolve_identity, IdentityConflict};
use syncline_core::model::{LegacyMeeting, Project, Schedule};
use syncline_core::validation::builtin::{register_builtin, CHAIN_POST_MIGRATION, CHAIN_PRE_MIGRATION};
use syncline_core::validation::engine::ValidationEngine;
use syncline_core::validation::rules::ValidationInput;
use syncline_events::{EngineEvent, EventBus};
use syncline_store::{MigrationStore, RunRecord};

use crate::error::EngineError;
use crate::history::RunHistory;
use crate::retry::RetryPolicy;
use crate::run::{
    valid_transition, MigrationError, MigrationErrorKind, MigrationOptions, MigrationReport,
    RunProgress, RunState,
};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct MigrationOrchestrator {
    store: Arc<dyn MigrationStore>,
    retry: Arc<dyn RetryPolicy>,
    bus: Arc<EventBus>,
    validation: ValidationEngine,
    history: Mutex<RunHistory>,
    running: AtomicBool,
    state: StdMutex<RunState>,
    pause_tx: watch::Sender<bool>,
    cancel: StdMutex<CancellationToken>,
}

/// Clears the single-flight flag and the pause request when a run exits,
/// on every path.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    pause_tx: &'a watch::Sender<bool>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let _ = self.pause_tx.send(false);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl MigrationOrchestrator {
    /// Wire an orchestrator to its collaborators and load the persisted
    /// run history.
    pub async fn new(
        store: Arc<dyn MigrationStore>,
        retry: Arc<dyn RetryPolicy>,
        bus: Arc<EventBus>,
    ) -> Result<Self, EngineError> {
        let mut validation = ValidationEngine::new();
        register_builtin(&mut validation);
        let history = RunHistory::load(store.as_ref()).await?;
        let (pause_tx, _) = watch::channel(false);
        Ok(Self {
            store,
            retry,
            bus,
            validation,
            history: Mutex::new(history),
            running: AtomicBool::new(false),
            state: StdMutex::new(RunState::Idle),
            pause_tx,
            cancel: StdMutex::new(CancellationToken::new()),
        })
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, to: RunState) {
        *self.state.lock().expect("state lock poisoned") = to;
    }

    /// Request a pause. Only valid while `Running`; honored between
    /// records.
    pub fn pause(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if !valid_transition(*state, RunState::Paused) {
            return Err(EngineError::InvalidTransition {
                from: *state,
                action: "pause",
            });
        }
        *state = RunState::Paused;
        let _ = self.pause_tx.send(true);
        tracing::info!("Migration pause requested");
        Ok(())
    }

    /// Resume a paused run.
    pub fn resume(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != RunState::Paused {
            return Err(EngineError::InvalidTransition {
                from: *state,
                action: "resume",
            });
        }
        *state = RunState::Running;
        let _ = self.pause_tx.send(false);
        tracing::info!("Migration resumed");
        Ok(())
    }

    /// Request cancellation. Valid from `Running` or `Paused`; the run
    /// observes the signal between records and already-committed records
    /// stay committed.
    pub fn cancel(&self) -> Result<(), EngineError> {
        let state = self.state();
        if !matches!(state, RunState::Running | RunState::Paused) {
            return Err(EngineError::InvalidTransition {
                from: state,
                action: "cancel",
            });
        }
        self.cancel.lock().expect("cancel lock poisoned").cancel();
        // Wake a paused run so it can observe the cancellation.
        let _ = self.pause_tx.send(false);
        tracing::info!("Migration cancellation requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // migrate
    // -----------------------------------------------------------------------

    /// Run one migration. Exactly one run may be active; a second call
    /// while one is in flight returns [`EngineError::AlreadyRunning`]
    /// without queueing.
    pub async fn migrate(
        &self,
        options: MigrationOptions,
    ) -> Result<MigrationReport, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }
        let _guard = RunGuard {
            running: &self.running,
            pause_tx: &self.pause_tx,
        };

        let now = Utc::now();
        if !options.force {
            let history = self.history.lock().await;
            if let Some(remaining_secs) = history.cooldown_remaining(now) {
                return Err(EngineError::CooldownActive { remaining_secs });
            }
        }

        // A re-attempt keeps the identity of the run it retries, so the
        // policy counts attempts against the logical run rather than a
        // fresh id every time.
        let run_id = options
            .retry_of
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if !options.force && !self.retry.should_retry(&run_id).await {
            return Err(EngineError::RetryDenied { run_id });
        }
        self.retry.record_attempt(&run_id).await;

        // Fresh cancellation token and cleared pause flag for this run.
        let token = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock poisoned") = token.clone();
        let _ = self.pause_tx.send(false);
        self.set_state(RunState::Running);
        tracing::info!(run_id, ?options, "Migration run starting");

        match self.execute(&run_id, &options, token).await {
            Ok(report) => {
                self.finish(&report).await?;
                if let Some(cb) = &options.on_complete {
                    cb(&report);
                }
                Ok(report)
            }
            Err(err) => {
                // Infrastructure failure mid-run: record the outcome, then
                // surface the error to the caller.
                tracing::error!(run_id, error = %err, "Migration run aborted by error");
                self.set_state(RunState::Failed);
                self.retry.mark_failed(&run_id, &err.to_string()).await;
                self.bus.publish(EngineEvent::RunFailed {
                    run_id: run_id.clone(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Post-run bookkeeping shared by every non-error outcome.
    async fn finish(&self, report: &MigrationReport) -> Result<(), EngineError> {
        let state = if report.success {
            RunState::Completed
        } else {
            RunState::Failed
        };
        self.set_state(state);

        let record_state = if report.summary.starts_with("cancelled") {
            "cancelled"
        } else {
            state.as_str()
        };
        if report.success {
            self.retry.mark_completed(&report.run_id).await;
            self.bus.publish(EngineEvent::RunCompleted {
                run_id: report.run_id.clone(),
                migrated: report.migrated,
                failed: report.errors.len(),
                duration_ms: report.duration_ms,
            });
        } else {
            self.retry.mark_failed(&report.run_id, &report.summary).await;
            self.bus.publish(EngineEvent::RunFailed {
                run_id: report.run_id.clone(),
                reason: report.summary.clone(),
            });
        }

        let mut history = self.history.lock().await;
        history
            .append(
                self.store.as_ref(),
                RunRecord {
                    run_id: report.run_id.clone(),
                    started_at: report.started_at,
                    finished_at: Utc::now(),
                    state: record_state.to_string(),
                    migrated: report.migrated,
                    failed: report.errors.len(),
                },
            )
            .await?;
        tracing::info!(
            run_id = %report.run_id,
            success = report.success,
            migrated = report.migrated,
            errors = report.errors.len(),
            "Migration run finished"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    async fn execute(
        &self,
        run_id: &str,
        options: &MigrationOptions,
        token: CancellationToken,
    ) -> Result<MigrationReport, EngineError> {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let projects = self.store.list_projects().await?;
        let schedules = self.store.list_schedules().await?;
        let meetings = self.store.list_legacy_meetings().await?;
        let records_before = schedules.len();

        let mut errors: Vec<MigrationError> = Vec::new();
        let mut conflicts: Vec<IdentityConflict> = Vec::new();

        // (1) Pre-migration validation: abort before any mutation on a
        // critical failure.
        if !options.skip_validation {
            let input = validation_input(
                &projects,
                &schedules,
                &meetings,
                records_before,
                records_before,
                options,
            );
            let pre = self.validation.validate_chain(CHAIN_PRE_MIGRATION, &input).await?;
            if !pre.passed() {
                for result in pre.results.iter().filter(|r| r.is_critical_failure()) {
                    let error = MigrationError {
                        record_id: String::new(),
                        kind: MigrationErrorKind::ValidationError,
                        message: format!("{}: {}", result.rule_id, result.message),
                    };
                    if let Some(cb) = &options.on_error {
                        cb(&error);
                    }
                    errors.push(error);
                }
                tracing::warn!(run_id, failures = errors.len(), "Pre-migration validation failed");
                return Ok(MigrationReport {
                    run_id: run_id.to_string(),
                    success: false,
                    migrated: 0,
                    skipped: 0,
                    conflicts,
                    errors,
                    started_at,
                    duration_ms: clock.elapsed().as_millis() as u64,
                    summary: "aborted: pre-migration validation failed".to_string(),
                });
            }
        }

        // (2) Scope resolution: the exact record set for this run.
        let selected = options.scope.resolve(&projects, &meetings);
        let total = selected.len();
        self.bus.publish(EngineEvent::RunStarted {
            run_id: run_id.to_string(),
            total_records: total,
            started_at,
        });

        // (3) Per-record conversion + identity resolution + commit.
        let mut existing = schedules;
        let mut migrated = 0usize;
        let mut skipped = 0usize;
        let mut cancelled = false;
        let mut pause_rx = self.pause_tx.subscribe();

        for (processed, meeting) in selected.into_iter().enumerate() {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }
            // Honor a pause request between records; a cancellation wakes
            // the wait.
            while *pause_rx.borrow() && !token.is_cancelled() {
                tokio::select! {
                    _ = pause_rx.changed() => {}
                    _ = token.cancelled() => {}
                }
            }
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            match self
                .migrate_record(meeting, &mut existing, &mut conflicts, &mut errors, options)
                .await
            {
                RecordOutcome::Migrated => migrated += 1,
                RecordOutcome::Skipped => skipped += 1,
                RecordOutcome::Errored => {}
            }

            let progress = RunProgress {
                run_id: run_id.to_string(),
                processed: processed + 1,
                total,
                percent: ((processed + 1) * 100 / total.max(1)) as u8,
                phase: "converting records".to_string(),
            };
            if let Some(cb) = &options.on_progress {
                cb(&progress);
            }
            self.bus.publish(EngineEvent::RunProgress {
                run_id: run_id.to_string(),
                processed: progress.processed,
                total_records: total,
                migrated,
                failed: errors.len(),
            });
        }

        if cancelled {
            tracing::warn!(run_id, migrated, "Migration cancelled; committed records remain");
            return Ok(MigrationReport {
                run_id: run_id.to_string(),
                success: false,
                migrated,
                skipped,
                conflicts,
                errors,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
                summary: "cancelled by operator".to_string(),
            });
        }

        // (4) Post-migration validation over the committed state.
        let mut post_ok = true;
        if !options.skip_validation {
            let after = self.store.list_schedules().await?;
            let input = validation_input(
                &projects,
                &after,
                &meetings,
                records_before,
                after.len(),
                options,
            );
            let post = self.validation.validate_chain(CHAIN_POST_MIGRATION, &input).await?;
            post_ok = post.passed();
            for result in post.results.iter().filter(|r| r.is_critical_failure()) {
                let error = MigrationError {
                    record_id: String::new(),
                    kind: MigrationErrorKind::ValidationError,
                    message: format!("{}: {}", result.rule_id, result.message),
                };
                if let Some(cb) = &options.on_error {
                    cb(&error);
                }
                errors.push(error);
            }
        }

        let summary = if post_ok {
            format!("migrated {migrated} of {total} records ({skipped} skipped, {} errors)", errors.len())
        } else {
            "post-migration validation failed".to_string()
        };
        Ok(MigrationReport {
            run_id: run_id.to_string(),
            success: post_ok,
            migrated,
            skipped,
            conflicts,
            errors,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            summary,
        })
    }

    /// Convert, resolve identity, and commit one record. Failures are
    /// isolated: they are collected and the batch continues.
    async fn migrate_record(
        &self,
        meeting: LegacyMeeting,
        existing: &mut Vec<Schedule>,
        conflicts: &mut Vec<IdentityConflict>,
        errors: &mut Vec<MigrationError>,
        options: &MigrationOptions,
    ) -> RecordOutcome {
        let candidate = match meeting.to_schedule(Utc::now()) {
            Ok(schedule) => schedule,
            Err(err) => {
                let error = MigrationError {
                    record_id: meeting.id.clone(),
                    kind: MigrationErrorKind::ConversionError,
                    message: err.to_string(),
                };
                if let Some(cb) = &options.on_error {
                    cb(&error);
                }
                errors.push(error);
                return RecordOutcome::Errored;
            }
        };

        let outcome = resolve_identity(candidate, existing);
        if let Some(conflict) = outcome.conflict() {
            tracing::debug!(
                incoming = %conflict.incoming_id,
                resolution = conflict.resolution.as_str(),
                "Identity conflict resolved"
            );
            conflicts.push(conflict.clone());
        }
        let Some(schedule) = outcome.schedule().cloned() else {
            return RecordOutcome::Skipped;
        };

        match self.store.create_schedule(schedule.clone()).await {
            Ok(()) => {
                existing.push(schedule);
                RecordOutcome::Migrated
            }
            Err(err) => {
                let error = MigrationError {
                    record_id: schedule.id.clone(),
                    kind: MigrationErrorKind::CreationError,
                    message: err.to_string(),
                };
                if let Some(cb) = &options.on_error {
                    cb(&error);
                }
                errors.push(error);
                RecordOutcome::Errored
            }
        }
    }
}

enum RecordOutcome {
    Migrated,
    Skipped,
    Errored,
}

fn validation_input(
    projects: &[Project],
    schedules: &[Schedule],
    meetings: &[LegacyMeeting],
    records_before: usize,
    records_after: usize,
    options: &MigrationOptions,
) -> ValidationInput {
    ValidationInput {
        projects: projects.to_vec(),
        schedules: schedules.to_vec(),
        legacy_meetings: meetings.to_vec(),
        records_before,
        records_after,
        reported_deletions: 0,
        batch_size: options.scope.options.batch_size,
    }
}
