//! Migration run state machine and result shapes.
//!
//! A run moves `Idle → Running → {Completed | Failed}`, with `Running ⇄
//! Paused` and cancellation reachable from either active state. Transition
//! legality lives in [`valid_transition`] so the orchestrator never
//! hand-rolls state checks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use syncline_core::conflict::identity::IdentityConflict;
use syncline_core::scope::Scope;
use syncline_core::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Whether `from → to` is a legal state transition.
///
/// Cancellation lands in `Failed` from either active state; completed
/// records stay committed regardless.
pub fn valid_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;
    matches!(
        (from, to),
        (Idle, Running)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Paused, Failed)
    )
}

// ---------------------------------------------------------------------------
// Options and callbacks
// ---------------------------------------------------------------------------

/// Progress notification passed to the optional `on_progress` callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: EntityId,
    pub processed: usize,
    pub total: usize,
    /// Monotonically increasing, 0..=100.
    pub percent: u8,
    /// Human-readable phase, e.g. `"converting records"`.
    pub phase: String,
}

pub type ProgressCallback = Arc<dyn Fn(&RunProgress) + Send + Sync>;
pub type CompletionCallback = Arc<dyn Fn(&MigrationReport) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&MigrationError) + Send + Sync>;

/// Options for one `migrate` call.
#[derive(Clone, Default)]
pub struct MigrationOptions {
    pub scope: Scope,
    /// Bypass the retry gate and the cooldown window.
    pub force: bool,
    /// Id of the failed run this call re-attempts. The new run keeps that
    /// identity, so the retry policy counts attempts against it; `None`
    /// starts a fresh run under a new id.
    pub retry_of: Option<EntityId>,
    /// Skip both validation chains. Intended for recovery tooling only.
    pub skip_validation: bool,
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompletionCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for MigrationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("scope", &self.scope)
            .field("force", &self.force)
            .field("retry_of", &self.retry_of)
            .field("skip_validation", &self.skip_validation)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Per-record errors and the run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationErrorKind {
    ValidationError,
    ConversionError,
    CreationError,
}

impl MigrationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ConversionError => "conversion_error",
            Self::CreationError => "creation_error",
        }
    }
}

/// One collected, non-aborting failure. `record_id` is empty for run-level
/// validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationError {
    pub record_id: EntityId,
    pub kind: MigrationErrorKind,
    pub message: String,
}

/// Structured result of one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: EntityId,
    /// True when the run reached post-validation without aborting and no
    /// critical post-migration rule failed. Per-record errors do not flip
    /// this on their own.
    pub success: bool,
    pub migrated: usize,
    pub skipped: usize,
    pub conflicts: Vec<IdentityConflict>,
    pub errors: Vec<MigrationError>,
    pub started_at: Timestamp,
    pub duration_ms: u64,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
