//! Engine-level error taxonomy.
//!
//! Errors returned across the facade boundary are caller errors only:
//! calling at the wrong time (`AlreadyRunning`, `CooldownActive`,
//! `InvalidTransition`), naming an unknown entity, or an unrecoverable
//! collaborator failure. Expected migration failures (rule failures,
//! per-record conversion errors, cascade step errors) are reported inside
//! result objects, never through this type.

use thiserror::Error;

use syncline_core::CoreError;
use syncline_store::StoreError;

use crate::run::RunState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A migration run is already in progress")]
    AlreadyRunning,

    #[error("A migration completed recently; retry in {remaining_secs}s or pass force")]
    CooldownActive { remaining_secs: i64 },

    #[error("Retry policy denied run '{run_id}'")]
    RetryDenied { run_id: String },

    #[error("Cannot {action} from state {from:?}")]
    InvalidTransition {
        from: RunState,
        action: &'static str,
    },

    #[error("Project '{0}' not found")]
    UnknownProject(String),

    #[error("Schedule '{0}' not found")]
    UnknownSchedule(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}
