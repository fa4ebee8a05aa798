//! `syncline-core` library crate.
//!
//! Pure domain logic for the migration engine: the unified scheduling
//! model, scope selection, the validation rule engine, identity and
//! time-conflict resolution, and consistency auditing. No I/O and no
//! async runtime dependency live here; orchestration is the engine
//! crate's job.

pub mod conflict;
pub mod consistency;
pub mod error;
pub mod model;
pub mod scope;
pub mod types;
pub mod validation;

pub use error::CoreError;
pub use types::{EntityId, Timestamp};
