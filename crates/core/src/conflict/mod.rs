//! Conflict detection and resolution.
//!
//! Two independent vocabularies: record-identity collisions between
//! incoming and existing records ([`identity`]) and time-overlap collisions
//! between committed schedules ([`time`]).

pub mod identity;
pub mod time;
