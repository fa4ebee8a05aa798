//! Record-identity conflict resolution between incoming and existing
//! schedules.
//!
//! Resolution is a pure function of the incoming record and the existing
//! set: the same inputs always produce the same decision, and exactly one
//! rule ever applies per record (first match wins).

use serde::{Deserialize, Serialize};

use crate::model::Schedule;
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Two same-project meetings starting within this window are treated as
/// the same meeting exported twice.
pub const PROXIMITY_TOLERANCE_SECS: i64 = 60;

/// Title annotation applied to records kept through a merge resolution.
pub const MIGRATED_DUPLICATE_TAG: &str = "(migrated duplicate)";

// ---------------------------------------------------------------------------
// Conflict record
// ---------------------------------------------------------------------------

/// What kind of collision was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityConflictType {
    ExactId,
    DateProximity,
    SequenceDuplicate,
}

impl IdentityConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactId => "exact_id",
            Self::DateProximity => "date_proximity",
            Self::SequenceDuplicate => "sequence_duplicate",
        }
    }
}

/// Which resolution was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityResolution {
    Rename,
    Merge,
    Skip,
}

impl IdentityResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::Merge => "merge",
            Self::Skip => "skip",
        }
    }
}

/// Audit record of one resolved identity conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConflict {
    pub conflict_type: IdentityConflictType,
    pub incoming_id: EntityId,
    pub existing_id: EntityId,
    pub resolution: IdentityResolution,
    pub rationale: String,
}

/// The outcome of resolving one incoming record against the existing set.
#[derive(Debug, Clone)]
pub enum IdentityOutcome {
    /// No collision: commit the record as converted.
    Clean(Schedule),
    /// A collision was resolved; `schedule` is the (possibly rewritten)
    /// record to commit, or `None` when the record is skipped entirely.
    Resolved {
        schedule: Option<Schedule>,
        conflict: IdentityConflict,
    },
}

impl IdentityOutcome {
    /// The record to commit, if any.
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Self::Clean(s) => Some(s),
            Self::Resolved { schedule, .. } => schedule.as_ref(),
        }
    }

    /// The conflict audit record, if a collision was resolved.
    pub fn conflict(&self) -> Option<&IdentityConflict> {
        match self {
            Self::Clean(_) => None,
            Self::Resolved { conflict, .. } => Some(conflict),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve one incoming record against the existing schedule set.
///
/// Checks apply in a fixed order; the first matching rule decides:
///
/// 1. exact-ID match — rename the incoming record with a uniqueness suffix
/// 2. same-project start within [`PROXIMITY_TOLERANCE_SECS`] — keep both,
///    annotate the incoming title as a migrated duplicate
/// 3. same project + sequence ordinal — skip the incoming record
pub fn resolve_identity(incoming: Schedule, existing: &[Schedule]) -> IdentityOutcome {
    // (a) exact-ID collision
    if let Some(hit) = existing.iter().find(|s| s.id == incoming.id) {
        let new_id = unique_rename(&incoming.id, existing);
        let conflict = IdentityConflict {
            conflict_type: IdentityConflictType::ExactId,
            incoming_id: incoming.id.clone(),
            existing_id: hit.id.clone(),
            resolution: IdentityResolution::Rename,
            rationale: format!(
                "Id '{}' already exists; incoming record renamed to '{new_id}'",
                incoming.id
            ),
        };
        let mut renamed = incoming;
        renamed.id = new_id;
        return IdentityOutcome::Resolved {
            schedule: Some(renamed),
            conflict,
        };
    }

    // (b) date proximity within the same project
    if let Some(hit) = existing.iter().find(|s| {
        s.project_id == incoming.project_id
            && (s.starts_at - incoming.starts_at)
                .num_seconds()
                .abs()
                <= PROXIMITY_TOLERANCE_SECS
    }) {
        let conflict = IdentityConflict {
            conflict_type: IdentityConflictType::DateProximity,
            incoming_id: incoming.id.clone(),
            existing_id: hit.id.clone(),
            resolution: IdentityResolution::Merge,
            rationale: format!(
                "Starts within {PROXIMITY_TOLERANCE_SECS}s of '{}' in the same project; \
                 kept both, incoming annotated",
                hit.id
            ),
        };
        let mut annotated = incoming;
        if !annotated.title.ends_with(MIGRATED_DUPLICATE_TAG) {
            annotated.title = format!("{} {MIGRATED_DUPLICATE_TAG}", annotated.title);
        }
        return IdentityOutcome::Resolved {
            schedule: Some(annotated),
            conflict,
        };
    }

    // (c) composite sequence key collision
    if let Some(hit) = existing.iter().find(|s| {
        s.project_id == incoming.project_id && s.sequence_ordinal == incoming.sequence_ordinal
    }) {
        let conflict = IdentityConflict {
            conflict_type: IdentityConflictType::SequenceDuplicate,
            incoming_id: incoming.id.clone(),
            existing_id: hit.id.clone(),
            resolution: IdentityResolution::Skip,
            rationale: format!(
                "Sequence slot {} of project '{}' is already held by '{}'; incoming skipped",
                incoming.sequence_ordinal, incoming.project_id, hit.id
            ),
        };
        return IdentityOutcome::Resolved {
            schedule: None,
            conflict,
        };
    }

    IdentityOutcome::Clean(incoming)
}

/// Smallest `{id}-migrated-{n}` not taken by any existing record.
fn unique_rename(id: &str, existing: &[Schedule]) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{id}-migrated-{n}");
        if !existing.iter().any(|s| s.id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
