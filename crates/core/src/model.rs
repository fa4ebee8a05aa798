//! Unified scheduling entities and the legacy meeting record they are
//! migrated from.
//!
//! This module has zero internal dependencies beyond `types`/`error` (no
//! store access, no async, no I/O). It provides:
//!
//! - The target entities: projects, schedules, lifecycle events, snapshots,
//!   queued jobs
//! - The legacy meeting record shape and its conversion to a schedule
//! - Phase and status whitelists with string conversions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Project phases
// ---------------------------------------------------------------------------

/// Project not yet scheduled.
pub const PHASE_PLANNING: &str = "planning";
/// Meetings booked, work not started.
pub const PHASE_SCHEDULED: &str = "scheduled";
/// Work underway.
pub const PHASE_IN_PROGRESS: &str = "in_progress";
/// Deliverables under review.
pub const PHASE_REVIEW: &str = "review";
/// Terminal: all work done.
pub const PHASE_COMPLETED: &str = "completed";
/// Terminal: shelved.
pub const PHASE_ARCHIVED: &str = "archived";

/// All valid project phases.
pub const VALID_PHASES: &[&str] = &[
    PHASE_PLANNING,
    PHASE_SCHEDULED,
    PHASE_IN_PROGRESS,
    PHASE_REVIEW,
    PHASE_COMPLETED,
    PHASE_ARCHIVED,
];

/// Phases from which a project can no longer accrue meetings.
pub const TERMINAL_PHASES: &[&str] = &[PHASE_COMPLETED, PHASE_ARCHIVED];

/// Safe phase a project is reset to when its stored phase is invalid.
pub const DEFAULT_PHASE: &str = PHASE_PLANNING;

/// Validate that a phase string is one of the known phases.
pub fn validate_phase(phase: &str) -> Result<(), CoreError> {
    if VALID_PHASES.contains(&phase) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown project phase: '{phase}'. Valid phases: {}",
            VALID_PHASES.join(", ")
        )))
    }
}

/// Whether the phase allows further scheduling activity.
pub fn is_active_phase(phase: &str) -> bool {
    VALID_PHASES.contains(&phase) && !TERMINAL_PHASES.contains(&phase)
}

// ---------------------------------------------------------------------------
// Schedule statuses
// ---------------------------------------------------------------------------

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_TENTATIVE: &str = "tentative";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// All valid schedule statuses.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_DRAFT,
    STATUS_TENTATIVE,
    STATUS_CONFIRMED,
    STATUS_COMPLETED,
    STATUS_CANCELLED,
];

/// Validate that a schedule status is one of the known statuses.
pub fn validate_status(status: &str) -> Result<(), CoreError> {
    if VALID_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown schedule status: '{status}'. Valid statuses: {}",
            VALID_STATUSES.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Sequence (meeting) types
// ---------------------------------------------------------------------------

pub const SEQUENCE_KICKOFF: &str = "kickoff";
pub const SEQUENCE_PLANNING: &str = "planning";
pub const SEQUENCE_STANDUP: &str = "standup";
pub const SEQUENCE_REVIEW: &str = "review";
pub const SEQUENCE_RETROSPECTIVE: &str = "retrospective";
pub const SEQUENCE_ADHOC: &str = "adhoc";

/// All valid sequence types.
pub const VALID_SEQUENCE_TYPES: &[&str] = &[
    SEQUENCE_KICKOFF,
    SEQUENCE_PLANNING,
    SEQUENCE_STANDUP,
    SEQUENCE_REVIEW,
    SEQUENCE_RETROSPECTIVE,
    SEQUENCE_ADHOC,
];

/// Map an arbitrary legacy meeting-type string onto the sequence-type
/// whitelist. Unknown types fall back to `adhoc`.
pub fn normalize_sequence_type(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "kickoff" | "kick_off" | "kick-off" => SEQUENCE_KICKOFF,
        "planning" | "plan" => SEQUENCE_PLANNING,
        "standup" | "stand_up" | "daily" => SEQUENCE_STANDUP,
        "review" | "demo" => SEQUENCE_REVIEW,
        "retrospective" | "retro" => SEQUENCE_RETROSPECTIVE,
        _ => SEQUENCE_ADHOC,
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A project that owns schedules, lifecycle events, snapshots, and jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    /// One of [`VALID_PHASES`]. May hold an invalid value when the source
    /// data is corrupt; the consistency auditor detects and repairs this.
    pub phase: String,
    pub archived: bool,
    pub created_at: Timestamp,
}

/// A meeting in the unified scheduling model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: EntityId,
    pub project_id: EntityId,
    pub title: String,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    /// One of [`VALID_SEQUENCE_TYPES`].
    pub sequence_type: String,
    /// Position of this meeting within its project's meeting sequence.
    pub sequence_ordinal: i32,
    /// One of [`VALID_STATUSES`].
    pub status: String,
    pub attendees: Vec<String>,
    pub created_by: String,
    pub draft: bool,
    pub archived: bool,
    /// Id of the legacy meeting this schedule was migrated from, if any.
    pub source_meeting_id: Option<EntityId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Schedule {
    /// Meeting duration in whole minutes. Zero if the bounds are inverted.
    pub fn duration_minutes(&self) -> i64 {
        (self.ends_at - self.starts_at).num_minutes().max(0)
    }

    /// Composite key identifying this meeting's slot in the project sequence.
    pub fn sequence_key(&self) -> String {
        format!("{}:{}", self.project_id, self.sequence_ordinal)
    }
}

/// A meeting record in the legacy source shape, prior to conversion.
///
/// Timestamps are raw strings exactly as exported; parsing happens during
/// conversion so that a malformed record fails individually instead of
/// poisoning the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyMeeting {
    pub id: EntityId,
    pub project_id: EntityId,
    pub title: String,
    /// RFC 3339 timestamp string.
    pub starts_at: String,
    /// RFC 3339 timestamp string.
    pub ends_at: String,
    pub meeting_type: String,
    pub sequence: i32,
    pub attendees: Vec<String>,
    pub created_by: String,
    /// Draft meetings were never confirmed in the source system.
    #[serde(default)]
    pub draft: bool,
}

impl LegacyMeeting {
    /// Convert this legacy record into the unified schedule shape.
    ///
    /// Fails with `CoreError::Validation` when either timestamp is
    /// unparseable or the bounds are inverted.
    pub fn to_schedule(&self, now: Timestamp) -> Result<Schedule, CoreError> {
        let starts_at = parse_timestamp(&self.starts_at)
            .ok_or_else(|| CoreError::Validation(format!(
                "Meeting '{}' has unparseable start time '{}'",
                self.id, self.starts_at
            )))?;
        let ends_at = parse_timestamp(&self.ends_at)
            .ok_or_else(|| CoreError::Validation(format!(
                "Meeting '{}' has unparseable end time '{}'",
                self.id, self.ends_at
            )))?;
        if starts_at >= ends_at {
            return Err(CoreError::Validation(format!(
                "Meeting '{}' has start >= end ({} >= {})",
                self.id, starts_at, ends_at
            )));
        }

        Ok(Schedule {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            title: self.title.clone(),
            starts_at,
            ends_at,
            sequence_type: normalize_sequence_type(&self.meeting_type).to_string(),
            sequence_ordinal: self.sequence,
            status: STATUS_CONFIRMED.to_string(),
            attendees: self.attendees.clone(),
            created_by: self.created_by.clone(),
            draft: self.draft,
            archived: false,
            source_meeting_id: Some(self.id.clone()),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Parse an RFC 3339 timestamp string into UTC. Returns `None` on failure.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// A lifecycle event recorded against a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: EntityId,
    pub project_id: EntityId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
}

/// A stored point-in-time snapshot of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: EntityId,
    pub entity_kind: String,
    pub entity_id: EntityId,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// A pending background job referencing a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: EntityId,
    pub project_id: Option<EntityId>,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn legacy(id: &str, starts: &str, ends: &str) -> LegacyMeeting {
        LegacyMeeting {
            id: id.to_string(),
            project_id: "P1".to_string(),
            title: "Sprint planning".to_string(),
            starts_at: starts.to_string(),
            ends_at: ends.to_string(),
            meeting_type: "planning".to_string(),
            sequence: 1,
            attendees: vec!["alice".to_string()],
            created_by: "importer".to_string(),
            draft: false,
        }
    }

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    // -- phase validation -----------------------------------------------------

    #[test]
    fn valid_phases_accepted() {
        for phase in VALID_PHASES {
            assert!(validate_phase(phase).is_ok());
        }
    }

    #[test]
    fn invalid_phase_rejected() {
        assert!(validate_phase("limbo").is_err());
        assert!(validate_phase("").is_err());
    }

    #[test]
    fn terminal_phases_are_not_active() {
        assert!(!is_active_phase(PHASE_COMPLETED));
        assert!(!is_active_phase(PHASE_ARCHIVED));
        assert!(is_active_phase(PHASE_IN_PROGRESS));
    }

    #[test]
    fn unknown_phase_is_not_active() {
        assert!(!is_active_phase("limbo"));
    }

    // -- status / sequence-type validation ------------------------------------

    #[test]
    fn valid_statuses_accepted() {
        for status in VALID_STATUSES {
            assert!(validate_status(status).is_ok());
        }
    }

    #[test]
    fn invalid_status_rejected() {
        assert!(validate_status("pending").is_err());
    }

    #[test]
    fn sequence_type_normalization() {
        assert_eq!(normalize_sequence_type("Kickoff"), SEQUENCE_KICKOFF);
        assert_eq!(normalize_sequence_type("daily"), SEQUENCE_STANDUP);
        assert_eq!(normalize_sequence_type("retro"), SEQUENCE_RETROSPECTIVE);
        assert_eq!(normalize_sequence_type("town hall"), SEQUENCE_ADHOC);
    }

    // -- timestamp parsing ----------------------------------------------------

    #[test]
    fn parse_timestamp_accepts_rfc3339() {
        let ts = parse_timestamp("2026-03-01T10:00:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    // -- legacy conversion ----------------------------------------------------

    #[test]
    fn conversion_produces_schedule() {
        let m = legacy("M1", "2026-03-01T10:00:00Z", "2026-03-01T11:00:00Z");
        let s = m.to_schedule(now()).unwrap();
        assert_eq!(s.id, "M1");
        assert_eq!(s.project_id, "P1");
        assert_eq!(s.sequence_type, SEQUENCE_PLANNING);
        assert_eq!(s.status, STATUS_CONFIRMED);
        assert_eq!(s.source_meeting_id.as_deref(), Some("M1"));
        assert_eq!(s.duration_minutes(), 60);
    }

    #[test]
    fn conversion_rejects_unparseable_start() {
        let m = legacy("M1", "soonish", "2026-03-01T11:00:00Z");
        let err = m.to_schedule(now()).unwrap_err();
        assert!(err.to_string().contains("unparseable start time"));
    }

    #[test]
    fn conversion_rejects_inverted_bounds() {
        let m = legacy("M1", "2026-03-01T11:00:00Z", "2026-03-01T10:00:00Z");
        let err = m.to_schedule(now()).unwrap_err();
        assert!(err.to_string().contains("start >= end"));
    }

    // -- schedule helpers -----------------------------------------------------

    #[test]
    fn sequence_key_format() {
        let m = legacy("M1", "2026-03-01T10:00:00Z", "2026-03-01T11:00:00Z");
        let s = m.to_schedule(now()).unwrap();
        assert_eq!(s.sequence_key(), "P1:1");
    }

    #[test]
    fn duration_never_negative() {
        let m = legacy("M1", "2026-03-01T10:00:00Z", "2026-03-01T11:00:00Z");
        let mut s = m.to_schedule(now()).unwrap();
        std::mem::swap(&mut s.starts_at, &mut s.ends_at);
        assert_eq!(s.duration_minutes(), 0);
    }
}
