//! Time-overlap conflict detection and resolution for schedules.
//!
//! Detection computes pairwise interval overlap and classifies each hit;
//! resolution produces a ranked candidate list the caller (or an operator)
//! picks from. Applying a candidate is an idempotent bounds update that
//! must be re-validated with [`detect_conflicts`] before being considered
//! final.

use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};

use crate::model::{Schedule, STATUS_CANCELLED};
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Overlap-ratio thresholds for severity classification.
pub const SEVERITY_THRESHOLD_CRITICAL: f64 = 0.8;
pub const SEVERITY_THRESHOLD_HIGH: f64 = 0.5;
pub const SEVERITY_THRESHOLD_MEDIUM: f64 = 0.2;

/// Auto-adjust candidates must land inside these hours (UTC).
pub const BUSINESS_HOURS_START: u32 = 9;
pub const BUSINESS_HOURS_END: u32 = 17;

/// Gap inserted after the existing meeting by the adjust-after candidate.
pub const ADJUST_AFTER_BUFFER_MINUTES: i64 = 30;

// Weighted priority score components for the swap candidate.
const WEIGHT_SEQUENCE_KICKOFF: i32 = 50;
const WEIGHT_SEQUENCE_REVIEW: i32 = 40;
const WEIGHT_SEQUENCE_PLANNING: i32 = 30;
const WEIGHT_SEQUENCE_RETRO: i32 = 20;
const WEIGHT_SEQUENCE_OTHER: i32 = 10;

const WEIGHT_PHASE_IN_PROGRESS: i32 = 50;
const WEIGHT_PHASE_REVIEW: i32 = 40;
const WEIGHT_PHASE_SCHEDULED: i32 = 30;
const WEIGHT_PHASE_PLANNING: i32 = 20;
const WEIGHT_PHASE_COMPLETED: i32 = 10;

const WEIGHT_STATUS_CONFIRMED: i32 = 30;
const WEIGHT_STATUS_COMPLETED: i32 = 20;
const WEIGHT_STATUS_TENTATIVE: i32 = 10;
const WEIGHT_STATUS_DRAFT: i32 = 5;

// ---------------------------------------------------------------------------
// Conflict types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleConflictType {
    ExactTime,
    Overlapping,
    SameProject,
    ResourceConflict,
}

impl ScheduleConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactTime => "exact_time",
            Self::Overlapping => "overlapping",
            Self::SameProject => "same_project",
            Self::ResourceConflict => "resource_conflict",
        }
    }
}

/// Conflict severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Classify from the overlap ratio (non-same-project conflicts only).
    pub fn from_overlap_ratio(ratio: f64) -> Self {
        if ratio >= SEVERITY_THRESHOLD_CRITICAL {
            Self::Critical
        } else if ratio >= SEVERITY_THRESHOLD_HIGH {
            Self::High
        } else if ratio >= SEVERITY_THRESHOLD_MEDIUM {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// The shared time window of two overlapping schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapWindow {
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub minutes: i64,
}

/// A detected time-overlap conflict between a new and an existing schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub conflict_type: ScheduleConflictType,
    pub severity: ConflictSeverity,
    pub new_schedule_id: EntityId,
    pub existing_schedule_id: EntityId,
    pub overlap: OverlapWindow,
    /// Fraction of the shorter meeting consumed by the overlap.
    pub overlap_ratio: f64,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Detect all time conflicts between `new_schedule` and the existing set.
///
/// Cancelled and archived existing schedules hold no time claim and are
/// skipped, as is a record with the same id (re-validation after applying
/// a resolution).
pub fn detect_conflicts(new_schedule: &Schedule, existing: &[Schedule]) -> Vec<ScheduleConflict> {
    existing
        .iter()
        .filter(|s| s.id != new_schedule.id)
        .filter(|s| s.status != STATUS_CANCELLED && !s.archived)
        .filter_map(|s| classify(new_schedule, s))
        .collect()
}

fn classify(new: &Schedule, existing: &Schedule) -> Option<ScheduleConflict> {
    let overlap_start = new.starts_at.max(existing.starts_at);
    let overlap_end = new.ends_at.min(existing.ends_at);
    let minutes = (overlap_end - overlap_start).num_minutes();
    if minutes <= 0 {
        return None;
    }

    let same_project = new.project_id == existing.project_id;
    let shares_resource = new
        .attendees
        .iter()
        .any(|a| existing.attendees.contains(a))
        || new.created_by == existing.created_by;

    let conflict_type = if new.starts_at == existing.starts_at && new.ends_at == existing.ends_at {
        ScheduleConflictType::ExactTime
    } else if same_project {
        ScheduleConflictType::SameProject
    } else if shares_resource {
        ScheduleConflictType::ResourceConflict
    } else {
        ScheduleConflictType::Overlapping
    };

    let shorter = new.duration_minutes().min(existing.duration_minutes()).max(1);
    let ratio = minutes as f64 / shorter as f64;

    // Same-project overlap is always critical, whatever the ratio.
    let severity = if same_project {
        ConflictSeverity::Critical
    } else {
        ConflictSeverity::from_overlap_ratio(ratio)
    };

    Some(ScheduleConflict {
        conflict_type,
        severity,
        new_schedule_id: new.id.clone(),
        existing_schedule_id: existing.id.clone(),
        overlap: OverlapWindow {
            starts_at: overlap_start,
            ends_at: overlap_end,
            minutes,
        },
        overlap_ratio: ratio,
    })
}

// ---------------------------------------------------------------------------
// Resolution candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    AutoAdjustBefore,
    AutoAdjustAfter,
    NextDaySameTime,
    PrioritySwap,
    UserChoice,
    RejectNew,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoAdjustBefore => "auto_adjust_before",
            Self::AutoAdjustAfter => "auto_adjust_after",
            Self::NextDaySameTime => "next_day_same_time",
            Self::PrioritySwap => "priority_swap",
            Self::UserChoice => "user_choice",
            Self::RejectNew => "reject_new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// One candidate way of resolving a time conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionCandidate {
    pub kind: ResolutionKind,
    pub description: String,
    /// Higher is preferred; candidates are returned sorted descending.
    pub priority: i32,
    pub feasibility: Feasibility,
    pub impact: Impact,
    /// Id of the schedule this candidate would move or reject.
    pub target_schedule_id: EntityId,
    /// Proposed new bounds, when the candidate moves a meeting.
    pub proposed_starts_at: Option<Timestamp>,
    pub proposed_ends_at: Option<Timestamp>,
}

/// Weighted priority score used by the swap candidate to decide which
/// side of a conflict should move.
pub fn priority_score(schedule: &Schedule, project_phase: &str) -> i32 {
    let sequence_weight = match schedule.sequence_type.as_str() {
        "kickoff" => WEIGHT_SEQUENCE_KICKOFF,
        "review" => WEIGHT_SEQUENCE_REVIEW,
        "planning" => WEIGHT_SEQUENCE_PLANNING,
        "retrospective" => WEIGHT_SEQUENCE_RETRO,
        _ => WEIGHT_SEQUENCE_OTHER,
    };
    let phase_weight = match project_phase {
        "in_progress" => WEIGHT_PHASE_IN_PROGRESS,
        "review" => WEIGHT_PHASE_REVIEW,
        "scheduled" => WEIGHT_PHASE_SCHEDULED,
        "planning" => WEIGHT_PHASE_PLANNING,
        "completed" => WEIGHT_PHASE_COMPLETED,
        _ => 0,
    };
    let status_weight = match schedule.status.as_str() {
        "confirmed" => WEIGHT_STATUS_CONFIRMED,
        "completed" => WEIGHT_STATUS_COMPLETED,
        "tentative" => WEIGHT_STATUS_TENTATIVE,
        "draft" => WEIGHT_STATUS_DRAFT,
        _ => 0,
    };
    sequence_weight + phase_weight + status_weight
}

fn within_business_hours(starts_at: Timestamp, ends_at: Timestamp) -> bool {
    starts_at.hour() >= BUSINESS_HOURS_START
        && (ends_at.hour() < BUSINESS_HOURS_END
            || (ends_at.hour() == BUSINESS_HOURS_END && ends_at.minute() == 0))
        && starts_at.date_naive() == ends_at.date_naive()
}

/// Generate the ranked candidate list for one detected conflict.
///
/// `new_phase` / `existing_phase` are the project phases of the two sides,
/// used by the priority-swap candidate. Candidates are sorted by priority
/// descending; low-feasibility candidates are filtered out. Reject-new is
/// offered only for critical conflicts with no high-feasibility auto-fix.
pub fn generate_resolutions(
    conflict: &ScheduleConflict,
    new_schedule: &Schedule,
    existing_schedule: &Schedule,
    new_phase: &str,
    existing_phase: &str,
) -> Vec<ResolutionCandidate> {
    let mut candidates = Vec::new();
    let duration = Duration::minutes(new_schedule.duration_minutes());

    // Shift the new meeting to end exactly when the existing one starts.
    let before_start = existing_schedule.starts_at - duration;
    let before_end = existing_schedule.starts_at;
    if within_business_hours(before_start, before_end) {
        candidates.push(ResolutionCandidate {
            kind: ResolutionKind::AutoAdjustBefore,
            description: format!(
                "Move '{}' to just before '{}'",
                new_schedule.id, existing_schedule.id
            ),
            priority: 80,
            feasibility: Feasibility::High,
            impact: Impact::Low,
            target_schedule_id: new_schedule.id.clone(),
            proposed_starts_at: Some(before_start),
            proposed_ends_at: Some(before_end),
        });
    }

    // Shift the new meeting after the existing one, with a buffer.
    let after_start = existing_schedule.ends_at + Duration::minutes(ADJUST_AFTER_BUFFER_MINUTES);
    let after_end = after_start + duration;
    candidates.push(ResolutionCandidate {
        kind: ResolutionKind::AutoAdjustAfter,
        description: format!(
            "Move '{}' to {ADJUST_AFTER_BUFFER_MINUTES} min after '{}'",
            new_schedule.id, existing_schedule.id
        ),
        priority: 70,
        feasibility: if within_business_hours(after_start, after_end) {
            Feasibility::High
        } else {
            Feasibility::Medium
        },
        impact: Impact::Low,
        target_schedule_id: new_schedule.id.clone(),
        proposed_starts_at: Some(after_start),
        proposed_ends_at: Some(after_end),
    });

    // Same wall-clock slot, next day.
    candidates.push(ResolutionCandidate {
        kind: ResolutionKind::NextDaySameTime,
        description: format!("Move '{}' to the same time next day", new_schedule.id),
        priority: 60,
        feasibility: Feasibility::Medium,
        impact: Impact::Medium,
        target_schedule_id: new_schedule.id.clone(),
        proposed_starts_at: Some(new_schedule.starts_at + Duration::days(1)),
        proposed_ends_at: Some(new_schedule.ends_at + Duration::days(1)),
    });

    // Move whichever side carries less weight.
    let new_score = priority_score(new_schedule, new_phase);
    let existing_score = priority_score(existing_schedule, existing_phase);
    let (loser, loser_label) = if new_score <= existing_score {
        (new_schedule, "incoming")
    } else {
        (existing_schedule, "existing")
    };
    candidates.push(ResolutionCandidate {
        kind: ResolutionKind::PrioritySwap,
        description: format!(
            "Adjust the {loser_label} meeting '{}' (priority {} vs {})",
            loser.id, new_score, existing_score
        ),
        priority: 50,
        feasibility: Feasibility::Medium,
        impact: Impact::Medium,
        target_schedule_id: loser.id.clone(),
        proposed_starts_at: None,
        proposed_ends_at: None,
    });

    // Operator decision placeholder, always present.
    candidates.push(ResolutionCandidate {
        kind: ResolutionKind::UserChoice,
        description: "Defer to operator choice".to_string(),
        priority: 10,
        feasibility: Feasibility::Medium,
        impact: Impact::Low,
        target_schedule_id: new_schedule.id.clone(),
        proposed_starts_at: None,
        proposed_ends_at: None,
    });

    let has_auto_fix = candidates
        .iter()
        .any(|c| c.feasibility == Feasibility::High);
    if conflict.severity == ConflictSeverity::Critical && !has_auto_fix {
        candidates.push(ResolutionCandidate {
            kind: ResolutionKind::RejectNew,
            description: format!("Reject the new meeting '{}'", new_schedule.id),
            priority: 5,
            feasibility: Feasibility::High,
            impact: Impact::High,
            target_schedule_id: new_schedule.id.clone(),
            proposed_starts_at: None,
            proposed_ends_at: None,
        });
    }

    candidates.retain(|c| c.feasibility > Feasibility::Low);
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates
}

/// Apply a candidate's proposed bounds to a schedule.
///
/// Setting the bounds to fixed proposed values makes the update idempotent;
/// candidates without proposed bounds (swap, user-choice, reject) leave the
/// schedule untouched. The result must be re-validated via
/// [`detect_conflicts`].
pub fn apply_resolution(schedule: &Schedule, candidate: &ResolutionCandidate) -> Schedule {
    let mut updated = schedule.clone();
    if let (Some(starts), Some(ends)) = (candidate.proposed_starts_at, candidate.proposed_ends_at) {
        updated.starts_at = starts;
        updated.ends_at = ends;
    }
    updated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
