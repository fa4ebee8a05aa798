//! Referential-integrity auditing across the whole data set.
//!
//! Six independent detectors produce [`Inconsistency`] findings; a health
//! assessment rolls them up into a [`SystemHealthReport`]. Detection is
//! pure — findings are reported, never persisted. Applying fixes is the
//! recovery manager's job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{LegacyMeeting, Project, Schedule, VALID_PHASES};
use crate::types::{EntityId, Timestamp};
use crate::validation::builtin::group_by_sequence_key;

// ---------------------------------------------------------------------------
// Issue vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyType {
    OrphanSchedule,
    MissingSchedule,
    DuplicateMeeting,
    InvalidPhase,
    BrokenReference,
    TimestampMismatch,
}

impl InconsistencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanSchedule => "orphan_schedule",
            Self::MissingSchedule => "missing_schedule",
            Self::DuplicateMeeting => "duplicate_meeting",
            Self::InvalidPhase => "invalid_phase",
            Self::BrokenReference => "broken_reference",
            Self::TimestampMismatch => "timestamp_mismatch",
        }
    }
}

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// The deterministic fix the recovery manager would apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    DeleteOrphan,
    RecreateFromSource,
    KeepNewest,
    ResetPhase,
    DeleteBrokenReference,
    RepairTimestamps,
}

/// One detected integrity violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inconsistency {
    pub issue_type: InconsistencyType,
    pub severity: IssueSeverity,
    pub description: String,
    pub affected_schedules: Vec<EntityId>,
    pub affected_projects: Vec<EntityId>,
    /// Source meeting ids, for findings repairable from legacy data.
    pub affected_meetings: Vec<EntityId>,
    pub auto_fixable: bool,
    pub suggested_strategy: RecoveryStrategy,
}

// ---------------------------------------------------------------------------
// Health report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Outcome of a full-dataset health scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub status: HealthStatus,
    pub checked_projects: usize,
    pub checked_schedules: usize,
    pub issues: Vec<Inconsistency>,
    pub generated_at: Timestamp,
}

/// Roll issues up into an overall status.
///
/// - `Critical` if any critical-severity issue exists or more than three
///   high-severity issues
/// - `Warning` if any high-severity issue or more than five issues total
/// - `Healthy` otherwise
pub fn assess_health(issues: &[Inconsistency]) -> HealthStatus {
    let critical = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Critical)
        .count();
    let high = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::High)
        .count();
    if critical > 0 || high > 3 {
        HealthStatus::Critical
    } else if high > 0 || issues.len() > 5 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Run all six detectors and assemble the report.
pub fn perform_health_check(
    projects: &[Project],
    schedules: &[Schedule],
    legacy_meetings: &[LegacyMeeting],
    now: Timestamp,
) -> SystemHealthReport {
    let mut issues = Vec::new();
    issues.extend(detect_orphan_schedules(projects, schedules));
    issues.extend(detect_missing_schedules(projects, schedules, legacy_meetings));
    issues.extend(detect_duplicate_meetings(schedules));
    issues.extend(detect_invalid_phases(projects));
    issues.extend(detect_broken_references(schedules));
    issues.extend(detect_timestamp_mismatches(schedules));

    SystemHealthReport {
        status: assess_health(&issues),
        checked_projects: projects.len(),
        checked_schedules: schedules.len(),
        issues,
        generated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Schedules whose (well-formed) project reference is absent from the
/// project set. Blank references are the broken-reference detector's job.
pub fn detect_orphan_schedules(projects: &[Project], schedules: &[Schedule]) -> Vec<Inconsistency> {
    let known: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    let orphans: Vec<&Schedule> = schedules
        .iter()
        .filter(|s| !s.project_id.trim().is_empty() && !known.contains(s.project_id.as_str()))
        .collect();
    if orphans.is_empty() {
        return Vec::new();
    }
    let mut affected_projects: Vec<EntityId> =
        orphans.iter().map(|s| s.project_id.clone()).collect();
    affected_projects.sort();
    affected_projects.dedup();
    vec![Inconsistency {
        issue_type: InconsistencyType::OrphanSchedule,
        severity: IssueSeverity::High,
        description: format!(
            "{} schedule(s) reference deleted project(s) {}",
            orphans.len(),
            affected_projects.join(", ")
        ),
        affected_schedules: orphans.iter().map(|s| s.id.clone()).collect(),
        affected_projects,
        affected_meetings: Vec::new(),
        auto_fixable: true,
        suggested_strategy: RecoveryStrategy::DeleteOrphan,
    }]
}

/// Projects with source meetings that never produced a schedule.
pub fn detect_missing_schedules(
    projects: &[Project],
    schedules: &[Schedule],
    legacy_meetings: &[LegacyMeeting],
) -> Vec<Inconsistency> {
    let known_projects: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    let migrated: HashSet<&str> = schedules
        .iter()
        .filter_map(|s| s.source_meeting_id.as_deref())
        .collect();
    let missing: Vec<&LegacyMeeting> = legacy_meetings
        .iter()
        .filter(|m| known_projects.contains(m.project_id.as_str()))
        .filter(|m| !migrated.contains(m.id.as_str()))
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }
    let mut affected_projects: Vec<EntityId> =
        missing.iter().map(|m| m.project_id.clone()).collect();
    affected_projects.sort();
    affected_projects.dedup();
    vec![Inconsistency {
        issue_type: InconsistencyType::MissingSchedule,
        severity: IssueSeverity::Medium,
        description: format!(
            "{} source meeting(s) have no corresponding schedule",
            missing.len()
        ),
        affected_schedules: Vec::new(),
        affected_projects,
        affected_meetings: missing.iter().map(|m| m.id.clone()).collect(),
        auto_fixable: true,
        suggested_strategy: RecoveryStrategy::RecreateFromSource,
    }]
}

/// Groups of schedules sharing a project + sequence-ordinal key.
pub fn detect_duplicate_meetings(schedules: &[Schedule]) -> Vec<Inconsistency> {
    let groups = group_by_sequence_key(schedules.iter());
    let mut keys: Vec<&String> = groups
        .iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, _)| key)
        .collect();
    keys.sort(); // deterministic finding order

    keys.into_iter()
        .map(|key| {
            let members = &groups[key];
            Inconsistency {
                issue_type: InconsistencyType::DuplicateMeeting,
                severity: IssueSeverity::Medium,
                description: format!(
                    "{} schedules share sequence slot {key}",
                    members.len()
                ),
                affected_schedules: members.iter().map(|s| s.id.clone()).collect(),
                affected_projects: vec![members[0].project_id.clone()],
                affected_meetings: Vec::new(),
                auto_fixable: true,
                suggested_strategy: RecoveryStrategy::KeepNewest,
            }
        })
        .collect()
}

/// Projects whose phase is outside the fixed whitelist.
pub fn detect_invalid_phases(projects: &[Project]) -> Vec<Inconsistency> {
    let invalid: Vec<&Project> = projects
        .iter()
        .filter(|p| !VALID_PHASES.contains(&p.phase.as_str()))
        .collect();
    if invalid.is_empty() {
        return Vec::new();
    }
    vec![Inconsistency {
        issue_type: InconsistencyType::InvalidPhase,
        severity: IssueSeverity::High,
        description: format!(
            "{} project(s) have a phase outside the whitelist",
            invalid.len()
        ),
        affected_schedules: Vec::new(),
        affected_projects: invalid.iter().map(|p| p.id.clone()).collect(),
        affected_meetings: Vec::new(),
        auto_fixable: true,
        suggested_strategy: RecoveryStrategy::ResetPhase,
    }]
}

/// Schedules with a malformed (blank) project reference. These cannot be
/// re-homed and are slated for deletion.
pub fn detect_broken_references(schedules: &[Schedule]) -> Vec<Inconsistency> {
    let broken: Vec<&Schedule> = schedules
        .iter()
        .filter(|s| s.project_id.trim().is_empty())
        .collect();
    if broken.is_empty() {
        return Vec::new();
    }
    vec![Inconsistency {
        issue_type: InconsistencyType::BrokenReference,
        severity: IssueSeverity::Critical,
        description: format!("{} schedule(s) carry a blank project reference", broken.len()),
        affected_schedules: broken.iter().map(|s| s.id.clone()).collect(),
        affected_projects: Vec::new(),
        affected_meetings: Vec::new(),
        auto_fixable: true,
        suggested_strategy: RecoveryStrategy::DeleteBrokenReference,
    }]
}

/// Schedules whose bounds are inverted or zero-length.
pub fn detect_timestamp_mismatches(schedules: &[Schedule]) -> Vec<Inconsistency> {
    let broken: Vec<&Schedule> = schedules
        .iter()
        .filter(|s| s.starts_at >= s.ends_at)
        .collect();
    if broken.is_empty() {
        return Vec::new();
    }
    vec![Inconsistency {
        issue_type: InconsistencyType::TimestampMismatch,
        severity: IssueSeverity::High,
        description: format!("{} schedule(s) have start >= end", broken.len()),
        affected_schedules: broken.iter().map(|s| s.id.clone()).collect(),
        affected_projects: Vec::new(),
        affected_meetings: Vec::new(),
        auto_fixable: true,
        suggested_strategy: RecoveryStrategy::RepairTimestamps,
    }]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
