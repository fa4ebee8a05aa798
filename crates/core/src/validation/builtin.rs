//! Built-in migration rule set and standard chains.
//!
//! Pre-migration rules gate a run before any mutation; post-migration rules
//! verify nothing was lost or corrupted by the commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::model::parse_timestamp;

use super::engine::ValidationEngine;
use super::rules::{
    ChainMode, RuleCategory, RuleLevel, RuleOutcome, ValidationChain, ValidationRule,
};

// ---------------------------------------------------------------------------
// Rule / chain ids
// ---------------------------------------------------------------------------

pub const RULE_PRE_LEGACY_IDS_UNIQUE: &str = "pre_legacy_ids_unique";
pub const RULE_PRE_PROJECT_REFS_EXIST: &str = "pre_project_refs_exist";
pub const RULE_PRE_TIMESTAMPS_PARSEABLE: &str = "pre_timestamps_parseable";
pub const RULE_PRE_BATCH_SIZE_SANE: &str = "pre_batch_size_sane";
pub const RULE_POST_NO_DATA_LOSS: &str = "post_no_data_loss";
pub const RULE_POST_TIME_INTEGRITY: &str = "post_schedule_time_integrity";
pub const RULE_POST_ORPHAN_SCAN: &str = "post_orphan_scan";

pub const CHAIN_PRE_MIGRATION: &str = "pre_migration";
pub const CHAIN_POST_MIGRATION: &str = "post_migration";

/// Largest batch size the performance rule accepts without complaint.
pub const MAX_SANE_BATCH_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register the built-in rules and the standard pre/post chains.
pub fn register_builtin(engine: &mut ValidationEngine) {
    engine.register_rule(pre_legacy_ids_unique());
    engine.register_rule(pre_project_refs_exist());
    engine.register_rule(pre_timestamps_parseable());
    engine.register_rule(pre_batch_size_sane());
    engine.register_rule(post_no_data_loss());
    engine.register_rule(post_time_integrity());
    engine.register_rule(post_orphan_scan());

    engine.register_chain(ValidationChain {
        id: CHAIN_PRE_MIGRATION.to_string(),
        rule_ids: vec![
            RULE_PRE_LEGACY_IDS_UNIQUE.to_string(),
            RULE_PRE_PROJECT_REFS_EXIST.to_string(),
            RULE_PRE_TIMESTAMPS_PARSEABLE.to_string(),
            RULE_PRE_BATCH_SIZE_SANE.to_string(),
        ],
        mode: ChainMode::Sequential,
        stop_on_first_critical: true,
    });
    engine.register_chain(ValidationChain {
        id: CHAIN_POST_MIGRATION.to_string(),
        rule_ids: vec![
            RULE_POST_NO_DATA_LOSS.to_string(),
            RULE_POST_TIME_INTEGRITY.to_string(),
            RULE_POST_ORPHAN_SCAN.to_string(),
        ],
        mode: ChainMode::Parallel,
        stop_on_first_critical: false,
    });
}

// ---------------------------------------------------------------------------
// Pre-migration rules
// ---------------------------------------------------------------------------

/// Duplicate ids inside the incoming batch cannot be resolved by renaming
/// (both records would claim the new name), so they block the run.
fn pre_legacy_ids_unique() -> ValidationRule {
    ValidationRule {
        id: RULE_PRE_LEGACY_IDS_UNIQUE.to_string(),
        category: RuleCategory::PreMigration,
        level: RuleLevel::Critical,
        description: "Incoming legacy meeting ids must be unique within the batch".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let mut seen = HashSet::new();
            let mut duplicates: Vec<String> = input
                .legacy_meetings
                .iter()
                .filter(|m| !seen.insert(m.id.as_str()))
                .map(|m| m.id.clone())
                .collect();
            duplicates.dedup();
            if duplicates.is_empty() {
                Ok(RuleOutcome::pass("All incoming meeting ids are unique"))
            } else {
                Ok(RuleOutcome::fail(
                    format!("{} duplicate meeting id(s) in the batch", duplicates.len()),
                    duplicates,
                ))
            }
        }),
    }
}

fn pre_project_refs_exist() -> ValidationRule {
    ValidationRule {
        id: RULE_PRE_PROJECT_REFS_EXIST.to_string(),
        category: RuleCategory::PreMigration,
        level: RuleLevel::Critical,
        description: "Every incoming meeting must reference a known project".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let known: HashSet<&str> = input.projects.iter().map(|p| p.id.as_str()).collect();
            let missing: Vec<String> = input
                .legacy_meetings
                .iter()
                .filter(|m| !known.contains(m.project_id.as_str()))
                .map(|m| format!("{} -> {}", m.id, m.project_id))
                .collect();
            if missing.is_empty() {
                Ok(RuleOutcome::pass("All project references resolve"))
            } else {
                Ok(RuleOutcome::fail(
                    format!("{} meeting(s) reference unknown projects", missing.len()),
                    missing,
                ))
            }
        }),
    }
}

/// Unparseable timestamps are a warning, not a blocker: the affected
/// records fail individually at conversion while the rest migrate.
fn pre_timestamps_parseable() -> ValidationRule {
    ValidationRule {
        id: RULE_PRE_TIMESTAMPS_PARSEABLE.to_string(),
        category: RuleCategory::PreMigration,
        level: RuleLevel::Warning,
        description: "Legacy timestamps should parse as RFC 3339".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let bad: Vec<String> = input
                .legacy_meetings
                .iter()
                .filter(|m| {
                    parse_timestamp(&m.starts_at).is_none() || parse_timestamp(&m.ends_at).is_none()
                })
                .map(|m| m.id.clone())
                .collect();
            if bad.is_empty() {
                Ok(RuleOutcome::pass("All timestamps parse"))
            } else {
                Ok(RuleOutcome::fail(
                    format!("{} meeting(s) have unparseable timestamps", bad.len()),
                    bad,
                ))
            }
        }),
    }
}

fn pre_batch_size_sane() -> ValidationRule {
    ValidationRule {
        id: RULE_PRE_BATCH_SIZE_SANE.to_string(),
        category: RuleCategory::Performance,
        level: RuleLevel::Info,
        description: "Batch size should stay within a sane window".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            if input.batch_size >= 1 && input.batch_size <= MAX_SANE_BATCH_SIZE {
                Ok(RuleOutcome::pass("Batch size is within limits"))
            } else {
                Ok(RuleOutcome::fail(
                    format!(
                        "Batch size {} outside 1..={MAX_SANE_BATCH_SIZE}",
                        input.batch_size
                    ),
                    Vec::new(),
                ))
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// Post-migration rules
// ---------------------------------------------------------------------------

fn post_no_data_loss() -> ValidationRule {
    ValidationRule {
        id: RULE_POST_NO_DATA_LOSS.to_string(),
        category: RuleCategory::PostMigration,
        level: RuleLevel::Critical,
        description: "Schedule count must not shrink unless deletions were reported".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let floor = input.records_before.saturating_sub(input.reported_deletions);
            if input.records_after >= floor {
                Ok(RuleOutcome::pass(format!(
                    "Record count {} -> {} ({} reported deletions)",
                    input.records_before, input.records_after, input.reported_deletions
                )))
            } else {
                Ok(RuleOutcome::fail(
                    format!(
                        "Data loss: {} records before, {} after, only {} deletions reported",
                        input.records_before, input.records_after, input.reported_deletions
                    ),
                    Vec::new(),
                ))
            }
        }),
    }
}

fn post_time_integrity() -> ValidationRule {
    ValidationRule {
        id: RULE_POST_TIME_INTEGRITY.to_string(),
        category: RuleCategory::PostMigration,
        level: RuleLevel::Critical,
        description: "Every committed schedule must have start < end".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let broken: Vec<String> = input
                .schedules
                .iter()
                .filter(|s| s.starts_at >= s.ends_at)
                .map(|s| s.id.clone())
                .collect();
            if broken.is_empty() {
                Ok(RuleOutcome::pass("All schedule bounds are ordered"))
            } else {
                Ok(RuleOutcome::fail(
                    format!("{} schedule(s) with start >= end", broken.len()),
                    broken,
                ))
            }
        }),
    }
}

fn post_orphan_scan() -> ValidationRule {
    ValidationRule {
        id: RULE_POST_ORPHAN_SCAN.to_string(),
        category: RuleCategory::Integrity,
        level: RuleLevel::Warning,
        description: "Committed schedules should reference existing projects".to_string(),
        enabled: true,
        predicate: Arc::new(|input| {
            let known: HashSet<&str> = input.projects.iter().map(|p| p.id.as_str()).collect();
            let orphans: Vec<String> = input
                .schedules
                .iter()
                .filter(|s| !known.contains(s.project_id.as_str()))
                .map(|s| s.id.clone())
                .collect();
            if orphans.is_empty() {
                Ok(RuleOutcome::pass("No orphaned schedules"))
            } else {
                Ok(RuleOutcome::fail(
                    format!("{} orphaned schedule(s)", orphans.len()),
                    orphans,
                ))
            }
        }),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Group schedules by their project+ordinal sequence key. Shared by the
/// duplicate-meeting detector and tests.
pub fn group_by_sequence_key<'a, I>(schedules: I) -> HashMap<String, Vec<&'a crate::model::Schedule>>
where
    I: IntoIterator<Item = &'a crate::model::Schedule>,
{
    let mut groups: HashMap<String, Vec<&crate::model::Schedule>> = HashMap::new();
    for s in schedules {
        groups.entry(s.sequence_key()).or_default().push(s);
    }
    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
