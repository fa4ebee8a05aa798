//! Validation rule, chain, and result types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{LegacyMeeting, Project, Schedule};

// ---------------------------------------------------------------------------
// Rule level / category
// ---------------------------------------------------------------------------

/// How severe a failing rule is. Only `Critical` failures block a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
    Critical,
    Warning,
    Info,
}

impl RuleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What lifecycle stage a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    PreMigration,
    PostMigration,
    Integrity,
    Performance,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMigration => "pre_migration",
            Self::PostMigration => "post_migration",
            Self::Integrity => "integrity",
            Self::Performance => "performance",
        }
    }
}

// ---------------------------------------------------------------------------
// Rule input
// ---------------------------------------------------------------------------

/// Snapshot of the data a rule evaluates against.
///
/// Rules never mutate state; they only read this snapshot. The counts are
/// filled in by the orchestrator around commit so post-migration rules can
/// reason about data loss without re-querying the store.
#[derive(Debug, Clone, Default)]
pub struct ValidationInput {
    pub projects: Vec<Project>,
    pub schedules: Vec<Schedule>,
    pub legacy_meetings: Vec<LegacyMeeting>,
    /// Schedule count before the run committed anything.
    pub records_before: usize,
    /// Schedule count after commit (pre-migration: same as before).
    pub records_after: usize,
    /// Deletions explicitly reported by the run (normally zero).
    pub reported_deletions: usize,
    /// Commit batch size the run will use.
    pub batch_size: usize,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// What a rule predicate reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub passed: bool,
    pub message: String,
    /// Affected ids or per-record details, for actionable reporting.
    #[serde(default)]
    pub details: Vec<String>,
}

impl RuleOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details,
        }
    }
}

/// A pure predicate over a [`ValidationInput`] snapshot.
///
/// Returning `Err` marks the rule implementation itself as broken; the
/// engine converts that into a failed `Critical` result instead of
/// propagating.
pub type RulePredicate = Arc<dyn Fn(&ValidationInput) -> Result<RuleOutcome, CoreError> + Send + Sync>;

/// A registered validation rule.
#[derive(Clone)]
pub struct ValidationRule {
    pub id: String,
    pub category: RuleCategory,
    pub level: RuleLevel,
    pub description: String,
    pub enabled: bool,
    pub predicate: RulePredicate,
}

impl std::fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRule")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("level", &self.level)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// The evaluated result of one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub category: RuleCategory,
    pub level: RuleLevel,
    pub passed: bool,
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
    pub duration_ms: f64,
}

impl RuleResult {
    /// Whether this result is a blocking failure.
    pub fn is_critical_failure(&self) -> bool {
        !self.passed && self.level == RuleLevel::Critical
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// How a chain evaluates its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    Sequential,
    Parallel,
}

/// An ordered list of rules evaluated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationChain {
    pub id: String,
    pub rule_ids: Vec<String>,
    pub mode: ChainMode,
    /// Sequential mode only: stop at the first critical failure.
    pub stop_on_first_critical: bool,
}

/// Aggregated result of running a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub chain_id: String,
    pub total: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub critical_failures: usize,
    pub warning_failures: usize,
    pub results: Vec<RuleResult>,
}

impl ChainResult {
    /// A chain passes iff it produced zero critical failures.
    pub fn passed(&self) -> bool {
        self.critical_failures == 0
    }

    /// Build the aggregate from individual results.
    ///
    /// Results are sorted by rule id first so the aggregate is identical
    /// regardless of completion order (parallel mode requirement).
    pub fn from_results(chain_id: &str, mut results: Vec<RuleResult>) -> Self {
        results.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        let total = results.len();
        let passed_count = results.iter().filter(|r| r.passed).count();
        let critical_failures = results.iter().filter(|r| r.is_critical_failure()).count();
        let warning_failures = results
            .iter()
            .filter(|r| !r.passed && r.level == RuleLevel::Warning)
            .count();
        Self {
            chain_id: chain_id.to_string(),
            total,
            passed_count,
            failed_count: total - passed_count,
            critical_failures,
            warning_failures,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
