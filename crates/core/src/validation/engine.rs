//! Registry-backed rule evaluator.
//!
//! Owns the rule and chain registries (copy-on-read for anything handed to
//! callers), evaluates single rules and whole chains, tracks per-rule
//! diagnostics, and supports a read-only simulation mode for what-if checks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

use super::rules::{
    ChainMode, ChainResult, RuleLevel, RuleResult, ValidationChain, ValidationInput,
    ValidationRule,
};

// ---------------------------------------------------------------------------
// Per-rule statistics
// ---------------------------------------------------------------------------

/// Rolling diagnostics for one rule. Never used for control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleStats {
    pub executions: u64,
    pub failures: u64,
    /// Rolling average over all executions.
    pub avg_duration_ms: f64,
}

impl RuleStats {
    fn record(&mut self, duration_ms: f64, passed: bool) {
        self.executions += 1;
        if !passed {
            self.failures += 1;
        }
        self.avg_duration_ms += (duration_ms - self.avg_duration_ms) / self.executions as f64;
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Read-only dry-run outcome for a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub would_pass: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The validation rule engine: owned registries plus diagnostics.
pub struct ValidationEngine {
    rules: HashMap<String, ValidationRule>,
    chains: HashMap<String, ValidationChain>,
    stats: Mutex<HashMap<String, RuleStats>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            chains: HashMap::new(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) a rule.
    pub fn register_rule(&mut self, rule: ValidationRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    /// Register (or replace) a chain.
    pub fn register_chain(&mut self, chain: ValidationChain) {
        self.chains.insert(chain.id.clone(), chain);
    }

    /// Copy-on-read snapshot of a rule's diagnostics.
    pub fn rule_stats(&self, rule_id: &str) -> Option<RuleStats> {
        self.stats
            .lock()
            .expect("stats lock poisoned")
            .get(rule_id)
            .cloned()
    }

    /// Evaluate a single rule by id.
    ///
    /// A predicate error is converted into a failed `Critical` result —
    /// rule implementation failures must never abort the caller. Unknown
    /// rule ids are a caller error and do propagate.
    pub fn validate_rule(
        &self,
        rule_id: &str,
        input: &ValidationInput,
    ) -> Result<RuleResult, CoreError> {
        let rule = self.rules.get(rule_id).ok_or(CoreError::NotFound {
            entity: "validation_rule",
            id: rule_id.to_string(),
        })?;
        Ok(self.evaluate(rule, input))
    }

    fn evaluate(&self, rule: &ValidationRule, input: &ValidationInput) -> RuleResult {
        let result = run_predicate(rule, input);
        self.record_stats(&result);
        result
    }

    fn record_stats(&self, result: &RuleResult) {
        self.stats
            .lock()
            .expect("stats lock poisoned")
            .entry(result.rule_id.clone())
            .or_default()
            .record(result.duration_ms, result.passed);
    }

    /// Evaluate a chain against the input snapshot.
    ///
    /// Sequential mode honors `stop_on_first_critical`; parallel mode runs
    /// every enabled rule on its own blocking-pool thread and merges
    /// results by rule id, so the aggregate never depends on completion
    /// order.
    pub async fn validate_chain(
        &self,
        chain_id: &str,
        input: &ValidationInput,
    ) -> Result<ChainResult, CoreError> {
        let chain = self.chains.get(chain_id).ok_or(CoreError::NotFound {
            entity: "validation_chain",
            id: chain_id.to_string(),
        })?;

        let rules: Vec<&ValidationRule> = chain
            .rule_ids
            .iter()
            .filter_map(|id| self.rules.get(id))
            .filter(|r| r.enabled)
            .collect();

        let results = match chain.mode {
            ChainMode::Sequential => {
                let mut results = Vec::with_capacity(rules.len());
                for rule in rules {
                    let result = self.evaluate(rule, input);
                    let stop = chain.stop_on_first_critical && result.is_critical_failure();
                    results.push(result);
                    if stop {
                        break;
                    }
                }
                results
            }
            ChainMode::Parallel => {
                // Each predicate runs on its own blocking-pool thread, so
                // the rules genuinely overlap. The merge sorts by rule id;
                // completion order never shows in the aggregate.
                let mut meta = Vec::with_capacity(rules.len());
                let mut tasks = Vec::with_capacity(rules.len());
                for rule in rules {
                    meta.push((rule.id.clone(), rule.category));
                    let rule = rule.clone();
                    let input = input.clone();
                    tasks.push(tokio::task::spawn_blocking(move || {
                        run_predicate(&rule, &input)
                    }));
                }
                let mut results = Vec::with_capacity(tasks.len());
                for ((rule_id, category), task) in
                    meta.into_iter().zip(futures::future::join_all(tasks).await)
                {
                    let result = task.unwrap_or_else(|e| RuleResult {
                        rule_id: rule_id.clone(),
                        category,
                        // A panicking rule implementation always blocks.
                        level: RuleLevel::Critical,
                        passed: false,
                        message: format!("Rule '{rule_id}' panicked during evaluation: {e}"),
                        details: Vec::new(),
                        duration_ms: 0.0,
                    });
                    self.record_stats(&result);
                    results.push(result);
                }
                results
            }
        };

        Ok(ChainResult::from_results(chain_id, results))
    }

    /// Run a chain read-only and describe what would happen.
    ///
    /// Simulation ignores `stop_on_first_critical` so every issue is
    /// surfaced at once.
    pub async fn simulate(
        &self,
        chain_id: &str,
        input: &ValidationInput,
    ) -> Result<Simulation, CoreError> {
        let chain = self.chains.get(chain_id).ok_or(CoreError::NotFound {
            entity: "validation_chain",
            id: chain_id.to_string(),
        })?;

        let mut results = Vec::with_capacity(chain.rule_ids.len());
        for id in &chain.rule_ids {
            if let Some(rule) = self.rules.get(id) {
                if rule.enabled {
                    results.push(self.evaluate(rule, input));
                }
            }
        }
        let aggregate = ChainResult::from_results(chain_id, results);

        let issues: Vec<String> = aggregate
            .results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("[{}] {}: {}", r.level, r.rule_id, r.message))
            .collect();

        let mut recommendations = Vec::new();
        for r in aggregate.results.iter().filter(|r| !r.passed) {
            match r.level {
                RuleLevel::Critical => recommendations.push(format!(
                    "Resolve '{}' before starting the migration",
                    r.rule_id
                )),
                RuleLevel::Warning => recommendations.push(format!(
                    "Review '{}' — the run will proceed but may need cleanup",
                    r.rule_id
                )),
                RuleLevel::Info => {}
            }
        }

        Ok(Simulation {
            would_pass: aggregate.passed(),
            issues,
            recommendations,
        })
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one predicate and shape its result. Stats are recorded by the
/// caller, so this is free of shared state and can run off-thread.
fn run_predicate(rule: &ValidationRule, input: &ValidationInput) -> RuleResult {
    let started = Instant::now();
    let outcome = (rule.predicate)(input);
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(outcome) => RuleResult {
            rule_id: rule.id.clone(),
            category: rule.category,
            level: rule.level,
            passed: outcome.passed,
            message: outcome.message,
            details: outcome.details,
            duration_ms,
        },
        Err(e) => RuleResult {
            rule_id: rule.id.clone(),
            category: rule.category,
            // Broken rule implementations always block.
            level: RuleLevel::Critical,
            passed: false,
            message: format!("Rule '{}' failed to evaluate: {e}", rule.id),
            details: Vec::new(),
            duration_ms,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::validation::rules::{RuleCategory, RuleOutcome};

    fn rule(id: &str, level: RuleLevel, pass: bool) -> ValidationRule {
        ValidationRule {
            id: id.to_string(),
            category: RuleCategory::PreMigration,
            level,
            description: String::new(),
            enabled: true,
            predicate: Arc::new(move |_| {
                if pass {
                    Ok(RuleOutcome::pass("ok"))
                } else {
                    Ok(RuleOutcome::fail("failed", vec![]))
                }
            }),
        }
    }

    fn chain(id: &str, rule_ids: &[&str], mode: ChainMode, stop: bool) -> ValidationChain {
        ValidationChain {
            id: id.to_string(),
            rule_ids: rule_ids.iter().map(|s| s.to_string()).collect(),
            mode,
            stop_on_first_critical: stop,
        }
    }

    #[test]
    fn unknown_rule_id_is_a_caller_error() {
        let engine = ValidationEngine::new();
        let result = engine.validate_rule("nope", &ValidationInput::default());
        assert_matches!(result, Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn predicate_error_becomes_critical_failure() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(ValidationRule {
            id: "broken".to_string(),
            category: RuleCategory::PreMigration,
            level: RuleLevel::Info,
            description: String::new(),
            enabled: true,
            predicate: Arc::new(|_| Err(CoreError::Internal("boom".to_string()))),
        });

        let result = engine
            .validate_rule("broken", &ValidationInput::default())
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.level, RuleLevel::Critical);
        assert!(result.message.contains("boom"));
    }

    #[tokio::test]
    async fn sequential_stops_on_first_critical() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("a_fails", RuleLevel::Critical, false));
        let c = counter.clone();
        engine.register_rule(ValidationRule {
            id: "b_counts".to_string(),
            category: RuleCategory::PreMigration,
            level: RuleLevel::Info,
            description: String::new(),
            enabled: true,
            predicate: Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(RuleOutcome::pass("ok"))
            }),
        });
        engine.register_chain(chain(
            "pre",
            &["a_fails", "b_counts"],
            ChainMode::Sequential,
            true,
        ));

        let result = engine
            .validate_chain("pre", &ValidationInput::default())
            .await
            .unwrap();
        assert!(!result.passed());
        assert_eq!(result.total, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sequential_runs_all_without_stop_flag() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("a_fails", RuleLevel::Critical, false));
        engine.register_rule(rule("b_passes", RuleLevel::Info, true));
        engine.register_chain(chain(
            "pre",
            &["a_fails", "b_passes"],
            ChainMode::Sequential,
            false,
        ));

        let result = engine
            .validate_chain("pre", &ValidationInput::default())
            .await
            .unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.critical_failures, 1);
    }

    #[tokio::test]
    async fn parallel_merges_by_rule_id() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("z", RuleLevel::Info, true));
        engine.register_rule(rule("a", RuleLevel::Info, true));
        engine.register_rule(rule("m", RuleLevel::Warning, false));
        engine.register_chain(chain("par", &["z", "a", "m"], ChainMode::Parallel, false));

        let result = engine
            .validate_chain("par", &ValidationInput::default())
            .await
            .unwrap();
        let ids: Vec<&str> = result.results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
        assert!(result.passed());
        assert_eq!(result.warning_failures, 1);
    }

    #[tokio::test]
    async fn parallel_rules_overlap_in_time() {
        use std::sync::Condvar;
        use std::time::Duration;

        // Each rule announces itself, then waits for the other. Both pass
        // only when they are in flight at the same time; a sequential
        // evaluation would leave the first rule waiting until its timeout.
        let gate = Arc::new((Mutex::new(0usize), Condvar::new()));
        let mut engine = ValidationEngine::new();
        for id in ["left", "right"] {
            let gate = Arc::clone(&gate);
            engine.register_rule(ValidationRule {
                id: id.to_string(),
                category: RuleCategory::PreMigration,
                level: RuleLevel::Critical,
                description: String::new(),
                enabled: true,
                predicate: Arc::new(move |_| {
                    let (count, cv) = &*gate;
                    let mut n = count.lock().unwrap();
                    *n += 1;
                    cv.notify_all();
                    while *n < 2 {
                        let (guard, timeout) =
                            cv.wait_timeout(n, Duration::from_secs(5)).unwrap();
                        n = guard;
                        if timeout.timed_out() {
                            return Ok(RuleOutcome::fail("peer rule never started", vec![]));
                        }
                    }
                    Ok(RuleOutcome::pass("ok"))
                }),
            });
        }
        engine.register_chain(chain("par", &["left", "right"], ChainMode::Parallel, false));

        let result = engine
            .validate_chain("par", &ValidationInput::default())
            .await
            .unwrap();
        assert!(result.passed(), "rules must run at the same time");
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn disabled_rules_are_skipped() {
        let mut engine = ValidationEngine::new();
        let mut r = rule("off", RuleLevel::Critical, false);
        r.enabled = false;
        engine.register_rule(r);
        engine.register_chain(chain("pre", &["off"], ChainMode::Sequential, true));

        let result = engine
            .validate_chain("pre", &ValidationInput::default())
            .await
            .unwrap();
        assert_eq!(result.total, 0);
        assert!(result.passed());
    }

    #[tokio::test]
    async fn stats_track_executions_and_failures() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("flaky", RuleLevel::Warning, false));
        let input = ValidationInput::default();
        engine.validate_rule("flaky", &input).unwrap();
        engine.validate_rule("flaky", &input).unwrap();

        let stats = engine.rule_stats("flaky").unwrap();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.failures, 2);
        assert!(stats.avg_duration_ms >= 0.0);
    }

    #[tokio::test]
    async fn simulate_reports_all_issues_without_stopping() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("a_fails", RuleLevel::Critical, false));
        engine.register_rule(rule("b_warns", RuleLevel::Warning, false));
        engine.register_chain(chain(
            "pre",
            &["a_fails", "b_warns"],
            ChainMode::Sequential,
            true,
        ));

        let sim = engine
            .simulate("pre", &ValidationInput::default())
            .await
            .unwrap();
        assert!(!sim.would_pass);
        assert_eq!(sim.issues.len(), 2);
        assert!(sim
            .recommendations
            .iter()
            .any(|r| r.contains("a_fails")));
    }

    #[tokio::test]
    async fn unknown_chain_id_is_a_caller_error() {
        let engine = ValidationEngine::new();
        let result = engine
            .validate_chain("nope", &ValidationInput::default())
            .await;
        assert_matches!(result, Err(CoreError::NotFound { .. }));
    }
}
