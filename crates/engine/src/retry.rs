//! Retry policy seam.
//!
//! Attempt counting and backoff live outside this engine; the
//! orchestrator only asks "should this run proceed?" and reports
//! outcomes. [`MemoryRetryPolicy`] is the bundled implementation with a
//! bounded attempt count.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// External retry subsystem contract.
///
/// Accounting is keyed by run id; a re-attempted run keeps the id of the
/// run it retries so its attempts accumulate under one key.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    /// Whether another attempt of this run may proceed.
    async fn should_retry(&self, run_id: &str) -> bool;
    /// Record that an attempt is starting.
    async fn record_attempt(&self, run_id: &str);
    /// Mark the run finished successfully.
    async fn mark_completed(&self, run_id: &str);
    /// Record that the current attempt failed.
    async fn mark_failed(&self, run_id: &str, reason: &str);
}

// ---------------------------------------------------------------------------
// MemoryRetryPolicy
// ---------------------------------------------------------------------------

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default)]
struct AttemptRecord {
    attempts: u32,
    completed: bool,
    last_failure: Option<String>,
}

/// In-memory retry bookkeeping with a fixed attempt ceiling.
///
/// Denies a run once its attempts are spent or once it has completed. A
/// failed attempt keeps its remaining attempts; the failure reason is
/// retained for diagnostics only.
pub struct MemoryRetryPolicy {
    max_attempts: u32,
    records: RwLock<HashMap<String, AttemptRecord>>,
}

impl MemoryRetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Attempts recorded so far for a run id.
    pub async fn attempts(&self, run_id: &str) -> u32 {
        self.records
            .read()
            .await
            .get(run_id)
            .map(|r| r.attempts)
            .unwrap_or(0)
    }

    /// Most recent failure reason recorded for a run id.
    pub async fn last_failure(&self, run_id: &str) -> Option<String> {
        self.records
            .read()
            .await
            .get(run_id)
            .and_then(|r| r.last_failure.clone())
    }
}

impl Default for MemoryRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[async_trait]
impl RetryPolicy for MemoryRetryPolicy {
    async fn should_retry(&self, run_id: &str) -> bool {
        let records = self.records.read().await;
        match records.get(run_id) {
            None => true,
            Some(r) => !r.completed && r.attempts < self.max_attempts,
        }
    }

    async fn record_attempt(&self, run_id: &str) {
        let mut records = self.records.write().await;
        records.entry(run_id.to_string()).or_default().attempts += 1;
    }

    async fn mark_completed(&self, run_id: &str) {
        let mut records = self.records.write().await;
        records.entry(run_id.to_string()).or_default().completed = true;
    }

    async fn mark_failed(&self, run_id: &str, reason: &str) {
        let mut records = self.records.write().await;
        records.entry(run_id.to_string()).or_default().last_failure = Some(reason.to_string());
        tracing::warn!(run_id, reason, "Run attempt failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
