//! Persisted run history and the cooldown gate.
//!
//! Past run outcomes are appended through the store and loaded on engine
//! construction, so the cooldown survives restarts. The in-memory view is
//! bounded; the store keeps the full log.

use chrono::Duration;

use syncline_store::{MigrationStore, RunRecord, StoreError};
use syncline_core::types::Timestamp;

/// How many records the in-memory view retains.
pub const HISTORY_LIMIT: usize = 50;

/// Window after a completed run during which non-forced starts are rejected.
pub const COOLDOWN_SECS: i64 = 300;

/// Bounded view over the persisted run log.
pub struct RunHistory {
    records: Vec<RunRecord>,
}

impl RunHistory {
    /// Load the persisted log, keeping only the newest [`HISTORY_LIMIT`]
    /// records in memory.
    pub async fn load(store: &dyn MigrationStore) -> Result<Self, StoreError> {
        let mut records = store.list_run_records().await?;
        if records.len() > HISTORY_LIMIT {
            records.drain(..records.len() - HISTORY_LIMIT);
        }
        tracing::debug!(records = records.len(), "Loaded run history");
        Ok(Self { records })
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Append a record to the store and the in-memory view.
    pub async fn append(
        &mut self,
        store: &dyn MigrationStore,
        record: RunRecord,
    ) -> Result<(), StoreError> {
        store.append_run_record(record.clone()).await?;
        self.records.push(record);
        if self.records.len() > HISTORY_LIMIT {
            self.records.remove(0);
        }
        Ok(())
    }

    /// Seconds remaining in the cooldown window, if a run completed within
    /// [`COOLDOWN_SECS`] of `now`. Failed and cancelled runs never trigger
    /// the cooldown.
    pub fn cooldown_remaining(&self, now: Timestamp) -> Option<i64> {
        let last_completed = self
            .records
            .iter()
            .rev()
            .find(|r| r.state == "completed")?;
        let elapsed = now.signed_duration_since(last_completed.finished_at);
        if elapsed < Duration::seconds(COOLDOWN_SECS) && elapsed >= Duration::zero() {
            Some(COOLDOWN_SECS - elapsed.num_seconds())
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
