//! Integration tests for the consistency auditor and auto-recovery.

mod common;

use common::{build_engine, meeting, project, schedule};

use syncline_core::consistency::{HealthStatus, InconsistencyType, RecoveryStrategy};
use syncline_core::model::DEFAULT_PHASE;
use syncline_store::MigrationStore;

// ---------------------------------------------------------------------------
// Test: orphan schedules are detected and auto-recovery removes them
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orphans_are_detected_and_fixed() {
    // 10 schedules, 2 of which reference a deleted project P9. Distinct
    // ordinals keep the duplicate detector out of this scenario.
    let mut schedules: Vec<_> = (0..8)
        .map(|n| {
            let mut s = schedule(&format!("S{n}"), "P1", 9, 10);
            s.sequence_ordinal = n;
            s
        })
        .collect();
    let mut orphan_a = schedule("S8", "P9", 11, 12);
    orphan_a.sequence_ordinal = 8;
    let mut orphan_b = schedule("S9", "P9", 13, 14);
    orphan_b.sequence_ordinal = 9;
    schedules.push(orphan_a);
    schedules.push(orphan_b);

    let (engine, store) = build_engine(vec![project("P1", "planning")], schedules, vec![]).await;

    let report = engine.health_check().await.unwrap();
    let orphan = report
        .issues
        .iter()
        .find(|i| i.issue_type == InconsistencyType::OrphanSchedule)
        .expect("orphan issue");
    assert_eq!(orphan.affected_schedules.len(), 2);
    assert!(orphan.auto_fixable);
    assert_eq!(orphan.suggested_strategy, RecoveryStrategy::DeleteOrphan);

    let recovery = engine.auto_recover(&report.issues).await.unwrap();
    assert_eq!(recovery.failed, 0);

    let after = engine.health_check().await.unwrap();
    assert!(after
        .issues
        .iter()
        .all(|i| i.issue_type != InconsistencyType::OrphanSchedule));
    assert_eq!(store.list_schedules().await.unwrap().len(), 8);
    assert_eq!(after.status, HealthStatus::Healthy);
}

// ---------------------------------------------------------------------------
// Test: missing schedules are recreated from their source meetings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_schedules_are_recreated_from_source() {
    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1)],
    )
    .await;

    let report = engine.health_check().await.unwrap();
    let missing = report
        .issues
        .iter()
        .find(|i| i.issue_type == InconsistencyType::MissingSchedule)
        .expect("missing-schedule issue");
    assert_eq!(missing.affected_meetings, vec!["M1"]);

    let recovery = engine.auto_recover(&report.issues).await.unwrap();
    assert_eq!(recovery.fixed, 1);

    let recreated = store.get_schedule("M1").await.unwrap().unwrap();
    assert_eq!(recreated.source_meeting_id.as_deref(), Some("M1"));
}

// ---------------------------------------------------------------------------
// Test: invalid phases reset to the safe default
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_phase_resets_to_default() {
    let (engine, store) =
        build_engine(vec![project("P1", "warp-speed")], vec![], vec![]).await;

    let report = engine.health_check().await.unwrap();
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == InconsistencyType::InvalidPhase));

    let recovery = engine.auto_recover(&report.issues).await.unwrap();
    assert_eq!(recovery.fixed, 1);
    let action = &recovery.actions[0];
    assert_eq!(action.before["phase"], "warp-speed");
    assert_eq!(action.after["phase"], DEFAULT_PHASE);

    let fixed = store.get_project("P1").await.unwrap().unwrap();
    assert_eq!(fixed.phase, DEFAULT_PHASE);
}

// ---------------------------------------------------------------------------
// Test: duplicate sequence slots keep the newest member only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicates_keep_newest() {
    let mut older = schedule("S1", "P1", 9, 10);
    older.updated_at = common::fixed_time(8, 0);
    let mut newer = schedule("S2", "P1", 11, 12);
    newer.updated_at = common::fixed_time(12, 0);

    let (engine, store) =
        build_engine(vec![project("P1", "planning")], vec![older, newer], vec![]).await;

    let report = engine.health_check().await.unwrap();
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == InconsistencyType::DuplicateMeeting));

    engine.auto_recover(&report.issues).await.unwrap();

    let remaining = store.list_schedules().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "S2");
}

// ---------------------------------------------------------------------------
// Test: inverted bounds repaired to a one-hour slot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inverted_timestamps_are_repaired() {
    let mut broken = schedule("S1", "P1", 14, 12);

    // Avoid tripping the duplicate detector alongside.
    broken.sequence_ordinal = 7;
    let (engine, store) =
        build_engine(vec![project("P1", "planning")], vec![broken], vec![]).await;

    let report = engine.health_check().await.unwrap();
    assert!(report
        .issues
        .iter()
        .any(|i| i.issue_type == InconsistencyType::TimestampMismatch));

    let recovery = engine.auto_recover(&report.issues).await.unwrap();
    assert_eq!(recovery.fixed, 1);

    let fixed = store.get_schedule("S1").await.unwrap().unwrap();
    assert!(fixed.starts_at < fixed.ends_at);
    assert_eq!(fixed.ends_at - fixed.starts_at, chrono::Duration::hours(1));
}

// ---------------------------------------------------------------------------
// Test: one failing fix does not block the others
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recovery_is_best_effort() {
    // An orphan that exists plus a finding naming a schedule that is
    // already gone: the stale fix is a no-op delete and the real orphan
    // still gets removed.
    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![schedule("S1", "P9", 9, 10)],
        vec![],
    )
    .await;

    let mut report = engine.health_check().await.unwrap();
    for issue in &mut report.issues {
        if issue.issue_type == InconsistencyType::OrphanSchedule {
            issue.affected_schedules.push("GHOST".to_string());
        }
    }

    let recovery = engine.auto_recover(&report.issues).await.unwrap();
    assert!(recovery.actions.len() >= 2);
    assert!(store.get_schedule("S1").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: health events are published
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_and_recovery_events_are_published() {
    let (engine, _store) = build_engine(
        vec![project("P1", "planning")],
        vec![schedule("S1", "P9", 9, 10)],
        vec![],
    )
    .await;
    let mut rx = engine.subscribe();

    let report = engine.health_check().await.unwrap();
    engine.auto_recover(&report.issues).await.unwrap();

    assert_eq!(rx.try_recv().unwrap().name(), "health.completed");
    assert_eq!(rx.try_recv().unwrap().name(), "recovery.applied");
}
