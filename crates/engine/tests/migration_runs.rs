//! Integration tests for the migration pipeline: scope, validation gates,
//! partial-success semantics, identity resolution, cooldown, and events.

mod common;

use assert_matches::assert_matches;
use common::{build_engine, meeting, project, schedule};

use syncline_core::conflict::identity::{IdentityConflictType, IdentityResolution};
use syncline_core::scope::{Scope, ScopeFilter};
use syncline_engine::run::MigrationErrorKind;
use syncline_engine::{EngineError, MigrationOptions, RunState};
use syncline_events::EngineEvent;
use syncline_store::MigrationStore;

// ---------------------------------------------------------------------------
// Test: empty scope migrates nothing and still succeeds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_scope_succeeds_with_zero_migrated() {
    let (engine, _store) = build_engine(vec![project("P1", "planning")], vec![], vec![]).await;

    let report = engine
        .migrate(MigrationOptions {
            scope: Scope::projects(["P1"]),
            force: false,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 0);
    assert!(report.errors.is_empty());
    assert_eq!(engine.state(), RunState::Completed);
}

// ---------------------------------------------------------------------------
// Test: a clean batch migrates fully and links back to its sources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_batch_migrates_every_record() {
    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), meeting("M2", "P1", 2), meeting("M3", "P1", 3)],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 3);
    assert!(report.conflicts.is_empty());

    let schedules = store.list_schedules().await.unwrap();
    assert_eq!(schedules.len(), 3);
    for s in &schedules {
        assert_eq!(s.source_meeting_id.as_deref(), Some(s.id.as_str()));
        assert!(s.starts_at < s.ends_at);
    }
}

// ---------------------------------------------------------------------------
// Test: per-record conversion failures do not abort the batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unparseable_timestamp_is_isolated() {
    let mut bad = meeting("M2", "P1", 2);
    bad.starts_at = "not-a-timestamp".to_string();

    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), bad, meeting("M3", "P1", 3)],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(report.success, "warnings and record errors must not fail the run");
    assert_eq!(report.migrated, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].record_id, "M2");
    assert_eq!(report.errors[0].kind, MigrationErrorKind::ConversionError);
    assert_eq!(store.list_schedules().await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: critical pre-validation failure leaves the store unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_pre_validation_commits_nothing() {
    // M2 references a project that does not exist.
    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), meeting("M2", "P9", 2)],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.migrated, 0);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == MigrationErrorKind::ValidationError));
    assert_eq!(engine.state(), RunState::Failed);
    // Fail-fast: nothing was created.
    assert!(store.list_schedules().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: skip_validation bypasses the gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skip_validation_migrates_despite_bad_references() {
    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), meeting("M2", "P9", 2)],
    )
    .await;

    let report = engine
        .migrate(MigrationOptions {
            skip_validation: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 2);
    assert_eq!(store.list_schedules().await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: exact-id collision is renamed and recorded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exact_id_collision_renames_incoming() {
    let mut incoming = meeting("M1", "P1", 4);
    incoming.starts_at = "2026-03-02T14:00:00Z".to_string();
    incoming.ends_at = "2026-03-02T15:00:00Z".to_string();

    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![schedule("M1", "P1", 9, 10)],
        vec![incoming],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 1);
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.conflict_type, IdentityConflictType::ExactId);
    assert_eq!(conflict.resolution, IdentityResolution::Rename);

    assert!(store.get_schedule("M1-migrated-1").await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Test: sequence duplicates are skipped, existing record kept
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequence_duplicate_is_skipped() {
    // Same project + ordinal as the existing schedule, far apart in time.
    let mut dup = meeting("M9", "P1", 1);
    dup.starts_at = "2026-03-02T15:00:00Z".to_string();
    dup.ends_at = "2026-03-02T16:00:00Z".to_string();

    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![schedule("S1", "P1", 9, 10)],
        vec![dup],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(
        report.conflicts[0].conflict_type,
        IdentityConflictType::SequenceDuplicate
    );
    assert_eq!(report.conflicts[0].resolution, IdentityResolution::Skip);
    assert_eq!(store.list_schedules().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: date-proximity duplicates are kept but annotated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn date_proximity_duplicate_is_merged_with_annotation() {
    // Starts 30 seconds after the existing schedule, different ordinal.
    let mut near = meeting("M9", "P1", 2);
    near.starts_at = "2026-03-02T09:00:30Z".to_string();
    near.ends_at = "2026-03-02T10:00:30Z".to_string();

    let (engine, store) = build_engine(
        vec![project("P1", "planning")],
        vec![schedule("S1", "P1", 9, 10)],
        vec![near],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.migrated, 1);
    assert_eq!(
        report.conflicts[0].conflict_type,
        IdentityConflictType::DateProximity
    );
    assert_eq!(report.conflicts[0].resolution, IdentityResolution::Merge);

    let merged = store.get_schedule("M9").await.unwrap().unwrap();
    assert!(merged.title.contains("(migrated duplicate)"));
    assert_eq!(store.list_schedules().await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: cooldown rejects a prompt re-run unless forced
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cooldown_rejects_back_to_back_runs() {
    let (engine, _store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1)],
    )
    .await;

    let first = engine.migrate(MigrationOptions::default()).await.unwrap();
    assert!(first.success);

    let err = engine.migrate(MigrationOptions::default()).await.unwrap_err();
    assert_matches!(err, EngineError::CooldownActive { remaining_secs } if remaining_secs > 0);

    // Forcing bypasses the window. The already-migrated record collides on
    // its id and is renamed rather than silently re-created.
    let forced = engine
        .migrate(MigrationOptions {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(forced.success);
    assert_eq!(forced.conflicts.len(), 1);
    assert_eq!(forced.conflicts[0].resolution, IdentityResolution::Rename);
}

// ---------------------------------------------------------------------------
// Test: run lifecycle events arrive in order on the bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_events_are_published_in_order() {
    let (engine, _store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), meeting("M2", "P1", 2)],
    )
    .await;
    let mut rx = engine.subscribe();

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();
    assert!(report.success);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "run.started",
            "run.progress",
            "run.progress",
            "run.completed"
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: progress callback sees a monotonic percentage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_percent_is_monotonic() {
    use std::sync::{Arc, Mutex};

    let (engine, _store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        (1..=5).map(|n| meeting(&format!("M{n}"), "P1", n)).collect(),
    )
    .await;

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let report = engine
        .migrate(MigrationOptions {
            on_progress: Some(Arc::new(move |p| {
                sink.lock().unwrap().push(p.percent);
            })),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.success);
    let percents = seen.lock().unwrap().clone();
    assert_eq!(percents.len(), 5);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100);
}

// ---------------------------------------------------------------------------
// Test: drafts are excluded unless opted in
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drafts_are_excluded_by_default() {
    let mut draft = meeting("M2", "P1", 2);
    draft.draft = true;

    let (engine, _store) = build_engine(
        vec![project("P1", "planning")],
        vec![],
        vec![meeting("M1", "P1", 1), draft],
    )
    .await;

    let report = engine.migrate(MigrationOptions::default()).await.unwrap();
    assert_eq!(report.migrated, 1);

    let mut scope = Scope {
        filter: ScopeFilter::Explicit {
            meeting_ids: vec!["M2".to_string()],
        },
        options: Default::default(),
    };
    scope.options.include_drafts = true;
    let second = engine
        .migrate(MigrationOptions {
            scope,
            force: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.migrated, 1, "the draft migrates once opted in");
}
