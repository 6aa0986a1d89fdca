//! Integration tests for restore preflight, confirmation and rollback

mod common;

use chrono::Utc;
use common::{settings, source_store, users, TestRepo};
use creel_backup::{
    BackupError, BackupProducer, BackupRequest, FixedAnswers, InterruptFlag, RestoreExecutor,
    RestoreOptions, RestoreResult, RestoreState, RunLock, TableOutcome, Tier,
};
use creel_store::memory::Operation;
use creel_store::MemoryStore;
use serde_json::{json, Value};

async fn backup(t: &TestRepo, name: &str, fail_records: bool) -> camino::Utf8PathBuf {
    let source = source_store();
    if fail_records {
        source.fail("records", Operation::Fetch, "permission denied");
    }
    let settings = settings(&["users", "records"], &["avatars"]);
    BackupProducer::new(&source, &source, &t.repo, &settings)
        .produce(&BackupRequest::named(name, Tier::Daily), Utc::now())
        .await
        .unwrap()
        .path
}

fn live_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("users", vec![json!({"id": 7, "name": "live"})])
        .with_table("records", vec![json!({"id": 70})])
}

#[tokio::test]
async fn test_declined_confirmation_changes_nothing() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();

    let mut executor = RestoreExecutor::new(&target, &t.repo);
    let prepared = executor
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .unwrap();
    let mut gate = FixedAnswers::no();
    let result = executor
        .execute(prepared, &mut gate, &InterruptFlag::new())
        .await
        .unwrap();

    assert!(matches!(result, RestoreResult::Aborted));
    assert_eq!(executor.state(), RestoreState::Aborted);
    assert_eq!(gate.confirm_asked, 1);
    assert!(target.mutated_tables().is_empty());
}

#[tokio::test]
async fn test_partial_backup_requires_allow_partial() {
    let t = TestRepo::new();
    backup(&t, "partial", true).await;
    let target = live_store();
    let executor = RestoreExecutor::new(&target, &t.repo);

    let err = executor
        .prepare("partial", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    match err {
        BackupError::PartialBackup { tables, .. } => assert_eq!(tables, vec!["records"]),
        other => panic!("unexpected error: {}", other),
    }
    assert!(target.mutated_tables().is_empty());
}

#[tokio::test]
async fn test_errored_tables_are_never_touched() {
    let t = TestRepo::new();
    backup(&t, "partial", true).await;
    let target = live_store();

    let mut executor = RestoreExecutor::new(&target, &t.repo);
    let options = RestoreOptions {
        allow_partial: true,
        ..RestoreOptions::default()
    };
    let prepared = executor.prepare("partial", None, options).await.unwrap();
    let preview = prepared.preview();
    assert!(preview.tables[1].skip_reason.is_some());

    let RestoreResult::Completed(report) = executor
        .execute(prepared, &mut FixedAnswers::yes(), &InterruptFlag::new())
        .await
        .unwrap()
    else {
        panic!("restore was aborted");
    };

    assert!(report.is_success());
    assert!(matches!(
        report.outcome("records"),
        Some(TableOutcome::Skipped { .. })
    ));
    assert!(!target.mutated_tables().contains("records"));
    assert_eq!(target.rows("records").unwrap(), vec![json!({"id": 70})]);
    assert_eq!(target.rows("users").unwrap(), users());
}

#[tokio::test]
async fn test_consistency_mismatch_blocks_without_override() {
    let t = TestRepo::new();
    let path = backup(&t, "tampered", false).await;

    let mut document: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    document["summary"]["total_records"] = json!(42);
    std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

    let target = live_store();
    let mut executor = RestoreExecutor::new(&target, &t.repo);

    let err = executor
        .prepare("tampered", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    match err {
        BackupError::ConsistencyMismatch { details, .. } => {
            assert!(details[0].contains("total_records"))
        }
        other => panic!("unexpected error: {}", other),
    }

    let options = RestoreOptions {
        override_consistency: true,
        ..RestoreOptions::default()
    };

    // Declining the second confirmation aborts
    let prepared = executor.prepare("tampered", None, options).await.unwrap();
    let mut gate = FixedAnswers {
        confirm: true,
        confirm_override: false,
        ..FixedAnswers::default()
    };
    let result = executor
        .execute(prepared, &mut gate, &InterruptFlag::new())
        .await
        .unwrap();
    assert!(matches!(result, RestoreResult::Aborted));
    assert_eq!(gate.override_asked, 1);
    assert_eq!(gate.confirm_asked, 0);
    assert!(target.mutated_tables().is_empty());

    let prepared = executor.prepare("tampered", None, options).await.unwrap();
    let mut gate = FixedAnswers::yes();
    let result = executor
        .execute(prepared, &mut gate, &InterruptFlag::new())
        .await
        .unwrap();
    assert!(matches!(result, RestoreResult::Completed(_)));
    assert_eq!((gate.override_asked, gate.confirm_asked), (1, 1));
}

#[tokio::test]
async fn test_failed_insert_rolls_back_to_live_rows() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();
    // Fails the restore insert once; the rollback insert then succeeds
    target.fail_transiently("users", Operation::Insert, 1);

    let mut executor = RestoreExecutor::new(&target, &t.repo);
    let prepared = executor
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .unwrap();
    let RestoreResult::Completed(report) = executor
        .execute(prepared, &mut FixedAnswers::yes(), &InterruptFlag::new())
        .await
        .unwrap()
    else {
        panic!("restore was aborted");
    };

    assert!(!report.is_success());
    assert!(matches!(
        report.outcome("users"),
        Some(TableOutcome::Failed {
            rolled_back: true,
            ..
        })
    ));
    assert_eq!(
        target.rows("users").unwrap(),
        vec![json!({"id": 7, "name": "live"})]
    );
    // Later tables still run
    assert_eq!(
        report.outcome("records"),
        Some(&TableOutcome::Success { rows: 0 })
    );
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();
    target.fail("users", Operation::Insert, "insert rejected");

    let mut executor = RestoreExecutor::new(&target, &t.repo);
    let prepared = executor
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .unwrap();
    let RestoreResult::Completed(report) = executor
        .execute(prepared, &mut FixedAnswers::yes(), &InterruptFlag::new())
        .await
        .unwrap()
    else {
        panic!("restore was aborted");
    };

    match report.outcome("users") {
        Some(TableOutcome::Failed { error, rolled_back }) => {
            assert!(!rolled_back);
            assert!(error.contains("rollback failed"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_interrupt_skips_remaining_tables() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();
    let interrupt = InterruptFlag::new();
    interrupt.trigger();

    let mut executor = RestoreExecutor::new(&target, &t.repo);
    let prepared = executor
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .unwrap();
    let RestoreResult::Completed(report) = executor
        .execute(prepared, &mut FixedAnswers::yes(), &interrupt)
        .await
        .unwrap()
    else {
        panic!("restore was aborted");
    };

    assert!(report.interrupted);
    assert!(!report.is_success());
    assert_eq!(report.skipped(), 2);
    assert!(target.mutated_tables().is_empty());
}

#[tokio::test]
async fn test_unreachable_store_blocks_restore() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();
    target.set_unreachable(true);

    let err = RestoreExecutor::new(&target, &t.repo)
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackupError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_concurrent_restore_is_refused() {
    let t = TestRepo::new();
    backup(&t, "nightly", false).await;
    let target = live_store();
    let _held = RunLock::try_acquire(&t.repo.lock_path("restore")).unwrap();

    let err = RestoreExecutor::new(&target, &t.repo)
        .prepare("nightly", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackupError::LockHeld(_)));
}

#[tokio::test]
async fn test_unknown_and_ambiguous_names() {
    let t = TestRepo::new();
    let source = source_store();
    let settings = settings(&["users"], &[]);
    let producer = BackupProducer::new(&source, &source, &t.repo, &settings);
    for tier in [Tier::Daily, Tier::Weekly] {
        producer
            .produce(&BackupRequest::named("twin", tier), Utc::now())
            .await
            .unwrap();
    }

    let target = live_store();
    let executor = RestoreExecutor::new(&target, &t.repo);

    let err = executor
        .prepare("missing", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackupError::BackupNotFound(_)));

    let err = executor
        .prepare("twin", None, RestoreOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackupError::AmbiguousBackup { .. }));

    assert!(executor
        .prepare("twin", Some(Tier::Weekly), RestoreOptions::default())
        .await
        .is_ok());
}
