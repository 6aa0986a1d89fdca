//! Integration tests for pruning against a real repository layout

mod common;

use chrono::Utc;
use common::{age_file, settings, source_store, TestRepo};
use creel_backup::{
    prune, BackupProducer, BackupRequest, PruneReason, RetentionPolicy, Tier,
};

#[tokio::test]
async fn test_prune_keeps_newest_four_weekly() {
    let t = TestRepo::new();
    let source = source_store();
    let settings = settings(&["users"], &[]);
    let producer = BackupProducer::new(&source, &source, &t.repo, &settings);

    for i in 0..6u64 {
        let outcome = producer
            .produce(&BackupRequest::named(format!("week-{}", i), Tier::Weekly), Utc::now())
            .await
            .unwrap();
        // week-0 is the newest
        age_file(&outcome.path, i * 7);
    }

    let report = prune(&t.repo, &RetentionPolicy::default(), Utc::now(), false).unwrap();
    assert_eq!(report.kept, 4);
    assert_eq!(report.removed.len(), 2);
    assert!(report
        .removed
        .iter()
        .all(|c| c.reason == PruneReason::OverCount));

    let mut left: Vec<String> = t
        .repo
        .entries(Some(Tier::Weekly))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    left.sort();
    assert_eq!(left, vec!["week-0", "week-1", "week-2", "week-3"]);
}

#[tokio::test]
async fn test_single_over_age_backup_survives() {
    let t = TestRepo::new();
    let source = source_store();
    let settings = settings(&["users"], &[]);

    let outcome = BackupProducer::new(&source, &source, &t.repo, &settings)
        .produce(&BackupRequest::emergency(None), Utc::now())
        .await
        .unwrap();
    age_file(&outcome.path, 10);

    let report = prune(&t.repo, &RetentionPolicy::default(), Utc::now(), false).unwrap();
    assert!(report.removed.is_empty());
    assert!(outcome.path.exists());
}

#[tokio::test]
async fn test_prune_removes_emergency_sidecar() {
    let t = TestRepo::new();
    let source = source_store();
    let settings = settings(&["users"], &[]);
    let producer = BackupProducer::new(&source, &source, &t.repo, &settings);

    let old = producer
        .produce(&BackupRequest::named("old", Tier::Emergency), Utc::now())
        .await
        .unwrap();
    producer
        .produce(&BackupRequest::named("new", Tier::Emergency), Utc::now())
        .await
        .unwrap();
    age_file(&old.path, 3);

    let report = prune(&t.repo, &RetentionPolicy::default(), Utc::now(), false).unwrap();
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.removed[0].reason, PruneReason::OverAge);
    assert!(!old.path.exists());
    assert!(!old.sidecar.unwrap().exists());
}

#[tokio::test]
async fn test_dry_run_deletes_nothing() {
    let t = TestRepo::new();
    let source = source_store();
    let settings = settings(&["users"], &[]);
    let producer = BackupProducer::new(&source, &source, &t.repo, &settings);

    for i in 0..3u64 {
        let outcome = producer
            .produce(&BackupRequest::named(format!("day-{}", i), Tier::Daily), Utc::now())
            .await
            .unwrap();
        age_file(&outcome.path, i * 8);
    }

    let report = prune(&t.repo, &RetentionPolicy::default(), Utc::now(), true).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.removed.len(), 2);
    assert!(report.freed_bytes > 0);
    assert_eq!(t.repo.entries(Some(Tier::Daily)).unwrap().len(), 3);
}
