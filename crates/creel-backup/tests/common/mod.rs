//! Shared fixtures for creel-backup integration tests

#![allow(dead_code)]

use camino::Utf8PathBuf;
use creel_backup::{BackupRepository, ProducerSettings};
use creel_core::config::BucketSpec;
use creel_core::retry::RetryPolicy;
use creel_store::{MemoryStore, ObjectDescriptor, Row};
use serde_json::json;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Temporary backup repository, removed on drop
pub struct TestRepo {
    _dir: TempDir,
    pub root: Utf8PathBuf,
    pub repo: BackupRepository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 temp dir");
        let repo = BackupRepository::new(root.clone());
        Self {
            _dir: dir,
            root,
            repo,
        }
    }
}

pub fn settings(tables: &[&str], buckets: &[&str]) -> ProducerSettings {
    ProducerSettings {
        tables: tables.iter().map(|t| t.to_string()).collect(),
        buckets: buckets.iter().map(|b| BucketSpec::new(*b)).collect(),
        concurrency: 4,
        retry: RetryPolicy::no_retry(),
        description: Some("integration test".to_string()),
    }
}

pub fn users() -> Vec<Row> {
    vec![
        json!({"id": 1, "name": "Ana", "email": "ana@example.com"}),
        json!({"id": 2, "name": "Radu", "email": "radu@example.com"}),
        json!({"id": 3, "name": "Ioana", "email": null}),
    ]
}

pub fn avatars() -> Vec<ObjectDescriptor> {
    vec![
        ObjectDescriptor::new("1/avatar.png").with_size(2048),
        ObjectDescriptor::new("2/avatar.jpg").with_size(4096),
    ]
}

/// `{users: 3 rows, records: 0 rows}` plus `avatars` with two files
pub fn source_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("users", users())
        .with_table("records", Vec::new())
        .with_bucket("avatars", avatars())
}

/// Set a document's modification time `days` days in the past
pub fn age_file(path: &camino::Utf8Path, days: u64) {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("Failed to open document");
    let mtime = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    file.set_modified(mtime).expect("Failed to set mtime");
}
