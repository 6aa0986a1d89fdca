//! In-process table and object store with failure injection

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectDescriptor;
use crate::traits::{ObjectStore, Row, TableStore};

/// Which table operation an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Delete,
    Insert,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    message: String,
    /// Remaining failures before the operation recovers; `None` fails forever
    remaining: Option<u32>,
    transient: bool,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<Row>>,
    buckets: BTreeMap<String, Vec<ObjectDescriptor>>,
    failures: HashMap<(String, Operation), InjectedFailure>,
    bucket_failures: HashMap<String, String>,
    mutated: BTreeSet<String>,
}

/// Table and object store held entirely in memory
///
/// Tables must exist (see [`MemoryStore::with_table`]) before they can be
/// read. Inserting into an unknown table creates it.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with the given rows
    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.lock().tables.insert(table.to_string(), rows);
        self
    }

    /// Add empty tables
    pub fn with_empty_tables(self, tables: &[&str]) -> Self {
        {
            let mut state = self.lock();
            for table in tables {
                state.tables.insert(table.to_string(), Vec::new());
            }
        }
        self
    }

    /// Add a bucket with the given objects
    pub fn with_bucket(self, bucket: &str, objects: Vec<ObjectDescriptor>) -> Self {
        self.lock().buckets.insert(bucket.to_string(), objects);
        self
    }

    /// Make every call fail as if the store could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail `operation` on `table` with a permanent error
    pub fn fail(&self, table: &str, operation: Operation, message: &str) {
        self.lock().failures.insert(
            (table.to_string(), operation),
            InjectedFailure {
                message: message.to_string(),
                remaining: None,
                transient: false,
            },
        );
    }

    /// Fail `operation` on `table` with a transient error `times` times, then recover
    pub fn fail_transiently(&self, table: &str, operation: Operation, times: u32) {
        self.lock().failures.insert(
            (table.to_string(), operation),
            InjectedFailure {
                message: "temporarily unavailable".to_string(),
                remaining: Some(times),
                transient: true,
            },
        );
    }

    /// Remove any injected failure for `operation` on `table`
    pub fn clear_failure(&self, table: &str, operation: Operation) {
        self.lock().failures.remove(&(table.to_string(), operation));
    }

    /// Fail listing of `bucket`
    pub fn fail_bucket(&self, bucket: &str, message: &str) {
        self.lock()
            .bucket_failures
            .insert(bucket.to_string(), message.to_string());
    }

    /// Snapshot of a table's current rows
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.lock().tables.get(table).cloned()
    }

    /// Tables that received a delete or insert call
    pub fn mutated_tables(&self) -> BTreeSet<String> {
        self.lock().mutated.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn injected(state: &mut State, table: &str, operation: Operation) -> StoreResult<()> {
        let key = (table.to_string(), operation);
        let Some(failure) = state.failures.get_mut(&key) else {
            return Ok(());
        };

        if failure.remaining == Some(0) {
            state.failures.remove(&key);
            return Ok(());
        }
        if let Some(n) = failure.remaining.as_mut() {
            *n -= 1;
        }

        let status = if failure.transient { 503 } else { 400 };
        Err(StoreError::request(status, failure.message.clone()))
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_reachable()
    }

    async fn fetch_rows(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.check_reachable()?;
        let mut state = self.lock();
        Self::injected(&mut state, table, Operation::Fetch)?;
        state.tables.get(table).cloned().ok_or_else(|| {
            StoreError::request(404, format!("relation \"{}\" does not exist", table))
        })
    }

    async fn delete_all(&self, table: &str) -> StoreResult<u64> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.mutated.insert(table.to_string());
        Self::injected(&mut state, table, Operation::Delete)?;
        let removed = state
            .tables
            .get_mut(table)
            .map(|rows| std::mem::take(rows).len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> StoreResult<u64> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.mutated.insert(table.to_string());
        Self::injected(&mut state, table, Operation::Insert)?;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<ObjectDescriptor>> {
        self.check_reachable()?;
        let state = self.lock();
        if let Some(message) = state.bucket_failures.get(bucket) {
            return Err(StoreError::request(400, message.clone()));
        }
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::request(404, format!("bucket {} not found", bucket)))?;
        Ok(objects
            .iter()
            .filter(|o| prefix.is_none_or(|p| o.name.starts_with(p)))
            .cloned()
            .collect())
    }
}
