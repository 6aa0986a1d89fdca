//! Per-table restore transaction with compensating rollback
//!
//! The store offers no client-side transactions, so a transaction keeps the
//! table's pre-restore rows in memory. Rolling back wipes whatever the
//! restore left behind and re-inserts those rows.

use creel_core::retry::{retry_with_policy, RetryPolicy};
use creel_store::{Row, StoreError, StoreResult, TableStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    Wiped { rows: u64 },
    Inserted { rows: u64 },
}

pub struct TableTransaction<'a> {
    pub id: String,
    table: String,
    store: &'a dyn TableStore,
    snapshot: Vec<Row>,
    changes: Vec<TableChange>,
}

impl<'a> TableTransaction<'a> {
    /// Capture the table's live rows. Nothing is modified.
    pub async fn begin(
        store: &'a dyn TableStore,
        table: &str,
        retry: &RetryPolicy,
    ) -> StoreResult<Self> {
        let id = Uuid::new_v4().to_string();
        let snapshot = retry_with_policy(
            retry,
            &format!("snapshot {}", table),
            StoreError::is_transient,
            || store.fetch_rows(table),
        )
        .await?;
        debug!(
            "Transaction {} on {}: pre-restore snapshot holds {} rows",
            id,
            table,
            snapshot.len()
        );

        Ok(Self {
            id,
            table: table.to_string(),
            store,
            snapshot,
            changes: Vec::new(),
        })
    }

    /// Replace the table's contents with `rows`
    pub async fn replace(&mut self, rows: &[Row]) -> StoreResult<u64> {
        let wiped = self.store.delete_all(&self.table).await?;
        self.changes.push(TableChange::Wiped { rows: wiped });

        let inserted = self.store.insert_rows(&self.table, rows).await?;
        self.changes.push(TableChange::Inserted { rows: inserted });
        Ok(inserted)
    }

    pub fn commit(self) {
        info!(
            "Committed restore of {} (transaction {})",
            self.table, self.id
        );
    }

    /// Put the pre-restore rows back. A transaction with no recorded change
    /// has nothing to undo.
    pub async fn rollback(self) -> StoreResult<()> {
        if self.changes.is_empty() {
            debug!("Transaction {} on {}: nothing to roll back", self.id, self.table);
            return Ok(());
        }

        warn!(
            "Rolling back restore of {} (transaction {}), re-inserting {} rows",
            self.table,
            self.id,
            self.snapshot.len()
        );
        self.store.delete_all(&self.table).await?;
        self.store.insert_rows(&self.table, &self.snapshot).await?;
        Ok(())
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn changes(&self) -> &[TableChange] {
        &self.changes
    }
}
