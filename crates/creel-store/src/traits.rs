//! Store adapter trait definitions

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::object::ObjectDescriptor;

/// A table row. The shape is defined by the store and treated as opaque.
pub type Row = serde_json::Value;

/// Table-oriented access to the relational database
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &'static str;

    /// Cheap connectivity check
    async fn ping(&self) -> StoreResult<()>;

    /// Read every row of a table. Pagination is handled by the adapter.
    async fn fetch_rows(&self, table: &str) -> StoreResult<Vec<Row>>;

    /// Delete every row of a table, returning the number removed
    async fn delete_all(&self, table: &str) -> StoreResult<u64>;

    /// Insert rows into a table, returning the number written
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> StoreResult<u64>;
}

/// List-by-prefix access to object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object in a bucket, optionally restricted to a prefix.
    /// Nested objects are returned with their full path as `name`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<ObjectDescriptor>>;
}
