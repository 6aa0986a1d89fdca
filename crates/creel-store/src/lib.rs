//! # creel-store
//!
//! Adapters for the two external collaborators of the backup pipeline:
//! - [`TableStore`]: table-oriented read/delete/insert over the relational database
//! - [`ObjectStore`]: list-by-prefix over object storage buckets
//!
//! [`SupabaseStore`] talks to a Supabase project (PostgREST + Storage).
//! [`MemoryStore`] keeps everything in process and supports failure injection.

pub mod error;
pub mod memory;
pub mod object;
pub mod supabase;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, Operation};
pub use object::ObjectDescriptor;
pub use supabase::SupabaseStore;
pub use traits::{ObjectStore, Row, TableStore};
