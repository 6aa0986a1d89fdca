//! Backup document format
//!
//! A backup document is a pretty-printed JSON object with four sections:
//! `metadata`, `tables`, `storage` and `summary`. Field names are a file
//! contract shared with every tool that reads the repository.

use chrono::{DateTime, Utc};
use creel_store::{ObjectDescriptor, Row};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

use crate::error::Result;
use crate::tier::Tier;

/// Version of the document format written by this crate
pub const DOCUMENT_VERSION: &str = "1.0";

/// Sections every readable document must have
pub const REQUIRED_SECTIONS: [&str; 3] = ["metadata", "tables", "summary"];

/// Complete backup document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub metadata: DocumentMetadata,

    pub tables: OrderedMap<TableSnapshot>,

    #[serde(default)]
    pub storage: OrderedMap<BucketSnapshot>,

    pub summary: BackupSummary,
}

/// Document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub created_at: DateTime<Utc>,

    pub backup_name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default)]
    pub created_by: String,
}

/// Captured rows of one table, or the error that prevented capturing them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableSnapshot {
    pub fn captured(rows: Vec<Row>) -> Self {
        Self {
            data: Some(rows),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Rows counted towards `total_records`. Errored tables contribute none,
    /// even when a legacy document carries an empty `data` array alongside
    /// the error.
    pub fn record_count(&self) -> u64 {
        if self.is_errored() {
            0
        } else {
            self.data.as_ref().map_or(0, |rows| rows.len() as u64)
        }
    }

    /// Rows to restore, if the snapshot is usable
    pub fn rows(&self) -> Option<&[Row]> {
        if self.is_errored() {
            None
        } else {
            self.data.as_deref()
        }
    }
}

/// Listed objects of one bucket, or the error that prevented listing them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ObjectDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BucketSnapshot {
    pub fn listed(files: Vec<ObjectDescriptor>) -> Self {
        Self {
            files: Some(files),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            files: None,
            error: Some(error.into()),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn file_count(&self) -> usize {
        self.files.as_ref().map_or(0, Vec::len)
    }
}

/// Totals derived from the `tables` and `storage` sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
    #[serde(default)]
    pub total_tables: u64,

    #[serde(default)]
    pub successful_tables: u64,

    #[serde(default)]
    pub total_records: u64,

    #[serde(default)]
    pub total_buckets: u64,

    #[serde(default)]
    pub successful_buckets: u64,

    #[serde(default)]
    pub backup_size_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BackupSummary {
    /// Scan the snapshots and derive every count from what they contain
    pub fn compute(
        tables: &OrderedMap<TableSnapshot>,
        storage: &OrderedMap<BucketSnapshot>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            total_tables: tables.len() as u64,
            successful_tables: tables.values().filter(|t| !t.is_errored()).count() as u64,
            total_records: tables.values().map(TableSnapshot::record_count).sum(),
            total_buckets: storage.len() as u64,
            successful_buckets: storage.values().filter(|b| !b.is_errored()).count() as u64,
            backup_size_bytes: 0,
            created_at: Some(created_at),
        }
    }

    pub fn errored_tables(&self) -> u64 {
        self.total_tables.saturating_sub(self.successful_tables)
    }
}

impl BackupDocument {
    /// Names of tables whose capture failed
    pub fn errored_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|(_, t)| t.is_errored())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Serialize as pretty JSON with `summary.backup_size_bytes` equal to the
    /// exact length of the returned bytes.
    pub fn to_json_bytes(&mut self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&*self)?;
        // Converges within a couple of rounds: only the digit count of the
        // size field can move the length.
        for _ in 0..8 {
            let len = bytes.len() as u64;
            if self.summary.backup_size_bytes == len {
                break;
            }
            self.summary.backup_size_bytes = len;
            bytes = serde_json::to_vec_pretty(&*self)?;
        }
        Ok(bytes)
    }

    pub fn from_json(json: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json)
    }
}

/// String-keyed map that keeps insertion order on disk and in memory.
///
/// Table order is restore order, so it must survive a round trip through
/// the document unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<V> Extend<(String, V)> for OrderedMap<V> {
    fn extend<I: IntoIterator<Item = (String, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}
