//! Object storage descriptors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Listing entry for one stored object
///
/// `name` is the full path inside the bucket. Store specific attributes
/// (ids, timestamps, metadata) are kept verbatim in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            attributes: Map::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Build a descriptor from a Supabase Storage list entry found under `dir`
    pub(crate) fn from_storage_entry(dir: &str, mut entry: Map<String, Value>) -> Option<Self> {
        let leaf = match entry.remove("name") {
            Some(Value::String(name)) => name,
            _ => return None,
        };
        let size = entry
            .get("metadata")
            .and_then(|m| m.get("size"))
            .and_then(Value::as_u64);
        Some(Self {
            name: join_path(dir, &leaf),
            size,
            attributes: entry,
        })
    }
}

pub(crate) fn join_path(dir: &str, leaf: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        leaf.to_string()
    } else {
        format!("{}/{}", dir, leaf)
    }
}
