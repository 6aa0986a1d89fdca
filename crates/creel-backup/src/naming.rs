//! Backup name validation and defaults

use chrono::{DateTime, Utc};

use crate::error::{BackupError, Result};

/// Reason used when an emergency backup is taken without one
pub const DEFAULT_EMERGENCY_REASON: &str = "urgent";

/// Longest accepted name in bytes; leaves room for the extension under NAME_MAX
pub const MAX_NAME_BYTES: usize = 200;

/// Longest reason slug kept in an emergency name. The full reason is stored
/// in the document metadata.
const MAX_SLUG_CHARS: usize = 48;

/// Check that `name` is usable as a single file name stem
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(BackupError::invalid_name(name, "name is empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(BackupError::invalid_name(
            name,
            "name must not contain path separators",
        ));
    }
    if name.starts_with('.') {
        return Err(BackupError::invalid_name(name, "name must not start with '.'"));
    }
    if name.contains("..") {
        return Err(BackupError::invalid_name(name, "name must not contain '..'"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(BackupError::invalid_name(
            name,
            format!("name is longer than {} bytes", MAX_NAME_BYTES),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(BackupError::invalid_name(
            name,
            "name must not contain control characters",
        ));
    }
    Ok(())
}

/// `backup-<YYYY-MM-DD>-<unix millis>`
pub fn default_backup_name(now: DateTime<Utc>) -> String {
    format!(
        "backup-{}-{}",
        now.format("%Y-%m-%d"),
        now.timestamp_millis()
    )
}

/// `EMERGENCY-<reason slug>-<timestamp>` where the timestamp is RFC 3339 with
/// `:` and `.` replaced by `-`
pub fn emergency_backup_name(reason: Option<&str>, now: DateTime<Utc>) -> String {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_EMERGENCY_REASON);
    format!(
        "EMERGENCY-{}-{}",
        slug(reason),
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

fn slug(reason: &str) -> String {
    reason
        .chars()
        .take(MAX_SLUG_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
