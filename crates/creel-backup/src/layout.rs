//! Backup repository layout
//!
//! ```text
//! <root>/
//!   .locks/                       advisory lock files
//!   emergency/<name>.json         + <name>.txt sidecar
//!   daily/<name>.json
//!   weekly/<name>.json
//!   monthly/<name>.json
//! ```
//!
//! Tier directories are owner-only and documents are written 0600 because
//! they hold personal data in plaintext.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Write};
use tracing::{debug, warn};

use crate::error::{BackupError, Result};
use crate::naming::validate_name;
use crate::tier::Tier;

const DOCUMENT_EXTENSION: &str = "json";
const SIDECAR_EXTENSION: &str = "txt";
const LOCK_DIR: &str = ".locks";

/// A stored document found while scanning the repository
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub tier: Tier,
    pub name: String,
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Filesystem view of the backup root
#[derive(Debug, Clone)]
pub struct BackupRepository {
    root: Utf8PathBuf,
}

impl BackupRepository {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn tier_dir(&self, tier: Tier) -> Utf8PathBuf {
        self.root.join(tier.dir_name())
    }

    pub fn document_path(&self, tier: Tier, name: &str) -> Utf8PathBuf {
        self.tier_dir(tier)
            .join(format!("{}.{}", name, DOCUMENT_EXTENSION))
    }

    pub fn sidecar_path(&self, tier: Tier, name: &str) -> Utf8PathBuf {
        self.tier_dir(tier)
            .join(format!("{}.{}", name, SIDECAR_EXTENSION))
    }

    pub fn lock_path(&self, lock_name: &str) -> Utf8PathBuf {
        self.root.join(LOCK_DIR).join(format!("{}.lock", lock_name))
    }

    /// Create the tier directory with owner-only permissions
    pub fn ensure_tier_dir(&self, tier: Tier) -> Result<Utf8PathBuf> {
        let dir = self.tier_dir(tier);
        create_private_dir(&dir)?;
        Ok(dir)
    }

    /// Write `bytes` to `<root>/<tier>/<name>.json` atomically.
    ///
    /// The content goes to a temporary file in the same directory, is synced,
    /// and is then renamed into place without replacing an existing document.
    pub fn write_document(&self, tier: Tier, name: &str, bytes: &[u8]) -> Result<Utf8PathBuf> {
        validate_name(name)?;
        let dir = self.ensure_tier_dir(tier)?;
        let path = self.document_path(tier, name);

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        restrict_file(temp.as_file())?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;

        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                BackupError::AlreadyExists(path.clone())
            } else {
                BackupError::Io(e.error)
            }
        })?;

        sync_dir(&dir);
        debug!("Wrote {} ({} bytes)", path, bytes.len());
        Ok(path)
    }

    /// Write the plain-text summary that accompanies an emergency document
    pub fn write_sidecar(&self, tier: Tier, name: &str, text: &str) -> Result<Utf8PathBuf> {
        let dir = self.ensure_tier_dir(tier)?;
        let path = self.sidecar_path(tier, name);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        restrict_file(temp.as_file())?;
        temp.write_all(text.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| BackupError::Io(e.error))?;
        Ok(path)
    }

    /// Every `*.json` document in `tier` (or all tiers), newest first
    pub fn entries(&self, tier: Option<Tier>) -> Result<Vec<CatalogEntry>> {
        let tiers: Vec<Tier> = match tier {
            Some(t) => vec![t],
            None => Tier::ALL.to_vec(),
        };

        let mut entries = Vec::new();
        for tier in tiers {
            let dir = self.tier_dir(tier);
            let read_dir = match fs::read_dir(&dir) {
                Ok(rd) => rd,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            for dir_entry in read_dir {
                let dir_entry = dir_entry?;
                let Ok(path) = Utf8PathBuf::from_path_buf(dir_entry.path()) else {
                    warn!("Skipping non UTF-8 path in {}", dir);
                    continue;
                };
                if path.extension() != Some(DOCUMENT_EXTENSION) {
                    continue;
                }
                let Some(name) = path.file_stem().map(str::to_string) else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let metadata = dir_entry.metadata()?;
                if !metadata.is_file() {
                    continue;
                }
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                entries.push(CatalogEntry {
                    tier,
                    name,
                    path,
                    size_bytes: metadata.len(),
                    modified,
                });
            }
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }

    /// Resolve a reference to a document path.
    ///
    /// Accepted forms: `<name>`, `<tier>/<name>`, or a path to an existing
    /// `.json` file. A bare name is searched in `tier` when given, otherwise
    /// in every tier.
    pub fn resolve(&self, reference: &str, tier: Option<Tier>) -> Result<ResolvedBackup> {
        let reference = reference.trim();

        let direct = Utf8Path::new(reference);
        if direct.extension() == Some(DOCUMENT_EXTENSION) && direct.is_file() {
            let name = direct.file_stem().unwrap_or(reference).to_string();
            return Ok(ResolvedBackup {
                tier: self.tier_of(direct),
                name,
                path: direct.to_owned(),
            });
        }

        let (tier, name) = match reference.split_once('/') {
            Some((t, n)) => match t.parse::<Tier>() {
                Ok(parsed) => (Some(parsed), n),
                Err(_) => return Err(BackupError::BackupNotFound(reference.to_string())),
            },
            None => (tier, reference),
        };
        let name = name.strip_suffix(".json").unwrap_or(name);
        validate_name(name)?;

        let candidates: Vec<Tier> = match tier {
            Some(t) => vec![t],
            None => Tier::ALL.to_vec(),
        };
        let mut found: Vec<ResolvedBackup> = candidates
            .into_iter()
            .map(|t| ResolvedBackup {
                tier: Some(t),
                name: name.to_string(),
                path: self.document_path(t, name),
            })
            .filter(|r| r.path.is_file())
            .collect();

        if found.len() > 1 {
            return Err(BackupError::AmbiguousBackup {
                name: name.to_string(),
                candidates: found
                    .iter()
                    .filter_map(|r| r.tier.map(|t| format!("{}/{}", t, name)))
                    .collect(),
            });
        }
        found
            .pop()
            .ok_or_else(|| BackupError::BackupNotFound(reference.to_string()))
    }

    /// Delete a document and, for emergency backups, its sidecar
    pub fn remove(&self, entry: &CatalogEntry) -> Result<()> {
        fs::remove_file(&entry.path)?;
        let sidecar = self.sidecar_path(entry.tier, &entry.name);
        match fs::remove_file(&sidecar) {
            Ok(()) => debug!("Removed sidecar {}", sidecar),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove sidecar {}: {}", sidecar, e),
        }
        Ok(())
    }

    fn tier_of(&self, path: &Utf8Path) -> Option<Tier> {
        path.parent()
            .and_then(Utf8Path::file_name)
            .and_then(|dir| dir.parse().ok())
    }
}

/// Location of one stored document
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBackup {
    /// Tier inferred from the directory, if the document lives in the repository layout
    pub tier: Option<Tier>,
    pub name: String,
    pub path: Utf8PathBuf,
}

pub(crate) fn create_private_dir(dir: &Utf8Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(dir)?.permissions();
        if perms.mode() & 0o777 != 0o700 {
            perms.set_mode(0o700);
            fs::set_permissions(dir, perms)?;
        }
    }
    Ok(())
}

fn restrict_file(file: &File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)?;
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}

fn sync_dir(dir: &Utf8Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            if let Err(e) = handle.sync_all() {
                debug!("Directory sync failed for {}: {}", dir, e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
