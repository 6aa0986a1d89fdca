//! Advisory file locks guarding producer and restore runs

use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use tracing::{debug, warn};

use crate::error::{BackupError, Result};
use crate::layout::create_private_dir;

/// Exclusive lock held for as long as the value lives
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: Utf8PathBuf,
}

impl RunLock {
    /// Take the lock at `path` without waiting. A lock held by anyone else
    /// yields [`BackupError::LockHeld`].
    pub fn try_acquire(path: &Utf8Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {}
            Ok(false) => return Err(BackupError::LockHeld(path.to_owned())),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(BackupError::LockHeld(path.to_owned()))
            }
            Err(e) => return Err(e.into()),
        }

        // Owner pid for whoever inspects a stuck lock
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        debug!("Acquired lock {}", path);
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_fast_until_release() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join(".locks/daily-b1.lock")).unwrap();

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(matches!(
            RunLock::try_acquire(&path),
            Err(BackupError::LockHeld(_))
        ));

        drop(first);
        assert!(RunLock::try_acquire(&path).is_ok());
    }
}
