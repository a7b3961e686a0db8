//! Advisory cross-process lock on the vault (§5's concurrency policy: the
//! vault was never designed for concurrent writers, so two simultaneous
//! `edit` or `rotate` invocations must be refused, not raced). Implemented
//! as a sidecar file created with `O_EXCL`-style atomic semantics rather
//! than a new dependency — the same "explicit create, explicit mode"
//! style `store.rs` already uses for secret and metadata files.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

pub(crate) const LOCK_NAME: &str = "_vault.meta.lock";

/// Held for the duration of one write operation. Released on every exit
/// path, including early returns and panics, via `Drop` — the scoped-
/// acquisition idiom §5 and §9 call for.
pub struct VaultLock {
    path: PathBuf,
}

impl VaultLock {
    /// Acquire the lock or fail immediately; this crate has no reason to
    /// block a command waiting for another instance to finish.
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_NAME);
        OpenOptions::new().write(true).create_new(true).open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => VaultError::Locked(path.display().to_string()),
            _ => VaultError::Storage(e),
        })?;
        Ok(VaultLock { path })
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root).unwrap();

        let first = VaultLock::acquire(root).unwrap();
        let err = VaultLock::acquire(root).unwrap_err();
        assert!(matches!(err, VaultError::Locked(_)));

        drop(first);
        let _second = VaultLock::acquire(root).unwrap();
    }

    #[test]
    fn dropping_the_lock_removes_the_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let lock_path = root.join(LOCK_NAME);

        let guard = VaultLock::acquire(root).unwrap();
        assert!(lock_path.is_file());
        drop(guard);
        assert!(!lock_path.is_file());
    }
}
