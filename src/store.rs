//! Vault directory layout, path grammar, and filesystem primitives shared
//! by every component that touches disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};
use crate::lock::LOCK_NAME;
use crate::metadata::{RESERVED_META, RESERVED_META_NEW};

pub const MODE_SECRET: u32 = 0o600;
pub const MODE_META: u32 = 0o600;
pub const MODE_SEAL: u32 = 0o400;
pub const MODE_DIR: u32 = 0o700;

/// `VAULT_PATH` overrides the vault root; otherwise `~/.vault`.
pub fn resolve_vault_root() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("VAULT_PATH") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| VaultError::Fatal("could not determine home directory".into()))?;
    Ok(home.join(".vault"))
}

pub fn assert_vault_exists(root: &Path) -> Result<()> {
    if !meta_path(root).is_file() {
        return Err(VaultError::NoVault);
    }
    Ok(())
}

pub fn meta_path(root: &Path) -> PathBuf {
    root.join(RESERVED_META)
}

pub fn meta_new_path(root: &Path) -> PathBuf {
    root.join(RESERVED_META_NEW)
}

/// A previous `key rotate` that crashed between writing `_vault.meta.new`
/// and renaming it over `_vault.meta` leaves both files present. This is
/// distinct from ordinary corruption and deserves its own error so the
/// user is told to reconcile manually instead of seeing a JSON parse
/// failure.
pub fn detect_inconsistent_rotation(root: &Path) -> Result<()> {
    if meta_path(root).is_file() && meta_new_path(root).is_file() {
        return Err(VaultError::InconsistentRotation);
    }
    Ok(())
}

/// Validate and split a secret path into its slash-separated segments.
/// Each segment must match `[a-z0-9-]+`; no empty segments; the reserved
/// metadata names may not appear anywhere in the path.
pub fn validate_path(path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(VaultError::UserInput("secret path cannot be empty".into()));
    }

    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(VaultError::UserInput(format!("'{path}' contains an empty path segment")));
        }
        if segment == RESERVED_META || segment == RESERVED_META_NEW {
            return Err(VaultError::UserInput(format!("'{segment}' is a reserved name")));
        }
        if !segment.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(VaultError::UserInput(format!(
                "'{segment}' is invalid: path segments may only contain [a-z0-9-]"
            )));
        }
    }
    Ok(segments)
}

pub fn secret_file_path(root: &Path, path: &str) -> Result<PathBuf> {
    let segments = validate_path(path)?;
    let mut p = root.to_path_buf();
    for segment in segments {
        p.push(segment);
    }
    Ok(p)
}

/// Create every parent directory of `path` (relative to nothing in
/// particular — `path` is already absolute) with mode 0700.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all_secure(parent)?;
    }
    Ok(())
}

fn create_dir_all_secure(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        create_dir_all_secure(parent)?;
    }
    fs::create_dir(dir).or_else(|e| if dir.is_dir() { Ok(()) } else { Err(e) })?;
    fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR))?;
    Ok(())
}

/// Create-then-write a file with the given mode. Used for secret files and
/// the metadata document; a crash between create and write leaves a
/// truncated file, reported as corrupt on next read rather than silently
/// accepted.
pub fn write_file_secure(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(())
}

/// Write `contents` to a sibling temp file, then atomically rename it over
/// `path`. Used for the metadata document so a crash mid-write never
/// leaves `_vault.meta` truncated.
pub fn write_file_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.write_all(contents)?;
        file.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(VaultError::NoSecret(path.display().to_string()));
    }
    Ok(fs::read(path)?)
}

/// Remove `path`, then prune now-empty ancestor directories up to (but not
/// including) `root`.
pub fn remove_and_prune(root: &Path, path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    prune_empty_ancestors(root, path);
    Ok(())
}

pub fn prune_empty_ancestors(root: &Path, path: &Path) {
    let mut dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => return,
    };
    while dir != root && dir.starts_with(root) {
        match fs::read_dir(&dir) {
            Ok(mut entries) if entries.next().is_none() => {
                if fs::remove_dir(&dir).is_err() {
                    break;
                }
            }
            _ => break,
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }
}

/// List every secret's logical (slash-separated) path under `root`,
/// skipping `.git` and the reserved metadata files.
pub fn walk_secrets(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_entry(|e| {
        e.file_name() != ".git"
    }) {
        let entry = entry.map_err(|e| VaultError::Storage(std::io::Error::other(e.to_string())))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == RESERVED_META || name == RESERVED_META_NEW || name == LOCK_NAME {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let logical = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            out.push(logical);
        }
    }
    out.sort();
    Ok(out)
}

/// Create a brand-new, empty vault directory (mode 0700). Does nothing if
/// it already exists.
pub fn create_vault_dir(root: &Path) -> Result<()> {
    create_dir_all_secure(root)
}

/// A vault directory "exists with metadata" if init has already run.
pub fn vault_already_initialized(root: &Path) -> bool {
    meta_path(root).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_alnum_dash_segments() {
        assert_eq!(validate_path("foo/bar-baz/q1").unwrap(), vec!["foo", "bar-baz", "q1"]);
    }

    #[test]
    fn rejects_uppercase() {
        assert!(validate_path("BAD/name").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_path("foo//bar").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(validate_path("_vault.meta").is_err());
        assert!(validate_path("foo/_vault.meta.new").is_err());
    }

    /// SPEC_FULL §4.6 state machine / §9 item 5: a crash between writing
    /// `_vault.meta.new` and renaming it over `_vault.meta` leaves both
    /// files on disk; that must be reported as `InconsistentRotation`
    /// rather than silently picking one of the two.
    #[test]
    fn detect_inconsistent_rotation_when_both_metadata_files_present() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root).unwrap();

        assert!(detect_inconsistent_rotation(root).is_ok());

        fs::write(meta_path(root), b"{}").unwrap();
        assert!(detect_inconsistent_rotation(root).is_ok());

        fs::write(meta_new_path(root), b"{}").unwrap();
        let err = detect_inconsistent_rotation(root).unwrap_err();
        assert!(matches!(err, VaultError::InconsistentRotation));
    }

    #[test]
    fn prunes_empty_ancestors_but_stops_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("secret");
        fs::write(&file, b"x").unwrap();

        remove_and_prune(root, &file).unwrap();

        assert!(!root.join("a").exists());
        assert!(root.exists());
    }

    #[test]
    fn walk_secrets_skips_git_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git").join("HEAD"), b"x").unwrap();
        fs::write(root.join(RESERVED_META), b"{}").unwrap();
        fs::create_dir_all(root.join("foo")).unwrap();
        fs::write(root.join("foo").join("bar"), b"x").unwrap();

        let secrets = walk_secrets(root).unwrap();
        assert_eq!(secrets, vec!["foo/bar"]);
    }
}
