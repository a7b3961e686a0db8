//! The seal: a sidecar file caching the unlocker so successive commands
//! don't re-prompt for a passphrase.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::error::Result;
use crate::store::MODE_SEAL;

/// `${XDG_RUNTIME_DIR}/vault-<uuid>.seal` when that directory exists, else
/// `/tmp/vault-<user>.seal`. The runtime-dir form is preferred because it
/// is usually tmpfs and binds the seal to one specific vault.
pub fn seal_path(vault_uuid: &str) -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(&runtime_dir);
        if dir.is_dir() {
            return dir.join(format!("vault-{vault_uuid}.seal"));
        }
    }
    let user = std::env::var("VAULT_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/vault-{user}.seal"))
}

pub fn is_unsealed(path: &std::path::Path) -> bool {
    path.is_file()
}

pub fn read_seal(path: &std::path::Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

pub fn write_seal(path: &std::path::Path, unlocker: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.set_permissions(fs::Permissions::from_mode(MODE_SEAL))?;
    file.write_all(unlocker)?;
    file.flush()?;
    Ok(())
}

/// Used by the user-facing `seal` command: errors if the vault is already
/// sealed, matching the prior art's behavior of `seal()` failing on a
/// missing file.
pub fn remove_seal(path: &std::path::Path) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

/// Used internally by rotation: sealing an already-sealed vault is a
/// no-op, not an error, because rotation only wants the guarantee that no
/// seal is left lying around with the outdated unlocker.
pub fn force_seal(path: &std::path::Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.seal");

        assert!(!is_unsealed(&path));
        write_seal(&path, b"some-unlocker-bytes").unwrap();
        assert!(is_unsealed(&path));
        assert_eq!(read_seal(&path).unwrap(), b"some-unlocker-bytes");

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o400);

        remove_seal(&path).unwrap();
        assert!(!is_unsealed(&path));
    }

    #[test]
    fn force_seal_is_noop_when_already_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.seal");
        force_seal(&path).unwrap();
        force_seal(&path).unwrap();
    }
}
