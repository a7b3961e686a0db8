//! Key lifecycle (component F): vault bootstrap and key-slot management,
//! including the master-key rotation protocol.

use std::path::Path;

use log::{info, warn};

use crate::error::{Result, VaultError};
use crate::metadata::VaultMeta;
use crate::{crypto, keyring, prompt, seal, store, vcs};

pub fn init(root: &Path) -> Result<()> {
    if store::vault_already_initialized(root) {
        return Err(VaultError::UserInput(format!(
            "{} already exists and is a vault",
            root.display()
        )));
    }

    let passphrase = prompt::read_passphrase("Initial vault passphrase", true)?;
    let unlocker = crypto::hash_passphrase(passphrase.as_bytes());
    let master_key = crypto::generate_master_key();

    let slot = keyring::wrap_master_key(&unlocker.0, &master_key.0, "")?;
    let vault_uuid = uuid::Uuid::new_v4().to_string();
    let meta = VaultMeta::new(vault_uuid, slot);

    store::create_vault_dir(root)?;
    keyring::write_meta(root, &meta)?;

    if let Err(e) = vcs::init(root) {
        warn!("could not initialize git mirror: {e}");
    } else {
        vcs::commit_best_effort(root, store::meta_path(root).to_string_lossy().as_ref(), vcs::Op::Add, Some("Vault created"));
    }

    info!("vault created successfully");
    Ok(())
}

pub fn list_keys(root: &Path) -> Result<VaultMeta> {
    keyring::load_meta(root)
}

pub fn add_key(root: &Path, comment: &str) -> Result<()> {
    store::detect_inconsistent_rotation(root)?;
    let ctx = keyring::unlock(root)?;

    let new_passphrase = prompt::read_passphrase("New passphrase", true)?;
    let new_unlocker = crypto::hash_passphrase(new_passphrase.as_bytes());
    let slot = keyring::wrap_master_key(&new_unlocker.0, &ctx.master_key.0, comment)?;

    let mut meta = keyring::load_meta(root)?;
    meta.master_keys.push(slot);
    keyring::write_meta(root, &meta)?;

    vcs::commit_best_effort(root, "_vault.meta", vcs::Op::Edit, Some("Added a new key slot"));
    info!("key was successfully added");
    Ok(())
}

pub fn delete_key(root: &Path, id: usize) -> Result<()> {
    store::detect_inconsistent_rotation(root)?;
    let mut meta = keyring::load_meta(root)?;

    if meta.master_keys.len() == 1 {
        return Err(VaultError::UserInput("cannot delete the last key from the vault".into()));
    }
    if id >= meta.master_keys.len() {
        return Err(VaultError::UserInput(format!("unknown key ID {id}")));
    }

    meta.master_keys.remove(id);
    keyring::write_meta(root, &meta)?;

    vcs::commit_best_effort(root, "_vault.meta", vcs::Op::Edit, Some("Deleted a key slot"));
    info!("key was successfully deleted");
    Ok(())
}

const ROTATION_COMMENT: &str = "Key generated on vault rotation";

/// §4.6: rotate the master key, re-encrypting every secret, atomically
/// from the user's point of view. Any failure in steps 5-7 triggers a
/// rollback: hard-reset the git working tree and delete `_vault.meta.new`.
pub fn rotate_master(root: &Path) -> Result<()> {
    let vault_uuid = keyring::load_meta(root)?.uuid;

    // Step 1: force-seal.
    seal::force_seal(&seal::seal_path(&vault_uuid))?;

    // Step 2: obtain the current unlocker by prompting (not by trusting a
    // cached master key alone).
    let ctx = keyring::unlock_by_prompt(root)?;

    rotate_with_rollback(root, &ctx.unlocker.0, &ctx.master_key.0)
}

/// Steps 3-8 of §4.6 plus the "Failure handling" rollback: any error from
/// `rotate_inner` triggers a git hard-reset and deletes `_vault.meta.new`.
/// Split out from `rotate_master` so the rollback path is reachable in
/// tests without going through the interactive passphrase prompt.
fn rotate_with_rollback(root: &Path, current_unlocker: &[u8], current_master_key: &[u8]) -> Result<()> {
    let result = rotate_inner(root, current_unlocker, current_master_key);
    if let Err(e) = &result {
        warn!("rotation failed, rolling back: {e}");
        let _ = vcs::hard_reset(root);
        let _ = std::fs::remove_file(store::meta_new_path(root));
    }
    result
}

fn rotate_inner(root: &Path, current_unlocker: &[u8], current_master_key: &[u8]) -> Result<()> {
    // Step 3-4: fresh master key, single new slot wrapping it under the
    // unlocker the user just typed.
    let new_master_key = crypto::generate_master_key();
    let new_slot = keyring::wrap_master_key(current_unlocker, &new_master_key.0, ROTATION_COMMENT)?;
    let new_meta = VaultMeta::new(keyring::load_meta(root)?.uuid, new_slot);

    // Step 5: write _vault.meta.new.
    let new_meta_json = serde_json::to_vec(&new_meta)?;
    store::write_file_secure(&store::meta_new_path(root), &new_meta_json, store::MODE_META)?;

    // Step 6: re-encrypt every secret under the new master key.
    for secret_path in store::walk_secrets(root)? {
        let attrs = crate::secret::read_secret(root, &secret_path, current_master_key)?;
        crate::secret::encrypt_and_store(root, &secret_path, &attrs, &new_master_key.0)?;
    }

    // Step 7: atomically swap the metadata document.
    std::fs::rename(store::meta_new_path(root), store::meta_path(root))?;

    // Step 8: one commit covering everything rotation touched.
    vcs::commit_all(root, "Rotated vault master key")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Attribute, AttributeMap};

    fn init_test_vault(root: &Path, passphrase: &[u8]) -> crate::crypto::MasterKey {
        let unlocker = crypto::hash_passphrase(passphrase);
        let master_key = crypto::generate_master_key();
        let slot = keyring::wrap_master_key(&unlocker.0, &master_key.0, "").unwrap();
        let meta = VaultMeta::new(uuid::Uuid::new_v4().to_string(), slot);
        store::create_vault_dir(root).unwrap();
        keyring::write_meta(root, &meta).unwrap();
        master_key
    }

    #[test]
    fn delete_last_slot_is_refused_without_mutating_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        init_test_vault(root, b"only");

        let before = keyring::load_meta(root).unwrap();
        let err = delete_key(root, 0).unwrap_err();
        assert!(matches!(err, VaultError::UserInput(_)));

        let after = keyring::load_meta(root).unwrap();
        assert_eq!(before.master_keys.len(), after.master_keys.len());
    }

    #[test]
    fn delete_out_of_range_index_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = init_test_vault(root, b"first");
        let unlocker2 = crypto::hash_passphrase(b"second");
        let mut meta = keyring::load_meta(root).unwrap();
        meta.master_keys.push(keyring::wrap_master_key(&unlocker2.0, &master_key.0, "second").unwrap());
        keyring::write_meta(root, &meta).unwrap();

        let err = delete_key(root, 99).unwrap_err();
        assert!(matches!(err, VaultError::UserInput(_)));
    }

    #[test]
    fn rotation_preserves_secret_contents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = init_test_vault(root, b"s3cret");

        let mut attrs = AttributeMap::new();
        attrs.insert("user".into(), Attribute::plain("alice".into()));
        attrs.insert("password".into(), Attribute::eyes_only("hunter2".into()));
        crate::secret::encrypt_and_store(root, "foo/bar", &attrs, &master_key.0).unwrap();

        let unlocker = crypto::hash_passphrase(b"s3cret");
        let ctx_master_key = keyring::unlock_slots(&keyring::load_meta(root).unwrap(), &unlocker.0).unwrap();
        rotate_inner(root, &unlocker.0, &ctx_master_key.0).unwrap();

        let meta = keyring::load_meta(root).unwrap();
        assert_eq!(meta.master_keys.len(), 1);
        assert_eq!(meta.master_keys[0].comment, ROTATION_COMMENT);

        let new_master_key = keyring::unlock_slots(&meta, &unlocker.0).unwrap();
        let back = crate::secret::read_secret(root, "foo/bar", &new_master_key.0).unwrap();
        assert_eq!(back["user"].value, "alice");
        assert_eq!(back["password"].value, "hunter2");
    }

    #[test]
    fn rotation_invalidates_old_master_key_for_reading_metadata_slot() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        init_test_vault(root, b"s3cret");

        let unlocker = crypto::hash_passphrase(b"s3cret");
        let master_key = keyring::unlock_slots(&keyring::load_meta(root).unwrap(), &unlocker.0).unwrap();
        rotate_inner(root, &unlocker.0, &master_key.0).unwrap();

        let other_unlocker = crypto::hash_passphrase(b"other");
        let meta = keyring::load_meta(root).unwrap();
        let err = keyring::unlock_slots(&meta, &other_unlocker.0).unwrap_err();
        assert!(matches!(err, VaultError::WrongPassphrase));
    }

    /// SPEC_FULL §8 testable property 7: if rotation fails after step 5,
    /// `_vault.meta.new` must not survive and the original metadata must
    /// be untouched -- the failure must not leave a half-rotated vault.
    #[test]
    fn rotation_failure_rolls_back_and_removes_meta_new() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = init_test_vault(root, b"s3cret");

        let mut attrs = AttributeMap::new();
        attrs.insert("user".into(), Attribute::plain("alice".into()));
        crate::secret::encrypt_and_store(root, "foo/bar", &attrs, &master_key.0).unwrap();

        // Corrupt the secret so step 6 (re-encrypting every secret) fails
        // partway through the walk, after _vault.meta.new has already
        // been written in step 5.
        std::fs::write(root.join("foo").join("bar"), b"not valid json").unwrap();

        let before_meta = std::fs::read(store::meta_path(root)).unwrap();
        let unlocker = crypto::hash_passphrase(b"s3cret");

        let err = rotate_with_rollback(root, &unlocker.0, &master_key.0).unwrap_err();
        assert!(matches!(err, VaultError::CorruptSecret { .. }));

        assert!(!store::meta_new_path(root).is_file());
        let after_meta = std::fs::read(store::meta_path(root)).unwrap();
        assert_eq!(before_meta, after_meta);
    }
}
