//! Key schedule & slot store (component C): loading vault metadata,
//! running the multi-slot unlock search, and the session context that
//! carries the unlocked master key through a single command invocation.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::{self, DerivedKey, MasterKey, Unlocker, DERIVED_KEY_LEN, NONCE_LEN};
use crate::error::{Result, VaultError};
use crate::metadata::{KeySlot, VaultMeta};
use crate::{prompt, seal, store};

/// Constructed once per command invocation; carries the unlocker and the
/// master key for the remainder of the run. Replaces the prior art's
/// module-level mutable cache with an explicit value threaded through
/// dispatch.
pub struct UnlockContext {
    pub unlocker: Unlocker,
    pub master_key: MasterKey,
}

pub fn load_meta(root: &Path) -> Result<VaultMeta> {
    store::assert_vault_exists(root)?;
    let bytes = store::read_file(&store::meta_path(root))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn write_meta(root: &Path, meta: &VaultMeta) -> Result<()> {
    let json = serde_json::to_vec(meta)?;
    store::write_file_atomic(&store::meta_path(root), &json, store::MODE_META)
}

/// Derive a KEK from `unlocker` and `slot.salt`, then attempt to open
/// `slot.data`. A GCM failure here is *expected* for every slot that
/// wasn't wrapped with this unlocker — it means "try the next slot", not
/// "abort". Modeled as `Result` so a caller can `.find_map` over slots
/// without a slot-level failure ever becoming the top-level error.
fn try_slot(slot: &KeySlot, unlocker: &[u8]) -> Result<Vec<u8>> {
    let salt = crypto::hex_decode_vec(&slot.salt, "slot.salt")?;
    let nonce: [u8; NONCE_LEN] = crypto::hex_decode_fixed(&slot.nonce, "slot.nonce")?;
    let data = crypto::hex_decode_vec(&slot.data, "slot.data")?;
    let kek = crypto::derive_key(unlocker, &salt);
    crypto::aead_open(&kek.0, &nonce, &data)
}

/// The core of §4.3: try every slot in order, returning the first master
/// key that decrypts. Exhausting every slot without success is the only
/// way this fails, with `VaultError::WrongPassphrase` — never a
/// slot-level `CorruptOrWrongKey`.
pub fn unlock_slots(meta: &VaultMeta, unlocker: &[u8]) -> Result<MasterKey> {
    meta.master_keys
        .iter()
        .find_map(|slot| try_slot(slot, unlocker).ok())
        .map(MasterKey)
        .ok_or(VaultError::WrongPassphrase)
}

/// §4.3 step 1: use the seal if present and readable, otherwise prompt
/// and hash the passphrase.
fn obtain_unlocker(vault_uuid: &str) -> Result<Unlocker> {
    let seal_path = seal::seal_path(vault_uuid);
    if seal::is_unsealed(&seal_path) {
        return Ok(Unlocker(seal::read_seal(&seal_path)?));
    }
    let passphrase = prompt::read_passphrase("Enter passphrase", false)?;
    Ok(crypto::hash_passphrase(passphrase.as_bytes()))
}

/// Full unlock algorithm: seal-or-prompt, then the slot search. This is
/// what every secret-engine operation calls to get a working master key.
pub fn unlock(root: &Path) -> Result<UnlockContext> {
    let meta = load_meta(root)?;
    let unlocker = obtain_unlocker(&meta.uuid)?;
    let master_key = unlock_slots(&meta, &unlocker.0)?;
    Ok(UnlockContext { unlocker, master_key })
}

/// Used when the caller must have the user type their current passphrase
/// even if the vault is already unsealed — `key rotate` and `key add`
/// both need an unlocker they're sure is still live, not just a cached
/// master key.
pub fn unlock_by_prompt(root: &Path) -> Result<UnlockContext> {
    let meta = load_meta(root)?;
    let passphrase = prompt::read_passphrase("Enter passphrase", false)?;
    let unlocker = crypto::hash_passphrase(passphrase.as_bytes());
    let master_key = unlock_slots(&meta, &unlocker.0)?;
    Ok(UnlockContext { unlocker, master_key })
}

/// Wrap `master_key` under a KEK derived from `unlocker` with a fresh salt
/// and nonce, producing a new key slot.
pub fn wrap_master_key(unlocker: &[u8], master_key: &[u8], comment: &str) -> Result<KeySlot> {
    let salt = uuid::Uuid::new_v4().to_string();
    let kek: DerivedKey = crypto::derive_key(unlocker, salt.as_bytes());
    let nonce = crypto::random_nonce();
    let ciphertext = crypto::aead_seal(&kek.0, &nonce, master_key)?;

    Ok(KeySlot {
        comment: comment.to_string(),
        created_on: unix_now(),
        salt: crypto::hex_encode(salt.as_bytes()),
        nonce: crypto::hex_encode(&nonce),
        data: crypto::hex_encode(&ciphertext),
    })
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[allow(dead_code)]
pub const _ASSERT_KEY_LEN: usize = DERIVED_KEY_LEN;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VaultMeta;

    fn build_vault_with_slot(passphrase: &str) -> VaultMeta {
        let unlocker = crypto::hash_passphrase(passphrase.as_bytes());
        let master_key = crypto::generate_master_key();
        let slot = wrap_master_key(&unlocker.0, &master_key.0, "primary").unwrap();
        VaultMeta::new("test-uuid".into(), slot)
    }

    #[test]
    fn unlock_succeeds_with_correct_passphrase() {
        let meta = build_vault_with_slot("s3cret");
        let unlocker = crypto::hash_passphrase(b"s3cret");
        assert!(unlock_slots(&meta, &unlocker.0).is_ok());
    }

    #[test]
    fn unlock_fails_with_wrong_passphrase() {
        let meta = build_vault_with_slot("s3cret");
        let unlocker = crypto::hash_passphrase(b"wrong");
        let err = unlock_slots(&meta, &unlocker.0).unwrap_err();
        assert!(matches!(err, VaultError::WrongPassphrase));
    }

    #[test]
    fn slot_independence_adding_a_slot_preserves_master_key() {
        let mut meta = build_vault_with_slot("first");
        let unlocker1 = crypto::hash_passphrase(b"first");
        let master_key = unlock_slots(&meta, &unlocker1.0).unwrap();

        let unlocker2 = crypto::hash_passphrase(b"second");
        let slot2 = wrap_master_key(&unlocker2.0, &master_key.0, "backup").unwrap();
        meta.master_keys.push(slot2);

        let still_first = unlock_slots(&meta, &unlocker1.0).unwrap();
        let via_second = unlock_slots(&meta, &unlocker2.0).unwrap();
        assert_eq!(still_first.0, master_key.0);
        assert_eq!(via_second.0, master_key.0);
    }

    #[test]
    fn multiple_slots_try_in_order_until_one_matches() {
        let mut meta = build_vault_with_slot("a");
        let master_key = {
            let u = crypto::hash_passphrase(b"a");
            unlock_slots(&meta, &u.0).unwrap()
        };
        let unlocker_b = crypto::hash_passphrase(b"b");
        meta.master_keys.push(wrap_master_key(&unlocker_b.0, &master_key.0, "b").unwrap());

        let via_b = unlock_slots(&meta, &unlocker_b.0).unwrap();
        assert_eq!(via_b.0, master_key.0);
    }
}
