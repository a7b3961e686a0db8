//! Wire-level cryptographic primitives.
//!
//! These constants are a compatibility contract, not a recommendation: an
//! existing vault must keep decrypting with the exact same hash, KDF,
//! iteration count and AEAD it was created with.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// Output length of SHA-512, and therefore of an "unlocker".
pub const UNLOCKER_LEN: usize = 64;
/// PBKDF2 output length used for both KEKs and per-secret data keys.
pub const DERIVED_KEY_LEN: usize = 32;
/// PBKDF2-HMAC-SHA512 iteration count. Frozen for on-disk compatibility.
pub const PBKDF2_ITERATIONS: u32 = 8192;
/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// Length, in bytes, of a freshly generated master key.
pub const MASTER_KEY_LEN: usize = 4096;

/// The SHA-512 pre-image of a passphrase. Held in the seal file or in the
/// session context; never the raw passphrase, never the master key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Unlocker(pub Vec<u8>);

/// A key derived by PBKDF2, either a key-encryption key or a per-secret
/// data key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(pub [u8; DERIVED_KEY_LEN]);

/// The vault's master key. Never written in clear; never leaves the
/// process except through the seal (which stores the unlocker, not this).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(pub Vec<u8>);

/// `unlocker <- SHA-512(passphrase)`. Part of the on-wire contract: the
/// raw passphrase is never fed directly into PBKDF2.
pub fn hash_passphrase(passphrase: &[u8]) -> Unlocker {
    let mut hasher = Sha512::new();
    hasher.update(passphrase);
    Unlocker(hasher.finalize().to_vec())
}

/// `kek/data-key <- PBKDF2-HMAC-SHA512(unlocker, salt, 8192, 32)`.
pub fn derive_key(unlocker: &[u8], salt: &[u8]) -> DerivedKey {
    let mut out = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(unlocker, salt, PBKDF2_ITERATIONS, &mut out);
    DerivedKey(out)
}

/// Fill an array of fixed size with CSPRNG output.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

pub fn random_nonce() -> [u8; NONCE_LEN] {
    random_bytes::<NONCE_LEN>()
}

/// Generate a fresh master key from the CSPRNG.
pub fn generate_master_key() -> MasterKey {
    let mut key = vec![0u8; MASTER_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    MasterKey(key)
}

/// AES-256-GCM seal. `aad` is reserved for future wire revisions; today's
/// envelope carries none.
pub fn aead_seal(key: &[u8; DERIVED_KEY_LEN], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad: b"" })
        .map_err(|e| VaultError::Crypto(e.to_string()))
}

/// AES-256-GCM open. A tag mismatch is the *expected* outcome of trying the
/// wrong passphrase against a slot, or the wrong master key against a
/// secret; callers decide whether that is fatal or "try the next slot".
pub fn aead_open(key: &[u8; DERIVED_KEY_LEN], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: b"" })
        .map_err(|_| VaultError::CorruptOrWrongKey)
}

/// Decode a hex string into a fixed-size array, failing with a crypto error
/// (the value came from a file we trust less than our own code) if the
/// length or alphabet is wrong.
pub fn hex_decode_fixed<const N: usize>(s: &str, field: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s).map_err(|e| VaultError::Crypto(format!("{field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::Crypto(format!("{field}: expected {N} bytes")))
}

pub fn hex_decode_vec(s: &str, field: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| VaultError::Crypto(format!("{field}: {e}")))
}

pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_determinism_vector() {
        let unlocker = hash_passphrase(b"Sup3rS3cre7");
        assert_eq!(
            hex_encode(&unlocker.0),
            "8780685daa543f122479d8c8510981bb8dc5b9bcd74a5fecb42ad3955ed22ee577f21bbe4facf7d7bb7074498c87c6adfc202c99be78091cb636ad34fb26ce65"
        );
    }

    #[test]
    fn round_trip() {
        let key = derive_key(b"unlocker bytes", b"some-salt");
        let nonce = random_nonce();
        let ciphertext = aead_seal(&key.0, &nonce, b"hello vault").unwrap();
        let plaintext = aead_open(&key.0, &nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello vault");
    }

    #[test]
    fn wrong_key_fails_with_corrupt_or_wrong() {
        let key_a = derive_key(b"unlocker-a", b"salt");
        let key_b = derive_key(b"unlocker-b", b"salt");
        let nonce = random_nonce();
        let ciphertext = aead_seal(&key_a.0, &nonce, b"secret").unwrap();
        let err = aead_open(&key_b.0, &nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, VaultError::CorruptOrWrongKey));
    }

    #[test]
    fn nonces_do_not_collide_across_many_draws() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(random_nonce()));
        }
    }
}
