//! Secret engine (component D): read, write, edit, delete and rename
//! individual secrets, plus the attribute-value sentinel rules and the
//! password generator.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::crypto::{self, NONCE_LEN};
use crate::error::{Result, VaultError};
use crate::metadata::{Attribute, AttributeMap, SecretEnvelope};
use crate::store;
use crate::{prompt, vcs};

const BASIC_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SYMBOL_CHARS: &[u8] = br#"!"#$%&'()*+,-./:;<=>?@[\]^_{|}~"#;

/// Generate a password from the CSPRNG. When `symbols` is set, each
/// position independently has a 1-in-4 chance of being a symbol rather
/// than alphanumeric.
pub fn generate_password(length: usize, symbols: bool) -> String {
    let mut rng = rand::rngs::OsRng;
    let mut out = String::with_capacity(length);
    for _ in 0..length {
        let use_symbol = symbols && rng.next_u32() % 4 == 0;
        let alphabet = if use_symbol { SYMBOL_CHARS } else { BASIC_CHARS };
        let idx = (rng.next_u32() as usize) % alphabet.len();
        out.push(alphabet[idx] as char);
    }
    out
}

/// Resolve one raw CLI attribute value into its stored `Attribute`,
/// applying the sentinel rules of §4.4: empty string prompts, a leading
/// `@` reads and base64-encodes a local file, a bare `-` generates a
/// password, anything else is stored verbatim.
pub fn resolve_attribute_value(name: &str, raw: &str, generator_length: usize, symbols: bool) -> Result<Attribute> {
    if raw.is_empty() {
        let value = prompt::read_attribute_value(name)?;
        return Ok(Attribute::eyes_only(value));
    }
    if let Some(file_path) = raw.strip_prefix('@') {
        let bytes = std::fs::read(file_path)
            .map_err(|e| VaultError::UserInput(format!("could not read '{file_path}': {e}")))?;
        return Ok(Attribute::file(BASE64.encode(bytes)));
    }
    if raw == "-" {
        return Ok(Attribute::eyes_only(generate_password(generator_length, symbols)));
    }
    Ok(Attribute::plain(raw.to_string()))
}

/// Decrypt and parse the attribute map stored at `path`.
pub fn read_secret(root: &Path, path: &str, master_key: &[u8]) -> Result<AttributeMap> {
    let file_path = store::secret_file_path(root, path)?;
    let bytes = store::read_file(&file_path)?;
    let envelope: SecretEnvelope = serde_json::from_slice(&bytes)
        .map_err(|_| VaultError::CorruptSecret { path: path.to_string() })?;

    let salt = crypto::hex_decode_vec(&envelope.salt, "secret.salt")?;
    let nonce: [u8; NONCE_LEN] = crypto::hex_decode_fixed(&envelope.nonce, "secret.nonce")?;
    let ciphertext = crypto::hex_decode_vec(&envelope.data, "secret.data")?;

    let data_key = crypto::derive_key(master_key, &salt);
    let plaintext = crypto::aead_open(&data_key.0, &nonce, &ciphertext)?;

    serde_json::from_slice(&plaintext).map_err(|_| VaultError::CorruptSecret { path: path.to_string() })
}

/// Encrypt `attrs` under a fresh per-secret salt and nonce and write it to
/// `path`, mode 0600 under a 0700 parent hierarchy.
pub fn encrypt_and_store(root: &Path, path: &str, attrs: &AttributeMap, master_key: &[u8]) -> Result<()> {
    let file_path = store::secret_file_path(root, path)?;

    let salt = uuid::Uuid::new_v4().to_string();
    let nonce = crypto::random_nonce();
    let data_key = crypto::derive_key(master_key, salt.as_bytes());

    let plaintext = serde_json::to_vec(attrs)?;
    let ciphertext = crypto::aead_seal(&data_key.0, &nonce, &plaintext)?;

    let envelope = SecretEnvelope {
        salt: crypto::hex_encode(salt.as_bytes()),
        nonce: crypto::hex_encode(&nonce),
        data: crypto::hex_encode(&ciphertext),
    };
    let json = serde_json::to_vec(&envelope)?;
    store::write_file_secure(&file_path, &json, store::MODE_SECRET)
}

/// `add`: build a fresh attribute map from raw CLI values and write it.
/// Fails if the secret already exists.
pub fn add_secret(
    root: &Path,
    path: &str,
    raw_attrs: &[(String, String)],
    master_key: &[u8],
    generator_length: usize,
    symbols: bool,
) -> Result<()> {
    let file_path = store::secret_file_path(root, path)?;
    if file_path.is_file() {
        return Err(VaultError::SecretExists(path.to_string()));
    }

    let mut attrs = AttributeMap::new();
    for (name, raw) in raw_attrs {
        attrs.insert(name.clone(), resolve_attribute_value(name, raw, generator_length, symbols)?);
    }

    encrypt_and_store(root, path, &attrs, master_key)?;
    vcs::commit_best_effort(root, path, vcs::Op::Add, None);
    Ok(())
}

/// `edit`: merge new attribute values into the existing map and remove
/// deleted ones. The sentinel rules (empty/`@`/`-`) apply only to the
/// names being set in this call — an existing attribute's stored value is
/// never re-interpreted just because it happens to start with `@` or be
/// empty (see SPEC_FULL §4.4 / §9 item 3).
pub fn edit_secret(
    root: &Path,
    path: &str,
    new_attrs: &[(String, String)],
    deleted_attrs: &[String],
    master_key: &[u8],
    generator_length: usize,
    symbols: bool,
) -> Result<()> {
    let mut attrs = read_secret(root, path, master_key)?;

    for (name, raw) in new_attrs {
        let resolved = resolve_attribute_value(name, raw, generator_length, symbols)?;
        attrs.insert(name.clone(), resolved);
    }

    for name in deleted_attrs {
        attrs.remove(name);
    }

    encrypt_and_store(root, path, &attrs, master_key)?;
    vcs::commit_best_effort(root, path, vcs::Op::Edit, None);
    Ok(())
}

/// `delete`: remove the secret file and prune now-empty parent
/// directories.
pub fn delete_secret(root: &Path, path: &str) -> Result<()> {
    let file_path = store::secret_file_path(root, path)?;
    if !file_path.is_file() {
        return Err(VaultError::NoSecret(path.to_string()));
    }
    store::remove_and_prune(root, &file_path)?;
    vcs::commit_best_effort(root, path, vcs::Op::Delete, None);
    Ok(())
}

/// `rename`: move a secret to a new path, creating destination parent
/// directories and pruning emptied source ancestors.
pub fn rename_secret(root: &Path, src: &str, dst: &str) -> Result<()> {
    let src_path = store::secret_file_path(root, src)?;
    let dst_path = store::secret_file_path(root, dst)?;

    if !src_path.is_file() {
        return Err(VaultError::NoSecret(src.to_string()));
    }
    if dst_path.is_file() {
        return Err(VaultError::SecretExists(dst.to_string()));
    }

    store::ensure_parent_dirs(&dst_path)?;
    std::fs::rename(&src_path, &dst_path)?;
    store::prune_empty_ancestors(root, &src_path);

    vcs::commit_rename_best_effort(root, src, dst);
    Ok(())
}

/// Write every `file` attribute's decoded bytes under `vault-<slug>/`,
/// mode 0400 per file, filtered to `only` when non-empty.
pub fn write_file_attributes(path: &str, attrs: &AttributeMap, only: &[String]) -> Result<Vec<std::path::PathBuf>> {
    let selected: Vec<(&String, &Attribute)> = attrs
        .iter()
        .filter(|(name, attr)| attr.file && (only.is_empty() || only.contains(name)))
        .collect();

    if selected.is_empty() {
        return Err(VaultError::UserInput("no file attribute matching what you requested".into()));
    }

    let dir_name = format!("vault-{}", path.replace('/', "-"));
    let dir = std::path::PathBuf::from(&dir_name);
    std::fs::create_dir(&dir).map_err(|e| VaultError::UserInput(format!("could not create directory '{dir_name}': {e}")))?;

    let mut written = Vec::new();
    for (name, attr) in selected {
        let bytes = BASE64
            .decode(&attr.value)
            .map_err(|e| VaultError::CorruptSecret { path: format!("{path}:{name} ({e})") })?;
        let file_path = dir.join(name);
        store::write_file_secure(&file_path, &bytes, 0o400)?;
        written.push(file_path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_value_is_not_eyes_only() {
        let attr = resolve_attribute_value("user", "alice", 16, false).unwrap();
        assert_eq!(attr.value, "alice");
        assert!(!attr.eyes_only);
        assert!(!attr.file);
    }

    #[test]
    fn dash_generates_password_of_requested_length() {
        let attr = resolve_attribute_value("password", "-", 8, false).unwrap();
        assert_eq!(attr.value.len(), 8);
        assert!(attr.eyes_only);
        assert!(attr.value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn at_prefix_reads_and_base64_encodes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cert.pem");
        std::fs::write(&file, b"hello cert bytes").unwrap();

        let attr = resolve_attribute_value("data", &format!("@{}", file.display()), 16, false).unwrap();
        assert!(attr.file);
        assert_eq!(BASE64.decode(&attr.value).unwrap(), b"hello cert bytes");
    }

    #[test]
    fn secret_round_trips_through_encrypt_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = crypto::generate_master_key();

        let mut attrs = AttributeMap::new();
        attrs.insert("username".into(), Attribute::plain("alice".into()));
        attrs.insert("password".into(), Attribute::eyes_only("hunter2".into()));

        encrypt_and_store(root, "foo/bar", &attrs, &master_key.0).unwrap();
        let back = read_secret(root, "foo/bar", &master_key.0).unwrap();

        assert_eq!(back["username"].value, "alice");
        assert_eq!(back["password"].value, "hunter2");
        assert!(back["password"].eyes_only);
    }

    #[test]
    fn wrong_master_key_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = crypto::generate_master_key();
        let other_key = crypto::generate_master_key();

        let mut attrs = AttributeMap::new();
        attrs.insert("k".into(), Attribute::plain("v".into()));
        encrypt_and_store(root, "foo", &attrs, &master_key.0).unwrap();

        let err = read_secret(root, "foo", &other_key.0).unwrap_err();
        assert!(matches!(err, VaultError::CorruptOrWrongKey));
    }

    #[test]
    fn edit_does_not_reinterpret_untouched_at_values() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = crypto::generate_master_key();

        let mut attrs = AttributeMap::new();
        attrs.insert("note".into(), Attribute::plain("@handle on twitter".into()));
        encrypt_and_store(root, "s", &attrs, &master_key.0).unwrap();

        edit_secret(root, "s", &[("other".into(), "value".into())], &[], &master_key.0, 16, false).unwrap();

        let back = read_secret(root, "s", &master_key.0).unwrap();
        assert_eq!(back["note"].value, "@handle on twitter");
        assert_eq!(back["other"].value, "value");
    }

    #[test]
    fn add_refuses_to_overwrite_existing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = crypto::generate_master_key();

        add_secret(root, "foo/bar", &[("a".into(), "b".into())], &master_key.0, 16, false).unwrap();
        let err = add_secret(root, "foo/bar", &[("a".into(), "c".into())], &master_key.0, 16, false).unwrap_err();
        assert!(matches!(err, VaultError::SecretExists(_)));
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let master_key = crypto::generate_master_key();

        add_secret(root, "a/b/c", &[("k".into(), "v".into())], &master_key.0, 16, false).unwrap();
        delete_secret(root, "a/b/c").unwrap();

        assert!(!root.join("a").exists());
    }
}
