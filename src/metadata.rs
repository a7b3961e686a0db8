//! On-disk JSON shapes: vault metadata, key slots, and the secret envelope.
//!
//! These types are the wire format (§6 of the design doc); changing a
//! field name or its `serde` attributes breaks every existing vault.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RESERVED_META: &str = "_vault.meta";
pub const RESERVED_META_NEW: &str = "_vault.meta.new";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySlot {
    pub comment: String,
    pub created_on: i64,
    pub salt: String,
    pub nonce: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultMeta {
    pub uuid: String,
    pub master_keys: Vec<KeySlot>,
}

impl VaultMeta {
    pub fn new(uuid: String, first_slot: KeySlot) -> Self {
        VaultMeta {
            uuid,
            master_keys: vec![first_slot],
        }
    }
}

/// The on-disk envelope for one secret file: a per-secret salt and nonce,
/// and the AEAD ciphertext of the serialized attribute map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEnvelope {
    pub salt: String,
    pub nonce: String,
    pub data: String,
}

/// One attribute's metadata, as stored (and read back) from a secret's
/// decrypted JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub value: String,
    #[serde(rename = "eyesonly")]
    pub eyes_only: bool,
    #[serde(rename = "file")]
    pub file: bool,
}

impl Attribute {
    pub fn plain(value: String) -> Self {
        Attribute { value, eyes_only: false, file: false }
    }

    pub fn eyes_only(value: String) -> Self {
        Attribute { value, eyes_only: true, file: false }
    }

    pub fn file(value: String) -> Self {
        Attribute { value, eyes_only: false, file: true }
    }
}

/// An ordered-by-name map of attribute name to attribute record. `BTreeMap`
/// gives deterministic iteration, which keeps `list`/`show` output and
/// tests stable.
pub type AttributeMap = BTreeMap<String, Attribute>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_json_uses_eyesonly_field_name() {
        let attr = Attribute::eyes_only("s3cr3t".into());
        let json = serde_json::to_string(&attr).unwrap();
        assert!(json.contains("\"eyesonly\":true"));
        assert!(json.contains("\"file\":false"));
    }

    #[test]
    fn key_slot_round_trips_through_json() {
        let slot = KeySlot {
            comment: "primary".into(),
            created_on: 1_700_000_000,
            salt: "aa".into(),
            nonce: "bb".into(),
            data: "cc".into(),
        };
        let json = serde_json::to_string(&slot).unwrap();
        let back: KeySlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.comment, "primary");
        assert_eq!(back.salt, "aa");
    }
}
