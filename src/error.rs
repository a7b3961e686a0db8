use thiserror::Error;

/// Taxonomy of everything that can go wrong operating on a vault.
///
/// `main.rs` is the only place that turns one of these into an exit code
/// and a single line on stderr; every other module propagates with `?`.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{0}")]
    UserInput(String),

    #[error("{0}")]
    Interactive(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("could not find matching passphrase")]
    WrongPassphrase,

    #[error("secret is corrupt or was encrypted with a different master key")]
    CorruptOrWrongKey,

    #[error("{path}: secret file is corrupt")]
    CorruptSecret { path: String },

    #[error("vault does not exist, consider running init")]
    NoVault,

    #[error("secret '{0}' does not exist")]
    NoSecret(String),

    #[error("secret '{0}' already exists")]
    SecretExists(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("could not parse vault metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external command failed: {0}")]
    Vcs(String),

    #[error("vault is locked by another process (remove '{0}' if you are certain no other instance is running)")]
    Locked(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error(
        "vault metadata is in an inconsistent state (found both _vault.meta and \
         _vault.meta.new) — a previous 'key rotate' was interrupted; resolve manually \
         using the git working copy before retrying"
    )]
    InconsistentRotation,

    #[error("internal invariant violated: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
