//! Clipboard integration (component, out of core scope): a thin wrapper
//! so `show --clip` has somewhere to put a secret. Failures here never
//! block any other command.

use crate::error::{Result, VaultError};

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().map_err(|e| VaultError::Clipboard(e.to_string()))?;
    clipboard.set_text(text.to_string()).map_err(|e| VaultError::Clipboard(e.to_string()))
}
