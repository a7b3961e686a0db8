//! Interactive passphrase prompting. Deliberately thin: the hard part of
//! this crate is the crypto around the passphrase, not reading it.

use crate::error::{Result, VaultError};

pub fn read_passphrase(prompt: &str, confirm: bool) -> Result<String> {
    let passphrase = rpassword::prompt_password(format!("{prompt}: "))
        .map_err(|e| VaultError::Interactive(format!("could not read passphrase: {e}")))?;

    if passphrase.trim().is_empty() {
        return Err(VaultError::Interactive("could not use empty passphrase".into()));
    }

    if confirm {
        let confirmation = rpassword::prompt_password("Confirm: ")
            .map_err(|e| VaultError::Interactive(format!("could not read confirmation: {e}")))?;
        if passphrase != confirmation {
            return Err(VaultError::Interactive("passphrases do not match".into()));
        }
    }

    Ok(passphrase)
}

/// Prompt for a single attribute value (no confirmation, no echo) —
/// used by the secret engine when an attribute value is left empty.
pub fn read_attribute_value(attr_name: &str) -> Result<String> {
    rpassword::prompt_password(format!("Value for '{attr_name}': "))
        .map_err(|e| VaultError::Interactive(format!("could not read value: {e}")))
}
