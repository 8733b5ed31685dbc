use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "skadi-cli";

/// Remembered sign-in passwords, kept in the OS keychain
pub struct PasswordVault;

impl PasswordVault {
    fn entry(username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, username).context("Failed to create keyring entry")
    }

    /// Remember the password for `username`
    pub fn remember(username: &str, password: &str) -> Result<()> {
        Self::entry(username)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Remembered password, if any
    pub fn recall(username: &str) -> Option<String> {
        Self::entry(username).ok()?.get_password().ok()
    }

    pub fn forget(username: &str) -> Result<()> {
        match Self::entry(username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
