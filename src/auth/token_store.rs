use keyring::{Entry, Error as KeyringError};

use crate::error::{Result, TrackerError};

const SERVICE: &str = "rs_job_tracker";

fn entry(username: &str) -> Result<Entry> {
    Entry::new(SERVICE, username).map_err(|e| TrackerError::Keychain(e.to_string()))
}

/// Save the API bearer token into the OS keyring for the given user
pub fn save_bearer_token(username: &str, token: &str) -> Result<()> {
    entry(username)?
        .set_password(token)
        .map_err(|e| TrackerError::Keychain(e.to_string()))
}

/// Load the API bearer token from the keyring for the given user
pub fn load_bearer_token(username: &str) -> Result<Option<String>> {
    match entry(username)?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(TrackerError::Keychain(e.to_string())),
    }
}

/// Remove the bearer token; a missing entry is not an error
pub fn clear_bearer_token(username: &str) -> Result<()> {
    match entry(username)?.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(e) => Err(TrackerError::Keychain(e.to_string())),
    }
}
