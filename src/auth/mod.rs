//! Credential gate: every network call asks it for the bearer token first.

pub mod token_store;

use std::sync::Mutex;

use crate::error::{Result, TrackerError};

/// Where the bearer token lives.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<String>>;
    fn clear(&self) -> Result<()>;
}

/// Keyring-backed store, keyed by the configured user name.
pub struct KeyringCredentials {
    pub user: String,
}

impl KeyringCredentials {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl CredentialStore for KeyringCredentials {
    fn load(&self) -> Result<Option<String>> {
        token_store::load_bearer_token(&self.user)
    }

    fn clear(&self) -> Result<()> {
        token_store::clear_bearer_token(&self.user)
    }
}

/// In-process store, used when the token is handed over directly.
#[derive(Default)]
pub struct MemoryCredentials {
    token: Mutex<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().map(|t| t.clone()).unwrap_or(None))
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut t) = self.token.lock() {
            *t = None;
        }
        Ok(())
    }
}

pub struct CredentialGate {
    store: Box<dyn CredentialStore>,
}

impl CredentialGate {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Returns the bearer token or fails fast with `AuthRequired`.
    pub fn require(&self) -> Result<String> {
        match self.store.load()? {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(TrackerError::AuthRequired),
        }
    }

    /// Passes a call result through; an expired token is dropped so the next
    /// operation asks for sign-in instead of retrying with it.
    pub fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(TrackerError::AuthExpired) = &result {
            log::info!("bearer token rejected by server; clearing it");
            if let Err(e) = self.store.clear() {
                log::warn!("could not clear expired token: {e}");
            }
        }
        result
    }
}
