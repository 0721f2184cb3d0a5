use std::fmt;

use thiserror::Error;

use crate::storage::{LocalStorage, StorageError};

/// Storage slot holding the provider API key.
pub const CREDENTIAL_KEY: &str = "geminiApiKey";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("API key is required")]
    Empty,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Opaque provider API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Result<Self, CredentialError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Asterisks followed by the last four characters.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

pub fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let hidden = count - 4;
    let last_four: String = value.chars().skip(hidden).collect();
    format!("{}...{}", "*".repeat(hidden.min(20)), last_four)
}

/// The single credential slot in local storage.
#[derive(Clone)]
pub struct CredentialStore {
    storage: LocalStorage,
}

impl CredentialStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// Unreadable storage counts as "no key"; the user is asked again.
    pub fn get(&self) -> Option<Credential> {
        match self.storage.get(CREDENTIAL_KEY) {
            Ok(value) => value.and_then(|v| Credential::new(v).ok()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored API key");
                None
            }
        }
    }

    pub fn set(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.storage.set(CREDENTIAL_KEY, credential.expose())?;
        tracing::info!(path = ?self.storage.path(), "saved API key");
        Ok(())
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }
}
