//! Secure storage for unlock credentials.
//!
//! The passcode is stored as a SHA-256 hex digest, never in clear. The paired
//! NFC tag id is stored as-is.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CredentialError, Result};

/// Keyring service name.
pub const SERVICE: &str = "tarkiz";

pub const PASSCODE_KEY: &str = "unlock_passcode_sha256";
pub const NFC_TAG_KEY: &str = "paired_nfc_tag";

/// Every key this crate writes; cleared together on logout.
pub const KNOWN_KEYS: [&str; 2] = [PASSCODE_KEY, NFC_TAG_KEY];

const MIN_PASSCODE_LEN: usize = 4;

pub trait CredentialStore: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    /// `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CredentialError>;

    fn require(&self, key: &str) -> Result<String, CredentialError> {
        self.get(key)?
            .ok_or_else(|| CredentialError::NotFound(key.to_string()))
    }
}

/// OS keyring (Keychain, Credential Manager, Secret Service).
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE)
    }
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, key).map_err(|e| CredentialError::ReadFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

impl CredentialStore for KeyringStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| CredentialError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::ReadFailed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// In-process store for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.items().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        self.items().remove(key);
        Ok(())
    }
}

pub fn hash_passcode(passcode: &str) -> String {
    hex::encode(Sha256::digest(passcode.as_bytes()))
}

/// Store a new unlock passcode (digits only, at least four).
pub fn set_passcode<C: CredentialStore + ?Sized>(store: &C, passcode: &str) -> Result<()> {
    let passcode = passcode.trim();
    if passcode.len() < MIN_PASSCODE_LEN || !passcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid(
            "passcode",
            format!("must be at least {MIN_PASSCODE_LEN} digits"),
        ));
    }
    store.save(PASSCODE_KEY, &hash_passcode(passcode))?;
    tracing::info!("unlock passcode updated");
    Ok(())
}

pub fn pair_tag<C: CredentialStore + ?Sized>(store: &C, tag_id: &str) -> Result<()> {
    let tag_id = tag_id.trim();
    if tag_id.is_empty() {
        return Err(CoreError::invalid("tag_id", "must not be empty"));
    }
    store.save(NFC_TAG_KEY, tag_id)?;
    tracing::info!("NFC tag paired");
    Ok(())
}

/// Remove every stored credential.
pub fn clear_all<C: CredentialStore + ?Sized>(store: &C) -> Result<()> {
    for key in KNOWN_KEYS {
        store.delete(key)?;
    }
    Ok(())
}
