//! Credential blobs and their storage in the OS keyring.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use keyring::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Keyring service name all credential entries are filed under.
const SERVICE_NAME: &str = "tanuki";

/// Secret material for one session, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    /// Personal access token entered by hand.
    Pat { access_token: String },

    /// OAuth token pair obtained from a provider.
    OAuth {
        access_token: String,
        refresh_token: String,
    },
}

impl Credential {
    /// Token to authenticate API requests with.
    pub fn access_token(&self) -> &str {
        match self {
            Self::Pat { access_token } | Self::OAuth { access_token, .. } => access_token,
        }
    }
}

/// Backend holding one credential blob per session id.
///
/// A missing entry is `Ok(None)`, not an error; only backend failures
/// are errors.
pub trait SecretStore: Send + Sync {
    /// Persist `credential` under `session_id`. `description` is a
    /// human-readable label for keyring browsers.
    fn save(
        &self,
        session_id: &str,
        description: &str,
        credential: &Credential,
    ) -> Result<(), AuthError>;

    /// Look up the credential stored for `session_id`.
    fn lookup(&self, session_id: &str) -> Result<Option<Credential>, AuthError>;

    /// Remove the credential stored for `session_id`, if any.
    fn delete(&self, session_id: &str) -> Result<(), AuthError>;
}

/// Credential store backed by the OS keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, session_id: &str) -> Result<Entry, AuthError> {
        Entry::new(&self.service, session_id).map_err(|e| AuthError::Storage(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn save(
        &self,
        session_id: &str,
        description: &str,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        let blob =
            serde_json::to_string(credential).map_err(|e| AuthError::Storage(e.to_string()))?;

        self.entry(session_id)?
            .set_password(&blob)
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        tracing::info!("Stored credential for {}", description);
        Ok(())
    }

    fn lookup(&self, session_id: &str) -> Result<Option<Credential>, AuthError> {
        match self.entry(session_id)?.get_password() {
            Ok(blob) => {
                let credential =
                    serde_json::from_str(&blob).map_err(|e| AuthError::Storage(e.to_string()))?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }

    fn delete(&self, session_id: &str) -> Result<(), AuthError> {
        match self.entry(session_id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }
}

/// In-process credential store for tests and for platforms without a
/// secret service.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Credential>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of save calls observed so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SecretStore for MemoryStore {
    fn save(
        &self,
        session_id: &str,
        _description: &str,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        self.entries
            .lock()
            .insert(session_id.to_string(), credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn lookup(&self, session_id: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.entries.lock().get(session_id).cloned())
    }

    fn delete(&self, session_id: &str) -> Result<(), AuthError> {
        self.entries.lock().remove(session_id);
        Ok(())
    }
}
