//! The table of signed-in accounts.
//!
//! Non-secret account metadata is kept as a JSON blob inside the
//! settings file, keyed by session id; the matching credential lives in
//! the secret store under the same id. The registry owns every
//! read-modify-write of that blob and keeps a parsed copy that is
//! invalidated through settings change notifications.

use std::collections::HashMap;
use std::sync::Arc;

use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tanuki_auth::{Credential, SecretStore};
use tanuki_core::{Settings, SettingsChange};

use crate::error::SessionError;

/// Non-secret metadata for one signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,

    /// Display name reported by the server.
    pub name: String,

    /// Server the account lives on.
    pub url: String,

    #[serde(rename = "avatar", default)]
    pub avatar_url: Option<String>,
}

/// Derive the session id for an account on a server.
///
/// The id is a digest of the server URL and username, so signing in to
/// the same account twice lands on the same entry.
pub fn session_id_for(server_url: &str, username: &str) -> String {
    hex::encode(Md5::digest(format!("{server_url}{username}")))
}

struct TableCache {
    rx: broadcast::Receiver<SettingsChange>,
    table: Option<HashMap<String, Account>>,
}

/// Store of account metadata and the credentials paired with it.
pub struct SessionRegistry {
    settings: Arc<Settings>,
    secrets: Arc<dyn SecretStore>,
    cache: Mutex<TableCache>,
}

impl SessionRegistry {
    pub fn new(settings: Arc<Settings>, secrets: Arc<dyn SecretStore>) -> Self {
        let cache = TableCache {
            rx: settings.subscribe(),
            table: None,
        };

        Self {
            settings,
            secrets,
            cache: Mutex::new(cache),
        }
    }

    /// All sessions on record, keyed by session id.
    pub fn sessions(&self) -> Result<HashMap<String, Account>, SessionError> {
        let mut cache = self.cache.lock();
        self.refresh(&mut cache)?;
        Ok(cache.table.clone().unwrap_or_default())
    }

    /// Metadata for one session, if it is on record.
    pub fn account(&self, session_id: &str) -> Result<Option<Account>, SessionError> {
        let mut cache = self.cache.lock();
        self.refresh(&mut cache)?;
        Ok(cache
            .table
            .as_ref()
            .and_then(|table| table.get(session_id))
            .cloned())
    }

    /// Record `account` under its derived session id, storing
    /// `credential` alongside it.
    ///
    /// An account already on record keeps its stored credential; only
    /// the display name and avatar are brought up to date.
    pub fn create_if_absent(
        &self,
        account: &Account,
        credential: &Credential,
    ) -> Result<String, SessionError> {
        let session_id = session_id_for(&account.url, &account.username);

        let mut cache = self.cache.lock();
        self.refresh(&mut cache)?;
        let table = cache.table.get_or_insert_with(HashMap::new);

        let mut dirty = false;
        if let Some(existing) = table.get_mut(&session_id) {
            if existing.name != account.name || existing.avatar_url != account.avatar_url {
                existing.name = account.name.clone();
                existing.avatar_url = account.avatar_url.clone();
                dirty = true;
            }
        } else {
            let description = format!("{} at {}", account.username, account.url);
            self.secrets.save(&session_id, &description, credential)?;
            table.insert(session_id.clone(), account.clone());
            dirty = true;
        }

        if dirty {
            self.persist(table)?;
        }

        Ok(session_id)
    }

    /// Remove a session, its metadata, and its stored credential.
    ///
    /// Removing an id that is not on record does nothing. The startup
    /// session is cleared only when it points at the removed id.
    pub fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        let mut cache = self.cache.lock();
        self.refresh(&mut cache)?;
        let table = cache.table.get_or_insert_with(HashMap::new);

        if table.remove(session_id).is_none() {
            tracing::debug!("Ignoring removal of unknown session {}", session_id);
            return Ok(());
        }

        // A keyring hiccup must not leave the account stuck in the list.
        if let Err(e) = self.secrets.delete(session_id) {
            tracing::warn!("Failed to delete credential for {}: {}", session_id, e);
        }

        self.persist(table)?;

        if self.settings.current_session().as_deref() == Some(session_id) {
            self.settings.set_current_session(None)?;
        }

        Ok(())
    }

    fn persist(&self, table: &HashMap<String, Account>) -> Result<(), SessionError> {
        let blob =
            serde_json::to_string(table).map_err(|e| SessionError::CorruptTable(e.to_string()))?;
        self.settings.set_sessions_blob(&blob)?;
        Ok(())
    }

    /// Re-parse the blob when it changed since the last read.
    fn refresh(&self, cache: &mut TableCache) -> Result<(), SessionError> {
        let mut stale = cache.table.is_none();

        loop {
            match cache.rx.try_recv() {
                Ok(SettingsChange::Sessions) => stale = true,
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => stale = true,
                Err(_) => break,
            }
        }

        if stale {
            let blob = self.settings.sessions_blob();
            let table = serde_json::from_str(&blob)
                .map_err(|e| SessionError::CorruptTable(e.to_string()))?;
            cache.table = Some(table);
        }

        Ok(())
    }
}
