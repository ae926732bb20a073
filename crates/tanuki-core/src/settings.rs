//! Persistent application settings.
//!
//! Settings live in a single TOML file and hold two values the session
//! layer cares about: the serialized session table and the id of the
//! session to restore on startup. Writers broadcast a [`SettingsChange`]
//! so caches keyed on these values can invalidate themselves.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::SettingsError;

/// Which settings value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    Sessions,
    CurrentSession,
}

fn default_sessions_blob() -> String {
    "{}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsState {
    /// JSON-encoded map of session id to account metadata.
    #[serde(default = "default_sessions_blob")]
    sessions: String,

    /// Session id to restore on startup, empty when signed out.
    #[serde(rename = "current-session", default)]
    current_session: String,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            sessions: default_sessions_blob(),
            current_session: String::new(),
        }
    }
}

/// Handle to the settings file.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    state: Mutex<SettingsState>,
    changes: broadcast::Sender<SettingsChange>,
}

impl Settings {
    /// Load settings from `path`, creating the file with defaults if it
    /// doesn't exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let fresh = !path.exists();

        let state = if fresh {
            SettingsState::default()
        } else {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| SettingsError::Read(e.to_string()))?;
            toml::from_str(&contents).map_err(|e| SettingsError::Parse(e.to_string()))?
        };

        let (changes, _) = broadcast::channel(16);
        let settings = Self {
            path,
            state: Mutex::new(state),
            changes,
        };

        if fresh {
            let state = settings.state.lock();
            settings.persist(&state)?;
        }

        Ok(settings)
    }

    /// Open the settings file at its standard location.
    pub fn open_default() -> Result<Self, SettingsError> {
        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::NoConfigDir)?
            .join("tanuki");

        Self::load(config_dir.join("settings.toml"))
    }

    /// The serialized session table.
    pub fn sessions_blob(&self) -> String {
        self.state.lock().sessions.clone()
    }

    /// Replace the serialized session table and persist.
    pub fn set_sessions_blob(&self, blob: &str) -> Result<(), SettingsError> {
        let mut state = self.state.lock();
        state.sessions = blob.to_string();
        self.persist(&state)?;
        drop(state);

        let _ = self.changes.send(SettingsChange::Sessions);
        Ok(())
    }

    /// Id of the session to restore on startup, if any.
    pub fn current_session(&self) -> Option<String> {
        let state = self.state.lock();
        if state.current_session.is_empty() {
            None
        } else {
            Some(state.current_session.clone())
        }
    }

    /// Set or clear the session to restore on startup.
    pub fn set_current_session(&self, session_id: Option<&str>) -> Result<(), SettingsError> {
        let mut state = self.state.lock();
        state.current_session = session_id.unwrap_or_default().to_string();
        self.persist(&state)?;
        drop(state);

        let _ = self.changes.send(SettingsChange::CurrentSession);
        Ok(())
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }

    /// Location of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &SettingsState) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Write(e.to_string()))?;
        }

        let contents =
            toml::to_string_pretty(state).map_err(|e| SettingsError::Write(e.to_string()))?;

        std::fs::write(&self.path, contents).map_err(|e| SettingsError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_fresh_settings_have_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.toml")).unwrap();

        assert_eq!(settings.sessions_blob(), "{}");
        assert_eq!(settings.current_session(), None);
        assert!(settings.path().exists());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let settings = Settings::load(&path).unwrap();
        settings
            .set_sessions_blob(r#"{"abc":{"username":"dev"}}"#)
            .unwrap();
        settings.set_current_session(Some("abc")).unwrap();
        drop(settings);

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.sessions_blob(), r#"{"abc":{"username":"dev"}}"#);
        assert_eq!(reloaded.current_session(), Some("abc".to_string()));
    }

    #[test]
    fn test_empty_current_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.toml")).unwrap();

        settings.set_current_session(Some("abc")).unwrap();
        assert_eq!(settings.current_session(), Some("abc".to_string()));

        settings.set_current_session(None).unwrap();
        assert_eq!(settings.current_session(), None);
    }

    #[test]
    fn test_writes_notify_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.toml")).unwrap();

        let mut rx = settings.subscribe();
        settings.set_sessions_blob("{}").unwrap();
        settings.set_current_session(None).unwrap();

        assert_eq!(rx.try_recv(), Ok(SettingsChange::Sessions));
        assert_eq!(rx.try_recv(), Ok(SettingsChange::CurrentSession));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "sessions = [not toml").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
