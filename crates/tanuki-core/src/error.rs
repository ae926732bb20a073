//! Settings-specific error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Read(String),

    #[error("Failed to write settings: {0}")]
    Write(String),

    #[error("Settings file is malformed: {0}")]
    Parse(String),

    #[error("No configuration directory available")]
    NoConfigDir,
}

impl SettingsError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Read(_) => "Could not read application settings.".to_string(),
            Self::Write(_) => "Could not save application settings.".to_string(),
            Self::Parse(_) => "Settings file is malformed. Check your settings.".to_string(),
            Self::NoConfigDir => "No configuration directory available.".to_string(),
        }
    }
}
