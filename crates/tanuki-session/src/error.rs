//! Error handling for the session layer.

use thiserror::Error;

use tanuki_auth::AuthError;
use tanuki_core::SettingsError;
use tanuki_gitlab::GitlabError;

/// Failures a login attempt or session operation can report.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("GitLab API error: {0}")]
    Gitlab(#[from] GitlabError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("No stored credential for session {0}")]
    MissingCredential(String),

    #[error("Session table is corrupted: {0}")]
    CorruptTable(String),
}

impl SessionError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(e) => e.user_message(),
            Self::Gitlab(e) => e.user_message(),
            Self::Settings(e) => e.user_message(),
            Self::UnknownSession(_) => "This account is no longer on record.".to_string(),
            Self::MissingCredential(_) => {
                "No stored credentials for this account. Please sign in again.".to_string()
            }
            Self::CorruptTable(_) => {
                "The account list could not be read. You may need to sign in again.".to_string()
            }
        }
    }
}
