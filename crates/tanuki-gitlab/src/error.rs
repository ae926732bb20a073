//! GitLab API error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitlabError {
    #[error("Unauthorized - token may be invalid or expired")]
    Unauthorized,

    #[error("Forbidden - insufficient permissions")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GitlabError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "Authentication failed. Please sign in again.".to_string(),
            Self::Forbidden => "You don't have permission to access this resource.".to_string(),
            Self::NotFound(_) => "Not found on this server.".to_string(),
            Self::Api { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later.".to_string()
            }
            Self::Api { .. } => "The request failed. Please try again.".to_string(),
            Self::InvalidUrl(_) => "Invalid server URL format.".to_string(),
            Self::Network(_) => "Network error. Check your connection.".to_string(),
        }
    }
}
