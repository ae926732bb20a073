//! Authentication error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("OAuth flow failed: {0}")]
    OAuthFailed(String),

    #[error("No sign-in provider configured for {0}")]
    UnknownProvider(String),

    #[error("Secure storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => {
                "Your credentials were rejected. Please sign in again.".to_string()
            }
            Self::TokenExchangeFailed(_) => "Sign-in failed. Please try again.".to_string(),
            Self::OAuthFailed(_) => "Sign-in failed. Please try again.".to_string(),
            Self::UnknownProvider(_) => {
                "This server has no configured sign-in provider.".to_string()
            }
            Self::Storage(_) => "Could not access stored credentials.".to_string(),
        }
    }
}
