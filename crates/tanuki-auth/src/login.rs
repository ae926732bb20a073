//! Login strategies.

use crate::providers::OAuthProvider;
use crate::secrets::Credential;

/// Token pair held by a completed OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A way to sign in to a GitLab server.
#[derive(Debug, Clone)]
pub enum Login {
    /// Personal access token entered by hand.
    PersonalAccessToken { url: String, token: String },

    /// Completed OAuth sign-in against a configured provider.
    OAuth {
        provider: OAuthProvider,
        tokens: TokenPair,
    },
}

impl Login {
    /// Server this login authenticates against.
    pub fn server_url(&self) -> &str {
        match self {
            Self::PersonalAccessToken { url, .. } => url,
            Self::OAuth { provider, .. } => &provider.base_url,
        }
    }

    /// Secret blob to persist for this login.
    pub fn credential(&self) -> Credential {
        match self {
            Self::PersonalAccessToken { token, .. } => Credential::Pat {
                access_token: token.clone(),
            },
            Self::OAuth { tokens, .. } => Credential::OAuth {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
            },
        }
    }
}
