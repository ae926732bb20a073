//! OAuth authorization-code flow with PKCE.

use base64::{engine::general_purpose, Engine};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::login::{Login, TokenPair};
use crate::providers::{OAuthProvider, REDIRECT_URI};

/// Scope requested on every sign-in.
const OAUTH_SCOPE: &str = "api";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// One in-flight authorization-code flow, alive from the moment the
/// browser opens until its redirect is consumed.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    provider: OAuthProvider,
    state_token: String,
    pkce_verifier: String,
}

impl OAuthFlow {
    /// Start a flow against `provider`.
    /// Returns the flow and the authorization URL to open in the browser.
    pub fn begin(provider: OAuthProvider) -> (Self, String) {
        let state_token = uuid::Uuid::new_v4().to_string();
        let pkce_verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );

        let url = format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}&code_challenge={}&code_challenge_method=S256",
            provider.base_url,
            urlencoding::encode(&provider.client_id),
            urlencoding::encode(REDIRECT_URI),
            urlencoding::encode(&state_token),
            urlencoding::encode(OAUTH_SCOPE),
            urlencoding::encode(&pkce_challenge(&pkce_verifier)),
        );

        (
            Self {
                provider,
                state_token,
                pkce_verifier,
            },
            url,
        )
    }

    /// Provider this flow runs against.
    pub fn provider(&self) -> &OAuthProvider {
        &self.provider
    }

    /// State token identifying this flow on the redirect.
    pub fn state_token(&self) -> &str {
        &self.state_token
    }

    /// Exchange the authorization code for tokens, completing the flow.
    #[tracing::instrument(skip(self, http, code), level = "info")]
    pub async fn exchange_code(
        self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<Login, AuthError> {
        let token_url = format!("{}/oauth/token", self.provider.base_url);

        let response = http
            .post(&token_url)
            .form(&[
                ("client_id", self.provider.client_id.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", self.pkce_verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed(error_text));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            AuthError::TokenExchangeFailed("token response carried no refresh token".to_string())
        })?;

        Ok(Login::OAuth {
            provider: self.provider,
            tokens: TokenPair {
                access_token: tokens.access_token,
                refresh_token,
            },
        })
    }
}

impl OAuthProvider {
    /// Trade a refresh token for a new token pair.
    ///
    /// Callers must only replace the stored pair when this succeeds; a
    /// rejected refresh means the stored credentials are no longer valid.
    #[tracing::instrument(skip(self, http, refresh_token), level = "info")]
    pub async fn refresh_tokens(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let token_url = format!("{}/oauth/token", self.base_url);

        let response = http
            .post(&token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("redirect_uri", REDIRECT_URI),
            ])
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            tracing::info!("Token refresh rejected with status {}", response.status());
            return Err(AuthError::InvalidCredentials);
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        // Servers may rotate the refresh token or leave it out; keep the
        // old one when no replacement arrives.
        Ok(TokenPair {
            access_token: tokens.access_token,
            refresh_token: tokens
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        })
    }
}

/// S256 code challenge for `verifier` (RFC 7636).
fn pkce_challenge(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Hand the authorization URL to the system browser.
pub fn open_authorization_url(url: &str) -> Result<(), AuthError> {
    webbrowser::open(url).map_err(|e| AuthError::OAuthFailed(e.to_string()))
}
