//! OAuth provider descriptors.
//!
//! Each descriptor carries the fixed constants for one server's OAuth
//! application. Providers are plain data assembled into a
//! [`ProviderRegistry`] at startup and injected where needed.

const GITLAB_COM_CLIENT_ID: &str =
    "4a67c8d2f1e09b35d6a8274c5b1f9e0d3c2a68f47b5d901e8c3f6a24d7b0e915";

/// Redirect URI registered with every provider.
pub const REDIRECT_URI: &str = "tanuki://callback";

/// Fixed constants identifying an OAuth application on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProvider {
    /// Human-readable server name.
    pub display_name: String,

    /// Icon name for the account chooser.
    pub icon: String,

    /// Server base URL, without a trailing slash.
    pub base_url: String,

    /// OAuth application id registered with the server.
    pub client_id: String,
}

impl OAuthProvider {
    /// The built-in gitlab.com provider.
    pub fn gitlab_com() -> Self {
        Self {
            display_name: "GitLab.com".to_string(),
            icon: "gitlab-symbolic".to_string(),
            base_url: "https://gitlab.com".to_string(),
            client_id: GITLAB_COM_CLIENT_ID.to_string(),
        }
    }
}

/// The set of servers OAuth sign-in is configured for.
pub struct ProviderRegistry {
    providers: Vec<OAuthProvider>,
}

impl ProviderRegistry {
    /// Registry over an explicit provider list.
    pub fn new(providers: Vec<OAuthProvider>) -> Self {
        Self { providers }
    }

    /// Registry holding the built-in providers.
    pub fn builtin() -> Self {
        Self::new(vec![OAuthProvider::gitlab_com()])
    }

    /// Find the provider configured for `server_url`, tolerating a
    /// trailing slash on either side.
    pub fn for_server(&self, server_url: &str) -> Option<&OAuthProvider> {
        let wanted = server_url.trim_end_matches('/');
        self.providers
            .iter()
            .find(|p| p.base_url.trim_end_matches('/') == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OAuthProvider> {
        self.providers.iter()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
