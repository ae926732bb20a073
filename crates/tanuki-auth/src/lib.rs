pub mod dispatcher;
pub mod error;
pub mod login;
pub mod oauth;
pub mod providers;
pub mod secrets;

pub use dispatcher::{RedirectCallback, RedirectDispatcher, RedirectOutcome};
pub use error::AuthError;
pub use login::{Login, TokenPair};
pub use oauth::{open_authorization_url, OAuthFlow};
pub use providers::{OAuthProvider, ProviderRegistry, REDIRECT_URI};
pub use secrets::{Credential, KeyringStore, MemoryStore, SecretStore};
