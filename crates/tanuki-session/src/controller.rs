//! Login orchestration.
//!
//! The controller runs every login attempt as a background job and
//! reports progress as [`SessionEvent`]s over a channel the UI thread
//! polls. Each attempt emits `LoginStarted` first, then exactly one
//! terminal event.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use parking_lot::Mutex;

use tanuki_auth::{
    AuthError, Credential, Login, OAuthFlow, OAuthProvider, ProviderRegistry, RedirectCallback,
    RedirectDispatcher, RedirectOutcome, SecretStore,
};
use tanuki_core::{JobRunner, Settings};
use tanuki_gitlab::GitlabClient;

use crate::error::SessionError;
use crate::registry::{Account, SessionRegistry};

/// Progress reports for login attempts.
#[derive(Debug)]
pub enum SessionEvent {
    /// A login attempt began.
    LoginStarted,

    /// The attempt ended with an established session.
    LoginCompleted { session_id: String },

    /// The attempt ended in failure.
    LoginFailed { error: SessionError },
}

/// Synchronous answer to a redirect callback.
#[derive(Debug, PartialEq, Eq)]
pub enum RedirectDisposition {
    /// The callback matched a pending flow; a login attempt is now
    /// running and will report through the event channel.
    LoginPending,

    /// The user declined the authorization request.
    AccessDenied,

    /// The callback matched nothing and was dropped.
    Ignored,
}

struct ControllerState {
    settings: Arc<Settings>,
    registry: SessionRegistry,
    secrets: Arc<dyn SecretStore>,
    providers: ProviderRegistry,
    dispatcher: RedirectDispatcher,
    http: reqwest::Client,
    active: Mutex<Option<Arc<GitlabClient>>>,

    /// Logins kept in memory per session id, covering the window where
    /// the keyring has not yet made a freshly saved secret readable.
    recent_logins: Mutex<HashMap<String, Login>>,
}

/// Orchestrates sign-in, restore, and sign-out.
#[derive(Clone)]
pub struct SessionController {
    runner: JobRunner,
    events: Sender<SessionEvent>,
    state: Arc<ControllerState>,
}

impl SessionController {
    pub fn new(
        runner: JobRunner,
        events: Sender<SessionEvent>,
        settings: Arc<Settings>,
        secrets: Arc<dyn SecretStore>,
        providers: ProviderRegistry,
    ) -> Self {
        let registry = SessionRegistry::new(settings.clone(), secrets.clone());

        Self {
            runner,
            events,
            state: Arc::new(ControllerState {
                settings,
                registry,
                secrets,
                providers,
                dispatcher: RedirectDispatcher::new(),
                http: reqwest::Client::new(),
                active: Mutex::new(None),
                recent_logins: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate `login` against its server and establish a session.
    pub fn create_session(&self, login: Login) {
        self.emit(SessionEvent::LoginStarted);

        let state = self.state.clone();
        self.runner.spawn(
            async move { run_create(state, login).await },
            &self.events,
            terminal_event,
        );
    }

    /// Restore a stored session. With `refresh`, OAuth tokens are
    /// renewed before the session is validated.
    pub fn start_session(&self, session_id: &str, refresh: bool) {
        self.emit(SessionEvent::LoginStarted);

        let state = self.state.clone();
        let session_id = session_id.to_string();
        self.runner.spawn(
            async move { run_start(state, session_id, refresh).await },
            &self.events,
            terminal_event,
        );
    }

    /// Sign a session out and remove it from the record.
    ///
    /// The active client and in-memory login drop right away; the
    /// registry and keyring cleanup runs as a detached job.
    pub fn remove_session(&self, session_id: &str) {
        *self.state.active.lock() = None;
        self.state.recent_logins.lock().remove(session_id);

        let state = self.state.clone();
        let session_id = session_id.to_string();
        self.runner.spawn_detached(async move {
            if let Err(e) = state.registry.remove(&session_id) {
                tracing::warn!("Failed to remove session {}: {}", session_id, e);
            }
        });
    }

    /// Start an OAuth flow against `provider` and return the
    /// authorization URL to open in the browser.
    pub fn begin_oauth(&self, provider: &OAuthProvider) -> String {
        let (flow, url) = OAuthFlow::begin(provider.clone());
        self.state.dispatcher.register(flow);
        url
    }

    /// Feed a redirect URL delivered by the OS to the flow awaiting it.
    ///
    /// Denials and unmatched callbacks are answered synchronously; an
    /// authorized callback starts a login attempt that reports through
    /// the event channel.
    pub fn handle_callback(&self, raw_url: &str) -> RedirectDisposition {
        let callback = match RedirectCallback::parse(raw_url) {
            Some(callback) => callback,
            None => {
                tracing::debug!("Dropping malformed callback URL");
                return RedirectDisposition::Ignored;
            }
        };

        match self.state.dispatcher.dispatch(callback) {
            RedirectOutcome::Authorized { flow, code } => {
                self.emit(SessionEvent::LoginStarted);

                let state = self.state.clone();
                self.runner.spawn(
                    async move {
                        let login = flow.exchange_code(&state.http, &code).await?;
                        run_create(state, login).await
                    },
                    &self.events,
                    terminal_event,
                );

                RedirectDisposition::LoginPending
            }
            RedirectOutcome::Denied { .. } => RedirectDisposition::AccessDenied,
            RedirectOutcome::Ignored => RedirectDisposition::Ignored,
        }
    }

    /// Client for the established session, if any.
    pub fn client(&self) -> Option<Arc<GitlabClient>> {
        self.state.active.lock().clone()
    }

    /// Sessions currently on record, keyed by session id.
    pub fn sessions(&self) -> Result<HashMap<String, Account>, SessionError> {
        self.state.registry.sessions()
    }

    /// Stored metadata for one session.
    pub fn account_info(&self, session_id: &str) -> Result<Option<Account>, SessionError> {
        self.state.registry.account(session_id)
    }

    /// Providers OAuth sign-in is configured for.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.state.providers
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session event dropped, receiver gone");
        }
    }
}

fn terminal_event(result: Result<String, SessionError>) -> SessionEvent {
    match result {
        Ok(session_id) => SessionEvent::LoginCompleted { session_id },
        Err(error) => SessionEvent::LoginFailed { error },
    }
}

#[tracing::instrument(skip(state, login), level = "info")]
async fn run_create(state: Arc<ControllerState>, login: Login) -> Result<String, SessionError> {
    let credential = login.credential();
    let client = GitlabClient::new(login.server_url(), credential.clone())?;
    let user = client.authenticate().await?;

    let account = Account {
        username: user.username,
        name: user.name,
        url: login.server_url().to_string(),
        avatar_url: user.avatar_url,
    };

    let session_id = state.registry.create_if_absent(&account, &credential)?;
    state.settings.set_current_session(Some(&session_id))?;

    state
        .recent_logins
        .lock()
        .insert(session_id.clone(), login);
    *state.active.lock() = Some(Arc::new(client));

    tracing::info!("Session {} established for {}", session_id, account.username);
    Ok(session_id)
}

#[tracing::instrument(skip(state), level = "info")]
async fn run_start(
    state: Arc<ControllerState>,
    session_id: String,
    refresh: bool,
) -> Result<String, SessionError> {
    let account = state
        .registry
        .account(&session_id)?
        .ok_or_else(|| SessionError::UnknownSession(session_id.clone()))?;

    let credential = match state.secrets.lookup(&session_id)? {
        Some(credential) => credential,
        None => {
            // The keyring can take a moment to make a fresh secret
            // readable; fall back to the login still held in memory.
            let recent = state
                .recent_logins
                .lock()
                .get(&session_id)
                .map(Login::credential);
            recent.ok_or_else(|| SessionError::MissingCredential(session_id.clone()))?
        }
    };

    let credential = if refresh {
        refresh_credential(&state, &session_id, &account, credential).await?
    } else {
        credential
    };

    // Validate even when the tokens came from memory or a refresh; a
    // session only counts as restored once the server accepts it.
    let client = GitlabClient::new(&account.url, credential)?;
    client.authenticate().await?;

    state.settings.set_current_session(Some(&session_id))?;
    *state.active.lock() = Some(Arc::new(client));

    Ok(session_id)
}

async fn refresh_credential(
    state: &ControllerState,
    session_id: &str,
    account: &Account,
    credential: Credential,
) -> Result<Credential, SessionError> {
    let refresh_token = match &credential {
        Credential::OAuth { refresh_token, .. } => refresh_token.clone(),
        Credential::Pat { .. } => return Ok(credential),
    };

    let provider = state
        .providers
        .for_server(&account.url)
        .ok_or_else(|| AuthError::UnknownProvider(account.url.clone()))?;

    let tokens = provider.refresh_tokens(&state.http, &refresh_token).await?;

    let renewed = Credential::OAuth {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };

    // The stored pair is only replaced once the server accepted the
    // refresh; on failure the old secret stays in place.
    let description = format!("{} at {}", account.username, account.url);
    state.secrets.save(session_id, &description, &renewed)?;

    Ok(renewed)
}
