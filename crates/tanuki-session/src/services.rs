//! The session stack a UI embeds.
//!
//! One `SessionServices` owns the tokio runtime, the session
//! controller, the avatar cache, and the event channel the UI thread
//! polls. Construct one per process (or per test); every part is held
//! by value or `Arc`, nothing lives in a process global.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use tanuki_auth::{
    open_authorization_url, KeyringStore, OAuthProvider, ProviderRegistry, SecretStore,
};
use tanuki_core::{JobRunner, Settings};
use tanuki_gitlab::RemoteImageCache;

use crate::controller::{RedirectDisposition, SessionController, SessionEvent};

pub struct SessionServices {
    runtime: tokio::runtime::Runtime,
    controller: SessionController,
    images: Arc<RemoteImageCache>,
    events_rx: Mutex<Receiver<SessionEvent>>,
}

impl SessionServices {
    /// Stand up the full stack: settings at their standard location,
    /// the OS keyring, and the built-in providers.
    pub fn init() -> Result<Self> {
        let settings = Arc::new(Settings::open_default().context("Failed to open settings")?);

        Self::with_parts(
            settings,
            Arc::new(KeyringStore::new()),
            ProviderRegistry::builtin(),
        )
    }

    /// Stand up the stack from explicit parts.
    pub fn with_parts(
        settings: Arc<Settings>,
        secrets: Arc<dyn SecretStore>,
        providers: ProviderRegistry,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tanuki-tokio")
            .build()
            .context("Failed to create tokio runtime")?;

        tracing::info!("Session services starting");

        let runner = JobRunner::new(runtime.handle().clone());
        let (events_tx, events_rx) = std::sync::mpsc::channel();
        let controller = SessionController::new(runner, events_tx, settings, secrets, providers);

        Ok(Self {
            runtime,
            controller,
            images: Arc::new(RemoteImageCache::new()),
            events_rx: Mutex::new(events_rx),
        })
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Shared avatar cache.
    pub fn images(&self) -> Arc<RemoteImageCache> {
        self.images.clone()
    }

    /// Handle for spawning background jobs on the shared runtime.
    pub fn runner(&self) -> JobRunner {
        JobRunner::new(self.runtime.handle().clone())
    }

    /// Non-blocking poll for the next session event.
    pub fn try_event(&self) -> Option<SessionEvent> {
        self.events_rx.lock().try_recv().ok()
    }

    /// Wait up to `timeout` for the next session event.
    pub fn wait_event(&self, timeout: Duration) -> Option<SessionEvent> {
        match self.events_rx.lock().recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Begin an OAuth flow and open the authorization page in the
    /// system browser.
    pub fn start_oauth(&self, provider: &OAuthProvider) -> Result<()> {
        let url = self.controller.begin_oauth(provider);
        open_authorization_url(&url).context("Failed to open the browser")?;
        Ok(())
    }

    /// Feed an OS-delivered callback URL to the session layer.
    pub fn handle_callback(&self, raw_url: &str) -> RedirectDisposition {
        self.controller.handle_callback(raw_url)
    }
}
