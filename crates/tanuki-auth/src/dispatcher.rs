//! Redirect callbacks and the table of flows awaiting them.
//!
//! The OS hands the application `tanuki://callback` URLs. Each one is
//! parsed into a [`RedirectCallback`] and matched against the pending
//! flows by state token; anything that doesn't match a pending flow is
//! dropped without acknowledgement.

use std::collections::HashMap;

use parking_lot::Mutex;
use url::Url;

use crate::oauth::OAuthFlow;

/// A parsed `tanuki://callback` redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectCallback {
    /// The user approved; the server sent an authorization code.
    Authorized { state: String, code: String },

    /// The user declined the authorization request.
    Denied { state: String },
}

impl RedirectCallback {
    /// Parse a raw redirect URL. Returns `None` for anything that is
    /// not a well-formed callback.
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if url.scheme() != "tanuki" || url.host_str() != Some("callback") {
            return None;
        }

        let mut state = None;
        let mut code = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "state" => state = Some(value.into_owned()),
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        let state = state?;
        if error.as_deref() == Some("access_denied") {
            return Some(Self::Denied { state });
        }

        code.map(|code| Self::Authorized { state, code })
    }
}

/// What became of a dispatched callback.
#[derive(Debug)]
pub enum RedirectOutcome {
    /// The callback matched a pending flow and carried a code.
    Authorized { flow: OAuthFlow, code: String },

    /// The user declined the matching pending flow.
    Denied { flow: OAuthFlow },

    /// No pending flow matched; the callback was dropped.
    Ignored,
}

/// Table of flows waiting for their browser redirect.
#[derive(Default)]
pub struct RedirectDispatcher {
    pending: Mutex<HashMap<String, OAuthFlow>>,
}

impl RedirectDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `flow` until its redirect arrives.
    pub fn register(&self, flow: OAuthFlow) {
        self.pending
            .lock()
            .insert(flow.state_token().to_string(), flow);
    }

    /// Match `callback` against the pending flows, consuming the entry.
    /// Each flow is handed out at most once.
    pub fn dispatch(&self, callback: RedirectCallback) -> RedirectOutcome {
        let (state, code) = match callback {
            RedirectCallback::Authorized { state, code } => (state, Some(code)),
            RedirectCallback::Denied { state } => (state, None),
        };

        let flow = match self.pending.lock().remove(&state) {
            Some(flow) => flow,
            None => {
                tracing::debug!("Dropping redirect with unknown state token");
                return RedirectOutcome::Ignored;
            }
        };

        match code {
            Some(code) => RedirectOutcome::Authorized { flow, code },
            None => RedirectOutcome::Denied { flow },
        }
    }

    /// Number of flows still awaiting their redirect.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
