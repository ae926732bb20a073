//! End-to-end login flows against a mock GitLab server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tanuki_auth::{
    Credential, Login, MemoryStore, OAuthProvider, ProviderRegistry, SecretStore, TokenPair,
};
use tanuki_core::Settings;
use tanuki_gitlab::GitlabError;
use tanuki_session::{
    session_id_for, RedirectDisposition, SessionError, SessionEvent, SessionServices,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn server_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn stack(
    providers: ProviderRegistry,
) -> (
    SessionServices,
    Arc<Settings>,
    Arc<MemoryStore>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(Settings::load(dir.path().join("settings.toml")).unwrap());
    let secrets = Arc::new(MemoryStore::new());
    let services =
        SessionServices::with_parts(settings.clone(), secrets.clone(), providers).unwrap();
    (services, settings, secrets, dir)
}

fn test_provider(base_url: &str) -> OAuthProvider {
    OAuthProvider {
        display_name: "Test Server".to_string(),
        icon: "test-symbolic".to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        client_id: "test-client".to_string(),
    }
}

fn user_json() -> serde_json::Value {
    serde_json::json!({
        "id": 7,
        "username": "dev",
        "name": "Dev Eloper",
        "avatar_url": "https://cdn.example.org/avatar.png",
        "web_url": "https://gitlab.example.org/dev",
    })
}

fn mount_user_endpoint(rt: &tokio::runtime::Runtime, server: &MockServer) {
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(server),
    );
}

fn next_event(services: &SessionServices) -> SessionEvent {
    services
        .wait_event(Duration::from_secs(10))
        .expect("timed out waiting for a session event")
}

fn pat_login(server: &MockServer) -> Login {
    Login::PersonalAccessToken {
        url: server.uri(),
        token: "glpat-abc".to_string(),
    }
}

/// The state token a freshly begun flow put into its authorization URL.
fn state_from(auth_url: &str) -> String {
    let parsed = url::Url::parse(auth_url).unwrap();
    parsed
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("authorization URL carries no state")
}

#[test]
fn test_pat_login_establishes_a_session() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let (services, settings, secrets, _dir) = stack(ProviderRegistry::builtin());
    services.controller().create_session(pat_login(&server));

    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(session_id, session_id_for(&server.uri(), "dev"));
    assert_eq!(settings.current_session(), Some(session_id.clone()));
    assert!(services.controller().client().is_some());

    let account = services
        .controller()
        .account_info(&session_id)
        .unwrap()
        .expect("account on record");
    assert_eq!(account.username, "dev");
    assert_eq!(account.name, "Dev Eloper");
    assert_eq!(account.url, server.uri());
    assert_eq!(
        account.avatar_url.as_deref(),
        Some("https://cdn.example.org/avatar.png")
    );

    assert_eq!(
        secrets.lookup(&session_id).unwrap(),
        Some(Credential::Pat {
            access_token: "glpat-abc".to_string()
        })
    );
}

#[test]
fn test_pat_login_against_rejecting_server_fails() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server),
    );

    let (services, settings, secrets, _dir) = stack(ProviderRegistry::builtin());
    services.controller().create_session(pat_login(&server));

    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    match next_event(&services) {
        SessionEvent::LoginFailed { error } => {
            assert!(matches!(
                error,
                SessionError::Gitlab(GitlabError::Unauthorized)
            ));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    assert!(services.controller().sessions().unwrap().is_empty());
    assert_eq!(settings.current_session(), None);
    assert_eq!(secrets.save_count(), 0);
    assert!(services.controller().client().is_none());
}

#[test]
fn test_repeat_pat_login_reuses_the_session() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let (services, _settings, secrets, _dir) = stack(ProviderRegistry::builtin());

    for _ in 0..2 {
        services.controller().create_session(pat_login(&server));
        assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
        assert!(matches!(
            next_event(&services),
            SessionEvent::LoginCompleted { .. }
        ));
    }

    assert_eq!(services.controller().sessions().unwrap().len(), 1);
    assert_eq!(secrets.save_count(), 1);
}

#[test]
fn test_restored_session_uses_the_stored_secret() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let (services, settings, secrets, _dir) = stack(ProviderRegistry::builtin());
    services.controller().create_session(pat_login(&server));
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };
    drop(services);

    // A fresh stack over the same settings and secret store, as after
    // an application restart.
    let restored =
        SessionServices::with_parts(settings.clone(), secrets.clone(), ProviderRegistry::builtin())
            .unwrap();
    restored.controller().start_session(&session_id, false);

    assert!(matches!(next_event(&restored), SessionEvent::LoginStarted));
    match next_event(&restored) {
        SessionEvent::LoginCompleted { session_id: restored_id } => {
            assert_eq!(restored_id, session_id);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(restored.controller().client().is_some());
}

#[test]
fn test_restore_falls_back_to_the_in_memory_login() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let (services, _settings, secrets, _dir) = stack(ProviderRegistry::builtin());
    services.controller().create_session(pat_login(&server));
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    // Simulate a keyring that has not made the secret readable yet.
    secrets.delete(&session_id).unwrap();

    services.controller().start_session(&session_id, false);
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    assert!(matches!(
        next_event(&services),
        SessionEvent::LoginCompleted { .. }
    ));
}

#[test]
fn test_restoring_an_unknown_session_fails() {
    let (services, _settings, _secrets, _dir) = stack(ProviderRegistry::builtin());

    services
        .controller()
        .start_session("0123456789abcdef0123456789abcdef", false);

    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    match next_event(&services) {
        SessionEvent::LoginFailed { error } => {
            assert!(matches!(error, SessionError::UnknownSession(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_oauth_callback_completes_the_sign_in() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-123",
                "refresh_token": "rt-456",
                "token_type": "Bearer",
            })))
            .mount(&server),
    );

    let provider = test_provider(&server.uri());
    let (services, settings, secrets, _dir) =
        stack(ProviderRegistry::new(vec![provider.clone()]));

    let auth_url = services.controller().begin_oauth(&provider);
    let state = state_from(&auth_url);

    let callback = format!("tanuki://callback?code=authcode&state={state}");
    assert_eq!(
        services.handle_callback(&callback),
        RedirectDisposition::LoginPending
    );

    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(session_id, session_id_for(&provider.base_url, "dev"));
    assert_eq!(settings.current_session(), Some(session_id.clone()));
    assert_eq!(
        secrets.lookup(&session_id).unwrap(),
        Some(Credential::OAuth {
            access_token: "at-123".to_string(),
            refresh_token: "rt-456".to_string()
        })
    );
}

#[test]
fn test_denied_callback_reports_access_denied() {
    let (services, _settings, _secrets, _dir) = stack(ProviderRegistry::builtin());
    let provider = test_provider("https://gitlab.example.org");

    let auth_url = services.controller().begin_oauth(&provider);
    let state = state_from(&auth_url);

    let callback = format!("tanuki://callback?error=access_denied&state={state}");
    assert_eq!(
        services.handle_callback(&callback),
        RedirectDisposition::AccessDenied
    );

    // A denial is final and silent; no login attempt starts.
    assert!(services.try_event().is_none());
}

#[test]
fn test_forged_callback_state_is_ignored() {
    let (services, _settings, _secrets, _dir) = stack(ProviderRegistry::builtin());
    let provider = test_provider("https://gitlab.example.org");
    let _auth_url = services.controller().begin_oauth(&provider);

    let disposition =
        services.handle_callback("tanuki://callback?code=stolen&state=not-a-real-state");
    assert_eq!(disposition, RedirectDisposition::Ignored);
    assert!(services.try_event().is_none());

    assert_eq!(
        services.handle_callback("https://gitlab.com/?code=x&state=y"),
        RedirectDisposition::Ignored
    );
}

#[test]
fn test_token_refresh_replaces_the_stored_pair() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let provider = test_provider(&server.uri());
    let (services, _settings, secrets, _dir) =
        stack(ProviderRegistry::new(vec![provider.clone()]));

    services.controller().create_session(Login::OAuth {
        provider: provider.clone(),
        tokens: TokenPair {
            access_token: "at-old".to_string(),
            refresh_token: "rt-old".to_string(),
        },
    });
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-new",
                "refresh_token": "rt-new",
            })))
            .mount(&server),
    );

    services.controller().start_session(&session_id, true);
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    assert!(matches!(
        next_event(&services),
        SessionEvent::LoginCompleted { .. }
    ));

    assert_eq!(
        secrets.lookup(&session_id).unwrap(),
        Some(Credential::OAuth {
            access_token: "at-new".to_string(),
            refresh_token: "rt-new".to_string()
        })
    );
}

#[test]
fn test_failed_token_refresh_keeps_the_stored_pair() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let provider = test_provider(&server.uri());
    let (services, _settings, secrets, _dir) =
        stack(ProviderRegistry::new(vec![provider.clone()]));

    services.controller().create_session(Login::OAuth {
        provider: provider.clone(),
        tokens: TokenPair {
            access_token: "at-old".to_string(),
            refresh_token: "rt-old".to_string(),
        },
    });
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server),
    );

    services.controller().start_session(&session_id, true);
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    match next_event(&services) {
        SessionEvent::LoginFailed { error } => {
            assert!(matches!(error, SessionError::Auth(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // The old pair survives a rejected refresh.
    assert_eq!(
        secrets.lookup(&session_id).unwrap(),
        Some(Credential::OAuth {
            access_token: "at-old".to_string(),
            refresh_token: "rt-old".to_string()
        })
    );
}

#[test]
fn test_removed_session_is_forgotten() {
    let rt = server_runtime();
    let server = rt.block_on(MockServer::start());
    mount_user_endpoint(&rt, &server);

    let (services, settings, secrets, _dir) = stack(ProviderRegistry::builtin());
    services.controller().create_session(pat_login(&server));
    assert!(matches!(next_event(&services), SessionEvent::LoginStarted));
    let session_id = match next_event(&services) {
        SessionEvent::LoginCompleted { session_id } => session_id,
        other => panic!("expected completion, got {other:?}"),
    };

    services.controller().remove_session(&session_id);
    assert!(services.controller().client().is_none());

    // The registry cleanup runs as a detached job.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !services.controller().sessions().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "session was never removed");
        std::thread::sleep(Duration::from_millis(25));
    }

    assert_eq!(secrets.lookup(&session_id).unwrap(), None);
    assert_eq!(settings.current_session(), None);
    assert!(services.try_event().is_none());
}
