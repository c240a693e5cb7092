//! Shared fixtures for session tests
//!
//! A scripted [`FakeBackend`], recording navigator/notifier and a token
//! minting helper.

#![allow(dead_code)]

use assetdesk_auth::client::{
    AuthBackend, ChangePasswordRequest, ChangePasswordResponse, LoginRequest, LoginResponse,
    TokenResponse, UserPayload,
};
use assetdesk_auth::{
    AuthError, AuthResult, CredentialSlot, CredentialStore, MemoryCredentialStore, Navigator,
    Notification, NotificationLevel, Notifier, RoleSet, SessionManager,
};
use assetdesk_core::StorageConfig;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;

static TRACING: Once = Once::new();

/// Quiet unless `TEST_LOG` is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        let level = if std::env::var("TEST_LOG").is_ok() {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .try_init();
    });
}

/// Access token with the claims the backend puts in its JWTs
pub fn mint_token(id: &str, roles: &[&str], must_change_password: bool, expires_in_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": id,
        "id": id,
        "username": format!("user{}", id),
        "roles": roles,
        "mustChangePassword": must_change_password,
        "iat": now,
        "exp": now + expires_in_secs,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"server-side-secret"),
    )
    .expect("token encodes")
}

pub fn user_payload(id: &str, roles: &[&str], must_change_password: bool) -> UserPayload {
    UserPayload {
        id: id.to_string(),
        username: format!("user{}", id),
        first_name: Some("Camille".to_string()),
        last_name: Some("Martin".to_string()),
        email: None,
        roles: RoleSet::new(roles.iter().copied()),
        must_change_password,
    }
}

pub fn login_response(access_token: String, user: UserPayload) -> LoginResponse {
    LoginResponse {
        access_token,
        refresh_token: Some("refresh-1".to_string()),
        expires_in: Some(3600),
        user,
    }
}

/// Holds a backend call until the test releases it
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

type Reply<T> = Box<dyn Fn() -> AuthResult<T> + Send + Sync>;

/// Auth backend whose answers are scripted per endpoint
pub struct FakeBackend {
    login: Mutex<Reply<LoginResponse>>,
    logout: Mutex<Reply<()>>,
    refresh: Mutex<Reply<TokenResponse>>,
    change_password: Mutex<Reply<ChangePasswordResponse>>,
    me: Mutex<Reply<UserPayload>>,
    calls: Mutex<Vec<&'static str>>,
    login_requests: Mutex<Vec<LoginRequest>>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            login: Mutex::new(Box::new(|| {
                Err(AuthError::InvalidCredentials {
                    message: "Invalid credentials".to_string(),
                })
            })),
            logout: Mutex::new(Box::new(|| Ok(()))),
            refresh: Mutex::new(Box::new(|| {
                Err(AuthError::InvalidToken {
                    reason: "refresh token revoked".to_string(),
                })
            })),
            change_password: Mutex::new(Box::new(|| {
                Ok(ChangePasswordResponse {
                    success: true,
                    message: None,
                })
            })),
            me: Mutex::new(Box::new(|| {
                Err(AuthError::InvalidToken {
                    reason: "unknown token".to_string(),
                })
            })),
            calls: Mutex::new(Vec::new()),
            login_requests: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeBackend {
    pub fn on_login(&self, reply: impl Fn() -> AuthResult<LoginResponse> + Send + Sync + 'static) {
        *self.login.lock().unwrap() = Box::new(reply);
    }

    pub fn on_logout(&self, reply: impl Fn() -> AuthResult<()> + Send + Sync + 'static) {
        *self.logout.lock().unwrap() = Box::new(reply);
    }

    pub fn on_refresh(&self, reply: impl Fn() -> AuthResult<TokenResponse> + Send + Sync + 'static) {
        *self.refresh.lock().unwrap() = Box::new(reply);
    }

    pub fn on_change_password(
        &self,
        reply: impl Fn() -> AuthResult<ChangePasswordResponse> + Send + Sync + 'static,
    ) {
        *self.change_password.lock().unwrap() = Box::new(reply);
    }

    pub fn on_me(&self, reply: impl Fn() -> AuthResult<UserPayload> + Send + Sync + 'static) {
        *self.me.lock().unwrap() = Box::new(reply);
    }

    /// Block calls to `endpoint` until the returned gate is released
    pub fn gate(&self, endpoint: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(endpoint, gate.clone());
        gate
    }

    pub fn delay(&self, endpoint: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(endpoint, delay);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_login_request(&self) -> Option<LoginRequest> {
        self.login_requests.lock().unwrap().last().cloned()
    }

    async fn enter(&self, endpoint: &'static str) {
        self.calls.lock().unwrap().push(endpoint);

        let gate = self.gates.lock().unwrap().get(endpoint).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let delay = self.delays.lock().unwrap().get(endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        self.login_requests.lock().unwrap().push(request.clone());
        self.enter("login").await;
        (*self.login.lock().unwrap())()
    }

    async fn logout(&self) -> AuthResult<()> {
        self.enter("logout").await;
        (*self.logout.lock().unwrap())()
    }

    async fn refresh_token(&self, _refresh_token: &str) -> AuthResult<TokenResponse> {
        self.enter("refresh").await;
        (*self.refresh.lock().unwrap())()
    }

    async fn change_password(
        &self,
        _request: &ChangePasswordRequest,
    ) -> AuthResult<ChangePasswordResponse> {
        self.enter("change_password").await;
        (*self.change_password.lock().unwrap())()
    }

    async fn me(&self) -> AuthResult<UserPayload> {
        self.enter("me").await;
        (*self.me.lock().unwrap())()
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.paths.lock().unwrap().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.notifications.lock().unwrap().last().cloned()
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == level)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// Manager wired to fakes, with handles to inspect them
pub struct TestSession {
    pub manager: Arc<SessionManager>,
    pub backend: Arc<FakeBackend>,
    pub credentials: CredentialSlot,
    pub navigator: Arc<RecordingNavigator>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_backend(FakeBackend::default())
    }

    pub fn with_backend(backend: FakeBackend) -> Self {
        init_tracing();

        let backend = Arc::new(backend);
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let credentials = CredentialSlot::new(store, &StorageConfig::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let manager = SessionManager::builder(backend.clone(), credentials.clone())
            .navigator(navigator.clone())
            .notifier(notifier.clone())
            .request_timeout(Duration::from_secs(10))
            .build();

        Self {
            manager: Arc::new(manager),
            backend,
            credentials,
            navigator,
            notifier,
        }
    }

    /// Settle the manager, then log in as a user with `roles`
    pub async fn logged_in(roles: &'static [&'static str], must_change_password: bool) -> Self {
        let session = Self::new();
        session.manager.initialize().await;

        let token = mint_token("7", roles, must_change_password, 3600);
        session.backend.on_login(move || {
            Ok(login_response(
                token.clone(),
                user_payload("7", roles, must_change_password),
            ))
        });
        session
            .manager
            .login("camille", "correct horse")
            .await
            .expect("login succeeds");
        session
    }
}
