//! Session Manager - single owner of authentication state
//!
//! User actions (`login`, `logout`, `change_password`, `initialize`) run one at
//! a time under the mutation lock and advance the epoch when they start and
//! finish. The periodic check does its network work outside the lock and only
//! commits if the epoch it started with is still current, so an explicit user
//! action always wins over a concurrent check.

use super::events::{LoggingNavigator, Navigator, Notification, Notifier, TracingNotifier};
use super::types::{Session, SessionState, SessionUser};
use crate::client::{
    ApiGateway, AuthBackend, ChangePasswordRequest, HttpAuthBackend, LoginRequest, TokenResponse,
};
use crate::error::{AuthError, AuthResult};
use crate::roles::RolePriority;
use crate::storage::{CredentialSlot, CredentialStore};
use crate::token::{decode_claims, decode_valid_claims};
use assetdesk_core::{
    log_operation_error, log_operation_start, log_operation_success, with_timeout, DeskConfig,
    DeskError, PeriodicTask, RoutingConfig, SessionConfig,
};
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of one periodic liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The cached user is still backed by a valid token
    Unchanged,
    /// The session was repopulated from the stored or refreshed token
    Restored,
    /// The session was forced to unauthenticated
    Cleared,
    /// Another check or a user action was already running
    Skipped,
    /// A user action ran meanwhile; this check's result was dropped
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restore {
    Startup,
    Periodic,
}

/// Which token the current user was validated against
#[derive(Debug, Clone)]
struct CachedCredential {
    token: String,
    expires_at: Option<i64>,
}

impl CachedCredential {
    fn for_login(token: &str, expires_in: Option<u64>) -> Self {
        let expires_at = decode_claims(token)
            .ok()
            .map(|claims| claims.exp)
            .or_else(|| expires_in.map(|secs| Utc::now().timestamp() + secs as i64));
        Self {
            token: token.to_string(),
            expires_at,
        }
    }

    fn is_current(&self, token: &str, now: i64, leeway_secs: u64) -> bool {
        self.token == token
            && self
                .expires_at
                .map(|exp| now.saturating_add(leeway_secs as i64) < exp)
                .unwrap_or(true)
    }
}

enum Resolution {
    Unchanged,
    Restored {
        user: SessionUser,
        cache: CachedCredential,
        rotated: Option<TokenResponse>,
    },
    Cleared {
        reason: AuthError,
    },
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    credentials: CredentialSlot,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    priority: RolePriority,
    routing: RoutingConfig,
    settings: SessionConfig,
    request_timeout: Duration,
    state: watch::Sender<Session>,
    cache: Mutex<Option<CachedCredential>>,
    mutation: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
    check_in_flight: AtomicBool,
}

impl Inner {
    fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn publish(&self, session: Session) {
        self.state.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }

    fn set_cache(&self, cache: Option<CachedCredential>) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = cache;
    }

    fn cache_is_current(&self, token: &str, now: i64) -> bool {
        if !self.state.borrow().is_authenticated() {
            return false;
        }
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|cache| cache.is_current(token, now, self.settings.expiry_leeway_secs))
            .unwrap_or(false)
    }

    async fn call<T, F>(&self, operation: &str, future: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        match with_timeout(future, self.request_timeout, operation).await {
            Ok(result) => result,
            Err(DeskError::Timeout { .. }) => Err(AuthError::Timeout {
                operation: operation.to_string(),
            }),
            Err(other) => Err(AuthError::Core(other)),
        }
    }

    fn post_login_route(&self, user: &SessionUser) -> String {
        if user.must_change_password {
            self.routing.change_password_path.clone()
        } else {
            self.priority.landing_route(&user.roles).to_string()
        }
    }

    async fn resolve(&self, mode: Restore) -> Resolution {
        let token = match self.credentials.access_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Resolution::Cleared {
                    reason: AuthError::NotAuthenticated,
                }
            }
            Err(e) => return Resolution::Cleared { reason: e },
        };

        if mode == Restore::Periodic && self.cache_is_current(&token, Utc::now().timestamp()) {
            return Resolution::Unchanged;
        }

        match decode_valid_claims(&token, self.settings.expiry_leeway_secs) {
            Ok(claims) => {
                let cache = CachedCredential {
                    token: token.clone(),
                    expires_at: Some(claims.exp),
                };

                if mode == Restore::Startup {
                    if let Ok(user) = SessionUser::from_claims(&claims) {
                        return Resolution::Restored {
                            user,
                            cache,
                            rotated: None,
                        };
                    }
                }

                match self.call("me", self.backend.me()).await {
                    Ok(payload) => Resolution::Restored {
                        user: SessionUser::from_payload(payload),
                        cache,
                        rotated: None,
                    },
                    Err(e) if e.is_transport_error() => Resolution::Cleared { reason: e },
                    Err(e) => {
                        debug!(error = %e, "Stored token rejected, trying silent refresh");
                        self.refresh().await
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "Stored token unusable, trying silent refresh");
                self.refresh().await
            }
        }
    }

    async fn refresh(&self) -> Resolution {
        let refresh_token = match self.credentials.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Resolution::Cleared {
                    reason: AuthError::TokenExpired,
                }
            }
            Err(e) => return Resolution::Cleared { reason: e },
        };

        let response = match self
            .call("refresh_token", self.backend.refresh_token(&refresh_token))
            .await
        {
            Ok(response) => response,
            Err(e) => return Resolution::Cleared { reason: e },
        };

        let claims = match decode_valid_claims(&response.access_token, self.settings.expiry_leeway_secs)
        {
            Ok(claims) => claims,
            Err(e) => {
                return Resolution::Cleared {
                    reason: AuthError::MalformedResponse {
                        message: format!("refreshed token unusable: {}", e),
                    },
                }
            }
        };

        match SessionUser::from_claims(&claims) {
            Ok(user) => Resolution::Restored {
                user,
                cache: CachedCredential {
                    token: response.access_token.clone(),
                    expires_at: Some(claims.exp),
                },
                rotated: Some(response),
            },
            Err(e) => Resolution::Cleared { reason: e },
        }
    }

    /// Commit a resolution; the caller holds the mutation lock
    fn apply(&self, resolution: Resolution) -> CheckOutcome {
        match resolution {
            Resolution::Unchanged => CheckOutcome::Unchanged,
            Resolution::Restored {
                user,
                cache,
                rotated,
            } => {
                if let Some(tokens) = rotated {
                    if let Err(e) = self
                        .credentials
                        .save(&tokens.access_token, tokens.refresh_token.as_deref())
                    {
                        return self.apply(Resolution::Cleared { reason: e });
                    }
                }

                info!(user_id = %user.id, roles = ?user.roles.as_slice(), "Session restored");
                self.set_cache(Some(cache));
                self.publish(Session::authenticated(user));
                CheckOutcome::Restored
            }
            Resolution::Cleared { reason } => {
                let was_authenticated = self.state.borrow().is_authenticated();
                if let AuthError::Core(core) = &reason {
                    core.log();
                }

                if reason.is_transport_error() {
                    // Recoverable: the next tick retries with the same material
                    warn!(error = %reason, "Auth service unreachable, session set to unauthenticated");
                } else {
                    debug!(reason = %reason, "Clearing stored credentials");
                    if let Err(e) = self.credentials.clear() {
                        warn!(error = %e, "Failed to clear stored credentials");
                    }
                }

                self.set_cache(None);
                self.publish(Session::unauthenticated());

                if was_authenticated && reason.is_credential_error() {
                    self.notifier.notify(Notification::info(reason.user_message()));
                }
                CheckOutcome::Cleared
            }
        }
    }

    async fn check(&self) -> CheckOutcome {
        if self.check_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Session check already running, skipping");
            return CheckOutcome::Skipped;
        }
        let _flight = FlightGuard(&self.check_in_flight);

        let ticket = self.epoch.load(Ordering::Acquire);
        if self.mutation.try_lock().is_err() {
            debug!("User action in progress, skipping session check");
            return CheckOutcome::Skipped;
        }

        let resolution = self.resolve(Restore::Periodic).await;

        let _guard = self.mutation.lock().await;
        if self.epoch.load(Ordering::Acquire) != ticket {
            debug!("Session changed during check, discarding outcome");
            return CheckOutcome::Discarded;
        }
        self.apply(resolution)
    }
}

/// Owns the session and mediates every transition
pub struct SessionManager {
    inner: Arc<Inner>,
    monitor: Mutex<Option<PeriodicTask>>,
}

impl SessionManager {
    pub fn builder(
        backend: Arc<dyn AuthBackend>,
        credentials: CredentialSlot,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder::new(backend, credentials)
    }

    /// Builder wired to the HTTP auth service described by `config`
    pub fn http(
        config: &DeskConfig,
        store: Arc<dyn CredentialStore>,
    ) -> AuthResult<SessionManagerBuilder> {
        let credentials = CredentialSlot::new(store, &config.storage);
        let gateway = ApiGateway::new(&config.api, credentials.clone())?;
        let backend = HttpAuthBackend::new(gateway, &config.api.auth_prefix);
        Ok(SessionManagerBuilder::new(Arc::new(backend), credentials).config(config))
    }

    /// Observe every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().state()
    }

    pub fn credentials(&self) -> &CredentialSlot {
        &self.inner.credentials
    }

    /// Role-precedence landing route for `user`
    pub fn landing_route(&self, user: &SessionUser) -> String {
        self.inner.priority.landing_route(&user.roles).to_string()
    }

    /// Settle the startup state from the stored credential
    pub async fn initialize(&self) -> SessionState {
        let inner = &self.inner;
        let _guard = inner.mutation.lock().await;
        inner.advance_epoch();

        let resolution = inner.resolve(Restore::Startup).await;
        inner.apply(resolution);
        inner.advance_epoch();

        let state = inner.state.borrow().state();
        info!(%state, "Session initialized");
        state
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<SessionUser> {
        let inner = &self.inner;
        let username = username.trim();

        let precondition = if username.is_empty() {
            Some(AuthError::validation("username", "Username is required"))
        } else if password.is_empty() {
            Some(AuthError::validation("password", "Password is required"))
        } else {
            None
        };
        if let Some(error) = precondition {
            inner.notifier.notify(Notification::error(error.user_message()));
            return Err(error);
        }

        let _guard = inner.mutation.lock().await;
        inner.advance_epoch();
        log_operation_start!("login", username = %username);

        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let result = inner.call("login", inner.backend.login(&request)).await;

        let outcome = match result {
            Ok(response) => match inner
                .credentials
                .replace(&response.access_token, response.refresh_token.as_deref())
            {
                Ok(()) => {
                    let user = SessionUser::from_payload(response.user);
                    inner.set_cache(Some(CachedCredential::for_login(
                        &response.access_token,
                        response.expires_in,
                    )));
                    inner.publish(Session::authenticated(user.clone()));

                    let target = inner.post_login_route(&user);
                    log_operation_success!("login", user_id = %user.id, target = %target);
                    inner.notifier.notify(Notification::success(format!(
                        "Welcome, {}",
                        user.display_name()
                    )));
                    inner.navigator.navigate(&target);
                    Ok(user)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            log_operation_error!("login", e, username = %username);
            inner.notifier.notify(Notification::error(e.user_message()));
        }

        inner.advance_epoch();
        outcome
    }

    /// Always ends unauthenticated with an empty credential slot
    pub async fn logout(&self) {
        let inner = &self.inner;
        let _guard = inner.mutation.lock().await;
        inner.advance_epoch();
        log_operation_start!("logout");

        let has_token = matches!(inner.credentials.access_token(), Ok(Some(_)));
        if has_token {
            if let Err(e) = inner.call("logout", inner.backend.logout()).await {
                warn!(error = %e, "Remote logout failed, clearing local session anyway");
            }
        }

        if let Err(e) = inner.credentials.clear() {
            warn!(error = %e, "Failed to clear stored credentials during logout");
        }
        inner.set_cache(None);
        inner.publish(Session::unauthenticated());

        log_operation_success!("logout");
        inner.notifier.notify(Notification::info("You have been signed out"));
        inner.navigator.navigate(&inner.routing.login_path);
        inner.advance_epoch();
    }

    pub async fn change_password(&self, current: &str, new: &str) -> AuthResult<()> {
        let inner = &self.inner;

        if let Err(error) = self.validate_password_change(current, new) {
            inner.notifier.notify(Notification::error(error.user_message()));
            return Err(error);
        }

        let _guard = inner.mutation.lock().await;
        if !inner.state.borrow().is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        inner.advance_epoch();
        log_operation_start!("change_password");

        let request = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        let result = inner
            .call("change_password", inner.backend.change_password(&request))
            .await;

        let outcome = match result {
            Ok(response) if response.success => {
                inner.state.send_modify(|session| session.clear_password_change());
                let message = response
                    .message
                    .unwrap_or_else(|| "Password changed successfully".to_string());
                inner.notifier.notify(Notification::success(message));

                if let Some(user) = inner.state.borrow().user() {
                    log_operation_success!("change_password", user_id = %user.id);
                    inner.navigator.navigate(inner.priority.landing_route(&user.roles));
                }
                Ok(())
            }
            Ok(response) => Err(AuthError::Rejected {
                message: response
                    .message
                    .unwrap_or_else(|| "Password change was rejected".to_string()),
            }),
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            log_operation_error!("change_password", e);
            inner.notifier.notify(Notification::error(e.user_message()));
        }

        inner.advance_epoch();
        outcome
    }

    fn validate_password_change(&self, current: &str, new: &str) -> AuthResult<()> {
        let min_length = self.inner.settings.min_password_length;

        if current.is_empty() {
            return Err(AuthError::validation(
                "current_password",
                "Current password is required",
            ));
        }
        if new.chars().count() < min_length {
            return Err(AuthError::validation(
                "new_password",
                format!("New password must be at least {} characters", min_length),
            ));
        }
        if new == current {
            return Err(AuthError::validation(
                "new_password",
                "New password must differ from the current password",
            ));
        }
        Ok(())
    }

    /// One liveness check; safe to call at any time
    pub async fn check_auth_status(&self) -> CheckOutcome {
        self.inner.check().await
    }

    /// Run `check_auth_status` every `session.check_interval_secs`
    pub fn start_monitoring(&self) {
        let mut monitor = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if monitor.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.check_interval();
        *monitor = Some(PeriodicTask::spawn("session_check", interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    let outcome = inner.check().await;
                    debug!(?outcome, "Periodic session check finished");
                }
            }
        }));
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    /// Stop the periodic check
    pub async fn shutdown(&self) {
        let task = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.stop().await;
            info!("Session monitoring stopped");
        }
    }
}

pub struct SessionManagerBuilder {
    backend: Arc<dyn AuthBackend>,
    credentials: CredentialSlot,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    settings: SessionConfig,
    routing: RoutingConfig,
    request_timeout: Duration,
}

impl SessionManagerBuilder {
    pub fn new(backend: Arc<dyn AuthBackend>, credentials: CredentialSlot) -> Self {
        let defaults = DeskConfig::default();
        Self {
            backend,
            credentials,
            navigator: Arc::new(LoggingNavigator),
            notifier: Arc::new(TracingNotifier),
            settings: defaults.session,
            routing: defaults.routing,
            request_timeout: defaults.api.request_timeout(),
        }
    }

    pub fn config(mut self, config: &DeskConfig) -> Self {
        self.settings = config.session.clone();
        self.routing = config.routing.clone();
        self.request_timeout = config.api.request_timeout();
        self
    }

    pub fn session_config(mut self, settings: SessionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> SessionManager {
        let (state, _) = watch::channel(Session::initializing());
        let inner = Inner {
            backend: self.backend,
            credentials: self.credentials,
            navigator: self.navigator,
            notifier: self.notifier,
            priority: RolePriority::from_config(&self.routing),
            routing: self.routing,
            settings: self.settings,
            request_timeout: self.request_timeout,
            state,
            cache: Mutex::new(None),
            mutation: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            check_in_flight: AtomicBool::new(false),
        };

        SessionManager {
            inner: Arc::new(inner),
            monitor: Mutex::new(None),
        }
    }
}
