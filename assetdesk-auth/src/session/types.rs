//! Session data types

use crate::client::UserPayload;
use crate::error::{AuthError, AuthResult};
use crate::roles::RoleSet;
use crate::token::TokenClaims;
use serde::{Deserialize, Serialize};

/// Lifecycle state derived from a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Unauthenticated,
    Authenticated,
    PasswordChangeRequired,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::PasswordChangeRequired => write!(f, "password_change_required"),
        }
    }
}

/// The authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub roles: RoleSet,
    pub must_change_password: bool,
}

impl SessionUser {
    pub fn from_payload(payload: UserPayload) -> Self {
        Self {
            id: payload.id,
            username: payload.username,
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            roles: payload.roles,
            must_change_password: payload.must_change_password,
        }
    }

    /// Identity restored from a decoded access token
    pub fn from_claims(claims: &TokenClaims) -> AuthResult<Self> {
        let id = claims
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| claims.sub.clone());
        if id.trim().is_empty() {
            return Err(AuthError::MalformedResponse {
                message: "token carries no user identifier".to_string(),
            });
        }

        Ok(Self {
            username: claims.username.clone().unwrap_or_else(|| claims.sub.clone()),
            id,
            first_name: claims.first_name.clone(),
            last_name: claims.last_name.clone(),
            email: claims.email.clone(),
            roles: claims.roles.clone(),
            must_change_password: claims.must_change_password,
        })
    }

    /// "First Last" when known, otherwise the username
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// In-memory session as observed by the rest of the application
///
/// `is_authenticated()` is derived from the presence of a user and cannot
/// drift from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user: Option<SessionUser>,
    loading: bool,
}

impl Session {
    pub fn new(user: Option<SessionUser>, loading: bool) -> Self {
        Self { user, loading }
    }

    /// Process start: no user yet, still loading
    pub fn initializing() -> Self {
        Self::new(None, true)
    }

    pub fn unauthenticated() -> Self {
        Self::new(None, false)
    }

    pub fn authenticated(user: SessionUser) -> Self {
        Self::new(Some(user), false)
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Only meaningful while authenticated; false otherwise
    pub fn must_change_password(&self) -> bool {
        self.user
            .as_ref()
            .map(|u| u.must_change_password)
            .unwrap_or(false)
    }

    pub fn roles(&self) -> Option<&RoleSet> {
        self.user.as_ref().map(|u| &u.roles)
    }

    pub fn state(&self) -> SessionState {
        match (&self.user, self.loading) {
            (_, true) => SessionState::Initializing,
            (None, false) => SessionState::Unauthenticated,
            (Some(user), false) if user.must_change_password => {
                SessionState::PasswordChangeRequired
            }
            (Some(_), false) => SessionState::Authenticated,
        }
    }

    pub(crate) fn clear_password_change(&mut self) {
        if let Some(user) = self.user.as_mut() {
            user.must_change_password = false;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initializing()
    }
}
