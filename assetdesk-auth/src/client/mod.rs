//! Auth service contract
//!
//! Wire types for the `/auth` endpoints and the [`AuthBackend`] trait the
//! session manager drives. [`HttpAuthBackend`] is the reqwest implementation.

use crate::error::AuthResult;
use crate::roles::RoleSet;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub mod gateway;
pub mod http;

pub use gateway::ApiGateway;
pub use http::HttpAuthBackend;

/// `POST /auth/login` body
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// User as returned by `/auth/login` and `/auth/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default)]
    pub must_change_password: bool,
}

/// `POST /auth/login` success body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: UserPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /auth/refresh-token` success body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Error body shape shared by the backend services
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .filter(|m| !m.trim().is_empty())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {}",
            other
        ))),
    }
}

/// The external auth collaborator
///
/// Protected calls (`logout`, `change_password`, `me`) authenticate with the
/// bearer token currently in the credential slot.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse>;

    /// Best-effort server-side invalidation
    async fn logout(&self) -> AuthResult<()>;

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse>;

    /// HTTP 412 maps to `AuthError::PasswordChangeRequired`
    async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> AuthResult<ChangePasswordResponse>;

    async fn me(&self) -> AuthResult<UserPayload>;
}
