//! Authentication errors surfaced at the session manager boundary

use assetdesk_core::DeskError;

/// Generic message shown for every transport failure
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Unable to reach the authentication service. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The backend answered 412: the password change is still required
    #[error("Password change still required: {message}")]
    PasswordChangeRequired { message: String },

    /// The backend processed the request but refused it
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Token expired")]
    TokenExpired,

    #[error("Malformed server response: {message}")]
    MalformedResponse { message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Request timed out: {operation}")]
    Timeout { operation: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Core error: {0}")]
    Core(#[from] DeskError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Bad credentials or an unusable token
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials { .. }
                | AuthError::InvalidToken { .. }
                | AuthError::TokenExpired
                | AuthError::NotAuthenticated
        )
    }

    /// Timeout, unreachable service or a failing server
    pub fn is_transport_error(&self) -> bool {
        match self {
            AuthError::Network { .. } | AuthError::Timeout { .. } | AuthError::Server { .. } => {
                true
            }
            AuthError::Core(core) => core.is_recoverable(),
            _ => false,
        }
    }

    /// Human-readable message for notifications
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation { message, .. } => message.clone(),
            AuthError::InvalidCredentials { message } => message.clone(),
            AuthError::PasswordChangeRequired { message } => message.clone(),
            AuthError::Rejected { message } => message.clone(),
            AuthError::NotAuthenticated => "You are not signed in.".to_string(),
            AuthError::InvalidToken { .. } | AuthError::TokenExpired => {
                "Your session has expired. Please sign in again.".to_string()
            }
            AuthError::MalformedResponse { .. } => {
                "The authentication service returned an unexpected response.".to_string()
            }
            _ if self.is_transport_error() => NETWORK_FAILURE_MESSAGE.to_string(),
            AuthError::Core(core) => core.to_string(),
            _ => NETWORK_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AuthError::Timeout {
                operation: error
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
            }
        } else if error.is_decode() {
            AuthError::MalformedResponse {
                message: error.to_string(),
            }
        } else {
            AuthError::Network {
                message: error.to_string(),
                source: Some(Box::new(error)),
            }
        }
    }
}
