//! AssetDesk Auth - Session lifecycle and role-gated routing
//!
//! The [`SessionManager`] owns authentication state: login, logout, password
//! change, silent token refresh and the periodic liveness check. The
//! [`RouteGuard`] is a pure decision over that state.

pub mod client;
pub mod error;
pub mod guard;
pub mod roles;
pub mod session;
pub mod storage;
pub mod token;

pub use client::{ApiGateway, AuthBackend, HttpAuthBackend};
pub use error::{AuthError, AuthResult, NETWORK_FAILURE_MESSAGE};
pub use guard::{decide, Decision, RouteGuard, RouteTable};
pub use roles::{RolePriority, RoleSet};
pub use session::{
    CheckOutcome, LoggingNavigator, Navigator, Notification, NotificationLevel, Notifier,
    Session, SessionManager, SessionManagerBuilder, SessionState, SessionUser, TracingNotifier,
};
pub use storage::{CredentialSlot, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{decode_claims, decode_valid_claims, TokenClaims};
