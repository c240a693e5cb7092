//! Session lifecycle
//!
//! One [`SessionManager`] owns the in-memory [`Session`] and the credential
//! slot. Everything else observes it through [`SessionManager::subscribe`].

pub mod events;
pub mod manager;
pub mod types;

pub use events::{LoggingNavigator, Navigator, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use manager::{CheckOutcome, SessionManager, SessionManagerBuilder};
pub use types::{Session, SessionState, SessionUser};
