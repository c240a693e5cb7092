//! Infrastructure shared by the AssetDesk crates
//!
//! [`DeskError`] and its context, the global `tracing` setup, the layered
//! [`DeskConfig`], and timing helpers used by the session layer.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

pub use async_utils::{with_timeout, PeriodicTask};
pub use config::*;
pub use error::{BoxError, DeskError, DeskResult, ErrorCategory, ErrorContext};
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};

// The operation macros expand to `$crate::tracing`
pub use tracing;
