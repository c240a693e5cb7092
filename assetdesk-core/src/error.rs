//! Infrastructure errors
//!
//! Errors raised below the session layer carry an [`ErrorContext`] whose id is
//! emitted with the log line, so a failure reported to the user can be traced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type DeskResult<T> = Result<T, DeskError>;

/// Where and while doing what an error happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// Subsystem that raised the error, e.g. `credential_store`
    pub component: String,
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_owned(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(self, operation: &str) -> Self {
        Self {
            operation: Some(operation.to_owned()),
            ..self
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_owned());
        self
    }
}

/// Coarse grouping used for log levels and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Transport,
    Input,
}

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("invalid configuration: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("credential storage failed: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("network failure: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("invalid input: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} timed out after {duration_ms} ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeskError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DeskError::Config { context, .. }
            | DeskError::Storage { context, .. }
            | DeskError::Network { context, .. }
            | DeskError::Validation { context, .. }
            | DeskError::Timeout { context, .. } => Some(context),
            DeskError::Io(_) => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DeskError::Config { .. } => ErrorCategory::Configuration,
            DeskError::Storage { .. } | DeskError::Io(_) => ErrorCategory::Storage,
            DeskError::Network { .. } | DeskError::Timeout { .. } => ErrorCategory::Transport,
            DeskError::Validation { .. } => ErrorCategory::Input,
        }
    }

    /// Transport failures may succeed on a later attempt
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str()).unwrap_or("-");
        let component = self.context().map(|c| c.component.as_str()).unwrap_or("-");

        match self.category() {
            ErrorCategory::Transport => {
                warn!(error_id, component, error = %self, "Transient failure")
            }
            ErrorCategory::Input => {
                warn!(error_id, component, error = %self, "Rejected input")
            }
            ErrorCategory::Configuration | ErrorCategory::Storage => {
                error!(error_id, component, error = %self, "Infrastructure failure")
            }
        }
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DeskError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Run 'assetdesk config --validate' to locate the problem"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DeskError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Run 'assetdesk config --validate' to locate the problem"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DeskError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component).with_metadata("field", $field),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::DeskError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DeskError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check that the credential file is readable and writable"),
        }
    };
}
