//! Configuration management
//!
//! Defaults, then an optional TOML file, then `ASSETDESK__*` environment
//! variables, merged with the `config` crate.

use crate::error::{DeskError, DeskResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::validation_error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `ASSETDESK__API__BASE_URL`
pub const ENV_PREFIX: &str = "ASSETDESK";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub routing: RoutingConfig,
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend gateway
    pub base_url: String,
    /// Path prefix of the auth service
    pub auth_prefix: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            auth_prefix: "/auth".to_string(),
            request_timeout_secs: 10,
            user_agent: format!("assetdesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval of the periodic liveness check
    pub check_interval_secs: u64,
    /// Tokens expiring within this many seconds count as expired
    pub expiry_leeway_secs: u64,
    /// Minimum length accepted for a new password
    pub min_password_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            expiry_leeway_secs: 0,
            min_password_length: 8,
        }
    }
}

impl SessionConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Credential slot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Credential file; defaults to the platform data directory
    pub credentials_path: Option<PathBuf>,
    pub token_key: String,
    pub refresh_token_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            token_key: "token".to_string(),
            refresh_token_key: "refreshToken".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_credentials_path(&self) -> PathBuf {
        self.credentials_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("assetdesk")
                .join("credentials.json")
        })
    }
}

/// How the route guard reports unauthenticated or password-pending sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    /// Render the login / change-password view in place
    Inline,
    /// Redirect to the login / change-password route
    Redirect,
}

/// Landing route for users holding `role`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRoute {
    pub role: String,
    pub path: String,
}

impl RoleRoute {
    pub fn new(role: &str, path: &str) -> Self {
        Self {
            role: role.to_string(),
            path: path.to_string(),
        }
    }
}

/// Roles required below a path prefix; an empty list admits any authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRoute {
    pub prefix: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ProtectedRoute {
    pub fn new(prefix: &str, roles: &[&str]) -> Self {
        Self {
            prefix: prefix.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub login_path: String,
    pub change_password_path: String,
    pub default_route: String,
    pub guard_mode: GuardMode,
    /// Checked in order; the first role the user holds wins
    pub role_routes: Vec<RoleRoute>,
    pub protected_routes: Vec<ProtectedRoute>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            change_password_path: "/change-password".to_string(),
            default_route: "/".to_string(),
            guard_mode: GuardMode::Inline,
            role_routes: vec![
                RoleRoute::new("admin", "/admin"),
                RoleRoute::new("validateur", "/validateur"),
                RoleRoute::new("ingenieurpr", "/ingenieur"),
                RoleRoute::new("observateur", "/observateur"),
            ],
            protected_routes: vec![
                ProtectedRoute::new("/admin", &["admin"]),
                ProtectedRoute::new("/validateur", &["validateur", "admin"]),
                ProtectedRoute::new("/ingenieur", &["ingenieurpr", "admin"]),
                ProtectedRoute::new("/observateur", &["observateur", "admin"]),
                ProtectedRoute::new("/tickets", &[]),
                ProtectedRoute::new("/calendar", &[]),
                ProtectedRoute::new("/messages", &[]),
            ],
        }
    }
}

fn config_failure(
    message: String,
    operation: &str,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    suggestion: &str,
) -> DeskError {
    DeskError::Config {
        message,
        source,
        context: ErrorContext::new("config")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

impl DeskConfig {
    /// Layered load: defaults, optional file, environment
    pub fn load(path: Option<&Path>) -> DeskResult<Self> {
        let defaults = config::Config::try_from(&DeskConfig::default()).map_err(|e| {
            config_failure(
                format!("Failed to build default configuration: {}", e),
                "load_defaults",
                Some(Box::new(e)),
                "Report this as a bug",
            )
        })?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged: DeskConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                config_failure(
                    format!("Failed to load configuration: {}", e),
                    "load",
                    Some(Box::new(e)),
                    "Check TOML syntax and ASSETDESK__* environment variables",
                )
            })?;

        merged.validate()?;
        Ok(merged)
    }

    /// Load configuration from a TOML file only
    pub fn from_file<P: AsRef<Path>>(path: P) -> DeskResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_failure(
                format!("Failed to read config file: {}", e),
                "read_file",
                Some(Box::new(e)),
                "Check if the config file exists and is readable",
            )
        })?;

        let config: DeskConfig = toml::from_str(&content).map_err(|e| {
            config_failure(
                format!("Failed to parse config: {}", e),
                "parse_toml",
                Some(Box::new(e)),
                "Check TOML syntax in config file",
            )
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DeskResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            config_failure(
                format!("Failed to serialize config: {}", e),
                "serialize_toml",
                Some(Box::new(e)),
                "Report this as a bug",
            )
        })?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| {
            config_failure(
                format!("Failed to write config file: {}", e),
                "write_file",
                Some(Box::new(e)),
                "Check if the directory exists and is writable",
            )
        })?;

        Ok(())
    }

    pub fn validate(&self) -> DeskResult<()> {
        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(config_failure(
                format!("Invalid api.base_url '{}': {}", self.api.base_url, e),
                "validate",
                None,
                "Set api.base_url to an absolute http(s) URL",
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(validation_error!(
                "api.request_timeout_secs must be greater than 0",
                "api.request_timeout_secs",
                "config"
            ));
        }

        if self.session.check_interval_secs == 0 {
            return Err(validation_error!(
                "session.check_interval_secs must be greater than 0",
                "session.check_interval_secs",
                "config"
            ));
        }

        if self.session.min_password_length == 0 {
            return Err(validation_error!(
                "session.min_password_length must be at least 1",
                "session.min_password_length",
                "config"
            ));
        }

        if self.routing.role_routes.is_empty() {
            return Err(config_failure(
                "routing.role_routes must list at least one role".to_string(),
                "validate",
                None,
                "Restore the default role priority list",
            ));
        }

        Ok(())
    }
}
