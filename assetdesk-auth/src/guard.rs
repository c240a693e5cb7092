//! Route Guard
//!
//! A pure function from session state and a route's required roles to what
//! the router should render. No side effects, no I/O.

use crate::session::Session;
use assetdesk_core::{GuardMode, ProtectedRoute, RoutingConfig};

/// What a protected route should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    ShowLoading,
    ShowLogin,
    ShowPasswordChange,
    ShowContent,
    Redirect(String),
}

/// `decide` with the default paths and inline login/password-change screens
pub fn decide<S: AsRef<str>>(session: &Session, required_roles: &[S]) -> Decision {
    RouteGuard::default().decide(session, required_roles)
}

/// Resolves a path to the roles it requires
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ProtectedRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<ProtectedRoute>) -> Self {
        Self { routes }
    }

    /// Roles of the longest matching prefix; unmatched paths require none
    pub fn requirement_for(&self, path: &str) -> &[String] {
        self.routes
            .iter()
            .filter(|route| prefix_matches(&route.prefix, path))
            .max_by_key(|route| route.prefix.trim_end_matches('/').len())
            .map(|route| route.roles.as_slice())
            .unwrap_or(&[])
    }

    pub fn routes(&self) -> &[ProtectedRoute] {
        &self.routes
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    mode: GuardMode,
    login_path: String,
    change_password_path: String,
    default_route: String,
    table: RouteTable,
}

impl RouteGuard {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            mode: config.guard_mode,
            login_path: config.login_path.clone(),
            change_password_path: config.change_password_path.clone(),
            default_route: config.default_route.clone(),
            table: RouteTable::new(config.protected_routes.clone()),
        }
    }

    pub fn with_mode(mut self, mode: GuardMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn decide<S: AsRef<str>>(&self, session: &Session, required_roles: &[S]) -> Decision {
        if session.is_loading() {
            return Decision::ShowLoading;
        }

        let Some(user) = session.user() else {
            return match self.mode {
                GuardMode::Inline => Decision::ShowLogin,
                GuardMode::Redirect => Decision::Redirect(self.login_path.clone()),
            };
        };

        if user.must_change_password {
            return match self.mode {
                GuardMode::Inline => Decision::ShowPasswordChange,
                GuardMode::Redirect => Decision::Redirect(self.change_password_path.clone()),
            };
        }

        if required_roles.is_empty() || user.roles.intersects(required_roles) {
            Decision::ShowContent
        } else {
            Decision::Redirect(self.default_route.clone())
        }
    }

    /// Decide for a concrete path using the route table
    pub fn decide_path(&self, session: &Session, path: &str) -> Decision {
        self.decide(session, self.table.requirement_for(path))
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}
