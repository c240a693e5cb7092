//! Role model
//!
//! Role strings compare case-insensitively. Landing routes are resolved from an
//! explicit priority list rather than a chain of conditionals.

use assetdesk_core::{RoleRoute, RoutingConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Unique role strings in the order the backend sent them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RoleSet {
    roles: Vec<String>,
}

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for role in roles {
            let role = role.as_ref().trim();
            if role.is_empty() || unique.iter().any(|r| r.eq_ignore_ascii_case(role)) {
                continue;
            }
            unique.push(role.to_string());
        }
        Self { roles: unique }
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role.trim()))
    }

    /// Whether any of `required` is held
    pub fn intersects<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().any(|role| self.contains(role.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.roles
    }
}

impl From<Vec<String>> for RoleSet {
    fn from(roles: Vec<String>) -> Self {
        Self::new(roles)
    }
}

impl From<RoleSet> for Vec<String> {
    fn from(set: RoleSet) -> Self {
        set.roles
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Ordered role precedence used for post-login navigation
#[derive(Debug, Clone)]
pub struct RolePriority {
    routes: Vec<RoleRoute>,
    default_route: String,
}

impl RolePriority {
    pub fn new(routes: Vec<RoleRoute>, default_route: impl Into<String>) -> Self {
        Self {
            routes,
            default_route: default_route.into(),
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(config.role_routes.clone(), config.default_route.clone())
    }

    /// Highest-priority role held, if any is recognised
    pub fn primary_role(&self, roles: &RoleSet) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| roles.contains(&route.role))
            .map(|route| route.role.as_str())
    }

    /// Route to navigate to after sign-in
    pub fn landing_route(&self, roles: &RoleSet) -> &str {
        match self.routes.iter().find(|route| roles.contains(&route.role)) {
            Some(route) => &route.path,
            None => {
                // Still lands on the default route; a misconfigured role only shows up here
                warn!(
                    roles = ?roles.as_slice(),
                    default_route = %self.default_route,
                    "Unrecognized role, using default route"
                );
                &self.default_route
            }
        }
    }

    pub fn default_route(&self) -> &str {
        &self.default_route
    }
}

impl Default for RolePriority {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}
