//! Named per-route limits.
//!
//! Protected endpoints often need different burst sizes (an auth callback
//! tolerates far fewer attempts than a read-only listing). Route rules give
//! those burst sizes names so callers can ask for `auth_callback` instead of
//! repeating a number.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TollgateError};

/// A set of named route limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteRules {
    routes: HashMap<String, RouteRule>,
}

/// The limit applied to one named route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Burst size for requests to this route
    pub limit: u32,
    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl RouteRule {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            description: None,
        }
    }
}

impl RouteRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file mapping route names to rules.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse route rules: {}", e)))
    }

    /// Add or replace the rule for `route`.
    pub fn insert(&mut self, route: impl Into<String>, rule: RouteRule) {
        self.routes.insert(route.into(), rule);
    }

    /// Add every rule from `other`, replacing rules with the same name.
    pub fn extend(&mut self, other: RouteRules) {
        self.routes.extend(other.routes);
    }

    /// The configured limit for `route`.
    pub fn limit_for(&self, route: &str) -> Option<u32> {
        self.routes.get(route).map(|rule| rule.limit)
    }

    /// Pick the burst size for a check.
    ///
    /// An explicit limit wins, then the named route's limit. `Ok(None)`
    /// means the limiter default applies. Naming an unknown route is an
    /// error.
    pub fn resolve_limit(&self, route: Option<&str>, explicit: Option<u32>) -> Result<Option<u32>> {
        if explicit.is_some() {
            return Ok(explicit);
        }

        match route.filter(|r| !r.is_empty()) {
            Some(route) => self
                .limit_for(route)
                .map(Some)
                .ok_or_else(|| TollgateError::UnknownRoute(route.to_string())),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
auth_callback:
  limit: 10
  description: OAuth code exchange
generate_outline:
  limit: 3
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.limit_for("auth_callback"), Some(10));
        assert_eq!(rules.limit_for("generate_outline"), Some(3));
        assert_eq!(rules.limit_for("missing"), None);
    }

    #[test]
    fn test_parse_invalid_rules() {
        let yaml = "auth_callback:\n  limit: lots\n";
        let result = RouteRules::from_yaml(yaml);
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_extend_replaces_same_name() {
        let mut rules = RouteRules::new();
        rules.insert("auth_callback", RouteRule::new(10));
        rules.insert("login", RouteRule::new(5));

        let mut overrides = RouteRules::new();
        overrides.insert("auth_callback", RouteRule::new(20));
        rules.extend(overrides);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.limit_for("auth_callback"), Some(20));
        assert_eq!(rules.limit_for("login"), Some(5));
    }

    #[test]
    fn test_resolve_explicit_limit_wins() {
        let mut rules = RouteRules::new();
        rules.insert("auth_callback", RouteRule::new(10));

        let limit = rules.resolve_limit(Some("auth_callback"), Some(4)).unwrap();
        assert_eq!(limit, Some(4));
    }

    #[test]
    fn test_resolve_route_limit() {
        let mut rules = RouteRules::new();
        rules.insert("auth_callback", RouteRule::new(10));

        let limit = rules.resolve_limit(Some("auth_callback"), None).unwrap();
        assert_eq!(limit, Some(10));
    }

    #[test]
    fn test_resolve_without_route_uses_default() {
        let rules = RouteRules::new();

        assert_eq!(rules.resolve_limit(None, None).unwrap(), None);
        assert_eq!(rules.resolve_limit(Some(""), None).unwrap(), None);
    }

    #[test]
    fn test_resolve_unknown_route() {
        let rules = RouteRules::new();

        let result = rules.resolve_limit(Some("nope"), None);
        assert!(matches!(result, Err(TollgateError::UnknownRoute(ref r)) if r == "nope"));
    }
}
