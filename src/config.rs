//! Configuration management for Tollgate.
//!
//! Configuration comes from an optional YAML file layered under
//! `TOLLGATE__*` environment variables, e.g.
//! `TOLLGATE__RATE_LIMITING__MAX_TOKENS=20`.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{
    LimiterSettings, RouteRules, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_TOKENS, DEFAULT_WINDOW_MS,
};

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Named route limits
    #[serde(default)]
    pub routes: RouteRules,
}

/// The `routes` table of a configuration file, read verbatim.
#[derive(Debug, Default, Deserialize)]
struct RoutesSection {
    #[serde(default)]
    routes: RouteRules,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            http_addr: default_http_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Time for an empty bucket to refill completely, in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Burst size per client
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum number of clients tracked at once
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Idle time before a client's bucket is dropped. Defaults to the window.
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,

    /// Optional YAML file with additional route rules
    #[serde(default)]
    pub rules_path: Option<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_tokens: default_max_tokens(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_ms: None,
            rules_path: None,
        }
    }
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl RateLimitingConfig {
    /// Limiter settings described by this configuration.
    pub fn settings(&self) -> LimiterSettings {
        LimiterSettings {
            window_ms: self.window_ms,
            max_tokens: self.max_tokens,
            cache_capacity: self.cache_capacity,
            cache_ttl_ms: self.cache_ttl_ms.unwrap_or(self.window_ms),
        }
    }
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply
    /// `TOLLGATE__*` environment overrides to the server and rate limiting
    /// settings.
    ///
    /// Route names are case-sensitive, so `routes` is always read from the
    /// file as written rather than through the layered sources, which
    /// lowercase keys.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("TOLLGATE")
            .prefix_separator("__")
            .separator("__")
    }

    fn load_with_env(path: Option<&str>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml));
        }

        let mut config: TollgateConfig = builder.add_source(env).build()?.try_deserialize()?;

        config.routes = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_yaml::from_str::<RoutesSection>(&contents)?.routes
            }
            None => RouteRules::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can start a service.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.settings().validate()?;

        if self.server.grpc_addr == self.server.http_addr {
            return Err(TollgateError::Config(
                "grpc_addr and http_addr must differ".into(),
            ));
        }
        Ok(())
    }

    /// Inline route rules merged with those from `rules_path`, if set.
    /// File rules replace inline rules of the same name.
    pub fn route_rules(&self) -> Result<RouteRules> {
        let mut rules = self.routes.clone();
        if let Some(ref path) = self.rate_limiting.rules_path {
            rules.extend(RouteRules::from_file(path)?);
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();
        assert_eq!(config.server.grpc_addr.port(), 8081);
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.rate_limiting.settings(), LimiterSettings::default());
        assert!(config.routes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  grpc_addr: "0.0.0.0:9001"
rate_limiting:
  window_ms: 30000
  max_tokens: 5
routes:
  auth_callback:
    limit: 10
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.grpc_addr.port(), 9001);
        assert_eq!(config.server.http_addr.port(), 8080);

        let settings = config.rate_limiting.settings();
        assert_eq!(settings.window_ms, 30_000);
        assert_eq!(settings.max_tokens, 5);
        assert_eq!(settings.cache_capacity, 500);
        assert_eq!(settings.cache_ttl_ms, 30_000);

        assert_eq!(config.routes.limit_for("auth_callback"), Some(10));
    }

    #[test]
    fn test_explicit_ttl() {
        let yaml = "rate_limiting:\n  cache_ttl_ms: 120000\n";
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.settings().cache_ttl_ms, 120_000);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let yaml = "rate_limiting:\n  max_tokens: 0\n";
        let result = TollgateConfig::from_yaml(yaml);
        assert!(matches!(result, Err(TollgateError::InvalidSettings(_))));
    }

    #[test]
    fn test_same_addresses_rejected() {
        let yaml = r#"
server:
  grpc_addr: "127.0.0.1:9000"
  http_addr: "127.0.0.1:9000"
"#;
        let result = TollgateConfig::from_yaml(yaml);
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = TollgateConfig::from_yaml("server: [not, a, map]");
        assert!(matches!(result, Err(TollgateError::Yaml(_))));
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let vars: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TollgateConfig::environment().source(Some(vars))
    }

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tollgate-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tollgate.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TollgateConfig::load_with_env(None, env_with(&[])).unwrap();
        assert_eq!(config.rate_limiting.settings(), LimiterSettings::default());
        assert_eq!(config.server.grpc_addr, default_grpc_addr());
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_load_applies_env_overrides() {
        let env = env_with(&[("TOLLGATE__RATE_LIMITING__MAX_TOKENS", "20")]);
        let config = TollgateConfig::load_with_env(None, env).unwrap();
        assert_eq!(config.rate_limiting.max_tokens, 20);
        assert_eq!(config.rate_limiting.window_ms, 60_000);
    }

    #[test]
    fn test_load_keeps_route_name_case() {
        let path = write_temp(
            "route-case",
            "rate_limiting:\n  max_tokens: 4\nroutes:\n  authCallback:\n    limit: 7\n",
        );
        let path_str = path.to_str().unwrap();

        let loaded = TollgateConfig::load_with_env(Some(path_str), env_with(&[])).unwrap();
        assert_eq!(loaded.rate_limiting.max_tokens, 4);
        assert_eq!(loaded.routes.limit_for("authCallback"), Some(7));
        assert_eq!(loaded.routes.limit_for("authcallback"), None);

        let parsed = TollgateConfig::from_file(&path).unwrap();
        assert_eq!(parsed.routes, loaded.routes);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_from_file_and_rules_path() {
        let dir = std::env::temp_dir().join(format!("tollgate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let rules_path = dir.join("routes.yaml");
        std::fs::write(&rules_path, "auth_callback:\n  limit: 20\nlogin:\n  limit: 5\n").unwrap();

        let config_path = dir.join("tollgate.yaml");
        let yaml = format!(
            "rate_limiting:\n  rules_path: {:?}\nroutes:\n  auth_callback:\n    limit: 10\n",
            rules_path.display().to_string()
        );
        std::fs::write(&config_path, yaml).unwrap();

        let config = TollgateConfig::from_file(&config_path).unwrap();
        let rules = config.route_rules().unwrap();
        assert_eq!(rules.limit_for("auth_callback"), Some(20));
        assert_eq!(rules.limit_for("login"), Some(5));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_route_rules_missing_file() {
        let mut config = TollgateConfig::default();
        config.rate_limiting.rules_path = Some("/nonexistent/tollgate-rules.yaml".into());
        assert!(matches!(config.route_rules(), Err(TollgateError::Io(_))));
    }
}
