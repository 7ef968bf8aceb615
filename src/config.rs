//! Configuration management for Marquee.
//!
//! Configuration is layered:
//! 1. Default values
//! 2. Configuration file (YAML)
//! 3. Environment variables with the `MARQUEE_` prefix and `__` as the
//!    nested key separator, e.g. `MARQUEE_LIMITER__RPS=10`

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Longest lifetime accepted for any issued token (one year).
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest accepted shutdown grace period.
pub const MAX_GRACE_PERIOD_SECS: u64 = 60 * 60;

/// Longest accepted interval between idle sweeps.
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Main configuration for the Marquee service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarqueeConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-client rate limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Graceful shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Credential configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cross-origin configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Environment name reported by the healthcheck
    #[serde(default = "default_env")]
    pub env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            env: default_env(),
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_env() -> String {
    "development".to_string()
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimiterConfig {
    /// When false every request is admitted without touching bucket state
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sustained requests per second per client
    #[serde(default = "default_rps")]
    pub rps: f64,

    /// Bucket capacity per client
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How often idle clients are swept from the table
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Clients not seen for longer than this are evicted by the sweep
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// Header carrying the original client address when running behind a proxy
    #[serde(default)]
    pub forwarded_header: Option<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: default_rps(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval(),
            idle_threshold_secs: default_idle_threshold(),
            forwarded_header: None,
        }
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.min(MAX_SWEEP_INTERVAL_SECS))
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_rps() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_threshold() -> u64 {
    180
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShutdownConfig {
    /// Hard deadline for in-flight requests and background tasks after a
    /// termination signal
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
        }
    }
}

impl ShutdownConfig {
    /// Clamped to [`MAX_GRACE_PERIOD_SECS`] so the shutdown deadline is
    /// always representable.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs.min(MAX_GRACE_PERIOD_SECS))
    }
}

fn default_grace_period() -> u64 {
    30
}

/// Credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Lifetime of tokens issued by `POST /v1/tokens/authentication`
    #[serde(default = "default_authentication_ttl")]
    pub authentication_token_ttl_secs: u64,

    /// Lifetime of tokens mailed out on registration
    #[serde(default = "default_activation_ttl")]
    pub activation_token_ttl_secs: u64,

    /// bcrypt work factor for password hashes
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authentication_token_ttl_secs: default_authentication_ttl(),
            activation_token_ttl_secs: default_activation_ttl(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl AuthConfig {
    pub fn authentication_token_ttl(&self) -> chrono::Duration {
        token_ttl(self.authentication_token_ttl_secs)
    }

    pub fn activation_token_ttl(&self) -> chrono::Duration {
        token_ttl(self.activation_token_ttl_secs)
    }
}

/// Clamped to [`MAX_TOKEN_TTL_SECS`], which always fits a `chrono::Duration`.
fn token_ttl(secs: u64) -> chrono::Duration {
    let secs = secs.min(MAX_TOKEN_TTL_SECS);
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

fn default_authentication_ttl() -> u64 {
    24 * 60 * 60
}

fn default_activation_ttl() -> u64 {
    3 * 24 * 60 * 60
}

fn default_bcrypt_cost() -> u32 {
    12
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests
    #[serde(default)]
    pub trusted_origins: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl MarqueeConfig {
    /// Load configuration from a YAML file with `MARQUEE_` environment overrides.
    ///
    /// The result is not validated; call [`validate`](Self::validate) once
    /// every override has been applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&MarqueeConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from defaults and environment variables only.
    ///
    /// Like [`load`](Self::load), the result is not yet validated.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&MarqueeConfig::default())?)
            .add_source(env_source())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: MarqueeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter and orchestrator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.limiter.enabled {
            if !self.limiter.rps.is_finite() || self.limiter.rps <= 0.0 {
                return Err(invalid(format!(
                    "limiter.rps must be a positive number, got {}",
                    self.limiter.rps
                )));
            }
            if self.limiter.burst == 0 {
                return Err(invalid("limiter.burst must be at least 1"));
            }
            if self.limiter.sweep_interval_secs == 0
                || self.limiter.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS
            {
                return Err(invalid(format!(
                    "limiter.sweep_interval_secs must be between 1 and {}, got {}",
                    MAX_SWEEP_INTERVAL_SECS, self.limiter.sweep_interval_secs
                )));
            }
        }

        if self.shutdown.grace_period_secs == 0
            || self.shutdown.grace_period_secs > MAX_GRACE_PERIOD_SECS
        {
            return Err(invalid(format!(
                "shutdown.grace_period_secs must be between 1 and {}, got {}",
                MAX_GRACE_PERIOD_SECS, self.shutdown.grace_period_secs
            )));
        }

        for (name, secs) in [
            (
                "auth.authentication_token_ttl_secs",
                self.auth.authentication_token_ttl_secs,
            ),
            (
                "auth.activation_token_ttl_secs",
                self.auth.activation_token_ttl_secs,
            ),
        ] {
            if secs == 0 || secs > MAX_TOKEN_TTL_SECS {
                return Err(invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_TOKEN_TTL_SECS, secs
                )));
            }
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(invalid(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            )));
        }

        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("MARQUEE")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cors.trusted_origins")
        .try_parsing(true)
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MarqueeConfig::default();
        assert_eq!(config.server.addr.port(), 4000);
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.rps, 2.0);
        assert_eq!(config.limiter.burst, 4);
        assert_eq!(config.limiter.idle_threshold(), Duration::from_secs(180));
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limiter:
  rps: 10
  burst: 20
cors:
  trusted_origins:
    - https://example.com
"#;
        let config = MarqueeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.rps, 10.0);
        assert_eq!(config.limiter.burst, 20);
        assert!(config.limiter.enabled);
        assert_eq!(config.cors.trusted_origins, vec!["https://example.com"]);
        assert_eq!(config.server.env, "development");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  addr: "127.0.0.1:9000"
  env: staging
limiter:
  enabled: false
shutdown:
  grace_period_secs: 5
logging:
  level: debug
  json: true
"#
        )
        .unwrap();

        let config = MarqueeConfig::load(file.path()).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.server.env, "staging");
        assert!(!config.limiter.enabled);
        assert_eq!(config.shutdown.grace_period_secs, 5);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_missing_file() {
        let result = MarqueeConfig::load("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_limiter() {
        let mut config = MarqueeConfig::default();
        config.limiter.rps = 0.0;
        assert!(matches!(config.validate(), Err(ConfigLoadError::Invalid { .. })));

        let mut config = MarqueeConfig::default();
        config.limiter.burst = 0;
        assert!(config.validate().is_err());

        // A disabled limiter is never consulted, so its numbers are not checked
        config.limiter.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_grace_period() {
        let mut config = MarqueeConfig::default();
        config.shutdown.grace_period_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_token_ttl() {
        let yaml = "auth:\n  activation_token_ttl_secs: 10000000000000000\n";
        assert!(matches!(
            MarqueeConfig::from_yaml(yaml),
            Err(ConfigLoadError::Invalid { .. })
        ));

        let mut config = MarqueeConfig::default();
        config.auth.authentication_token_ttl_secs = u64::MAX;
        assert!(config.validate().is_err());

        config.auth.authentication_token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_ttl_never_negative_or_panics() {
        let mut config = MarqueeConfig::default();
        config.auth.authentication_token_ttl_secs = u64::MAX;
        config.auth.activation_token_ttl_secs = 10_000_000_000_000_000;

        let cap = chrono::Duration::seconds(MAX_TOKEN_TTL_SECS as i64);
        assert_eq!(config.auth.authentication_token_ttl(), cap);
        assert_eq!(config.auth.activation_token_ttl(), cap);
    }

    #[test]
    fn test_grace_period_and_sweep_interval_are_bounded() {
        let mut config = MarqueeConfig::default();
        config.shutdown.grace_period_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.shutdown.grace_period(),
            Duration::from_secs(MAX_GRACE_PERIOD_SECS)
        );
        // The shutdown deadline is computed this way
        let _deadline = tokio::time::Instant::now() + config.shutdown.grace_period();

        let mut config = MarqueeConfig::default();
        config.limiter.sweep_interval_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.limiter.sweep_interval(),
            Duration::from_secs(MAX_SWEEP_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_load_leaves_validation_to_caller() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "limiter:\n  rps: 0").unwrap();

        let mut config = MarqueeConfig::load(file.path()).unwrap();
        assert!(config.validate().is_err());

        config.limiter.enabled = false;
        assert!(config.validate().is_ok());
    }
}
