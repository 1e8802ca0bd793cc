//! Configuration management for the civic feed engine
//!
//! Provides strongly-typed configuration with validation, environment variable parsing,
//! and sensible defaults. Everything the service needs is built once at startup and
//! handed to the components that use it; nothing reads the environment afterwards.
//!
//! # Example
//! ```no_run
//! use civic_feed::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Listening on {}:{}", config.api.host, config.api.port);
//! ```

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Bearer token resolution
    pub auth: AuthConfig,
    /// Feed scoring configuration
    pub feed: FeedConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
    /// Apply bundled migrations on startup
    pub run_migrations: bool,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Maximum request body size
    pub max_body_size: usize,
    /// Prometheus exporter port (only used with the `prometheus` feature)
    pub metrics_port: u16,
}

/// Authentication configuration
///
/// At least one of `jwt_secret` or `auth_url` must be set. When both are present the
/// local JWT check wins.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret used to sign access tokens
    pub jwt_secret: Option<String>,
    /// Expected `aud` claim
    pub jwt_audience: Option<String>,
    /// Base URL of the auth service (`{auth_url}/auth/v1/user`)
    pub auth_url: Option<String>,
    /// Project API key sent as `apikey` to the auth service
    pub api_key: Option<String>,
    /// Timeout for auth service calls
    pub timeout: Duration,
}

/// Longest accepted lookup window for civic events and engagement history
const MAX_WINDOW_DAYS: i64 = 3650;

/// Feed scoring configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Page size when the request omits `limit`
    pub default_limit: usize,
    /// Upper bound applied to requested page sizes
    pub max_limit: usize,
    /// Maximum share of a diversified feed any one content type may take
    pub diversity_cap: f64,
    /// Civic events within this many days activate the boost
    pub civic_event_window_days: i64,
    /// Interaction history window for engagement affinity
    pub engagement_window_days: i64,
    /// Multiplier applied to time sensitivity while a civic event is near
    pub civic_boost: f64,
    /// Feed generation slower than this is logged as a warning
    pub slow_threshold_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            diversity_cap: 0.4,
            civic_event_window_days: 30,
            engagement_window_days: 30,
            civic_boost: 1.2,
            slow_threshold_ms: 200,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Platforms that mount secrets as files point FFOLDER at the directory.
        // Each file name is the env var name and its contents is the value.
        if let Ok(folder) = std::env::var("FFOLDER") {
            load_env_folder(std::path::Path::new(&folder));
        } else {
            // Try to load .env file (ignore if not found)
            dotenvy::dotenv().ok();
        }

        let config = Self {
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            auth: AuthConfig::from_env(),
            feed: FeedConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_none() && self.auth.auth_url.is_none() {
            return Err(Error::InvalidConfig {
                key: "AUTH_JWT_SECRET",
                message: "either AUTH_JWT_SECRET or AUTH_URL must be set".into(),
            });
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(Error::InvalidConfig {
                key: "DB_MAX_CONNECTIONS",
                message: "max_connections must be >= min_connections".into(),
            });
        }

        if !(self.feed.diversity_cap > 0.0 && self.feed.diversity_cap <= 1.0) {
            return Err(Error::InvalidConfig {
                key: "FEED_DIVERSITY_CAP",
                message: format!("must be in (0, 1], got {}", self.feed.diversity_cap).into(),
            });
        }

        for (key, days) in [
            ("FEED_CIVIC_EVENT_WINDOW_DAYS", self.feed.civic_event_window_days),
            ("FEED_ENGAGEMENT_WINDOW_DAYS", self.feed.engagement_window_days),
        ] {
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(Error::InvalidConfig {
                    key,
                    message: format!("must be in 1..={} days, got {}", MAX_WINDOW_DAYS, days)
                        .into(),
                });
            }
        }

        if !(self.feed.civic_boost.is_finite() && self.feed.civic_boost >= 1.0) {
            return Err(Error::InvalidConfig {
                key: "FEED_CIVIC_BOOST",
                message: format!("must be a finite value >= 1.0, got {}", self.feed.civic_boost)
                    .into(),
            });
        }

        if self.feed.default_limit > self.feed.max_limit {
            return Err(Error::InvalidConfig {
                key: "FEED_DEFAULT_LIMIT",
                message: "default limit must not exceed FEED_MAX_LIMIT".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Database:");
        info!("    URL: {}", mask_url(&self.database.url));
        info!(
            "    Pool Size: {}-{}",
            self.database.min_connections, self.database.max_connections
        );
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Auth:");
        if self.auth.jwt_secret.is_some() {
            info!("    Mode: local JWT (HS256)");
        } else if let Some(url) = &self.auth.auth_url {
            info!("    Mode: remote ({})", url);
        }
        info!("  Feed:");
        info!(
            "    Limit: default {} / max {}",
            self.feed.default_limit, self.feed.max_limit
        );
        info!("    Diversity cap: {:.0}%", self.feed.diversity_cap * 100.0);
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = get_env("DATABASE_URL").unwrap_or_else(|_| {
            let user = std::env::var("USER").unwrap_or_else(|_| "postgres".to_string());
            format!("postgres://{}@localhost/civic_feed_dev", user)
        });

        Ok(Self {
            url,
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "10").parse().unwrap_or(10),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "1").parse().unwrap_or(1),
            connect_timeout: Duration::from_secs(
                get_env_or("DB_CONNECT_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            idle_timeout: Duration::from_secs(
                get_env_or("DB_IDLE_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                get_env_or("DB_MAX_LIFETIME_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
            statement_cache_size: get_env_or("DB_STATEMENT_CACHE_SIZE", "100")
                .parse()
                .unwrap_or(100),
            run_migrations: get_env_or("RUN_MIGRATIONS", "true").parse().unwrap_or(true),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_parsed_or("API_PORT", 8080)?,
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            max_body_size: get_env_or("API_MAX_BODY_SIZE", "1048576")
                .parse()
                .unwrap_or(1024 * 1024),
            metrics_port: get_env_or("METRICS_PORT", "9090").parse().unwrap_or(9090),
        })
    }
}

impl AuthConfig {
    fn from_env() -> Self {
        Self {
            jwt_secret: get_env_opt("AUTH_JWT_SECRET"),
            jwt_audience: get_env_opt("AUTH_JWT_AUDIENCE")
                .or_else(|| Some("authenticated".to_string())),
            auth_url: get_env_opt("AUTH_URL").map(|u| u.trim_end_matches('/').to_string()),
            api_key: get_env_opt("AUTH_API_KEY"),
            timeout: Duration::from_secs(
                get_env_or("AUTH_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
        }
    }
}

impl FeedConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_limit: get_env_parsed_or("FEED_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: get_env_parsed_or("FEED_MAX_LIMIT", defaults.max_limit)?,
            diversity_cap: get_env_parsed_or("FEED_DIVERSITY_CAP", defaults.diversity_cap)?,
            civic_event_window_days: get_env_parsed_or(
                "FEED_CIVIC_EVENT_WINDOW_DAYS",
                defaults.civic_event_window_days,
            )?,
            engagement_window_days: get_env_parsed_or(
                "FEED_ENGAGEMENT_WINDOW_DAYS",
                defaults.engagement_window_days,
            )?,
            civic_boost: get_env_parsed_or("FEED_CIVIC_BOOST", defaults.civic_boost)?,
            slow_threshold_ms: get_env_parsed_or(
                "FEED_SLOW_THRESHOLD_MS",
                defaults.slow_threshold_ms,
            )?,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Export every regular file in `folder` as an env var named after the file.
/// Variables already present in the environment are left alone.
pub fn load_env_folder(folder: &std::path::Path) {
    if !folder.is_dir() {
        return;
    }

    match std::fs::read_dir(folder) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    if std::env::var(&name).is_err() {
                        std::env::set_var(&name, contents.trim());
                    }
                }
            }
            info!("Loaded configuration from FFOLDER={}", folder.display());
        }
        Err(err) => {
            tracing::warn!("Failed to read FFOLDER {}: {}", folder.display(), err);
        }
    }
}

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable, treating empty values as unset
fn get_env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, rejecting values that are present but malformed
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get_env_opt(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
    }
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // `postgres://` has a colon too; only mask when it belongs to user:pass
            if !url[colon_pos..].starts_with("://") {
                let (before, after) = url.split_at(colon_pos + 1);
                let (_, rest) = after.split_at(at_pos - colon_pos - 1);
                return format!("{}****{}", before, rest);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
                min_connections: 1,
                connect_timeout: Duration::from_secs(5),
                idle_timeout: Duration::from_secs(60),
                max_lifetime: Duration::from_secs(300),
                statement_cache_size: 10,
                run_migrations: false,
            },
            api: ApiConfig {
                port: 8080,
                host: "127.0.0.1".to_string(),
                request_timeout: Duration::from_secs(5),
                max_body_size: 1024,
                metrics_port: 9090,
            },
            auth: AuthConfig {
                jwt_secret: Some("secret".to_string()),
                ..Default::default()
            },
            feed: FeedConfig::default(),
        }
    }

    #[test]
    fn test_mask_url_hides_password() {
        assert_eq!(
            mask_url("postgres://feed:hunter2@db:5432/civic"),
            "postgres://feed:****@db:5432/civic"
        );
        assert_eq!(
            mask_url("postgres://localhost/civic"),
            "postgres://localhost/civic"
        );
        assert_eq!(
            mask_url("postgres://feed@localhost/civic"),
            "postgres://feed@localhost/civic"
        );
    }

    #[test]
    fn test_validate_requires_auth_strategy() {
        let mut config = base_config();
        assert!(config.validate().is_ok());

        config.auth.jwt_secret = None;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { key: "AUTH_JWT_SECRET", .. })
        ));

        config.auth.auth_url = Some("http://auth.local".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_feed_settings() {
        let mut config = base_config();
        config.feed.diversity_cap = 0.0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.feed.default_limit = 500;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.database.min_connections = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_windows() {
        for days in [0, -3, 3651, 10_000_000_000_000] {
            let mut config = base_config();
            config.feed.civic_event_window_days = days;
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidConfig { key: "FEED_CIVIC_EVENT_WINDOW_DAYS", .. })
            ));

            let mut config = base_config();
            config.feed.engagement_window_days = days;
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidConfig { key: "FEED_ENGAGEMENT_WINDOW_DAYS", .. })
            ));
        }

        let mut config = base_config();
        config.feed.civic_event_window_days = 3650;
        config.feed.engagement_window_days = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_civic_boost() {
        for boost in [f64::NAN, f64::INFINITY, -1.2, 0.5] {
            let mut config = base_config();
            config.feed.civic_boost = boost;
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidConfig { key: "FEED_CIVIC_BOOST", .. })
            ));
        }

        let mut config = base_config();
        config.feed.civic_boost = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_defaults() {
        let feed = FeedConfig::default();
        assert_eq!(feed.default_limit, 20);
        assert_eq!(feed.diversity_cap, 0.4);
        assert_eq!(feed.civic_boost, 1.2);
        assert_eq!(feed.civic_event_window_days, 30);
    }
}
