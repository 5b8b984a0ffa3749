//! Configuration management for the StreamHub engine
//!
//! Strongly-typed configuration built once at startup from environment variables
//! (and an optional `.env` file), validated, and then passed explicitly into the
//! components that need it. Nothing reads the environment after `from_env`.
//!
//! # Example
//! ```no_run
//! use streamhub::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Listening on {}:{}", config.api.host, config.api.port);
//! ```

use crate::error::{Error, Result};
use crate::feed::TrendingWeights;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which store backend serves requests
    pub store: StoreBackend,
    /// Database configuration
    pub database: DatabaseConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Cloud media storage configuration
    pub media: MediaConfig,
    /// Feed and listing configuration
    pub feed: FeedConfig,
    /// Prometheus exporter port (only used with the `prometheus` feature)
    pub metrics_port: u16,
}

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store, for development without a database
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::InvalidConfig {
                key: "STORE_BACKEND",
                message: format!("unknown backend '{}'", other).into(),
            }),
        }
    }
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
    /// Prepared statement cache size per connection
    pub statement_cache_size: usize,
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
    /// Maximum request body size (uploads included)
    pub max_body_size: usize,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

/// Cloud media storage configuration
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// API root, overridable for tests and proxies
    pub base_url: String,
    /// Folder uploads are grouped under
    pub folder: String,
    /// Per-request timeout (video uploads can be slow)
    pub timeout: Duration,
}

/// Feed, listing and ranking configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Page size for `/content` when `limit` is absent
    pub default_feed_page_size: i64,
    /// Page size for owner listings, comments, history
    pub default_list_page_size: i64,
    /// Upper bound applied to every requested page size
    pub max_page_size: i64,
    pub trending_weights: TrendingWeights,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            request_timeout: Duration::from_secs(30),
            max_body_size: 512 * 1024 * 1024,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_feed_page_size: 20,
            default_list_page_size: 10,
            max_page_size: 100,
            trending_weights: TrendingWeights::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let store: StoreBackend = get_env_or("STORE_BACKEND", "postgres").parse()?;

        let config = Self {
            store,
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            media: MediaConfig::from_env(store)?,
            feed: FeedConfig::from_env()?,
            metrics_port: get_env_or("METRICS_PORT", "9000").parse().unwrap_or(9000),
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.database.max_connections < self.database.min_connections {
            return Err(Error::InvalidConfig {
                key: "DB_MAX_CONNECTIONS",
                message: "max_connections must be >= min_connections".into(),
            });
        }

        self.feed.validate()?;

        if self.store == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err(Error::MissingEnvVar {
                var: "DATABASE_URL",
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Store backend: {:?}", self.store);
        if self.store == StoreBackend::Postgres {
            info!("  Database:");
            info!("    URL: {}", mask_url(&self.database.url));
            info!(
                "    Pool Size: {}-{}",
                self.database.min_connections, self.database.max_connections
            );
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("    Max body size: {} bytes", self.api.max_body_size);
        info!("  Media:");
        info!("    Cloud: {}", self.media.cloud_name);
        info!("    Folder: {}", self.media.folder);
        info!("  Feed:");
        info!(
            "    Page sizes: feed={}, list={}, max={}",
            self.feed.default_feed_page_size,
            self.feed.default_list_page_size,
            self.feed.max_page_size
        );
        info!("    Trending weights: {:?}", self.feed.trending_weights);
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: get_env_or("DATABASE_URL", ""),
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "20").parse().unwrap_or(20),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "2").parse().unwrap_or(2),
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
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_or("API_PORT", "8000").parse().unwrap_or(8000),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            max_body_size: get_env_or("API_MAX_BODY_SIZE", "536870912")
                .parse()
                .unwrap_or(512 * 1024 * 1024),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

impl MediaConfig {
    fn from_env(store: StoreBackend) -> Result<Self> {
        // Credentials are only optional for local development on the memory store
        let credential = |key: &'static str| -> Result<String> {
            match store {
                StoreBackend::Postgres => get_env(key),
                StoreBackend::Memory => Ok(get_env_or(key, "")),
            }
        };

        Ok(Self {
            cloud_name: credential("CLOUDINARY_CLOUD_NAME")?,
            api_key: credential("CLOUDINARY_API_KEY")?,
            api_secret: credential("CLOUDINARY_API_SECRET")?,
            base_url: get_env_or("CLOUDINARY_BASE_URL", "https://api.cloudinary.com"),
            folder: get_env_or("CLOUDINARY_FOLDER", "video-uploads"),
            timeout: Duration::from_secs(
                get_env_or("CLOUDINARY_TIMEOUT_SECS", "300")
                    .parse()
                    .unwrap_or(300),
            ),
        })
    }
}

impl FeedConfig {
    fn from_env() -> Result<Self> {
        let defaults = TrendingWeights::default();
        Ok(Self {
            default_feed_page_size: get_env_parsed_or("FEED_DEFAULT_PAGE_SIZE", 20)?,
            default_list_page_size: get_env_parsed_or("LIST_DEFAULT_PAGE_SIZE", 10)?,
            max_page_size: get_env_parsed_or("FEED_MAX_PAGE_SIZE", 100)?,
            trending_weights: TrendingWeights {
                views: get_env_parsed_or("FEED_TRENDING_W_VIEWS", defaults.views)?,
                likes: get_env_parsed_or("FEED_TRENDING_W_LIKES", defaults.likes)?,
                comments: get_env_parsed_or("FEED_TRENDING_W_COMMENTS", defaults.comments)?,
                shares: get_env_parsed_or("FEED_TRENDING_W_SHARES", defaults.shares)?,
            },
        })
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("FEED_DEFAULT_PAGE_SIZE", self.default_feed_page_size),
            ("LIST_DEFAULT_PAGE_SIZE", self.default_list_page_size),
            ("FEED_MAX_PAGE_SIZE", self.max_page_size),
        ] {
            if value < 1 {
                return Err(Error::InvalidConfig {
                    key,
                    message: "page sizes must be positive".into(),
                });
            }
        }

        let w = &self.trending_weights;
        if [w.views, w.likes, w.comments, w.shares]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(Error::InvalidConfig {
                key: "FEED_TRENDING_W_*",
                message: "trending weights must be finite and non-negative".into(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable; a present but malformed value is an error
fn get_env_parsed_or<T>(key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgres://" has a colon too; only mask when it sits after the scheme
            if url[colon_pos..].starts_with("://") {
                return url.to_string();
            }
            return format!("{}****{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_url_hides_password() {
        assert_eq!(
            mask_url("postgres://app:secret@db:5432/streamhub"),
            "postgres://app:****@db:5432/streamhub"
        );
        assert_eq!(
            mask_url("postgres://app@db/streamhub"),
            "postgres://app@db/streamhub"
        );
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_feed_config_validation() {
        assert!(FeedConfig::default().validate().is_ok());

        let mut config = FeedConfig::default();
        config.max_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.trending_weights.shares = -1.0;
        assert!(config.validate().is_err());
    }
}
