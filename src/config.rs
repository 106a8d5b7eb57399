use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub questchain: QuestchainConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Questchain-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuestchainConfig {
    /// SQLite mirror of the world database. Must already exist.
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Chain resolution limits
#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    /// Maximum candidate starters traced per zone request.
    #[serde(default = "default_max_starters")]
    pub max_starters: usize,
    /// How many candidate walks may be in flight at once.
    #[serde(default = "default_trace_concurrency")]
    pub trace_concurrency: usize,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            max_starters: default_max_starters(),
            trace_concurrency: default_trace_concurrency(),
        }
    }
}

/// World store tuning
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// 0 disables the quest record cache.
    #[serde(default)]
    pub record_cache_capacity: usize,
    #[serde(default = "default_record_cache_ttl_secs")]
    pub record_cache_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            record_cache_capacity: 0,
            record_cache_ttl_secs: default_record_cache_ttl_secs(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: vec![],
        }
    }
}

fn default_max_starters() -> usize {
    100
}

fn default_trace_concurrency() -> usize {
    8
}

fn default_query_timeout_ms() -> u64 {
    2000
}

fn default_record_cache_ttl_secs() -> u64 {
    300
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in QUESTCHAIN_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("QUESTCHAIN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml_str(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without touching the filesystem or validating paths.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.questchain.db_path.is_file() {
            anyhow::bail!(
                "db_path does not exist or is not a file: {}. Point questchain.db_path at the world database mirror.",
                self.questchain.db_path.display()
            );
        }

        if self.chains.max_starters == 0 {
            anyhow::bail!("chains.max_starters must be greater than 0");
        }

        if self.chains.trace_concurrency == 0 {
            anyhow::bail!("chains.trace_concurrency must be greater than 0");
        }

        if self.store.query_timeout_ms == 0 {
            anyhow::bail!("store.query_timeout_ms must be greater than 0");
        }

        if self.store.record_cache_capacity > 0 && self.store.record_cache_ttl_secs == 0 {
            anyhow::bail!("store.record_cache_ttl_secs must be greater than 0 when the record cache is enabled");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.questchain.db_path
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.store.query_timeout_ms)
    }

    pub fn record_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.store.record_cache_ttl_secs)
    }
}
