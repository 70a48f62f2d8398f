//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// The remote music controller this bridge fronts. When absent, artwork
    /// routes answer 404 and no relay task is started.
    #[serde(default)]
    pub origin: Option<OriginConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    pub host: String,
    #[serde(default = "default_origin_port")]
    pub port: u16,
}

fn default_origin_port() -> u16 {
    7766
}

impl OriginConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// In-memory entry lifetime in seconds
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_secs: u64,

    /// In-memory entry cap
    #[serde(default = "default_memory_max")]
    pub memory_max_entries: usize,

    /// Optional on-disk record lifetime in seconds; unset = no expiry
    #[serde(default)]
    pub disk_ttl_secs: Option<u64>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".storage/artwork_cache")
}

fn default_memory_ttl() -> u64 {
    300
}

fn default_memory_max() -> usize {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            memory_ttl_secs: default_memory_ttl(),
            memory_max_entries: default_memory_max(),
            disk_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Reconnect backoff cap in seconds (doubles from 1 up to this)
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

fn default_backoff_max() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backoff_max_secs: default_backoff_max(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let config = ::config::Config::builder()
        // Start with defaults
        .set_default("port", 3000)?
        // Load from config file if it exists
        .add_source(::config::File::with_name("config").required(false))
        // Override with environment variables (MCB_PORT, MCB_ORIGIN__HOST, etc.)
        .add_source(
            ::config::Environment::with_prefix("MCB")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
