//! YAML configuration for the gateway binaries
//!
//! Session tuning lives in the YAML file; the token is read from the
//! environment (`GATEWAY_TOKEN`, `.env` supported) and never from YAML.

use hypergate::states::HasToken;
use hypergate::{
    ExponentialBackoff, FixedDelay, GatewayClientBuilder, GatewayConfig, Immediate,
    NeverReconnect, ReconnectionStrategy,
};
use hyperrest::{RateLimitedClient, RestConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable holding the gateway token
pub const TOKEN_ENV_VAR: &str = "GATEWAY_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Failed to create REST client: {0}")]
    RestClient(#[from] hyperrest::RestError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Gateway client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub rest: RestSettings,
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Token from .env (not in YAML)
    #[serde(skip)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// `[shard_id, shard_count]`
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    #[serde(default)]
    pub pm_channels: bool,
    #[serde(default)]
    pub load_all_members: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default = "default_unavailable_guild_timeout")]
    pub unavailable_guild_timeout_secs: u64,
    #[serde(default = "default_chunk_check_interval")]
    pub chunk_check_interval_secs: u64,
    #[serde(default = "default_chunk_stagger")]
    pub chunk_stagger_ms: u64,
    #[serde(default = "default_chunk_batch_size")]
    pub chunk_batch_size: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            shard: None,
            pm_channels: false,
            load_all_members: false,
            compress: true,
            fallback_url: None,
            unavailable_guild_timeout_secs: default_unavailable_guild_timeout(),
            chunk_check_interval_secs: default_chunk_check_interval(),
            chunk_stagger_ms: default_chunk_stagger(),
            chunk_batch_size: default_chunk_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectKind {
    #[default]
    Immediate,
    Fixed,
    Exponential,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub strategy: ReconnectKind,
    /// Fixed delay, or the initial delay for exponential backoff
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectKind::default(),
            delay_ms: default_reconnect_delay(),
            max_delay_ms: default_reconnect_max_delay(),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn strategy(&self) -> Box<dyn ReconnectionStrategy> {
        let delay = Duration::from_millis(self.delay_ms);
        match self.strategy {
            ReconnectKind::Immediate => Box::new(Immediate),
            ReconnectKind::Fixed => Box::new(FixedDelay::new(delay, self.max_attempts)),
            ReconnectKind::Exponential => Box::new(ExponentialBackoff::new(
                delay,
                Duration::from_millis(self.max_delay_ms),
                self.max_attempts,
            )),
            ReconnectKind::Never => Box::new(NeverReconnect),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_unavailable_guild_timeout() -> u64 {
    60
}

fn default_chunk_check_interval() -> u64 {
    5
}

fn default_chunk_stagger() -> u64 {
    1000
}

fn default_chunk_batch_size() -> usize {
    50
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_reconnect_max_delay() -> u64 {
    60_000
}

impl ClientConfig {
    /// Load configuration from a YAML file, token from the environment
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| ConfigError::EnvVarMissing(TOKEN_ENV_VAR.to_string()))?;

        Self::from_yaml_str(&yaml_content, token)
    }

    /// Parse and validate configuration with an explicit token
    pub fn from_yaml_str(yaml: &str, token: impl Into<String>) -> Result<Self> {
        let mut config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.token = token.into();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} must not be empty", TOKEN_ENV_VAR)));
        }

        if let Some([id, count]) = self.gateway.shard {
            if count == 0 || id >= count {
                return Err(ConfigError::ValidationError(format!(
                    "shard id {} must be less than shard count {}",
                    id, count
                )));
            }
        }

        if self.gateway.chunk_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_batch_size must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let settings = &self.gateway;
        let mut config = GatewayConfig::new(self.token.clone());
        config.shard = settings.shard.map(|[id, count]| (id, count));
        config.pm_channels = settings.pm_channels;
        config.load_all_members = settings.load_all_members;
        config.compress = settings.compress;
        if let Some(url) = &settings.fallback_url {
            config.fallback_gateway_url = url.clone();
        }
        config.unavailable_guild_timeout = Duration::from_secs(settings.unavailable_guild_timeout_secs);
        config.chunk_check_interval = Duration::from_secs(settings.chunk_check_interval_secs);
        config.chunk_stagger = Duration::from_millis(settings.chunk_stagger_ms);
        config.chunk_batch_size = settings.chunk_batch_size;
        config
    }

    pub fn rest_config(&self) -> RestConfig {
        let mut config = RestConfig::new(self.token.clone());
        if let Some(base_url) = &self.rest.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(ttl) = self.rest.cache_ttl_secs {
            config = config.with_cache_ttl(Duration::from_secs(ttl));
        }
        config
    }

    /// Gateway client builder wired with this configuration
    ///
    /// Discovery goes through a REST client built from the `rest` section.
    pub fn builder(&self) -> Result<GatewayClientBuilder<HasToken>> {
        let rest = RateLimitedClient::new(self.rest_config())?;
        Ok(GatewayClientBuilder::from_config(self.gateway_config())
            .reconnect_strategy(self.reconnect.strategy())
            .locator(Arc::new(rest)))
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        match self.gateway.shard {
            Some([id, count]) => info!("  Shard: {}/{}", id, count),
            None => info!("  Shard: none"),
        }
        info!("  Load all members: {}", self.gateway.load_all_members);
        info!("  Private channels: {}", self.gateway.pm_channels);
        info!("  Compression: {}", self.gateway.compress);
        info!("  Reconnect strategy: {:?}", self.reconnect.strategy);
        info!("  Log level: {}", self.log_level);
    }
}
