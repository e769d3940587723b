use std::time::Duration;

/// Gateway URL used when discovery fails
pub const DEFAULT_FALLBACK_GATEWAY: &str = "wss://gateway.discord.gg";

/// Protocol version requested in the gateway query string
pub const DEFAULT_GATEWAY_VERSION: u8 = 6;

/// Session configuration
///
/// Everything the session needs besides its collaborators. Durations default
/// to the values the gateway documents: 60s for unavailable guilds, a 5s chunk
/// check, 1s between member requests and 50 guilds per request.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Credential sent in Identify and Resume
    pub token: String,
    /// `(shard_id, shard_count)`, sent in Identify when set
    pub shard: Option<(u32, u32)>,
    /// Store private channels listed in READY
    pub pm_channels: bool,
    /// Request the full member list of large guilds before readiness
    pub load_all_members: bool,
    /// Ask the gateway for zlib-compressed payloads
    pub compress: bool,
    pub gateway_version: u8,
    pub encoding: String,
    pub fallback_gateway_url: String,
    /// How long to wait for guilds listed as unavailable in READY
    pub unavailable_guild_timeout: Duration,
    /// Period of the supervisory chunk check
    pub chunk_check_interval: Duration,
    /// Minimum spacing between member requests
    pub chunk_stagger: Duration,
    /// Guild IDs per member request
    pub chunk_batch_size: usize,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            shard: None,
            pm_channels: false,
            load_all_members: false,
            compress: true,
            gateway_version: DEFAULT_GATEWAY_VERSION,
            encoding: "json".to_string(),
            fallback_gateway_url: DEFAULT_FALLBACK_GATEWAY.to_string(),
            unavailable_guild_timeout: Duration::from_secs(60),
            chunk_check_interval: Duration::from_secs(5),
            chunk_stagger: Duration::from_secs(1),
            chunk_batch_size: 50,
        }
    }

    /// Full connection URL for a discovered base URL
    pub fn gateway_url(&self, base: &str) -> String {
        format!(
            "{}/?v={}&encoding={}",
            base.trim_end_matches('/'),
            self.gateway_version,
            self.encoding
        )
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.token.trim().is_empty() {
            return Err(crate::GatewayError::Configuration("token must not be empty".to_string()));
        }
        if let Some((id, count)) = self.shard {
            if count == 0 || id >= count {
                return Err(crate::GatewayError::Configuration(format!(
                    "invalid shard [{}, {}]",
                    id, count
                )));
            }
        }
        if self.chunk_batch_size == 0 {
            return Err(crate::GatewayError::Configuration(
                "chunk_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
