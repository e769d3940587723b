use std::time::Duration;

/// Default API base (versioned)
pub const DEFAULT_BASE_URL: &str = "https://discordapp.com/api/v6";

/// Configuration for the rate-limited REST client
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Versioned API base URL
    pub base_url: String,
    /// Value of the Authorization header
    pub token: String,
    pub user_agent: String,
    /// Lifetime of cached GET responses
    pub cache_ttl: Duration,
    /// Additional attempts after a transient (502/525) response
    pub max_transient_retries: usize,
    /// Fixed pause between transient retries
    pub transient_retry_delay: Duration,
    /// Throttle delay used when a 429 carries no retry hint
    pub default_retry_after: Duration,
}

impl RestConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            user_agent: format!("corduroy/{}", env!("CARGO_PKG_VERSION")),
            cache_ttl: Duration::from_secs(300),
            max_transient_retries: 3,
            transient_retry_delay: Duration::from_millis(100),
            default_retry_after: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_transient_retries(mut self, retries: usize, delay: Duration) -> Self {
        self.max_transient_retries = retries;
        self.transient_retry_delay = delay;
        self
    }
}
