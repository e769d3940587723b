use crate::traits::error::{GatewayError, Result};
use async_trait::async_trait;
use hyperrest::RateLimitedClient;

/// Looks up the base gateway URL
#[async_trait]
pub trait GatewayLocator: Send + Sync {
    async fn locate(&self) -> Result<String>;
}

/// Discovery through the REST API's `gateway` resource
#[async_trait]
impl GatewayLocator for RateLimitedClient {
    async fn locate(&self) -> Result<String> {
        let body = self.get("gateway").await?;
        body.get("url")
            .and_then(|url| url.as_str())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Discovery("response has no url field".to_string()))
    }
}

/// Always resolves to the same URL
#[derive(Debug, Clone)]
pub struct StaticLocator {
    url: String,
}

impl StaticLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayLocator for StaticLocator {
    async fn locate(&self) -> Result<String> {
        Ok(self.url.clone())
    }
}
