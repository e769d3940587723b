use crate::core::config::RestConfig;
use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

/// Production transport over `reqwest`
pub struct ReqwestTransport {
    base_url: String,
    token: String,
    user_agent: String,
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RestError::Configuration(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = self.url_for(&request.path);
        debug!("{} {}", request.method, url);

        let mut req = self
            .client
            .request(request.method.clone(), &url)
            .header("Authorization", &self.token)
            .header("User-Agent", &self.user_agent);

        if !request.options.query.is_empty() {
            req = req.query(&request.options.query);
        }
        for (key, value) in &request.options.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(ref body) = request.options.json {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
