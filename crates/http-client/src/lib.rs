use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

mod canned;

pub use canned::CannedResponses;

/// Connection settings for a device that answers over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Scheme and host, e.g. `http://192.168.1.20`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1".to_string(),
            username: None,
            password: None,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("no response configured for {0}")]
    NotFound(String),
}

/// Anything that can answer the requests a device family issues.
#[async_trait]
pub trait HttpSource: Send + Sync {
    async fn get_text(&self, path: &str) -> Result<String, HttpError>;

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, HttpError>;
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    config: HttpConfig,
    client: Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response, HttpError> {
        let response = self.authorize(request).send().await.map_err(|err| {
            warn!(url, error = %err, "http request error");
            HttpError::Request(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "http request rejected");
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(url, status = status.as_u16(), "http request ok");
        Ok(response)
    }
}

#[async_trait]
impl HttpSource for HttpClient {
    async fn get_text(&self, path: &str) -> Result<String, HttpError> {
        let url = self.url(path);
        let response = self.send(&url, self.client.get(&url)).await?;
        Ok(response.text().await?)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, HttpError> {
        let url = self.url(path);
        let response = self.send(&url, self.client.post(&url).json(body)).await?;
        Ok(response.json::<Value>().await?)
    }
}
