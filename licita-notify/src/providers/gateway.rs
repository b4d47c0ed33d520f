//! Generic HTTP gateway provider for SMS, WhatsApp and push services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{ChannelProvider, SendRequest, SendResult};
use crate::domain::Channel;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub channel: Channel,
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub auth: Option<GatewayAuth>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

impl GatewayConfig {
    pub fn new(channel: Channel, url: impl Into<String>) -> Self {
        Self {
            channel,
            url: url.into(),
            method: default_method(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Posts each message as JSON to a gateway URL.
///
/// Any 2xx is success; an `id` or `message_id` field in the response body
/// becomes the provider id.
pub struct HttpGatewayProvider {
    config: GatewayConfig,
    client: Client,
}

impl HttpGatewayProvider {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config(format!("Gateway URL for {} is empty", config.channel)));
        }
        let client =
            crate::utils::http_client::build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        match &self.config.auth {
            Some(GatewayAuth::Bearer { token }) => {
                if let Ok(value) = format!("Bearer {}", token).parse() {
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
            }
            Some(GatewayAuth::Header { name, value }) => {
                if let (Ok(name), Ok(value)) = (
                    name.parse::<reqwest::header::HeaderName>(),
                    value.parse::<reqwest::header::HeaderValue>(),
                ) {
                    headers.insert(name, value);
                }
            }
            // Basic auth goes through the request builder.
            Some(GatewayAuth::Basic { .. }) | None => {}
        }

        headers
    }

    fn build_payload(&self, request: &SendRequest) -> serde_json::Value {
        json!({
            "job_id": request.job_id,
            "channel": request.channel,
            "priority": request.priority,
            "to": request.to,
            "subject": request.subject,
            "content": request.content,
            "metadata": request.metadata,
        })
    }
}

#[async_trait]
impl ChannelProvider for HttpGatewayProvider {
    fn channel(&self) -> Channel {
        self.config.channel
    }

    fn name(&self) -> &str {
        "http-gateway"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResult> {
        let mut builder = match self.config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&self.config.url),
            _ => self.client.post(&self.config.url),
        };
        builder = builder
            .headers(self.build_headers())
            .json(&self.build_payload(request));
        if let Some(GatewayAuth::Basic { username, password }) = &self.config.auth {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::provider(format!("Gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(job_id = %request.job_id, "Gateway failed: {} - {}", status, body);
            return Ok(SendResult::failure(format!("Gateway failed: {} - {}", status, body)));
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let provider_id = body
            .get("id")
            .or_else(|| body.get("message_id"))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        debug!(job_id = %request.job_id, channel = %self.config.channel, "Gateway accepted message");
        Ok(SendResult::accepted(provider_id))
    }
}
