//! Telegram Bot API provider.
//!
//! Sends messages via `POST /bot<token>/sendMessage`. The job's `to` is the
//! chat id. Handles 429 rate limits by respecting `parameters.retry_after`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{ChannelProvider, SendRequest, SendResult};
use crate::domain::Channel;
use crate::utils::truncate_chars;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Parse mode for message formatting (HTML, Markdown, MarkdownV2).
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_parse_mode() -> String {
    "Markdown".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            parse_mode: default_parse_mode(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }
}

pub struct TelegramProvider {
    config: TelegramConfig,
    client: Client,
}

impl TelegramProvider {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(Error::config("Telegram bot token is empty"));
        }
        let client =
            crate::utils::http_client::build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn build_message(&self, request: &SendRequest) -> String {
        let text = match &request.subject {
            Some(subject) if self.config.parse_mode == "HTML" => {
                format!("<b>{}</b>\n\n{}", subject, request.content)
            }
            Some(subject) => format!("*{}*\n\n{}", subject, request.content),
            None => request.content.clone(),
        };
        truncate_chars(&text, TELEGRAM_MESSAGE_LIMIT, "\n\n[truncated]")
    }

    /// Send with rate-limit handling. Non-429 HTTP errors become a failed result.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<SendResult> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::provider(format!("Telegram request failed: {}", e)))?;

            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();

            if status.is_success() {
                let message_id = body
                    .get("result")
                    .and_then(|r| r.get("message_id"))
                    .and_then(|v| v.as_i64())
                    .map(|id| id.to_string());
                return Ok(SendResult::accepted(message_id));
            }

            if status.as_u16() == 429 {
                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Ok(SendResult::failure(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let description = body
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            warn!("Telegram sendMessage failed: {} - {}", status, description);
            return Ok(SendResult::failure(format!(
                "Telegram sendMessage failed: {} - {}",
                status, description
            )));
        }
    }
}

#[async_trait]
impl ChannelProvider for TelegramProvider {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResult> {
        let payload = json!({
            "chat_id": request.to,
            "text": self.build_message(request),
            "parse_mode": self.config.parse_mode,
        });

        let result = self.send_with_retry(&payload).await?;
        debug!(job_id = %request.job_id, success = result.success, "Telegram send finished");
        Ok(result)
    }
}
