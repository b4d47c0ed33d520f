//! Channel providers.
//!
//! A provider is the transport behind one channel:
//! - Email over SMTP
//! - Telegram Bot API
//! - Generic HTTP gateways (SMS, WhatsApp, push)
//! - Log-only delivery (simulated SMS, dashboard)
//! - In-memory capture

mod email;
mod gateway;
mod log;
mod memory;
mod telegram;

pub use email::{SmtpConfig, SmtpProvider};
pub use gateway::{GatewayAuth, GatewayConfig, HttpGatewayProvider};
pub use log::LogProvider;
pub use memory::MemoryProvider;
pub use telegram::{TelegramConfig, TelegramProvider};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::domain::{Channel, NotificationPriority};
use crate::queue::NotificationJob;

/// What a provider is asked to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub job_id: String,
    pub channel: Channel,
    pub priority: NotificationPriority,
    pub to: String,
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SendRequest {
    pub fn from_job(job: &NotificationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            channel: job.channel,
            priority: job.priority,
            to: job.payload.to.clone(),
            subject: job.payload.subject.clone(),
            content: job.payload.content.clone(),
            metadata: job.payload.metadata.clone(),
        }
    }
}

/// Provider verdict for one send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    /// Provider-side message id, if any.
    pub provider_id: Option<String>,
    pub error: Option<String>,
    /// The provider confirmed final delivery, not just acceptance.
    #[serde(default)]
    pub delivered: bool,
}

impl SendResult {
    pub fn accepted(provider_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_id,
            error: None,
            delivered: false,
        }
    }

    pub fn delivered(provider_id: Option<String>) -> Self {
        Self {
            delivered: true,
            ..Self::accepted(provider_id)
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_id: None,
            error: Some(error.into()),
            delivered: false,
        }
    }
}

/// Transport for one channel.
///
/// Returning `Ok` with `success == false` and returning `Err` are both
/// treated as a retryable failure by the dispatcher.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// The channel this provider serves.
    fn channel(&self) -> Channel;

    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, request: &SendRequest) -> Result<SendResult>;
}

/// Providers keyed by channel.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<Channel, Arc<dyn ChannelProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for its channel, returning the provider it replaced.
    pub fn register(&self, provider: Arc<dyn ChannelProvider>) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.write().insert(provider.channel(), provider)
    }

    pub fn remove(&self, channel: Channel) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.write().remove(&channel)
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.read().get(&channel).cloned()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.providers.read().contains_key(&channel)
    }

    /// Channels with a provider, sorted.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.providers.read().keys().copied().collect();
        channels.sort();
        channels
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
