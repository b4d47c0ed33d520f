//! Log-only delivery.

use async_trait::async_trait;
use tracing::info;

use super::{ChannelProvider, SendRequest, SendResult};
use crate::Result;
use crate::domain::Channel;

/// SMS previews keep this many characters of the message.
const SMS_PREVIEW_CHARS: usize = 100;

/// Writes the message to the log and reports success.
///
/// Stands in for channels without a real transport (simulated SMS, the
/// dashboard feed) and for dry runs.
#[derive(Debug, Clone)]
pub struct LogProvider {
    channel: Channel,
}

impl LogProvider {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// The text that would have been sent.
    pub fn format(&self, request: &SendRequest) -> String {
        match self.channel {
            Channel::Sms => {
                let preview: String = request.content.chars().take(SMS_PREVIEW_CHARS).collect();
                format!("LICITACAO: {}... Acesse a plataforma para detalhes.", preview)
            }
            _ => match &request.subject {
                Some(subject) => format!("{}\n\n{}", subject, request.content),
                None => request.content.clone(),
            },
        }
    }
}

#[async_trait]
impl ChannelProvider for LogProvider {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResult> {
        let text = self.format(request);
        info!(
            job_id = %request.job_id,
            channel = %self.channel,
            to = %request.to,
            "Simulated delivery: {}",
            text
        );
        Ok(SendResult::accepted(Some(format!("log-{}", request.job_id))))
    }
}
