//! Email delivery via SMTP.
//!
//! [`SmtpProvider`] wraps the `lettre` async SMTP transport. Each message is
//! sent as `multipart/alternative` with the plain text and an HTML rendering
//! in the platform's mail frame.

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChannelProvider, SendRequest, SendResult};
use crate::domain::Channel;
use crate::{Error, Result};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Subject used when the template gives none.
const DEFAULT_SUBJECT: &str = "Nova Oportunidade de Licitação - Plataforma IA";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS. Disable only for local mail catchers.
    #[serde(default = "default_true")]
    pub starttls: bool,
}

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_true() -> bool {
    true
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            from_address: from_address.into(),
            username: None,
            password: None,
            starttls: true,
        }
    }
}

pub struct SmtpProvider {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        crate::utils::http_client::install_rustls_provider();

        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| Error::config(format!("Invalid SMTP from address: {}", e)))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::config(format!("Invalid SMTP relay {}: {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    fn build_message(&self, request: &SendRequest) -> Result<Message> {
        let to: Mailbox = request
            .to
            .parse()
            .map_err(|e| Error::provider(format!("Invalid recipient {}: {}", request.to, e)))?;
        let subject = request.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                request.content.clone(),
                html_frame(&request.content),
            ))
            .map_err(|e| Error::provider(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl ChannelProvider for SmtpProvider {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendResult> {
        let message = self.build_message(request)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| Error::provider(format!("SMTP send failed: {}", e)))?;

        let provider_id = response.first_line().map(str::to_string);
        debug!(job_id = %request.job_id, code = %response.code(), "SMTP server accepted message");
        info!(job_id = %request.job_id, to = %request.to, "Notification email sent");
        Ok(SendResult::accepted(provider_id))
    }
}

/// Wrap plain text in the platform's HTML mail frame.
fn html_frame(content: &str) -> String {
    let sent_at = Utc::now()
        .with_timezone(&chrono_tz::America::Sao_Paulo)
        .format("%d/%m/%Y %H:%M:%S");
    format!(
        r#"<html>
<body>
    <h2>&#127970; Nova Oportunidade de Licitação</h2>
    <div style="background-color: #f0f8ff; padding: 20px; border-radius: 5px;">
        <p>{}</p>
    </div>
    <hr>
    <p><small>Enviado pela Plataforma de Licitações com IA Jurídica</small></p>
    <p><small>Data/Hora: {}</small></p>
</body>
</html>"#,
        escape_html(content).replace('\n', "<br>\n"),
        sent_at
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotificationPriority;

    fn provider() -> SmtpProvider {
        SmtpProvider::new(SmtpConfig::new("localhost", "alertas@licita.example")).unwrap()
    }

    fn request(to: &str) -> SendRequest {
        SendRequest {
            job_id: "j1".into(),
            channel: Channel::Email,
            priority: NotificationPriority::High,
            to: to.into(),
            subject: None,
            content: "Pregão <12/2026>\nAbertura amanhã".into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_invalid_from_address() {
        let config = SmtpConfig::new("localhost", "not-an-email");
        assert!(SmtpProvider::new(config).is_err());
    }

    #[test]
    fn test_build_message_defaults_subject() {
        let message = provider().build_message(&request("user@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject:"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_build_message_invalid_recipient() {
        let err = provider().build_message(&request("nobody")).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn test_html_frame_escapes_and_breaks_lines() {
        let html = html_frame("a <b> & c\nd");
        assert!(html.contains("a &lt;b&gt; &amp; c<br>\nd"));
        assert!(html.contains("Plataforma de Licitações com IA Jurídica"));
    }
}
