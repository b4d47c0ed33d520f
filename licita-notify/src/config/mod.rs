//! Engine configuration loaded from TOML with environment overrides.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Channel, RetryPolicy};
use crate::logging::LoggingSettings;
use crate::preferences::QuietHoursPolicy;
use crate::providers::{GatewayConfig, SmtpConfig, TelegramConfig};
use crate::queue::QueueSettings;
use crate::rules::{Contact, NotificationRule};
use crate::templates::NotificationTemplate;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub max_concurrent: usize,
    pub tick_interval_ms: u64,
    pub send_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            tick_interval_ms: 5_000,
            send_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_max_attempts: u32,
    pub max_queue_size: usize,
    /// Purge sent and failed jobs older than this on each tick.
    pub finished_retention_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            max_queue_size: 10_000,
            finished_retention_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub smtp: Option<SmtpConfig>,
    pub telegram: Option<TelegramConfig>,
    pub gateways: Vec<GatewayConfig>,
    /// Channels served by the logging provider.
    pub log_channels: Vec<Channel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dispatcher: DispatcherConfig,
    pub queue: QueueConfig,
    pub retry: RetryPolicy,
    pub quiet_hours: QuietHoursPolicy,
    pub logging: LoggingSettings,
    pub providers: ProvidersConfig,
    pub rules: Vec<NotificationRule>,
    pub templates: Vec<NotificationTemplate>,
    /// Seed for the in-memory recipient directory.
    pub contacts: Vec<Contact>,
}

impl EngineConfig {
    /// Read and parse a TOML file. Environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Cannot read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// `LICITA_MAX_CONCURRENT`, `LICITA_TICK_INTERVAL_MS`, `SMTP_HOST`,
    /// `SMTP_PORT`, `SMTP_FROM`, `SMTP_USER`, `SMTP_PASSWORD` and
    /// `TELEGRAM_BOT_TOKEN` are recognised. Blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("LICITA_MAX_CONCURRENT") {
            self.dispatcher.max_concurrent = parse_var("LICITA_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = get("LICITA_TICK_INTERVAL_MS") {
            self.dispatcher.tick_interval_ms = parse_var("LICITA_TICK_INTERVAL_MS", &value)?;
        }

        if let Some(host) = get("SMTP_HOST") {
            match self.providers.smtp.as_mut() {
                Some(smtp) => smtp.host = host,
                None => {
                    let from = get("SMTP_FROM").unwrap_or_default();
                    self.providers.smtp = Some(SmtpConfig::new(host, from));
                }
            }
        }
        if let Some(smtp) = self.providers.smtp.as_mut() {
            if let Some(port) = get("SMTP_PORT") {
                smtp.port = parse_var("SMTP_PORT", &port)?;
            }
            if let Some(from) = get("SMTP_FROM") {
                smtp.from_address = from;
            }
            if let Some(user) = get("SMTP_USER") {
                smtp.username = Some(user);
            }
            if let Some(password) = get("SMTP_PASSWORD") {
                smtp.password = Some(password);
            }
        }

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            match self.providers.telegram.as_mut() {
                Some(telegram) => telegram.bot_token = token,
                None => self.providers.telegram = Some(TelegramConfig::new(token)),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.queue_settings().validate()?;
        if self.dispatcher.tick_interval_ms == 0 {
            return Err(Error::config("dispatcher.tick_interval_ms must be positive"));
        }
        if self.logging.retention_days == 0 {
            return Err(Error::config("logging.retention_days must be at least 1"));
        }
        if let Some(smtp) = &self.providers.smtp
            && (smtp.host.trim().is_empty() || smtp.from_address.trim().is_empty())
        {
            return Err(Error::config("providers.smtp needs host and from_address"));
        }

        let mut template_ids: HashSet<&str> = crate::templates::builtin::ids().collect();
        for template in &self.templates {
            if template.id.trim().is_empty() {
                return Err(Error::config("Template with an empty id"));
            }
            template_ids.insert(template.id.as_str());
        }

        let mut contact_ids = HashSet::new();
        for contact in &self.contacts {
            if contact.user_id.trim().is_empty() || !contact_ids.insert(contact.user_id.as_str()) {
                return Err(Error::config(format!(
                    "Contact user_id {:?} is empty or duplicated",
                    contact.user_id
                )));
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            if !rule.id.is_empty() && !rule_ids.insert(rule.id.as_str()) {
                return Err(Error::config(format!("Duplicate rule id {}", rule.id)));
            }
            rule.validate()?;
            if !template_ids.contains(rule.template.as_str()) {
                return Err(Error::config(format!(
                    "Rule {} references unknown template {}",
                    rule.id, rule.template
                )));
            }
        }
        Ok(())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_concurrent: self.dispatcher.max_concurrent,
            default_max_attempts: self.queue.default_max_attempts,
            max_queue_size: self.queue.max_queue_size,
            send_timeout: Duration::from_secs(self.dispatcher.send_timeout_secs),
            retry: self.retry.clone(),
            quiet_hours: self.quiet_hours.clone(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.dispatcher.tick_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} has an invalid value: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[dispatcher]
max_concurrent = 3
tick_interval_ms = 1000

[retry]
base_delay_ms = 1000
max_delay_ms = 60000

[quiet_hours]
resume_hour = 7

[logging]
filter = "licita_notify=debug"

[providers]
log_channels = ["sms", "dashboard"]

[providers.smtp]
host = "smtp.example.com"
from_address = "alertas@example.com"

[[providers.gateways]]
channel = "whatsapp"
url = "https://gateway.example.com/send"
auth = { type = "Bearer", token = "secret" }

[[templates]]
id = "deadline"
name = "Prazo"
default = { body = "Prazo de {{title}} em {{days}} dias" }

[templates.channels.email]
subject = "Prazo: {{title}}"
body = "O prazo de {{title}} termina em {{days}} dias."

[[rules]]
id = "deadline-near"
event = "deadline.near"
template = "deadline"
channels = ["email", "whatsapp"]
priority = "high"
conditions = [{ field = "days", operator = "less_than", value = 3 }]

[[rules]]
id = "new-opportunity"
event = "opportunity.created"
template = "procurement_alert"
channels = ["email"]

[[contacts]]
user_id = "u1"
email = "u1@example.com"
roles = ["buyer"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.dispatcher.max_concurrent, 3);
        assert_eq!(config.dispatcher.send_timeout_secs, 30);
        assert_eq!(config.queue.default_max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.quiet_hours.resume_hour, 7);
        assert_eq!(config.quiet_hours.exempt_channels, vec![Channel::Email, Channel::Dashboard]);
        assert_eq!(config.providers.log_channels, vec![Channel::Sms, Channel::Dashboard]);
        assert_eq!(config.providers.smtp.as_ref().unwrap().port, 587);
        assert_eq!(config.providers.gateways[0].channel, Channel::Whatsapp);
        assert_eq!(config.templates[0].channels.len(), 1);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].conditions.len(), 1);
        assert_eq!(config.contacts[0].email.as_deref(), Some("u1@example.com"));

        let settings = config.queue_settings();
        assert_eq!(settings.max_concurrent, 3);
        assert_eq!(settings.send_timeout, Duration::from_secs(30));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = EngineConfig::default();
        config.dispatcher.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retry = RetryPolicy::new(10_000, 1_000);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.quiet_hours.resume_hour = 24;
        assert!(config.validate().is_err());

        let config = EngineConfig::from_toml_str(
            r#"
[[rules]]
id = "a"
event = "x"
template = "missing"
channels = ["email"]
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = EngineConfig::from_toml_str(
            r#"
[[rules]]
id = "a"
event = "x"
template = "legal_alert"
channels = ["email"]

[[rules]]
id = "a"
event = "y"
template = "legal_alert"
channels = ["email"]
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate rule id a"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LICITA_MAX_CONCURRENT", "8"),
            ("SMTP_HOST", "mail.internal"),
            ("SMTP_FROM", "noreply@licita.example"),
            ("SMTP_PORT", "2525"),
            ("SMTP_PASSWORD", "hunter2"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("LICITA_TICK_INTERVAL_MS", " "),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.dispatcher.max_concurrent, 8);
        assert_eq!(config.dispatcher.tick_interval_ms, 5_000);
        let smtp = config.providers.smtp.unwrap();
        assert_eq!(smtp.host, "mail.internal");
        assert_eq!(smtp.from_address, "noreply@licita.example");
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.password.as_deref(), Some("hunter2"));
        assert_eq!(config.providers.telegram.unwrap().bot_token, "123:abc");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides_from(|key| (key == "LICITA_MAX_CONCURRENT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licita.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.rules[1].id, "new-opportunity");

        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
