//! Notification rule definitions.

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use crate::domain::{Channel, NotificationPriority};
use crate::{Error, Result};

/// Throttle window used when a rule sets `throttle` without a period.
pub const DEFAULT_THROTTLE_PERIOD_SECS: u64 = 3600;

/// Who receives the jobs a rule creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    /// The user the event was triggered for.
    User,
    /// Every user holding one of `targets` as a role.
    Role,
    /// An explicit list of user ids or raw addresses.
    Custom,
    /// Every known user.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSpec {
    #[serde(rename = "type")]
    pub kind: RecipientKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl RecipientSpec {
    pub fn user() -> Self {
        Self {
            kind: RecipientKind::User,
            targets: Vec::new(),
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RecipientKind::Role,
            targets: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn custom<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RecipientKind::Custom,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all() -> Self {
        Self {
            kind: RecipientKind::All,
            targets: Vec::new(),
        }
    }
}

impl Default for RecipientSpec {
    fn default() -> Self {
        Self::user()
    }
}

/// Maps an event plus conditions to a template, channels and recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    /// Generated when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub event: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub template: String,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub priority: NotificationPriority,
    /// Seconds to wait before the jobs become eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Maximum jobs this rule may create per throttle period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle_period: Option<u64>,
    #[serde(default)]
    pub recipients: RecipientSpec,
    /// Preference category; derived from the event name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl NotificationRule {
    pub fn new(
        id: impl Into<String>,
        event: impl Into<String>,
        template: impl Into<String>,
        channels: Vec<Channel>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            event: event.into(),
            conditions: Vec::new(),
            template: template.into(),
            channels,
            priority: NotificationPriority::default(),
            delay: None,
            throttle: None,
            throttle_period: None,
            recipients: RecipientSpec::default(),
            category: None,
            enabled: true,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_recipients(mut self, recipients: RecipientSpec) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_delay(mut self, secs: u64) -> Self {
        self.delay = Some(secs);
        self
    }

    pub fn with_throttle(mut self, max_jobs: u32, period_secs: u64) -> Self {
        self.throttle = Some(max_jobs);
        self.throttle_period = Some(period_secs);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// The preference category jobs from this rule are filed under: the
    /// configured category, else the event name up to its first `.`.
    pub fn effective_category(&self) -> &str {
        match self.category.as_deref() {
            Some(category) => category,
            None => self.event.split('.').next().unwrap_or(&self.event),
        }
    }

    /// `(max_jobs, period_secs)` when throttling applies.
    pub fn throttle_window(&self) -> Option<(u32, u64)> {
        self.throttle
            .map(|max| (max, self.throttle_period.unwrap_or(DEFAULT_THROTTLE_PERIOD_SECS)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.event.trim().is_empty() {
            return Err(Error::validation(format!("Rule {} has no event", self.id)));
        }
        if self.template.trim().is_empty() {
            return Err(Error::validation(format!("Rule {} has no template", self.id)));
        }
        if self.channels.is_empty() {
            return Err(Error::validation(format!("Rule {} has no channels", self.id)));
        }
        if self.throttle_period == Some(0) {
            return Err(Error::validation(format!(
                "Rule {} has a zero throttle period",
                self.id
            )));
        }
        match self.recipients.kind {
            RecipientKind::Role | RecipientKind::Custom if self.recipients.targets.is_empty() => {
                Err(Error::validation(format!(
                    "Rule {} needs recipient targets for {:?} recipients",
                    self.id, self.recipients.kind
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Partial update for a rule. Unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub event: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    pub template: Option<String>,
    pub channels: Option<Vec<Channel>>,
    pub priority: Option<NotificationPriority>,
    /// `Some(None)` clears the delay.
    pub delay: Option<Option<u64>>,
    pub throttle: Option<Option<u32>>,
    pub throttle_period: Option<Option<u64>>,
    pub recipients: Option<RecipientSpec>,
    pub category: Option<Option<String>>,
    pub enabled: Option<bool>,
}

impl RuleUpdate {
    pub fn apply_to(self, rule: &mut NotificationRule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(event) = self.event {
            rule.event = event;
        }
        if let Some(conditions) = self.conditions {
            rule.conditions = conditions;
        }
        if let Some(template) = self.template {
            rule.template = template;
        }
        if let Some(channels) = self.channels {
            rule.channels = channels;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(delay) = self.delay {
            rule.delay = delay;
        }
        if let Some(throttle) = self.throttle {
            rule.throttle = throttle;
        }
        if let Some(period) = self.throttle_period {
            rule.throttle_period = period;
        }
        if let Some(recipients) = self.recipients {
            rule.recipients = recipients;
        }
        if let Some(category) = self.category {
            rule.category = category;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
    }
}
