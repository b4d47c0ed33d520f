//! Event-to-job expansion.
//!
//! An event is matched against every enabled rule for that event name. A
//! matching rule expands into one job per recipient and channel, after the
//! recipient's preferences, the rule throttle and quiet hours have had their
//! say. A failing rule never stops the remaining rules.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::condition::evaluate;
use super::directory::{Contact, Recipient, RecipientDirectory};
use super::rule::{NotificationRule, RecipientKind, RuleUpdate};
use super::throttle::RuleThrottle;
use crate::preferences::{PreferenceStore, UserNotificationPreferences, should_deliver};
use crate::queue::{NewJob, NotificationQueue, QUIET_HOURS_RESUME_KEY};
use crate::{Error, Result};

/// What one `trigger_event` call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub event: String,
    /// Enabled rules for the event whose conditions held.
    pub rules_matched: usize,
    /// Matched rules that errored during expansion.
    pub rules_failed: usize,
    pub job_ids: Vec<String>,
    /// Recipient/channel pairs dropped by user preferences.
    pub filtered: usize,
    /// Recipient/channel pairs dropped by a rule throttle.
    pub throttled: usize,
    /// Jobs created with a quiet-hours delay.
    pub deferred: usize,
    /// Recipient/channel pairs the queue refused (no address, no template variant).
    pub rejected: usize,
}

impl TriggerOutcome {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            ..Default::default()
        }
    }

    pub fn jobs_created(&self) -> usize {
        self.job_ids.len()
    }
}

pub struct RuleEngine {
    rules: RwLock<Vec<Arc<NotificationRule>>>,
    throttle: RuleThrottle,
    queue: Arc<NotificationQueue>,
    directory: Arc<dyn RecipientDirectory>,
    preferences: Arc<dyn PreferenceStore>,
}

impl RuleEngine {
    pub fn new(
        queue: Arc<NotificationQueue>,
        directory: Arc<dyn RecipientDirectory>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            throttle: RuleThrottle::new(),
            queue,
            directory,
            preferences,
        }
    }

    /// Add a rule, assigning an id when it has none. Returns the id.
    pub fn create_rule(&self, mut rule: NotificationRule) -> Result<String> {
        if rule.id.trim().is_empty() {
            rule.id = uuid::Uuid::new_v4().to_string();
        }
        self.check(&rule)?;

        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(Error::validation(format!("Rule {} already exists", rule.id)));
        }
        info!(rule_id = %rule.id, event = %rule.event, template = %rule.template, "Created notification rule");
        let id = rule.id.clone();
        rules.push(Arc::new(rule));
        Ok(id)
    }

    /// Merge `update` into rule `id` and return the result.
    pub fn update_rule(&self, id: &str, update: RuleUpdate) -> Result<NotificationRule> {
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("NotificationRule", id))?;

        let mut updated = NotificationRule::clone(slot);
        update.apply_to(&mut updated);
        updated.id = id.to_string();
        self.check(&updated)?;

        *slot = Arc::new(updated.clone());
        drop(rules);
        self.throttle.reset(id);
        info!(rule_id = id, "Updated notification rule");
        Ok(updated)
    }

    pub fn delete_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        let removed = rules.len() != before;
        drop(rules);

        if removed {
            self.throttle.reset(id);
            info!(rule_id = id, "Deleted notification rule");
        }
        removed
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.update_rule(
            id,
            RuleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .map(|_| ())
    }

    pub fn get_rule(&self, id: &str) -> Option<NotificationRule> {
        self.rules
            .read()
            .iter()
            .find(|r| r.id == id)
            .map(|r| NotificationRule::clone(r))
    }

    /// Rules in creation order.
    pub fn list_rules(&self) -> Vec<NotificationRule> {
        self.rules
            .read()
            .iter()
            .map(|r| NotificationRule::clone(r))
            .collect()
    }

    fn check(&self, rule: &NotificationRule) -> Result<()> {
        rule.validate()?;
        if !self.queue.templates().contains(&rule.template) {
            return Err(Error::validation(format!(
                "Rule {} references unknown template {}",
                rule.id, rule.template
            )));
        }
        Ok(())
    }

    fn rules_for(&self, event: &str) -> Vec<Arc<NotificationRule>> {
        self.rules
            .read()
            .iter()
            .filter(|r| r.enabled && r.event == event)
            .cloned()
            .collect()
    }

    /// Match `event` against the rule set and enqueue the resulting jobs.
    pub async fn trigger_event(&self, event: &str, data: &Value, user_id: Option<&str>) -> TriggerOutcome {
        let mut outcome = TriggerOutcome::new(event);
        let now = self.queue.clock().now();

        for rule in self.rules_for(event) {
            if !evaluate(&rule.conditions, data) {
                debug!(rule_id = %rule.id, event, "Rule conditions not met");
                continue;
            }
            outcome.rules_matched += 1;

            if let Err(e) = self.expand(&rule, event, data, user_id, now, &mut outcome).await {
                outcome.rules_failed += 1;
                error!(rule_id = %rule.id, event, error = %e, "Failed to process notification rule");
            }
        }

        info!(
            event,
            rules_matched = outcome.rules_matched,
            jobs_created = outcome.jobs_created(),
            filtered = outcome.filtered,
            throttled = outcome.throttled,
            "Processed event"
        );
        outcome
    }

    async fn expand(
        &self,
        rule: &NotificationRule,
        event: &str,
        data: &Value,
        user_id: Option<&str>,
        now: DateTime<Utc>,
        outcome: &mut TriggerOutcome,
    ) -> Result<()> {
        if !self.queue.templates().contains(&rule.template) {
            return Err(Error::validation(format!("Unknown template {}", rule.template)));
        }

        let recipients = self.resolve_recipients(rule, user_id).await?;
        if recipients.is_empty() {
            debug!(rule_id = %rule.id, "Rule matched but resolved no recipients");
            return Ok(());
        }

        let delayed_until = rule.delay.map(|secs| now + seconds(secs));
        let dispatch_at = delayed_until.unwrap_or(now);
        let category = rule.effective_category();
        let quiet_hours = self.queue.settings().quiet_hours;

        for recipient in recipients {
            let prefs = match recipient.user_id() {
                Some(uid) => Some(self.preferences.get_or_default(uid).await?),
                None => None,
            };

            for &channel in &rule.channels {
                if prefs
                    .as_ref()
                    .is_some_and(|p| !should_deliver(p, channel, Some(category)))
                {
                    debug!(rule_id = %rule.id, %channel, category, "Filtered by user preferences");
                    outcome.filtered += 1;
                    continue;
                }

                let Some(address) = recipient.address_for(channel) else {
                    warn!(rule_id = %rule.id, %channel, recipient = ?recipient.user_id(), "Recipient has no address for channel");
                    outcome.rejected += 1;
                    continue;
                };

                let throttled_rule = rule.throttle_window().is_some();
                if let Some((max_jobs, period_secs)) = rule.throttle_window()
                    && !self.throttle.try_acquire(&rule.id, max_jobs, seconds(period_secs), now)
                {
                    debug!(rule_id = %rule.id, %channel, "Throttled");
                    outcome.throttled += 1;
                    continue;
                }

                let deferred = prefs
                    .as_ref()
                    .and_then(|p| quiet_hours.deferral(p, channel, dispatch_at));

                let mut job = NewJob::from_template(channel, address, &rule.template, data.clone())
                    .with_priority(rule.priority)
                    .with_category(category)
                    .with_metadata("event", json!(event))
                    .with_metadata("rule_id", json!(rule.id));
                job.rule_id = Some(rule.id.clone());
                if let Some(uid) = recipient.user_id() {
                    job = job.for_user(uid);
                }
                if let Some(resume) = deferred {
                    job = job.with_metadata(QUIET_HOURS_RESUME_KEY, json!(resume.to_rfc3339()));
                }
                if let Some(at) = deferred.or(delayed_until) {
                    job = job.scheduled_for(at);
                }

                match self.queue.add_to_queue(job).await {
                    Ok(job_id) => {
                        if deferred.is_some() {
                            outcome.deferred += 1;
                        }
                        outcome.job_ids.push(job_id);
                    }
                    Err(e) => {
                        if throttled_rule {
                            self.throttle.release(&rule.id, now);
                        }
                        if !e.is_validation() {
                            return Err(e);
                        }
                        warn!(rule_id = %rule.id, %channel, error = %e, "Job rejected");
                        outcome.rejected += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn resolve_recipients(
        &self,
        rule: &NotificationRule,
        user_id: Option<&str>,
    ) -> Result<Vec<Recipient>> {
        let targets = &rule.recipients.targets;
        match rule.recipients.kind {
            RecipientKind::User => match user_id {
                Some(uid) => Ok(vec![Recipient::User(self.contact_or_bare(uid).await?)]),
                None => {
                    debug!(rule_id = %rule.id, "User rule triggered without a user");
                    Ok(Vec::new())
                }
            },
            RecipientKind::Role => {
                let users = self.directory.users_with_roles(targets).await?;
                self.contacts(&users).await
            }
            RecipientKind::All => {
                let users = self.directory.all_users().await?;
                self.contacts(&users).await
            }
            RecipientKind::Custom => {
                let mut recipients = Vec::with_capacity(targets.len());
                for target in targets {
                    recipients.push(match self.directory.contact(target).await? {
                        Some(contact) => Recipient::User(contact),
                        None => Recipient::External(target.clone()),
                    });
                }
                Ok(recipients)
            }
        }
    }

    async fn contacts(&self, user_ids: &[String]) -> Result<Vec<Recipient>> {
        let mut recipients = Vec::with_capacity(user_ids.len());
        for uid in user_ids {
            match self.directory.contact(uid).await? {
                Some(contact) => recipients.push(Recipient::User(contact)),
                None => warn!(user_id = %uid, "Directory listed a user without contact data"),
            }
        }
        Ok(recipients)
    }

    /// Directory contact, or one that only reaches the dashboard.
    async fn contact_or_bare(&self, user_id: &str) -> Result<Contact> {
        Ok(self
            .directory
            .contact(user_id)
            .await?
            .unwrap_or_else(|| Contact::new(user_id)))
    }

    /// Preferences for `user_id`, synthesizing defaults on first access.
    pub async fn preferences_for(&self, user_id: &str) -> Result<UserNotificationPreferences> {
        self.preferences.get_or_default(user_id).await
    }
}

/// Rule-configured seconds, capped at a century.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .map_or(Duration::days(36_500), |d| d.min(Duration::days(36_500)))
}
