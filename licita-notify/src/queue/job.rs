//! Queued notification jobs.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Channel, NotificationPriority};

/// Metadata key recording when a quiet-hours deferral ends (RFC 3339).
pub const QUIET_HOURS_RESUME_KEY: &str = "quiet_hours_resume_at";

/// Lifecycle state of a job.
///
/// `pending -> processing -> sent -> delivered`, with `processing -> retry ->
/// processing` on failure and `processing -> failed` once attempts run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Sent,
    Delivered,
    Retry,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Retry => "retry",
            Self::Failed => "failed",
        }
    }

    /// Whether the dispatcher may pick the job up.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }

    /// Terminal states are only left through an explicit operator retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel-specific content of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Channel address: email, phone number, chat id, push token or user id.
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl JobPayload {
    pub fn new(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: None,
            content: content.into(),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: String,
    pub channel: Channel,
    pub priority: NotificationPriority,
    pub status: JobStatus,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Not eligible for dispatch before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Last error reported for this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Enqueue order; breaks ties between jobs created in the same instant.
    pub sequence: u64,
}

impl NotificationJob {
    /// Dispatchable and not scheduled in the future.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status.is_dispatchable() && self.scheduled_for.is_none_or(|at| at <= now)
    }

    /// Highest priority first, then oldest first.
    pub fn dispatch_order(a: &Self, b: &Self) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.sequence.cmp(&b.sequence))
    }

    /// End of the quiet-hours deferral this job was given, if any.
    pub fn quiet_hours_resume_at(&self) -> Option<DateTime<Utc>> {
        self.payload
            .metadata
            .get(QUIET_HOURS_RESUME_KEY)?
            .as_str()?
            .parse()
            .ok()
    }

    /// Defer to `resume_at` without touching the attempt count.
    pub fn defer_until(&mut self, resume_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.scheduled_for = Some(resume_at);
        self.updated_at = now;
        self.payload.metadata.insert(
            QUIET_HOURS_RESUME_KEY.to_string(),
            Value::String(resume_at.to_rfc3339()),
        );
    }

    /// Drop the deferral marker once the released job is dispatched, so later
    /// retries are held by quiet hours again.
    pub fn clear_quiet_hours_resume(&mut self) -> bool {
        self.payload.metadata.remove(QUIET_HOURS_RESUME_KEY).is_some()
    }

    /// Operator retry: back to `pending` with a fresh attempt budget.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.error_message = None;
        self.failed_at = None;
        self.scheduled_for = None;
        self.updated_at = now;
    }
}

/// A request to enqueue a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub channel: Channel,
    pub payload: JobPayload,
    pub priority: NotificationPriority,
    /// Defaults to the queue's configured value.
    pub max_attempts: Option<u32>,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Render subject and content from a registered template at enqueue time.
    pub template: Option<TemplateRef>,
    pub user_id: Option<String>,
    pub rule_id: Option<String>,
    pub category: Option<String>,
}

/// Template id plus the variables to render it with.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRef {
    pub id: String,
    pub vars: Value,
}

impl NewJob {
    pub fn new(channel: Channel, to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel,
            payload: JobPayload::new(to, content),
            priority: NotificationPriority::default(),
            max_attempts: None,
            scheduled_for: None,
            template: None,
            user_id: None,
            rule_id: None,
            category: None,
        }
    }

    /// A job whose content comes from template `id`.
    pub fn from_template(
        channel: Channel,
        to: impl Into<String>,
        id: impl Into<String>,
        vars: Value,
    ) -> Self {
        let mut job = Self::new(channel, to, String::new());
        job.template = Some(TemplateRef { id: id.into(), vars });
        job
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.payload.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.metadata.insert(key.into(), value);
        self
    }
}

/// Selection for [`crate::queue::NotificationQueue::get_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    /// Any of these statuses; empty means all.
    pub statuses: Vec<JobStatus>,
    pub priority: Option<NotificationPriority>,
    pub channel: Option<Channel>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: JobStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Default::default()
        }
    }

    /// Jobs the dispatcher could pick up, regardless of schedule.
    pub fn dispatchable() -> Self {
        Self {
            statuses: vec![JobStatus::Pending, JobStatus::Retry],
            ..Default::default()
        }
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `job` passes every criterion except `limit`.
    pub fn matches(&self, job: &NotificationJob) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.priority.is_none_or(|p| p == job.priority)
            && self.channel.is_none_or(|c| c == job.channel)
            && self
                .user_id
                .as_deref()
                .is_none_or(|u| job.user_id.as_deref() == Some(u))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn job(id: &str, priority: NotificationPriority, created_at: DateTime<Utc>) -> NotificationJob {
        NotificationJob {
            id: id.to_string(),
            channel: Channel::Email,
            priority,
            status: JobStatus::Pending,
            payload: JobPayload::new("a@b.com", "hello"),
            user_id: None,
            rule_id: None,
            category: None,
            attempts: 0,
            max_attempts: 3,
            scheduled_for: None,
            created_at,
            updated_at: created_at,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            error_message: None,
            provider_id: None,
            sequence: 0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_defer_until_marks_resume() {
        let mut j = job("a", NotificationPriority::Normal, t0());
        j.status = JobStatus::Processing;
        assert_eq!(j.quiet_hours_resume_at(), None);

        let resume = t0() + Duration::hours(11);
        j.defer_until(resume, t0());
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.scheduled_for, Some(resume));
        assert_eq!(j.quiet_hours_resume_at(), Some(resume));
        assert_eq!(j.attempts, 0);

        assert!(j.clear_quiet_hours_resume());
        assert_eq!(j.quiet_hours_resume_at(), None);
        assert!(!j.clear_quiet_hours_resume());
    }

    #[test]
    fn test_eligibility_respects_schedule() {
        let mut j = job("a", NotificationPriority::Normal, t0());
        assert!(j.is_eligible(t0()));

        j.scheduled_for = Some(t0() + Duration::seconds(10));
        assert!(!j.is_eligible(t0()));
        assert!(j.is_eligible(t0() + Duration::seconds(10)));

        j.status = JobStatus::Sent;
        assert!(!j.is_eligible(t0() + Duration::hours(1)));
    }

    #[test]
    fn test_dispatch_order() {
        let mut jobs = vec![
            job("low", NotificationPriority::Low, t0()),
            job("normal-new", NotificationPriority::Normal, t0() + Duration::seconds(5)),
            job("critical", NotificationPriority::Critical, t0() + Duration::seconds(9)),
            job("normal-old", NotificationPriority::Normal, t0()),
        ];
        jobs.sort_by(NotificationJob::dispatch_order);
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["critical", "normal-old", "normal-new", "low"]);
    }

    #[test]
    fn test_sequence_breaks_ties() {
        let mut a = job("a", NotificationPriority::High, t0());
        let mut b = job("b", NotificationPriority::High, t0());
        a.sequence = 2;
        b.sequence = 1;
        let mut jobs = vec![a, b];
        jobs.sort_by(NotificationJob::dispatch_order);
        assert_eq!(jobs[0].id, "b");
    }

    #[test]
    fn test_reset_for_retry() {
        let mut j = job("a", NotificationPriority::Normal, t0());
        j.status = JobStatus::Failed;
        j.attempts = 3;
        j.error_message = Some("boom".into());
        j.failed_at = Some(t0());
        j.scheduled_for = Some(t0());

        j.reset_for_retry(t0() + Duration::minutes(1));
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.attempts, 0);
        assert!(j.error_message.is_none());
        assert!(j.failed_at.is_none());
        assert!(j.scheduled_for.is_none());
    }

    #[test]
    fn test_filter_matches() {
        let mut j = job("a", NotificationPriority::High, t0());
        j.user_id = Some("u1".into());

        assert!(JobFilter::all().matches(&j));
        assert!(JobFilter::with_status(JobStatus::Pending).matches(&j));
        assert!(!JobFilter::with_status(JobStatus::Failed).matches(&j));
        assert!(JobFilter::all().channel(Channel::Email).user("u1").matches(&j));
        assert!(!JobFilter::all().priority(NotificationPriority::Low).matches(&j));
        assert!(!JobFilter::all().user("u2").matches(&j));
    }
}
