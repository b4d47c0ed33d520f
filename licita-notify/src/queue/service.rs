//! The notification queue: enqueue, inspect and operate on jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::QueueEvent;
use super::job::{JobFilter, JobStatus, NewJob, NotificationJob};
use super::metrics::{QueueMetrics, QueueStats};
use super::settings::{ConfigUpdate, QueueSettings};
use super::store::QueueStore;
use crate::clock::Clock;
use crate::providers::ProviderRegistry;
use crate::templates::TemplateRegistry;
use crate::{Error, Result};

/// Buffered events per subscriber before lagging.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct NotificationQueue {
    store: Arc<dyn QueueStore>,
    providers: Arc<ProviderRegistry>,
    templates: Arc<TemplateRegistry>,
    clock: Arc<dyn Clock>,
    settings: RwLock<QueueSettings>,
    sequence: AtomicU64,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl NotificationQueue {
    pub fn new(
        store: Arc<dyn QueueStore>,
        providers: Arc<ProviderRegistry>,
        templates: Arc<TemplateRegistry>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            providers,
            templates,
            clock,
            settings: RwLock::new(settings),
            sequence: AtomicU64::new(0),
            event_tx,
        }
    }

    /// Validate and store a new job in `pending`.
    pub async fn add_to_queue(&self, request: NewJob) -> Result<String> {
        let settings = self.settings();
        let NewJob {
            channel,
            mut payload,
            priority,
            max_attempts,
            scheduled_for,
            template,
            user_id,
            rule_id,
            category,
        } = request;

        if payload.to.trim().is_empty() {
            return Err(Error::validation(format!("Missing recipient for {} job", channel)));
        }
        if !self.providers.contains(channel) {
            return Err(Error::validation(format!(
                "No provider registered for channel {}",
                channel
            )));
        }
        if let Some(template) = template {
            let rendered = self.templates.render(&template.id, channel, &template.vars)?;
            if rendered.subject.is_some() {
                payload.subject = rendered.subject;
            }
            payload.content = rendered.content;
            payload
                .metadata
                .entry("template_id")
                .or_insert_with(|| template.id.clone().into());
        }
        if payload.content.trim().is_empty() {
            return Err(Error::validation("Job content is empty"));
        }
        let max_attempts = max_attempts.unwrap_or(settings.default_max_attempts);
        if max_attempts == 0 {
            return Err(Error::validation("max_attempts must be at least 1"));
        }
        if self.store.len().await? >= settings.max_queue_size {
            return Err(Error::validation(format!(
                "Queue is full ({} jobs)",
                settings.max_queue_size
            )));
        }

        let now = self.clock.now();
        let job = NotificationJob {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            priority,
            status: JobStatus::Pending,
            payload,
            user_id,
            rule_id,
            category,
            attempts: 0,
            max_attempts,
            scheduled_for,
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            error_message: None,
            provider_id: None,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        };
        let job_id = job.id.clone();
        self.store.put(job).await?;

        info!(
            job_id = %job_id,
            channel = %channel,
            priority = %priority,
            scheduled_for = ?scheduled_for,
            "Enqueued notification job"
        );
        self.emit(QueueEvent::Enqueued {
            job_id: job_id.clone(),
            channel,
            priority,
            scheduled_for,
        });
        Ok(job_id)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<NotificationJob>> {
        self.store.get(id).await
    }

    /// Matching jobs, highest priority first, then oldest first.
    pub async fn get_all(&self, filter: &JobFilter) -> Result<Vec<NotificationJob>> {
        let mut jobs = self.store.list(filter).await?;
        jobs.sort_by(NotificationJob::dispatch_order);
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        let jobs = self.store.list(&JobFilter::all()).await?;
        Ok(QueueStats::from_jobs(&jobs))
    }

    pub async fn metrics(&self) -> Result<QueueMetrics> {
        let jobs = self.store.list(&JobFilter::all()).await?;
        Ok(QueueMetrics::from_jobs(&jobs, self.clock.now()))
    }

    /// Requeue a failed job with a fresh attempt budget.
    ///
    /// Returns `false` if the job does not exist or is not `failed`.
    pub async fn retry_job(&self, id: &str) -> Result<bool> {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Failed {
            debug!(job_id = %id, status = %job.status, "Ignoring retry of non-failed job");
            return Ok(false);
        }
        job.reset_for_retry(self.clock.now());
        self.store.put(job).await?;

        info!(job_id = %id, "Failed job requeued");
        self.emit(QueueEvent::Requeued {
            job_id: id.to_string(),
        });
        Ok(true)
    }

    /// Requeue every failed job. Returns how many were requeued.
    pub async fn retry_all_failed(&self) -> Result<usize> {
        let failed = self.store.list(&JobFilter::with_status(JobStatus::Failed)).await?;
        let mut count = 0;
        for job in failed {
            if self.retry_job(&job.id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete a job. Jobs being processed cannot be removed.
    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        match self.store.delete(id).await? {
            Some(job) => {
                info!(job_id = %id, status = %job.status, "Removed notification job");
                self.emit(QueueEvent::Removed {
                    job_id: id.to_string(),
                    status: job.status,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record a provider's delivery receipt for a `sent` job.
    pub async fn confirm_delivery(&self, id: &str, provider_id: Option<String>) -> Result<()> {
        let mut job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("NotificationJob", id))?;
        if job.status != JobStatus::Sent {
            return Err(Error::InvalidStateTransition {
                from: job.status.to_string(),
                to: JobStatus::Delivered.to_string(),
            });
        }

        let now = self.clock.now();
        job.status = JobStatus::Delivered;
        job.delivered_at = Some(now);
        job.updated_at = now;
        if provider_id.is_some() {
            job.provider_id = provider_id;
        }
        let provider_id = job.provider_id.clone();
        self.store.put(job).await?;

        self.emit(QueueEvent::Delivered {
            job_id: id.to_string(),
            provider_id,
        });
        Ok(())
    }

    /// Delete terminal jobs last updated before `older_than`.
    pub async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let finished = self
            .store
            .list(&JobFilter {
                statuses: vec![JobStatus::Sent, JobStatus::Delivered, JobStatus::Failed],
                ..Default::default()
            })
            .await?;

        let mut purged = 0;
        for job in finished.into_iter().filter(|j| j.updated_at < older_than) {
            if self.store.delete(&job.id).await?.is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "Purged finished jobs");
        }
        Ok(purged)
    }

    /// Merge `update` into the live settings. Applies from the next tick.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        let mut settings = self.settings.write();
        let next = settings.merged(&update)?;
        info!(?update, "Queue settings updated");
        *settings = next;
        Ok(())
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub(crate) fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub(crate) fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        if self.event_tx.send(event).is_err() {
            debug!("No queue event subscribers");
        }
    }

    /// Persist `job`, logging rather than failing on store errors.
    pub(crate) async fn save(&self, job: NotificationJob) {
        let job_id = job.id.clone();
        if let Err(e) = self.store.put(job).await {
            warn!(job_id = %job_id, error = %e, "Failed to persist job state");
        }
    }
}
