//! Dispatch loop body.
//!
//! Each tick selects eligible jobs by priority then age, claims as many as
//! there are free concurrency permits, sends them in parallel and waits for
//! the batch to settle. Ticks never overlap.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::events::QueueEvent;
use super::job::{JobFilter, JobStatus, NotificationJob};
use super::service::NotificationQueue;
use super::settings::QueueSettings;
use crate::Result;
use crate::domain::RetryPolicy;
use crate::preferences::PreferenceStore;
use crate::providers::{SendRequest, SendResult};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Jobs claimed and handed to a worker.
    pub dispatched: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    /// Pushed back by quiet hours without using an attempt.
    pub deferred: usize,
    /// Another tick was still running.
    pub skipped: bool,
}

impl TickReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent => self.sent += 1,
            Outcome::Retried => self.retried += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Deferred => self.deferred += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Retried,
    Failed,
    Deferred,
}

pub struct Dispatcher {
    queue: Arc<NotificationQueue>,
    preferences: Arc<dyn PreferenceStore>,
    tick_lock: tokio::sync::Mutex<()>,
    /// Current limit and the semaphore enforcing it.
    semaphore: parking_lot::Mutex<(usize, Arc<Semaphore>)>,
}

impl Dispatcher {
    pub fn new(queue: Arc<NotificationQueue>, preferences: Arc<dyn PreferenceStore>) -> Self {
        let limit = queue.settings().max_concurrent;
        Self {
            queue,
            preferences,
            tick_lock: tokio::sync::Mutex::new(()),
            semaphore: parking_lot::Mutex::new((limit, Arc::new(Semaphore::new(limit)))),
        }
    }

    /// Sends currently in flight.
    pub fn in_flight(&self) -> usize {
        let current = self.semaphore.lock();
        current.0.saturating_sub(current.1.available_permits())
    }

    /// Semaphore for `limit`, replacing the old one when the limit changed.
    fn semaphore_for(&self, limit: usize) -> Arc<Semaphore> {
        let mut current = self.semaphore.lock();
        if current.0 != limit {
            debug!(from = current.0, to = limit, "Resizing dispatcher concurrency");
            *current = (limit, Arc::new(Semaphore::new(limit)));
        }
        current.1.clone()
    }

    /// Run one dispatch pass and wait for every send it started.
    pub async fn tick(&self) -> Result<TickReport> {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("Dispatch tick already running, skipping");
            return Ok(TickReport {
                skipped: true,
                ..Default::default()
            });
        };

        let settings = Arc::new(self.queue.settings());
        let semaphore = self.semaphore_for(settings.max_concurrent);
        let now = self.queue.clock().now();

        let mut candidates = self.queue.store().list(&JobFilter::dispatchable()).await?;
        candidates.retain(|job| job.is_eligible(now));
        if candidates.is_empty() {
            return Ok(TickReport::default());
        }
        candidates.sort_by(NotificationJob::dispatch_order);

        let worker = Worker {
            queue: self.queue.clone(),
            preferences: self.preferences.clone(),
            settings,
        };
        let mut report = TickReport::default();
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let job = match self.queue.store().claim(&candidate.id, now).await {
                Ok(Some(job)) => job,
                // Removed or claimed since listing.
                Ok(None) => continue,
                Err(e) => {
                    warn!(job_id = %candidate.id, error = %e, "Failed to claim job");
                    continue;
                }
            };

            report.dispatched += 1;
            let worker = worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let job_id = job.id.clone();
                match AssertUnwindSafe(worker.process(job)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => worker.release_after_panic(&job_id).await,
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => error!(error = %e, "Dispatch task aborted"),
            }
        }

        debug!(?report, "Dispatch tick finished");
        Ok(report)
    }
}

#[derive(Clone)]
struct Worker {
    queue: Arc<NotificationQueue>,
    preferences: Arc<dyn PreferenceStore>,
    settings: Arc<QueueSettings>,
}

impl Worker {
    async fn process(&self, mut job: NotificationJob) -> Outcome {
        let now = self.queue.clock().now();

        if let Some(resume) = self.quiet_hours_deferral(&job, now).await {
            job.defer_until(resume, now);
            info!(
                job_id = %job.id,
                channel = %job.channel,
                resume_at = %resume,
                "Deferred by quiet hours"
            );
            let job_id = job.id.clone();
            self.queue.save(job).await;
            self.queue.emit(QueueEvent::Rescheduled {
                job_id,
                scheduled_for: resume,
            });
            return Outcome::Deferred;
        }

        job.clear_quiet_hours_resume();
        job.attempts += 1;
        job.updated_at = now;
        self.queue.save(job.clone()).await;

        debug!(
            job_id = %job.id,
            channel = %job.channel,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "Sending notification"
        );
        match self.send(&job).await {
            Ok(result) => self.record_success(job, result).await,
            Err(error) => self.record_failure(job, error).await,
        }
    }

    /// Provider verdict, with every failure shape folded into an error string.
    async fn send(&self, job: &NotificationJob) -> std::result::Result<SendResult, String> {
        let Some(provider) = self.queue.providers().get(job.channel) else {
            return Err(format!("No provider registered for channel {}", job.channel));
        };
        let request = SendRequest::from_job(job);

        match tokio::time::timeout(self.settings.send_timeout, provider.send(&request)).await {
            Ok(Ok(result)) if result.success => Ok(result),
            Ok(Ok(result)) => Err(result
                .error
                .unwrap_or_else(|| format!("{} reported failure", provider.name()))),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{} send timed out after {:?}",
                provider.name(),
                self.settings.send_timeout
            )),
        }
    }

    async fn quiet_hours_deferral(
        &self,
        job: &NotificationJob,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let policy = &self.settings.quiet_hours;
        // A job released from a deferral is not held again on that dispatch.
        if policy.is_exempt(job.channel) || job.quiet_hours_resume_at().is_some_and(|at| at <= now) {
            return None;
        }
        let user_id = job.user_id.as_deref()?;
        match self.preferences.get_or_default(user_id).await {
            Ok(prefs) => policy.deferral(&prefs, job.channel, now),
            Err(e) => {
                warn!(job_id = %job.id, user_id, error = %e, "Preference lookup failed; sending anyway");
                None
            }
        }
    }

    async fn record_success(&self, mut job: NotificationJob, result: SendResult) -> Outcome {
        let now = self.queue.clock().now();
        job.status = if result.delivered {
            JobStatus::Delivered
        } else {
            JobStatus::Sent
        };
        job.sent_at = Some(now);
        if result.delivered {
            job.delivered_at = Some(now);
        }
        job.updated_at = now;
        job.scheduled_for = None;
        job.error_message = None;
        job.provider_id = result.provider_id;

        info!(
            job_id = %job.id,
            channel = %job.channel,
            attempt = job.attempts,
            "Notification sent"
        );
        let job_id = job.id.clone();
        let provider_id = job.provider_id.clone();
        self.queue.save(job).await;
        self.queue.emit(QueueEvent::Sent {
            job_id: job_id.clone(),
            provider_id: provider_id.clone(),
        });
        if result.delivered {
            self.queue.emit(QueueEvent::Delivered {
                job_id,
                provider_id,
            });
        }
        Outcome::Sent
    }

    async fn record_failure(&self, mut job: NotificationJob, error: String) -> Outcome {
        let now = self.queue.clock().now();
        job.updated_at = now;
        job.error_message = Some(error.clone());
        let job_id = job.id.clone();
        let attempts = job.attempts;

        if RetryPolicy::should_retry(job.attempts, job.max_attempts) {
            let delay = self.settings.retry.delay_for_attempt(job.attempts);
            let retry_at = now
                + chrono::Duration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64);
            job.status = JobStatus::Retry;
            job.scheduled_for = Some(retry_at);

            warn!(
                job_id = %job_id,
                channel = %job.channel,
                attempt = attempts,
                max_attempts = job.max_attempts,
                retry_at = %retry_at,
                error = %error,
                "Send failed, scheduling retry"
            );
            self.queue.save(job).await;
            self.queue.emit(QueueEvent::Retrying {
                job_id,
                attempts,
                scheduled_for: retry_at,
                error,
            });
            Outcome::Retried
        } else {
            job.status = JobStatus::Failed;
            job.failed_at = Some(now);
            job.scheduled_for = None;

            error!(
                job_id = %job_id,
                channel = %job.channel,
                attempt = attempts,
                error = %error,
                "Send failed, giving up"
            );
            self.queue.save(job).await;
            self.queue.emit(QueueEvent::Failed {
                job_id,
                attempts,
                error,
            });
            Outcome::Failed
        }
    }

    /// Put a job whose worker panicked back on the failure path.
    async fn release_after_panic(&self, job_id: &str) -> Outcome {
        error!(job_id, "Notification worker panicked");
        match self.queue.store().get(job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Processing => {
                self.record_failure(job, "provider panicked".to_string()).await
            }
            Ok(_) => Outcome::Failed,
            Err(e) => {
                error!(job_id, error = %e, "Failed to load job after panic");
                Outcome::Failed
            }
        }
    }
}
