//! Job persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::job::{JobFilter, JobStatus, NotificationJob};
use crate::{Error, Result};

/// Storage for queued jobs.
///
/// `claim` must be atomic: two concurrent claims of the same job may not both
/// succeed.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<NotificationJob>>;

    /// Insert or replace a job.
    async fn put(&self, job: NotificationJob) -> Result<()>;

    /// Jobs matching `filter`, in no particular order. `filter.limit` is ignored.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<NotificationJob>>;

    /// Delete a job. Fails with `InvalidStateTransition` for `processing` jobs.
    async fn delete(&self, id: &str) -> Result<Option<NotificationJob>>;

    /// Move an eligible job to `processing` and return it.
    ///
    /// Returns `None` if the job is missing, not dispatchable, or scheduled
    /// after `now`.
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<NotificationJob>>;

    async fn len(&self) -> Result<usize>;
}

/// Jobs kept in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    jobs: DashMap<String, NotificationJob>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn get(&self, id: &str) -> Result<Option<NotificationJob>> {
        Ok(self.jobs.get(id).map(|j| j.value().clone()))
    }

    async fn put(&self, job: NotificationJob) -> Result<()> {
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<NotificationJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<Option<NotificationJob>> {
        if let Some((_, job)) = self
            .jobs
            .remove_if(id, |_, job| job.status != JobStatus::Processing)
        {
            return Ok(Some(job));
        }
        if self.jobs.contains_key(id) {
            return Err(Error::InvalidStateTransition {
                from: JobStatus::Processing.to_string(),
                to: "removed".to_string(),
            });
        }
        Ok(None)
    }

    async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<NotificationJob>> {
        let Some(mut job_ref) = self.jobs.get_mut(id) else {
            return Ok(None);
        };
        if !job_ref.is_eligible(now) {
            return Ok(None);
        }
        job_ref.status = JobStatus::Processing;
        job_ref.updated_at = now;
        let job = job_ref.clone();
        drop(job_ref);
        Ok(Some(job))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotificationPriority;
    use crate::queue::job::tests::job;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = InMemoryQueueStore::new();
        store.put(job("a", NotificationPriority::Normal, t0())).await.unwrap();

        let claimed = store.claim("a", t0()).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(store.claim("a", t0()).await.unwrap().is_none());
        assert!(store.claim("missing", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_schedule() {
        let store = InMemoryQueueStore::new();
        let mut j = job("a", NotificationPriority::Normal, t0());
        j.scheduled_for = Some(t0() + Duration::minutes(5));
        store.put(j).await.unwrap();

        assert!(store.claim("a", t0()).await.unwrap().is_none());
        assert!(store.claim("a", t0() + Duration::minutes(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_refuses_processing() {
        let store = InMemoryQueueStore::new();
        store.put(job("a", NotificationPriority::Normal, t0())).await.unwrap();
        store.claim("a", t0()).await.unwrap();

        let err = store.delete("a").await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.delete("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = InMemoryQueueStore::new();
        store.put(job("a", NotificationPriority::Normal, t0())).await.unwrap();
        let mut failed = job("b", NotificationPriority::Normal, t0());
        failed.status = JobStatus::Failed;
        store.put(failed).await.unwrap();

        let failed = store.list(&JobFilter::with_status(JobStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "b");
        assert_eq!(store.list(&JobFilter::all()).await.unwrap().len(), 2);
    }
}
