//! Queue statistics and derived delivery metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobStatus, NotificationJob};
use crate::domain::Channel;

/// Job counts by status.
///
/// `sent` includes `delivered` jobs, so
/// `pending + processing + sent + retry + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub sent: usize,
    /// Subset of `sent` with confirmed delivery.
    pub delivered: usize,
    pub retry: usize,
    pub failed: usize,
    pub total: usize,
}

impl QueueStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a NotificationJob>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            stats.record(job.status);
        }
        stats
    }

    fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Sent => self.sent += 1,
            JobStatus::Delivered => {
                self.sent += 1;
                self.delivered += 1;
            }
            JobStatus::Retry => self.retry += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    /// Jobs not yet finished either way.
    pub fn outstanding(&self) -> usize {
        self.pending + self.processing + self.retry
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub sent: usize,
    pub failed: usize,
    pub outstanding: usize,
}

/// Point-in-time delivery metrics. Rates are percentages in `0.0..=100.0`
/// and are zero when their denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub stats: QueueStats,
    /// `sent / (sent + failed)`.
    pub success_rate: f64,
    /// `failed / (sent + failed)`.
    pub failure_rate: f64,
    /// Jobs with more than one attempt over `sent + failed`.
    pub retry_rate: f64,
    /// Jobs sent in the hour before `generated_at`.
    pub throughput_last_hour: usize,
    /// Mean `sent_at - created_at` over sent jobs, in milliseconds.
    pub average_processing_ms: f64,
    pub by_channel: BTreeMap<Channel, ChannelCounts>,
    pub generated_at: DateTime<Utc>,
}

impl QueueMetrics {
    pub fn from_jobs(jobs: &[NotificationJob], now: DateTime<Utc>) -> Self {
        let stats = QueueStats::from_jobs(jobs);
        let finished = stats.sent + stats.failed;
        let hour_ago = now - Duration::hours(1);

        let mut retried = 0usize;
        let mut throughput_last_hour = 0usize;
        let mut processing_total_ms = 0i64;
        let mut processing_samples = 0usize;
        let mut by_channel: BTreeMap<Channel, ChannelCounts> = BTreeMap::new();

        for job in jobs {
            let counts = by_channel.entry(job.channel).or_default();
            match job.status {
                JobStatus::Sent | JobStatus::Delivered => {
                    counts.sent += 1;
                    if let Some(sent_at) = job.sent_at {
                        if sent_at > hour_ago && sent_at <= now {
                            throughput_last_hour += 1;
                        }
                        processing_total_ms += (sent_at - job.created_at).num_milliseconds();
                        processing_samples += 1;
                    }
                }
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Pending | JobStatus::Processing | JobStatus::Retry => {
                    counts.outstanding += 1
                }
            }
            if job.attempts > 1 {
                retried += 1;
            }
        }

        Self {
            stats,
            success_rate: percentage(stats.sent, finished),
            failure_rate: percentage(stats.failed, finished),
            retry_rate: percentage(retried, finished),
            throughput_last_hour,
            average_processing_ms: if processing_samples == 0 {
                0.0
            } else {
                processing_total_ms as f64 / processing_samples as f64
            },
            by_channel,
            generated_at: now,
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
