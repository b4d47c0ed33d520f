//! Queue lifecycle events published on a broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobStatus;
use crate::domain::{Channel, NotificationPriority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        job_id: String,
        channel: Channel,
        priority: NotificationPriority,
        scheduled_for: Option<DateTime<Utc>>,
    },
    /// Deferred by quiet hours; attempts unchanged.
    Rescheduled {
        job_id: String,
        scheduled_for: DateTime<Utc>,
    },
    Sent {
        job_id: String,
        provider_id: Option<String>,
    },
    Delivered {
        job_id: String,
        provider_id: Option<String>,
    },
    Retrying {
        job_id: String,
        attempts: u32,
        scheduled_for: DateTime<Utc>,
        error: String,
    },
    Failed {
        job_id: String,
        attempts: u32,
        error: String,
    },
    Removed {
        job_id: String,
        status: JobStatus,
    },
    /// Operator retry of a failed job.
    Requeued { job_id: String },
}

impl QueueEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Rescheduled { job_id, .. }
            | Self::Sent { job_id, .. }
            | Self::Delivered { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Removed { job_id, .. }
            | Self::Requeued { job_id } => job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Rescheduled { .. } => "rescheduled",
            Self::Sent { .. } => "sent",
            Self::Delivered { .. } => "delivered",
            Self::Retrying { .. } => "retrying",
            Self::Failed { .. } => "failed",
            Self::Removed { .. } => "removed",
            Self::Requeued { .. } => "requeued",
        }
    }
}
