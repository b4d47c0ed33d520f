//! Notification queue, its storage and the dispatcher that drains it.

pub mod dispatcher;
pub mod events;
pub mod job;
pub mod metrics;
pub mod service;
pub mod settings;
pub mod store;

pub use dispatcher::{Dispatcher, TickReport};
pub use events::QueueEvent;
pub use job::{
    JobFilter, JobPayload, JobStatus, NewJob, NotificationJob, QUIET_HOURS_RESUME_KEY, TemplateRef,
};
pub use metrics::{ChannelCounts, QueueMetrics, QueueStats};
pub use service::NotificationQueue;
pub use settings::{ConfigUpdate, QueueSettings};
pub use store::{InMemoryQueueStore, QueueStore};
