//! licita-notify library crate.
//!
//! Rule-driven notification delivery for procurement alerts: business events
//! are matched against declarative rules, expanded into per-channel jobs and
//! drained by a bounded-concurrency dispatcher with retry and quiet hours.

pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod preferences;
pub mod providers;
pub mod queue;
pub mod rules;
pub mod templates;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use domain::{Channel, NotificationPriority, RetryPolicy};
pub use engine::{BulkOutcome, EngineBuilder, NotificationEngine};
pub use error::{Error, Result};
pub use queue::{JobStatus, NewJob, NotificationJob, NotificationQueue, QueueEvent, QueueStats};
pub use rules::{NotificationRule, RuleEngine, TriggerOutcome};
