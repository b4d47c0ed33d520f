//! Declarative notification rules and the engine that expands events into jobs.

mod condition;
mod directory;
mod engine;
mod rule;
mod throttle;

pub use condition::{Condition, Logic, Operator, evaluate};
pub use directory::{Contact, InMemoryDirectory, Recipient, RecipientDirectory};
pub use engine::{RuleEngine, TriggerOutcome};
pub use rule::{DEFAULT_THROTTLE_PERIOD_SECS, NotificationRule, RecipientKind, RecipientSpec, RuleUpdate};
pub use throttle::RuleThrottle;
