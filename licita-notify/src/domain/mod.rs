//! Domain value objects shared by the rule engine, the queue and the providers.

mod channel;
mod priority;
mod retry_policy;

pub use channel::Channel;
pub use priority::NotificationPriority;
pub use retry_policy::RetryPolicy;
