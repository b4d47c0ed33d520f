//! User preferences and the quiet-hours filter.

mod filter;
mod store;
mod types;

pub use filter::{QuietHoursPolicy, should_deliver};
pub use store::{InMemoryPreferenceStore, PreferenceStore};
pub use types::{DEFAULT_TIMEZONE, QuietHours, UserNotificationPreferences};
