//! Preference and quiet-hours checks.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::UserNotificationPreferences;
use crate::domain::Channel;

/// Whether a user accepts `channel` for `category` at all.
///
/// Quiet hours are not considered here; they defer, they never drop.
pub fn should_deliver(
    prefs: &UserNotificationPreferences,
    channel: Channel,
    category: Option<&str>,
) -> bool {
    if !prefs.channel_enabled(channel) {
        return false;
    }
    match category {
        Some(category) => prefs.category_enabled(category),
        None => true,
    }
}

/// Engine-wide quiet-hours behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHoursPolicy {
    /// Local hour on the next calendar day at which deferred jobs resume.
    #[serde(default = "default_resume_hour")]
    pub resume_hour: u32,
    /// Channels that ignore quiet hours.
    #[serde(default = "default_exempt_channels")]
    pub exempt_channels: Vec<Channel>,
}

fn default_resume_hour() -> u32 {
    8
}

fn default_exempt_channels() -> Vec<Channel> {
    vec![Channel::Email, Channel::Dashboard]
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            resume_hour: default_resume_hour(),
            exempt_channels: default_exempt_channels(),
        }
    }
}

impl QuietHoursPolicy {
    pub fn is_exempt(&self, channel: Channel) -> bool {
        self.exempt_channels.contains(&channel)
    }

    /// Whether `now` falls inside the user's quiet window.
    ///
    /// Both bounds are inclusive at minute resolution. A window whose start
    /// is after its end wraps midnight. An unparseable window never matches.
    pub fn is_in_quiet_hours(&self, prefs: &UserNotificationPreferences, now: DateTime<Utc>) -> bool {
        if !prefs.quiet_hours.enabled {
            return false;
        }
        let (start, end, tz) = match prefs.quiet_hours.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(user_id = %prefs.user_id, error = %e, "Ignoring invalid quiet hours");
                return false;
            }
        };

        let local = now.with_timezone(&tz);
        let current = local.hour() * 60 + local.minute();
        let start = minutes_of(start);
        let end = minutes_of(end);

        if start <= end {
            current >= start && current <= end
        } else {
            current >= start || current <= end
        }
    }

    /// When a job deferred at `now` should become eligible again: the next
    /// calendar day at `resume_hour`, in the user's timezone.
    pub fn resume_at(&self, prefs: &UserNotificationPreferences, now: DateTime<Utc>) -> DateTime<Utc> {
        let tz = match prefs.quiet_hours.resolve() {
            Ok((_, _, tz)) => tz,
            Err(_) => chrono_tz::UTC,
        };
        let local = now.with_timezone(&tz);
        let hour = self.resume_hour.min(23);
        let Some(next_day) = local.date_naive().succ_opt() else {
            return now + Duration::days(1);
        };
        let Some(naive) = next_day.and_hms_opt(hour, 0, 0) else {
            return now + Duration::days(1);
        };

        match tz.from_local_datetime(&naive).earliest() {
            Some(resume) => resume.with_timezone(&Utc),
            // Resume hour fell into a DST gap; the following hour exists.
            None => tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| now + Duration::days(1)),
        }
    }

    /// `Some(resume_at)` when a `channel` delivery at `at` must wait.
    pub fn deferral(
        &self,
        prefs: &UserNotificationPreferences,
        channel: Channel,
        at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.is_exempt(channel) || !self.is_in_quiet_hours(prefs, at) {
            return None;
        }
        Some(self.resume_at(prefs, at))
    }
}

fn minutes_of(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
