//! Per-user delivery preferences.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::Channel;
use crate::{Error, Result};

/// Timezone applied when a user never picked one.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// A daily window during which non-urgent channels stay silent.
///
/// Supports overnight windows (e.g., 22:00 - 08:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    /// Start time in HH:MM format.
    #[serde(default = "default_start")]
    pub start: String,
    /// End time in HH:MM format.
    #[serde(default = "default_end")]
    pub end: String,
    /// IANA timezone name the window is expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_start() -> String {
    "22:00".to_string()
}

fn default_end() -> String {
    "08:00".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_start(),
            end: default_end(),
            timezone: default_timezone(),
        }
    }
}

impl QuietHours {
    /// An enabled window.
    pub fn new(start: impl Into<String>, end: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            enabled: true,
            start: start.into(),
            end: end.into(),
            timezone: timezone.into(),
        }
    }

    /// Parsed `(start, end, timezone)`.
    pub fn resolve(&self) -> Result<(NaiveTime, NaiveTime, Tz)> {
        let start = parse_time(&self.start)
            .ok_or_else(|| Error::validation(format!("Invalid quiet hours start: {}", self.start)))?;
        let end = parse_time(&self.end)
            .ok_or_else(|| Error::validation(format!("Invalid quiet hours end: {}", self.end)))?;
        let tz = self
            .timezone
            .parse::<Tz>()
            .map_err(|_| Error::validation(format!("Invalid timezone: {}", self.timezone)))?;
        Ok((start, end, tz))
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// What a user agreed to receive.
///
/// Channels and categories missing from the maps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotificationPreferences {
    pub user_id: String,
    #[serde(default)]
    pub channels: BTreeMap<Channel, bool>,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    pub updated_at: DateTime<Utc>,
}

impl UserNotificationPreferences {
    /// Every channel enabled, no category opt-outs, quiet hours off.
    pub fn defaults_for(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            channels: Channel::ALL.iter().map(|c| (*c, true)).collect(),
            categories: BTreeMap::new(),
            quiet_hours: QuietHours::default(),
            updated_at: now,
        }
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        self.channels.get(&channel).copied().unwrap_or(true)
    }

    pub fn category_enabled(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(true)
    }

    pub fn set_channel(&mut self, channel: Channel, enabled: bool) -> &mut Self {
        self.channels.insert(channel, enabled);
        self
    }

    pub fn set_category(&mut self, category: impl Into<String>, enabled: bool) -> &mut Self {
        self.categories.insert(category.into(), enabled);
        self
    }

    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let prefs = UserNotificationPreferences::defaults_for("u1", Utc::now());
        for channel in Channel::ALL {
            assert!(prefs.channel_enabled(channel));
        }
        assert!(prefs.category_enabled("opportunity"));
        assert!(!prefs.quiet_hours.enabled);
        assert_eq!(prefs.quiet_hours.timezone, "America/Sao_Paulo");
    }

    #[test]
    fn test_quiet_hours_resolve() {
        let quiet = QuietHours::new("22:00", "08:00", "America/Sao_Paulo");
        let (start, end, tz) = quiet.resolve().unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(tz, chrono_tz::America::Sao_Paulo);

        assert!(QuietHours::new("25:00", "08:00", "UTC").validate().is_err());
        assert!(QuietHours::new("22:00", "08:00", "Mars/Olympus").validate().is_err());
    }

    #[test]
    fn test_preferences_json_shape() {
        let json = r#"{
            "userId": "u1",
            "channels": {"sms": false},
            "quietHours": {"enabled": true, "start": "21:30", "end": "07:00", "timezone": "UTC"},
            "updatedAt": "2026-01-01T00:00:00Z"
        }"#;
        let prefs: UserNotificationPreferences = serde_json::from_str(json).unwrap();
        assert!(!prefs.channel_enabled(Channel::Sms));
        assert!(prefs.channel_enabled(Channel::Email));
        assert!(prefs.quiet_hours.enabled);
        assert_eq!(prefs.quiet_hours.start, "21:30");
    }
}
