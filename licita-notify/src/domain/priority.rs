//! Priority value object.

use serde::{Deserialize, Serialize};

/// Delivery priority for a notification job.
///
/// Ordering follows urgency: `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    /// Standard notifications.
    #[default]
    #[serde(alias = "medium")]
    Normal,
    /// Important events.
    High,
    /// Requires immediate attention.
    Critical,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a priority name. `medium` is accepted as `normal`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" | "medium" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationPriority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::validation(format!("Invalid priority: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Critical > NotificationPriority::High);
        assert!(NotificationPriority::High > NotificationPriority::Normal);
        assert!(NotificationPriority::Normal > NotificationPriority::Low);
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(NotificationPriority::default(), NotificationPriority::Normal);
    }

    #[test]
    fn test_priority_medium_alias() {
        assert_eq!(NotificationPriority::parse("MEDIUM"), Some(NotificationPriority::Normal));
        let parsed: NotificationPriority = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, NotificationPriority::Normal);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"normal\"");
    }

    #[test]
    fn test_priority_from_str_invalid() {
        assert!("urgent".parse::<NotificationPriority>().is_err());
    }
}
