//! Delivery channel value object.

use serde::{Deserialize, Serialize};

/// A delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
    Push,
    Telegram,
    /// In-app notification shown on the user's dashboard.
    Dashboard,
}

impl Channel {
    /// Every supported channel.
    pub const ALL: [Channel; 6] = [
        Self::Email,
        Self::Sms,
        Self::Whatsapp,
        Self::Push,
        Self::Telegram,
        Self::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Push => "push",
            Self::Telegram => "telegram",
            Self::Dashboard => "dashboard",
        }
    }

    /// Parse a channel name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            "push" => Some(Self::Push),
            "telegram" => Some(Self::Telegram),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::validation(format!("Unknown channel: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!(Channel::parse("EMAIL"), Some(Channel::Email));
        assert_eq!(Channel::parse(" whatsapp "), Some(Channel::Whatsapp));
        assert_eq!(Channel::parse("fax"), None);
        assert!("fax".parse::<Channel>().unwrap_err().is_validation());
    }

    #[test]
    fn test_channel_round_trips_names() {
        for channel in Channel::ALL {
            assert_eq!(Channel::parse(channel.as_str()), Some(channel));
        }
    }

    #[test]
    fn test_channel_serialization() {
        let json = serde_json::to_string(&Channel::Whatsapp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
        let parsed: Channel = serde_json::from_str("\"dashboard\"").unwrap();
        assert_eq!(parsed, Channel::Dashboard);
    }
}
