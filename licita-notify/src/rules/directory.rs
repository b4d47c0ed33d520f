//! Recipient lookup.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::domain::Channel;

/// Addresses known for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Falls back to `phone` when unset.
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Contact {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_telegram(mut self, chat_id: impl Into<String>) -> Self {
        self.telegram_chat_id = Some(chat_id.into());
        self
    }

    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// The address to use for `channel`, if this contact has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        let address = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
            Channel::Whatsapp => self.whatsapp.as_deref().or(self.phone.as_deref()),
            Channel::Telegram => self.telegram_chat_id.as_deref(),
            Channel::Push => self.push_token.as_deref(),
            Channel::Dashboard => Some(self.user_id.as_str()),
        };
        address.filter(|a| !a.trim().is_empty())
    }
}

/// A resolved recipient of a rule expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A user in the directory; preferences apply.
    User(Contact),
    /// A bare address from a custom target list; no preferences apply.
    External(String),
}

impl Recipient {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(contact) => Some(contact.user_id.as_str()),
            Self::External(_) => None,
        }
    }

    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match self {
            Self::User(contact) => contact.address_for(channel),
            Self::External(_) if channel == Channel::Dashboard => None,
            Self::External(address) => Some(address.as_str()),
        }
    }
}

/// Where user contact data and roles come from.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>>;

    async fn users_with_roles(&self, roles: &[String]) -> Result<Vec<String>>;

    async fn all_users(&self) -> Result<Vec<String>>;
}

/// Directory kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    contacts: DashMap<String, Contact>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contact: Contact) {
        self.contacts.insert(contact.user_id.clone(), contact);
    }

    pub fn remove(&self, user_id: &str) -> Option<Contact> {
        self.contacts.remove(user_id).map(|(_, c)| c)
    }
}

impl FromIterator<Contact> for InMemoryDirectory {
    fn from_iter<T: IntoIterator<Item = Contact>>(iter: T) -> Self {
        let directory = Self::new();
        for contact in iter {
            directory.insert(contact);
        }
        directory
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>> {
        Ok(self.contacts.get(user_id).map(|c| c.value().clone()))
    }

    async fn users_with_roles(&self, roles: &[String]) -> Result<Vec<String>> {
        let mut users: Vec<String> = self
            .contacts
            .iter()
            .filter(|c| c.roles.iter().any(|r| roles.contains(r)))
            .map(|c| c.user_id.clone())
            .collect();
        users.sort();
        Ok(users)
    }

    async fn all_users(&self) -> Result<Vec<String>> {
        let mut users: Vec<String> = self.contacts.iter().map(|c| c.user_id.clone()).collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_for() {
        let contact = Contact::new("u1").with_email("a@b.com").with_phone("+5511999990000");
        assert_eq!(contact.address_for(Channel::Email), Some("a@b.com"));
        assert_eq!(contact.address_for(Channel::Whatsapp), Some("+5511999990000"));
        assert_eq!(contact.address_for(Channel::Dashboard), Some("u1"));
        assert_eq!(contact.address_for(Channel::Telegram), None);
    }

    #[test]
    fn test_blank_address_is_missing() {
        let contact = Contact::new("u1").with_email("  ");
        assert_eq!(contact.address_for(Channel::Email), None);
    }

    #[test]
    fn test_external_recipient() {
        let recipient = Recipient::External("ops@example.com".into());
        assert_eq!(recipient.user_id(), None);
        assert_eq!(recipient.address_for(Channel::Email), Some("ops@example.com"));
        assert_eq!(recipient.address_for(Channel::Dashboard), None);
    }

    #[tokio::test]
    async fn test_directory_queries() {
        let directory: InMemoryDirectory = [
            Contact::new("u2").with_roles(["buyer"]),
            Contact::new("u1").with_roles(["buyer", "admin"]),
            Contact::new("u3").with_roles(["legal"]),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            directory.users_with_roles(&["buyer".to_string()]).await.unwrap(),
            vec!["u1".to_string(), "u2".to_string()]
        );
        assert_eq!(directory.all_users().await.unwrap().len(), 3);
        assert!(directory.contact("u3").await.unwrap().is_some());
        assert!(directory.contact("u9").await.unwrap().is_none());
    }
}
