//! Preference persistence seam.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::types::UserNotificationPreferences;
use crate::Result;
use crate::clock::Clock;

/// Where user preferences live.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserNotificationPreferences>>;

    async fn put(&self, prefs: UserNotificationPreferences) -> Result<()>;

    /// Stored preferences, or freshly persisted defaults for unknown users.
    async fn get_or_default(&self, user_id: &str) -> Result<UserNotificationPreferences>;
}

/// Preferences kept in process memory.
pub struct InMemoryPreferenceStore {
    entries: DashMap<String, UserNotificationPreferences>,
    clock: Arc<dyn Clock>,
}

impl InMemoryPreferenceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserNotificationPreferences>> {
        Ok(self.entries.get(user_id).map(|e| e.value().clone()))
    }

    async fn put(&self, mut prefs: UserNotificationPreferences) -> Result<()> {
        prefs.updated_at = self.clock.now();
        self.entries.insert(prefs.user_id.clone(), prefs);
        Ok(())
    }

    async fn get_or_default(&self, user_id: &str) -> Result<UserNotificationPreferences> {
        let entry = self
            .entries
            .entry(user_id.to_string())
            .or_insert_with(|| UserNotificationPreferences::defaults_for(user_id, self.clock.now()));
        Ok(entry.value().clone())
    }
}
