use std::collections::BTreeMap;
use std::sync::Arc;

use deskshell_proto::{commands, ConfigChanged, SETTINGS_KEY};
use serde_json::json;
use tracing::debug;

use crate::cache::{Observer, QueryCache, Snapshot};
use crate::client::CommandClient;
use crate::error::CommandError;
use crate::events::{EventBus, Subscription};

pub type SettingsMap = BTreeMap<String, String>;

#[derive(Clone)]
pub struct Settings {
    client: CommandClient,
    cache: QueryCache,
    events: EventBus,
}

impl Settings {
    pub fn new(client: CommandClient, cache: QueryCache, events: EventBus) -> Self {
        Self {
            client,
            cache,
            events,
        }
    }

    /// Cached `get_all_settings`.
    pub async fn all(&self) -> Result<Arc<SettingsMap>, CommandError> {
        let client = self.client.clone();
        self.cache
            .fetch(SETTINGS_KEY, move || {
                let client = client.clone();
                async move { client.invoke::<SettingsMap>(commands::GET_ALL_SETTINGS, ()).await }
            })
            .await
    }

    /// One value out of the cached map.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CommandError> {
        Ok(self.all().await?.get(key).cloned())
    }

    /// Uncached `get_app_setting`.
    pub async fn fetch_one(&self, key: &str) -> Result<Option<String>, CommandError> {
        self.client
            .invoke(commands::GET_APP_SETTING, json!({ "key": key }))
            .await
    }

    pub async fn update(&self, key: &str, value: &str) -> Result<(), CommandError> {
        self.client
            .invoke::<()>(commands::SET_APP_SETTING, json!({ "key": key, "value": value }))
            .await?;
        self.cache.invalidate(SETTINGS_KEY);
        Ok(())
    }

    pub fn observe(&self) -> Observer {
        self.cache.observe(SETTINGS_KEY)
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.cache.snapshot(SETTINGS_KEY)
    }

    /// Invalidates the settings map whenever any client changes a setting.
    pub fn watch_changes(&self) -> Subscription {
        let cache = self.cache.clone();
        self.events.subscribe::<ConfigChanged, _>(move |change| {
            debug!(key = %change.key, "setting changed remotely");
            cache.invalidate(SETTINGS_KEY);
        })
    }
}
