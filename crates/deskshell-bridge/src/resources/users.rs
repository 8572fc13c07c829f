use std::sync::Arc;

use deskshell_proto::{commands, CreateUserCmd, User, USERS_KEY};
use serde_json::json;
use tracing::info;

use crate::cache::{Observer, QueryCache, Snapshot};
use crate::client::CommandClient;
use crate::error::CommandError;

#[derive(Clone)]
pub struct Users {
    client: CommandClient,
    cache: QueryCache,
}

impl Users {
    pub fn new(client: CommandClient, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    /// Cached `list_users`.
    pub async fn list(&self) -> Result<Arc<Vec<User>>, CommandError> {
        let client = self.client.clone();
        self.cache
            .fetch(USERS_KEY, move || {
                let client = client.clone();
                async move { client.invoke::<Vec<User>>(commands::LIST_USERS, ()).await }
            })
            .await
    }

    pub fn observe(&self) -> Observer {
        self.cache.observe(USERS_KEY)
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.cache.snapshot(USERS_KEY)
    }

    /// Creates a user. Only a successful create invalidates the list.
    pub async fn create(&self, cmd: CreateUserCmd) -> Result<User, CommandError> {
        let user: User = self
            .client
            .invoke(commands::CREATE_USER, json!({ "cmd": cmd }))
            .await?;
        info!(id = %user.id, username = %user.username, "user created");
        self.cache.invalidate(USERS_KEY);
        Ok(user)
    }

    pub async fn delete(&self, id: &str) -> Result<(), CommandError> {
        self.client
            .invoke::<()>(commands::DELETE_USER, json!({ "id": id }))
            .await?;
        info!(id, "user deleted");
        self.cache.invalidate(USERS_KEY);
        Ok(())
    }
}
