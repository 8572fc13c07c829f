use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use deskshell_proto::{CreateUserCmd, User};
use deskshell_util::write_json_atomic;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::BackendError;

pub const STATE_FILE_NAME: &str = "backend.json";
const DEFAULT_ROLE: &str = "user";

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct StateFile {
    users: Vec<User>,
    settings: BTreeMap<String, String>,
}

/// Users and settings. Persisted as one JSON document unless in-memory.
#[derive(Default)]
pub struct Store {
    path: Option<PathBuf>,
    users: Vec<User>,
    settings: BTreeMap<String, String>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists. Unreadable files start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<StateFile>(&data) {
                Ok(file) => file,
                Err(err) => {
                    warn!("Failed to parse {}: {}", path.display(), err);
                    StateFile::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", path.display(), err);
                }
                StateFile::default()
            }
        };
        Self {
            path: Some(path),
            users: file.users,
            settings: file.settings,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save(&self) -> Result<(), BackendError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = StateFile {
            users: self.users.clone(),
            settings: self.settings.clone(),
        };
        write_json_atomic(path, &file).map_err(|err| BackendError::Database(err.to_string()))
    }

    pub fn create_user(&mut self, cmd: CreateUserCmd) -> Result<User, BackendError> {
        let username = cmd.username.trim();
        if username.is_empty() {
            return Err(BackendError::Domain("username must not be empty".into()));
        }
        if self.users.iter().any(|user| user.username == username) {
            return Err(BackendError::Domain(format!(
                "username {username} is already taken"
            )));
        }
        let now = timestamp();
        let role = if cmd.role.trim().is_empty() {
            DEFAULT_ROLE.to_string()
        } else {
            cmd.role.trim().to_string()
        };
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: cmd.email.filter(|email| !email.trim().is_empty()),
            role,
            created_at: now.clone(),
            updated_at: now,
        };
        self.users.insert(0, user.clone());
        if let Err(err) = self.save() {
            self.users.retain(|item| item.id != user.id);
            return Err(err);
        }
        Ok(user)
    }

    /// Newest first.
    pub fn list_users(&self) -> Vec<User> {
        self.users.clone()
    }

    pub fn delete_user(&mut self, id: &str) -> Result<(), BackendError> {
        let Some(index) = self.users.iter().position(|user| user.id == id) else {
            return Err(BackendError::NotFound(format!("User {id} not found")));
        };
        let removed = self.users.remove(index);
        if let Err(err) = self.save() {
            self.users.insert(index, removed);
            return Err(err);
        }
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).cloned()
    }

    pub fn all_settings(&self) -> BTreeMap<String, String> {
        self.settings.clone()
    }

    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        let previous = self.settings.insert(key.to_string(), value.to_string());
        if let Err(err) = self.save() {
            match previous {
                Some(previous) => self.settings.insert(key.to_string(), previous),
                None => self.settings.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    /// Probes the backing file's directory. In-memory stores are always healthy.
    pub fn check_health(&self) -> Result<u32, BackendError> {
        if let Some(parent) = self.path.as_deref().and_then(Path::parent) {
            fs::create_dir_all(parent).map_err(|err| BackendError::Database(err.to_string()))?;
        }
        Ok(1)
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
