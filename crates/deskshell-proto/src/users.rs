use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Free-form tag, "admin" or "user" in practice.
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserCmd {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
}

impl CreateUserCmd {
    /// Builds a command, treating a blank email as absent.
    pub fn new(username: impl Into<String>, email: &str, role: impl Into<String>) -> Self {
        let email = email.trim();
        Self {
            username: username.into(),
            email: if email.is_empty() {
                None
            } else {
                Some(email.to_string())
            },
            role: role.into(),
        }
    }
}
