//! Wire contract shared by the deskshell UI process and its backend.

pub mod commands;
pub mod events;
pub mod frames;
pub mod http;
pub mod logging;
pub mod users;

pub use events::{AppEvent, ConfigChanged, Event};
pub use frames::{ClientFrame, ErrorBody, Outcome, ServerFrame};
pub use http::{HttpRequest, HttpResponse};
pub use logging::{LogLevel, LogPayload};
pub use users::{CreateUserCmd, User};

/// Query key under which the users list is cached.
pub const USERS_KEY: &str = "users";
/// Query key under which the settings map is cached.
pub const SETTINGS_KEY: &str = "settings";
