//! Cached views of backend resources plus the mutations that invalidate them.

mod settings;
mod system;
mod users;

pub use settings::{Settings, SettingsMap};
pub use system::System;
pub use users::Users;
