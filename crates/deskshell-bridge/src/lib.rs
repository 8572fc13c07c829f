//! UI-side data layer: typed commands, event subscriptions, remote logging
//! and cached resources over a pluggable transport.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod ipc;
pub mod logger;
pub mod prefs;
pub mod resources;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{Observer, QueryCache, Snapshot, Status};
pub use client::CommandClient;
pub use config::BridgeConfig;
pub use error::CommandError;
pub use events::{EventBus, Subscription, SubscriptionState};
pub use ipc::IpcTransport;
pub use logger::{Logger, LoggerOptions};
pub use prefs::UiPrefs;
pub use resources::{Settings, SettingsMap, System, Users};
pub use session::Session;
pub use transport::{EventSink, ListenerId, Transport};
