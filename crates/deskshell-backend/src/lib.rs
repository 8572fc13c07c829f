//! Reference backend for the deskshell UI: users, settings, log sink and
//! event publishing behind the newline-delimited JSON protocol.

pub mod commands;
pub mod error;
pub mod http;
pub mod publisher;
pub mod server;
pub mod store;

pub use commands::{BackendState, CommandRegistry};
pub use error::BackendError;
pub use http::HttpClient;
pub use publisher::EventPublisher;
pub use server::serve;
pub use store::Store;
