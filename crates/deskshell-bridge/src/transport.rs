//! The process boundary. Everything the UI knows about the backend goes
//! through this trait.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::CommandError;

pub type ListenerId = u64;

/// Receives raw event payloads for one listener registration.
pub type EventSink = mpsc::UnboundedSender<Value>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Runs one named command. Exactly one request per call.
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandError>;

    /// Registers `sink` for `event`. Payloads may be pushed into the sink as
    /// soon as this is called, before it resolves.
    async fn listen(&self, event: &str, sink: EventSink) -> Result<ListenerId, CommandError>;

    async fn unlisten(&self, listener: ListenerId) -> Result<(), CommandError>;
}
