//! Newline-delimited JSON frames exchanged over the IPC socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    Invoke {
        id: u64,
        cmd: String,
        #[serde(default)]
        args: Value,
    },
    /// `listener` is chosen by the client so it can route events before the
    /// reply arrives.
    Listen { id: u64, listener: u64, event: String },
    Unlisten { id: u64, listener: u64 },
}

impl ClientFrame {
    pub fn id(&self) -> u64 {
        match self {
            ClientFrame::Invoke { id, .. }
            | ClientFrame::Listen { id, .. }
            | ClientFrame::Unlisten { id, .. } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply { id: u64, outcome: Outcome },
    Event {
        listener: u64,
        event: String,
        payload: Value,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok(Value),
    Err(ErrorBody),
}

/// Error shape reported by the backend: `{"type": "...", "message": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Serializes a frame as a single line, newline included.
pub fn to_line<T: Serialize>(frame: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(line)
}
