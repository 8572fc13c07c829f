use deskshell_proto::ErrorBody;
use thiserror::Error;

/// Failure of a single command invocation.
///
/// Cloneable so one failed read can be handed to every caller sharing it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command} failed ({kind}): {message}")]
    Backend {
        command: String,
        kind: String,
        message: String,
    },
    #[error("{command}: could not encode arguments: {message}")]
    Encode { command: String, message: String },
    #[error("{command}: unexpected result shape: {message}")]
    Decode { command: String, message: String },
    #[error("backend connection closed")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),
}

impl CommandError {
    pub(crate) fn backend(command: &str, body: ErrorBody) -> Self {
        CommandError::Backend {
            command: command.to_string(),
            kind: body.kind,
            message: body.message,
        }
    }

    /// Message suitable for a user-facing notification.
    pub fn message(&self) -> String {
        match self {
            CommandError::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Backend error type (`NotFound`, `Domain`, ...), if the backend produced one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            CommandError::Backend { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some("NotFound")
    }
}
