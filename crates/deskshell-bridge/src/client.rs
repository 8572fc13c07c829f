use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::CommandError;
use crate::transport::Transport;

/// Typed front of a [`Transport`].
#[derive(Clone)]
pub struct CommandClient {
    transport: Arc<dyn Transport>,
}

impl CommandClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Invokes `command` with `args` (use `()` for none) and decodes the
    /// result as `T`. A result that does not fit `T` is an error, never a
    /// default value.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        command: &str,
        args: impl Serialize,
    ) -> Result<T, CommandError> {
        let args = serde_json::to_value(args).map_err(|err| CommandError::Encode {
            command: command.to_string(),
            message: err.to_string(),
        })?;
        debug!(command, "invoking command");
        let value = match self.transport.invoke(command, args).await {
            Ok(value) => value,
            Err(err) => {
                warn!(command, error = %err, "command failed");
                return Err(err);
            }
        };
        serde_json::from_value(value).map_err(|err| {
            warn!(command, error = %err, "command returned an unexpected shape");
            CommandError::Decode {
                command: command.to_string(),
                message: err.to_string(),
            }
        })
    }
}
