use deskshell_proto::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Domain rule violation: {0}")]
    Domain(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid arguments for {command}: {message}")]
    InvalidArgs { command: String, message: String },
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Database(_) => "Database",
            BackendError::Io(_) => "Io",
            BackendError::Domain(_) => "Domain",
            BackendError::NotFound(_) => "NotFound",
            BackendError::UnknownCommand(_) => "UnknownCommand",
            BackendError::InvalidArgs { .. } => "InvalidArgs",
        }
    }

    /// Wire form, `{"type", "message"}`.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}
