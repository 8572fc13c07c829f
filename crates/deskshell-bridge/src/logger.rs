//! Remote logger: forwards UI log records to the backend for storage.
//!
//! Callers never wait on it and never see its failures. Records are queued
//! and sent one at a time in order; anything that cannot be sent is reported
//! on stderr only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use deskshell_proto::{commands, LogLevel, LogPayload};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::client::CommandClient;

const LOG_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct LoggerOptions {
    /// Mirror every record to stderr.
    pub dev_console: bool,
    /// Reported as the record's `target`.
    pub target: Option<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            dev_console: cfg!(debug_assertions),
            target: None,
        }
    }
}

enum Message {
    Record(LogPayload),
    Flush(oneshot::Sender<()>),
}

pub struct Logger {
    sender: mpsc::Sender<Message>,
    dev_console: bool,
    target: Option<String>,
    dropped: AtomicU64,
}

static LOGGER: OnceLock<Arc<Logger>> = OnceLock::new();

/// Installs the process-wide logger. Later calls return the first instance.
pub fn init(client: CommandClient, options: LoggerOptions) -> Arc<Logger> {
    if let Some(existing) = LOGGER.get() {
        return Arc::clone(existing);
    }
    let logger = Logger::spawn(client, options);
    let _ = LOGGER.set(Arc::clone(&logger));
    LOGGER.get().map(Arc::clone).unwrap_or(logger)
}

pub fn global() -> Option<Arc<Logger>> {
    LOGGER.get().map(Arc::clone)
}

pub fn log(level: LogLevel, message: impl Into<String>, fields: Option<Value>) {
    if let Some(logger) = LOGGER.get() {
        logger.log(level, message, fields);
    }
}

pub fn trace(message: impl Into<String>) {
    log(LogLevel::Trace, message, None);
}

pub fn debug(message: impl Into<String>) {
    log(LogLevel::Debug, message, None);
}

pub fn info(message: impl Into<String>) {
    log(LogLevel::Info, message, None);
}

pub fn warn(message: impl Into<String>) {
    log(LogLevel::Warn, message, None);
}

pub fn error(message: impl Into<String>) {
    log(LogLevel::Error, message, None);
}

impl Logger {
    /// Builds a standalone logger and starts its forwarding task on the
    /// current runtime. Without a runtime, records only reach the console.
    pub fn spawn(client: CommandClient, options: LoggerOptions) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(LOG_QUEUE_CAPACITY);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(forward(client, receiver));
            }
            Err(_) => eprintln!("logger: no async runtime, records will not be forwarded"),
        }
        Arc::new(Self {
            sender,
            dev_console: options.dev_console,
            target: options.target,
            dropped: AtomicU64::new(0),
        })
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, fields: Option<Value>) {
        let mut payload = LogPayload::new(level, message);
        payload.fields = fields;
        payload.target = self.target.clone();
        if self.dev_console {
            eprintln!("{}", console_line(&payload));
        }
        if self.sender.try_send(Message::Record(payload)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    /// Records discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Waits until every record queued so far has been sent or given up on.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn forward(client: CommandClient, mut receiver: mpsc::Receiver<Message>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Record(payload) => {
                if let Err(err) = client
                    .invoke::<()>(commands::LOG_FRONTEND_MESSAGE, json!({ "payload": payload }))
                    .await
                {
                    eprintln!("logger: failed to send log to backend: {err}");
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn console_line(payload: &LogPayload) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S");
    let level = payload.level.to_ascii_uppercase();
    match &payload.fields {
        Some(fields) => format!("{timestamp} [{level}] {} {fields}", payload.message),
        None => format!("{timestamp} [{level}] {}", payload.message),
    }
}
