use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:50061";

pub fn env_addr(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn backend_addr() -> String {
    env_addr("DESKSHELL_BACKEND_ADDR", DEFAULT_BACKEND_ADDR)
}

pub fn env_flag(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DESKSHELL_DATA_DIR") {
        if !dir.trim().is_empty() {
            return expand_user(dir.trim());
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/deskshell")
    } else {
        PathBuf::from("/tmp/deskshell")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub const LOG_FILE_PREFIX: &str = "app.log";

pub use tracing_appender::non_blocking::WorkerGuard;

fn log_timer() -> ChronoLocal {
    ChronoLocal::new("%Y-%m-%dT%H:%M:%S%.3f".to_string())
}

/// JSON records at `info` and above, rolled daily under `log_dir`. Records are
/// written on a background thread until the guard is dropped.
pub fn file_layer<S>(log_dir: &Path) -> (impl Layer<S>, WorkerGuard)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .json()
        .with_writer(writer)
        .with_timer(log_timer())
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new("info"));
    (layer, guard)
}

/// Console output filtered by `RUST_LOG` plus the rolling JSON file in
/// `log_dir`. Keep the guard alive for as long as records should reach disk.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    let console = fmt::layer()
        .with_timer(log_timer())
        .with_target(true)
        .with_filter(EnvFilter::from_default_env().add_directive("info".parse()?));
    let (file, guard) = file_layer(log_dir);
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    tracing::info!(
        target: "backend",
        pid = std::process::id(),
        "logging initialized, log directory: {}",
        log_dir.display()
    );
    Ok(guard)
}
