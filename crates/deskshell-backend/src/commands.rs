//! Named command handlers.

use std::{collections::HashMap, future::Future, sync::Arc};

use deskshell_proto::{
    commands, events::SettingChange, AppEvent, CreateUserCmd, HttpRequest, LogPayload,
};
use futures_util::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::http::HttpClient;
use crate::publisher::EventPublisher;
use crate::store::Store;

#[cfg(target_os = "macos")]
const OPEN_LOG_COMMAND: &str = "open";
#[cfg(target_os = "windows")]
const OPEN_LOG_COMMAND: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPEN_LOG_COMMAND: &str = "xdg-open";

/// Shared by every connection.
#[derive(Clone)]
pub struct BackendState {
    pub store: Arc<Mutex<Store>>,
    pub publisher: EventPublisher,
    pub http: HttpClient,
}

impl BackendState {
    pub fn new(store: Store) -> Result<Self, BackendError> {
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            publisher: EventPublisher::default(),
            http: HttpClient::new()?,
        })
    }
}

type HandlerResult = Result<Value, BackendError>;
type Handler = Arc<dyn Fn(BackendState, Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl CommandRegistry {
    /// Registry with every command the UI may invoke.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(commands::GREET, greet);
        registry.register(commands::LOG_FRONTEND_MESSAGE, log_frontend_message);
        registry.register(commands::OPEN_LOG_FOLDER, open_log_folder);
        registry.register(commands::CHECK_DB_HEALTH, check_db_health);
        registry.register(commands::GET_APP_SETTING, get_app_setting);
        registry.register(commands::SET_APP_SETTING, set_app_setting);
        registry.register(commands::GET_ALL_SETTINGS, get_all_settings);
        registry.register(commands::CREATE_USER, create_user);
        registry.register(commands::LIST_USERS, list_users);
        registry.register(commands::DELETE_USER, delete_user);
        registry.register(commands::HTTP_REQUEST, http_request);
        registry
    }

    pub fn register<F, Fut>(&mut self, name: &'static str, handler: F)
    where
        F: Fn(BackendState, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |state: BackendState, args: Value| handler(state, args).boxed());
        self.handlers.insert(name, handler);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(&self, state: BackendState, command: &str, args: Value) -> HandlerResult {
        let Some(handler) = self.handlers.get(command).cloned() else {
            return Err(BackendError::UnknownCommand(command.to_string()));
        };
        debug!(command, "dispatching command");
        handler(state, args).await
    }
}

fn parse<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, BackendError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|err| BackendError::InvalidArgs {
        command: command.to_string(),
        message: err.to_string(),
    })
}

fn reply<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|err| BackendError::Io(err.to_string()))
}

#[derive(Deserialize)]
struct GreetArgs {
    name: String,
}

async fn greet(_state: BackendState, args: Value) -> HandlerResult {
    let args: GreetArgs = parse(commands::GREET, args)?;
    info!("Greeting requested for: {}", args.name);
    reply(format!("Hello, {}! Welcome to deskshell!", args.name))
}

#[derive(Deserialize)]
struct LogArgs {
    payload: LogPayload,
}

async fn log_frontend_message(_state: BackendState, args: Value) -> HandlerResult {
    let args: LogArgs = parse(commands::LOG_FRONTEND_MESSAGE, args)?;
    emit_frontend_record(args.payload);
    Ok(Value::Null)
}

/// Re-emits a UI record under the `frontend` target. Unknown levels log at info.
pub fn emit_frontend_record(payload: LogPayload) {
    use deskshell_proto::LogLevel;

    let app_target = payload.target.as_deref().unwrap_or("frontend");
    let fields = payload.fields.as_ref().map(Value::to_string).unwrap_or_default();
    let message = payload.message.as_str();
    match payload.parsed_level() {
        LogLevel::Trace => {
            tracing::trace!(target: "frontend", app_target, fields = %fields, "{message}")
        }
        LogLevel::Debug => {
            tracing::debug!(target: "frontend", app_target, fields = %fields, "{message}")
        }
        LogLevel::Info => {
            tracing::info!(target: "frontend", app_target, fields = %fields, "{message}")
        }
        LogLevel::Warn => {
            tracing::warn!(target: "frontend", app_target, fields = %fields, "{message}")
        }
        LogLevel::Error => {
            tracing::error!(target: "frontend", app_target, fields = %fields, "{message}")
        }
    }
}

async fn open_log_folder(_state: BackendState, _args: Value) -> HandlerResult {
    let log_dir = deskshell_util::log_dir();
    tokio::fs::create_dir_all(&log_dir).await?;
    let status = tokio::process::Command::new(OPEN_LOG_COMMAND)
        .arg(&log_dir)
        .status()
        .await?;
    if !status.success() {
        return Err(BackendError::Io(format!(
            "Failed to open log directory (status: {:?})",
            status.code()
        )));
    }
    Ok(Value::Null)
}

async fn check_db_health(state: BackendState, _args: Value) -> HandlerResult {
    let result = state.store.lock().await.check_health()?;
    reply(format!("Database is healthy! Result: {result}"))
}

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

async fn get_app_setting(state: BackendState, args: Value) -> HandlerResult {
    let args: KeyArgs = parse(commands::GET_APP_SETTING, args)?;
    reply(state.store.lock().await.get_setting(&args.key))
}

async fn set_app_setting(state: BackendState, args: Value) -> HandlerResult {
    let change: SettingChange = parse(commands::SET_APP_SETTING, args)?;
    state
        .store
        .lock()
        .await
        .set_setting(&change.key, &change.value)?;
    info!(key = %change.key, "setting updated");
    state.publisher.publish(AppEvent::ConfigChanged(change));
    Ok(Value::Null)
}

async fn get_all_settings(state: BackendState, _args: Value) -> HandlerResult {
    reply(state.store.lock().await.all_settings())
}

#[derive(Deserialize)]
struct CreateUserArgs {
    cmd: CreateUserCmd,
}

async fn create_user(state: BackendState, args: Value) -> HandlerResult {
    let args: CreateUserArgs = parse(commands::CREATE_USER, args)?;
    let user = state.store.lock().await.create_user(args.cmd)?;
    info!(id = %user.id, "user created");
    reply(user)
}

async fn list_users(state: BackendState, _args: Value) -> HandlerResult {
    reply(state.store.lock().await.list_users())
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

async fn delete_user(state: BackendState, args: Value) -> HandlerResult {
    let args: IdArgs = parse(commands::DELETE_USER, args)?;
    state.store.lock().await.delete_user(&args.id)?;
    info!(id = %args.id, "user deleted");
    Ok(Value::Null)
}

#[derive(Deserialize)]
struct HttpArgs {
    request: HttpRequest,
}

async fn http_request(state: BackendState, args: Value) -> HandlerResult {
    let args: HttpArgs = parse(commands::HTTP_REQUEST, args)?;
    info!(method = %args.request.method, url = %args.request.url, "http request");
    reply(state.http.execute(args.request).await?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state() -> BackendState {
        BackendState::new(Store::in_memory()).unwrap()
    }

    #[test]
    fn registers_every_ui_command() {
        let mut expected = commands::ALL.to_vec();
        expected.sort_unstable();
        assert_eq!(CommandRegistry::standard().names(), expected);
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let err = CommandRegistry::standard()
            .dispatch(state(), "format_disk", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownCommand");
    }

    #[tokio::test]
    async fn malformed_args_are_rejected() {
        let err = CommandRegistry::standard()
            .dispatch(state(), commands::DELETE_USER, json!({"ident": 3}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgs");
    }

    #[tokio::test]
    async fn set_setting_publishes_config_changed() {
        let state = state();
        let mut events = state.publisher.subscribe();
        let registry = CommandRegistry::standard();

        registry
            .dispatch(
                state.clone(),
                commands::SET_APP_SETTING,
                json!({"key": "theme_mode", "value": "dark"}),
            )
            .await
            .unwrap();

        let AppEvent::ConfigChanged(change) = events.recv().await.unwrap();
        assert_eq!(change.key, "theme_mode");
        assert_eq!(change.value, "dark");
        let value = registry
            .dispatch(state, commands::GET_APP_SETTING, json!({"key": "theme_mode"}))
            .await
            .unwrap();
        assert_eq!(value, json!("dark"));
    }

    #[tokio::test]
    async fn log_records_with_unknown_levels_are_accepted() {
        let payload = json!({"payload": {"level": "verbose", "message": "hi"}});
        let value = CommandRegistry::standard()
            .dispatch(state(), commands::LOG_FRONTEND_MESSAGE, payload)
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn frontend_records_reach_the_log_file() {
        use deskshell_proto::LogLevel;
        use tracing_subscriber::layer::SubscriberExt;

        let dir = tempfile::tempdir().unwrap();
        let (layer, guard) = deskshell_util::file_layer(dir.path());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let mut payload = LogPayload::new(LogLevel::Warn, "slow page");
            payload.target = Some("users-page".into());
            payload.fields = Some(json!({"ms": 950}));
            emit_frontend_record(payload);
        });
        drop(guard);

        let mut contents = String::new();
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            contents.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        let line = contents
            .lines()
            .find(|line| line.contains("slow page"))
            .unwrap_or_else(|| panic!("record missing from {contents:?}"));
        let record: Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["level"], "WARN");
        assert_eq!(record["target"], "frontend");
        assert_eq!(record["fields"]["app_target"], "users-page");
        assert_eq!(record["fields"]["fields"], r#"{"ms":950}"#);
    }
}
