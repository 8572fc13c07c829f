//! In-memory backend used by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskshell_proto::{
    commands, CreateUserCmd, ErrorBody, HttpRequest, HttpResponse, LogPayload, User,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::CommandError;
use crate::transport::{EventSink, ListenerId, Transport};

#[derive(Default)]
struct Backend {
    users: Vec<User>,
    settings: BTreeMap<String, String>,
    logs: Vec<LogPayload>,
    next_user: u64,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    backend: Mutex<Backend>,
    calls: Mutex<HashMap<String, usize>>,
    listeners: Mutex<HashMap<ListenerId, (String, EventSink)>>,
    listen_gate: Mutex<Option<oneshot::Receiver<()>>>,
    read_delay: Mutex<Duration>,
    failing: Mutex<Vec<String>>,
    fail_listen: AtomicBool,
    next_listener: AtomicU64,
    listen_calls: AtomicUsize,
    unlisten_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_users(names: &[&str]) -> Arc<Self> {
        let transport = Self::new();
        for name in names {
            transport
                .create_user(CreateUserCmd::new(*name, "", "user"))
                .unwrap();
        }
        transport
    }

    pub(crate) fn invocations(&self, command: &str) -> usize {
        self.calls.lock().get(command).copied().unwrap_or(0)
    }

    pub(crate) fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    /// Makes every call of `command` fail at the transport level.
    pub(crate) fn fail_command(&self, command: &str) {
        self.failing.lock().push(command.to_string());
    }

    pub(crate) fn fail_listen(&self) {
        self.fail_listen.store(true, Ordering::SeqCst);
    }

    /// The next `listen` blocks until the returned sender fires.
    pub(crate) fn hold_listen(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.listen_gate.lock() = Some(rx);
        tx
    }

    pub(crate) fn emit(&self, event: &str, payload: Value) {
        for (name, sink) in self.listeners.lock().values() {
            if name == event {
                let _ = sink.send(payload.clone());
            }
        }
    }

    pub(crate) fn live_listeners(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn listen_calls(&self) -> usize {
        self.listen_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn unlisten_calls(&self) -> usize {
        self.unlisten_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logs(&self) -> Vec<LogPayload> {
        self.backend.lock().logs.clone()
    }

    pub(crate) fn setting(&self, key: &str) -> Option<String> {
        self.backend.lock().settings.get(key).cloned()
    }

    fn create_user(&self, cmd: CreateUserCmd) -> Result<User, ErrorBody> {
        let mut backend = self.backend.lock();
        if cmd.username.trim().is_empty() {
            return Err(domain("username must not be empty"));
        }
        if backend.users.iter().any(|u| u.username == cmd.username) {
            return Err(domain(&format!("username {} is already taken", cmd.username)));
        }
        backend.next_user += 1;
        let user = User {
            id: format!("user-{}", backend.next_user),
            username: cmd.username,
            email: cmd.email,
            role: cmd.role,
            created_at: "2026-01-01 00:00:00".into(),
            updated_at: "2026-01-01 00:00:00".into(),
        };
        backend.users.push(user.clone());
        Ok(user)
    }

    fn dispatch(&self, command: &str, args: Value) -> Result<Value, ErrorBody> {
        match command {
            commands::LIST_USERS => Ok(json!(self.backend.lock().users)),
            commands::CREATE_USER => {
                let cmd: CreateUserCmd = serde_json::from_value(args["cmd"].clone())
                    .map_err(|err| error("InvalidArgs", &err.to_string()))?;
                self.create_user(cmd).map(|user| json!(user))
            }
            commands::DELETE_USER => {
                let id = args["id"].as_str().unwrap_or_default().to_string();
                let mut backend = self.backend.lock();
                let before = backend.users.len();
                backend.users.retain(|u| u.id != id);
                if backend.users.len() == before {
                    return Err(error("NotFound", &format!("User {id} not found")));
                }
                Ok(Value::Null)
            }
            commands::GET_ALL_SETTINGS => Ok(json!(self.backend.lock().settings)),
            commands::GET_APP_SETTING => {
                let key = args["key"].as_str().unwrap_or_default();
                Ok(json!(self.backend.lock().settings.get(key)))
            }
            commands::SET_APP_SETTING => {
                let key = args["key"].as_str().unwrap_or_default().to_string();
                let value = args["value"].as_str().unwrap_or_default().to_string();
                self.backend.lock().settings.insert(key, value);
                Ok(Value::Null)
            }
            commands::LOG_FRONTEND_MESSAGE => {
                let payload: LogPayload = serde_json::from_value(args["payload"].clone())
                    .map_err(|err| error("InvalidArgs", &err.to_string()))?;
                self.backend.lock().logs.push(payload);
                Ok(Value::Null)
            }
            commands::CHECK_DB_HEALTH => Ok(json!("Database is healthy! Result: 1")),
            commands::OPEN_LOG_FOLDER => Ok(Value::Null),
            commands::GREET => {
                let name = args["name"].as_str().unwrap_or_default();
                Ok(json!(format!("Hello, {name}!")))
            }
            commands::HTTP_REQUEST => {
                let request: HttpRequest = serde_json::from_value(args["request"].clone())
                    .map_err(|err| error("InvalidArgs", &err.to_string()))?;
                Ok(json!(HttpResponse {
                    status: 200,
                    headers: [("x-echo-method".to_string(), request.method)].into(),
                    body: json!({ "url": request.url, "query": request.query }),
                }))
            }
            other => Err(error("UnknownCommand", &format!("unknown command: {other}"))),
        }
    }
}

fn error(kind: &str, message: &str) -> ErrorBody {
    ErrorBody {
        kind: kind.to_string(),
        message: message.to_string(),
    }
}

fn domain(message: &str) -> ErrorBody {
    error("Domain", message)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandError> {
        *self.calls.lock().entry(command.to_string()).or_default() += 1;
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().iter().any(|c| c == command) {
            return Err(CommandError::Transport(format!("{command}: pipe closed")));
        }
        self.dispatch(command, args)
            .map_err(|body| CommandError::backend(command, body))
    }

    async fn listen(&self, event: &str, sink: EventSink) -> Result<ListenerId, CommandError> {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listen.load(Ordering::SeqCst) {
            return Err(CommandError::Transport("listen refused".into()));
        }
        let listener = self.next_listener.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners
            .lock()
            .insert(listener, (event.to_string(), sink));
        let gate = self.listen_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(listener)
    }

    async fn unlisten(&self, listener: ListenerId) -> Result<(), CommandError> {
        self.unlisten_calls.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().remove(&listener);
        Ok(())
    }
}
