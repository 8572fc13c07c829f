//! Socket transport: newline-delimited JSON frames over any byte stream,
//! TCP in practice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deskshell_proto::frames::to_line;
use deskshell_proto::{ClientFrame, Outcome, ServerFrame};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::transport::{EventSink, ListenerId, Transport};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Outcome>>>>;
type Listeners = Arc<Mutex<HashMap<ListenerId, EventSink>>>;

pub struct IpcTransport {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    pending: Pending,
    listeners: Listeners,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    next_listener: AtomicU64,
}

impl IpcTransport {
    pub async fn connect(addr: &str) -> Result<Arc<Self>, CommandError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| CommandError::Transport(format!("connect {addr}: {err}")))?;
        info!("connected to backend at {addr}");
        Ok(Self::from_stream(stream))
    }

    /// Takes ownership of `stream` and starts the reader and writer tasks.
    pub fn from_stream<S>(stream: S) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let pending: Pending = Arc::default();
        let listeners: Listeners = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(line) = outgoing_rx.recv().await {
                if let Err(err) = write_half.write_all(&line).await {
                    warn!(error = %err, "ipc write failed");
                    break;
                }
            }
        });

        tokio::spawn(read_loop(
            BufReader::new(read_half),
            Arc::clone(&pending),
            Arc::clone(&listeners),
            Arc::clone(&closed),
        ));

        Arc::new(Self {
            outgoing,
            pending,
            listeners,
            closed,
            next_id: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn request(&self, frame: ClientFrame) -> Result<Outcome, CommandError> {
        if self.is_closed() {
            return Err(CommandError::Disconnected);
        }
        let id = frame.id();
        let line = to_line(&frame).map_err(|err| CommandError::Transport(err.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id, reply_tx);
        // The reader marks the connection closed before draining `pending`,
        // so checking again here cannot miss a drain.
        if self.is_closed() || self.outgoing.send(line).is_err() {
            self.pending.lock().remove(&id);
            return Err(CommandError::Disconnected);
        }
        reply_rx.await.map_err(|_| CommandError::Disconnected)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

async fn read_loop<R>(mut reader: BufReader<R>, pending: Pending, listeners: Listeners, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("backend closed the connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "ipc read failed");
                break;
            }
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Reply { id, outcome }) => {
                let waiter = pending.lock().remove(&id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(id, "reply for a request nobody waits on"),
                }
            }
            Ok(ServerFrame::Event {
                listener,
                event,
                payload,
            }) => {
                let mut listeners = listeners.lock();
                let gone = match listeners.get(&listener) {
                    Some(sink) => sink.send(payload).is_err(),
                    None => false,
                };
                if gone {
                    debug!(listener, event = %event, "dropping event for closed listener");
                    listeners.remove(&listener);
                }
            }
            Err(err) => warn!(error = %err, "ignoring malformed frame from backend"),
        }
    }

    closed.store(true, Ordering::SeqCst);
    pending.lock().clear();
    listeners.lock().clear();
}

#[async_trait]
impl Transport for IpcTransport {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandError> {
        let frame = ClientFrame::Invoke {
            id: self.next_id(),
            cmd: command.to_string(),
            args,
        };
        match self.request(frame).await? {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(body) => Err(CommandError::backend(command, body)),
        }
    }

    async fn listen(&self, event: &str, sink: EventSink) -> Result<ListenerId, CommandError> {
        let listener = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(listener, sink);
        let frame = ClientFrame::Listen {
            id: self.next_id(),
            listener,
            event: event.to_string(),
        };
        let outcome = self.request(frame).await;
        match outcome {
            Ok(Outcome::Ok(_)) => Ok(listener),
            Ok(Outcome::Err(body)) => {
                self.listeners.lock().remove(&listener);
                Err(CommandError::backend("listen", body))
            }
            Err(err) => {
                self.listeners.lock().remove(&listener);
                Err(err)
            }
        }
    }

    async fn unlisten(&self, listener: ListenerId) -> Result<(), CommandError> {
        self.listeners.lock().remove(&listener);
        let frame = ClientFrame::Unlisten {
            id: self.next_id(),
            listener,
        };
        match self.request(frame).await? {
            Outcome::Ok(_) => Ok(()),
            Outcome::Err(body) => Err(CommandError::backend("unlisten", body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    #[tokio::test]
    async fn pairs_replies_by_id() {
        let (client_side, server_side) = duplex(4096);
        let transport = IpcTransport::from_stream(client_side);
        let (server_read, mut server_write) = tokio::io::split(server_side);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let first: ClientFrame =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let second: ClientFrame =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            // Answer out of order.
            for (frame, answer) in [(second, "b"), (first, "a")] {
                let reply = ServerFrame::Reply {
                    id: frame.id(),
                    outcome: Outcome::Ok(json!(answer)),
                };
                server_write.write_all(&to_line(&reply).unwrap()).await.unwrap();
            }
        });

        let (first, second) = tokio::join!(
            transport.invoke("greet", json!({"name": "a"})),
            transport.invoke("greet", json!({"name": "b"})),
        );
        server.await.unwrap();
        let mut answers = vec![first.unwrap(), second.unwrap()];
        answers.sort_by_key(|v| v.to_string());
        assert_eq!(answers, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn dropped_connection_fails_pending_calls() {
        let (client_side, server_side) = duplex(4096);
        let transport = IpcTransport::from_stream(client_side);

        let call = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.invoke("list_users", Value::Null).await })
        };
        tokio::task::yield_now().await;
        drop(server_side);

        assert_eq!(call.await.unwrap(), Err(CommandError::Disconnected));
        assert!(transport.is_closed());
        assert_eq!(
            transport.invoke("list_users", Value::Null).await,
            Err(CommandError::Disconnected)
        );
    }

    #[tokio::test]
    async fn backend_errors_keep_type_and_message() {
        let (client_side, server_side) = duplex(4096);
        let transport = IpcTransport::from_stream(client_side);
        let (server_read, mut server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame: ClientFrame = serde_json::from_str(&line).unwrap();
                let reply = ServerFrame::Reply {
                    id: frame.id(),
                    outcome: Outcome::Err(deskshell_proto::ErrorBody {
                        kind: "NotFound".into(),
                        message: "User no-such-id not found".into(),
                    }),
                };
                server_write.write_all(&to_line(&reply).unwrap()).await.unwrap();
            }
        });

        let err = transport
            .invoke("delete_user", json!({"id": "no-such-id"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "User no-such-id not found");
    }
}
