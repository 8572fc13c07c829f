//! Socket front end: one task per connection speaking newline-delimited JSON.

use std::{collections::HashMap, sync::Arc};

use deskshell_proto::frames::to_line;
use deskshell_proto::{AppEvent, ClientFrame, Outcome, ServerFrame};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex},
};
use tracing::{debug, info, warn};

use crate::commands::{BackendState, CommandRegistry};

/// Listener id chosen by the client, mapped to the event it wants.
type Listeners = Arc<Mutex<HashMap<u64, String>>>;

/// Accepts connections until the listener fails.
pub async fn serve(listener: TcpListener, state: BackendState) -> std::io::Result<()> {
    let registry = Arc::new(CommandRegistry::standard());
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("window connected from {peer}");
        let state = state.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            handle_connection(stream, state, registry).await;
            info!("window {peer} disconnected");
        });
    }
}

pub async fn handle_connection<S>(stream: S, state: BackendState, registry: Arc<CommandRegistry>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let listeners: Listeners = Arc::default();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outgoing_rx.recv().await {
            let line = match to_line(&frame) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "failed to encode frame");
                    continue;
                }
            };
            if let Err(err) = write_half.write_all(&line).await {
                debug!(error = %err, "write to window failed");
                break;
            }
        }
    });

    let fanout = tokio::spawn(fan_out(
        state.publisher.subscribe(),
        Arc::clone(&listeners),
        outgoing.clone(),
    ));

    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "read from window failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let frame = match serde_json::from_str::<ClientFrame>(&line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "ignoring malformed frame");
                continue;
            }
        };
        match frame {
            ClientFrame::Invoke { id, cmd, args } => {
                let state = state.clone();
                let registry = Arc::clone(&registry);
                let outgoing = outgoing.clone();
                tokio::spawn(async move {
                    let outcome = match registry.dispatch(state, &cmd, args).await {
                        Ok(value) => Outcome::Ok(value),
                        Err(err) => {
                            debug!(command = %cmd, error = %err, "command failed");
                            Outcome::Err(err.to_body())
                        }
                    };
                    let _ = outgoing.send(ServerFrame::Reply { id, outcome });
                });
            }
            ClientFrame::Listen { id, listener, event } => {
                debug!(listener, event = %event, "listen");
                listeners.lock().await.insert(listener, event);
                let _ = outgoing.send(ok_reply(id));
            }
            ClientFrame::Unlisten { id, listener } => {
                debug!(listener, "unlisten");
                listeners.lock().await.remove(&listener);
                let _ = outgoing.send(ok_reply(id));
            }
        }
    }

    fanout.abort();
    drop(outgoing);
    let _ = writer.await;
}

fn ok_reply(id: u64) -> ServerFrame {
    ServerFrame::Reply {
        id,
        outcome: Outcome::Ok(Value::Null),
    }
}

async fn fan_out(
    mut events: broadcast::Receiver<AppEvent>,
    listeners: Listeners,
    outgoing: mpsc::UnboundedSender<ServerFrame>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("window lagged; skipped {skipped} events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(event = event.name(), error = %err, "failed to encode event payload");
                continue;
            }
        };
        let targets: Vec<u64> = listeners
            .lock()
            .await
            .iter()
            .filter(|(_, name)| name.as_str() == event.name())
            .map(|(listener, _)| *listener)
            .collect();
        for listener in targets {
            let frame = ServerFrame::Event {
                listener,
                event: event.name().to_string(),
                payload: payload.clone(),
            };
            if outgoing.send(frame).is_err() {
                return;
            }
        }
    }
}
