//! Typed subscriptions to backend-pushed events.
//!
//! Each [`Subscription`] owns exactly one listener registration and moves
//! through `Unregistered -> Registering -> Active -> Closed`. Registration is
//! never aborted halfway: if the subscription is cancelled while the backend
//! is still acknowledging it, the listener is removed again as soon as the
//! acknowledgement arrives, and the handler never runs.

use std::sync::Arc;

use deskshell_proto::Event;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::Transport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Unregistered,
    Registering,
    Active,
    /// Final. Reached after teardown or a failed registration.
    Closed,
}

#[derive(Clone)]
pub struct EventBus {
    transport: Arc<dyn Transport>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Starts delivering `E` payloads to `handler`, in the order the backend
    /// emits them. Must be called from within a Tokio runtime.
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: FnMut(E::Payload) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Unregistered);
        tokio::spawn(run_subscription::<E, F>(
            Arc::clone(&self.transport),
            handler,
            cancel.clone(),
            state_tx,
        ));
        Subscription {
            event: E::NAME,
            cancel,
            state: state_rx,
        }
    }

    /// Replaces `previous` with a new subscription. The old listener is fully
    /// removed before the new one is registered.
    pub async fn resubscribe<E, F>(&self, previous: Subscription, handler: F) -> Subscription
    where
        E: Event,
        F: FnMut(E::Payload) + Send + 'static,
    {
        previous.dispose().await;
        self.subscribe::<E, F>(handler)
    }
}

/// Handle to one live subscription. Dropping it cancels.
pub struct Subscription {
    event: &'static str,
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
}

impl Subscription {
    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the listener has been torn down (or never came up).
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == SubscriptionState::Closed)
            .await;
    }

    /// Waits until registration settles. True if the subscription went live.
    pub async fn ready(&self) -> bool {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| {
                matches!(state, SubscriptionState::Active | SubscriptionState::Closed)
            })
            .await
            .map(|state| *state);
        matches!(settled, Ok(SubscriptionState::Active))
    }

    /// Cancels and waits for teardown.
    pub async fn dispose(self) {
        self.cancel();
        self.closed().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_subscription<E, F>(
    transport: Arc<dyn Transport>,
    mut handler: F,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
) where
    E: Event,
    F: FnMut(E::Payload) + Send + 'static,
{
    state.send_replace(SubscriptionState::Registering);
    let (sink, mut events) = mpsc::unbounded_channel();
    let listener = match transport.listen(E::NAME, sink).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(event = E::NAME, error = %err, "failed to listen to event");
            state.send_replace(SubscriptionState::Closed);
            return;
        }
    };

    if cancel.is_cancelled() {
        debug!(event = E::NAME, listener, "cancelled while registering");
    } else {
        state.send_replace(SubscriptionState::Active);
        debug!(event = E::NAME, listener, "subscription active");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(raw) => match serde_json::from_value::<E::Payload>(raw) {
                        Ok(payload) => handler(payload),
                        Err(err) => {
                            warn!(event = E::NAME, error = %err, "dropping malformed event payload");
                        }
                    },
                    None => {
                        debug!(event = E::NAME, listener, "event channel closed by transport");
                        break;
                    }
                },
            }
        }
    }

    drop(events);
    if let Err(err) = transport.unlisten(listener).await {
        warn!(event = E::NAME, listener, error = %err, "failed to unlisten");
    }
    state.send_replace(SubscriptionState::Closed);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deskshell_proto::events::SettingChange;
    use deskshell_proto::ConfigChanged;
    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedTransport;

    async fn wait_for_state(sub: &Subscription, wanted: SubscriptionState) {
        let mut state = sub.state.clone();
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn delivers_payloads_in_emission_order() {
        let transport = ScriptedTransport::new();
        let bus = EventBus::new(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = bus.subscribe::<ConfigChanged, _>(move |change: SettingChange| {
            tx.send(change.value).unwrap();
        });
        wait_for_state(&sub, SubscriptionState::Active).await;

        for value in ["light", "dark", "system"] {
            transport.emit(ConfigChanged::NAME, json!({"key": "theme_mode", "value": value}));
        }

        assert_eq!(rx.recv().await.unwrap(), "light");
        assert_eq!(rx.recv().await.unwrap(), "dark");
        assert_eq!(rx.recv().await.unwrap(), "system");
        sub.dispose().await;
        assert_eq!(transport.live_listeners(), 0);
    }

    #[tokio::test]
    async fn cancel_during_registration_never_delivers_and_unlistens_once() {
        let transport = ScriptedTransport::new();
        let release = transport.hold_listen();
        let bus = EventBus::new(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel::<SettingChange>();

        let sub = bus.subscribe::<ConfigChanged, _>(move |change| {
            let _ = tx.send(change);
        });
        wait_for_state(&sub, SubscriptionState::Registering).await;
        sub.cancel();
        transport.emit(ConfigChanged::NAME, json!({"key": "theme_mode", "value": "dark"}));
        release.send(()).unwrap();

        sub.closed().await;
        assert_eq!(sub.state(), SubscriptionState::Closed);
        assert_eq!(transport.unlisten_calls(), 1);
        assert_eq!(transport.live_listeners(), 0);
        drop(sub);
        assert!(rx.recv().await.is_none(), "handler must not run");
    }

    #[tokio::test]
    async fn registration_failure_leaves_subscription_closed() {
        let transport = ScriptedTransport::new();
        transport.fail_listen();
        let bus = EventBus::new(transport.clone());

        let sub = bus.subscribe::<ConfigChanged, _>(|_| {});
        sub.closed().await;

        assert!(!sub.is_active());
        assert_eq!(transport.unlisten_calls(), 0);
        assert_eq!(transport.listen_calls(), 1);
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped() {
        let transport = ScriptedTransport::new();
        let bus = EventBus::new(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = bus.subscribe::<ConfigChanged, _>(move |change: SettingChange| {
            tx.send(change.key).unwrap();
        });
        wait_for_state(&sub, SubscriptionState::Active).await;

        transport.emit(ConfigChanged::NAME, json!({"unexpected": 1}));
        transport.emit(ConfigChanged::NAME, json!({"key": "language", "value": "en-US"}));

        assert_eq!(rx.recv().await.unwrap(), "language");
        drop(sub);
    }

    #[tokio::test]
    async fn resubscribe_tears_down_before_registering() {
        let transport = ScriptedTransport::new();
        let bus = EventBus::new(transport.clone());

        let first = bus.subscribe::<ConfigChanged, _>(|_| {});
        wait_for_state(&first, SubscriptionState::Active).await;
        let second = bus.resubscribe::<ConfigChanged, _>(first, |_| {}).await;
        wait_for_state(&second, SubscriptionState::Active).await;

        assert_eq!(transport.unlisten_calls(), 1);
        assert_eq!(transport.listen_calls(), 2);
        assert_eq!(transport.live_listeners(), 1);
        second.dispose().await;
        assert_eq!(transport.live_listeners(), 0);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let transport = ScriptedTransport::new();
        let bus = EventBus::new(transport.clone());

        let sub = bus.subscribe::<ConfigChanged, _>(|_| {});
        wait_for_state(&sub, SubscriptionState::Active).await;
        let mut state = sub.state.clone();
        drop(sub);

        state
            .wait_for(|s| *s == SubscriptionState::Closed)
            .await
            .unwrap();
        assert_eq!(transport.live_listeners(), 0);
    }
}
