//! The realtime channel — one long-lived WebSocket to the server's event
//! stream, shared process-wide and reused across consumer activations.
//!
//! The channel owns the transport: it reconnects with exponential backoff
//! and re-publishes its status, but it never re-announces identity by
//! itself. Whoever owns a user session watches the status and re-sends the
//! join frame after every successful (re)connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use pulse_core::events::Frame;
use pulse_core::UserId;

use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Backoff applied between reconnection attempts. Retries are unbounded:
/// the channel must outlive transient server outages.
#[derive(Clone, Debug)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff with jitter, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.as_millis() as u64;
        let capped = base
            .saturating_mul(1u64 << exp)
            .min(self.max_delay.as_millis() as u64);

        let jitter = if self.jitter_factor > 0.0 {
            let spread = (capped as f64 * self.jitter_factor) as i64;
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0
        };

        Duration::from_millis(capped.saturating_add_signed(jitter))
    }
}

/// Channel configuration.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:4000/ws`.
    pub url: String,
    pub heartbeat: Duration,
    pub outbound_queue: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/ws".into(),
            heartbeat: Duration::from_secs(30),
            outbound_queue: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Transport connection state, published through a watch channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Connected,
}

/// Handle returned by [`RealtimeChannel::subscribe`]. Must be released via
/// [`RealtimeChannel::unsubscribe`]; a dropped but unreleased handle keeps
/// receiving dispatches.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// One persistent bidirectional connection to the server's event stream.
pub struct RealtimeChannel {
    config: ChannelConfig,
    handlers: DashMap<String, Vec<(u64, Handler)>>,
    next_subscription: AtomicU64,
    outbound_tx: mpsc::Sender<Frame>,
    outbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<Frame>>>,
    status_tx: watch::Sender<ChannelStatus>,
    running: AtomicBool,
}

static SHARED: OnceLock<Arc<RealtimeChannel>> = OnceLock::new();

impl RealtimeChannel {
    /// Construct a channel without touching the network.
    pub fn new(config: ChannelConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue);
        let (status_tx, _) = watch::channel(ChannelStatus::Disconnected);

        Self {
            config,
            handlers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
            outbound_tx,
            outbound_rx: parking_lot::Mutex::new(Some(outbound_rx)),
            status_tx,
            running: AtomicBool::new(false),
        }
    }

    /// The process-wide shared channel. Constructed on first use; later
    /// callers get the same instance and their config is ignored.
    pub fn shared(config: ChannelConfig) -> Arc<RealtimeChannel> {
        SHARED
            .get_or_init(|| Arc::new(RealtimeChannel::new(config)))
            .clone()
    }

    /// Start the connection task. Idempotent: once running, further calls
    /// are no-ops.
    pub fn connect(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(outbound_rx) = self.outbound_rx.lock().take() else {
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(outbound_rx).await });
    }

    /// Queue the `join` frame associating this connection with a user.
    /// Must be re-sent after every reconnect; the channel never does this
    /// on its own.
    pub fn announce(&self, user_id: UserId) -> Result<(), ChannelError> {
        debug!(user_id = %user_id, "announcing identity");
        self.send(Frame::join(user_id))
    }

    /// Queue an outbound frame. A full queue drops the frame with a warn
    /// log rather than blocking the caller.
    pub fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        match self.outbound_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(event = %frame.event, "outbound queue full, dropping frame");
                Err(ChannelError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChannelError::Closed),
        }
    }

    /// Register a handler for an inbound event name. Handlers run on the
    /// reader task in transport-delivery order.
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(event.to_owned())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(event, id, "handler subscribed");
        Subscription {
            event: event.to_owned(),
            id,
        }
    }

    /// Release a subscription. Pair 1:1 with [`subscribe`](Self::subscribe)
    /// or a re-activated consumer will be dispatched twice.
    pub fn unsubscribe(&self, sub: &Subscription) {
        if let Some(mut entry) = self.handlers.get_mut(&sub.event) {
            entry.retain(|(id, _)| *id != sub.id);
            debug!(event = %sub.event, id = sub.id, "handler released");
        }
    }

    /// Number of handlers registered for an event name.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, |e| e.len())
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status_tx.borrow()
    }

    pub fn connected(&self) -> bool {
        self.status() == ChannelStatus::Connected
    }

    /// Watch connection-state transitions. Consumers that announce identity
    /// re-send it on every `Connected` edge.
    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    /// Deliver one inbound frame to registered handlers.
    pub fn dispatch(&self, frame: Frame) {
        let handlers: Vec<Handler> = match self.handlers.get(&frame.event) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => {
                trace!(event = %frame.event, "no handlers for inbound event");
                return;
            }
        };
        for handler in handlers {
            handler(frame.data.clone());
        }
    }

    fn dispatch_text(&self, text: &str) {
        match Frame::from_text(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => debug!(error = %e, "unparseable inbound frame dropped"),
        }
    }

    /// Connection loop: connect, pump until the socket dies, back off, retry.
    async fn run(self: Arc<Self>, mut outbound: mpsc::Receiver<Frame>) {
        let mut attempt: u32 = 0;
        loop {
            match connect_async(&self.config.url).await {
                Ok((ws, _)) => {
                    attempt = 0;
                    info!(url = %self.config.url, "realtime channel connected");
                    let _ = self.status_tx.send(ChannelStatus::Connected);
                    self.pump(ws, &mut outbound).await;
                    let _ = self.status_tx.send(ChannelStatus::Disconnected);
                    warn!("realtime channel disconnected");
                }
                Err(e) => {
                    debug!(error = %e, "realtime connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.config.reconnect.delay_for(attempt);
            trace!(attempt, delay_ms = delay.as_millis() as u64, "reconnect backoff");
            tokio::time::sleep(delay).await;
        }
    }

    /// Pump one live socket: outbound frames, inbound dispatch, heartbeat.
    async fn pump(&self, ws: WsStream, outbound: &mut mpsc::Receiver<Frame>) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut ping = tokio::time::interval(self.config.heartbeat);
        ping.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { return };
                    match frame.to_text() {
                        Ok(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "unserializable outbound frame dropped"),
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch_text(text.as_str()),
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_tx.send(Message::Pong(payload)).await.is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => trace!("pong"),
                        Some(Ok(Message::Close(_))) | None => return,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "websocket error");
                            return;
                        }
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                    trace!("sent ping");
                }
            }
        }
    }
}
