//! Real-time WebSocket channel.
//!
//! [`RealtimeClient`] owns exactly one connection per session. A
//! supervisor task establishes the connection, pumps frames in both
//! directions, and reconnects with capped exponential backoff on
//! unexpected disconnect. Inbound frames are translated into
//! [`TransportEvent`]s for the store; outbound sends resolve only on the
//! server's `messageSent` acknowledgment, matched by correlation id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use waypost_core::{ChatConfig, ChatError, CorrelationId, Message, UserId};

use crate::event::TransportEvent;
use crate::wire::{ClientFrame, ServerFrame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AckMap = HashMap<CorrelationId, oneshot::Sender<Message>>;

/// Send-capable view of the real-time channel.
///
/// The seam the store's runtime is generic over; tests substitute a fake
/// that scripts ack outcomes.
pub trait RealtimeChannel: Send + Sync + 'static {
    /// Send a message and wait for the server acknowledgment carrying
    /// the canonical id.
    ///
    /// Resolves only on an explicit ack - never on "written to socket" -
    /// so the store's optimistic-to-confirmed transition cannot trigger
    /// prematurely. Fails with [`ChatError::Disconnected`] when the
    /// channel is down and [`ChatError::AckTimeout`] when no ack arrives
    /// within the configured window.
    fn send(
        &self,
        receiver: &UserId,
        content: &str,
        correlation_id: CorrelationId,
    ) -> impl Future<Output = Result<Message, ChatError>> + Send;

    /// Whether the channel currently has an established connection.
    fn is_connected(&self) -> bool;
}

/// Handle to the supervised WebSocket connection.
pub struct RealtimeClient {
    outgoing: mpsc::Sender<ClientFrame>,
    pending: Arc<Mutex<AckMap>>,
    connected: Arc<AtomicBool>,
    ack_timeout: Duration,
    abort_handle: tokio::task::AbortHandle,
}

impl RealtimeClient {
    /// Spawn the connection supervisor for `url`.
    ///
    /// Returns the handle and the event stream the store consumes. The
    /// first connection attempt happens on the supervisor task; callers
    /// observe it through a `ConnectionChanged` event.
    pub fn connect(url: impl Into<String>, config: &ChatConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(32);
        let pending = Arc::new(Mutex::new(AckMap::new()));
        let connected = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            url: url.into(),
            events: events_tx,
            pending: Arc::clone(&pending),
            connected: Arc::clone(&connected),
            config: config.clone(),
        };
        let handle = tokio::spawn(supervisor.run(outgoing_rx));

        let client = Self {
            outgoing: outgoing_tx,
            pending,
            connected,
            ack_timeout: config.send_ack_timeout,
            abort_handle: handle.abort_handle(),
        };
        (client, events_rx)
    }

    /// Stop the connection and the supervisor task.
    pub fn stop(&self) {
        self.abort_handle.abort();
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

impl RealtimeChannel for RealtimeClient {
    async fn send(
        &self,
        receiver: &UserId,
        content: &str,
        correlation_id: CorrelationId,
    ) -> Result<Message, ChatError> {
        if !self.is_connected() {
            return Err(ChatError::Disconnected);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        lock(&self.pending).insert(correlation_id, ack_tx);

        let frame = ClientFrame::SendMessage {
            receiver_id: receiver.0.clone(),
            content: content.to_owned(),
            correlation_id,
        };
        if self.outgoing.send(frame).await.is_err() {
            lock(&self.pending).remove(&correlation_id);
            return Err(ChatError::Disconnected);
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(message)) => Ok(message),
            // Sender dropped: the session ended before the ack arrived.
            Ok(Err(_)) => Err(ChatError::Disconnected),
            Err(_) => {
                lock(&self.pending).remove(&correlation_id);
                Err(ChatError::AckTimeout(self.ack_timeout))
            },
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Recover the guard even if a holder panicked; the ack map stays usable.
fn lock(pending: &Mutex<AckMap>) -> MutexGuard<'_, AckMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Supervisor {
    url: String,
    events: mpsc::Sender<TransportEvent>,
    pending: Arc<Mutex<AckMap>>,
    connected: Arc<AtomicBool>,
    config: ChatConfig,
}

impl Supervisor {
    /// Connect-run-backoff loop. Lives until the handle aborts it.
    async fn run(self, mut outgoing: mpsc::Receiver<ClientFrame>) {
        let mut backoff = self.config.reconnect_initial_backoff;

        loop {
            match connect_async(&self.url).await {
                Ok((socket, _)) => {
                    backoff = self.config.reconnect_initial_backoff;
                    self.connected.store(true, Ordering::SeqCst);
                    self.emit(TransportEvent::ConnectionChanged { connected: true, error: None })
                        .await;

                    let reason = self.run_session(socket, &mut outgoing).await;

                    self.connected.store(false, Ordering::SeqCst);
                    // Dropping the ack senders fails in-flight sends fast
                    // instead of letting them run into the timeout.
                    lock(&self.pending).clear();
                    tracing::warn!(%reason, "realtime connection lost");
                    self.emit(TransportEvent::ConnectionChanged {
                        connected: false,
                        error: Some(reason),
                    })
                    .await;
                },
                Err(e) => {
                    tracing::debug!(error = %e, delay = ?backoff, "realtime connect failed");
                },
            }

            tokio::time::sleep(backoff).await;
            backoff = self.config.next_backoff(backoff);
        }
    }

    /// Pump one established connection until it fails or closes.
    /// Returns a human-readable disconnect reason.
    async fn run_session(
        &self,
        socket: Socket,
        outgoing: &mut mpsc::Receiver<ClientFrame>,
    ) -> String {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                frame = outgoing.recv() => {
                    let Some(frame) = frame else {
                        return "client shut down".to_owned();
                    };
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "outbound frame serialization failed");
                            continue;
                        },
                    };
                    if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
                        return format!("write failed: {e}");
                    }
                },
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => self.handle_frame(text.as_str()).await,
                        Some(Ok(WsMessage::Close(_))) => return "server closed connection".to_owned(),
                        // Control frames are handled by tungstenite.
                        Some(Ok(_)) => {},
                        Some(Err(e)) => return format!("read failed: {e}"),
                        None => return "stream ended".to_owned(),
                    }
                },
            }
        }
    }

    /// Decode one inbound frame and forward it as a typed event.
    async fn handle_frame(&self, raw: &str) {
        let frame: ServerFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed server frame");
                return;
            },
        };

        match frame {
            ServerFrame::NewMessage { message } => {
                self.emit(TransportEvent::NewMessage(message.into())).await;
            },
            ServerFrame::MessageSent { correlation_id, message } => {
                let message: Message = message.into();
                if let Some(ack) = lock(&self.pending).remove(&correlation_id) {
                    let _ = ack.send(message.clone());
                }
                // Forwarded even when no send is waiting (reconnect
                // replay); the store's dedup owns duplicate suppression.
                self.emit(TransportEvent::MessageSent { correlation_id, message }).await;
            },
            ServerFrame::UserOnline { user_id } => {
                self.emit(TransportEvent::PresenceChanged {
                    user_id: UserId::new(user_id),
                    online: true,
                })
                .await;
            },
            ServerFrame::UserOffline { user_id } => {
                self.emit(TransportEvent::PresenceChanged {
                    user_id: UserId::new(user_id),
                    online: false,
                })
                .await;
            },
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}
