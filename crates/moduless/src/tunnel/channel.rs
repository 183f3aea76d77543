//! Persistent channel to connected pages.
//!
//! Inbound text frames are parsed and emitted on the bus; a frame that does
//! not parse is dropped and the connection stays up. Outbound messages are
//! serialized once and broadcast to every connection.

use std::time::Duration;

use axum::{
    extract::ws::{Message as Frame, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch};

use crate::bus::MessageBus;
use crate::protocol::{self, Message};

/// Subprotocol the runner requests
pub const SUBPROTOCOL: &str = "json";

/// Broadcast side of the channel plus a live connection count
#[derive(Debug, Clone)]
pub struct Channel {
    outbound: broadcast::Sender<String>,
    connections: watch::Sender<usize>,
    bus: MessageBus,
}

impl Channel {
    /// A channel that emits inbound messages on `bus`
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        let (outbound, _) = broadcast::channel(256);
        let (connections, _) = watch::channel(0);
        Self {
            outbound,
            connections,
            bus,
        }
    }

    /// Number of open connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        *self.connections.borrow()
    }

    /// Send a message to every connected page. Returns how many pages it
    /// was sent to; nothing is sent when none are connected.
    pub fn broadcast(&self, message: &Message) -> usize {
        let count = self.connection_count();
        if count == 0 {
            return 0;
        }
        let text = protocol::serialize(message);
        tracing::debug!(kind = message.kind().name(), pages = count, "Broadcasting");
        self.outbound.send(text).unwrap_or(0)
    }

    /// Wait until at least one page is connected
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut connections = self.connections.subscribe();
        tokio::time::timeout(timeout, connections.wait_for(|n| *n > 0))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    /// Router accepting page connections on `/`
    pub fn router(&self) -> Router {
        let channel = self.clone();
        Router::new().route(
            "/",
            get(move |ws: WebSocketUpgrade| upgrade(ws, channel.clone())),
        )
    }

    fn handle_inbound(&self, text: &str) {
        match protocol::parse(text) {
            Ok(message) => {
                tracing::debug!(kind = message.kind().name(), "Received");
                self.bus.emit(message);
            }
            Err(err) => tracing::warn!("Dropping frame: {err}"),
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade, channel: Channel) -> impl IntoResponse {
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| connection(socket, channel))
}

async fn connection(socket: WebSocket, channel: Channel) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = channel.outbound.subscribe();

    channel.connections.send_modify(|n| *n += 1);
    tracing::info!(pages = channel.connection_count(), "Page connected");

    loop {
        tokio::select! {
            result = outbound.recv() => {
                match result {
                    Ok(text) => {
                        if sender.send(Frame::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Page fell behind; messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Frame::Text(text))) => channel.handle_inbound(text.as_str()),
                    Some(Ok(Frame::Ping(data))) => {
                        if sender.send(Frame::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Frame::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    channel.connections.send_modify(|n| *n = n.saturating_sub(1));
    tracing::info!(pages = channel.connection_count(), "Page disconnected");
}
