//! Relay server core: shared state, WebSocket handler and server bootstrap.
//!
//! The relay accepts WebSocket connections, gives each one a
//! [`ConnectionId`] and an outbound channel, and hands every inbound text
//! frame to [`signal::handle_text`] (binary frames go through
//! [`signal::handle_binary`]). When a connection ends, its room peers are
//! told via [`signal::disconnect`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use rendezvous_proto::codec;
use rendezvous_proto::signal::ServerMessage;
use tokio::sync::{RwLock, mpsc};

use crate::registry::{ConnectionId, DEFAULT_MAX_ROOM_MEMBERS, Registry};
use crate::signal::{self, Session};

/// Default maximum allowed inbound frame size in bytes (64 KB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Shared relay server state holding outbound channels and the registry.
pub struct RelayState {
    /// Maps each live connection to a channel feeding its WebSocket writer.
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    /// Identity claims and room membership.
    pub registry: Registry,
    /// Maximum allowed inbound frame size in bytes.
    max_message_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with a random process secret and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_MAX_MESSAGE_SIZE,
            Registry::with_random_secret(DEFAULT_MAX_ROOM_MEMBERS),
        )
    }

    /// Creates a relay state with a custom frame size limit and registry.
    #[must_use]
    pub fn with_config(max_message_size: usize, registry: Registry) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registry,
            max_message_size,
        }
    }

    /// Maximum allowed inbound frame size in bytes.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Registers the outbound channel for a connection.
    pub async fn register(&self, conn: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        conns.insert(conn, sender);
    }

    /// Removes a connection's outbound channel, returning it if it existed.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(&conn)
    }

    /// Returns a clone of the sender for the given connection, if registered.
    pub async fn get_sender(&self, conn: ConnectionId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(&conn).cloned()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Encodes `msg` and queues it for `conn`. Fire-and-forget.
    pub async fn send_to(&self, conn: ConnectionId, msg: &ServerMessage) {
        let Some(sender) = self.get_sender(conn).await else {
            tracing::debug!(conn = %conn, "send to unregistered connection dropped");
            return;
        };
        match codec::encode(msg) {
            Ok(text) => {
                if sender.send(Message::Text(text.into())).is_err() {
                    tracing::debug!(conn = %conn, "outbound channel closed");
                }
            }
            Err(e) => {
                tracing::error!(conn = %conn, error = %e, "failed to encode server message");
            }
        }
    }
}

/// Handles an upgraded WebSocket connection for a single participant.
///
/// The connection lifecycle:
/// 1. Allocate a [`ConnectionId`] and register an outbound channel.
/// 2. Spawn a writer task draining that channel into the socket.
/// 3. Dispatch inbound text and binary frames in order until close, error,
///    or writer failure.
/// 4. Run disconnect cleanup.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let conn = ConnectionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(conn, tx).await;
    tracing::info!(conn = %conn, "connection opened");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = %conn, "WebSocket write failed");
                break;
            }
        }
    });

    let mut session = Session::new(conn);
    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    signal::handle_text(&mut session, text.as_str(), &state).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    signal::handle_binary(&mut session, &data, &state).await;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!(conn = %conn, "received close frame");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping and pong are answered by the transport.
                }
                Some(Err(e)) => {
                    tracing::warn!(conn = %conn, error = %e, "WebSocket read failed");
                    break;
                }
                None => break,
            },
            _ = &mut write_task => break,
        }
    }

    write_task.abort();
    signal::disconnect(&session, &state).await;
    tracing::info!(conn = %conn, "connection closed");
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
