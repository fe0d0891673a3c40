//! Per-connection signaling dispatch and disconnect cleanup.
//!
//! A connection starts [`SessionState::Unauthenticated`] and becomes
//! [`SessionState::Paired`] after a successful `login`; it never goes back.
//! Every failure is answered on the offending connection only and never ends
//! its handler.

use rendezvous_proto::codec::{self, Inbound, UNTYPED_COMMAND};
use rendezvous_proto::signal::{ClientMessage, LoginResult, ServerMessage, Token};

use crate::registry::{ConnectionId, RegistryError};
use crate::relay::RelayState;

/// Errors reported back to the sender of a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// Registry lookup or mutation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The connection already completed a login.
    #[error("already logged in")]
    AlreadyPaired,
    /// The `type` field named no known command.
    #[error("Command not found: {0}")]
    UnknownCommand(String),
    /// A known command was missing fields.
    #[error("Invalid {kind} message: {reason}")]
    Malformed {
        /// Command name.
        kind: String,
        /// Decoder diagnostics.
        reason: String,
    },
    /// The frame exceeded the configured size limit.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Pairing state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No successful login yet.
    Unauthenticated,
    /// Logged in; member of the room for this token.
    Paired(Token),
}

/// Handler-local view of one connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
}

impl Session {
    /// Creates an unauthenticated session for a new connection.
    #[must_use]
    pub const fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Unauthenticated,
        }
    }

    /// The connection this session belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current pairing state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// The room token, once paired.
    #[must_use]
    pub const fn token(&self) -> Option<&Token> {
        match &self.state {
            SessionState::Paired(token) => Some(token),
            SessionState::Unauthenticated => None,
        }
    }
}

/// Handles one inbound text frame from `session`'s connection.
pub async fn handle_text(session: &mut Session, text: &str, state: &RelayState) {
    let conn = session.id;
    if reject_oversized(conn, text.len(), state).await {
        return;
    }

    match codec::decode(text) {
        Inbound::Known(ClientMessage::Login { secret, password }) => {
            handle_login(session, &secret, &password, state).await;
        }
        Inbound::Known(msg) => {
            let kind = msg.kind();
            if let Err(e) = forward_to_peer(session, msg, state).await {
                tracing::warn!(conn = %conn, kind, error = %e, "relay failed");
                reply_error(state, conn, &e).await;
            }
        }
        Inbound::Unknown { kind } => {
            tracing::debug!(conn = %conn, kind = %kind, "unknown command");
            reply_error(state, conn, &SignalError::UnknownCommand(kind)).await;
        }
        Inbound::Malformed { kind, reason } => {
            tracing::debug!(conn = %conn, kind = %kind, reason = %reason, "malformed command");
            reply_error(state, conn, &SignalError::Malformed { kind, reason }).await;
        }
        Inbound::Untyped { reason } => {
            tracing::debug!(conn = %conn, reason = %reason, "undecodable message");
            let err = SignalError::UnknownCommand(UNTYPED_COMMAND.to_string());
            reply_error(state, conn, &err).await;
        }
    }
}

/// Handles one inbound binary frame.
///
/// A UTF-8 payload is dispatched exactly like a text frame; anything else is
/// answered as an untyped record.
pub async fn handle_binary(session: &mut Session, data: &[u8], state: &RelayState) {
    let conn = session.id;
    if reject_oversized(conn, data.len(), state).await {
        return;
    }

    match std::str::from_utf8(data) {
        Ok(text) => handle_text(session, text, state).await,
        Err(e) => {
            tracing::debug!(conn = %conn, error = %e, "binary frame is not UTF-8");
            let err = SignalError::UnknownCommand(UNTYPED_COMMAND.to_string());
            reply_error(state, conn, &err).await;
        }
    }
}

/// Answers a frame over the size limit. Returns `true` if it was rejected.
async fn reject_oversized(conn: ConnectionId, size: usize, state: &RelayState) -> bool {
    let max = state.max_message_size();
    if size <= max {
        return false;
    }
    tracing::warn!(conn = %conn, size, max, "message exceeds size limit");
    reply_error(state, conn, &SignalError::MessageTooLarge { size, max }).await;
    true
}

/// Claims or joins the room for the given credentials.
async fn handle_login(session: &mut Session, secret: &str, password: &str, state: &RelayState) {
    let conn = session.id;

    if let SessionState::Paired(token) = &session.state {
        tracing::warn!(conn = %conn, token = %token, "login on already paired connection");
        let reply = ServerMessage::Login(LoginResult::failure(
            SignalError::AlreadyPaired.to_string(),
        ));
        state.send_to(conn, &reply).await;
        return;
    }

    match state.registry.login(secret, password, conn) {
        Ok(token) => {
            let stats = state.registry.stats();
            tracing::info!(
                conn = %conn,
                token = %token,
                rooms = stats.rooms,
                members = stats.members,
                "login succeeded"
            );
            session.state = SessionState::Paired(token.clone());
            let reply = ServerMessage::Login(LoginResult::Success { token });
            state.send_to(conn, &reply).await;
        }
        Err(e) => {
            tracing::info!(conn = %conn, error = %e, "login rejected");
            let reply = ServerMessage::Login(LoginResult::failure(e.to_string()));
            state.send_to(conn, &reply).await;
        }
    }
}

/// Relays `msg` to the first other member of its room.
///
/// A room with no other member is not an error: the message is dropped.
///
/// # Errors
///
/// Returns [`RegistryError::RoomNotFound`] unless the sender is paired with
/// the message token. Whether some other room exists for that token does not
/// change the reply.
async fn forward_to_peer(
    session: &Session,
    msg: ClientMessage,
    state: &RelayState,
) -> Result<(), SignalError> {
    let Some(token) = msg.token().cloned() else {
        return Ok(());
    };

    if session.token() != Some(&token) {
        return Err(RegistryError::RoomNotFound.into());
    }
    let peers = state.registry.peers_of(&token, session.id)?;

    let kind = msg.kind();
    let Some(&peer) = peers.first() else {
        tracing::debug!(conn = %session.id, kind, "no peer in room, dropping");
        return Ok(());
    };
    let Some(relayed) = ServerMessage::relayed(msg) else {
        return Ok(());
    };

    tracing::debug!(from = %session.id, to = %peer, kind, "relaying");
    state.send_to(peer, &relayed).await;
    Ok(())
}

/// Cleans up after a closed connection.
///
/// Unregisters its outbound channel and, if it was paired, removes it from
/// its room and sends `leave` to every member left behind.
pub async fn disconnect(session: &Session, state: &RelayState) {
    state.unregister(session.id).await;

    let SessionState::Paired(token) = &session.state else {
        tracing::info!(conn = %session.id, "unauthenticated connection closed");
        return;
    };

    let remaining = state.registry.leave_room(token, session.id);
    tracing::info!(
        conn = %session.id,
        token = %token,
        notified = remaining.len(),
        "paired connection closed"
    );
    for peer in remaining {
        state.send_to(peer, &ServerMessage::Leave).await;
    }
}

async fn reply_error(state: &RelayState, conn: ConnectionId, err: &SignalError) {
    state.send_to(conn, &ServerMessage::error(err.to_string())).await;
}
