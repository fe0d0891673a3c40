//! Signaling wire types exchanged between participants and the relay.
//!
//! Every frame is a single JSON object discriminated by its `type` field.
//! The relay reads only routing metadata (`secret`, `password`, `token`);
//! `offer`, `answer` and `candidate` payloads are carried as opaque
//! [`serde_json::Value`]s and forwarded untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands a client may send. Anything else falls through to an error reply.
pub const KNOWN_COMMANDS: [&str; 5] = ["login", "offer", "answer", "candidate", "leave"];

/// Opaque session identifier shared by the two members of a room.
///
/// Derived server-side from the login credentials; clients echo it back on
/// every non-login message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wraps an already-encoded token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages sent by a participant to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Claim or join the room for a `secret` / `password` pair.
    Login {
        /// Shared secret both participants know.
        secret: String,
        /// Password that must match the first one presented for `secret`.
        password: String,
    },

    /// Session description offer for the other room member.
    Offer {
        /// Room token returned by `login`.
        token: Token,
        /// Opaque offer payload.
        offer: Value,
    },

    /// Session description answer for the other room member.
    Answer {
        /// Room token returned by `login`.
        token: Token,
        /// Opaque answer payload.
        answer: Value,
    },

    /// ICE candidate for the other room member.
    Candidate {
        /// Room token returned by `login`.
        token: Token,
        /// Opaque candidate payload.
        candidate: Value,
    },

    /// Tell the other room member this side is hanging up.
    Leave {
        /// Room token returned by `login`.
        token: Token,
    },
}

impl ClientMessage {
    /// The wire `type` of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::Leave { .. } => "leave",
        }
    }

    /// The room token carried by a relay message, `None` for `login`.
    #[must_use]
    pub const fn token(&self) -> Option<&Token> {
        match self {
            Self::Login { .. } => None,
            Self::Offer { token, .. }
            | Self::Answer { token, .. }
            | Self::Candidate { token, .. }
            | Self::Leave { token } => Some(token),
        }
    }
}

/// Outcome of a `login`, flattened next to `"type": "login"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoginResult {
    /// `{"type": "login", "token": "..."}`
    Success {
        /// Token of the room the connection was placed in.
        token: Token,
    },
    /// `{"type": "login", "error": "...", "success": false}`
    Failure {
        /// Human-readable reason.
        error: String,
        /// Always `false`.
        success: bool,
    },
}

impl LoginResult {
    /// Builds a failed login reply.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            success: false,
        }
    }
}

/// Messages sent by the relay to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to the sender's own `login`.
    Login(LoginResult),

    /// Offer relayed from the other room member.
    Offer {
        /// Payload exactly as the sender supplied it.
        offer: Value,
    },

    /// Answer relayed from the other room member.
    Answer {
        /// Payload exactly as the sender supplied it.
        answer: Value,
    },

    /// Candidate relayed from the other room member.
    Candidate {
        /// Payload exactly as the sender supplied it.
        candidate: Value,
    },

    /// The other room member left or disconnected.
    Leave,

    /// The sender's last message could not be handled.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ServerMessage {
    /// Builds an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The relayed form of a client message, as the other room member sees it.
    ///
    /// Returns `None` for `login`, which is never relayed.
    #[must_use]
    pub fn relayed(msg: ClientMessage) -> Option<Self> {
        match msg {
            ClientMessage::Login { .. } => None,
            ClientMessage::Offer { offer, .. } => Some(Self::Offer { offer }),
            ClientMessage::Answer { answer, .. } => Some(Self::Answer { answer }),
            ClientMessage::Candidate { candidate, .. } => Some(Self::Candidate { candidate }),
            ClientMessage::Leave { .. } => Some(Self::Leave),
        }
    }
}
