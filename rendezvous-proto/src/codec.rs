//! JSON encoding and decoding for signaling frames.
//!
//! Decoding never fails outright: a frame that is not a usable command is
//! classified as [`Inbound::Unknown`], [`Inbound::Untyped`] or
//! [`Inbound::Malformed`] so the relay can answer it instead of dropping the
//! connection.

use serde_json::Value;

use crate::signal::{ClientMessage, KNOWN_COMMANDS, ServerMessage};

/// How an untyped frame's command is rendered in error replies.
pub const UNTYPED_COMMAND: &str = "undefined";

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Classification of one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed command.
    Known(ClientMessage),
    /// A JSON object whose `type` is not a known command.
    Unknown {
        /// The `type` string as sent.
        kind: String,
    },
    /// A known command with missing or ill-typed fields.
    Malformed {
        /// The `type` string as sent.
        kind: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Not JSON, not an object, or no string `type`.
    Untyped {
        /// Parser diagnostics, for logging only.
        reason: String,
    },
}

impl Inbound {
    /// The command name used in logs and error replies.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Known(msg) => msg.kind(),
            Self::Unknown { kind } | Self::Malformed { kind, .. } => kind,
            Self::Untyped { .. } => UNTYPED_COMMAND,
        }
    }
}

/// Classifies a text frame received from a client.
#[must_use]
pub fn decode(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return Inbound::Untyped {
                reason: e.to_string(),
            };
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Inbound::Untyped {
            reason: "missing string `type` field".to_string(),
        };
    };

    if !KNOWN_COMMANDS.contains(&kind.as_str()) {
        return Inbound::Unknown { kind };
    }

    match serde_json::from_value::<ClientMessage>(value) {
        Ok(msg) => Inbound::Known(msg),
        Err(e) => Inbound::Malformed {
            kind,
            reason: e.to_string(),
        },
    }
}

/// Encodes a relay-to-client message as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode(msg: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a client-to-relay message as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_client(msg: &ClientMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a relay-to-client text frame. Used by clients.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame is not a valid
/// [`ServerMessage`].
pub fn decode_server(text: &str) -> Result<ServerMessage, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
