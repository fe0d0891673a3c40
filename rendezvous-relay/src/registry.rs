//! Credential and session registry for the relay server.
//!
//! Holds the two pieces of process-wide state: identity claims
//! (`secret -> password digest`, first writer wins) and rooms
//! (`token -> connections`, in join order). Both maps sit behind a single
//! lock so a login is claimed, derived and joined atomically.
//!
//! Everything here is ephemeral and lost on relay restart.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use rendezvous_proto::signal::Token;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default room capacity: one offerer, one answerer.
pub const DEFAULT_MAX_ROOM_MEMBERS: usize = 2;

/// Identity of one participant's duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh, time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Result of presenting credentials for a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The secret was unseen and is now bound to this password.
    New,
    /// The secret was already claimed with this password.
    Existing,
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The secret was claimed earlier with a different password.
    #[error("wrong password")]
    WrongPassword,
    /// The room already holds its maximum number of members.
    #[error("room is full (max {0} members)")]
    RoomFull(usize),
    /// No login has created a room for this token.
    #[error("room not found")]
    RoomNotFound,
}

/// Point-in-time counters for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Number of claimed secrets.
    pub claims: usize,
    /// Number of live rooms.
    pub rooms: usize,
    /// Total members across all rooms.
    pub members: usize,
}

#[derive(Default)]
struct Inner {
    claims: HashMap<String, String>,
    rooms: HashMap<Token, Vec<ConnectionId>>,
}

impl Inner {
    fn verify(&self, secret: &str, password_digest: &str) -> Result<Claim, RegistryError> {
        match self.claims.get(secret) {
            None => Ok(Claim::New),
            Some(stored) if stored == password_digest => Ok(Claim::Existing),
            Some(_) => Err(RegistryError::WrongPassword),
        }
    }

    fn join(
        &mut self,
        token: &Token,
        conn: ConnectionId,
        max_members: usize,
    ) -> Result<usize, RegistryError> {
        let members = self
            .rooms
            .get_mut(token)
            .ok_or(RegistryError::RoomNotFound)?;
        if members.contains(&conn) {
            return Ok(members.len());
        }
        if members.len() >= max_members {
            return Err(RegistryError::RoomFull(max_members));
        }
        members.push(conn);
        Ok(members.len())
    }
}

/// In-memory claim and room directory.
///
/// Thread-safe via [`Mutex`]. The lock is never held across an `.await`.
pub struct Registry {
    inner: Mutex<Inner>,
    app_secret: String,
    max_room_members: usize,
}

impl Registry {
    /// Creates an empty registry keyed by `process_secret`, with the default
    /// room capacity.
    #[must_use]
    pub fn new(process_secret: &[u8]) -> Self {
        Self::with_max_room_members(process_secret, DEFAULT_MAX_ROOM_MEMBERS)
    }

    /// Creates an empty registry with a custom room capacity.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_max_room_members(process_secret: &[u8], max_room_members: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            app_secret: digest_hex(process_secret),
            max_room_members: max_room_members.max(1),
        }
    }

    /// Creates an empty registry keyed by 32 fresh random bytes.
    ///
    /// Tokens from such a registry are only meaningful for this process.
    #[must_use]
    pub fn with_random_secret(max_room_members: usize) -> Self {
        let process_secret: [u8; 32] = rand::random();
        Self::with_max_room_members(&process_secret, max_room_members)
    }

    /// Maximum number of connections per room.
    #[must_use]
    pub const fn max_room_members(&self) -> usize {
        self.max_room_members
    }

    /// Derives the room token for a credential pair.
    ///
    /// Each field is length-prefixed before hashing so that distinct
    /// `(secret, password)` splits of the same bytes never collide.
    #[must_use]
    pub fn derive_token(&self, secret: &str, password: &str) -> Token {
        let mut hasher = Sha256::new();
        for field in [secret, password, self.app_secret.as_str()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Token::new(hex::encode(hasher.finalize()))
    }

    /// Claims `secret` for `password`, or checks `password` against an
    /// existing claim.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::WrongPassword`] if the secret was claimed
    /// with a different password.
    pub fn claim_or_verify(&self, secret: &str, password: &str) -> Result<Claim, RegistryError> {
        let digest = digest_hex(password.as_bytes());
        let mut inner = self.inner.lock();
        let claim = inner.verify(secret, &digest)?;
        if claim == Claim::New {
            inner.claims.insert(secret.to_string(), digest);
        }
        drop(inner);
        Ok(claim)
    }

    /// Creates an empty room for `token` if none exists.
    pub fn ensure_room(&self, token: &Token) {
        self.inner.lock().rooms.entry(token.clone()).or_default();
    }

    /// Adds a connection to an existing room, returning the member count.
    ///
    /// Joining a room the connection is already in changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomNotFound`] if the room does not exist, or
    /// [`RegistryError::RoomFull`] if it is at capacity.
    pub fn join_room(&self, token: &Token, conn: ConnectionId) -> Result<usize, RegistryError> {
        self.inner.lock().join(token, conn, self.max_room_members)
    }

    /// Returns every member of the room except `excluding`, in join order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomNotFound`] if the room does not exist.
    pub fn peers_of(
        &self,
        token: &Token,
        excluding: ConnectionId,
    ) -> Result<Vec<ConnectionId>, RegistryError> {
        let inner = self.inner.lock();
        let members = inner.rooms.get(token).ok_or(RegistryError::RoomNotFound)?;
        Ok(members.iter().copied().filter(|c| *c != excluding).collect())
    }

    /// Returns a snapshot of the room's members, if the room exists.
    #[must_use]
    pub fn room_of(&self, token: &Token) -> Option<Vec<ConnectionId>> {
        self.inner.lock().rooms.get(token).cloned()
    }

    /// Claims or verifies credentials, then places `conn` in the matching room.
    ///
    /// Runs under one lock acquisition. On error nothing is recorded: the
    /// claim is only committed once the join has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::WrongPassword`] or [`RegistryError::RoomFull`].
    pub fn login(
        &self,
        secret: &str,
        password: &str,
        conn: ConnectionId,
    ) -> Result<Token, RegistryError> {
        let token = self.derive_token(secret, password);
        let digest = digest_hex(password.as_bytes());

        let mut inner = self.inner.lock();
        let claim = inner.verify(secret, &digest)?;
        inner.rooms.entry(token.clone()).or_default();
        inner.join(&token, conn, self.max_room_members)?;
        if claim == Claim::New {
            inner.claims.insert(secret.to_string(), digest);
        }
        drop(inner);

        Ok(token)
    }

    /// Removes `conn` from the room and returns the members left behind.
    ///
    /// The room is dropped once it is empty. Claims are never removed.
    pub fn leave_room(&self, token: &Token, conn: ConnectionId) -> Vec<ConnectionId> {
        let mut inner = self.inner.lock();
        let Some(members) = inner.rooms.get_mut(token) else {
            return Vec::new();
        };
        members.retain(|c| *c != conn);
        let remaining = members.clone();
        if remaining.is_empty() {
            inner.rooms.remove(token);
        }
        drop(inner);
        remaining
    }

    /// Returns current claim, room and member counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            claims: inner.claims.len(),
            rooms: inner.rooms.len(),
            members: inner.rooms.values().map(Vec::len).sum(),
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
