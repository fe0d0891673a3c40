//! Rendezvous relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts WebSocket connections, pairs participants that present
//! the same secret and password into a two-party room, and relays signaling
//! messages between the members of each room.

pub mod config;
pub mod registry;
pub mod relay;
pub mod signal;
