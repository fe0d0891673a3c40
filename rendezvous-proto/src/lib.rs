//! Shared protocol definitions for the rendezvous signaling wire format.

pub mod codec;
pub mod signal;
