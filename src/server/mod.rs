//! Inbound transport for chat-bot integrations and the overlay client.
//!
//! Every connection may send [`protocol::Inbound`] lines and receives both
//! direct replies and the broadcast [`protocol::Outbound`] stream (queue
//! updates, audio to play, history entries and action requests).

pub mod listener;
pub mod protocol;

pub use listener::{dispatch, pump, serve, BROADCAST_CAPACITY};
pub use protocol::{Inbound, Outbound, ProtocolError};
