//! Core types for the applib dashboard protocol.
//!
//! This crate provides the wire primitives shared by the client engine and any
//! peer speaking to it: request envelopes, server instructions, the session
//! token, and the connection lifecycle state.

mod message;
mod token;

pub use message::{
    DEFAULT_WEIGHT, DecodeError, Instruction, ProtocolError, Request, TabSide, envelope_object,
};
pub use token::{SessionToken, TokenParseError};

use serde::{Deserialize, Serialize};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport exists, or the last one closed.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Transport is open and accepting frames.
    Open,
    /// Shutdown requested; the transport is being torn down.
    Closing,
}

impl ConnectionState {
    /// Whether `connect()` should start a new attempt from this state.
    pub fn needs_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}
