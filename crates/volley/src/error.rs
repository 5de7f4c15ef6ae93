//! Unified error type for the server crate.

use volley_guard::GuardError;
use volley_protocol::ProtocolError;
use volley_room::RoomError;
use volley_session::SessionError;
use volley_transport::TransportError;

/// Top-level error wrapping every layer's failures.
#[derive(Debug, thiserror::Error)]
pub enum VolleyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
