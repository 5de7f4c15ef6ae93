//! Transport layer: accepting sockets, moving bytes, and the gateway
//! that addresses outbound events.
//!
//! The [`Transport`]/[`Connection`] traits abstract the wire so the
//! server and tests can swap the WebSocket implementation for an
//! in-memory one. The [`Gateway`] owns per-connection outbound senders
//! and metadata slots (persistent id, profile id, room code, player
//! key), plus room broadcast groups and per-device connection sets.

#![allow(async_fn_in_trait)]

mod error;
mod gateway;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use gateway::{ConnMeta, Gateway};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::future::Future;
use std::net::SocketAddr;

use volley_protocol::ConnectionId;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Stops accepting new connections.
    fn shutdown(
        &self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame. `Ok(None)` on clean close.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The process-unique id of this connection.
    fn id(&self) -> ConnectionId;

    /// The peer's address, for handshake-scope rate limits.
    fn peer_addr(&self) -> Option<SocketAddr>;
}
