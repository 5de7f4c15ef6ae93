//! Error types for the transport layer.

/// Errors from binding, accepting, and moving frames.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listen address failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The WebSocket upgrade was refused, garbled, or overran its
    /// deadline.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Writing a frame to the peer failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame from the peer failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The peer sent a frame larger than the protocol ever produces.
    #[error("inbound frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}
