//! Frame codec.
//!
//! The wire only ever carries two shapes: [`ServerFrame`]s out and
//! [`ClientFrame`]s in. The codec therefore works at frame granularity
//! instead of serializing arbitrary types, which lets failures carry
//! protocol context: an encode error names the event that produced it,
//! and a decode error is the classified [`FrameError`](crate::FrameError)
//! the abuse accounting keys on.
//!
//! JSON is the shipping format; the browser client reads it natively
//! and every frame is inspectable in DevTools. A binary codec can slot
//! in behind the same trait without touching the call sites.

use crate::frame::decode_client_frame;
use crate::{ClientFrame, ProtocolError, ServerFrame};

/// Encodes outbound frames to bytes and decodes inbound bytes to
/// frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes one outbound frame.
    fn encode(&self, frame: &ServerFrame) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one inbound frame.
    fn decode(&self, data: &[u8]) -> Result<ClientFrame, ProtocolError>;
}

/// The JSON [`Codec`].
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, frame: &ServerFrame) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(frame).map_err(|source| ProtocolError::Encode {
            event: frame.event.kind(),
            source,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<ClientFrame, ProtocolError> {
        decode_client_frame(data).map_err(ProtocolError::Decode)
    }
}
