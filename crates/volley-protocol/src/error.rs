//! Error types for the protocol layer.

use crate::FrameError;

/// Errors from turning frames into bytes and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound frame failed. Carries the event name so
    /// the log pins the offending payload without a second decode.
    #[error("failed to encode {event}: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An inbound frame failed to parse; the classification drives the
    /// abuse accounting.
    #[error(transparent)]
    Decode(#[from] FrameError),
}
