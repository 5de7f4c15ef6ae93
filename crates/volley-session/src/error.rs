//! Error types for the session layer.

/// Errors from token handling and the session stores.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token is not two base64url sections, or the payload is not
    /// a claims object.
    #[error("malformed session token")]
    TokenMalformed,

    /// The signature does not match this server's secret.
    #[error("session token signature mismatch")]
    TokenSignature,

    /// The token's expiry is in the past.
    #[error("session token expired")]
    TokenExpired,

    /// Claims could not be serialized while minting.
    #[error("failed to encode token claims: {0}")]
    TokenEncode(#[source] serde_json::Error),

    /// The reconnect guard rejected the attempt; retry after the given
    /// number of milliseconds.
    #[error("reconnect limited, retry in {retry_after_ms} ms")]
    ReconnectLimited { retry_after_ms: u64 },
}
