//! Error types for the guard layer.

/// Errors from the abuse-audit machinery.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Opening or writing an audit stream failed.
    #[error("audit I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
