//! Identity-store failures, mapped to stable wire codes at the server
//! boundary.

use volley_protocol::ErrorCode;

/// Errors from identity operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("profile not found")]
    ProfileNotFound,

    #[error("email already used")]
    EmailAlreadyUsed,

    #[error("username taken")]
    UsernameTaken,

    #[error("profile already linked to an account")]
    ProfileAlreadyLinked,

    #[error("verification rate limited, retry in {retry_after_ms} ms")]
    VerificationRateLimited { retry_after_ms: u64 },

    #[error("invalid verification code")]
    InvalidVerificationCode,

    #[error("verification code expired")]
    VerificationCodeExpired,

    #[error("friend request already exists")]
    FriendRequestAlreadyExists,

    #[error("already friends")]
    AlreadyFriends,

    #[error("friend request not found")]
    FriendRequestNotFound,
}

impl IdentityError {
    /// The stable wire code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            IdentityError::ProfileNotFound => ErrorCode::ProfileNotFound,
            IdentityError::EmailAlreadyUsed => ErrorCode::EmailAlreadyUsed,
            IdentityError::UsernameTaken => ErrorCode::UsernameTaken,
            IdentityError::ProfileAlreadyLinked => {
                ErrorCode::ProfileAlreadyLinked
            }
            IdentityError::VerificationRateLimited { .. } => {
                ErrorCode::VerificationRateLimited
            }
            IdentityError::InvalidVerificationCode => {
                ErrorCode::InvalidVerificationCode
            }
            IdentityError::VerificationCodeExpired => {
                ErrorCode::VerificationCodeExpired
            }
            IdentityError::FriendRequestAlreadyExists => {
                ErrorCode::FriendRequestAlreadyExists
            }
            IdentityError::AlreadyFriends => ErrorCode::AlreadyFriends,
            IdentityError::FriendRequestNotFound => {
                ErrorCode::FriendRequestNotFound
            }
        }
    }
}
