//! Stable error codes surfaced to clients.
//!
//! These strings are part of the wire contract: client UIs switch on
//! them, so renaming one is a breaking protocol change.

use serde::{Deserialize, Serialize};

/// Every error code a client can receive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Auth --
    AuthRequired,
    AuthContextRequired,
    InvalidCredentials,
    EmailNotVerified,
    AccountSuspended,

    // -- Lobby / match --
    RoomNotFound,
    RoomFull,
    GameAlreadyStarted,
    NotLeader,
    NotAllReady,
    InvalidKickTarget,
    ActiveMatchLock,

    // -- Party / friends --
    ProfileNotFound,
    FriendRequestAlreadyExists,
    AlreadyFriends,
    FriendRequestNotFound,
    PartyInviteNotAllowed,
    PartyInviteExpired,
    TargetNotOnline,
    TargetAlreadyInParty,

    // -- Identity-store account flows --
    EmailAlreadyUsed,
    UsernameTaken,
    ProfileAlreadyLinked,
    VerificationRateLimited,
    InvalidVerificationCode,
    VerificationCodeExpired,

    // -- Rate / abuse --
    RateLimited,
    ReconnectLimited,

    // -- Rewards --
    InMatch,
    NotAllowedWhileReady,
    InvalidRewardType,
}

impl ErrorCode {
    /// The exact wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::AuthContextRequired => "AUTH_CONTEXT_REQUIRED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            ErrorCode::AccountSuspended => "ACCOUNT_SUSPENDED",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::RoomFull => "ROOM_FULL",
            ErrorCode::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            ErrorCode::NotLeader => "NOT_LEADER",
            ErrorCode::NotAllReady => "NOT_ALL_READY",
            ErrorCode::InvalidKickTarget => "INVALID_KICK_TARGET",
            ErrorCode::ActiveMatchLock => "ACTIVE_MATCH_LOCK",
            ErrorCode::ProfileNotFound => "PROFILE_NOT_FOUND",
            ErrorCode::FriendRequestAlreadyExists => {
                "FRIEND_REQUEST_ALREADY_EXISTS"
            }
            ErrorCode::AlreadyFriends => "ALREADY_FRIENDS",
            ErrorCode::FriendRequestNotFound => "FRIEND_REQUEST_NOT_FOUND",
            ErrorCode::PartyInviteNotAllowed => "PARTY_INVITE_NOT_ALLOWED",
            ErrorCode::PartyInviteExpired => "PARTY_INVITE_EXPIRED",
            ErrorCode::TargetNotOnline => "TARGET_NOT_ONLINE",
            ErrorCode::TargetAlreadyInParty => "TARGET_ALREADY_IN_PARTY",
            ErrorCode::EmailAlreadyUsed => "EMAIL_ALREADY_USED",
            ErrorCode::UsernameTaken => "USERNAME_TAKEN",
            ErrorCode::ProfileAlreadyLinked => "PROFILE_ALREADY_LINKED",
            ErrorCode::VerificationRateLimited => "VERIFICATION_RATE_LIMITED",
            ErrorCode::InvalidVerificationCode => "INVALID_VERIFICATION_CODE",
            ErrorCode::VerificationCodeExpired => "VERIFICATION_CODE_EXPIRED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ReconnectLimited => "RECONNECT_LIMITED",
            ErrorCode::InMatch => "IN_MATCH",
            ErrorCode::NotAllowedWhileReady => "NOT_ALLOWED_WHILE_READY",
            ErrorCode::InvalidRewardType => "INVALID_REWARD_TYPE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serde_matches_as_str() {
        for code in [
            ErrorCode::AuthRequired,
            ErrorCode::RoomFull,
            ErrorCode::FriendRequestAlreadyExists,
            ErrorCode::NotAllowedWhileReady,
            ErrorCode::VerificationRateLimited,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_error_code_round_trip() {
        let code: ErrorCode =
            serde_json::from_str("\"RECONNECT_LIMITED\"").unwrap();
        assert_eq!(code, ErrorCode::ReconnectLimited);
    }
}
