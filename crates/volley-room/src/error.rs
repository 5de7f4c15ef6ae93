//! Error types for room and lobby operations.

use volley_protocol::{ErrorCode, RoomCode};

/// Errors surfaced to clients from lobby and match operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("game already started in room {0}")]
    GameAlreadyStarted(RoomCode),

    #[error("caller is not the room leader")]
    NotLeader,

    #[error("not all players are ready")]
    NotAllReady,

    #[error("invalid kick target")]
    InvalidKickTarget,

    #[error("caller has an active match in room {0}")]
    ActiveMatchLock(RoomCode),

    #[error("caller is not in a room")]
    NotInRoom,
}

impl RoomError {
    /// The wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::NotFound(_) => ErrorCode::RoomNotFound,
            RoomError::RoomFull(_) => ErrorCode::RoomFull,
            RoomError::GameAlreadyStarted(_) => ErrorCode::GameAlreadyStarted,
            RoomError::NotLeader => ErrorCode::NotLeader,
            RoomError::NotAllReady => ErrorCode::NotAllReady,
            RoomError::InvalidKickTarget => ErrorCode::InvalidKickTarget,
            RoomError::ActiveMatchLock(_) => ErrorCode::ActiveMatchLock,
            RoomError::NotInRoom => ErrorCode::RoomNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_wire_strings() {
        let code = RoomCode::parse("12345").unwrap();
        assert_eq!(RoomError::NotFound(code.clone()).code(), ErrorCode::RoomNotFound);
        assert_eq!(RoomError::RoomFull(code).code(), ErrorCode::RoomFull);
        assert_eq!(RoomError::NotLeader.code(), ErrorCode::NotLeader);
        assert_eq!(RoomError::NotAllReady.code(), ErrorCode::NotAllReady);
    }
}
