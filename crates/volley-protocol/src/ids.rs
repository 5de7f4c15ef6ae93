//! Identity newtypes used as keys across the whole server.
//!
//! Wrapping primitives in named structs keeps the key spaces apart:
//! a `PlayerKey` can never be handed to a function expecting a
//! `ConnectionId`, even though both are small integers underneath.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque client-generated device identifier, 6–64 characters.
///
/// This is the server's primary identity key for a session: tokens are
/// bound to it, rooms index disconnected players by it, and reward flags
/// and pending match results are stored under it. The server never
/// trusts a persistent id from an event payload after registration —
/// only the one bound to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(pub String);

impl PersistentId {
    /// Minimum accepted length.
    pub const MIN_LEN: usize = 6;
    /// Maximum accepted length.
    pub const MAX_LEN: usize = 64;

    /// Validates a raw client-supplied id and wraps it.
    ///
    /// Accepts 6–64 characters of ASCII alphanumerics, `-` and `_`.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&raw.len());
        let ok_chars = raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        (ok_len && ok_chars).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Logs only ever need a recognizable prefix, not the full id.
        let shown = &self.0[..self.0.len().min(12)];
        write!(f, "{shown}…")
    }
}

/// Room-local stable key for a player record.
///
/// Allocated once at lobby join and never reused within the room's
/// lifetime. Broadcast payloads use it as the player's id; reconnection
/// rebinds the connection index to it instead of relocating the record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize, Default,
)]
#[serde(transparent)]
pub struct PlayerKey(pub u32);

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K-{}", self.0)
    }
}

/// A 5-digit room code, first digit non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Validates a raw client-supplied code: exactly 5 decimal digits,
    /// first digit non-zero.
    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        let ok = bytes.len() == 5
            && bytes[0].is_ascii_digit()
            && bytes[0] != b'0'
            && bytes.iter().all(u8::is_ascii_digit);
        ok.then(|| Self(raw.to_string()))
    }

    /// Builds a code from a number in `[10000, 99999]`.
    pub fn from_number(n: u32) -> Option<Self> {
        (10_000..=99_999).contains(&n).then(|| Self(n.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identifier for a transport connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity-store profile key. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short shareable code for adding friends. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FriendCode(pub String);

impl fmt::Display for FriendCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // PersistentId
    // =====================================================================

    #[test]
    fn test_persistent_id_parse_accepts_valid_range() {
        assert!(PersistentId::parse("abc-12").is_some());
        assert!(PersistentId::parse(&"x".repeat(64)).is_some());
    }

    #[test]
    fn test_persistent_id_parse_rejects_short_and_long() {
        assert!(PersistentId::parse("abcde").is_none());
        assert!(PersistentId::parse(&"x".repeat(65)).is_none());
    }

    #[test]
    fn test_persistent_id_parse_rejects_bad_chars() {
        assert!(PersistentId::parse("abc 123").is_none());
        assert!(PersistentId::parse("abc/123").is_none());
    }

    #[test]
    fn test_persistent_id_display_truncates() {
        let id = PersistentId::parse(&"a".repeat(40)).unwrap();
        assert_eq!(id.to_string(), format!("{}…", "a".repeat(12)));
    }

    // =====================================================================
    // RoomCode
    // =====================================================================

    #[test]
    fn test_room_code_parse_accepts_five_digits() {
        assert!(RoomCode::parse("12345").is_some());
        assert!(RoomCode::parse("99999").is_some());
    }

    #[test]
    fn test_room_code_parse_rejects_leading_zero() {
        assert!(RoomCode::parse("01234").is_none());
    }

    #[test]
    fn test_room_code_parse_rejects_wrong_shape() {
        assert!(RoomCode::parse("1234").is_none());
        assert!(RoomCode::parse("123456").is_none());
        assert!(RoomCode::parse("12a45").is_none());
    }

    #[test]
    fn test_room_code_from_number_bounds() {
        assert!(RoomCode::from_number(9_999).is_none());
        assert!(RoomCode::from_number(10_000).is_some());
        assert!(RoomCode::from_number(99_999).is_some());
        assert!(RoomCode::from_number(100_000).is_none());
    }

    // =====================================================================
    // Serde shapes
    // =====================================================================

    #[test]
    fn test_player_key_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerKey(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_room_code_serializes_as_plain_string() {
        let code = RoomCode::parse("54321").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"54321\"");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(3).to_string(), "conn-3");
    }
}
