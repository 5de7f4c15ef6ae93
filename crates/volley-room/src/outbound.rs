//! Outbound addressing.
//!
//! Game operations return lists of `(recipient, event)` pairs; the
//! server layer owns the sockets and performs the actual delivery.

use volley_protocol::{ConnectionId, PersistentId, RoomCode, ServerEvent};

/// Where an event goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    /// Every connection joined to the room's broadcast group.
    Room(RoomCode),
    /// One connection.
    Conn(ConnectionId),
    /// Every live connection of a persistent id.
    Device(PersistentId),
}

/// One event addressed for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipient,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn room(code: RoomCode, event: ServerEvent) -> Self {
        Self { to: Recipient::Room(code), event }
    }

    pub fn conn(conn: ConnectionId, event: ServerEvent) -> Self {
        Self { to: Recipient::Conn(conn), event }
    }

    pub fn device(pid: PersistentId, event: ServerEvent) -> Self {
        Self { to: Recipient::Device(pid), event }
    }
}
