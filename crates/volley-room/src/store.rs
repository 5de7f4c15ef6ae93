//! The room store: code → room, plus the persistent-id index used by
//! reconnection.

use std::collections::HashMap;

use rand::Rng;
use volley_protocol::{PersistentId, RoomCode, RoomStatus};

use crate::room::Room;

/// All live rooms, keyed by 5-digit code.
#[derive(Default)]
pub struct RoomStore {
    rooms: HashMap<RoomCode, Room>,
    /// Which room each persistent id is a member of. Membership survives
    /// disconnection during an active match, so a reconnecting device
    /// finds its way back without a scan.
    by_persistent: HashMap<PersistentId, RoomCode>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an unused 5-digit code and inserts an empty room.
    pub fn create_room(&mut self) -> RoomCode {
        let code = loop {
            let n: u32 = rand::rng().random_range(10_000..=99_999);
            let code = RoomCode::from_number(n).expect("range is valid");
            if !self.rooms.contains_key(&code) {
                break code;
            }
        };
        self.rooms.insert(code.clone(), Room::new(code.clone()));
        tracing::info!(room = %code, "room created");
        code
    }

    pub fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn room_codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// The room a persistent id belongs to, if any.
    pub fn room_of(&self, pid: &PersistentId) -> Option<&RoomCode> {
        self.by_persistent.get(pid)
    }

    /// The room code of an *active match* (starting or playing) that
    /// holds a disconnected record for this persistent id — the
    /// reconnection predicate.
    pub fn reconnectable_room(&self, pid: &PersistentId) -> Option<RoomCode> {
        let code = self.by_persistent.get(pid)?;
        let room = self.rooms.get(code)?;
        if !room.status.is_active() {
            return None;
        }
        let key = room.key_of_persistent(pid)?;
        room.player(key)
            .filter(|p| p.disconnected)
            .map(|_| code.clone())
    }

    /// Whether a persistent id is locked to an active match (connected
    /// or not). Used to refuse `createRoom`/`joinRoom` while a match is
    /// running.
    pub fn active_match_of(&self, pid: &PersistentId) -> Option<RoomCode> {
        let code = self.by_persistent.get(pid)?;
        let room = self.rooms.get(code)?;
        room.status.is_active().then(|| code.clone())
    }

    /// Records membership for the index. Called by lobby ops.
    pub(crate) fn index_member(&mut self, pid: PersistentId, code: RoomCode) {
        self.by_persistent.insert(pid, code);
    }

    /// Clears membership for the index.
    pub fn unindex_member(&mut self, pid: &PersistentId) {
        self.by_persistent.remove(pid);
    }

    /// Deletes a room outright, dropping all member index entries.
    pub fn delete_room(&mut self, code: &RoomCode) {
        if let Some(room) = self.rooms.remove(code) {
            for player in room.players() {
                self.by_persistent.remove(&player.persistent_id);
            }
            tracing::info!(room = %code, "room deleted");
        }
    }

    /// Deletes the room if it has no members left. Returns `true` when
    /// a deletion happened.
    pub fn delete_if_empty(&mut self, code: &RoomCode) -> bool {
        match self.rooms.get(code) {
            Some(room) if room.is_empty() => {
                self.rooms.remove(code);
                tracing::info!(room = %code, "empty room deleted");
                true
            }
            _ => false,
        }
    }

    /// Rooms currently in a given status.
    pub fn codes_in_status(&self, status: RoomStatus) -> Vec<RoomCode> {
        self.rooms
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.code.clone())
            .collect()
    }
}
