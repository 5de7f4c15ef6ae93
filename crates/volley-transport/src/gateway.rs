//! The connection gateway: outbound senders, metadata slots, room
//! broadcast groups, and per-device connection sets.
//!
//! Delivery is fire-and-forget: events go into each connection's
//! unbounded channel and a writer task drains it onto the socket. A
//! gone receiver just drops the event, so neither the tick loop nor a
//! socket task ever blocks on a slow client.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use volley_protocol::{
    ConnectionId, PersistentId, PlayerKey, ProfileId, RoomCode, ServerEvent,
    ServerFrame,
};

/// Per-connection metadata slots.
#[derive(Debug, Clone, Default)]
pub struct ConnMeta {
    pub persistent_id: Option<PersistentId>,
    pub profile_id: Option<ProfileId>,
    pub room_code: Option<RoomCode>,
    pub player_key: Option<PlayerKey>,
}

struct Client {
    sender: mpsc::UnboundedSender<ServerFrame>,
    meta: ConnMeta,
}

#[derive(Default)]
struct Inner {
    conns: HashMap<ConnectionId, Client>,
    rooms: HashMap<RoomCode, HashSet<ConnectionId>>,
    devices: HashMap<PersistentId, HashSet<ConnectionId>>,
    profiles: HashMap<ProfileId, HashSet<ConnectionId>>,
}

/// Registry of live connections and their addressing state.
#[derive(Default)]
pub struct Gateway {
    inner: Mutex<Inner>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a connection, returning the receiver its writer task
    /// drains.
    pub fn register(
        &self,
        conn: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().conns.insert(
            conn,
            Client { sender: tx, meta: ConnMeta::default() },
        );
        rx
    }

    /// Removes a connection from every index.
    pub fn unregister(&self, conn: ConnectionId) {
        let mut inner = self.lock();
        let Some(client) = inner.conns.remove(&conn) else { return };
        if let Some(code) = &client.meta.room_code {
            if let Some(group) = inner.rooms.get_mut(code) {
                group.remove(&conn);
                if group.is_empty() {
                    let code = code.clone();
                    inner.rooms.remove(&code);
                }
            }
        }
        if let Some(pid) = &client.meta.persistent_id {
            if let Some(set) = inner.devices.get_mut(pid) {
                set.remove(&conn);
                if set.is_empty() {
                    let pid = pid.clone();
                    inner.devices.remove(&pid);
                }
            }
        }
        if let Some(profile) = &client.meta.profile_id {
            if let Some(set) = inner.profiles.get_mut(profile) {
                set.remove(&conn);
                if set.is_empty() {
                    let profile = profile.clone();
                    inner.profiles.remove(&profile);
                }
            }
        }
    }

    /// Forcibly detaches a connection: dropping its sender ends the
    /// writer task, which closes the socket. Used when a newer socket
    /// supersedes an old one for the same device.
    pub fn kick(&self, conn: ConnectionId) {
        tracing::debug!(%conn, "kicking superseded connection");
        self.unregister(conn);
    }

    /// The number of live connections.
    pub fn connection_count(&self) -> usize {
        self.lock().conns.len()
    }

    /// A copy of a connection's metadata.
    pub fn meta(&self, conn: ConnectionId) -> Option<ConnMeta> {
        self.lock().conns.get(&conn).map(|c| c.meta.clone())
    }

    /// Binds a persistent id to a connection. Returns any *other* live
    /// connections already bound to the same device, so the caller can
    /// disconnect superseded sockets.
    pub fn bind_device(
        &self,
        conn: ConnectionId,
        pid: PersistentId,
    ) -> Vec<ConnectionId> {
        let mut inner = self.lock();
        let Some(client) = inner.conns.get_mut(&conn) else {
            return Vec::new();
        };
        client.meta.persistent_id = Some(pid.clone());
        let set = inner.devices.entry(pid).or_default();
        let others: Vec<ConnectionId> =
            set.iter().copied().filter(|c| *c != conn).collect();
        set.insert(conn);
        others
    }

    /// Stores the profile id slot, keeping the profile index in sync.
    pub fn set_profile(&self, conn: ConnectionId, profile: Option<ProfileId>) {
        let mut inner = self.lock();
        let previous = match inner.conns.get_mut(&conn) {
            Some(client) => {
                let prev = client.meta.profile_id.take();
                client.meta.profile_id = profile.clone();
                prev
            }
            None => return,
        };
        if let Some(prev) = previous {
            if let Some(set) = inner.profiles.get_mut(&prev) {
                set.remove(&conn);
                if set.is_empty() {
                    inner.profiles.remove(&prev);
                }
            }
        }
        if let Some(profile) = profile {
            inner.profiles.entry(profile).or_default().insert(conn);
        }
    }

    /// Live connections whose device is bound to a profile.
    pub fn profile_connections(&self, profile: &ProfileId) -> Vec<ConnectionId> {
        self.lock()
            .profiles
            .get(profile)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether any connection is bound to this profile.
    pub fn profile_online(&self, profile: &ProfileId) -> bool {
        self.lock()
            .profiles
            .get(profile)
            .is_some_and(|set| !set.is_empty())
    }

    /// Emits to every connection bound to a profile.
    pub fn emit_profile(&self, profile: &ProfileId, event: ServerEvent) {
        let inner = self.lock();
        let Some(set) = inner.profiles.get(profile) else { return };
        for conn in set {
            if let Some(client) = inner.conns.get(conn) {
                let _ = client.sender.send(ServerFrame::from(event.clone()));
            }
        }
    }

    /// Joins a connection to a room's broadcast group (leaving any
    /// previous group) and stores the room/player slots.
    pub fn join_room(
        &self,
        conn: ConnectionId,
        code: RoomCode,
        player_key: Option<PlayerKey>,
    ) {
        let mut inner = self.lock();
        let previous = match inner.conns.get_mut(&conn) {
            Some(client) => {
                let prev = client.meta.room_code.take();
                client.meta.room_code = Some(code.clone());
                client.meta.player_key = player_key;
                prev
            }
            None => return,
        };
        if let Some(prev) = previous {
            if prev != code {
                if let Some(group) = inner.rooms.get_mut(&prev) {
                    group.remove(&conn);
                    if group.is_empty() {
                        inner.rooms.remove(&prev);
                    }
                }
            }
        }
        inner.rooms.entry(code).or_default().insert(conn);
    }

    /// Removes a connection from its room group and clears the slots.
    pub fn leave_room(&self, conn: ConnectionId) {
        let mut inner = self.lock();
        let code = match inner.conns.get_mut(&conn) {
            Some(client) => {
                client.meta.player_key = None;
                client.meta.room_code.take()
            }
            None => return,
        };
        if let Some(code) = code {
            if let Some(group) = inner.rooms.get_mut(&code) {
                group.remove(&conn);
                if group.is_empty() {
                    inner.rooms.remove(&code);
                }
            }
        }
    }

    /// Live connections bound to a device.
    pub fn device_connections(&self, pid: &PersistentId) -> Vec<ConnectionId> {
        self.lock()
            .devices
            .get(pid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------

    /// Emits to one connection.
    pub fn emit(&self, conn: ConnectionId, event: ServerEvent) {
        self.emit_frame(conn, ServerFrame::from(event));
    }

    /// Emits a frame (with its ack id) to one connection.
    pub fn emit_frame(&self, conn: ConnectionId, frame: ServerFrame) {
        if let Some(client) = self.lock().conns.get(&conn) {
            let _ = client.sender.send(frame);
        }
    }

    /// Broadcasts to every live connection (heartbeats).
    pub fn broadcast_all(&self, event: ServerEvent) {
        let inner = self.lock();
        for client in inner.conns.values() {
            let _ = client.sender.send(ServerFrame::from(event.clone()));
        }
    }

    /// Broadcasts to every connection in a room group.
    pub fn broadcast_room(&self, code: &RoomCode, event: ServerEvent) {
        let inner = self.lock();
        let Some(group) = inner.rooms.get(code) else { return };
        for conn in group {
            if let Some(client) = inner.conns.get(conn) {
                let _ = client.sender.send(ServerFrame::from(event.clone()));
            }
        }
    }

    /// Emits to every live connection of a device.
    pub fn emit_device(&self, pid: &PersistentId, event: ServerEvent) {
        let inner = self.lock();
        let Some(set) = inner.devices.get(pid) else { return };
        for conn in set {
            if let Some(client) = inner.conns.get(conn) {
                let _ = client.sender.send(ServerFrame::from(event.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PersistentId {
        PersistentId::parse(s).unwrap()
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    #[test]
    fn test_emit_reaches_registered_connection() {
        let gw = Gateway::new();
        let mut rx = gw.register(ConnectionId(1));
        gw.emit(ConnectionId(1), ServerEvent::Heartbeat { t: 7 });
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, ServerEvent::Heartbeat { t: 7 });
    }

    #[test]
    fn test_emit_to_unknown_connection_is_dropped() {
        let gw = Gateway::new();
        // No panic, no effect.
        gw.emit(ConnectionId(9), ServerEvent::Heartbeat { t: 7 });
    }

    #[test]
    fn test_broadcast_room_reaches_members_only() {
        let gw = Gateway::new();
        let mut rx1 = gw.register(ConnectionId(1));
        let mut rx2 = gw.register(ConnectionId(2));
        let mut rx3 = gw.register(ConnectionId(3));
        gw.join_room(ConnectionId(1), code("12345"), Some(PlayerKey(1)));
        gw.join_room(ConnectionId(2), code("12345"), Some(PlayerKey(2)));
        gw.join_room(ConnectionId(3), code("54321"), Some(PlayerKey(1)));

        gw.broadcast_room(&code("12345"), ServerEvent::Heartbeat { t: 1 });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_join_room_moves_between_groups() {
        let gw = Gateway::new();
        let mut rx = gw.register(ConnectionId(1));
        gw.join_room(ConnectionId(1), code("12345"), Some(PlayerKey(1)));
        gw.join_room(ConnectionId(1), code("54321"), Some(PlayerKey(3)));

        gw.broadcast_room(&code("12345"), ServerEvent::Heartbeat { t: 1 });
        assert!(rx.try_recv().is_err());
        gw.broadcast_room(&code("54321"), ServerEvent::Heartbeat { t: 2 });
        assert!(rx.try_recv().is_ok());
        assert_eq!(
            gw.meta(ConnectionId(1)).unwrap().player_key,
            Some(PlayerKey(3))
        );
    }

    #[test]
    fn test_bind_device_reports_superseded_sockets() {
        let gw = Gateway::new();
        let _rx1 = gw.register(ConnectionId(1));
        let _rx2 = gw.register(ConnectionId(2));
        assert!(gw.bind_device(ConnectionId(1), pid("device-1")).is_empty());
        let others = gw.bind_device(ConnectionId(2), pid("device-1"));
        assert_eq!(others, vec![ConnectionId(1)]);
    }

    #[test]
    fn test_emit_device_fans_out() {
        let gw = Gateway::new();
        let mut rx1 = gw.register(ConnectionId(1));
        let mut rx2 = gw.register(ConnectionId(2));
        gw.bind_device(ConnectionId(1), pid("device-1"));
        gw.bind_device(ConnectionId(2), pid("device-1"));

        gw.emit_device(&pid("device-1"), ServerEvent::Heartbeat { t: 5 });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_cleans_all_indexes() {
        let gw = Gateway::new();
        let _rx = gw.register(ConnectionId(1));
        gw.bind_device(ConnectionId(1), pid("device-1"));
        gw.join_room(ConnectionId(1), code("12345"), Some(PlayerKey(1)));

        gw.unregister(ConnectionId(1));
        assert!(gw.meta(ConnectionId(1)).is_none());
        assert!(gw.device_connections(&pid("device-1")).is_empty());
        assert_eq!(gw.connection_count(), 0);
        // Broadcasting to the now-empty group is a no-op.
        gw.broadcast_room(&code("12345"), ServerEvent::Heartbeat { t: 1 });
    }

    #[test]
    fn test_leave_room_clears_slots() {
        let gw = Gateway::new();
        let mut rx = gw.register(ConnectionId(1));
        gw.join_room(ConnectionId(1), code("12345"), Some(PlayerKey(1)));
        gw.leave_room(ConnectionId(1));

        let meta = gw.meta(ConnectionId(1)).unwrap();
        assert!(meta.room_code.is_none());
        assert!(meta.player_key.is_none());
        gw.broadcast_room(&code("12345"), ServerEvent::Heartbeat { t: 1 });
        assert!(rx.try_recv().is_err());
    }
}
