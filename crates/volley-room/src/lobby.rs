//! Lobby operations: create, join, ready, start, leave, kick.
//!
//! Each operation validates against the room's state machine, mutates
//! the store, and returns the events to deliver. The caller resolves
//! the caller's room code from connection metadata and owns delivery,
//! party-invite invalidation, and broadcast-group membership.

use rand::seq::IndexedRandom;
use volley_protocol::{
    ConnectionId, MapKey, PersistentId, PlayerKey, ProfileId, RoomCode,
    RoomStatus, ServerEvent,
};

use crate::{
    Outbound, Room, RoomError, RoomStore, COUNTDOWN_MS,
};

/// Result of creating or joining a room.
#[derive(Debug)]
pub struct JoinOutcome {
    pub room_code: RoomCode,
    pub player_key: PlayerKey,
    pub events: Vec<Outbound>,
}

/// Why a player is leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveKind {
    /// Explicit `leaveRoom`: the record is removed even mid-match.
    Voluntary,
    /// The socket dropped: mid-match the record is preserved as
    /// disconnected.
    SocketDropped,
}

/// Result of a leave or disconnect.
#[derive(Debug)]
pub struct LeaveOutcome {
    pub events: Vec<Outbound>,
    pub room_deleted: bool,
    pub new_leader: Option<PlayerKey>,
    /// True when the record was kept with `disconnected = true`.
    pub preserved: bool,
}

/// Result of a kick.
#[derive(Debug)]
pub struct KickOutcome {
    pub events: Vec<Outbound>,
    pub target_connection: ConnectionId,
    pub target_persistent_id: PersistentId,
}

impl RoomStore {
    /// `createRoom`: allocates a room with the caller as ready leader.
    pub fn create_room_for(
        &mut self,
        conn: ConnectionId,
        pid: &PersistentId,
        profile: Option<ProfileId>,
        name: String,
    ) -> Result<JoinOutcome, RoomError> {
        if let Some(active) = self.active_match_of(pid) {
            return Err(RoomError::ActiveMatchLock(active));
        }
        let mut events = self.leave_current_lobby(pid);

        let code = self.create_room();
        let room = self.get_mut(&code).expect("just created");
        let player_key = room.insert_player(conn, pid.clone(), profile, name);
        let lobby = room.lobby_snapshot();
        self.index_member(pid.clone(), code.clone());

        events.push(Outbound::conn(
            conn,
            ServerEvent::RoomCreated {
                room_code: code.clone(),
                player_key,
                lobby: lobby.clone(),
            },
        ));
        events.push(Outbound::room(
            code.clone(),
            ServerEvent::LobbyUpdate { lobby },
        ));
        Ok(JoinOutcome { room_code: code, player_key, events })
    }

    /// `joinRoom`: inserts the caller as a non-ready member.
    pub fn join_room(
        &mut self,
        conn: ConnectionId,
        pid: &PersistentId,
        profile: Option<ProfileId>,
        name: String,
        code: &RoomCode,
    ) -> Result<JoinOutcome, RoomError> {
        if let Some(active) = self.active_match_of(pid) {
            return Err(RoomError::ActiveMatchLock(active));
        }
        {
            let room = self
                .get(code)
                .ok_or_else(|| RoomError::NotFound(code.clone()))?;
            if !room.status.is_joinable() {
                return Err(RoomError::GameAlreadyStarted(code.clone()));
            }
            if room.is_full() {
                return Err(RoomError::RoomFull(code.clone()));
            }
        }
        let mut events = self.leave_current_lobby(pid);

        let room = self.get_mut(code).expect("checked above");
        let player_key = room.insert_player(conn, pid.clone(), profile, name);
        let joined = room
            .lobby_snapshot()
            .players
            .into_iter()
            .find(|p| p.player_key == player_key)
            .expect("just inserted");
        let lobby = room.lobby_snapshot();
        self.index_member(pid.clone(), code.clone());

        events.push(Outbound::room(
            code.clone(),
            ServerEvent::PlayerJoined { player: joined },
        ));
        events.push(Outbound::room(
            code.clone(),
            ServerEvent::LobbyUpdate { lobby: lobby.clone() },
        ));
        events.push(Outbound::conn(conn, ServerEvent::LobbySnapshot { lobby }));
        Ok(JoinOutcome { room_code: code.clone(), player_key, events })
    }

    /// `playerReady` / `toggleReady`. The leader's flag is pinned true.
    pub fn set_ready(
        &mut self,
        code: &RoomCode,
        conn: ConnectionId,
        toggle: bool,
    ) -> Result<Vec<Outbound>, RoomError> {
        let room = self
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        let leader = room.leader;
        let player = room
            .player_by_connection_mut(conn)
            .ok_or(RoomError::NotInRoom)?;
        if player.key != leader {
            player.ready = if toggle { !player.ready } else { true };
        }
        let key = player.key;
        let ready = player.ready;
        let lobby = room.lobby_snapshot();
        Ok(vec![
            Outbound::room(
                code.clone(),
                ServerEvent::PlayerReadyUpdate { player_key: key, ready },
            ),
            Outbound::room(code.clone(), ServerEvent::LobbyUpdate { lobby }),
        ])
    }

    /// `startGame`: leader only, everyone connected and ready.
    ///
    /// Picks a random map, resets the room for the match, and starts
    /// the countdown; the tick promotes to `playing` once it elapses.
    /// `grant_reward` answers whether a member's instant-respawn flag
    /// was pending (and consumes it).
    pub fn start_game(
        &mut self,
        code: &RoomCode,
        conn: ConnectionId,
        now: u64,
        grant_reward: impl FnMut(&PersistentId) -> bool,
    ) -> Result<Vec<Outbound>, RoomError> {
        let room = self
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if room.status != RoomStatus::Lobby {
            return Err(RoomError::GameAlreadyStarted(code.clone()));
        }
        let leader = room.leader;
        let caller = room
            .player_by_connection(conn)
            .ok_or(RoomError::NotInRoom)?;
        if caller.key != leader {
            return Err(RoomError::NotLeader);
        }
        let all_ready = room
            .players()
            .all(|p| !p.disconnected && (p.ready || p.key == leader));
        if !all_ready {
            return Err(RoomError::NotAllReady);
        }

        let map_key = *MapKey::ALL
            .choose(&mut rand::rng())
            .expect("map list is non-empty");
        room.begin_match(map_key, now, grant_reward);

        let lobby = room.lobby_snapshot();
        Ok(vec![
            Outbound::room(
                code.clone(),
                ServerEvent::GameStarting { map_key, countdown_ms: COUNTDOWN_MS },
            ),
            Outbound::room(
                code.clone(),
                ServerEvent::CountdownStart { ends_at: now + COUNTDOWN_MS },
            ),
            Outbound::room(code.clone(), ServerEvent::LobbyUpdate { lobby }),
        ])
    }

    /// `leaveRoom` or a socket drop.
    pub fn leave(
        &mut self,
        code: &RoomCode,
        conn: ConnectionId,
        kind: LeaveKind,
    ) -> Result<LeaveOutcome, RoomError> {
        let room = self
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        let key = room.key_of_connection(conn).ok_or(RoomError::NotInRoom)?;

        // A dropped socket mid-match keeps the record for reconnection.
        if kind == LeaveKind::SocketDropped && room.status.is_active() {
            room.mark_disconnected(key);
            let lobby = room.lobby_snapshot();
            tracing::info!(room = %code, player = %key, "player disconnected mid-match");
            return Ok(LeaveOutcome {
                events: vec![Outbound::room(
                    code.clone(),
                    ServerEvent::LobbyUpdate { lobby },
                )],
                room_deleted: false,
                new_leader: None,
                preserved: true,
            });
        }

        let (name, pid) = {
            let p = room.player(key).expect("key resolved above");
            (p.name.clone(), p.persistent_id.clone())
        };
        let new_leader = room.remove_player(key);
        self.unindex_member(&pid);

        let mut events = Vec::new();
        let room_deleted = self.delete_if_empty(code);
        if !room_deleted {
            let room = self.get(code).expect("room still exists");
            events.push(Outbound::room(
                code.clone(),
                ServerEvent::PlayerLeft { player_key: key, name },
            ));
            if let Some(leader_key) = new_leader {
                events.push(Outbound::room(
                    code.clone(),
                    ServerEvent::NewLeader { player_key: leader_key },
                ));
            }
            events.push(Outbound::room(
                code.clone(),
                ServerEvent::LobbyUpdate { lobby: room.lobby_snapshot() },
            ));
        }
        tracing::info!(room = %code, player = %key, deleted = room_deleted, "player left");
        Ok(LeaveOutcome { events, room_deleted, new_leader, preserved: false })
    }

    /// `kickPlayer`: leader only, lobby only, never the leader itself.
    pub fn kick(
        &mut self,
        code: &RoomCode,
        conn: ConnectionId,
        target: PlayerKey,
    ) -> Result<KickOutcome, RoomError> {
        let room = self
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if room.status != RoomStatus::Lobby {
            return Err(RoomError::GameAlreadyStarted(code.clone()));
        }
        let caller = room
            .player_by_connection(conn)
            .ok_or(RoomError::NotInRoom)?;
        if caller.key != room.leader {
            return Err(RoomError::NotLeader);
        }
        if target == room.leader {
            return Err(RoomError::InvalidKickTarget);
        }
        let (target_connection, target_pid, target_name) = room
            .player(target)
            .map(|p| (p.connection, p.persistent_id.clone(), p.name.clone()))
            .ok_or(RoomError::InvalidKickTarget)?;

        room.remove_player(target);
        self.unindex_member(&target_pid);

        let room = self.get(code).expect("leader remains");
        let events = vec![
            Outbound::conn(
                target_connection,
                ServerEvent::KickedFromParty {
                    room_code: code.clone(),
                    reason: "kicked by leader".into(),
                },
            ),
            Outbound::room(
                code.clone(),
                ServerEvent::PlayerLeft { player_key: target, name: target_name },
            ),
            Outbound::room(
                code.clone(),
                ServerEvent::LobbyUpdate { lobby: room.lobby_snapshot() },
            ),
        ];
        tracing::info!(room = %code, target = %target, "player kicked");
        Ok(KickOutcome {
            events,
            target_connection,
            target_persistent_id: target_pid,
        })
    }

    /// Drops the caller's membership in a *lobby* room, if any, before
    /// a create/join moves it elsewhere, returning the departure events
    /// for the old room. Active matches are left alone (those are
    /// refused earlier with `ACTIVE_MATCH_LOCK`).
    pub(crate) fn leave_current_lobby(&mut self, pid: &PersistentId) -> Vec<Outbound> {
        let Some(code) = self.room_of(pid).cloned() else { return Vec::new() };
        let Some(room) = self.get(&code) else { return Vec::new() };
        if room.status != RoomStatus::Lobby {
            return Vec::new();
        }
        let Some(key) = room.key_of_persistent(pid) else { return Vec::new() };
        let Some(conn) = room.player(key).map(|p| p.connection) else {
            return Vec::new();
        };
        self.leave(&code, conn, LeaveKind::Voluntary)
            .map(|o| o.events)
            .unwrap_or_default()
    }
}

/// Builds a direct lobby-snapshot reply for `requestLobbyState` and
/// `returnToLobby`.
pub fn lobby_state_reply(room: &Room, conn: ConnectionId) -> Outbound {
    Outbound::conn(
        conn,
        ServerEvent::LobbySnapshot { lobby: room.lobby_snapshot() },
    )
}
