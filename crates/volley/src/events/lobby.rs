//! Lobby event handlers: room creation, joining, ready flags, match
//! start, leaving, kicks, and lobby-state requests.

use std::net::IpAddr;

use volley_guard::{HandshakeScope, StrikeReason};
use volley_identity::IdentityStore;
use volley_protocol::{
    ConnectionId, ErrorCode, EventTag, PersistentId, PlayerKey, RoomCode,
    ServerEvent,
};
use volley_room::{lobby_state_reply, LeaveKind, RoomError};

use crate::ServerState;

/// `createRoom`. A caller with a reconnectable match is routed back
/// into it instead.
pub(crate) async fn create_room<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ip: Option<IpAddr>,
    player_name: Option<String>,
    now: u64,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };

    if super::register::try_reconnect(state, conn, &pid, now).await {
        return;
    }

    let admitted = {
        let mut handshakes = state.lock(&state.handshakes);
        let ip_ok = ip.map_or(true, |ip| {
            handshakes.admit_ip(ip, HandshakeScope::Create, now)
        });
        ip_ok && handshakes.admit_pid(&pid, HandshakeScope::Create, now)
    };
    if !admitted {
        state.log_unscoped(
            conn,
            StrikeReason::RateLimit(EventTag::CreateRoom),
            now,
        );
        emit_join_error(state, conn, ErrorCode::RateLimited, "slow down");
        return;
    }

    let name = display_name(state, conn, &pid, player_name);
    let profile = state.gateway.meta(conn).and_then(|m| m.profile_id);

    let mut rooms = state.rooms.lock().await;
    match rooms.create_room_for(conn, &pid, profile, name) {
        Ok(outcome) => {
            state.gateway.join_room(
                conn,
                outcome.room_code.clone(),
                Some(outcome.player_key),
            );
            state.deliver(outcome.events);
        }
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `joinRoom`.
pub(crate) async fn join_room<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ip: Option<IpAddr>,
    raw_code: String,
    player_name: Option<String>,
    now: u64,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };

    if super::register::try_reconnect(state, conn, &pid, now).await {
        return;
    }

    let Some(code) = RoomCode::parse(raw_code.trim()) else {
        emit_join_error(
            state,
            conn,
            ErrorCode::RoomNotFound,
            "room codes are 5 digits",
        );
        return;
    };

    let admitted = {
        let mut handshakes = state.lock(&state.handshakes);
        let ip_ok = ip.map_or(true, |ip| {
            handshakes.admit_ip(ip, HandshakeScope::Join, now)
        });
        ip_ok && handshakes.admit_pid(&pid, HandshakeScope::Join, now)
    };
    if !admitted {
        state.log_unscoped(
            conn,
            StrikeReason::RateLimit(EventTag::JoinRoom),
            now,
        );
        emit_join_error(state, conn, ErrorCode::RateLimited, "slow down");
        return;
    }

    let name = display_name(state, conn, &pid, player_name);
    let profile = state.gateway.meta(conn).and_then(|m| m.profile_id);

    let mut rooms = state.rooms.lock().await;
    match rooms.join_room(conn, &pid, profile, name, &code) {
        Ok(outcome) => {
            state.gateway.join_room(
                conn,
                outcome.room_code.clone(),
                Some(outcome.player_key),
            );
            state.deliver(outcome.events);
        }
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `playerReady` / `toggleReady`.
pub(crate) async fn set_ready<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    toggle: bool,
) {
    let Some(code) = room_of_conn(state, conn) else { return };
    let mut rooms = state.rooms.lock().await;
    match rooms.set_ready(&code, conn, toggle) {
        Ok(events) => state.deliver(events),
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `startGame`. Consumes pending reward flags into in-match charges and
/// invalidates the room's party invites.
pub(crate) async fn start_game<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    now: u64,
) {
    let Some(code) = room_of_conn(state, conn) else { return };

    let mut rooms = state.rooms.lock().await;
    let mut granted: Vec<PersistentId> = Vec::new();
    let result = rooms.start_game(&code, conn, now, |pid| {
        let consumed =
            state.lock(&state.rewards).consume_at_match_start(pid, now);
        if consumed {
            granted.push(pid.clone());
        }
        consumed
    });
    match result {
        Ok(events) => {
            state.deliver(events);
            // Flag consumption is a state change every device hears
            // about.
            for pid in granted {
                let ads = state.lock(&state.rewards).state(&pid);
                state
                    .gateway
                    .emit_device(&pid, ServerEvent::AdsState(ads));
            }
            drop(rooms);
            cancel_party_invites(state, &code, now);
        }
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `leaveRoom`.
pub(crate) async fn leave_room<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    now: u64,
) {
    let Some(code) = room_of_conn(state, conn) else { return };
    let mut rooms = state.rooms.lock().await;
    match rooms.leave(&code, conn, LeaveKind::Voluntary) {
        Ok(outcome) => {
            state.gateway.leave_room(conn);
            let deleted = outcome.room_deleted;
            state.deliver(outcome.events);
            drop(rooms);
            if deleted {
                cancel_party_invites(state, &code, now);
            }
        }
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `kickPlayer`.
pub(crate) async fn kick_player<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    target: PlayerKey,
) {
    let Some(code) = room_of_conn(state, conn) else { return };
    let mut rooms = state.rooms.lock().await;
    match rooms.kick(&code, conn, target) {
        Ok(outcome) => {
            state.gateway.leave_room(outcome.target_connection);
            state.deliver(outcome.events);
        }
        Err(e) => emit_room_error(state, conn, e),
    }
}

/// `requestLobbyState` / `returnToLobby`: replies with a snapshot and
/// rejoins the caller's socket to the room's broadcast group.
pub(crate) async fn lobby_state<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    raw_code: Option<String>,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };

    let rooms = state.rooms.lock().await;
    let code = match raw_code.as_deref().and_then(RoomCode::parse) {
        Some(code) => Some(code),
        None => rooms.room_of(&pid).cloned(),
    };
    let room = code.as_ref().and_then(|c| rooms.get(c));
    let Some(room) = room else {
        emit_join_error(state, conn, ErrorCode::RoomNotFound, "no such room");
        return;
    };
    // Only members get rejoined to the broadcast group.
    let Some(key) = room.key_of_persistent(&pid) else {
        emit_join_error(
            state,
            conn,
            ErrorCode::RoomNotFound,
            "not a member of this room",
        );
        return;
    };
    state.gateway.join_room(conn, room.code.clone(), Some(key));
    state.deliver(vec![lobby_state_reply(room, conn)]);
}

/// `ackMatchResults`: idempotently consumes the pending result and
/// marks the archived room snapshot as seen.
pub(crate) async fn ack_match_results<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };
    let acked = state.lock(&state.results).ack(&pid);

    if let Some(results) = acked {
        let mut rooms = state.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&results.room_code) {
            if let Some((_, seen)) = room.last_results.as_mut() {
                seen.insert(pid);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Expires every invite targeting `code` and tells both sides.
pub(crate) fn cancel_party_invites<I: IdentityStore>(
    state: &ServerState<I>,
    code: &RoomCode,
    _now: u64,
) {
    let cancelled = state.lock(&state.party).cancel_for_room(code);
    for invite in cancelled {
        let expired = ServerEvent::PartyInviteExpired {
            invite_id: invite.invite_id.clone(),
        };
        super::social::emit_to_profile(state, &invite.to_profile_id, expired.clone());
        super::social::emit_to_profile(state, &invite.from_profile_id, expired);
    }
}

fn room_of_conn<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
) -> Option<RoomCode> {
    let code = state.gateway.meta(conn).and_then(|meta| meta.room_code);
    if code.is_none() {
        emit_join_error(
            state,
            conn,
            ErrorCode::RoomNotFound,
            "not in a room",
        );
    }
    code
}

fn display_name<I: IdentityStore>(
    state: &ServerState<I>,
    _conn: ConnectionId,
    pid: &PersistentId,
    override_name: Option<String>,
) -> String {
    if let Some(name) = override_name {
        let trimmed = name.trim().to_string();
        if !trimmed.is_empty() {
            return trimmed.chars().take(20).collect();
        }
    }
    state
        .lock(&state.sessions)
        .get(pid)
        .map(|record| record.name.clone())
        .unwrap_or_else(|| "Player".to_string())
}

fn emit_room_error<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    err: RoomError,
) {
    tracing::debug!(%conn, error = %err, "lobby operation refused");
    state.gateway.emit(
        conn,
        ServerEvent::JoinError { code: err.code(), message: err.to_string() },
    );
}

fn emit_join_error<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    code: ErrorCode,
    message: &str,
) {
    state.gateway.emit(
        conn,
        ServerEvent::JoinError { code, message: message.into() },
    );
}

// Re-exported for the tick driver's match-end settlement.
pub(crate) use settle::settle_match_end;

mod settle {
    use volley_identity::IdentityStore;
    use volley_protocol::{RoomCode, ServerEvent};
    use volley_room::{MatchEndReport, RoomStore};

    use crate::ServerState;

    /// Applies a finished match to the process-wide stores: pending
    /// results, reward flags (with `ads:state` pushes), the abuse
    /// snapshot stream, and room/index cleanup.
    pub(crate) fn settle_match_end<I: IdentityStore>(
        state: &ServerState<I>,
        rooms: &mut RoomStore,
        code: &RoomCode,
        report: MatchEndReport,
        now: u64,
    ) {
        let participants: Vec<_> = report
            .rewards
            .iter()
            .map(|r| r.persistent_id.clone())
            .collect();
        state
            .lock(&state.results)
            .store(participants, &report.results);

        for outcome in &report.rewards {
            if !outcome.granted {
                continue;
            }
            let ads = {
                let mut rewards = state.lock(&state.rewards);
                if outcome.consumed_any {
                    // Charges were spent; the flag stays cleared.
                    rewards.state(&outcome.persistent_id)
                } else {
                    rewards.restore(&outcome.persistent_id, now)
                }
            };
            state
                .gateway
                .emit_device(&outcome.persistent_id, ServerEvent::AdsState(ads));
        }

        for pid in &report.removed_players {
            rooms.unindex_member(pid);
        }

        state.audit.record_room_snapshot(&report.abuse_snapshot);

        if report.room_emptied {
            rooms.delete_room(code);
        }
        super::cancel_party_invites(state, code, now);
    }
}
