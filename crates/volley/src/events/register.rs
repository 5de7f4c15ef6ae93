//! `registerPlayer`, `updateName`, and the auto-reconnect that follows
//! registration.

use std::net::IpAddr;

use volley_guard::{HandshakeScope, StrikeReason};
use volley_identity::IdentityStore;
use volley_protocol::{
    ConnectionId, ErrorCode, EventTag, PersistentId, ServerEvent,
    ServerFrame,
};
use volley_room::{LeaveKind, Outbound};
use volley_session::SessionError;

use crate::ServerState;

/// Handles `registerPlayer`: token bootstrap, identity binding, pending
/// results, and the reconnect scan.
pub(crate) async fn register_player<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ip: Option<IpAddr>,
    id: String,
    name: String,
    token: Option<String>,
    now: u64,
) {
    let Some(pid) = PersistentId::parse(&id) else {
        state.gateway.emit(
            conn,
            ServerEvent::AuthError {
                code: ErrorCode::AuthRequired,
                message: "persistent id must be 6-64 characters".into(),
            },
        );
        return;
    };

    // Handshake-scope buckets: per source address and per device.
    let admitted = {
        let mut handshakes = state.lock(&state.handshakes);
        let ip_ok = ip.map_or(true, |ip| {
            handshakes.admit_ip(ip, HandshakeScope::Register, now)
        });
        ip_ok && handshakes.admit_pid(&pid, HandshakeScope::Register, now)
    };
    if !admitted {
        state.log_unscoped(
            conn,
            StrikeReason::RateLimit(EventTag::RegisterPlayer),
            now,
        );
        state.gateway.emit(
            conn,
            ServerEvent::AuthError {
                code: ErrorCode::RateLimited,
                message: "too many registrations".into(),
            },
        );
        return;
    }

    // A still-attached older socket for this device is superseded:
    // flag its room membership as disconnected, then cut it loose so
    // the reconnect scan below can rebind cleanly.
    let superseded = state.gateway.bind_device(conn, pid.clone());
    for old in superseded {
        let old_room = state
            .gateway
            .meta(old)
            .and_then(|meta| meta.room_code);
        if let Some(code) = old_room {
            let mut rooms = state.rooms.lock().await;
            if let Ok(outcome) =
                rooms.leave(&code, old, LeaveKind::SocketDropped)
            {
                state.deliver(outcome.events);
            }
        }
        state.gateway.kick(old);
    }

    let record = {
        let mut sessions = state.lock(&state.sessions);
        sessions.register(&pid, &name, token.as_deref(), now)
    };

    // Identity: every registered device has a profile, guest by
    // default.
    let profile = match state
        .identity
        .ensure_guest_profile(pid.as_str(), &record.name)
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(%pid, error = %e, "guest profile bootstrap failed");
            state.gateway.emit(
                conn,
                ServerEvent::AuthError {
                    code: e.code(),
                    message: e.to_string(),
                },
            );
            return;
        }
    };
    let record = {
        let mut sessions = state.lock(&state.sessions);
        sessions
            .set_profile(&pid, Some(profile.payload()), now)
            .unwrap_or(record)
    };
    state
        .gateway
        .set_profile(conn, Some(profile.profile_id.clone()));

    state.gateway.emit(
        conn,
        ServerEvent::SessionToken {
            token: record.token.clone(),
            persistent_id: pid.clone(),
            name: record.name.clone(),
            expires_at: record.expires_at,
            profile: record.profile.clone(),
        },
    );
    tracing::info!(%conn, %pid, "player registered");

    // A result screen the device missed while away.
    let pending = state
        .lock(&state.results)
        .pending(&pid, now)
        .cloned();
    if let Some(results) = pending {
        state
            .gateway
            .emit(conn, ServerEvent::MatchResultsPending { results });
    }

    try_reconnect(state, conn, &pid, now).await;
}

/// Scans for an active match holding a disconnected record for this
/// device and rebinds it to the new connection.
pub(crate) async fn try_reconnect<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    pid: &PersistentId,
    now: u64,
) -> bool {
    let mut rooms = state.rooms.lock().await;
    let Some(code) = rooms.reconnectable_room(pid) else {
        return false;
    };

    match state.lock(&state.reconnects).check(pid, now) {
        Ok(()) => {}
        Err(SessionError::ReconnectLimited { retry_after_ms }) => {
            state.gateway.emit(
                conn,
                ServerEvent::ReconnectLimited { retry_after_ms },
            );
            return false;
        }
        Err(_) => return false,
    }

    let Some(room) = rooms.get_mut(&code) else { return false };
    let Some(info) = room.rebind(pid, conn) else { return false };

    let players = room.player_snapshots(now);
    let remaining_ms = room.remaining_ms(now);
    let lobby = room.lobby_snapshot();

    state.gateway.join_room(conn, code.clone(), Some(info.player_key));
    state.gateway.emit(
        conn,
        ServerEvent::ReconnectedToGame {
            room_code: code.clone(),
            map_key: info.map_key,
            player_key: info.player_key,
            started_at: info.started_at,
            remaining_ms,
            players: players.clone(),
        },
    );
    state.deliver(vec![
        Outbound::room(code.clone(), ServerEvent::UpdatePlayers { players }),
        Outbound::room(code.clone(), ServerEvent::LobbyUpdate { lobby }),
    ]);
    tracing::info!(%conn, %pid, room = %code, "reconnected into match");
    true
}

/// Handles `updateName`: re-issues the token and propagates the new
/// name to the profile and any current room.
pub(crate) async fn update_name<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    new_name: String,
    ack: Option<u64>,
    now: u64,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };

    let renamed = {
        let mut sessions = state.lock(&state.sessions);
        sessions.rename(&pid, &new_name, now)
    };
    let Some(record) = renamed else {
        state.gateway.emit_frame(
            conn,
            ServerFrame::ack(
                ServerEvent::Error {
                    code: ErrorCode::InvalidCredentials,
                    message: "invalid display name".into(),
                },
                ack,
            ),
        );
        return;
    };

    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::SessionToken {
                token: record.token.clone(),
                persistent_id: pid.clone(),
                name: record.name.clone(),
                expires_at: record.expires_at,
                profile: record.profile.clone(),
            },
            ack,
        ),
    );

    // Nickname follows the display name on the profile.
    let profile_id = state
        .gateway
        .meta(conn)
        .and_then(|meta| meta.profile_id);
    if let Some(profile_id) = profile_id {
        match state.identity.set_nickname(&profile_id, &record.name).await {
            Ok(snapshot) => {
                state.gateway.emit_device(
                    &pid,
                    ServerEvent::ProfileNicknameUpdated {
                        profile_id: snapshot.profile_id,
                        nickname: snapshot.nickname,
                    },
                );
            }
            Err(e) => {
                tracing::debug!(%pid, error = %e, "nickname update failed");
            }
        }
    }

    // The in-room record (and everyone's lobby view) follows too.
    let room_code = state
        .gateway
        .meta(conn)
        .and_then(|meta| meta.room_code);
    if let Some(code) = room_code {
        let mut rooms = state.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&code) {
            if let Some(player) = room.player_by_connection_mut(conn) {
                player.name = record.name.clone();
            }
            let lobby = room.lobby_snapshot();
            state.deliver(vec![Outbound::room(
                code.clone(),
                ServerEvent::LobbyUpdate { lobby },
            )]);
        }
    }
}
