//! Per-connection handling: the read loop, frame decoding, rate
//! limiting, and event dispatch.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use volley_guard::{HandshakeScope, StrikeReason};
use volley_identity::IdentityStore;
use volley_protocol::{
    decode_client_frame, ClientEvent, Codec, ConnectionId, ErrorCode,
    EventTag, FrameError, JsonCodec, ServerEvent,
};
use volley_room::LeaveKind;
use volley_transport::Connection;

use crate::events;
use crate::{now_ms, ServerState};

/// Connections with no inbound frame for this long are closed. The
/// client answers the 5-second heartbeat, so a healthy link never gets
/// near it.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles one connection from accept to close.
pub(crate) async fn handle_connection<C, I>(conn: C, state: Arc<ServerState<I>>)
where
    C: Connection,
    I: IdentityStore,
{
    let conn_id = conn.id();
    let ip = conn.peer_addr().map(|addr| addr.ip());

    // Connect-scope bucket: one address opening sockets in a tight loop
    // is refused before any per-connection state exists.
    if let Some(ip) = ip {
        let admitted = state
            .lock(&state.handshakes)
            .admit_ip(ip, HandshakeScope::Connect, now_ms());
        if !admitted {
            tracing::debug!(%conn_id, %ip, "connection rate limited");
            let _ = conn.close().await;
            return;
        }
    }

    let mut outbound = state.gateway.register(conn_id);
    let conn = Arc::new(conn);

    // Writer: drains the gateway channel onto the socket. Ends when the
    // gateway drops the sender (kick/unregister) or the socket dies,
    // closing the socket either way, which also unblocks the reader.
    let writer = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let codec = JsonCodec;
            while let Some(frame) = outbound.recv().await {
                let bytes = match codec.encode(&frame) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping outbound frame");
                        continue;
                    }
                };
                if conn.send(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = conn.close().await;
        })
    };

    tracing::debug!(%conn_id, "connection open");

    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => {
                dispatch_frame(&state, conn_id, ip, &data, now_ms()).await;
            }
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
        }
        // A superseding registration may have kicked this connection
        // mid-loop.
        if state.gateway.meta(conn_id).is_none() {
            break;
        }
    }

    cleanup(&state, conn_id).await;
    drop(writer);
}

/// Post-disconnect bookkeeping: room departure, gateway and limiter
/// cleanup.
async fn cleanup<I: IdentityStore>(state: &ServerState<I>, conn_id: ConnectionId) {
    let room_code = state
        .gateway
        .meta(conn_id)
        .and_then(|meta| meta.room_code);
    if let Some(code) = room_code {
        let mut rooms = state.rooms.lock().await;
        if let Ok(outcome) = rooms.leave(&code, conn_id, LeaveKind::SocketDropped)
        {
            let deleted = outcome.room_deleted;
            state.deliver(outcome.events);
            drop(rooms);
            if deleted {
                events::lobby::cancel_party_invites(state, &code, now_ms());
            }
        }
    }
    state.gateway.unregister(conn_id);
    state.lock(&state.limiter).forget_connection(conn_id);
    tracing::info!(%conn_id, "connection closed");
}

/// Decodes and routes one inbound frame.
pub(crate) async fn dispatch_frame<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ip: Option<IpAddr>,
    data: &[u8],
    now: u64,
) {
    let frame = match decode_client_frame(data) {
        Ok(frame) => frame,
        Err(FrameError::Malformed) => {
            tracing::trace!(%conn, "dropping malformed frame");
            return;
        }
        Err(FrameError::UnknownEvent(name)) => {
            tracing::debug!(%conn, event = %name, "dropping unknown event");
            return;
        }
        Err(FrameError::BadPayload { event, source }) => {
            tracing::debug!(%conn, event = %event, error = %source, "bad payload");
            if let Some(tag) = EventTag::from_wire_name(&event) {
                strike_connection(
                    state,
                    conn,
                    StrikeReason::MalformedPayload(tag),
                    now,
                )
                .await;
            }
            return;
        }
    };

    let tag = EventTag::of(&frame.event);

    if !state.lock(&state.limiter).admit(conn, tag, now) {
        strike_connection(state, conn, StrikeReason::RateLimit(tag), now)
            .await;
        // Gameplay floods are dropped quietly; telling a 90 Hz input
        // spammer about every rejection would flood right back.
        if !matches!(tag, EventTag::PlayerInput | EventTag::FireProjectile) {
            state.gateway.emit(
                conn,
                ServerEvent::Error {
                    code: ErrorCode::RateLimited,
                    message: format!("{tag} rate limited"),
                },
            );
        }
        return;
    }

    if tag.requires_auth()
        && state
            .gateway
            .meta(conn)
            .and_then(|meta| meta.persistent_id)
            .is_none()
    {
        state.gateway.emit(
            conn,
            ServerEvent::AuthError {
                code: ErrorCode::AuthRequired,
                message: "register first".into(),
            },
        );
        return;
    }

    let ack = frame.ack;
    match frame.event {
        ClientEvent::RegisterPlayer { id, name, token } => {
            events::register::register_player(
                state, conn, ip, id, name, token, now,
            )
            .await;
        }
        ClientEvent::UpdateName { new_name } => {
            events::register::update_name(state, conn, new_name, ack, now)
                .await;
        }

        ClientEvent::Pong => {
            // Heartbeat answer; receiving it already reset the idle
            // timer.
        }
        ClientEvent::ClientPing { t } => {
            state.gateway.emit(
                conn,
                ServerEvent::ClientPong { t, server_time: now },
            );
        }

        ClientEvent::CreateRoom { player_name } => {
            events::lobby::create_room(state, conn, ip, player_name, now)
                .await;
        }
        ClientEvent::JoinRoom { room_code, player_name } => {
            events::lobby::join_room(
                state, conn, ip, room_code, player_name, now,
            )
            .await;
        }
        ClientEvent::PlayerReady => {
            events::lobby::set_ready(state, conn, false).await;
        }
        ClientEvent::ToggleReady => {
            events::lobby::set_ready(state, conn, true).await;
        }
        ClientEvent::StartGame => {
            events::lobby::start_game(state, conn, now).await;
        }
        ClientEvent::LeaveRoom => {
            events::lobby::leave_room(state, conn, now).await;
        }
        ClientEvent::KickPlayer { player_key } => {
            events::lobby::kick_player(state, conn, player_key).await;
        }
        ClientEvent::RequestLobbyState { room_code }
        | ClientEvent::ReturnToLobby { room_code } => {
            events::lobby::lobby_state(state, conn, room_code).await;
        }
        ClientEvent::AckMatchResults => {
            events::lobby::ack_match_results(state, conn).await;
        }

        ClientEvent::PlayerInput(input) => {
            events::gameplay::player_input(state, conn, input, now).await;
        }
        ClientEvent::FireProjectile { angle } => {
            events::gameplay::fire_projectile(state, conn, angle, now).await;
        }

        ClientEvent::FriendsGetList => {
            events::social::friends_get_list(state, conn, ack).await;
        }
        ClientEvent::FriendsSearch { query, limit } => {
            events::social::friends_search(state, conn, query, limit, ack)
                .await;
        }
        ClientEvent::FriendsSendRequest { target_profile_id } => {
            events::social::friends_send_request(
                state,
                conn,
                target_profile_id,
                ack,
                now,
            )
            .await;
        }
        ClientEvent::FriendsRespondRequest { request_id, accept } => {
            events::social::friends_respond_request(
                state, conn, request_id, accept, ack,
            )
            .await;
        }
        ClientEvent::PartyInviteFriend { target_profile_id } => {
            events::social::party_invite_friend(
                state,
                conn,
                target_profile_id,
                ack,
                now,
            )
            .await;
        }
        ClientEvent::PartyInviteRespond { invite_id, accept } => {
            events::social::party_invite_respond(
                state, conn, invite_id, accept, ack, now,
            )
            .await;
        }

        ClientEvent::AdsGetState => {
            events::ads::get_state(state, conn, ack).await;
        }
        ClientEvent::AdsRewardedCompleted { kind } => {
            events::ads::rewarded_completed(state, conn, kind, ack, now)
                .await;
        }
    }
}

impl<I: IdentityStore> ServerState<I> {
    /// Decodes and dispatches one raw inbound frame, exactly as the
    /// connection read loop does. Lets embedders (and tests) drive the
    /// server from a custom transport.
    pub async fn handle_frame(
        &self,
        conn: ConnectionId,
        ip: Option<IpAddr>,
        data: &[u8],
    ) {
        dispatch_frame(self, conn, ip, data, now_ms()).await;
    }

    /// [`Self::handle_frame`] with an explicit clock, for deterministic
    /// tests.
    pub async fn handle_frame_at(
        &self,
        conn: ConnectionId,
        ip: Option<IpAddr>,
        data: &[u8],
        now: u64,
    ) {
        dispatch_frame(self, conn, ip, data, now).await;
    }
}

/// Strikes the in-room player behind a connection, or just audits when
/// the connection isn't in a room yet.
async fn strike_connection<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    reason: StrikeReason,
    now: u64,
) {
    let room_code = state
        .gateway
        .meta(conn)
        .and_then(|meta| meta.room_code);
    if let Some(code) = room_code {
        let mut rooms = state.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&code) {
            if let Some(key) = room.key_of_connection(conn) {
                state.strike_player(
                    room,
                    key,
                    reason,
                    serde_json::Value::Null,
                    now,
                );
                return;
            }
        }
    }
    state.log_unscoped(conn, reason, now);
}
