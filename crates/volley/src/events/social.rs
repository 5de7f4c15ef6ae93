//! Friends and party-invite handlers.
//!
//! Friends data lives in the identity store; this module maps its
//! results onto the wire, overlays live presence, and pushes updates to
//! the other side of each interaction. Party invites are core state
//! (they reference rooms) and live in [`crate::PartyInvites`].

use volley_identity::{IdentityError, IdentityStore};
use volley_protocol::{
    ConnectionId, ErrorCode, FriendEntry, InviteStatus, ProfileId,
    RoomStatus, ServerEvent, ServerFrame,
};

use crate::ServerState;

/// Emits to every live connection of a profile.
pub(crate) fn emit_to_profile<I: IdentityStore>(
    state: &ServerState<I>,
    profile: &ProfileId,
    event: ServerEvent,
) {
    state.gateway.emit_profile(profile, event);
}

/// The caller's profile id, or a `friends:error` on the ack channel.
fn require_profile<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
) -> Option<ProfileId> {
    let profile = state.gateway.meta(conn).and_then(|m| m.profile_id);
    if profile.is_none() {
        state.gateway.emit_frame(
            conn,
            ServerFrame::ack(
                ServerEvent::FriendsError {
                    code: ErrorCode::AuthContextRequired,
                    message: "no profile bound to this connection".into(),
                },
                ack,
            ),
        );
    }
    profile
}

fn friends_error<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
    err: IdentityError,
) {
    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::FriendsError {
                code: err.code(),
                message: err.to_string(),
            },
            ack,
        ),
    );
}

fn party_error<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
    code: ErrorCode,
    message: &str,
) {
    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::PartyInviteError { code, message: message.into() },
            ack,
        ),
    );
}

// ---------------------------------------------------------------------------
// Friends
// ---------------------------------------------------------------------------

pub(crate) async fn friends_get_list<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
) {
    let Some(profile) = require_profile(state, conn, ack) else { return };
    match state.identity.get_friends_state(&profile).await {
        Ok(mut friends) => {
            state.overlay_presence(&mut friends.friends);
            state.gateway.emit_frame(
                conn,
                ServerFrame::ack(
                    ServerEvent::FriendsListUpdated { state: friends },
                    ack,
                ),
            );
        }
        Err(e) => friends_error(state, conn, ack, e),
    }
}

pub(crate) async fn friends_search<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    query: String,
    limit: Option<usize>,
    ack: Option<u64>,
) {
    let Some(profile) = require_profile(state, conn, ack) else { return };
    match state
        .identity
        .search_friend_profiles(&profile, &query, limit.unwrap_or(10))
        .await
    {
        Ok(mut results) => {
            state.overlay_presence(&mut results);
            state.gateway.emit_frame(
                conn,
                ServerFrame::ack(
                    ServerEvent::FriendsSearchResult { results },
                    ack,
                ),
            );
        }
        Err(e) => friends_error(state, conn, ack, e),
    }
}

pub(crate) async fn friends_send_request<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    target: ProfileId,
    ack: Option<u64>,
    now: u64,
) {
    let Some(profile) = require_profile(state, conn, ack) else { return };
    match state.identity.send_friend_request(&profile, &target, now).await {
        Ok(request) => {
            state.gateway.emit_frame(
                conn,
                ServerFrame::ack(
                    ServerEvent::FriendsRequestSent {
                        request: request.clone(),
                    },
                    ack,
                ),
            );
            emit_to_profile(
                state,
                &target,
                ServerEvent::FriendsIncomingRequest { request },
            );
        }
        Err(e) => friends_error(state, conn, ack, e),
    }
}

pub(crate) async fn friends_respond_request<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    request_id: String,
    accept: bool,
    ack: Option<u64>,
) {
    let Some(profile) = require_profile(state, conn, ack) else { return };
    let request = match state
        .identity
        .respond_friend_request(&profile, &request_id, accept)
        .await
    {
        Ok(request) => request,
        Err(e) => {
            friends_error(state, conn, ack, e);
            return;
        }
    };

    // The responder's ack carries the new friend row when accepted.
    let friend = if accept {
        state
            .identity
            .get_profile_snapshot_by_id(&request.from_profile_id)
            .await
            .ok()
            .flatten()
            .map(|snap| FriendEntry {
                online: state.gateway.profile_online(&snap.profile_id),
                profile_id: snap.profile_id,
                nickname: snap.nickname,
                friend_code: snap.friend_code,
            })
    } else {
        None
    };
    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::FriendsRequestResponded {
                request_id: request_id.clone(),
                accepted: accept,
                friend,
            },
            ack,
        ),
    );

    // Tell the requester, and refresh both sides' lists.
    emit_to_profile(
        state,
        &request.from_profile_id,
        ServerEvent::FriendsRequestResponded {
            request_id,
            accepted: accept,
            friend: None,
        },
    );
    for side in [&request.from_profile_id, &request.to_profile_id] {
        if let Ok(mut friends) = state.identity.get_friends_state(side).await
        {
            state.overlay_presence(&mut friends.friends);
            emit_to_profile(
                state,
                side,
                ServerEvent::FriendsListUpdated { state: friends },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Party invites
// ---------------------------------------------------------------------------

/// The caller's profile id, or a `party:inviteError` on the ack
/// channel.
fn require_party_profile<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
) -> Option<ProfileId> {
    let profile = state.gateway.meta(conn).and_then(|m| m.profile_id);
    if profile.is_none() {
        party_error(
            state,
            conn,
            ack,
            ErrorCode::AuthContextRequired,
            "no profile bound to this connection",
        );
    }
    profile
}

pub(crate) async fn party_invite_friend<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    target: ProfileId,
    ack: Option<u64>,
    now: u64,
) {
    let Some(profile) = require_party_profile(state, conn, ack) else {
        return;
    };

    // Only the leader of a lobby room can invite.
    let Some(code) = state.gateway.meta(conn).and_then(|m| m.room_code) else {
        party_error(
            state,
            conn,
            ack,
            ErrorCode::PartyInviteNotAllowed,
            "create or join a room first",
        );
        return;
    };
    {
        let rooms = state.rooms.lock().await;
        let allowed = rooms.get(&code).is_some_and(|room| {
            room.status == RoomStatus::Lobby
                && room.key_of_connection(conn) == Some(room.leader)
        });
        if !allowed {
            party_error(
                state,
                conn,
                ack,
                ErrorCode::PartyInviteNotAllowed,
                "only the lobby leader can invite",
            );
            return;
        }
    }

    match state.identity.are_friends(&profile, &target).await {
        Ok(true) => {}
        _ => {
            party_error(
                state,
                conn,
                ack,
                ErrorCode::PartyInviteNotAllowed,
                "you can only invite friends",
            );
            return;
        }
    }

    let target_conns = state.gateway.profile_connections(&target);
    if target_conns.is_empty() {
        party_error(
            state,
            conn,
            ack,
            ErrorCode::TargetNotOnline,
            "friend is offline",
        );
        return;
    }

    // A target already in this room, or locked in a running match,
    // can't be pulled in.
    {
        let rooms = state.rooms.lock().await;
        for target_conn in &target_conns {
            let Some(meta) = state.gateway.meta(*target_conn) else {
                continue;
            };
            if meta.room_code.as_ref() == Some(&code) {
                party_error(
                    state,
                    conn,
                    ack,
                    ErrorCode::TargetAlreadyInParty,
                    "already in this room",
                );
                return;
            }
            if let Some(pid) = meta.persistent_id {
                if rooms.active_match_of(&pid).is_some() {
                    party_error(
                        state,
                        conn,
                        ack,
                        ErrorCode::TargetAlreadyInParty,
                        "friend is in a match",
                    );
                    return;
                }
            }
        }
    }

    let from_nickname = state
        .identity
        .get_profile_snapshot_by_id(&profile)
        .await
        .ok()
        .flatten()
        .map(|snap| snap.nickname)
        .unwrap_or_else(|| "Player".to_string());

    let invite = state.lock(&state.party).create(
        profile,
        from_nickname,
        target.clone(),
        code,
        now,
    );

    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::PartyInviteSent { invite: invite.payload() },
            ack,
        ),
    );
    emit_to_profile(
        state,
        &target,
        ServerEvent::PartyInviteReceived { invite: invite.payload() },
    );
    tracing::info!(
        invite = %invite.invite_id,
        room = %invite.room_code,
        "party invite sent"
    );
}

pub(crate) async fn party_invite_respond<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    invite_id: String,
    accept: bool,
    ack: Option<u64>,
    now: u64,
) {
    let Some(profile) = require_party_profile(state, conn, ack) else {
        return;
    };
    let Some(pid) = super::require_auth(state, conn) else { return };

    let invite = {
        let mut party = state.lock(&state.party);
        match party.get_valid(&invite_id, now) {
            Some(invite) if invite.to_profile_id == profile => {
                party.remove(&invite_id)
            }
            _ => None,
        }
    };
    let Some(invite) = invite else {
        party_error(
            state,
            conn,
            ack,
            ErrorCode::PartyInviteExpired,
            "invite is gone",
        );
        return;
    };

    if !accept {
        let responded = ServerEvent::PartyInviteResponded {
            invite_id: invite.invite_id.clone(),
            status: InviteStatus::Declined,
        };
        state
            .gateway
            .emit_frame(conn, ServerFrame::ack(responded.clone(), ack));
        emit_to_profile(state, &invite.from_profile_id, responded);
        return;
    }

    // Accepting joins the invitee as a non-ready member; the store
    // moves it out of any other lobby on the way in.
    let name = state
        .lock(&state.sessions)
        .get(&pid)
        .map(|record| record.name.clone())
        .unwrap_or_else(|| "Player".to_string());

    let mut rooms = state.rooms.lock().await;
    let join = rooms.join_room(
        conn,
        &pid,
        Some(profile),
        name,
        &invite.room_code,
    );
    drop(rooms);
    match join {
        Ok(outcome) => {
            state.gateway.join_room(
                conn,
                outcome.room_code.clone(),
                Some(outcome.player_key),
            );
            state.deliver(outcome.events);

            let lobby = {
                let rooms = state.rooms.lock().await;
                rooms.get(&invite.room_code).map(|r| r.lobby_snapshot())
            };
            if let Some(lobby) = lobby {
                state.gateway.emit_frame(
                    conn,
                    ServerFrame::ack(
                        ServerEvent::PartyLobbyState { lobby },
                        ack,
                    ),
                );
            }
            emit_to_profile(
                state,
                &invite.from_profile_id,
                ServerEvent::PartyInviteResponded {
                    invite_id: invite.invite_id.clone(),
                    status: InviteStatus::Accepted,
                },
            );
        }
        Err(e) => {
            party_error(state, conn, ack, e.code(), &e.to_string());
            emit_to_profile(
                state,
                &invite.from_profile_id,
                ServerEvent::PartyInviteResponded {
                    invite_id: invite.invite_id.clone(),
                    status: InviteStatus::Expired,
                },
            );
        }
    }
}
