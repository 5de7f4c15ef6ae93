//! Rewarded-ad handlers: the instant-respawn flag.

use volley_identity::IdentityStore;
use volley_protocol::{ConnectionId, ErrorCode, ServerEvent, ServerFrame};
use volley_protocol::RoomStatus;

use crate::ServerState;

/// The one reward type the server recognizes.
const REWARD_INSTANT_RESPAWN: &str = "instantRespawn";

pub(crate) async fn get_state<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };
    let ads = state.lock(&state.rewards).state(&pid);
    state
        .gateway
        .emit_frame(conn, ServerFrame::ack(ServerEvent::AdsState(ads), ack));
}

/// `ads:rewardedCompleted`: accepted only between matches, and only
/// while the caller isn't sitting ready in a lobby.
pub(crate) async fn rewarded_completed<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    kind: String,
    ack: Option<u64>,
    now: u64,
) {
    let Some(pid) = super::require_auth(state, conn) else { return };

    if kind != REWARD_INSTANT_RESPAWN {
        reject(state, conn, ack, ErrorCode::InvalidRewardType, "unknown reward");
        return;
    }

    {
        let rooms = state.rooms.lock().await;
        if rooms.active_match_of(&pid).is_some() {
            reject(state, conn, ack, ErrorCode::InMatch, "match in progress");
            return;
        }
        let ready_in_lobby = rooms
            .room_of(&pid)
            .and_then(|code| rooms.get(code))
            .filter(|room| room.status == RoomStatus::Lobby)
            .and_then(|room| {
                room.key_of_persistent(&pid)
                    .and_then(|key| room.player(key))
                    .map(|p| p.ready)
            })
            .unwrap_or(false);
        if ready_in_lobby {
            reject(
                state,
                conn,
                ack,
                ErrorCode::NotAllowedWhileReady,
                "unready first",
            );
            return;
        }
    }

    let ads = state.lock(&state.rewards).set_pending(&pid, now);
    // Every live connection of the device hears the change; the caller
    // additionally gets it as the ack reply.
    state.gateway.emit_device(&pid, ServerEvent::AdsState(ads));
    state
        .gateway
        .emit_frame(conn, ServerFrame::ack(ServerEvent::AdsState(ads), ack));
}

fn reject<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    ack: Option<u64>,
    code: ErrorCode,
    message: &str,
) {
    state.gateway.emit_frame(
        conn,
        ServerFrame::ack(
            ServerEvent::Error { code, message: message.into() },
            ack,
        ),
    );
}
