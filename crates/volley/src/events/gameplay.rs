//! The hot path: `playerInput` and `fireProjectile`.
//!
//! Both events pass the block gate first (a soft block stops fire, a
//! hard block stops both), then the validators in `volley-room`. Every
//! rejection feeds the strike engine; escalations come back through
//! [`ServerState::strike_player`].

use serde_json::json;
use volley_guard::{GateDecision, GateKind, StrikeReason, StrikeRecord};
use volley_identity::IdentityStore;
use volley_protocol::{ConnectionId, InputFrame, ServerEvent};
use volley_room::{
    apply_fire, apply_player_input, FireVerdict, InputVerdict, Outbound,
};

use crate::ServerState;

pub(crate) async fn player_input<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    frame: InputFrame,
    now: u64,
) {
    let Some(code) = state.gateway.meta(conn).and_then(|m| m.room_code) else {
        return;
    };
    let mut rooms = state.rooms.lock().await;
    let Some(room) = rooms.get_mut(&code) else { return };
    let Some(key) = room.key_of_connection(conn) else { return };

    if gate_blocked(state, room, key, GateKind::Input, now) {
        return;
    }

    match apply_player_input(room, conn, frame, now) {
        InputVerdict::Applied { toggle_strike } => {
            if toggle_strike {
                state.strike_player(
                    room,
                    key,
                    StrikeReason::InputToggleSpam,
                    json!({ "seq": frame.seq }),
                    now,
                );
            }
        }
        InputVerdict::Rejected(reason) => {
            state.strike_player(
                room,
                key,
                reason,
                json!({ "seq": frame.seq, "angle": frame.angle }),
                now,
            );
        }
        InputVerdict::Ignored => {}
    }
}

pub(crate) async fn fire_projectile<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
    angle: f64,
    now: u64,
) {
    let Some(code) = state.gateway.meta(conn).and_then(|m| m.room_code) else {
        return;
    };
    let mut rooms = state.rooms.lock().await;
    let Some(room) = rooms.get_mut(&code) else { return };
    let Some(key) = room.key_of_connection(conn) else { return };

    if gate_blocked(state, room, key, GateKind::Fire, now) {
        return;
    }

    match apply_fire(room, conn, angle, now) {
        FireVerdict::Fired { projectile, warn } => {
            if let Some(reason) = warn {
                state.strike_player(
                    room,
                    key,
                    reason,
                    json!({ "angle": angle }),
                    now,
                );
            }
            state.deliver(vec![Outbound::room(
                code,
                ServerEvent::ProjectileFired { projectile },
            )]);
        }
        FireVerdict::Rejected(reason) => {
            state.strike_player(
                room,
                key,
                reason,
                json!({ "angle": angle }),
                now,
            );
        }
        FireVerdict::Ignored => {}
    }
}

/// Applies the enforcement gate.
///
/// A fire attempt against an active block still accumulates a strike,
/// so a client that keeps hammering reaches the hard block; blocked
/// inputs are dropped without accounting (striking 90 Hz input during a
/// hard block would make the window self-sustaining). Audit lines for
/// the block itself respect the per-block log cooldown.
fn gate_blocked<I: IdentityStore>(
    state: &ServerState<I>,
    room: &mut volley_room::Room,
    key: volley_protocol::PlayerKey,
    kind: GateKind,
    now: u64,
) -> bool {
    let decision = {
        let Some(player) = room.player_mut(key) else { return true };
        state.engine.gate(&mut player.strikes, kind, now)
    };
    match decision {
        GateDecision::Allowed => false,
        GateDecision::Blocked { action, until, should_log } => {
            if kind == GateKind::Fire {
                state.strike_player(
                    room,
                    key,
                    StrikeReason::FireWhileBlocked,
                    json!({ "action": action.as_str(), "until": until }),
                    now,
                );
            } else if should_log {
                let player = room.player(key).expect("gated above");
                let record = StrikeRecord {
                    ts: now,
                    reason: "blocked:playerInput".to_string(),
                    action: Some(action.as_str().to_string()),
                    room: Some(room.code.clone()),
                    connection: Some(player.connection),
                    player: Some(player.persistent_id.clone()),
                    name: Some(player.name.clone()),
                    details: json!({ "until": until }),
                };
                state.audit.record_strike(record);
            }
            true
        }
    }
}
