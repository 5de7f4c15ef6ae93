//! Scripted match flows across lobby operations, input validation, and
//! the simulation tick.

use std::f64::consts::PI;

use volley_guard::{
    GateDecision, GateKind, GuardAction, GuardConfig, GuardMode,
    StrikeEngine,
};
use volley_protocol::{
    ConnectionId, InputFrame, MapKey, PersistentId, PlayerKey, RoomCode,
    RoomStatus, ServerEvent,
};
use volley_room::{
    advance_room, apply_fire, apply_player_input, FireVerdict, LeaveKind,
    Outbound, RoomStore, TickOutput, MATCH_DURATION_MS,
};

const DT: f64 = 1.0 / 30.0;

fn pid(i: u64) -> PersistentId {
    PersistentId::parse(&format!("device-{i}")).unwrap()
}

/// Creates a room with `n` members, readies everyone, starts the match
/// at t = 1 000, and runs the countdown out so play begins at t = 4 000.
fn started_match(n: u64) -> (RoomStore, RoomCode) {
    let mut store = RoomStore::new();
    let outcome = store
        .create_room_for(ConnectionId(1), &pid(1), None, "p1".into())
        .unwrap();
    let code = outcome.room_code;
    for i in 2..=n {
        store
            .join_room(
                ConnectionId(i),
                &pid(i),
                None,
                format!("p{i}"),
                &code,
            )
            .unwrap();
        store.set_ready(&code, ConnectionId(i), false).unwrap();
    }
    store.start_game(&code, ConnectionId(1), 1_000, |_| false).unwrap();
    // Pin the map so the scripted shots cross known terrain.
    store
        .get_mut(&code)
        .unwrap()
        .begin_match(MapKey::Forest, 1_000, |_| false);
    let out = tick(&mut store, &code, 4_000);
    assert!(out.events.iter().any(|o| matches!(
        o.event,
        ServerEvent::GameStarted { .. }
    )));
    (store, code)
}

fn tick(store: &mut RoomStore, code: &RoomCode, now: u64) -> TickOutput {
    advance_room(store.get_mut(code).unwrap(), now, DT, 1_000)
}

fn place(store: &mut RoomStore, code: &RoomCode, key: PlayerKey, x: f64, y: f64) {
    let room = store.get_mut(code).unwrap();
    let p = room.player_mut(key).unwrap();
    p.x = x;
    p.y = y;
}

/// Sends the input + charge-edge sequence a legitimate client produces
/// before firing.
fn charge(
    store: &mut RoomStore,
    code: &RoomCode,
    conn: ConnectionId,
    angle: f64,
    seq: u64,
    at: u64,
) {
    let room = store.get_mut(code).unwrap();
    apply_player_input(
        room,
        conn,
        InputFrame { angle, seq, ..Default::default() },
        at,
    );
    apply_player_input(
        room,
        conn,
        InputFrame { angle, charging: true, seq: seq + 1, ..Default::default() },
        at,
    );
}

fn find_kill(out: &TickOutput) -> Option<&ServerEvent> {
    out.events
        .iter()
        .map(|o| &o.event)
        .find(|e| matches!(e, ServerEvent::PlayerKilled { .. }))
}

// =========================================================================
// Headshot kill (lobby → countdown → fire → kill → respawn → game end)
// =========================================================================

#[test]
fn test_full_match_headshot_kill_and_results() {
    let (mut store, code) = started_match(2);
    place(&mut store, &code, PlayerKey(1), 1_000.0, 1_000.0);
    place(&mut store, &code, PlayerKey(2), 1_500.0, 1_000.0);

    // Player 2 charges for a full second, then fires at player 1's
    // centre, 500 px away along angle π.
    charge(&mut store, &code, ConnectionId(2), PI, 1, 5_000);
    let verdict =
        apply_fire(store.get_mut(&code).unwrap(), ConnectionId(2), PI, 6_000);
    assert!(matches!(verdict, FireVerdict::Fired { .. }));

    // The swept projectile crosses the victim centre within ~17 ticks.
    let mut kill = None;
    let mut kill_time = 0;
    for i in 1..=40u64 {
        let now = 6_000 + i * 33;
        let out = tick(&mut store, &code, now);
        if let Some(ev) = find_kill(&out) {
            kill = Some(ev.clone());
            kill_time = now;
            break;
        }
    }
    let Some(ServerEvent::PlayerKilled { victim, killer, headshot, .. }) = kill
    else {
        panic!("expected a kill");
    };
    assert!(headshot, "a centred shot is a headshot");
    assert_eq!(victim.player_key, PlayerKey(1));
    assert_eq!(killer.player_key, PlayerKey(2));
    assert_eq!(killer.kills, 1);

    // HP went 3 → 0 in one hit; the victim respawns 3 s later at full
    // health.
    let room = store.get(&code).unwrap();
    assert_eq!(room.player(PlayerKey(1)).unwrap().hp, 0);
    let out = tick(&mut store, &code, kill_time + 3_000);
    assert!(out.events.iter().any(|o| matches!(
        o.event,
        ServerEvent::PlayerRespawn { player_key: PlayerKey(1), hp: 3, .. }
    )));

    // The match runs out at 110 s from the start of play.
    let out = tick(&mut store, &code, 4_000 + MATCH_DURATION_MS);
    let report = out.ended.expect("match ends on the boundary tick");
    let p2 = report
        .results
        .players
        .iter()
        .find(|p| p.player_key == PlayerKey(2))
        .unwrap();
    assert_eq!(p2.kills, 1);
    assert_eq!(store.get(&code).unwrap().status, RoomStatus::Lobby);
}

// =========================================================================
// Shield absorbs a headshot, the follow-up connects
// =========================================================================

#[test]
fn test_shield_absorbs_then_next_shot_damages() {
    let (mut store, code) = started_match(2);
    place(&mut store, &code, PlayerKey(1), 1_000.0, 1_000.0);
    place(&mut store, &code, PlayerKey(2), 1_400.0, 1_000.0);
    store
        .get_mut(&code)
        .unwrap()
        .player_mut(PlayerKey(2))
        .unwrap()
        .shield_until = 30_000;

    charge(&mut store, &code, ConnectionId(1), 0.0, 1, 5_000);
    assert!(matches!(
        apply_fire(store.get_mut(&code).unwrap(), ConnectionId(1), 0.0, 6_000),
        FireVerdict::Fired { .. }
    ));

    let mut broke = false;
    let mut break_time = 0;
    for i in 1..=40u64 {
        let now = 6_000 + i * 33;
        let out = tick(&mut store, &code, now);
        if out.events.iter().any(|o| matches!(
            o.event,
            ServerEvent::ShieldBreak { player_key: PlayerKey(2) }
        )) {
            assert!(
                find_kill(&out).is_none(),
                "the shielded hit must not damage"
            );
            broke = true;
            break_time = now;
            break;
        }
    }
    assert!(broke);
    {
        let room = store.get(&code).unwrap();
        let victim = room.player(PlayerKey(2)).unwrap();
        assert_eq!(victim.hp, 3);
        assert_eq!(victim.shield_until, 0, "one hit consumes the shield");
    }

    // A second identical shot now lands for real.
    charge(&mut store, &code, ConnectionId(1), 0.0, 10, break_time + 100);
    assert!(matches!(
        apply_fire(
            store.get_mut(&code).unwrap(),
            ConnectionId(1),
            0.0,
            break_time + 1_100,
        ),
        FireVerdict::Fired { .. }
    ));
    let mut killed = false;
    for i in 1..=40u64 {
        let out = tick(&mut store, &code, break_time + 1_100 + i * 33);
        if find_kill(&out).is_some() {
            killed = true;
            break;
        }
    }
    assert!(killed, "unshielded centred shot is lethal");
}

// =========================================================================
// Reconnect mid-match
// =========================================================================

#[test]
fn test_reconnect_mid_match_preserves_state_and_match_ends() {
    let (mut store, code) = started_match(2);
    {
        let room = store.get_mut(&code).unwrap();
        room.player_mut(PlayerKey(2)).unwrap().kills = 3;
        apply_player_input(
            room,
            ConnectionId(2),
            InputFrame { seq: 50, ..Default::default() },
            5_000,
        );
    }

    // Socket drops at t = 60 s into the match.
    let outcome = store
        .leave(&code, ConnectionId(2), LeaveKind::SocketDropped)
        .unwrap();
    assert!(outcome.preserved);
    assert_eq!(store.get(&code).unwrap().leader, PlayerKey(1));

    // Ticks keep flowing while the player is away.
    tick(&mut store, &code, 64_000);

    // Reconnect at t = 75 s with a fresh connection.
    assert_eq!(store.reconnectable_room(&pid(2)), Some(code.clone()));
    let info = store
        .get_mut(&code)
        .unwrap()
        .rebind(&pid(2), ConnectionId(99))
        .unwrap();
    assert_eq!(info.player_key, PlayerKey(2));

    let room = store.get(&code).unwrap();
    let player = room.player(PlayerKey(2)).unwrap();
    assert!(!player.disconnected);
    assert_eq!(player.kills, 3, "in-world stats survive the reconnect");
    assert_eq!(player.input_seq, 0, "sequence window restarts at zero");

    // Inputs from the fresh connection with low sequence numbers are
    // accepted, not struck.
    let room = store.get_mut(&code).unwrap();
    let verdict = apply_player_input(
        room,
        ConnectionId(99),
        InputFrame { seq: 1, ..Default::default() },
        76_000,
    );
    assert!(matches!(
        verdict,
        volley_room::InputVerdict::Applied { toggle_strike: false }
    ));

    // The match still ends on schedule with both players in the
    // results.
    let out = tick(&mut store, &code, 4_000 + MATCH_DURATION_MS);
    let report = out.ended.unwrap();
    assert_eq!(report.results.players.len(), 2);
    assert!(report.removed_players.is_empty());
}

// =========================================================================
// Instant respawn charges
// =========================================================================

#[test]
fn test_instant_respawn_consumed_per_death() {
    let mut store = RoomStore::new();
    let outcome = store
        .create_room_for(ConnectionId(1), &pid(1), None, "p1".into())
        .unwrap();
    let code = outcome.room_code;
    store
        .join_room(ConnectionId(2), &pid(2), None, "p2".into(), &code)
        .unwrap();
    store.set_ready(&code, ConnectionId(2), false).unwrap();
    // Player 2 watched the rewarded ad between matches.
    let lucky = pid(2);
    store
        .start_game(&code, ConnectionId(1), 1_000, |p| *p == lucky)
        .unwrap();
    store
        .get_mut(&code)
        .unwrap()
        .begin_match(MapKey::Forest, 1_000, |p| *p == lucky);
    tick(&mut store, &code, 4_000);

    let mut remaining_seen = Vec::new();
    let mut shot_at = 5_000;
    for round in 0..2u64 {
        place(&mut store, &code, PlayerKey(1), 1_000.0, 1_000.0);
        place(&mut store, &code, PlayerKey(2), 1_300.0, 1_000.0);
        store
            .get_mut(&code)
            .unwrap()
            .player_mut(PlayerKey(2))
            .unwrap()
            .hp = 1;

        charge(&mut store, &code, ConnectionId(1), 0.0, 1 + round * 2, shot_at);
        assert!(matches!(
            apply_fire(
                store.get_mut(&code).unwrap(),
                ConnectionId(1),
                0.0,
                shot_at + 1_000,
            ),
            FireVerdict::Fired { .. }
        ));
        for i in 1..=40u64 {
            let out = tick(&mut store, &code, shot_at + 1_000 + i * 33);
            let used = out.events.iter().find_map(|o| match o.event {
                ServerEvent::InstantRespawnUsed { remaining, .. } => {
                    Some(remaining)
                }
                _ => None,
            });
            if let Some(remaining) = used {
                remaining_seen.push(remaining);
                // The victim is already back at full health, no 3 s
                // wait.
                let room = store.get(&code).unwrap();
                assert_eq!(room.player(PlayerKey(2)).unwrap().hp, 3);
                assert_eq!(room.player(PlayerKey(2)).unwrap().died_at, 0);
                break;
            }
        }
        shot_at += 5_000;
    }
    assert_eq!(remaining_seen, vec![2, 1]);

    // The charges were touched, so the flag stays consumed at match
    // end.
    let out = tick(&mut store, &code, 4_000 + MATCH_DURATION_MS);
    let report = out.ended.unwrap();
    let reward = report
        .rewards
        .iter()
        .find(|r| r.persistent_id == pid(2))
        .unwrap();
    assert!(reward.granted && reward.consumed_any);
}

// =========================================================================
// Fire-rate abuse escalates through the strike engine
// =========================================================================

#[test]
fn test_rapid_fire_strikes_escalate_and_gate() {
    let (mut store, code) = started_match(2);
    place(&mut store, &code, PlayerKey(1), 1_000.0, 1_000.0);
    charge(&mut store, &code, ConnectionId(1), 0.0, 1, 5_000);

    let engine = StrikeEngine::new(GuardConfig {
        mode: GuardMode::Enforce,
        ..GuardConfig::default()
    });

    // First shot lands; 19 more at 50 ms spacing all violate and feed
    // the engine.
    assert!(matches!(
        apply_fire(store.get_mut(&code).unwrap(), ConnectionId(1), 0.0, 6_000),
        FireVerdict::Fired { .. }
    ));

    let mut escalations = Vec::new();
    for i in 1..=19u64 {
        let now = 6_000 + i * 50;
        let room = store.get_mut(&code).unwrap();
        // Keep the charge edges coming like a macro would.
        apply_player_input(
            room,
            ConnectionId(1),
            InputFrame { seq: 100 + i * 2, ..Default::default() },
            now,
        );
        apply_player_input(
            room,
            ConnectionId(1),
            InputFrame {
                charging: true,
                seq: 101 + i * 2,
                ..Default::default()
            },
            now,
        );
        match apply_fire(room, ConnectionId(1), 0.0, now) {
            FireVerdict::Rejected(_) => {
                let player = room.player_mut(PlayerKey(1)).unwrap();
                if let Some(escalation) = engine.record(&mut player.strikes, now)
                {
                    escalations.push(escalation.action);
                }
            }
            FireVerdict::Fired { .. } => {
                panic!("macro-paced shots must be rejected")
            }
            FireVerdict::Ignored => panic!("player should be live"),
        }
    }

    assert_eq!(
        escalations,
        vec![
            GuardAction::Warn,
            GuardAction::SoftBlock,
            GuardAction::HardBlock
        ]
    );

    // In enforce mode both gates now reject until the hard block
    // expires.
    let room = store.get_mut(&code).unwrap();
    let player = room.player_mut(PlayerKey(1)).unwrap();
    assert!(matches!(
        engine.gate(&mut player.strikes, GateKind::Fire, 7_000),
        GateDecision::Blocked { action: GuardAction::HardBlock, .. }
    ));
    assert!(matches!(
        engine.gate(&mut player.strikes, GateKind::Input, 7_000),
        GateDecision::Blocked { action: GuardAction::HardBlock, .. }
    ));
}

// =========================================================================
// Boundary: the 110 s cut is exact
// =========================================================================

#[test]
fn test_match_end_boundary_exact() {
    let (mut store, code) = started_match(2);
    place(&mut store, &code, PlayerKey(1), 100.0, 100.0);
    place(&mut store, &code, PlayerKey(2), 200.0, 100.0);
    assert!(tick(&mut store, &code, 4_000 + MATCH_DURATION_MS - 1)
        .ended
        .is_none());
    assert!(tick(&mut store, &code, 4_000 + MATCH_DURATION_MS)
        .ended
        .is_some());
}

// =========================================================================
// Outbound addressing sanity
// =========================================================================

#[test]
fn test_tick_events_are_room_scoped() {
    let (mut store, code) = started_match(2);
    let out = tick(&mut store, &code, 4_033);
    assert!(!out.events.is_empty());
    for Outbound { to, .. } in &out.events {
        assert!(matches!(to, volley_room::Recipient::Room(c) if *c == code));
    }
}
