//! Validation of the two gameplay events: `playerInput` and
//! `fireProjectile`.
//!
//! Every check that fails returns the strike reason for the caller to
//! feed into the abuse engine; the one warning case (moderate fire-angle
//! divergence) lets the shot through while still striking.

use volley_guard::StrikeReason;
use volley_map::{
    map_def, normalize_angle, point_blocked, segment_blocked, MUZZLE_OFFSET,
};
use volley_protocol::{ConnectionId, InputFrame, ProjectileSnapshot, RoomStatus};

use crate::room::Projectile;
use crate::{
    Room, CHARGE_FAST_MS, CHARGE_GRACE_MS, CHARGE_REQUIRED_MS,
    FAST_CHARGE_STREAK, FIRE_ANGLE_REJECT_RAD, FIRE_ANGLE_WARN_RAD,
    FIRE_COOLDOWN_MS, INPUT_STALE_MS, MAX_OWNED_PROJECTILES,
    PROJECTILE_SPEED, SEQ_AHEAD_SLACK, SEQ_BACK_SLACK, SEQ_MAX,
};

/// Outcome of a `playerInput` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputVerdict {
    /// Input stored; `toggle_strike` flags a tripped spam meter (the
    /// input still applies).
    Applied { toggle_strike: bool },
    /// Input dropped, strike the sender.
    Rejected(StrikeReason),
    /// Not in a playing room; dropped without accounting.
    Ignored,
}

/// Outcome of a `fireProjectile` event.
#[derive(Debug, Clone, PartialEq)]
pub enum FireVerdict {
    /// Projectile spawned. `warn` carries a strike that doesn't stop
    /// the shot.
    Fired {
        projectile: ProjectileSnapshot,
        warn: Option<StrikeReason>,
    },
    /// Shot refused, strike the sender.
    Rejected(StrikeReason),
    /// Not in a playing room; dropped without accounting.
    Ignored,
}

/// Validates and stores one input frame.
pub fn apply_player_input(
    room: &mut Room,
    conn: ConnectionId,
    frame: InputFrame,
    now: u64,
) -> InputVerdict {
    if room.status != RoomStatus::Playing {
        return InputVerdict::Ignored;
    }
    let Some(player) = room.player_by_connection_mut(conn) else {
        return InputVerdict::Ignored;
    };

    if frame.seq > SEQ_MAX {
        return InputVerdict::Rejected(StrikeReason::InputSeqRangeViolation);
    }
    let low = player.input_seq.saturating_sub(SEQ_BACK_SLACK);
    let high = player.input_seq + SEQ_AHEAD_SLACK;
    if frame.seq < low || frame.seq > high {
        return InputVerdict::Rejected(StrikeReason::InputSeqWindowViolation);
    }
    if !frame.angle.is_finite() {
        return InputVerdict::Rejected(StrikeReason::InputAngleInvalid);
    }

    player.input_seq = player.input_seq.max(frame.seq);
    let toggle_strike = player.integrity.register(&frame, now);

    // Charge edges: a rising edge stamps the hold start, a falling edge
    // clears it.
    if frame.charging && !player.charging {
        player.charge_started_at = now;
    } else if !frame.charging && player.charging {
        player.charge_started_at = 0;
    }
    player.charging = frame.charging;

    let mut stored = frame;
    stored.angle = normalize_angle(frame.angle);
    player.input = stored;
    player.last_input_at = now;

    InputVerdict::Applied { toggle_strike }
}

/// Validates a shot and spawns the projectile.
pub fn apply_fire(
    room: &mut Room,
    conn: ConnectionId,
    angle: f64,
    now: u64,
) -> FireVerdict {
    if room.status != RoomStatus::Playing {
        return FireVerdict::Ignored;
    }
    let Some(map_key) = room.map_key else {
        return FireVerdict::Ignored;
    };
    let Some(player) = room.player_by_connection(conn) else {
        return FireVerdict::Ignored;
    };
    let key = player.key;
    if !player.alive() {
        return FireVerdict::Ignored;
    }

    if !angle.is_finite() {
        return FireVerdict::Rejected(StrikeReason::FireAngleInvalid);
    }
    if now.saturating_sub(player.last_input_at) > INPUT_STALE_MS
        || player.last_input_at == 0
    {
        return FireVerdict::Rejected(StrikeReason::FireStaleInput);
    }
    if now.saturating_sub(player.last_shot_at) < FIRE_COOLDOWN_MS
        && player.last_shot_at != 0
    {
        return FireVerdict::Rejected(StrikeReason::FireRateViolation);
    }

    let required = if player.killstreak >= FAST_CHARGE_STREAK {
        CHARGE_FAST_MS
    } else {
        CHARGE_REQUIRED_MS
    };
    let held = if player.charge_started_at > 0 {
        now.saturating_sub(player.charge_started_at)
    } else {
        0
    };
    if held < required - CHARGE_GRACE_MS {
        return FireVerdict::Rejected(StrikeReason::FireChargeViolation);
    }

    if room.owned_projectiles(key) >= MAX_OWNED_PROJECTILES {
        return FireVerdict::Rejected(StrikeReason::FireProjectileCap);
    }

    let fire_angle = normalize_angle(angle);
    let player = room.player(key).expect("resolved above");
    let divergence = angular_distance(fire_angle, player.input.angle);
    if divergence > FIRE_ANGLE_REJECT_RAD {
        return FireVerdict::Rejected(StrikeReason::FireAngleHardReject);
    }
    let warn =
        (divergence > FIRE_ANGLE_WARN_RAD).then_some(StrikeReason::FireAngleWarn);

    // The muzzle sits 25 px out along the firing direction. A muzzle
    // inside cover, or one the shooter can't actually reach from its
    // body centre, is a wallshot attempt.
    let map = map_def(map_key);
    let (dir_x, dir_y) = (fire_angle.cos(), fire_angle.sin());
    let origin_x = player.x + dir_x * MUZZLE_OFFSET;
    let origin_y = player.y + dir_y * MUZZLE_OFFSET;
    if point_blocked(origin_x, origin_y, map) {
        return FireVerdict::Rejected(StrikeReason::FireOriginViolation);
    }
    if segment_blocked(player.x, player.y, origin_x, origin_y, map) {
        return FireVerdict::Rejected(StrikeReason::FirePathOccluded);
    }

    let id = room.next_projectile_id();
    let projectile = Projectile {
        id,
        owner: key,
        x: origin_x,
        y: origin_y,
        vx: dir_x * PROJECTILE_SPEED,
        vy: dir_y * PROJECTILE_SPEED,
        angle: fire_angle,
        age: 0.0,
    };
    room.projectiles.push(projectile);

    let player = room.player_mut(key).expect("resolved above");
    player.last_shot_at = now;
    player.charge_started_at = 0;
    player.charging = false;
    // Firing breaks invisibility.
    player.invisible_until = 0;

    FireVerdict::Fired { projectile: projectile.snapshot(), warn }
}

/// Absolute angular distance in `[0, π]`.
fn angular_distance(a: f64, b: f64) -> f64 {
    normalize_angle(a - b).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_protocol::{MapKey, PersistentId, PlayerKey, RoomCode};

    fn playing_room() -> Room {
        let mut room = Room::new(RoomCode::parse("12345").unwrap());
        for i in 1..=2u64 {
            room.insert_player(
                ConnectionId(i),
                PersistentId::parse(&format!("device-{i}")).unwrap(),
                None,
                format!("p{i}"),
            );
        }
        room.begin_match(MapKey::Forest, 1_000, |_| false);
        room.promote_to_playing(4_000);
        // Park both players on open ground.
        let p1 = room.player_mut(PlayerKey(1)).unwrap();
        p1.x = 1_000.0;
        p1.y = 1_000.0;
        let p2 = room.player_mut(PlayerKey(2)).unwrap();
        p2.x = 2_000.0;
        p2.y = 1_000.0;
        room
    }

    fn frame(seq: u64) -> InputFrame {
        InputFrame { seq, ..Default::default() }
    }

    /// Runs the legitimate pre-fire sequence: an input frame, a charge
    /// rising edge, then the hold.
    fn charge(room: &mut Room, conn: ConnectionId, from: u64) {
        apply_player_input(room, conn, frame(1), from);
        apply_player_input(
            room,
            conn,
            InputFrame { charging: true, seq: 2, ..Default::default() },
            from,
        );
    }

    // =====================================================================
    // playerInput
    // =====================================================================

    #[test]
    fn test_input_advances_high_water_mark() {
        let mut room = playing_room();
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(5), 4_000),
            InputVerdict::Applied { toggle_strike: false }
        );
        assert_eq!(room.player(PlayerKey(1)).unwrap().input_seq, 5);
        // An in-window older frame is accepted but doesn't regress the
        // mark.
        apply_player_input(&mut room, ConnectionId(1), frame(4), 4_010);
        assert_eq!(room.player(PlayerKey(1)).unwrap().input_seq, 5);
    }

    #[test]
    fn test_input_rejects_seq_behind_window() {
        let mut room = playing_room();
        apply_player_input(&mut room, ConnectionId(1), frame(50), 4_000);
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(47), 4_010),
            InputVerdict::Rejected(StrikeReason::InputSeqWindowViolation)
        );
        // Two behind is still inside the slack.
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(48), 4_020),
            InputVerdict::Applied { toggle_strike: false }
        );
    }

    #[test]
    fn test_input_rejects_seq_far_ahead() {
        let mut room = playing_room();
        apply_player_input(&mut room, ConnectionId(1), frame(10), 4_000);
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(211), 4_010),
            InputVerdict::Rejected(StrikeReason::InputSeqWindowViolation)
        );
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(210), 4_020),
            InputVerdict::Applied { toggle_strike: false }
        );
    }

    #[test]
    fn test_input_rejects_absurd_seq() {
        let mut room = playing_room();
        assert_eq!(
            apply_player_input(
                &mut room,
                ConnectionId(1),
                frame(SEQ_MAX + 1),
                4_000
            ),
            InputVerdict::Rejected(StrikeReason::InputSeqRangeViolation)
        );
    }

    #[test]
    fn test_input_rejects_non_finite_angle() {
        let mut room = playing_room();
        let bad = InputFrame { angle: f64::NAN, seq: 1, ..Default::default() };
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), bad, 4_000),
            InputVerdict::Rejected(StrikeReason::InputAngleInvalid)
        );
        let inf =
            InputFrame { angle: f64::INFINITY, seq: 1, ..Default::default() };
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), inf, 4_000),
            InputVerdict::Rejected(StrikeReason::InputAngleInvalid)
        );
    }

    #[test]
    fn test_input_normalizes_stored_angle() {
        let mut room = playing_room();
        let wide = InputFrame {
            angle: 3.0 * std::f64::consts::PI,
            seq: 1,
            ..Default::default()
        };
        apply_player_input(&mut room, ConnectionId(1), wide, 4_000);
        let stored = room.player(PlayerKey(1)).unwrap().input.angle;
        assert!((stored - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_input_charge_edges() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        assert_eq!(
            room.player(PlayerKey(1)).unwrap().charge_started_at,
            4_000
        );
        // Falling edge clears the hold.
        apply_player_input(
            &mut room,
            ConnectionId(1),
            InputFrame { charging: false, seq: 3, ..Default::default() },
            4_500,
        );
        let p = room.player(PlayerKey(1)).unwrap();
        assert!(!p.charging);
        assert_eq!(p.charge_started_at, 0);
    }

    #[test]
    fn test_input_ignored_outside_playing() {
        let mut room = Room::new(RoomCode::parse("54321").unwrap());
        room.insert_player(
            ConnectionId(1),
            PersistentId::parse("device-1").unwrap(),
            None,
            "p1".into(),
        );
        assert_eq!(
            apply_player_input(&mut room, ConnectionId(1), frame(1), 4_000),
            InputVerdict::Ignored
        );
    }

    // =====================================================================
    // fireProjectile
    // =====================================================================

    #[test]
    fn test_fire_happy_path() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        let verdict = apply_fire(&mut room, ConnectionId(1), 0.0, 5_000);
        match verdict {
            FireVerdict::Fired { projectile, warn } => {
                assert!(warn.is_none());
                assert_eq!(projectile.owner, PlayerKey(1));
                // Muzzle sits 25 px out along angle 0.
                assert!((projectile.x - 1_025.0).abs() < 1e-9);
                assert!((projectile.y - 1_000.0).abs() < 1e-9);
                assert!((projectile.vx - PROJECTILE_SPEED).abs() < 1e-9);
            }
            other => panic!("expected fire, got {other:?}"),
        }
        let p = room.player(PlayerKey(1)).unwrap();
        assert_eq!(p.last_shot_at, 5_000);
        assert_eq!(p.charge_started_at, 0);
        assert!(!p.charging);
        assert_eq!(room.projectiles.len(), 1);
    }

    #[test]
    fn test_fire_charge_boundary_910_accepted_909_rejected() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        // 909 ms held: one short of required − grace.
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 4_909),
            FireVerdict::Rejected(StrikeReason::FireChargeViolation)
        );
        assert!(matches!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 4_910),
            FireVerdict::Fired { .. }
        ));
    }

    #[test]
    fn test_fire_cadence_140ms() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        assert!(matches!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_000),
            FireVerdict::Fired { .. }
        ));
        // Recharge immediately, fire 139 ms later: the cadence gate
        // sits ahead of the charge gate and rejects first.
        charge(&mut room, ConnectionId(1), 5_000);
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_139),
            FireVerdict::Rejected(StrikeReason::FireRateViolation)
        );
    }

    #[test]
    fn test_fire_without_recent_input_rejected() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        // Last input at 4 000; 4 001 ms later it's stale.
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 8_001),
            FireVerdict::Rejected(StrikeReason::FireStaleInput)
        );
    }

    #[test]
    fn test_fire_projectile_cap() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        for i in 0..MAX_OWNED_PROJECTILES as u64 {
            let id = room.next_projectile_id();
            room.projectiles.push(Projectile {
                id,
                owner: PlayerKey(1),
                x: 0.0,
                y: 0.0,
                vx: 0.0,
                vy: 0.0,
                angle: 0.0,
                age: i as f64 * 0.01,
            });
        }
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_000),
            FireVerdict::Rejected(StrikeReason::FireProjectileCap)
        );
    }

    #[test]
    fn test_fire_angle_warn_and_hard_reject() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        // Input angle is 0. A 2.0 rad divergence warns but fires.
        match apply_fire(&mut room, ConnectionId(1), 2.0, 5_000) {
            FireVerdict::Fired { warn, .. } => {
                assert_eq!(warn, Some(StrikeReason::FireAngleWarn));
            }
            other => panic!("expected warned fire, got {other:?}"),
        }
        // 2.8 rad divergence is rejected outright.
        charge(&mut room, ConnectionId(1), 5_200);
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 2.8, 6_200),
            FireVerdict::Rejected(StrikeReason::FireAngleHardReject)
        );
    }

    #[test]
    fn test_fire_non_finite_angle_rejected() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), f64::NAN, 5_000),
            FireVerdict::Rejected(StrikeReason::FireAngleInvalid)
        );
    }

    #[test]
    fn test_fire_muzzle_inside_obstacle_rejected() {
        let mut room = playing_room();
        // Stand just left of the forest tree at (450, 420) (diameter
        // 90): the muzzle lands inside the trunk's projectile radius.
        let p = room.player_mut(PlayerKey(1)).unwrap();
        p.x = 450.0 - 65.0;
        p.y = 420.0;
        charge(&mut room, ConnectionId(1), 4_000);
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_000),
            FireVerdict::Rejected(StrikeReason::FireOriginViolation)
        );
    }

    #[test]
    fn test_fire_cancels_invisibility() {
        let mut room = playing_room();
        room.player_mut(PlayerKey(1)).unwrap().invisible_until = 99_000;
        charge(&mut room, ConnectionId(1), 4_000);
        assert!(matches!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_000),
            FireVerdict::Fired { .. }
        ));
        assert_eq!(room.player(PlayerKey(1)).unwrap().invisible_until, 0);
    }

    #[test]
    fn test_dead_player_cannot_fire() {
        let mut room = playing_room();
        charge(&mut room, ConnectionId(1), 4_000);
        room.player_mut(PlayerKey(1)).unwrap().hp = 0;
        assert_eq!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 5_000),
            FireVerdict::Ignored
        );
    }

    #[test]
    fn test_fast_charge_at_streak_seven() {
        let mut room = playing_room();
        room.player_mut(PlayerKey(1)).unwrap().killstreak = 7;
        charge(&mut room, ConnectionId(1), 4_000);
        // 850 − 90 = 760 ms suffices at the fast-charge tier.
        assert!(matches!(
            apply_fire(&mut room, ConnectionId(1), 0.0, 4_760),
            FireVerdict::Fired { .. }
        ));
    }
}
