//! The in-room player record.

use volley_protocol::{
    ConnectionId, InputFrame, PersistentId, PlayerKey, PlayerSnapshot,
    ProfileId,
};
use volley_guard::StrikeState;

use crate::{BASE_MAX_HP, TOGGLE_SPAM_POINTS, TOGGLE_WINDOW_MS};

/// Movement-key toggle bookkeeping for one player.
///
/// Legitimate play changes the held-key mask a few times a second; a
/// macro flipping keys every frame accumulates points much faster. Fast
/// flips weigh more, and holding opposite keys (a common hallmark of
/// scripted input) adds on top. Crossing [`TOGGLE_SPAM_POINTS`] inside
/// the window records a strike and resets the meter.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputIntegrity {
    last_mask: u8,
    last_input_at: u64,
    points: u32,
    window_started_at: u64,
}

impl InputIntegrity {
    /// Accounts one accepted input frame. Returns `true` when the meter
    /// tripped (the caller records the strike).
    pub fn register(&mut self, frame: &InputFrame, now: u64) -> bool {
        if now.saturating_sub(self.window_started_at) >= TOGGLE_WINDOW_MS {
            self.window_started_at = now;
            self.points = 0;
        }

        let mask = frame.move_mask();
        if mask != self.last_mask {
            let dt = now.saturating_sub(self.last_input_at);
            self.points += if dt < 50 {
                3
            } else if dt < 100 {
                2
            } else {
                1
            };
        }
        if frame.has_opposed_keys() {
            self.points += 2;
        }

        self.last_mask = mask;
        self.last_input_at = now;

        if self.points >= TOGGLE_SPAM_POINTS {
            self.points = 0;
            self.window_started_at = now;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One player's full in-room state.
#[derive(Debug, Clone)]
pub struct Player {
    pub key: PlayerKey,
    pub connection: ConnectionId,
    pub persistent_id: PersistentId,
    pub profile_id: Option<ProfileId>,
    pub name: String,
    pub ready: bool,
    pub disconnected: bool,

    pub x: f64,
    pub y: f64,
    /// Facing angle, kept normalized to `(-π, π]`.
    pub angle: f64,
    pub hp: u32,
    pub max_hp: u32,
    pub kills: u32,
    pub deaths: u32,
    pub killstreak: u32,
    pub best_killstreak: u32,

    /// Timed buffs: absolute expiry, 0 when inactive.
    pub shield_until: u64,
    pub invisible_until: u64,
    pub speed_until: u64,

    pub charging: bool,
    /// When the current charge began; 0 whenever `charging` is false.
    pub charge_started_at: u64,
    pub last_shot_at: u64,
    /// When the player died; 0 while alive.
    pub died_at: u64,

    /// Input sequence high-water mark.
    pub input_seq: u64,
    /// Latest validated input.
    pub input: InputFrame,
    /// When the latest validated input arrived.
    pub last_input_at: u64,
    pub integrity: InputIntegrity,

    /// Instant-respawn charges left this match.
    pub instant_respawns_left: u32,
    /// Charges granted at match start (0 or 3); lets match end decide
    /// whether any were consumed.
    pub instant_respawns_granted: u32,

    pub strikes: StrikeState,
}

impl Player {
    pub fn new(
        key: PlayerKey,
        connection: ConnectionId,
        persistent_id: PersistentId,
        profile_id: Option<ProfileId>,
        name: String,
    ) -> Self {
        Self {
            key,
            connection,
            persistent_id,
            profile_id,
            name,
            ready: false,
            disconnected: false,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            hp: BASE_MAX_HP,
            max_hp: BASE_MAX_HP,
            kills: 0,
            deaths: 0,
            killstreak: 0,
            best_killstreak: 0,
            shield_until: 0,
            invisible_until: 0,
            speed_until: 0,
            charging: false,
            charge_started_at: 0,
            last_shot_at: 0,
            died_at: 0,
            input_seq: 0,
            input: InputFrame::default(),
            last_input_at: 0,
            integrity: InputIntegrity::default(),
            instant_respawns_left: 0,
            instant_respawns_granted: 0,
            strikes: StrikeState::default(),
        }
    }

    pub fn alive(&self) -> bool {
        self.hp > 0
    }

    pub fn has_shield(&self, now: u64) -> bool {
        self.shield_until > now
    }

    pub fn is_invisible(&self, now: u64) -> bool {
        self.invisible_until > now
    }

    pub fn has_speed_boost(&self, now: u64) -> bool {
        self.speed_until > now
    }

    /// Zeroes any timed buff whose expiry has passed.
    pub fn expire_buffs(&mut self, now: u64) {
        if self.shield_until != 0 && self.shield_until <= now {
            self.shield_until = 0;
        }
        if self.invisible_until != 0 && self.invisible_until <= now {
            self.invisible_until = 0;
        }
        if self.speed_until != 0 && self.speed_until <= now {
            self.speed_until = 0;
        }
    }

    /// Clears all timed buffs immediately.
    pub fn clear_buffs(&mut self) {
        self.shield_until = 0;
        self.invisible_until = 0;
        self.speed_until = 0;
    }

    /// Resets stored input to idle, preserving the sequence high-water
    /// mark so late frames from before the reset still fall outside the
    /// window.
    pub fn reset_input_keep_seq(&mut self) {
        self.input = InputFrame { seq: self.input.seq, ..InputFrame::default() };
        self.integrity.reset();
        self.charging = false;
        self.charge_started_at = 0;
    }

    /// Full reset for match start: spawn position is assigned by the
    /// caller, everything else returns to baseline.
    pub fn reset_for_match(&mut self, instant_respawns: u32) {
        self.hp = BASE_MAX_HP;
        self.max_hp = BASE_MAX_HP;
        self.kills = 0;
        self.deaths = 0;
        self.killstreak = 0;
        self.best_killstreak = 0;
        self.clear_buffs();
        self.charging = false;
        self.charge_started_at = 0;
        self.last_shot_at = 0;
        self.died_at = 0;
        self.input_seq = 0;
        self.input = InputFrame::default();
        self.last_input_at = 0;
        self.integrity.reset();
        self.instant_respawns_left = instant_respawns;
        self.instant_respawns_granted = instant_respawns;
        self.strikes = StrikeState::default();
    }

    /// The broadcast view of this player.
    pub fn snapshot(&self, now: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.key,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            angle: self.angle,
            hp: self.hp,
            max_hp: self.max_hp,
            kills: self.kills,
            deaths: self.deaths,
            killstreak: self.killstreak,
            has_shield: self.has_shield(now),
            invisible: self.is_invisible(now),
            speed_boost: self.has_speed_boost(now),
            shield_until: self.shield_until,
            invisible_until: self.invisible_until,
            speed_until: self.speed_until,
            charging: self.charging,
            last_seq: self.input.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(
            PlayerKey(1),
            ConnectionId(10),
            PersistentId::parse("device-1").unwrap(),
            None,
            "Nova".into(),
        )
    }

    fn frame(mask: (bool, bool, bool, bool), seq: u64) -> InputFrame {
        InputFrame {
            w: mask.0,
            a: mask.1,
            s: mask.2,
            d: mask.3,
            seq,
            ..Default::default()
        }
    }

    // =====================================================================
    // InputIntegrity
    // =====================================================================

    #[test]
    fn test_integrity_calm_input_never_trips() {
        let mut meter = InputIntegrity::default();
        // A key change every 200 ms: 1 point each, far below 45/1.5 s.
        let mut now = 0;
        for i in 0..50 {
            let held = i % 2 == 0;
            assert!(!meter.register(&frame((held, false, false, false), i), now));
            now += 200;
        }
    }

    #[test]
    fn test_integrity_fast_toggling_trips() {
        let mut meter = InputIntegrity::default();
        // Flipping W every 10 ms: 3 points per flip, 45 points after 15
        // flips — well inside the 1.5 s window.
        let mut tripped = false;
        for i in 1..=20u64 {
            let held = i % 2 == 0;
            if meter.register(&frame((held, false, false, false), i), i * 10) {
                tripped = true;
                break;
            }
        }
        assert!(tripped, "fast toggling must trip the meter");
    }

    #[test]
    fn test_integrity_opposed_keys_accumulate() {
        let mut meter = InputIntegrity::default();
        // W+S held on every frame at a slow cadence: 2 points a frame
        // plus the initial toggle; 45 points within the window requires
        // frames inside 1.5 s.
        let mut tripped = false;
        for i in 1..=30u64 {
            if meter.register(&frame((true, false, true, false), i), i * 40) {
                tripped = true;
                break;
            }
        }
        assert!(tripped, "held opposed keys must trip the meter");
    }

    #[test]
    fn test_integrity_window_reset_forgives() {
        let mut meter = InputIntegrity::default();
        for i in 1..=10u64 {
            let held = i % 2 == 0;
            meter.register(&frame((held, false, false, false), i), i * 10);
        }
        // Long quiet gap: the window restarts and the meter is calm.
        assert!(!meter.register(&frame((true, false, false, false), 11), 60_000));
    }

    // =====================================================================
    // Player
    // =====================================================================

    #[test]
    fn test_expire_buffs_only_past_expiries() {
        let mut p = player();
        p.shield_until = 1_000;
        p.speed_until = 5_000;
        p.expire_buffs(2_000);
        assert_eq!(p.shield_until, 0);
        assert_eq!(p.speed_until, 5_000);
        assert!(p.has_speed_boost(2_000));
        assert!(!p.has_shield(2_000));
    }

    #[test]
    fn test_reset_input_keeps_high_water_seq() {
        let mut p = player();
        p.input = frame((true, true, false, false), 500);
        p.charging = true;
        p.charge_started_at = 123;
        p.reset_input_keep_seq();
        assert_eq!(p.input.seq, 500);
        assert!(!p.input.w && !p.input.a);
        assert!(!p.charging);
        assert_eq!(p.charge_started_at, 0);
    }

    #[test]
    fn test_reset_for_match_restores_baseline() {
        let mut p = player();
        p.hp = 0;
        p.max_hp = 4;
        p.kills = 9;
        p.killstreak = 5;
        p.died_at = 77;
        p.shield_until = 99;
        p.reset_for_match(3);
        assert_eq!(p.hp, 3);
        assert_eq!(p.max_hp, 3);
        assert_eq!(p.kills, 0);
        assert_eq!(p.killstreak, 0);
        assert_eq!(p.died_at, 0);
        assert_eq!(p.shield_until, 0);
        assert_eq!(p.instant_respawns_left, 3);
        assert_eq!(p.instant_respawns_granted, 3);
    }

    #[test]
    fn test_snapshot_reflects_buff_booleans() {
        let mut p = player();
        p.shield_until = 10_000;
        let snap = p.snapshot(5_000);
        assert!(snap.has_shield);
        assert!(!snap.invisible);
        assert_eq!(snap.shield_until, 10_000);
        let later = p.snapshot(10_001);
        assert!(!later.has_shield);
    }
}
