//! Per-tick world-state emission: full snapshots interleaved with
//! field-level deltas.
//!
//! The room keeps the last-emitted view of every entity. Each tick the
//! broadcaster either re-emits everything (first tick of a match, or
//! the snapshot interval elapsed) or diffs the current view against the
//! last one and sends only what changed: upserts with changed fields,
//! plus removed ids.

use std::collections::HashMap;

use volley_protocol::{
    BuffDelta, BuffSnapshot, DeltaSet, PlayerDelta, PlayerKey,
    PlayerSnapshot, ProjectileDelta, ProjectileSnapshot, StateUpdate,
};

use crate::Room;

/// Position/velocity changes below this are not worth a delta field.
const EPS_POS: f64 = 0.01;
/// Angle changes below this are not worth a delta field.
const EPS_ANGLE: f64 = 0.001;

/// Last-emitted entity views for one room.
pub struct SyncState {
    last_full_at: u64,
    emitted_once: bool,
    players: HashMap<PlayerKey, PlayerSnapshot>,
    projectiles: HashMap<u64, ProjectileSnapshot>,
    buffs: HashMap<u8, BuffSnapshot>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            last_full_at: 0,
            emitted_once: false,
            players: HashMap::new(),
            projectiles: HashMap::new(),
            buffs: HashMap::new(),
        }
    }

    /// Builds this tick's `stateUpdate` and advances the bookkeeping.
    ///
    /// `snapshot_interval_ms` is the ceiling on time between full
    /// snapshots.
    pub fn build_update(
        room_players: Vec<PlayerSnapshot>,
        room: &mut Room,
        now: u64,
        snapshot_interval_ms: u64,
    ) -> StateUpdate {
        let remaining_ms = room.remaining_ms(now);
        let projectiles: Vec<ProjectileSnapshot> =
            room.projectiles.iter().map(|p| p.snapshot()).collect();
        let buffs: Vec<BuffSnapshot> =
            room.buffs.iter().map(|b| b.snapshot()).collect();

        let sync = &mut room.sync;
        let need_full = !sync.emitted_once
            || now.saturating_sub(sync.last_full_at) >= snapshot_interval_ms;

        if need_full {
            sync.remember(&room_players, &projectiles, &buffs);
            sync.last_full_at = now;
            sync.emitted_once = true;
            return StateUpdate::Snapshot {
                server_time: now,
                remaining_ms,
                players: room_players,
                projectiles,
                buffs,
            };
        }

        let players_delta = sync.diff_players(&room_players);
        let projectiles_delta = sync.diff_projectiles(&projectiles);
        let buffs_delta = sync.diff_buffs(&buffs);
        sync.remember(&room_players, &projectiles, &buffs);

        StateUpdate::Delta {
            server_time: now,
            remaining_ms,
            players: players_delta,
            projectiles: projectiles_delta,
            buffs: buffs_delta,
        }
    }

    fn remember(
        &mut self,
        players: &[PlayerSnapshot],
        projectiles: &[ProjectileSnapshot],
        buffs: &[BuffSnapshot],
    ) {
        self.players =
            players.iter().map(|p| (p.id, p.clone())).collect();
        self.projectiles =
            projectiles.iter().map(|p| (p.id, *p)).collect();
        self.buffs = buffs.iter().map(|b| (b.id, *b)).collect();
    }

    fn diff_players(
        &self,
        current: &[PlayerSnapshot],
    ) -> DeltaSet<PlayerDelta, PlayerKey> {
        let mut set = DeltaSet::default();
        for snap in current {
            match self.players.get(&snap.id) {
                None => set.upserts.push(full_player_delta(snap)),
                Some(prev) => {
                    let delta = player_delta(prev, snap);
                    if !delta.is_noop() {
                        set.upserts.push(delta);
                    }
                }
            }
        }
        for id in self.players.keys() {
            if !current.iter().any(|p| p.id == *id) {
                set.removed.push(*id);
            }
        }
        set
    }

    fn diff_projectiles(
        &self,
        current: &[ProjectileSnapshot],
    ) -> DeltaSet<ProjectileDelta, u64> {
        let mut set = DeltaSet::default();
        for snap in current {
            match self.projectiles.get(&snap.id) {
                None => set.upserts.push(ProjectileDelta {
                    id: snap.id,
                    x: Some(snap.x),
                    y: Some(snap.y),
                    vx: Some(snap.vx),
                    vy: Some(snap.vy),
                    angle: Some(snap.angle),
                }),
                Some(prev) => {
                    let delta = ProjectileDelta {
                        id: snap.id,
                        x: diff_f64(prev.x, snap.x, EPS_POS),
                        y: diff_f64(prev.y, snap.y, EPS_POS),
                        vx: diff_f64(prev.vx, snap.vx, EPS_POS),
                        vy: diff_f64(prev.vy, snap.vy, EPS_POS),
                        angle: diff_f64(prev.angle, snap.angle, EPS_ANGLE),
                    };
                    let noop = delta.x.is_none()
                        && delta.y.is_none()
                        && delta.vx.is_none()
                        && delta.vy.is_none()
                        && delta.angle.is_none();
                    if !noop {
                        set.upserts.push(delta);
                    }
                }
            }
        }
        for id in self.projectiles.keys() {
            if !current.iter().any(|p| p.id == *id) {
                set.removed.push(*id);
            }
        }
        set
    }

    fn diff_buffs(&self, current: &[BuffSnapshot]) -> DeltaSet<BuffDelta, u8> {
        let mut set = DeltaSet::default();
        for snap in current {
            match self.buffs.get(&snap.id) {
                None => set.upserts.push(BuffDelta {
                    id: snap.id,
                    kind: Some(snap.kind),
                    active: Some(snap.active),
                    taken_at: Some(snap.taken_at),
                }),
                Some(prev) => {
                    let delta = BuffDelta {
                        id: snap.id,
                        kind: (prev.kind != snap.kind).then_some(snap.kind),
                        active: (prev.active != snap.active)
                            .then_some(snap.active),
                        taken_at: (prev.taken_at != snap.taken_at)
                            .then_some(snap.taken_at),
                    };
                    if delta.kind.is_some()
                        || delta.active.is_some()
                        || delta.taken_at.is_some()
                    {
                        set.upserts.push(delta);
                    }
                }
            }
        }
        // Buff pads are fixed; removals would only follow a match reset,
        // which re-snapshots anyway.
        set
    }
}

fn diff_f64(prev: f64, curr: f64, eps: f64) -> Option<f64> {
    ((curr - prev).abs() > eps).then_some(curr)
}

/// A delta carrying every field, for entities the receiver hasn't seen.
fn full_player_delta(snap: &PlayerSnapshot) -> PlayerDelta {
    PlayerDelta {
        id: snap.id,
        name: Some(snap.name.clone()),
        x: Some(snap.x),
        y: Some(snap.y),
        angle: Some(snap.angle),
        hp: Some(snap.hp),
        max_hp: Some(snap.max_hp),
        kills: Some(snap.kills),
        deaths: Some(snap.deaths),
        killstreak: Some(snap.killstreak),
        has_shield: Some(snap.has_shield),
        invisible: Some(snap.invisible),
        speed_boost: Some(snap.speed_boost),
        shield_until: Some(snap.shield_until),
        invisible_until: Some(snap.invisible_until),
        speed_until: Some(snap.speed_until),
        charging: Some(snap.charging),
        last_seq: Some(snap.last_seq),
    }
}

fn player_delta(prev: &PlayerSnapshot, curr: &PlayerSnapshot) -> PlayerDelta {
    PlayerDelta {
        id: curr.id,
        name: (prev.name != curr.name).then(|| curr.name.clone()),
        x: diff_f64(prev.x, curr.x, EPS_POS),
        y: diff_f64(prev.y, curr.y, EPS_POS),
        angle: diff_f64(prev.angle, curr.angle, EPS_ANGLE),
        hp: (prev.hp != curr.hp).then_some(curr.hp),
        max_hp: (prev.max_hp != curr.max_hp).then_some(curr.max_hp),
        kills: (prev.kills != curr.kills).then_some(curr.kills),
        deaths: (prev.deaths != curr.deaths).then_some(curr.deaths),
        killstreak: (prev.killstreak != curr.killstreak)
            .then_some(curr.killstreak),
        has_shield: (prev.has_shield != curr.has_shield)
            .then_some(curr.has_shield),
        invisible: (prev.invisible != curr.invisible)
            .then_some(curr.invisible),
        speed_boost: (prev.speed_boost != curr.speed_boost)
            .then_some(curr.speed_boost),
        shield_until: (prev.shield_until != curr.shield_until)
            .then_some(curr.shield_until),
        invisible_until: (prev.invisible_until != curr.invisible_until)
            .then_some(curr.invisible_until),
        speed_until: (prev.speed_until != curr.speed_until)
            .then_some(curr.speed_until),
        charging: (prev.charging != curr.charging)
            .then_some(curr.charging),
        last_seq: (prev.last_seq != curr.last_seq)
            .then_some(curr.last_seq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_protocol::{
        ConnectionId, MapKey, PersistentId, RoomCode,
    };

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
        room
    }

    fn build(room: &mut Room, now: u64) -> StateUpdate {
        let players = room.player_snapshots(now);
        SyncState::build_update(players, room, now, 1_000)
    }

    /// Applies a player delta onto a snapshot, for the reconstruction
    /// law.
    fn apply_delta(prev: &PlayerSnapshot, delta: &PlayerDelta) -> PlayerSnapshot {
        PlayerSnapshot {
            id: delta.id,
            name: delta.name.clone().unwrap_or_else(|| prev.name.clone()),
            x: delta.x.unwrap_or(prev.x),
            y: delta.y.unwrap_or(prev.y),
            angle: delta.angle.unwrap_or(prev.angle),
            hp: delta.hp.unwrap_or(prev.hp),
            max_hp: delta.max_hp.unwrap_or(prev.max_hp),
            kills: delta.kills.unwrap_or(prev.kills),
            deaths: delta.deaths.unwrap_or(prev.deaths),
            killstreak: delta.killstreak.unwrap_or(prev.killstreak),
            has_shield: delta.has_shield.unwrap_or(prev.has_shield),
            invisible: delta.invisible.unwrap_or(prev.invisible),
            speed_boost: delta.speed_boost.unwrap_or(prev.speed_boost),
            shield_until: delta.shield_until.unwrap_or(prev.shield_until),
            invisible_until: delta
                .invisible_until
                .unwrap_or(prev.invisible_until),
            speed_until: delta.speed_until.unwrap_or(prev.speed_until),
            charging: delta.charging.unwrap_or(prev.charging),
            last_seq: delta.last_seq.unwrap_or(prev.last_seq),
        }
    }

    #[test]
    fn test_first_update_is_snapshot() {
        let mut room = playing_room();
        match build(&mut room, 4_000) {
            StateUpdate::Snapshot { players, buffs, remaining_ms, .. } => {
                assert_eq!(players.len(), 2);
                assert_eq!(buffs.len(), 6);
                assert_eq!(remaining_ms, crate::MATCH_DURATION_MS);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_unchanged_world_yields_empty_delta() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        match build(&mut room, 4_033) {
            StateUpdate::Delta { players, projectiles, buffs, .. } => {
                assert!(players.is_empty());
                assert!(projectiles.is_empty());
                assert!(buffs.is_empty());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_carries_only_changed_fields() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        {
            let p = room.players_mut().next().unwrap();
            p.x += 5.0;
            p.hp = 2;
        }
        match build(&mut room, 4_033) {
            StateUpdate::Delta { players, .. } => {
                assert_eq!(players.upserts.len(), 1);
                let delta = &players.upserts[0];
                assert!(delta.x.is_some());
                assert_eq!(delta.hp, Some(2));
                assert!(delta.y.is_none());
                assert!(delta.kills.is_none());
                assert!(delta.name.is_none());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_sub_epsilon_movement_is_suppressed() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        {
            let p = room.players_mut().next().unwrap();
            p.x += 0.005;
            p.angle += 0.0005;
        }
        match build(&mut room, 4_033) {
            StateUpdate::Delta { players, .. } => {
                assert!(players.is_empty());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_forced_after_interval() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        match build(&mut room, 4_999) {
            StateUpdate::Delta { .. } => {}
            other => panic!("expected delta, got {other:?}"),
        }
        match build(&mut room, 5_000) {
            StateUpdate::Snapshot { .. } => {}
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_removed_player_listed_in_delta() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        let key = room.players().next().unwrap().key;
        room.remove_player(key);
        match build(&mut room, 4_033) {
            StateUpdate::Delta { players, .. } => {
                assert_eq!(players.removed, vec![key]);
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_new_projectile_upserts_all_fields() {
        let mut room = playing_room();
        build(&mut room, 4_000);
        let id = room.next_projectile_id();
        let owner = room.players().next().unwrap().key;
        room.projectiles.push(crate::room::Projectile {
            id,
            owner,
            x: 100.0,
            y: 200.0,
            vx: 871.2,
            vy: 0.0,
            angle: 0.0,
            age: 0.0,
        });
        match build(&mut room, 4_033) {
            StateUpdate::Delta { projectiles, .. } => {
                assert_eq!(projectiles.upserts.len(), 1);
                let d = &projectiles.upserts[0];
                assert_eq!(d.x, Some(100.0));
                assert_eq!(d.vx, Some(871.2));
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_applied_to_previous_reconstructs_current() {
        let mut room = playing_room();
        let before = match build(&mut room, 4_000) {
            StateUpdate::Snapshot { players, .. } => players,
            other => panic!("expected snapshot, got {other:?}"),
        };
        {
            let mut iter = room.players_mut();
            let a = iter.next().unwrap();
            a.x += 12.0;
            a.kills = 1;
            a.killstreak = 1;
            let b = iter.next().unwrap();
            b.hp = 1;
            b.shield_until = 9_000;
        }
        let current = room.player_snapshots(4_033);
        let deltas = match build(&mut room, 4_033) {
            StateUpdate::Delta { players, .. } => players,
            other => panic!("expected delta, got {other:?}"),
        };

        let reconstructed: Vec<PlayerSnapshot> = before
            .iter()
            .map(|prev| {
                deltas
                    .upserts
                    .iter()
                    .find(|d| d.id == prev.id)
                    .map(|d| apply_delta(prev, d))
                    .unwrap_or_else(|| prev.clone())
            })
            .collect();
        assert_eq!(reconstructed, current);
    }
}
