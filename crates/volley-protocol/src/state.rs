//! Per-tick world-state payloads: full snapshots and per-entity deltas.
//!
//! A snapshot carries the complete entity lists. A delta carries, per
//! entity kind, the upserted records (changed fields only) and the ids
//! removed since the previous emission. Clients apply deltas in order
//! per room; a snapshot resets their view.

use serde::{Deserialize, Serialize};

use crate::{BuffKind, PlayerKey};

/// Full per-player view as broadcast in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerKey,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub hp: u32,
    pub max_hp: u32,
    pub kills: u32,
    pub deaths: u32,
    pub killstreak: u32,
    pub has_shield: bool,
    pub invisible: bool,
    pub speed_boost: bool,
    pub shield_until: u64,
    pub invisible_until: u64,
    pub speed_until: u64,
    pub charging: bool,
    /// Highest input sequence the server has applied for this player.
    /// Monotonic within a match; clients use it for reconciliation.
    pub last_seq: u64,
}

/// Full per-projectile view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileSnapshot {
    pub id: u64,
    pub owner: PlayerKey,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
}

/// Full per-buff view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffSnapshot {
    pub id: u8,
    pub x: f64,
    pub y: f64,
    pub kind: BuffKind,
    pub active: bool,
    pub taken_at: u64,
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// Changed fields of one player since the last emission. Absent fields
/// are unchanged (within the diff epsilon for floats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDelta {
    pub id: PlayerKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killstreak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_shield: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_boost: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shield_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seq: Option<u64>,
}

impl PlayerDelta {
    /// A delta that changes nothing (id only).
    pub fn empty(id: PlayerKey) -> Self {
        Self { id, ..Default::default() }
    }

    /// Whether any field besides the id is present.
    pub fn is_noop(&self) -> bool {
        self == &Self::empty(self.id)
    }
}

/// Changed fields of one projectile since the last emission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileDelta {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

/// Changed fields of one buff since the last emission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffDelta {
    pub id: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BuffKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<u64>,
}

/// Upserts plus removals for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSet<U, K> {
    pub upserts: Vec<U>,
    pub removed: Vec<K>,
}

impl<U, K> Default for DeltaSet<U, K> {
    fn default() -> Self {
        Self { upserts: Vec::new(), removed: Vec::new() }
    }
}

impl<U, K> DeltaSet<U, K> {
    /// True when there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removed.is_empty()
    }
}

/// The `stateUpdate` payload: a full snapshot or a delta.
///
/// Every update carries the server clock and the remaining match time so
/// clients can render the timer without a separate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum StateUpdate {
    #[serde(rename_all = "camelCase")]
    Snapshot {
        server_time: u64,
        remaining_ms: u64,
        players: Vec<PlayerSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
        buffs: Vec<BuffSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    Delta {
        server_time: u64,
        remaining_ms: u64,
        players: DeltaSet<PlayerDelta, PlayerKey>,
        projectiles: DeltaSet<ProjectileDelta, u64>,
        buffs: DeltaSet<BuffDelta, u8>,
    },
}
