//! Suspicion counters for the admin surface.

use std::collections::HashMap;

use serde::Serialize;
use volley_protocol::PlayerKey;

/// Per-room abuse aggregates, embedded in the room record and reset at
/// match start.
#[derive(Debug, Clone, Default)]
pub struct RoomAbuseStats {
    per_player: HashMap<PlayerKey, u32>,
    total_events: u64,
}

impl RoomAbuseStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one strike against a player.
    pub fn record(&mut self, player: PlayerKey) {
        *self.per_player.entry(player).or_insert(0) += 1;
        self.total_events += 1;
    }

    pub fn score(&self, player: PlayerKey) -> u32 {
        self.per_player.get(&player).copied().unwrap_or(0)
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// A JSON object for the room-snapshots audit stream.
    pub fn snapshot(&self, room_code: &str, ts: u64) -> serde_json::Value {
        let per_player: HashMap<String, u32> = self
            .per_player
            .iter()
            .map(|(k, v)| (k.0.to_string(), *v))
            .collect();
        serde_json::json!({
            "ts": ts,
            "room": room_code,
            "totalEvents": self.total_events,
            "perPlayer": per_player,
        })
    }

    pub fn reset(&mut self) {
        self.per_player.clear();
        self.total_events = 0;
    }
}

/// Process-wide counters.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    strikes_total: u64,
    warns_total: u64,
    soft_blocks_total: u64,
    hard_blocks_total: u64,
    rate_limited_total: u64,
}

/// A point-in-time copy of [`GuardMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub strikes_total: u64,
    pub warns_total: u64,
    pub soft_blocks_total: u64,
    pub hard_blocks_total: u64,
    pub rate_limited_total: u64,
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_strike(&mut self) {
        self.strikes_total += 1;
    }

    pub fn on_rate_limited(&mut self) {
        self.rate_limited_total += 1;
    }

    pub fn on_escalation(&mut self, action: crate::GuardAction) {
        match action {
            crate::GuardAction::Warn => self.warns_total += 1,
            crate::GuardAction::SoftBlock => self.soft_blocks_total += 1,
            crate::GuardAction::HardBlock => self.hard_blocks_total += 1,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            strikes_total: self.strikes_total,
            warns_total: self.warns_total,
            soft_blocks_total: self.soft_blocks_total,
            hard_blocks_total: self.hard_blocks_total,
            rate_limited_total: self.rate_limited_total,
        }
    }
}
