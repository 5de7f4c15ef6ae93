//! The instant-respawn reward flag.
//!
//! A rewarded-ad completion sets `instant_respawn_pending` for a device.
//! At the next match start the flag converts into three in-match charges
//! and clears; if the match ends with all three charges untouched, the
//! flag is restored so the reward isn't silently lost.

use std::collections::HashMap;

use volley_protocol::{AdsState, PersistentId};

#[derive(Debug, Clone, Copy, Default)]
struct RewardFlag {
    pending: bool,
    updated_at: u64,
}

/// Per-persistent-id reward flags.
#[derive(Default)]
pub struct RewardFlagStore {
    flags: HashMap<PersistentId, RewardFlag>,
}

impl RewardFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current wire state for a device.
    pub fn state(&self, persistent_id: &PersistentId) -> AdsState {
        let flag = self
            .flags
            .get(persistent_id)
            .copied()
            .unwrap_or_default();
        AdsState {
            instant_respawn_pending: flag.pending,
            updated_at: flag.updated_at,
        }
    }

    /// Marks the reward as pending.
    pub fn set_pending(&mut self, persistent_id: &PersistentId, now: u64) -> AdsState {
        self.flags.insert(
            persistent_id.clone(),
            RewardFlag { pending: true, updated_at: now },
        );
        tracing::debug!(%persistent_id, "instant-respawn reward pending");
        self.state(persistent_id)
    }

    /// Consumes the pending flag at match start. Returns `true` when a
    /// reward was pending (the caller grants the in-match charges).
    pub fn consume_at_match_start(
        &mut self,
        persistent_id: &PersistentId,
        now: u64,
    ) -> bool {
        match self.flags.get_mut(persistent_id) {
            Some(flag) if flag.pending => {
                flag.pending = false;
                flag.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Restores the flag at match end for a player who never used a
    /// charge.
    pub fn restore(&mut self, persistent_id: &PersistentId, now: u64) -> AdsState {
        self.set_pending(persistent_id, now)
    }
}
