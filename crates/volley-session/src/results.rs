//! Post-match result retention.
//!
//! When a match ends, its final stats are stored once per participating
//! persistent id. A device that reconnects within 30 minutes still gets
//! the result screen; acknowledging consumes the entry, and acking twice
//! is a no-op.

use std::collections::HashMap;

use volley_protocol::{MatchResults, PersistentId};

/// Retention period after match end.
pub const RESULT_TTL_MS: u64 = 30 * 60 * 1000;

#[derive(Debug, Clone)]
struct PendingResult {
    results: MatchResults,
    expires_at: u64,
}

/// Pending match results keyed by persistent id.
#[derive(Default)]
pub struct MatchResultBuffer {
    pending: HashMap<PersistentId, PendingResult>,
}

impl MatchResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `results` for every listed participant.
    pub fn store(
        &mut self,
        participants: impl IntoIterator<Item = PersistentId>,
        results: &MatchResults,
    ) {
        let expires_at = results.ended_at + RESULT_TTL_MS;
        for pid in participants {
            self.pending.insert(
                pid,
                PendingResult { results: results.clone(), expires_at },
            );
        }
    }

    /// The unacknowledged result for a device, if still within the TTL.
    pub fn pending(
        &self,
        persistent_id: &PersistentId,
        now: u64,
    ) -> Option<&MatchResults> {
        self.pending
            .get(persistent_id)
            .filter(|p| p.expires_at > now)
            .map(|p| &p.results)
    }

    /// Acknowledges (and drops) a device's pending result. Returns the
    /// acknowledged results; `None` when there was nothing — acking
    /// twice is safe.
    pub fn ack(&mut self, persistent_id: &PersistentId) -> Option<MatchResults> {
        self.pending.remove(persistent_id).map(|p| p.results)
    }

    /// Drops entries past their TTL.
    pub fn prune(&mut self, now: u64) {
        self.pending.retain(|_, p| p.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
