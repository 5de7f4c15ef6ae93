//! Per-persistent-id reconnect guard.
//!
//! Reconnection scans and rebinds are cheap but not free, and a client
//! stuck in a reconnect loop can hammer them. Each persistent id gets a
//! rolling window: at most [`ReconnectGuard::MAX_ATTEMPTS`] attempts per
//! [`ReconnectGuard::WINDOW_MS`], after which attempts are refused with
//! a retry-after hint until the window rolls over.

use std::collections::HashMap;

use volley_protocol::PersistentId;

use crate::SessionError;

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    started_at: u64,
    attempts: u32,
}

/// Tracks reconnect attempts per persistent id.
#[derive(Default)]
pub struct ReconnectGuard {
    windows: HashMap<PersistentId, AttemptWindow>,
}

impl ReconnectGuard {
    /// Window length.
    pub const WINDOW_MS: u64 = 20_000;
    /// Attempts allowed per window.
    pub const MAX_ATTEMPTS: u32 = 6;

    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt. `Err(ReconnectLimited)` once the window is
    /// exhausted.
    pub fn check(
        &mut self,
        persistent_id: &PersistentId,
        now: u64,
    ) -> Result<(), SessionError> {
        let window = self
            .windows
            .entry(persistent_id.clone())
            .or_insert(AttemptWindow { started_at: now, attempts: 0 });

        if now.saturating_sub(window.started_at) >= Self::WINDOW_MS {
            window.started_at = now;
            window.attempts = 0;
        }

        window.attempts += 1;
        if window.attempts > Self::MAX_ATTEMPTS {
            let retry_after_ms =
                (window.started_at + Self::WINDOW_MS).saturating_sub(now);
            tracing::debug!(
                %persistent_id,
                attempts = window.attempts,
                retry_after_ms,
                "reconnect limited"
            );
            return Err(SessionError::ReconnectLimited { retry_after_ms });
        }
        Ok(())
    }

    /// Forgets ids whose window has long rolled over. Called from the
    /// server's housekeeping pass.
    pub fn prune(&mut self, now: u64) {
        self.windows.retain(|_, w| {
            now.saturating_sub(w.started_at) < Self::WINDOW_MS * 2
        });
    }
}
