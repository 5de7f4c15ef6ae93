//! Fixed-window event buckets.
//!
//! Each (connection, event) pair gets a window of `spec.window_ms`
//! milliseconds admitting at most `spec.events` events; the window
//! restarts when it elapses. The handshake path adds coarser buckets
//! keyed by source IP and by persistent id, so a single address opening
//! many sockets (or one device id spraying joins across sockets) is
//! throttled before per-connection state even exists.

use std::collections::HashMap;
use std::net::IpAddr;

use volley_protocol::{BucketSpec, ConnectionId, EventTag, PersistentId};

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: u64,
    count: u32,
}

impl Window {
    fn admit(&mut self, spec: BucketSpec, now: u64) -> bool {
        if now.saturating_sub(self.started_at) >= spec.window_ms {
            self.started_at = now;
            self.count = 0;
        }
        if self.count >= spec.events {
            return false;
        }
        self.count += 1;
        true
    }
}

/// Per-connection, per-event token buckets.
#[derive(Default)]
pub struct RateLimiter {
    buckets: HashMap<(ConnectionId, EventTag), Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges one event against its bucket. `false` means the event is
    /// over the limit and must be dropped.
    pub fn admit(&mut self, conn: ConnectionId, tag: EventTag, now: u64) -> bool {
        let window = self
            .buckets
            .entry((conn, tag))
            .or_insert(Window { started_at: now, count: 0 });
        window.admit(tag.bucket(), now)
    }

    /// Drops all buckets for a closed connection.
    pub fn forget_connection(&mut self, conn: ConnectionId) {
        self.buckets.retain(|(c, _), _| *c != conn);
    }

    /// Drops long-idle buckets. Called from housekeeping.
    pub fn prune(&mut self, now: u64) {
        self.buckets.retain(|(_, tag), w| {
            now.saturating_sub(w.started_at) < tag.bucket().window_ms * 4
        });
    }
}

// ---------------------------------------------------------------------------
// Handshake-scope buckets
// ---------------------------------------------------------------------------

/// The operations guarded at handshake scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeScope {
    /// Accepting a socket at all.
    Connect,
    /// `registerPlayer`.
    Register,
    /// `createRoom`.
    Create,
    /// `joinRoom`.
    Join,
}

impl HandshakeScope {
    fn spec(&self) -> BucketSpec {
        match self {
            HandshakeScope::Connect => BucketSpec::per_ten_seconds(30),
            HandshakeScope::Register => BucketSpec::per_ten_seconds(12),
            HandshakeScope::Create => BucketSpec::per_ten_seconds(6),
            HandshakeScope::Join => BucketSpec::per_ten_seconds(10),
        }
    }
}

/// Source-IP and persistent-id buckets for the handshake path.
#[derive(Default)]
pub struct HandshakeLimiter {
    by_ip: HashMap<(IpAddr, HandshakeScope), Window>,
    by_pid: HashMap<(PersistentId, HandshakeScope), Window>,
}

impl HandshakeLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges one event against the source-IP bucket.
    pub fn admit_ip(&mut self, ip: IpAddr, scope: HandshakeScope, now: u64) -> bool {
        let window = self
            .by_ip
            .entry((ip, scope))
            .or_insert(Window { started_at: now, count: 0 });
        window.admit(scope.spec(), now)
    }

    /// Charges one event against the persistent-id bucket.
    pub fn admit_pid(
        &mut self,
        persistent_id: &PersistentId,
        scope: HandshakeScope,
        now: u64,
    ) -> bool {
        let window = self
            .by_pid
            .entry((persistent_id.clone(), scope))
            .or_insert(Window { started_at: now, count: 0 });
        window.admit(scope.spec(), now)
    }

    /// Drops long-idle windows.
    pub fn prune(&mut self, now: u64) {
        let stale = |w: &Window, spec: BucketSpec| {
            now.saturating_sub(w.started_at) >= spec.window_ms * 4
        };
        self.by_ip.retain(|(_, scope), w| !stale(w, scope.spec()));
        self.by_pid.retain(|(_, scope), w| !stale(w, scope.spec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId(n)
    }

    #[test]
    fn test_admit_up_to_capacity_then_reject() {
        let mut limiter = RateLimiter::new();
        let spec = EventTag::CreateRoom.bucket();
        for _ in 0..spec.events {
            assert!(limiter.admit(conn(1), EventTag::CreateRoom, 1_000));
        }
        assert!(!limiter.admit(conn(1), EventTag::CreateRoom, 1_000));
    }

    #[test]
    fn test_window_restarts_after_elapse() {
        let mut limiter = RateLimiter::new();
        let spec = EventTag::CreateRoom.bucket();
        for _ in 0..spec.events {
            limiter.admit(conn(1), EventTag::CreateRoom, 1_000);
        }
        assert!(!limiter.admit(conn(1), EventTag::CreateRoom, 5_000));
        assert!(limiter.admit(
            conn(1),
            EventTag::CreateRoom,
            1_000 + spec.window_ms
        ));
    }

    #[test]
    fn test_buckets_are_per_connection() {
        let mut limiter = RateLimiter::new();
        let spec = EventTag::CreateRoom.bucket();
        for _ in 0..spec.events {
            limiter.admit(conn(1), EventTag::CreateRoom, 1_000);
        }
        assert!(limiter.admit(conn(2), EventTag::CreateRoom, 1_000));
    }

    #[test]
    fn test_buckets_are_per_event() {
        let mut limiter = RateLimiter::new();
        let spec = EventTag::CreateRoom.bucket();
        for _ in 0..spec.events {
            limiter.admit(conn(1), EventTag::CreateRoom, 1_000);
        }
        assert!(limiter.admit(conn(1), EventTag::JoinRoom, 1_000));
    }

    #[test]
    fn test_player_input_sustains_ninety_per_second() {
        let mut limiter = RateLimiter::new();
        for i in 0..90 {
            assert!(
                limiter.admit(conn(1), EventTag::PlayerInput, 1_000 + i * 11),
                "input {i} should pass"
            );
        }
        assert!(!limiter.admit(conn(1), EventTag::PlayerInput, 1_995));
        // Next second's window admits again.
        assert!(limiter.admit(conn(1), EventTag::PlayerInput, 2_000));
    }

    #[test]
    fn test_forget_connection_clears_state() {
        let mut limiter = RateLimiter::new();
        let spec = EventTag::CreateRoom.bucket();
        for _ in 0..spec.events {
            limiter.admit(conn(1), EventTag::CreateRoom, 1_000);
        }
        limiter.forget_connection(conn(1));
        assert!(limiter.admit(conn(1), EventTag::CreateRoom, 1_000));
    }

    #[test]
    fn test_handshake_ip_bucket() {
        let mut limiter = HandshakeLimiter::new();
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let spec = HandshakeScope::Connect.spec();
        for _ in 0..spec.events {
            assert!(limiter.admit_ip(ip, HandshakeScope::Connect, 1_000));
        }
        assert!(!limiter.admit_ip(ip, HandshakeScope::Connect, 1_000));
        // A different address is unaffected.
        let other: IpAddr = "203.0.113.10".parse().unwrap();
        assert!(limiter.admit_ip(other, HandshakeScope::Connect, 1_000));
    }

    #[test]
    fn test_handshake_pid_bucket() {
        let mut limiter = HandshakeLimiter::new();
        let pid = PersistentId::parse("device-1").unwrap();
        let spec = HandshakeScope::Create.spec();
        for _ in 0..spec.events {
            assert!(limiter.admit_pid(&pid, HandshakeScope::Create, 1_000));
        }
        assert!(!limiter.admit_pid(&pid, HandshakeScope::Create, 1_000));
    }
}
