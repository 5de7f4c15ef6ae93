//! Process-wide server state.
//!
//! Rooms live behind a Tokio mutex: socket tasks and the tick driver
//! take turns mutating them, which is the serialization the simulation
//! relies on. The remaining stores never await while locked, so they
//! sit behind plain std mutexes. The gateway synchronizes internally
//! and emits without blocking.

use std::sync::Mutex as StdMutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use volley_guard::{
    AuditLog, Escalation, GuardMetrics, HandshakeLimiter, RateLimiter,
    StrikeEngine, StrikeReason, StrikeRecord,
};
use volley_identity::IdentityStore;
use volley_protocol::{ConnectionId, PlayerKey, ServerEvent};
use volley_room::{Outbound, Recipient, Room, RoomStore};
use volley_session::{
    MatchResultBuffer, ReconnectGuard, RewardFlagStore, SessionKeeper,
};
use volley_transport::Gateway;

use crate::{PartyInvites, VolleyConfig, VolleyError};

/// Current wall time in Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Everything shared across connection tasks and the tick driver.
pub struct ServerState<I: IdentityStore> {
    pub config: VolleyConfig,
    pub gateway: Gateway,
    pub rooms: Mutex<RoomStore>,
    pub sessions: StdMutex<SessionKeeper>,
    pub reconnects: StdMutex<ReconnectGuard>,
    pub results: StdMutex<MatchResultBuffer>,
    pub rewards: StdMutex<RewardFlagStore>,
    pub limiter: StdMutex<RateLimiter>,
    pub handshakes: StdMutex<HandshakeLimiter>,
    pub party: StdMutex<PartyInvites>,
    pub engine: StrikeEngine,
    pub audit: AuditLog,
    pub metrics: StdMutex<GuardMetrics>,
    pub identity: I,
}

impl<I: IdentityStore> ServerState<I> {
    /// Builds the state, opening the audit streams under the configured
    /// data directory.
    pub fn new(config: VolleyConfig, identity: I) -> Result<Self, VolleyError> {
        let audit = AuditLog::open(&config.data_dir)?;
        Ok(Self::with_audit(config, identity, audit))
    }

    /// Builds the state with a caller-supplied audit log (tests use the
    /// in-memory one).
    pub fn with_audit(
        config: VolleyConfig,
        identity: I,
        audit: AuditLog,
    ) -> Self {
        let engine = StrikeEngine::new(config.guard.clone());
        Self {
            sessions: StdMutex::new(SessionKeeper::new(
                config.session_secret.clone(),
            )),
            config,
            gateway: Gateway::new(),
            rooms: Mutex::new(RoomStore::new()),
            reconnects: StdMutex::new(ReconnectGuard::new()),
            results: StdMutex::new(MatchResultBuffer::new()),
            rewards: StdMutex::new(RewardFlagStore::new()),
            limiter: StdMutex::new(RateLimiter::new()),
            handshakes: StdMutex::new(HandshakeLimiter::new()),
            party: StdMutex::new(PartyInvites::new()),
            engine,
            audit,
            metrics: StdMutex::new(GuardMetrics::new()),
            identity,
        }
    }

    /// Delivers a batch of addressed events through the gateway.
    pub fn deliver(&self, events: Vec<Outbound>) {
        for Outbound { to, event } in events {
            match to {
                Recipient::Room(code) => {
                    self.gateway.broadcast_room(&code, event);
                }
                Recipient::Conn(conn) => self.gateway.emit(conn, event),
                Recipient::Device(pid) => {
                    self.gateway.emit_device(&pid, event);
                }
            }
        }
    }

    /// Locks a std mutex, recovering from poisoning; every store here
    /// is a plain map whose invariants hold between operations.
    pub fn lock<'a, T>(
        &self,
        mutex: &'a StdMutex<T>,
    ) -> std::sync::MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records a strike against an in-room player: engine state, room
    /// aggregates, audit streams, metrics, and the anti-cheat
    /// notification on escalation.
    pub fn strike_player(
        &self,
        room: &mut Room,
        key: PlayerKey,
        reason: StrikeReason,
        details: serde_json::Value,
        now: u64,
    ) -> Option<Escalation> {
        let (conn, pid, name) = {
            let player = room.player(key)?;
            (
                player.connection,
                player.persistent_id.clone(),
                player.name.clone(),
            )
        };

        let escalation = {
            let player = room.player_mut(key)?;
            self.engine.record(&mut player.strikes, now)
        };
        room.abuse.record(key);

        let record = StrikeRecord::new(now, reason)
            .room(room.code.clone())
            .connection(conn)
            .player(pid, name)
            .details(details);
        self.audit.record_strike(record.clone());
        {
            let mut metrics = self.lock(&self.metrics);
            metrics.on_strike();
            if matches!(reason, StrikeReason::RateLimit(_)) {
                metrics.on_rate_limited();
            }
        }

        if let Some(escalation) = escalation {
            self.audit
                .record_escalation(record.action(escalation.action));
            self.lock(&self.metrics).on_escalation(escalation.action);
            self.gateway.emit(
                conn,
                ServerEvent::AntiCheatAction {
                    action: escalation.action.as_str().to_string(),
                    reason: reason.as_str().into_owned(),
                    expires_at: escalation.until,
                },
            );
            tracing::info!(
                room = %room.code,
                player = %key,
                action = %escalation.action,
                strikes = escalation.strikes,
                "anti-abuse escalation"
            );
        }
        escalation
    }

    /// Audits an abuse signal with no in-room player to pin it on
    /// (pre-lobby rate limits and malformed frames).
    pub fn log_unscoped(
        &self,
        conn: ConnectionId,
        reason: StrikeReason,
        now: u64,
    ) {
        let mut record = StrikeRecord::new(now, reason);
        record.connection = Some(conn);
        if let Some(meta) = self.gateway.meta(conn) {
            if let Some(pid) = meta.persistent_id {
                record.player = Some(pid);
            }
        }
        self.audit.record_strike(record);
        let mut metrics = self.lock(&self.metrics);
        metrics.on_strike();
        if matches!(reason, StrikeReason::RateLimit(_)) {
            metrics.on_rate_limited();
        }
    }

    /// Overlays live presence (from the gateway's profile index) onto
    /// friend rows coming out of the identity store.
    pub fn overlay_presence(
        &self,
        entries: &mut [volley_protocol::FriendEntry],
    ) {
        for entry in entries {
            entry.online = self.gateway.profile_online(&entry.profile_id);
        }
    }
}
