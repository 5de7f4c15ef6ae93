//! Input-abuse defenses for Volley.
//!
//! Four cooperating pieces:
//!
//! - [`RateLimiter`] / [`HandshakeLimiter`] — fixed-window token buckets
//!   per connection+event, plus coarser buckets per source IP and per
//!   persistent id on the handshake path.
//! - [`StrikeEngine`] — accumulates strikes in a rolling 15-second
//!   window and escalates to warn → soft-block → hard-block. In
//!   *observe* mode escalations are recorded but never gate gameplay;
//!   in *enforce* mode a soft block rejects `fireProjectile` and a hard
//!   block rejects `playerInput` too.
//! - [`AuditLog`] — append-only JSONL streams plus an in-memory ring of
//!   the most recent strikes.
//! - [`GuardMetrics`] / [`RoomAbuseStats`] — suspicion counters for the
//!   admin surface.
//!
//! The engine itself holds no per-player state: [`StrikeState`] is
//! embedded in the room's player record, so it resets exactly when the
//! player record does (match start, reconnection).

mod audit;
mod error;
mod limiter;
mod metrics;
mod reasons;
mod strikes;

pub use audit::{AuditLog, StrikeRecord};
pub use error::GuardError;
pub use limiter::{HandshakeLimiter, HandshakeScope, RateLimiter};
pub use metrics::{GuardMetrics, MetricsSnapshot, RoomAbuseStats};
pub use reasons::StrikeReason;
pub use strikes::{
    Escalation, GateDecision, GateKind, GuardAction, GuardConfig, GuardMode,
    StrikeEngine, StrikeState,
};
