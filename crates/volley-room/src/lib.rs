//! The game aggregate: rooms, players, lobby protocol, input
//! validation, and the per-room simulation tick.
//!
//! Nothing here does I/O. Operations mutate a [`Room`] (or the whole
//! [`RoomStore`]) and return [`Outbound`] events for the caller to
//! deliver; the tick additionally reports match endings so the server
//! can settle results and reward flags against its own stores. Every
//! entry point takes the current time in Unix milliseconds, which keeps
//! the whole crate deterministic under test.

mod broadcast;
mod error;
mod input;
mod lobby;
mod outbound;
mod player;
mod room;
mod store;
mod tick;

pub use broadcast::SyncState;
pub use error::RoomError;
pub use input::{apply_player_input, apply_fire, FireVerdict, InputVerdict};
pub use lobby::{
    lobby_state_reply, JoinOutcome, KickOutcome, LeaveKind, LeaveOutcome,
};
pub use outbound::{Outbound, Recipient};
pub use player::{InputIntegrity, Player};
pub use room::{Buff, KillChain, Projectile, ReconnectInfo, Room};
pub use store::RoomStore;
pub use tick::{advance_room, MatchEndReport, RewardOutcome, TickOutput};

/// Room capacity.
pub const MAX_PLAYERS: usize = 6;

/// Base movement speed, px/s.
pub const BASE_SPEED: f64 = 127.05;
/// Speed-buff multiplier.
pub const SPEED_BOOST_MULT: f64 = 1.25;
/// Movement penalty while charging a shot.
pub const CHARGING_MULT: f64 = 0.5;

/// Projectile speed, px/s.
pub const PROJECTILE_SPEED: f64 = 871.2;
/// Projectiles older than this are removed, seconds.
pub const PROJECTILE_MAX_AGE: f64 = 10.0;
/// Live projectiles one player may own at once.
pub const MAX_OWNED_PROJECTILES: usize = 8;

/// Countdown between `startGame` and `playing`.
pub const COUNTDOWN_MS: u64 = 3_000;
/// Match length.
pub const MATCH_DURATION_MS: u64 = 110_000;
/// Dead players respawn after this long, unless an instant-respawn
/// charge fires.
pub const RESPAWN_DELAY_MS: u64 = 3_000;
/// Taken buffs respawn (with a re-randomized type) after this long.
pub const BUFF_RESPAWN_MS: u64 = 6_000;
/// Timed buffs (shield, invisibility, speed) last this long.
pub const BUFF_DURATION_MS: u64 = 6_000;
/// Distance at which a player collects a buff.
pub const BUFF_PICKUP_RADIUS: f64 = 30.0;
/// Kills this close together chain into a multi-kill.
pub const KILL_CHAIN_WINDOW_MS: u64 = 6_000;

/// Baseline hit points.
pub const BASE_MAX_HP: u32 = 3;
/// Hit points while the extra-core killstreak tier is active.
pub const EXTRA_CORE_MAX_HP: u32 = 4;
/// Charges granted at match start when the reward flag is pending.
pub const INSTANT_RESPAWN_CHARGES: u32 = 3;

/// Minimum spacing between shots.
pub const FIRE_COOLDOWN_MS: u64 = 140;
/// Charge hold required before a shot.
pub const CHARGE_REQUIRED_MS: u64 = 1_000;
/// Reduced hold under the fast-charge killstreak tier.
pub const CHARGE_FAST_MS: u64 = 850;
/// Grace subtracted from the required hold.
pub const CHARGE_GRACE_MS: u64 = 90;
/// Killstreak at which fast charge kicks in.
pub const FAST_CHARGE_STREAK: u32 = 7;
/// A shot with no input newer than this is refused.
pub const INPUT_STALE_MS: u64 = 4_000;

/// Accepted input sequence window behind the high-water mark.
pub const SEQ_BACK_SLACK: u64 = 2;
/// Accepted input sequence window ahead of the high-water mark.
pub const SEQ_AHEAD_SLACK: u64 = 200;
/// Absolute ceiling on input sequence numbers.
pub const SEQ_MAX: u64 = 1_000_000_000;

/// Fire angle divergence from the current input angle that records a
/// warning strike.
pub const FIRE_ANGLE_WARN_RAD: f64 = 1.8;
/// Divergence past which the shot is rejected outright.
pub const FIRE_ANGLE_REJECT_RAD: f64 = 2.75;
/// Tolerance on the claimed muzzle-origin distance.
pub const FIRE_ORIGIN_TOLERANCE: f64 = 6.0;

/// Toggle-spam meter: points that trigger a strike…
pub const TOGGLE_SPAM_POINTS: u32 = 45;
/// …inside this window.
pub const TOGGLE_WINDOW_MS: u64 = 1_500;
