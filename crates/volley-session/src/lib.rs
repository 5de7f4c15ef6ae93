//! Player identity for the lifetime of a device: signed session tokens,
//! the session registry, the reconnect guard, pending match results, and
//! the instant-respawn reward flag.
//!
//! Everything here is keyed by the persistent device id. None of the
//! stores are thread-safe by themselves — they are owned behind a lock
//! at the server level, and every operation takes the current time as a
//! parameter so tests never need to sleep.

mod error;
mod keeper;
mod reconnect;
mod results;
mod rewards;
mod token;

pub use error::SessionError;
pub use keeper::{SessionKeeper, SessionRecord};
pub use reconnect::ReconnectGuard;
pub use results::MatchResultBuffer;
pub use rewards::RewardFlagStore;
pub use token::{mint_token, verify_token, TokenClaims, SESSION_TTL_MS};
