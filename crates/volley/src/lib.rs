//! # Volley
//!
//! Authoritative multiplayer server for a top-down 2D arena shooter:
//! 5-digit room codes, a ready-up lobby, a 30 Hz simulation with
//! projectiles, buffs and killstreaks, signed session tokens with
//! mid-match reconnection, and an anti-abuse engine in front of the
//! input path.
//!
//! This crate ties the stack together (transport, protocol, sessions,
//! rooms, guard, identity) and hosts the `volley-server` binary.

mod config;
mod error;
mod events;
mod handler;
mod party;
mod server;
mod state;

pub use config::VolleyConfig;
pub use error::VolleyError;
pub use party::{PartyInvite, PartyInvites, PARTY_INVITE_TTL_MS};
pub use server::VolleyServer;
pub use state::{now_ms, ServerState};

/// Re-exports for embedding the server or writing tools against it.
pub mod prelude {
    pub use crate::{
        now_ms, PartyInvites, ServerState, VolleyConfig, VolleyError,
        VolleyServer,
    };
    pub use volley_guard::{GuardConfig, GuardMode};
    pub use volley_identity::{
        IdentityStore, MemoryIdentityStore, ProfileSnapshot,
    };
    pub use volley_protocol::{
        ClientEvent, ClientFrame, ErrorCode, EventTag, MapKey, PersistentId,
        PlayerKey, RoomCode, ServerEvent, ServerFrame,
    };
    pub use volley_room::{Room, RoomStore};
    pub use volley_transport::{Connection, Gateway, Transport};
}
