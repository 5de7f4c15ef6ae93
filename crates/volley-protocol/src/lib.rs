//! Wire protocol for Volley.
//!
//! This crate defines the "language" that game clients and the server
//! speak:
//!
//! - **Identity newtypes** ([`PersistentId`], [`PlayerKey`], [`RoomCode`],
//!   [`ConnectionId`], [`ProfileId`], [`FriendCode`]) — the keys that
//!   travel on the wire and index server-side state.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]) — the full inbound and
//!   outbound vocabulary, one enum variant per event name.
//! - **Frames** ([`ClientFrame`], [`ServerFrame`]) — an event plus an
//!   optional acknowledgement id for request/response pairs.
//! - **Rate-limit metadata** ([`EventTag`], [`BucketSpec`]) — every
//!   inbound event names its own token-bucket parameters.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames become bytes.
//! - **Error codes** ([`ErrorCode`]) — the stable string codes surfaced
//!   to clients.
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! state. It doesn't know about connections, rooms, or sessions; it only
//! knows the shapes that cross the wire.

mod codec;
mod codes;
mod error;
mod events;
mod frame;
mod ids;
mod state;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codes::ErrorCode;
pub use error::ProtocolError;
pub use events::{
    AdsState, BuffKind, ClientEvent, FriendEntry, FriendRequestEntry,
    FriendsState, HitKind, InputFrame, InviteStatus, KillStat, KillTier,
    LobbyPlayer, LobbySnapshot, MapKey, MatchResults, PartyInvitePayload,
    PlayerResult, ProfilePayload, RoomStatus, ServerEvent,
};
pub use frame::{
    decode_client_frame, BucketSpec, ClientFrame, EventTag, FrameError,
    ServerFrame,
};
pub use ids::{
    ConnectionId, FriendCode, PersistentId, PlayerKey, ProfileId, RoomCode,
};
pub use state::{
    BuffDelta, BuffSnapshot, DeltaSet, PlayerDelta, PlayerSnapshot,
    ProjectileDelta, ProjectileSnapshot, StateUpdate,
};
