//! The full inbound and outbound event vocabulary.
//!
//! One enum variant per event name. Both enums are adjacently tagged
//! (`{"event": "...", "data": {...}}`) with camelCase payload fields so
//! a browser client consumes them without a translation layer. Event
//! names with a namespace prefix (`friends:`, `party:`, `ads:`) carry an
//! explicit rename.

use serde::{Deserialize, Serialize};

use crate::{
    ErrorCode, FriendCode, PersistentId, PlayerKey, ProfileId, RoomCode,
};
use crate::state::{BuffSnapshot, PlayerSnapshot, ProjectileSnapshot, StateUpdate};

// ---------------------------------------------------------------------------
// Shared wire enums
// ---------------------------------------------------------------------------

/// The playable maps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MapKey {
    Forest,
    Canyon,
    Island,
}

impl MapKey {
    /// All maps, in selection order.
    pub const ALL: [MapKey; 3] = [MapKey::Forest, MapKey::Canyon, MapKey::Island];

    pub fn as_str(&self) -> &'static str {
        match self {
            MapKey::Forest => "forest",
            MapKey::Canyon => "canyon",
            MapKey::Island => "island",
        }
    }
}

impl std::fmt::Display for MapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pickup buff types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BuffKind {
    Health,
    Shield,
    Invisible,
    Speed,
}

/// Room lifecycle state as seen on the wire.
///
/// `Starting` covers the 3-second countdown; reconnect predicates treat
/// `Starting | Playing` as "active match".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Lobby,
    Starting,
    Playing,
}

impl RoomStatus {
    /// Whether new players may join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, RoomStatus::Lobby)
    }

    /// Whether a match is in progress (countdown included).
    pub fn is_active(&self) -> bool {
        matches!(self, RoomStatus::Starting | RoomStatus::Playing)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomStatus::Lobby => "lobby",
            RoomStatus::Starting => "starting",
            RoomStatus::Playing => "playing",
        };
        f.write_str(s)
    }
}

/// Kill-streak milestone tags attached to `playerKilled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum KillTier {
    ExtraCore,
    Momentum,
    FastCharge,
    SteadyAim,
    Legendary,
}

/// What a projectile hit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Map,
    Player,
    Shield,
}

/// Party-invite resolution as reported back to the inviter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Accepted,
    Declined,
    Expired,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// One sampled input state from a client: held movement keys, facing
/// angle, charge flag, and a client-monotonic sequence number.
#[derive(
    Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default,
)]
pub struct InputFrame {
    pub w: bool,
    pub a: bool,
    pub s: bool,
    pub d: bool,
    pub angle: f64,
    pub charging: bool,
    pub seq: u64,
}

impl InputFrame {
    /// Bitmask of the four movement keys, for toggle-rate accounting.
    pub fn move_mask(&self) -> u8 {
        (self.w as u8)
            | (self.a as u8) << 1
            | (self.s as u8) << 2
            | (self.d as u8) << 3
    }

    /// True when opposite keys are held simultaneously (W+S or A+D).
    pub fn has_opposed_keys(&self) -> bool {
        (self.w && self.s) || (self.a && self.d)
    }
}

// ---------------------------------------------------------------------------
// Client → server events
// ---------------------------------------------------------------------------

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// First event on a connection: persistent device id, display name,
    /// optional previous session token.
    #[serde(rename_all = "camelCase")]
    RegisterPlayer {
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    UpdateName { new_name: String },

    #[serde(rename = "friends:getList")]
    FriendsGetList,

    #[serde(rename = "friends:search", rename_all = "camelCase")]
    FriendsSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    #[serde(rename = "friends:sendRequest", rename_all = "camelCase")]
    FriendsSendRequest { target_profile_id: ProfileId },

    #[serde(rename = "friends:respondRequest", rename_all = "camelCase")]
    FriendsRespondRequest { request_id: String, accept: bool },

    #[serde(rename = "party:inviteFriend", rename_all = "camelCase")]
    PartyInviteFriend { target_profile_id: ProfileId },

    #[serde(rename = "party:inviteRespond", rename_all = "camelCase")]
    PartyInviteRespond { invite_id: String, accept: bool },

    /// Client's reply to a server `heartbeat`.
    Pong,

    /// Latency probe; answered with `clientPong`.
    ClientPing { t: u64 },

    #[serde(rename = "ads:getState")]
    AdsGetState,

    #[serde(rename = "ads:rewardedCompleted", rename_all = "camelCase")]
    AdsRewardedCompleted {
        #[serde(rename = "type")]
        kind: String,
    },

    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },

    PlayerReady,
    ToggleReady,
    StartGame,

    PlayerInput(InputFrame),

    FireProjectile { angle: f64 },

    LeaveRoom,

    #[serde(rename_all = "camelCase")]
    RequestLobbyState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_code: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ReturnToLobby {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_code: Option<String>,
    },

    AckMatchResults,

    /// Accepts both `playerKey` and the legacy `playerId` field name.
    #[serde(rename_all = "camelCase")]
    KickPlayer {
        #[serde(alias = "playerId")]
        player_key: PlayerKey,
    },
}

// ---------------------------------------------------------------------------
// Lobby / results payloads
// ---------------------------------------------------------------------------

/// One member row in a lobby snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub player_key: PlayerKey,
    pub name: String,
    pub ready: bool,
    pub leader: bool,
    pub connected: bool,
}

/// Canonical lobby state, broadcast on every lobby mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub room_code: RoomCode,
    pub state: RoomStatus,
    pub leader_key: PlayerKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_key: Option<MapKey>,
    pub players: Vec<LobbyPlayer>,
    pub max_players: usize,
}

/// Final per-player stats archived at match end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player_key: PlayerKey,
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub best_killstreak: u32,
}

/// Results of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResults {
    pub room_code: RoomCode,
    pub ended_at: u64,
    pub players: Vec<PlayerResult>,
}

/// One side of a `playerKilled` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillStat {
    pub player_key: PlayerKey,
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub killstreak: u32,
}

// ---------------------------------------------------------------------------
// Identity / social payloads
// ---------------------------------------------------------------------------

/// Wire shape of an identity-store profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePayload {
    pub profile_id: ProfileId,
    pub nickname: String,
    pub friend_code: FriendCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub guest: bool,
}

/// One friend row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    pub profile_id: ProfileId,
    pub nickname: String,
    pub friend_code: FriendCode,
    pub online: bool,
}

/// One pending friend request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestEntry {
    pub request_id: String,
    pub from_profile_id: ProfileId,
    pub from_nickname: String,
    pub to_profile_id: ProfileId,
    pub sent_at: u64,
}

/// Full friends view pushed on `friends:listUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendsState {
    pub friends: Vec<FriendEntry>,
    pub incoming: Vec<FriendRequestEntry>,
    pub outgoing: Vec<FriendRequestEntry>,
}

/// A pending party invite as delivered to the invitee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInvitePayload {
    pub invite_id: String,
    pub from_profile_id: ProfileId,
    pub from_nickname: String,
    pub room_code: RoomCode,
    pub expires_at: u64,
}

/// Reward-flag state pushed on `ads:state`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdsState {
    pub instant_respawn_pending: bool,
    pub updated_at: u64,
}

// ---------------------------------------------------------------------------
// Server → client events
// ---------------------------------------------------------------------------

/// Everything the server may emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Fresh signed session token after registration or a name change.
    #[serde(rename_all = "camelCase")]
    SessionToken {
        token: String,
        persistent_id: PersistentId,
        name: String,
        expires_at: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<ProfilePayload>,
    },

    Heartbeat { t: u64 },

    #[serde(rename_all = "camelCase")]
    ClientPong { t: u64, server_time: u64 },

    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_code: RoomCode,
        player_key: PlayerKey,
        lobby: LobbySnapshot,
    },

    PlayerJoined { player: LobbyPlayer },

    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_key: PlayerKey, name: String },

    LobbyUpdate { lobby: LobbySnapshot },

    /// Same shape as `lobbyUpdate`, addressed to party UIs.
    #[serde(rename = "party:lobbyState")]
    PartyLobbyState { lobby: LobbySnapshot },

    /// Direct reply to `requestLobbyState` / `returnToLobby`.
    LobbySnapshot { lobby: LobbySnapshot },

    /// Full in-match player table, sent when membership changes mid-match.
    UpdatePlayers { players: Vec<PlayerSnapshot> },

    #[serde(rename_all = "camelCase")]
    PlayerReadyUpdate { player_key: PlayerKey, ready: bool },

    #[serde(rename_all = "camelCase")]
    NewLeader { player_key: PlayerKey },

    #[serde(rename_all = "camelCase")]
    GameStarting { map_key: MapKey, countdown_ms: u64 },

    #[serde(rename_all = "camelCase")]
    CountdownStart { ends_at: u64 },

    #[serde(rename_all = "camelCase")]
    GameStarted {
        map_key: MapKey,
        started_at: u64,
        match_duration_ms: u64,
    },

    StateUpdate(StateUpdate),

    ProjectileFired { projectile: ProjectileSnapshot },

    #[serde(rename_all = "camelCase")]
    HitEffect {
        x: f64,
        y: f64,
        kind: HitKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<PlayerKey>,
        headshot: bool,
        projectile_id: u64,
    },

    #[serde(rename_all = "camelCase")]
    ShieldBreak { player_key: PlayerKey },

    #[serde(rename_all = "camelCase")]
    PlayerKilled {
        victim: KillStat,
        killer: KillStat,
        chain_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tier: Option<KillTier>,
        headshot: bool,
    },

    #[serde(rename_all = "camelCase")]
    PlayerRespawn {
        player_key: PlayerKey,
        x: f64,
        y: f64,
        hp: u32,
        max_hp: u32,
    },

    #[serde(rename_all = "camelCase")]
    BuffPickup {
        buff_id: u8,
        player_key: PlayerKey,
        kind: BuffKind,
    },

    BuffRespawn { buff: BuffSnapshot },

    #[serde(rename_all = "camelCase")]
    InstantRespawnUsed { player_key: PlayerKey, remaining: u32 },

    GameEnd { results: MatchResults },

    MatchResultsPending { results: MatchResults },

    #[serde(rename_all = "camelCase")]
    KickedFromParty { room_code: RoomCode, reason: String },

    #[serde(rename_all = "camelCase")]
    ReconnectedToGame {
        room_code: RoomCode,
        map_key: MapKey,
        player_key: PlayerKey,
        started_at: u64,
        remaining_ms: u64,
        players: Vec<PlayerSnapshot>,
    },

    #[serde(rename_all = "camelCase")]
    ReconnectLimited { retry_after_ms: u64 },

    #[serde(rename_all = "camelCase")]
    AntiCheatAction {
        action: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<u64>,
    },

    AuthError { code: ErrorCode, message: String },

    JoinError { code: ErrorCode, message: String },

    Error { code: ErrorCode, message: String },

    #[serde(rename = "friends:listUpdated")]
    FriendsListUpdated { state: FriendsState },

    #[serde(rename = "friends:incomingRequest")]
    FriendsIncomingRequest { request: FriendRequestEntry },

    #[serde(rename = "friends:requestSent")]
    FriendsRequestSent { request: FriendRequestEntry },

    #[serde(rename = "friends:requestResponded", rename_all = "camelCase")]
    FriendsRequestResponded {
        request_id: String,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        friend: Option<FriendEntry>,
    },

    #[serde(rename = "friends:searchResult")]
    FriendsSearchResult { results: Vec<FriendEntry> },

    #[serde(rename = "friends:error")]
    FriendsError { code: ErrorCode, message: String },

    #[serde(rename = "party:inviteSent")]
    PartyInviteSent { invite: PartyInvitePayload },

    #[serde(rename = "party:inviteReceived")]
    PartyInviteReceived { invite: PartyInvitePayload },

    #[serde(rename = "party:inviteResponded", rename_all = "camelCase")]
    PartyInviteResponded {
        invite_id: String,
        status: InviteStatus,
    },

    #[serde(rename = "party:inviteExpired", rename_all = "camelCase")]
    PartyInviteExpired { invite_id: String },

    #[serde(rename = "party:inviteError")]
    PartyInviteError { code: ErrorCode, message: String },

    #[serde(rename = "ads:state")]
    AdsState(AdsState),

    #[serde(rename = "profile:nicknameUpdated", rename_all = "camelCase")]
    ProfileNicknameUpdated {
        profile_id: ProfileId,
        nickname: String,
    },
}

impl ServerEvent {
    /// The event name as it appears on the wire. Used by the codec and
    /// the logs to name a frame without serializing it.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionToken { .. } => "sessionToken",
            ServerEvent::Heartbeat { .. } => "heartbeat",
            ServerEvent::ClientPong { .. } => "clientPong",
            ServerEvent::RoomCreated { .. } => "roomCreated",
            ServerEvent::PlayerJoined { .. } => "playerJoined",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
            ServerEvent::LobbyUpdate { .. } => "lobbyUpdate",
            ServerEvent::PartyLobbyState { .. } => "party:lobbyState",
            ServerEvent::LobbySnapshot { .. } => "lobbySnapshot",
            ServerEvent::UpdatePlayers { .. } => "updatePlayers",
            ServerEvent::PlayerReadyUpdate { .. } => "playerReadyUpdate",
            ServerEvent::NewLeader { .. } => "newLeader",
            ServerEvent::GameStarting { .. } => "gameStarting",
            ServerEvent::CountdownStart { .. } => "countdownStart",
            ServerEvent::GameStarted { .. } => "gameStarted",
            ServerEvent::StateUpdate(_) => "stateUpdate",
            ServerEvent::ProjectileFired { .. } => "projectileFired",
            ServerEvent::HitEffect { .. } => "hitEffect",
            ServerEvent::ShieldBreak { .. } => "shieldBreak",
            ServerEvent::PlayerKilled { .. } => "playerKilled",
            ServerEvent::PlayerRespawn { .. } => "playerRespawn",
            ServerEvent::BuffPickup { .. } => "buffPickup",
            ServerEvent::BuffRespawn { .. } => "buffRespawn",
            ServerEvent::InstantRespawnUsed { .. } => "instantRespawnUsed",
            ServerEvent::GameEnd { .. } => "gameEnd",
            ServerEvent::MatchResultsPending { .. } => "matchResultsPending",
            ServerEvent::KickedFromParty { .. } => "kickedFromParty",
            ServerEvent::ReconnectedToGame { .. } => "reconnectedToGame",
            ServerEvent::ReconnectLimited { .. } => "reconnectLimited",
            ServerEvent::AntiCheatAction { .. } => "antiCheatAction",
            ServerEvent::AuthError { .. } => "authError",
            ServerEvent::JoinError { .. } => "joinError",
            ServerEvent::Error { .. } => "error",
            ServerEvent::FriendsListUpdated { .. } => "friends:listUpdated",
            ServerEvent::FriendsIncomingRequest { .. } => {
                "friends:incomingRequest"
            }
            ServerEvent::FriendsRequestSent { .. } => "friends:requestSent",
            ServerEvent::FriendsRequestResponded { .. } => {
                "friends:requestResponded"
            }
            ServerEvent::FriendsSearchResult { .. } => "friends:searchResult",
            ServerEvent::FriendsError { .. } => "friends:error",
            ServerEvent::PartyInviteSent { .. } => "party:inviteSent",
            ServerEvent::PartyInviteReceived { .. } => "party:inviteReceived",
            ServerEvent::PartyInviteResponded { .. } => {
                "party:inviteResponded"
            }
            ServerEvent::PartyInviteExpired { .. } => "party:inviteExpired",
            ServerEvent::PartyInviteError { .. } => "party:inviteError",
            ServerEvent::AdsState(_) => "ads:state",
            ServerEvent::ProfileNicknameUpdated { .. } => {
                "profile:nicknameUpdated"
            }
        }
    }
}
