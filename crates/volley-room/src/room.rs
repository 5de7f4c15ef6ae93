//! The room aggregate.
//!
//! A room owns its players (keyed by stable [`PlayerKey`]), the live
//! projectiles and buffs, kill-chain bookkeeping, the last match's
//! archived results, and the broadcaster's diff state. Side indexes map
//! connection ids and persistent ids to player keys; reconnection
//! rebinds the connection index instead of moving records.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::seq::IndexedRandom;
use volley_guard::RoomAbuseStats;
use volley_map::{buff_spawns, map_def, MapDef};
use volley_protocol::{
    BuffKind, BuffSnapshot, ConnectionId, LobbyPlayer, LobbySnapshot,
    MapKey, MatchResults, PersistentId, PlayerKey, PlayerSnapshot,
    ProfileId, ProjectileSnapshot, RoomCode, RoomStatus,
};

use crate::broadcast::SyncState;
use crate::player::Player;
use crate::{INSTANT_RESPAWN_CHARGES, MAX_PLAYERS};

/// A live projectile.
#[derive(Debug, Clone, Copy)]
pub struct Projectile {
    pub id: u64,
    pub owner: PlayerKey,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
    /// Seconds since fired.
    pub age: f64,
}

impl Projectile {
    pub fn snapshot(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            id: self.id,
            owner: self.owner,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            angle: self.angle,
        }
    }
}

/// One of the six buff pads.
#[derive(Debug, Clone, Copy)]
pub struct Buff {
    pub id: u8,
    pub x: f64,
    pub y: f64,
    pub kind: BuffKind,
    pub active: bool,
    /// When the buff was last picked up; 0 if never.
    pub taken_at: u64,
}

impl Buff {
    pub fn snapshot(&self) -> BuffSnapshot {
        BuffSnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            kind: self.kind,
            active: self.active,
            taken_at: self.taken_at,
        }
    }
}

/// Chained-kill state per killer.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillChain {
    pub count: u32,
    pub last_kill_at: u64,
}

/// Payload handed back when a reconnect rebinds a player.
#[derive(Debug, Clone)]
pub struct ReconnectInfo {
    pub player_key: PlayerKey,
    pub map_key: MapKey,
    pub started_at: u64,
    pub old_connection: ConnectionId,
}

/// One room: lobby or running match.
pub struct Room {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub leader: PlayerKey,
    pub map_key: Option<MapKey>,
    /// When the countdown began (status = starting).
    pub starting_since: u64,
    /// When play began (status = playing).
    pub match_started_at: u64,

    players: BTreeMap<PlayerKey, Player>,
    next_player_key: u32,
    by_connection: HashMap<ConnectionId, PlayerKey>,
    by_persistent: HashMap<PersistentId, PlayerKey>,

    next_spawn_index: usize,
    pub projectiles: Vec<Projectile>,
    next_projectile_id: u64,
    pub buffs: Vec<Buff>,
    pub kill_chains: HashMap<PlayerKey, KillChain>,

    pub abuse: RoomAbuseStats,
    /// Archived results of the last match played in this room, with the
    /// set of persistent ids that acknowledged them.
    pub last_results: Option<(MatchResults, HashSet<PersistentId>)>,
    pub sync: SyncState,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            status: RoomStatus::Lobby,
            leader: PlayerKey(0),
            map_key: None,
            starting_since: 0,
            match_started_at: 0,
            players: BTreeMap::new(),
            next_player_key: 1,
            by_connection: HashMap::new(),
            by_persistent: HashMap::new(),
            next_spawn_index: 0,
            projectiles: Vec::new(),
            next_projectile_id: 1,
            buffs: Vec::new(),
            kill_chains: HashMap::new(),
            abuse: RoomAbuseStats::new(),
            last_results: None,
            sync: SyncState::new(),
        }
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn player(&self, key: PlayerKey) -> Option<&Player> {
        self.players.get(&key)
    }

    pub fn player_mut(&mut self, key: PlayerKey) -> Option<&mut Player> {
        self.players.get_mut(&key)
    }

    pub fn key_of_connection(&self, conn: ConnectionId) -> Option<PlayerKey> {
        self.by_connection.get(&conn).copied()
    }

    pub fn key_of_persistent(&self, pid: &PersistentId) -> Option<PlayerKey> {
        self.by_persistent.get(pid).copied()
    }

    pub fn player_by_connection(&self, conn: ConnectionId) -> Option<&Player> {
        self.key_of_connection(conn).and_then(|k| self.player(k))
    }

    pub fn player_by_connection_mut(
        &mut self,
        conn: ConnectionId,
    ) -> Option<&mut Player> {
        let key = self.key_of_connection(conn)?;
        self.players.get_mut(&key)
    }

    /// Inserts a new player, allocating its stable key. The first member
    /// becomes leader with `ready = true`.
    pub fn insert_player(
        &mut self,
        connection: ConnectionId,
        persistent_id: PersistentId,
        profile_id: Option<ProfileId>,
        name: String,
    ) -> PlayerKey {
        let key = PlayerKey(self.next_player_key);
        self.next_player_key += 1;

        let mut player =
            Player::new(key, connection, persistent_id.clone(), profile_id, name);
        if self.players.is_empty() {
            self.leader = key;
            player.ready = true;
        }
        self.by_connection.insert(connection, key);
        self.by_persistent.insert(persistent_id, key);
        self.players.insert(key, player);
        key
    }

    /// Removes a player record and its index entries. Elects a new
    /// leader if the departing player held it; returns the new leader's
    /// key when that happened.
    pub fn remove_player(&mut self, key: PlayerKey) -> Option<PlayerKey> {
        let player = self.players.remove(&key)?;
        self.by_connection.remove(&player.connection);
        self.by_persistent.remove(&player.persistent_id);
        self.kill_chains.remove(&key);
        self.projectiles.retain(|p| p.owner != key);

        if self.leader == key && !self.players.is_empty() {
            return Some(self.elect_leader());
        }
        None
    }

    /// Picks a new leader: the lowest-keyed connected member, falling
    /// back to the lowest-keyed member. The leader is always ready.
    pub fn elect_leader(&mut self) -> PlayerKey {
        let new_leader = self
            .players
            .values()
            .find(|p| !p.disconnected)
            .or_else(|| self.players.values().next())
            .map(|p| p.key)
            .expect("elect_leader requires a non-empty room");
        self.leader = new_leader;
        if let Some(p) = self.players.get_mut(&new_leader) {
            p.ready = true;
        }
        new_leader
    }

    /// Rebinds a disconnected member to a fresh connection. Input
    /// state restarts from scratch so stale sequence numbers and the
    /// toggle meter can't strike a player for reconnecting.
    pub fn rebind(
        &mut self,
        persistent_id: &PersistentId,
        new_connection: ConnectionId,
    ) -> Option<ReconnectInfo> {
        let key = self.key_of_persistent(persistent_id)?;
        let map_key = self.map_key?;
        let started_at = self.match_started_at;
        let player = self.players.get_mut(&key)?;
        if !player.disconnected {
            return None;
        }

        let old_connection = player.connection;
        player.connection = new_connection;
        player.disconnected = false;
        player.input_seq = 0;
        player.last_shot_at = 0;
        player.last_input_at = 0;
        player.reset_input_keep_seq();
        player.input.seq = 0;
        player.strikes = Default::default();

        self.by_connection.remove(&old_connection);
        self.by_connection.insert(new_connection, key);

        Some(ReconnectInfo { player_key: key, map_key, started_at, old_connection })
    }

    /// Flags a member as disconnected without removing the record.
    pub fn mark_disconnected(&mut self, key: PlayerKey) {
        if let Some(player) = self.players.get_mut(&key) {
            player.disconnected = true;
            self.by_connection.remove(&player.connection);
        }
    }

    // -----------------------------------------------------------------
    // Match lifecycle
    // -----------------------------------------------------------------

    /// Resets the room for a new match: map, spawns, player records,
    /// projectiles, buffs, chains, abuse aggregates, sync state.
    ///
    /// `grant_reward` is consulted once per member; a `true` answer
    /// grants the instant-respawn charges for this match.
    pub fn begin_match(
        &mut self,
        map_key: MapKey,
        now: u64,
        mut grant_reward: impl FnMut(&PersistentId) -> bool,
    ) {
        self.status = RoomStatus::Starting;
        self.starting_since = now;
        self.match_started_at = 0;
        self.map_key = Some(map_key);
        self.next_spawn_index = 0;
        self.projectiles.clear();
        self.next_projectile_id = 1;
        self.kill_chains.clear();
        self.abuse.reset();
        self.last_results = None;
        self.sync = SyncState::new();

        let def = map_def(map_key);
        let keys: Vec<PlayerKey> = self.players.keys().copied().collect();
        for key in keys {
            let spawn = self.next_spawn(def);
            let player = self.players.get_mut(&key).expect("key just listed");
            let charges = if grant_reward(&player.persistent_id) {
                INSTANT_RESPAWN_CHARGES
            } else {
                0
            };
            player.reset_for_match(charges);
            player.x = spawn.0;
            player.y = spawn.1;
            player.angle = 0.0;
        }

        self.buffs = Self::roll_buffs();
        tracing::info!(
            room = %self.code,
            map = %map_key,
            players = self.players.len(),
            "match starting"
        );
    }

    /// Promotes `starting` to `playing` once the countdown has elapsed.
    pub fn promote_to_playing(&mut self, now: u64) {
        self.status = RoomStatus::Playing;
        self.match_started_at = now;
    }

    /// The next round-robin spawn point.
    pub fn next_spawn(&mut self, def: &MapDef) -> (f64, f64) {
        let spawn = def.spawn_points[self.next_spawn_index % def.spawn_points.len()];
        self.next_spawn_index += 1;
        spawn
    }

    /// Allocates a projectile id.
    pub fn next_projectile_id(&mut self) -> u64 {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        id
    }

    /// Live projectiles owned by one player.
    pub fn owned_projectiles(&self, owner: PlayerKey) -> usize {
        self.projectiles.iter().filter(|p| p.owner == owner).count()
    }

    /// Fresh buff pads with random kinds, all active.
    fn roll_buffs() -> Vec<Buff> {
        buff_spawns()
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Buff {
                id: i as u8,
                x,
                y,
                kind: random_buff_kind(),
                active: true,
                taken_at: 0,
            })
            .collect()
    }

    // -----------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------

    /// The canonical lobby snapshot.
    pub fn lobby_snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            room_code: self.code.clone(),
            state: self.status,
            leader_key: self.leader,
            map_key: self.map_key,
            players: self
                .players
                .values()
                .map(|p| LobbyPlayer {
                    player_key: p.key,
                    name: p.name.clone(),
                    ready: p.ready,
                    leader: p.key == self.leader,
                    connected: !p.disconnected,
                })
                .collect(),
            max_players: MAX_PLAYERS,
        }
    }

    /// Snapshots of every player, for reconnect payloads and the full
    /// state broadcast.
    pub fn player_snapshots(&self, now: u64) -> Vec<PlayerSnapshot> {
        self.players.values().map(|p| p.snapshot(now)).collect()
    }

    /// Remaining match time at `now`.
    pub fn remaining_ms(&self, now: u64) -> u64 {
        if self.status != RoomStatus::Playing || self.match_started_at == 0 {
            return crate::MATCH_DURATION_MS;
        }
        (self.match_started_at + crate::MATCH_DURATION_MS).saturating_sub(now)
    }
}

/// A uniformly random buff kind.
pub(crate) fn random_buff_kind() -> BuffKind {
    const KINDS: [BuffKind; 4] = [
        BuffKind::Health,
        BuffKind::Shield,
        BuffKind::Invisible,
        BuffKind::Speed,
    ];
    *KINDS
        .choose(&mut rand::rng())
        .expect("kind list is non-empty")
}
