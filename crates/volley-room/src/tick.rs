//! One simulation step for one room.
//!
//! Order within a tick: countdown promotion, players (respawn, buff
//! expiry, motion, pickups), projectiles (integrate, cull, hit tests),
//! buff respawns, state broadcast, match end. The caller delivers the
//! returned events and settles an ended match against the process-wide
//! stores (result buffer, reward flags).

use volley_map::{
    closest_point_on_segment, collides_player, map_def, point_blocked,
    EDGE_MARGIN, HEADSHOT_RADIUS, HIT_RADIUS, MAP_HEIGHT, MAP_WIDTH,
    PROJECTILE_TIP_OFFSET,
};
use volley_protocol::{
    BuffKind, HitKind, KillStat, KillTier, MatchResults, PersistentId,
    PlayerKey, PlayerResult, RoomStatus, ServerEvent,
};

use crate::room::random_buff_kind;
use crate::{
    Outbound, Room, SyncState, BASE_MAX_HP, BASE_SPEED, BUFF_DURATION_MS,
    BUFF_PICKUP_RADIUS, BUFF_RESPAWN_MS, CHARGING_MULT, COUNTDOWN_MS,
    EXTRA_CORE_MAX_HP, KILL_CHAIN_WINDOW_MS, MATCH_DURATION_MS,
    PROJECTILE_MAX_AGE, RESPAWN_DELAY_MS, SPEED_BOOST_MULT,
};

/// How one player's reward flag should settle after the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardOutcome {
    pub persistent_id: PersistentId,
    /// Charges were granted at match start.
    pub granted: bool,
    /// At least one charge was consumed during the match.
    pub consumed_any: bool,
}

/// Everything the server needs to settle a finished match.
#[derive(Debug, Clone)]
pub struct MatchEndReport {
    pub results: MatchResults,
    pub rewards: Vec<RewardOutcome>,
    /// Disconnected members dropped at match end.
    pub removed_players: Vec<PersistentId>,
    /// True when nobody remained; the caller deletes the room.
    pub room_emptied: bool,
    /// Per-room abuse aggregate for the room-snapshots audit stream.
    pub abuse_snapshot: serde_json::Value,
}

/// Result of advancing a room by one tick.
#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<Outbound>,
    pub ended: Option<MatchEndReport>,
}

/// Advances one room by `dt` seconds of simulation at wall time `now`.
pub fn advance_room(
    room: &mut Room,
    now: u64,
    dt: f64,
    snapshot_interval_ms: u64,
) -> TickOutput {
    let mut out = TickOutput::default();

    if room.status == RoomStatus::Starting {
        if now.saturating_sub(room.starting_since) < COUNTDOWN_MS {
            return out;
        }
        room.promote_to_playing(now);
        let map_key = room.map_key.expect("starting room has a map");
        out.events.push(Outbound::room(
            room.code.clone(),
            ServerEvent::GameStarted {
                map_key,
                started_at: now,
                match_duration_ms: MATCH_DURATION_MS,
            },
        ));
    }
    if room.status != RoomStatus::Playing {
        return out;
    }

    step_players(room, now, dt, &mut out.events);
    step_projectiles(room, now, dt, &mut out.events);
    respawn_buffs(room, now, &mut out.events);

    let players = room.player_snapshots(now);
    let update =
        SyncState::build_update(players, room, now, snapshot_interval_ms);
    out.events.push(Outbound::room(
        room.code.clone(),
        ServerEvent::StateUpdate(update),
    ));

    if now.saturating_sub(room.match_started_at) >= MATCH_DURATION_MS {
        out.ended = Some(end_match(room, now, &mut out.events));
    }

    out
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

fn step_players(room: &mut Room, now: u64, dt: f64, events: &mut Vec<Outbound>) {
    let map = map_def(room.map_key.expect("playing room has a map"));
    let keys: Vec<PlayerKey> = room.players().map(|p| p.key).collect();

    for key in keys {
        // Scheduled respawn for deaths that didn't consume an
        // instant-respawn charge.
        let due = {
            let Some(p) = room.player(key) else { continue };
            !p.alive()
                && p.died_at > 0
                && now.saturating_sub(p.died_at) >= RESPAWN_DELAY_MS
        };
        if due {
            respawn_player(room, key, now, events);
            continue;
        }

        let Some(player) = room.player_mut(key) else { continue };
        if !player.alive() {
            continue;
        }
        player.expire_buffs(now);
        if player.disconnected {
            continue;
        }

        // Facing and charge flag follow the latest validated input.
        player.angle = player.input.angle;
        player.charging = player.input.charging;

        let input = player.input;
        let dx = (input.d as i8 - input.a as i8) as f64;
        let dy = (input.s as i8 - input.w as i8) as f64;
        if dx != 0.0 || dy != 0.0 {
            let mut speed = BASE_SPEED;
            if player.has_speed_boost(now) {
                speed *= SPEED_BOOST_MULT;
            }
            if player.charging {
                speed *= CHARGING_MULT;
            }
            let len = (dx * dx + dy * dy).sqrt();
            let step = speed * dt;
            let nx = (player.x + dx / len * step)
                .clamp(EDGE_MARGIN, MAP_WIDTH - EDGE_MARGIN);
            let ny = (player.y + dy / len * step)
                .clamp(EDGE_MARGIN, MAP_HEIGHT - EDGE_MARGIN);
            if !collides_player(nx, ny, map) {
                player.x = nx;
                player.y = ny;
            }
        }

        pick_up_buffs(room, key, now, events);
    }
}

fn pick_up_buffs(room: &mut Room, key: PlayerKey, now: u64, events: &mut Vec<Outbound>) {
    let (px, py) = {
        let Some(p) = room.player(key) else { return };
        (p.x, p.y)
    };
    let code = room.code.clone();

    for i in 0..room.buffs.len() {
        let buff = room.buffs[i];
        if !buff.active {
            continue;
        }
        let dx = px - buff.x;
        let dy = py - buff.y;
        if dx * dx + dy * dy > BUFF_PICKUP_RADIUS * BUFF_PICKUP_RADIUS {
            continue;
        }

        room.buffs[i].active = false;
        room.buffs[i].taken_at = now;
        let player = room.player_mut(key).expect("resolved above");
        match buff.kind {
            BuffKind::Health => {
                player.hp = (player.hp + 1).min(player.max_hp);
            }
            BuffKind::Shield => player.shield_until = now + BUFF_DURATION_MS,
            BuffKind::Invisible => {
                player.invisible_until = now + BUFF_DURATION_MS;
            }
            BuffKind::Speed => player.speed_until = now + BUFF_DURATION_MS,
        }
        events.push(Outbound::room(
            code.clone(),
            ServerEvent::BuffPickup {
                buff_id: buff.id,
                player_key: key,
                kind: buff.kind,
            },
        ));
    }
}

// ---------------------------------------------------------------------------
// Projectiles
// ---------------------------------------------------------------------------

fn step_projectiles(room: &mut Room, now: u64, dt: f64, events: &mut Vec<Outbound>) {
    let map = map_def(room.map_key.expect("playing room has a map"));
    let code = room.code.clone();

    let projectiles = std::mem::take(&mut room.projectiles);
    let mut remaining = Vec::with_capacity(projectiles.len());

    'projectiles: for mut p in projectiles {
        let prev = (p.x, p.y);
        p.x += p.vx * dt;
        p.y += p.vy * dt;
        p.age += dt;

        if p.age > PROJECTILE_MAX_AGE
            || p.x < 0.0
            || p.x > MAP_WIDTH
            || p.y < 0.0
            || p.y > MAP_HEIGHT
        {
            continue;
        }

        if point_blocked(p.x, p.y, map) {
            events.push(Outbound::room(
                code.clone(),
                ServerEvent::HitEffect {
                    x: p.x,
                    y: p.y,
                    kind: HitKind::Map,
                    target: None,
                    headshot: false,
                    projectile_id: p.id,
                },
            ));
            continue;
        }

        // Swept hit test: the tip leads the tracked position by a fixed
        // offset; the earliest victim along the sweep takes the hit.
        let speed = (p.vx * p.vx + p.vy * p.vy).sqrt();
        let (tip_dx, tip_dy) = if speed > 0.0 {
            (
                p.vx / speed * PROJECTILE_TIP_OFFSET,
                p.vy / speed * PROJECTILE_TIP_OFFSET,
            )
        } else {
            (0.0, 0.0)
        };
        let (x0, y0) = (prev.0 + tip_dx, prev.1 + tip_dy);
        let (x1, y1) = (p.x + tip_dx, p.y + tip_dy);

        let mut best: Option<(PlayerKey, f64, f64)> = None;
        for enemy in room.players() {
            if enemy.key == p.owner || !enemy.alive() {
                continue;
            }
            let (t, dist) =
                closest_point_on_segment(x0, y0, x1, y1, enemy.x, enemy.y);
            if dist > HIT_RADIUS {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, bt, bd)) => t < bt || (t == bt && dist < bd),
            };
            if better {
                best = Some((enemy.key, t, dist));
            }
        }

        if let Some((victim_key, t, dist)) = best {
            let hit_x = x0 + (x1 - x0) * t;
            let hit_y = y0 + (y1 - y0) * t;
            let shielded = room
                .player(victim_key)
                .map(|v| v.has_shield(now))
                .unwrap_or(false);

            if shielded {
                let victim = room
                    .player_mut(victim_key)
                    .expect("victim resolved above");
                victim.shield_until = 0;
                events.push(Outbound::room(
                    code.clone(),
                    ServerEvent::HitEffect {
                        x: hit_x,
                        y: hit_y,
                        kind: HitKind::Shield,
                        target: Some(victim_key),
                        headshot: false,
                        projectile_id: p.id,
                    },
                ));
                events.push(Outbound::room(
                    code.clone(),
                    ServerEvent::ShieldBreak { player_key: victim_key },
                ));
                continue 'projectiles;
            }

            let headshot = dist <= HEADSHOT_RADIUS;
            {
                let victim = room
                    .player_mut(victim_key)
                    .expect("victim resolved above");
                if headshot {
                    victim.hp = 0;
                } else {
                    victim.hp = victim.hp.saturating_sub(1);
                }
            }
            events.push(Outbound::room(
                code.clone(),
                ServerEvent::HitEffect {
                    x: hit_x,
                    y: hit_y,
                    kind: HitKind::Player,
                    target: Some(victim_key),
                    headshot,
                    projectile_id: p.id,
                },
            ));

            let died = room
                .player(victim_key)
                .map(|v| !v.alive())
                .unwrap_or(false);
            if died {
                handle_kill(room, p.owner, victim_key, headshot, now, events);
            }
            continue;
        }

        remaining.push(p);
    }

    room.projectiles = remaining;
}

// ---------------------------------------------------------------------------
// Kills and respawns
// ---------------------------------------------------------------------------

fn kill_tier(streak: u32) -> Option<KillTier> {
    match streak {
        3 => Some(KillTier::ExtraCore),
        5 => Some(KillTier::Momentum),
        7 => Some(KillTier::FastCharge),
        9 => Some(KillTier::SteadyAim),
        12 => Some(KillTier::Legendary),
        _ => None,
    }
}

fn kill_stat(room: &Room, key: PlayerKey) -> KillStat {
    let p = room.player(key).expect("kill participant exists");
    KillStat {
        player_key: p.key,
        name: p.name.clone(),
        kills: p.kills,
        deaths: p.deaths,
        killstreak: p.killstreak,
    }
}

fn handle_kill(
    room: &mut Room,
    killer_key: PlayerKey,
    victim_key: PlayerKey,
    headshot: bool,
    now: u64,
    events: &mut Vec<Outbound>,
) {
    let code = room.code.clone();

    let streak = {
        let Some(killer) = room.player_mut(killer_key) else { return };
        killer.kills += 1;
        killer.killstreak += 1;
        killer.best_killstreak = killer.best_killstreak.max(killer.killstreak);
        killer.killstreak
    };

    let tier = kill_tier(streak);
    if tier == Some(KillTier::ExtraCore) {
        let killer = room.player_mut(killer_key).expect("killer exists");
        killer.max_hp = EXTRA_CORE_MAX_HP;
        killer.hp = (killer.hp + 1).min(killer.max_hp);
    }

    {
        let Some(victim) = room.player_mut(victim_key) else { return };
        victim.deaths += 1;
        victim.killstreak = 0;
        victim.hp = 0;
        victim.clear_buffs();
        victim.charging = false;
        victim.charge_started_at = 0;
        victim.died_at = now;
    }

    let chain = room.kill_chains.entry(killer_key).or_default();
    if now.saturating_sub(chain.last_kill_at) <= KILL_CHAIN_WINDOW_MS
        && chain.count > 0
    {
        chain.count += 1;
    } else {
        chain.count = 1;
    }
    chain.last_kill_at = now;
    let chain_count = chain.count;

    events.push(Outbound::room(
        code,
        ServerEvent::PlayerKilled {
            victim: kill_stat(room, victim_key),
            killer: kill_stat(room, killer_key),
            chain_count,
            tier,
            headshot,
        },
    ));

    // An instant-respawn charge skips the respawn delay entirely.
    let remaining = {
        let victim = room.player_mut(victim_key).expect("victim exists");
        if victim.instant_respawns_left > 0 {
            victim.instant_respawns_left -= 1;
            Some(victim.instant_respawns_left)
        } else {
            None
        }
    };
    if let Some(remaining) = remaining {
        respawn_player(room, victim_key, now, events);
        events.push(Outbound::room(
            room.code.clone(),
            ServerEvent::InstantRespawnUsed {
                player_key: victim_key,
                remaining,
            },
        ));
    }

    tracing::debug!(
        room = %room.code,
        killer = %killer_key,
        victim = %victim_key,
        streak,
        headshot,
        "kill"
    );
}

fn respawn_player(
    room: &mut Room,
    key: PlayerKey,
    _now: u64,
    events: &mut Vec<Outbound>,
) {
    let map = map_def(room.map_key.expect("playing room has a map"));
    let (x, y) = room.next_spawn(map);
    let code = room.code.clone();

    let Some(player) = room.player_mut(key) else { return };
    player.x = x;
    player.y = y;
    player.hp = BASE_MAX_HP;
    player.max_hp = BASE_MAX_HP;
    player.clear_buffs();
    player.charging = false;
    player.charge_started_at = 0;
    player.last_shot_at = 0;
    player.died_at = 0;
    player.reset_input_keep_seq();

    events.push(Outbound::room(
        code,
        ServerEvent::PlayerRespawn {
            player_key: key,
            x,
            y,
            hp: BASE_MAX_HP,
            max_hp: BASE_MAX_HP,
        },
    ));
}

// ---------------------------------------------------------------------------
// Buffs
// ---------------------------------------------------------------------------

fn respawn_buffs(room: &mut Room, now: u64, events: &mut Vec<Outbound>) {
    let code = room.code.clone();
    for buff in &mut room.buffs {
        if buff.active || now.saturating_sub(buff.taken_at) < BUFF_RESPAWN_MS {
            continue;
        }
        buff.kind = random_buff_kind();
        buff.active = true;
        events.push(Outbound::room(
            code.clone(),
            ServerEvent::BuffRespawn { buff: buff.snapshot() },
        ));
    }
}

// ---------------------------------------------------------------------------
// Match end
// ---------------------------------------------------------------------------

fn end_match(room: &mut Room, now: u64, events: &mut Vec<Outbound>) -> MatchEndReport {
    let results = MatchResults {
        room_code: room.code.clone(),
        ended_at: now,
        players: room
            .players()
            .map(|p| PlayerResult {
                player_key: p.key,
                name: p.name.clone(),
                kills: p.kills,
                deaths: p.deaths,
                best_killstreak: p.best_killstreak,
            })
            .collect(),
    };

    let rewards: Vec<RewardOutcome> = room
        .players()
        .map(|p| RewardOutcome {
            persistent_id: p.persistent_id.clone(),
            granted: p.instant_respawns_granted > 0,
            consumed_any: p.instant_respawns_left < p.instant_respawns_granted,
        })
        .collect();

    let abuse_snapshot = room.abuse.snapshot(room.code.as_str(), now);

    // Disconnected members are only preserved for the duration of the
    // match; drop them now.
    let gone: Vec<PlayerKey> = room
        .players()
        .filter(|p| p.disconnected)
        .map(|p| p.key)
        .collect();
    let mut removed_players = Vec::with_capacity(gone.len());
    for key in gone {
        if let Some(p) = room.player(key) {
            removed_players.push(p.persistent_id.clone());
        }
        room.remove_player(key);
    }

    room.status = RoomStatus::Lobby;
    room.projectiles.clear();
    room.buffs.clear();
    room.kill_chains.clear();
    room.last_results =
        Some((results.clone(), std::collections::HashSet::new()));
    let leader = room.leader;
    for player in room.players_mut() {
        player.ready = player.key == leader;
    }

    events.push(Outbound::room(
        room.code.clone(),
        ServerEvent::GameEnd { results: results.clone() },
    ));
    if !room.is_empty() {
        events.push(Outbound::room(
            room.code.clone(),
            ServerEvent::LobbyUpdate { lobby: room.lobby_snapshot() },
        ));
    }

    tracing::info!(room = %room.code, players = room.len(), "match ended");

    MatchEndReport {
        results,
        rewards,
        removed_players,
        room_emptied: room.is_empty(),
        abuse_snapshot,
    }
}
