//! The three playable maps and their fixed layouts.
//!
//! Obstacles come in two families: solid circles (trees, rocks, cacti)
//! that block both players and projectiles, and flat ellipses (lakes,
//! ponds, chasms) that block player movement but let projectiles pass
//! over. Spawn points are consumed round-robin by the room; buff spawn
//! points are shared by all maps so pickup timings stay comparable
//! across rotations.

use serde::{Deserialize, Serialize};
use volley_protocol::MapKey;

/// Obstacle families. `w` is the diameter for the circle kinds and the
/// full width for the ellipse kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleKind {
    Tree,
    Rock,
    Cactus,
    Lake,
    Pond,
    Chasm,
}

impl ObstacleKind {
    /// Solid obstacles block projectiles; flat ones only block movement.
    pub fn is_solid(&self) -> bool {
        matches!(
            self,
            ObstacleKind::Tree | ObstacleKind::Rock | ObstacleKind::Cactus
        )
    }
}

/// One placed obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Obstacle {
    const fn circle(kind: ObstacleKind, x: f64, y: f64, d: f64) -> Self {
        Self { kind, x, y, w: d, h: d }
    }

    const fn ellipse(kind: ObstacleKind, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { kind, x, y, w, h }
    }
}

/// A complete static map definition.
#[derive(Debug, Clone, Copy)]
pub struct MapDef {
    pub key: MapKey,
    pub obstacles: &'static [Obstacle],
    pub spawn_points: &'static [(f64, f64)],
}

use ObstacleKind::{Cactus, Chasm, Lake, Pond, Rock, Tree};

// Spawns ring the playfield so round-robin respawning never drops two
// players on top of each other.
const SPAWNS_RING: [(f64, f64); 10] = [
    (200.0, 200.0),
    (1500.0, 150.0),
    (2800.0, 200.0),
    (2850.0, 1000.0),
    (2800.0, 1800.0),
    (1500.0, 1850.0),
    (200.0, 1800.0),
    (150.0, 1000.0),
    (1000.0, 1000.0),
    (2000.0, 1000.0),
];

const SPAWNS_LANES: [(f64, f64); 10] = [
    (250.0, 300.0),
    (250.0, 1700.0),
    (2750.0, 300.0),
    (2750.0, 1700.0),
    (1500.0, 250.0),
    (1500.0, 1750.0),
    (700.0, 1000.0),
    (2300.0, 1000.0),
    (1100.0, 550.0),
    (1900.0, 1450.0),
];

const FOREST_OBSTACLES: [Obstacle; 16] = [
    Obstacle::circle(Tree, 450.0, 420.0, 90.0),
    Obstacle::circle(Tree, 620.0, 1480.0, 110.0),
    Obstacle::circle(Tree, 1180.0, 760.0, 95.0),
    Obstacle::circle(Tree, 1420.0, 1540.0, 85.0),
    Obstacle::circle(Tree, 1860.0, 380.0, 100.0),
    Obstacle::circle(Tree, 2120.0, 1180.0, 90.0),
    Obstacle::circle(Tree, 2560.0, 640.0, 105.0),
    Obstacle::circle(Tree, 2480.0, 1620.0, 95.0),
    Obstacle::circle(Rock, 900.0, 260.0, 70.0),
    Obstacle::circle(Rock, 780.0, 1060.0, 80.0),
    Obstacle::circle(Rock, 1680.0, 980.0, 75.0),
    Obstacle::circle(Rock, 2320.0, 300.0, 65.0),
    Obstacle::ellipse(Pond, 1300.0, 1200.0, 340.0, 220.0),
    Obstacle::ellipse(Pond, 2650.0, 1150.0, 260.0, 180.0),
    Obstacle::ellipse(Lake, 520.0, 780.0, 420.0, 300.0),
    Obstacle::circle(Tree, 1950.0, 1740.0, 90.0),
];

const CANYON_OBSTACLES: [Obstacle; 15] = [
    Obstacle::circle(Rock, 380.0, 520.0, 120.0),
    Obstacle::circle(Rock, 560.0, 1440.0, 140.0),
    Obstacle::circle(Rock, 1040.0, 340.0, 110.0),
    Obstacle::circle(Rock, 1260.0, 1060.0, 130.0),
    Obstacle::circle(Rock, 1600.0, 1620.0, 115.0),
    Obstacle::circle(Rock, 1980.0, 540.0, 125.0),
    Obstacle::circle(Rock, 2260.0, 1340.0, 135.0),
    Obstacle::circle(Rock, 2640.0, 820.0, 120.0),
    Obstacle::circle(Cactus, 820.0, 820.0, 55.0),
    Obstacle::circle(Cactus, 1700.0, 260.0, 50.0),
    Obstacle::circle(Cactus, 2060.0, 1700.0, 55.0),
    Obstacle::circle(Cactus, 2520.0, 320.0, 50.0),
    Obstacle::ellipse(Chasm, 1500.0, 1000.0, 520.0, 240.0),
    Obstacle::ellipse(Chasm, 620.0, 260.0, 300.0, 160.0),
    Obstacle::ellipse(Chasm, 2480.0, 1760.0, 360.0, 180.0),
];

const ISLAND_OBSTACLES: [Obstacle; 15] = [
    Obstacle::ellipse(Lake, 480.0, 420.0, 400.0, 280.0),
    Obstacle::ellipse(Lake, 2560.0, 1600.0, 480.0, 320.0),
    Obstacle::ellipse(Pond, 1520.0, 420.0, 280.0, 180.0),
    Obstacle::ellipse(Pond, 1040.0, 1560.0, 300.0, 200.0),
    Obstacle::circle(Tree, 900.0, 900.0, 95.0),
    Obstacle::circle(Tree, 1340.0, 1120.0, 100.0),
    Obstacle::circle(Tree, 2080.0, 880.0, 90.0),
    Obstacle::circle(Tree, 2620.0, 480.0, 95.0),
    Obstacle::circle(Tree, 1900.0, 1600.0, 85.0),
    Obstacle::circle(Rock, 440.0, 1280.0, 75.0),
    Obstacle::circle(Rock, 1180.0, 260.0, 70.0),
    Obstacle::circle(Rock, 1720.0, 780.0, 80.0),
    Obstacle::circle(Rock, 2280.0, 240.0, 70.0),
    Obstacle::circle(Rock, 2780.0, 1060.0, 75.0),
    Obstacle::circle(Cactus, 640.0, 1720.0, 50.0),
];

static FOREST: MapDef = MapDef {
    key: MapKey::Forest,
    obstacles: &FOREST_OBSTACLES,
    spawn_points: &SPAWNS_RING,
};

static CANYON: MapDef = MapDef {
    key: MapKey::Canyon,
    obstacles: &CANYON_OBSTACLES,
    spawn_points: &SPAWNS_LANES,
};

static ISLAND: MapDef = MapDef {
    key: MapKey::Island,
    obstacles: &ISLAND_OBSTACLES,
    spawn_points: &SPAWNS_RING,
};

/// Looks up the static definition for a map.
pub fn map_def(key: MapKey) -> &'static MapDef {
    match key {
        MapKey::Forest => &FOREST,
        MapKey::Canyon => &CANYON,
        MapKey::Island => &ISLAND,
    }
}

/// The six fixed buff spawn points, shared by every map.
pub fn buff_spawns() -> &'static [(f64, f64); 6] {
    &BUFF_SPAWNS
}

const BUFF_SPAWNS: [(f64, f64); 6] = [
    (750.0, 500.0),
    (2250.0, 500.0),
    (1500.0, 700.0),
    (1500.0, 1300.0),
    (750.0, 1500.0),
    (2250.0, 1500.0),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collides_player, EDGE_MARGIN, MAP_HEIGHT, MAP_WIDTH};

    #[test]
    fn test_every_map_resolves() {
        for key in MapKey::ALL {
            let def = map_def(key);
            assert_eq!(def.key, key);
            assert!(!def.obstacles.is_empty());
            assert_eq!(def.spawn_points.len(), 10);
        }
    }

    #[test]
    fn test_spawn_points_inside_playfield() {
        for key in MapKey::ALL {
            for &(x, y) in map_def(key).spawn_points {
                assert!(x > EDGE_MARGIN && x < MAP_WIDTH - EDGE_MARGIN);
                assert!(y > EDGE_MARGIN && y < MAP_HEIGHT - EDGE_MARGIN);
            }
        }
    }

    #[test]
    fn test_spawn_points_never_inside_obstacles() {
        // A round-robin respawn must always land on free ground.
        for key in MapKey::ALL {
            let def = map_def(key);
            for &(x, y) in def.spawn_points {
                assert!(
                    !collides_player(x, y, def),
                    "spawn ({x}, {y}) collides on {key}"
                );
            }
        }
    }

    #[test]
    fn test_buff_spawns_never_inside_obstacles() {
        for key in MapKey::ALL {
            let def = map_def(key);
            for &(x, y) in buff_spawns() {
                assert!(
                    !collides_player(x, y, def),
                    "buff spawn ({x}, {y}) collides on {key}"
                );
            }
        }
    }

    #[test]
    fn test_obstacles_inside_playfield() {
        for key in MapKey::ALL {
            for ob in map_def(key).obstacles {
                assert!(ob.x > 0.0 && ob.x < MAP_WIDTH);
                assert!(ob.y > 0.0 && ob.y < MAP_HEIGHT);
                assert!(ob.w > 0.0 && ob.h > 0.0);
            }
        }
    }

    #[test]
    fn test_solid_classification() {
        assert!(ObstacleKind::Tree.is_solid());
        assert!(ObstacleKind::Rock.is_solid());
        assert!(ObstacleKind::Cactus.is_solid());
        assert!(!ObstacleKind::Lake.is_solid());
        assert!(!ObstacleKind::Pond.is_solid());
        assert!(!ObstacleKind::Chasm.is_solid());
    }
}
