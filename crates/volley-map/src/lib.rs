//! Static map geometry and the collision kernel.
//!
//! Three maps share one playfield size and one buff-spawn layout; they
//! differ in obstacle placement and player spawn points. The geometry
//! functions here are pure — no clocks, no I/O — so the simulation layer
//! can call them from the tick loop and tests can call them directly.

mod catalog;
mod geom;

pub use catalog::{buff_spawns, map_def, MapDef, Obstacle, ObstacleKind};
pub use geom::{
    closest_point_on_segment, collides_player, normalize_angle,
    point_blocked, segment_blocked,
};

/// Playfield width in pixels.
pub const MAP_WIDTH: f64 = 3000.0;
/// Playfield height in pixels.
pub const MAP_HEIGHT: f64 = 2000.0;
/// Player body radius.
pub const PLAYER_RADIUS: f64 = 18.0;
/// Projectile radius.
pub const PROJECTILE_RADIUS: f64 = 3.0;
/// Distance within which a projectile registers a body hit.
pub const HIT_RADIUS: f64 = 21.0;
/// Distance within which a hit counts as a headshot: head visual 8 +
/// projectile 3 + jitter tolerance 5.
pub const HEADSHOT_RADIUS: f64 = 16.0;
/// Players are clamped this far inside the playfield edges.
pub const EDGE_MARGIN: f64 = 20.0;
/// Sampling step for segment occlusion tests.
pub const OCCLUSION_STEP: f64 = 6.0;
/// Muzzle offset from the shooter's centre along the firing direction.
pub const MUZZLE_OFFSET: f64 = 25.0;
/// Forward offset of a projectile's tip from its tracked position.
pub const PROJECTILE_TIP_OFFSET: f64 = 6.0;
