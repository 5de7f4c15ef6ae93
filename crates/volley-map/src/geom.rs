//! Collision and angle math used by the simulation.

use crate::{
    MapDef, Obstacle, OCCLUSION_STEP, PLAYER_RADIUS, PROJECTILE_RADIUS,
};

/// Normalizes an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let r = angle.rem_euclid(two_pi);
    if r > std::f64::consts::PI {
        r - two_pi
    } else {
        r
    }
}

/// Whether a player body centred at `(x, y)` intersects `obstacle`.
///
/// Circle kinds pad their radius by the player body; ellipse kinds use
/// padded-containment so the body can't stand with its centre on the
/// waterline.
fn player_hits_obstacle(x: f64, y: f64, obstacle: &Obstacle) -> bool {
    let dx = x - obstacle.x;
    let dy = y - obstacle.y;
    if obstacle.kind.is_solid() {
        let reach = PLAYER_RADIUS + obstacle.w / 2.0;
        dx * dx + dy * dy < reach * reach
    } else {
        let rx = obstacle.w / 2.0 + PLAYER_RADIUS;
        let ry = obstacle.h / 2.0 + PLAYER_RADIUS;
        (dx / rx) * (dx / rx) + (dy / ry) * (dy / ry) <= 1.0
    }
}

/// Whether a player body centred at `(x, y)` intersects any obstacle on
/// the map. Used to reject a candidate position for this tick.
pub fn collides_player(x: f64, y: f64, map: &MapDef) -> bool {
    map.obstacles
        .iter()
        .any(|ob| player_hits_obstacle(x, y, ob))
}

/// Whether the point `(x, y)` is blocked for a projectile.
///
/// Only solid obstacles stop shots; water and chasms are flat, so
/// projectiles fly over them.
pub fn point_blocked(x: f64, y: f64, map: &MapDef) -> bool {
    map.obstacles.iter().any(|ob| {
        if !ob.kind.is_solid() {
            return false;
        }
        let dx = x - ob.x;
        let dy = y - ob.y;
        let reach = ob.w / 2.0 + PROJECTILE_RADIUS;
        dx * dx + dy * dy < reach * reach
    })
}

/// Whether the segment from `(x0, y0)` to `(x1, y1)` passes through a
/// solid obstacle, sampled every [`OCCLUSION_STEP`] pixels.
///
/// Used to reject shots whose claimed muzzle origin sits on the far side
/// of cover from the shooter's body.
pub fn segment_blocked(x0: f64, y0: f64, x1: f64, y1: f64, map: &MapDef) -> bool {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return point_blocked(x0, y0, map);
    }
    let steps = (len / OCCLUSION_STEP).ceil() as u32;
    for i in 0..=steps {
        let t = f64::from(i) / f64::from(steps);
        if point_blocked(x0 + dx * t, y0 + dy * t, map) {
            return true;
        }
    }
    false
}

/// Closest point on the segment `(x0, y0)..(x1, y1)` to `(px, py)`.
///
/// Returns `(t, distance)` where `t ∈ [0, 1]` is the parametric position
/// of the closest point. The swept projectile hit test picks the
/// smallest `t` among candidates so the earliest victim along the path
/// takes the hit.
pub fn closest_point_on_segment(
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    px: f64,
    py: f64,
) -> (f64, f64) {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - x0) * dx + (py - y0) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = x0 + dx * t;
    let cy = y0 + dy * t;
    let dist = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt();
    (t, dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_def;
    use std::f64::consts::PI;
    use volley_protocol::MapKey;

    // =====================================================================
    // normalize_angle
    // =====================================================================

    #[test]
    fn test_normalize_angle_identity_in_range() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!((normalize_angle(1.5) - 1.5).abs() < 1e-12);
        assert!((normalize_angle(-3.0) - -3.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_angle_wraps_past_pi() {
        // π + ε wraps to just past -π.
        let a = normalize_angle(PI + 0.1);
        assert!((a - (-PI + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_angle_pi_stays_pi() {
        // The range is (-π, π]: exactly π is kept, exactly -π flips to π.
        assert!((normalize_angle(PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_angle_large_values() {
        let a = normalize_angle(7.0 * PI + 0.25);
        assert!((a - (-PI + 0.25)).abs() < 1e-9);
        assert!(a > -PI && a <= PI);
    }

    // =====================================================================
    // Obstacle tests
    // =====================================================================

    #[test]
    fn test_collides_player_circle_padding() {
        // Forest tree at (450, 420) with diameter 90: player radius 18
        // collides within 63 of the centre.
        let map = map_def(MapKey::Forest);
        assert!(collides_player(450.0, 420.0, map));
        assert!(collides_player(450.0 + 62.0, 420.0, map));
        assert!(!collides_player(450.0 + 64.0, 420.0, map));
    }

    #[test]
    fn test_collides_player_ellipse_containment() {
        // Forest pond at (1300, 1200), 340×220: padded semi-axes are
        // 188 and 128.
        let map = map_def(MapKey::Forest);
        assert!(collides_player(1300.0, 1200.0, map));
        assert!(collides_player(1300.0 + 180.0, 1200.0, map));
        assert!(!collides_player(1300.0 + 195.0, 1200.0, map));
        assert!(!collides_player(1300.0, 1200.0 + 135.0, map));
    }

    #[test]
    fn test_point_blocked_ignores_water() {
        let map = map_def(MapKey::Forest);
        // Centre of the pond: blocks players, not projectiles.
        assert!(collides_player(1300.0, 1200.0, map));
        assert!(!point_blocked(1300.0, 1200.0, map));
    }

    #[test]
    fn test_point_blocked_by_solid() {
        let map = map_def(MapKey::Forest);
        // Tree at (450, 420), diameter 90: projectile reach is 48.
        assert!(point_blocked(450.0, 420.0, map));
        assert!(point_blocked(450.0 + 47.0, 420.0, map));
        assert!(!point_blocked(450.0 + 50.0, 420.0, map));
    }

    #[test]
    fn test_segment_blocked_through_tree() {
        let map = map_def(MapKey::Forest);
        // Horizontal segment straight through the (450, 420) tree.
        assert!(segment_blocked(300.0, 420.0, 600.0, 420.0, map));
        // Parallel segment far above it.
        assert!(!segment_blocked(300.0, 100.0, 600.0, 100.0, map));
    }

    #[test]
    fn test_segment_blocked_degenerate_segment() {
        let map = map_def(MapKey::Forest);
        assert!(segment_blocked(450.0, 420.0, 450.0, 420.0, map));
        assert!(!segment_blocked(100.0, 100.0, 100.0, 100.0, map));
    }

    // =====================================================================
    // closest_point_on_segment
    // =====================================================================

    #[test]
    fn test_closest_point_interior() {
        let (t, dist) =
            closest_point_on_segment(0.0, 0.0, 10.0, 0.0, 5.0, 3.0);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((dist - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_clamps_to_endpoints() {
        let (t, dist) =
            closest_point_on_segment(0.0, 0.0, 10.0, 0.0, -4.0, 0.0);
        assert_eq!(t, 0.0);
        assert!((dist - 4.0).abs() < 1e-12);

        let (t, dist) =
            closest_point_on_segment(0.0, 0.0, 10.0, 0.0, 13.0, 4.0);
        assert_eq!(t, 1.0);
        assert!((dist - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_zero_length_segment() {
        let (t, dist) =
            closest_point_on_segment(2.0, 2.0, 2.0, 2.0, 5.0, 6.0);
        assert_eq!(t, 0.0);
        assert!((dist - 5.0).abs() < 1e-12);
    }
}
