//! Portal-aware ray casting
//!
//! A hitscan is a half-line: only intersections ahead of the origin along
//! `direction` count. Inside one polygon the candidates are the floor plane,
//! the ceiling plane and one vertical plane per edge; the nearest wins. A wall
//! hit on a portal whose opening spans the hit height continues into the
//! neighbour from the hit point.

use std::collections::BTreeSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{EdgeId, LevelView, PolygonId};
use crate::consts::GEOM_EPSILON;

/// Surface type struck by a hitscan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    Wall,
    Floor,
    Ceiling,
}

/// Where a hitscan stopped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub kind: HitKind,
    pub position: Vec3,
    pub polygon: PolygonId,
    /// Edge struck, for wall hits
    pub edge: Option<EdgeId>,
}

/// Nearest candidate so far, by squared distance from the origin
struct Nearest {
    origin: Vec3,
    best: Option<(f32, Hit)>,
}

impl Nearest {
    fn new(origin: Vec3) -> Self {
        Self { origin, best: None }
    }

    fn offer(&mut self, hit: Hit) {
        let dist_sq = hit.position.distance_squared(self.origin);
        if !dist_sq.is_finite() {
            return;
        }
        // Ties keep the earlier candidate
        if self.best.is_none_or(|(best, _)| dist_sq < best) {
            self.best = Some((dist_sq, hit));
        }
    }

    fn into_hit(self) -> Option<Hit> {
        self.best.map(|(_, hit)| hit)
    }
}

/// Parameter along the ray where it meets the horizontal plane `z = height`
fn horizontal_plane_t(origin: Vec3, direction: Vec3, height: f32) -> Option<f32> {
    if direction.z == 0.0 {
        return None;
    }
    let t = (height - origin.z) / direction.z;
    t.is_finite().then_some(t)
}

impl LevelView<'_> {
    /// Cast a half-line inside a single polygon, ignoring portals
    pub fn hitscan_polygon(&self, polygon: PolygonId, origin: Vec3, direction: Vec3) -> Option<Hit> {
        let level = self.level();
        let floor = self.floor_height(polygon);
        let ceil = self.ceil_height(polygon);
        // Intersections closer than this are the surface the ray starts on
        let min_t = GEOM_EPSILON / direction.length();
        let mut nearest = Nearest::new(origin);

        for (kind, height) in [(HitKind::Floor, floor), (HitKind::Ceiling, ceil)] {
            let Some(t) = horizontal_plane_t(origin, direction, height) else {
                continue;
            };
            if t <= min_t {
                continue;
            }
            let mut position = origin + direction * t;
            position.z = height;
            if level.point_in_polygon(polygon, position.truncate()) {
                nearest.offer(Hit {
                    kind,
                    position,
                    polygon,
                    edge: None,
                });
            }
        }

        for edge in level.edges_of(polygon) {
            let normal = edge.normal().extend(0.0);
            // Only walls the ray is leaving through; entering faces lie beyond an exit
            let denom = direction.dot(normal);
            if denom <= 0.0 {
                continue;
            }
            let t = (edge.start().extend(origin.z) - origin).dot(normal) / denom;
            if !t.is_finite() || t <= min_t {
                continue;
            }
            let position = origin + direction * t;
            if position.z < floor - GEOM_EPSILON || position.z > ceil + GEOM_EPSILON {
                continue;
            }
            if !within_segment(position.truncate(), edge.start(), edge.end()) {
                continue;
            }
            nearest.offer(Hit {
                kind: HitKind::Wall,
                position,
                polygon,
                edge: Some(edge.id),
            });
        }

        nearest.into_hit()
    }

    /// Cast a half-line from `origin` in `start`, following portals
    pub fn hitscan(&self, start: PolygonId, origin: Vec3, direction: Vec3) -> Option<Hit> {
        let level = self.level();
        let mut crossed = BTreeSet::new();
        let mut hit = self.hitscan_polygon(start, origin, direction)?;

        loop {
            let (HitKind::Wall, Some(edge_id)) = (hit.kind, hit.edge) else {
                return Some(hit);
            };
            let Some(back) = level.edge(edge_id).back_polygon else {
                return Some(hit);
            };
            let z = hit.position.z;
            if z <= self.floor_height(back) || z >= self.ceil_height(back) {
                return Some(hit);
            }
            // Fail closed on a portal already crossed: report the wall
            if !crossed.insert(edge_id) {
                log::warn!("hitscan re-entered portal edge {:?}, stopping", edge_id);
                return Some(hit);
            }
            match self.hitscan_polygon(back, hit.position, direction) {
                Some(next) => hit = next,
                None => {
                    log::debug!("hitscan lost past portal edge {:?} into {}", edge_id, back);
                    return Some(hit);
                }
            }
        }
    }
}

/// Whether a point already on the edge's line falls between its endpoints
fn within_segment(p: Vec2, a: Vec2, b: Vec2) -> bool {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let slack = GEOM_EPSILON / len_sq.sqrt();
    let s = (p - a).dot(ab) / len_sq;
    s >= -slack && s <= 1.0 + slack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::format::{EdgeData, LevelData, PolygonData};
    use crate::level::{Level, Overlay, reference_level};

    fn assert_hit(hit: Option<Hit>, kind: HitKind, position: Vec3) -> Hit {
        let hit = hit.expect("expected a hit");
        assert_eq!(hit.kind, kind);
        assert!(
            hit.position.distance(position) < 1e-3,
            "hit at {:?}, expected {:?}",
            hit.position,
            position
        );
        hit
    }

    #[test]
    fn test_hitscan_south_wall() {
        let level = reference_level();
        let hit = level.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, -1.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(0.0, -64.0, 48.0));
        assert_eq!(hit.polygon, PolygonId(0));
        assert_eq!(hit.edge, Some(level.edges_of(PolygonId(0))[0].id));
    }

    #[test]
    fn test_hitscan_north_through_portals() {
        let level = reference_level();
        let hit = level.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, 1.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(0.0, 768.0, 48.0));
        assert_eq!(hit.polygon, PolygonId(4));
        let edge = level.edge(hit.edge.unwrap());
        assert!(edge.back_polygon.is_none());
    }

    #[test]
    fn test_hitscan_floor() {
        let level = reference_level();
        let hit = level.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, 1.0, -1.0));
        let hit = assert_hit(hit, HitKind::Floor, Vec3::new(0.0, 48.0, 0.0));
        assert_eq!(hit.edge, None);
    }

    #[test]
    fn test_hitscan_ceiling_past_portal() {
        let level = reference_level();
        let hit = level.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, 1.0, 1.0));
        let hit = assert_hit(hit, HitKind::Ceiling, Vec3::new(0.0, 80.0, 128.0));
        assert_eq!(hit.polygon, PolygonId(1));
    }

    #[test]
    fn test_hitscan_outside_geometry() {
        let level = reference_level();
        let hit = level.hitscan(PolygonId(0), Vec3::new(0.0, -128.0, 48.0), Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(hit, None);
    }

    #[test]
    fn test_hitscan_zero_direction() {
        let level = reference_level();
        assert_eq!(level.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::ZERO), None);
    }

    #[test]
    fn test_hitscan_stops_at_raised_floor() {
        let level = reference_level();
        // Polygon 5's floor (64) is above the ray, so its portal reads as wall
        let hit = level.hitscan(PolygonId(1), Vec3::new(0.0, 192.0, 40.0), Vec3::new(1.0, 0.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(64.0, 192.0, 40.0));
        assert_eq!(level.edge(hit.edge.unwrap()).back_polygon, Some(PolygonId(5)));
    }

    #[test]
    fn test_hitscan_sees_overlay() {
        let level = reference_level();
        let mut overlay = Overlay::new();
        overlay.set_floor_height(PolygonId(5), 0.0);
        let view = LevelView::new(&level, &overlay);
        let hit = view.hitscan(PolygonId(1), Vec3::new(0.0, 192.0, 40.0), Vec3::new(1.0, 0.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(192.0, 192.0, 40.0));
        assert_eq!(hit.polygon, PolygonId(5));
    }

    #[test]
    fn test_hitscan_stops_at_lowered_ceiling() {
        let level = reference_level();
        let mut overlay = Overlay::new();
        overlay.set_ceil_height(PolygonId(1), 96.0);
        let view = LevelView::new(&level, &overlay);
        assert_eq!(view.ceil_height(PolygonId(1)), 96.0);
        // The portal opening now ends below the ray at z = 112
        let hit = view.hitscan(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, 1.0, 1.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(0.0, 64.0, 112.0));
        assert_eq!(hit.polygon, PolygonId(0));
        assert_eq!(level.edge(hit.edge.unwrap()).back_polygon, Some(PolygonId(1)));
    }

    fn l_shape() -> Level {
        let data = LevelData {
            polygons: vec![PolygonData {
                edges: [
                    [0.0, 0.0],
                    [128.0, 0.0],
                    [128.0, 64.0],
                    [64.0, 64.0],
                    [64.0, 128.0],
                    [0.0, 128.0],
                ]
                .iter()
                .map(|&vertex| EdgeData {
                    vertex,
                    ..Default::default()
                })
                .collect(),
                floor_height: 0.0,
                ceil_height: 64.0,
                floor_tex: None,
                ceil_tex: None,
                brightness: [1.0; 3],
            }],
            locations: Vec::new(),
        };
        Level::from_data(&data).unwrap()
    }

    #[test]
    fn test_hitscan_non_convex_inner_corner() {
        let level = l_shape();
        let p = PolygonId(0);
        let inner_south = level.edges_of(p)[2].id;
        let inner_west = level.edges_of(p)[3].id;

        // Heading north-west past the reflex corner: the inner wall is
        // nearer than the far north wall the same line also crosses
        let hit = level.hitscan(p, Vec3::new(100.0, 32.0, 32.0), Vec3::new(-1.0, 1.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(68.0, 64.0, 32.0));
        assert_eq!(hit.edge, Some(inner_south));

        // Heading east out of the upper arm
        let hit = level.hitscan(p, Vec3::new(32.0, 100.0, 32.0), Vec3::X);
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(64.0, 100.0, 32.0));
        assert_eq!(hit.edge, Some(inner_west));

        // The floor plane is met inside the notch, which is not floor
        let hit = level.hitscan(p, Vec3::new(32.0, 96.0, 40.0), Vec3::new(1.0, 0.0, -0.5));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(64.0, 96.0, 24.0));
        assert_eq!(hit.edge, Some(inner_west));

        // Same descent from the lower arm reaches real floor first
        let hit = level.hitscan(p, Vec3::new(32.0, 32.0, 40.0), Vec3::new(1.0, 0.0, -0.5));
        assert_hit(hit, HitKind::Floor, Vec3::new(112.0, 32.0, 0.0));
    }

    #[test]
    fn test_hitscan_polygon_ignores_portals() {
        let level = reference_level();
        let view = level.view();
        let hit = view.hitscan_polygon(PolygonId(0), Vec3::new(0.0, 0.0, 48.0), Vec3::new(0.0, 1.0, 0.0));
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(0.0, 64.0, 48.0));
        assert_eq!(level.edge(hit.edge.unwrap()).back_polygon, Some(PolygonId(1)));
    }

    #[test]
    fn test_hitscan_degenerate_portal_fails_closed() {
        // Polygon 1 is polygon 0 wound the other way, with both east edges
        // portalling to each other: the ray can never leave polygon 1.
        let ring = |vertices: [[f32; 2]; 4], portal: usize, back: u32| PolygonData {
            edges: vertices
                .iter()
                .enumerate()
                .map(|(i, &vertex)| EdgeData {
                    vertex,
                    back_poly: (i == portal).then_some(back),
                    ..Default::default()
                })
                .collect(),
            floor_height: 0.0,
            ceil_height: 64.0,
            floor_tex: None,
            ceil_tex: None,
            brightness: [1.0; 3],
        };
        let data = LevelData {
            polygons: vec![
                ring([[0.0, 0.0], [64.0, 0.0], [64.0, 64.0], [0.0, 64.0]], 1, 1),
                ring([[64.0, 64.0], [64.0, 0.0], [0.0, 0.0], [0.0, 64.0]], 0, 0),
            ],
            locations: Vec::new(),
        };
        let level = Level::from_data(&data).unwrap();
        let hit = level.hitscan(PolygonId(0), Vec3::new(32.0, 32.0, 32.0), Vec3::X);
        let hit = assert_hit(hit, HitKind::Wall, Vec3::new(64.0, 32.0, 32.0));
        assert_eq!(hit.polygon, PolygonId(0));
    }
}
