//! Point containment and portal-graph traversal
//!
//! Containment uses a crossing count along +X computed from each edge's own
//! endpoints, so no far-away test point is ever constructed. Points lying on
//! an edge (including its endpoints) count as inside.

use std::collections::{BTreeSet, VecDeque};

use glam::Vec2;

use super::{Edge, Level, PolygonId};
use crate::consts::GEOM_EPSILON;

/// Closest point to `p` on segment `a`-`b`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Whether `p` lies on segment `a`-`b` within `GEOM_EPSILON`
pub fn point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> bool {
    // Exact test first: axis-aligned edges need no tolerance at any magnitude
    let ab = b - a;
    let ap = p - a;
    if ab.perp_dot(ap) == 0.0 {
        let t = ap.dot(ab);
        if t >= 0.0 && t <= ab.length_squared() {
            return true;
        }
    }
    p.distance_squared(closest_point_on_segment(p, a, b)) <= GEOM_EPSILON * GEOM_EPSILON
}

/// Whether a circle overlaps an edge segment (touching at exactly `radius` does not count)
pub fn circle_touches_edge(center: Vec2, radius: f32, edge: &Edge) -> bool {
    let closest = closest_point_on_segment(center, edge.start(), edge.end());
    center.distance_squared(closest) < radius * radius
}

impl Level {
    /// Whether `point` is inside `polygon`; points on the boundary are inside
    pub fn point_in_polygon(&self, polygon: PolygonId, point: Vec2) -> bool {
        let mut inside = false;
        for edge in self.edges_of(polygon) {
            let (a, b) = (edge.start(), edge.end());
            if point_on_segment(point, a, b) {
                return true;
            }
            // Half-open rule: each vertex belongs to exactly one of its edges
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Resolve the polygon containing `point`, searching outward from `start`
    /// through portals only. `None` means the point is in the void.
    pub fn find_polygon(&self, start: PolygonId, point: Vec2) -> Option<PolygonId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if self.point_in_polygon(current, point) {
                return Some(current);
            }
            for edge in self.edges_of(current) {
                if let Some(back) = edge.back_polygon {
                    if visited.insert(back) {
                        queue.push_back(back);
                    }
                }
            }
        }
        None
    }

    /// Collect the polygons reachable from `start` through portals for which
    /// `should_flood(check, source, edge)` holds. `start` is always included.
    pub fn flood<F>(&self, start: PolygonId, mut should_flood: F) -> BTreeSet<PolygonId>
    where
        F: FnMut(PolygonId, PolygonId, &Edge) -> bool,
    {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];
        visited.insert(start);

        while let Some(source) = stack.pop() {
            for edge in self.edges_of(source) {
                let Some(check) = edge.back_polygon else {
                    continue;
                };
                if visited.contains(&check) || !should_flood(check, source, edge) {
                    continue;
                }
                visited.insert(check);
                stack.push(check);
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::format::{EdgeData, LevelData, PolygonData};
    use crate::level::reference_level;
    use proptest::prelude::*;

    fn rectangle(min: Vec2, max: Vec2) -> Level {
        let corners = [
            [min.x, min.y],
            [max.x, min.y],
            [max.x, max.y],
            [min.x, max.y],
        ];
        let data = LevelData {
            polygons: vec![PolygonData {
                edges: corners
                    .iter()
                    .map(|&vertex| EdgeData {
                        vertex,
                        ..Default::default()
                    })
                    .collect(),
                floor_height: 0.0,
                ceil_height: 128.0,
                floor_tex: None,
                ceil_tex: None,
                brightness: [1.0; 3],
            }],
            locations: Vec::new(),
        };
        Level::from_data(&data).unwrap()
    }

    #[test]
    fn test_point_in_polygon_boundary_is_inside() {
        let level = reference_level();
        let p0 = PolygonId(0);
        // Horizontal edges
        assert!(level.point_in_polygon(p0, Vec2::new(0.0, -64.0)));
        assert!(level.point_in_polygon(p0, Vec2::new(100.0, 64.0)));
        // Vertical edges
        assert!(level.point_in_polygon(p0, Vec2::new(-256.0, 10.0)));
        assert!(level.point_in_polygon(p0, Vec2::new(256.0, -10.0)));
        // Corners
        assert!(level.point_in_polygon(p0, Vec2::new(-256.0, -64.0)));
        assert!(level.point_in_polygon(p0, Vec2::new(256.0, 64.0)));
    }

    #[test]
    fn test_point_in_polygon_just_outside() {
        let level = reference_level();
        let p0 = PolygonId(0);
        assert!(!level.point_in_polygon(p0, Vec2::new(0.0, -64.01)));
        assert!(!level.point_in_polygon(p0, Vec2::new(-256.01, 10.0)));
        assert!(!level.point_in_polygon(p0, Vec2::new(256.01, -10.0)));
        assert!(!level.point_in_polygon(p0, Vec2::new(100.0, 64.01)));
    }

    #[test]
    fn test_point_in_polygon_non_convex() {
        // An L-shape: the notch at the top right is outside
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
        let level = Level::from_data(&data).unwrap();
        let p = PolygonId(0);
        assert!(level.point_in_polygon(p, Vec2::new(32.0, 100.0)));
        assert!(level.point_in_polygon(p, Vec2::new(100.0, 32.0)));
        assert!(!level.point_in_polygon(p, Vec2::new(100.0, 100.0)));
        // Ray from this point passes exactly through the reflex vertex (64, 64)
        assert!(level.point_in_polygon(p, Vec2::new(32.0, 64.0)));
        assert!(!level.point_in_polygon(p, Vec2::new(-32.0, 64.0)));
    }

    #[test]
    fn test_point_in_polygon_large_coordinates() {
        // Regression: far-flung coordinates must not lose the boundary
        let level = rectangle(Vec2::new(-1_048_576.0, 524_288.0), Vec2::new(-1_040_384.0, 532_480.0));
        let p = PolygonId(0);
        assert!(level.point_in_polygon(p, Vec2::new(-1_044_480.0, 528_384.0)));
        assert!(level.point_in_polygon(p, Vec2::new(-1_048_576.0, 528_384.0)));
        assert!(level.point_in_polygon(p, Vec2::new(-1_044_480.0, 532_480.0)));
        assert!(!level.point_in_polygon(p, Vec2::new(-1_048_577.0, 528_384.0)));
        assert!(!level.point_in_polygon(p, Vec2::new(-1_044_480.0, 532_481.0)));
    }

    #[test]
    fn test_find_polygon_prefers_start() {
        let level = reference_level();
        assert_eq!(level.find_polygon(PolygonId(0), Vec2::new(10.0, 10.0)), Some(PolygonId(0)));
        // On the shared portal edge the start polygon wins
        assert_eq!(level.find_polygon(PolygonId(1), Vec2::new(0.0, 64.0)), Some(PolygonId(1)));
        assert_eq!(level.find_polygon(PolygonId(0), Vec2::new(0.0, 64.0)), Some(PolygonId(0)));
    }

    #[test]
    fn test_find_polygon_walks_portals() {
        let level = reference_level();
        assert_eq!(level.find_polygon(PolygonId(0), Vec2::new(0.0, 700.0)), Some(PolygonId(4)));
        assert_eq!(level.find_polygon(PolygonId(4), Vec2::new(128.0, 192.0)), Some(PolygonId(5)));
    }

    #[test]
    fn test_find_polygon_void() {
        let level = reference_level();
        assert_eq!(level.find_polygon(PolygonId(0), Vec2::new(0.0, -256.0)), None);
        assert_eq!(level.find_polygon(PolygonId(0), Vec2::new(200.0, 600.0)), None);
    }

    #[test]
    fn test_flood_all_and_none() {
        let level = reference_level();
        let all = level.flood(PolygonId(0), |_, _, _| true);
        assert_eq!(all, (0..6).map(PolygonId).collect());
        let none = level.flood(PolygonId(0), |_, _, _| false);
        assert_eq!(none, [PolygonId(0)].into_iter().collect());
    }

    #[test]
    fn test_flood_respects_predicate() {
        let level = reference_level();
        // Do not cross into raised floors
        let low = level.flood(PolygonId(0), |check, _, _| level.polygon(check).floor_height < 8.0);
        assert_eq!(low, [PolygonId(0), PolygonId(1)].into_iter().collect());
    }

    #[test]
    fn test_flood_visits_each_neighbour_once() {
        let level = reference_level();
        let mut calls = Vec::new();
        level.flood(PolygonId(2), |check, source, edge| {
            assert_eq!(edge.polygon, source);
            calls.push(check);
            true
        });
        let unique: BTreeSet<_> = calls.iter().copied().collect();
        assert_eq!(unique.len(), calls.len());
    }

    #[test]
    fn test_circle_touches_edge_is_strict() {
        let level = reference_level();
        let west = &level.edges_of(PolygonId(0))[5];
        assert!(!circle_touches_edge(Vec2::new(-240.0, 0.0), 16.0, west));
        assert!(circle_touches_edge(Vec2::new(-241.0, 0.0), 16.0, west));
    }

    proptest! {
        #[test]
        fn prop_rectangle_containment(x in -300.0f32..300.0, y in -300.0f32..300.0) {
            let level = rectangle(Vec2::new(-128.0, -64.0), Vec2::new(128.0, 64.0));
            let expected = (-128.0..=128.0).contains(&x) && (-64.0..=64.0).contains(&y);
            prop_assert_eq!(level.point_in_polygon(PolygonId(0), Vec2::new(x, y)), expected);
        }
    }
}
