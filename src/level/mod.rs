//! Sector level geometry
//!
//! A level is a flat arena of polygons ("sectors") and their boundary edges,
//! linked by integer ids. Edges with a back polygon are portals. The level is
//! loaded once and never mutated; per-tick height changes are layered on top
//! with an [`Overlay`] and read through a [`LevelView`].

pub mod format;
pub mod geometry;
pub mod hitscan;

use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::sim::EntityKind;

pub use format::LevelError;
pub use hitscan::{Hit, HitKind};

/// The reference test map shipped with the crate
pub const REFERENCE_LEVEL_JSON: &str = include_str!("../../levels/reference.json");

/// Index of a polygon in its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolygonId(pub u32);

impl PolygonId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PolygonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "polygon {}", self.0)
    }
}

/// Index of an edge in its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Texture names for the three wall sections of an edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeTextures {
    pub upper: Option<String>,
    pub middle: Option<String>,
    pub lower: Option<String>,
}

/// A directed boundary segment of a polygon
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    /// Polygon this edge bounds
    pub polygon: PolygonId,
    /// Neighbouring polygon through this edge, `None` for a solid wall
    pub back_polygon: Option<PolygonId>,
    pub textures: EdgeTextures,
    start: Vec2,
    end: Vec2,
    normal: Vec2,
}

impl Edge {
    /// Build an edge, deriving its outward normal.
    ///
    /// `winding` is the sign of the owning polygon's signed area (+1 for
    /// counter-clockwise, -1 for clockwise).
    pub fn new(
        id: EdgeId,
        polygon: PolygonId,
        start: Vec2,
        end: Vec2,
        back_polygon: Option<PolygonId>,
        winding: f32,
    ) -> Self {
        Self {
            id,
            polygon,
            back_polygon,
            textures: EdgeTextures::default(),
            start,
            end,
            normal: outward_normal(start, end, winding),
        }
    }

    #[inline]
    pub fn start(&self) -> Vec2 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Vec2 {
        self.end
    }

    /// Unit normal pointing out of the owning polygon
    #[inline]
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    #[inline]
    pub fn is_portal(&self) -> bool {
        self.back_polygon.is_some()
    }

    /// Move both endpoints, keeping the cached normal in step
    pub fn set_endpoints(&mut self, start: Vec2, end: Vec2, winding: f32) {
        self.start = start;
        self.end = end;
        self.normal = outward_normal(start, end, winding);
    }
}

fn outward_normal(start: Vec2, end: Vec2, winding: f32) -> Vec2 {
    let d = end - start;
    (Vec2::new(d.y, -d.x) * winding.signum()).normalize_or_zero()
}

/// A closed room shape with floor and ceiling heights
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub id: PolygonId,
    pub floor_height: f32,
    pub ceil_height: f32,
    pub floor_tex: Option<String>,
    pub ceil_tex: Option<String>,
    pub brightness: Vec3,
    /// Edges of this polygon occupy `first_edge..first_edge + edge_count`
    first_edge: u32,
    edge_count: u32,
}

impl Polygon {
    /// Ids of this polygon's edges, in loop order
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        (self.first_edge..self.first_edge + self.edge_count).map(EdgeId)
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count as usize
    }
}

/// What a level location places
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationKind {
    PlayerSpawn,
    Entity,
}

/// A spawn point stored in the level
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub kind: LocationKind,
    pub entity_kind: Option<EntityKind>,
    pub polygon: PolygonId,
    pub position: Vec3,
    pub rotation: Quat,
}

/// The immutable polygon/edge/portal graph plus spawn locations
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    polygons: Vec<Polygon>,
    edges: Vec<Edge>,
    locations: Vec<Location>,
}

impl Level {
    /// Number of polygons
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Polygon by id. Ids must come from this level.
    #[inline]
    pub fn polygon(&self, id: PolygonId) -> &Polygon {
        &self.polygons[id.index()]
    }

    /// Edge by id. Ids must come from this level.
    #[inline]
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// The edges of a polygon as a contiguous slice, in loop order
    pub fn edges_of(&self, id: PolygonId) -> &[Edge] {
        let polygon = self.polygon(id);
        let start = polygon.first_edge as usize;
        &self.edges[start..start + polygon.edge_count as usize]
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// View of this level with no overlay applied
    pub fn view(&self) -> LevelView<'_> {
        LevelView::new(self, &EMPTY_OVERLAY)
    }

    /// Cast a half-line against the base level (no overlay)
    pub fn hitscan(&self, start: PolygonId, origin: Vec3, direction: Vec3) -> Option<Hit> {
        self.view().hitscan(start, origin, direction)
    }
}

/// Per-polygon height replacement produced by mutators for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonPatch {
    pub floor_height: Option<f32>,
    pub ceil_height: Option<f32>,
}

/// One tick's set of polygon patches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    patches: BTreeMap<PolygonId, PolygonPatch>,
}

static EMPTY_OVERLAY: Overlay = Overlay::new();

impl Overlay {
    pub const fn new() -> Self {
        Self {
            patches: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn get(&self, polygon: PolygonId) -> Option<&PolygonPatch> {
        self.patches.get(&polygon)
    }

    pub fn set_floor_height(&mut self, polygon: PolygonId, height: f32) {
        self.patches.entry(polygon).or_default().floor_height = Some(height);
    }

    pub fn set_ceil_height(&mut self, polygon: PolygonId, height: f32) {
        self.patches.entry(polygon).or_default().ceil_height = Some(height);
    }
}

/// A level with one tick's overlay applied
#[derive(Debug, Clone, Copy)]
pub struct LevelView<'a> {
    level: &'a Level,
    overlay: &'a Overlay,
}

impl<'a> LevelView<'a> {
    pub fn new(level: &'a Level, overlay: &'a Overlay) -> Self {
        Self { level, overlay }
    }

    #[inline]
    pub fn level(&self) -> &'a Level {
        self.level
    }

    /// Floor height with any overlay patch applied
    pub fn floor_height(&self, id: PolygonId) -> f32 {
        self.overlay
            .get(id)
            .and_then(|p| p.floor_height)
            .unwrap_or(self.level.polygon(id).floor_height)
    }

    /// Ceiling height with any overlay patch applied
    pub fn ceil_height(&self, id: PolygonId) -> f32 {
        self.overlay
            .get(id)
            .and_then(|p| p.ceil_height)
            .unwrap_or(self.level.polygon(id).ceil_height)
    }
}

#[cfg(test)]
pub(crate) fn reference_level() -> Level {
    Level::from_json(REFERENCE_LEVEL_JSON).expect("reference level must load")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_level_shape() {
        let level = reference_level();
        assert_eq!(level.polygon_count(), 6);
        assert_eq!(level.edges_of(PolygonId(0)).len(), 6);
        assert_eq!(level.locations().len(), 4);
    }

    #[test]
    fn test_edge_loops_are_closed() {
        let level = reference_level();
        for polygon in level.polygons() {
            let edges = level.edges_of(polygon.id);
            for (i, edge) in edges.iter().enumerate() {
                let next = &edges[(i + 1) % edges.len()];
                assert_eq!(edge.end(), next.start());
                assert_eq!(edge.polygon, polygon.id);
            }
        }
    }

    #[test]
    fn test_normals_point_outward() {
        let level = reference_level();
        let south = &level.edges_of(PolygonId(0))[0];
        assert_eq!(south.normal(), Vec2::new(0.0, -1.0));
        let west = &level.edges_of(PolygonId(0))[5];
        assert_eq!(west.normal(), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_clockwise_winding_flips_normal() {
        let ccw = Edge::new(EdgeId(0), PolygonId(0), Vec2::ZERO, Vec2::X, None, 1.0);
        let cw = Edge::new(EdgeId(0), PolygonId(0), Vec2::ZERO, Vec2::X, None, -1.0);
        assert_eq!(ccw.normal(), -Vec2::Y);
        assert_eq!(cw.normal(), Vec2::Y);
    }

    #[test]
    fn test_moving_endpoints_recomputes_normal() {
        let mut edge = Edge::new(EdgeId(0), PolygonId(0), Vec2::ZERO, Vec2::X, None, 1.0);
        edge.set_endpoints(Vec2::ZERO, Vec2::Y, 1.0);
        assert_eq!(edge.normal(), Vec2::X);
    }

    #[test]
    fn test_overlay_patches_heights() {
        let level = reference_level();
        let mut overlay = Overlay::new();
        overlay.set_floor_height(PolygonId(5), 12.0);
        let view = LevelView::new(&level, &overlay);
        assert_eq!(view.floor_height(PolygonId(5)), 12.0);
        assert_eq!(view.ceil_height(PolygonId(5)), 128.0);
        assert_eq!(level.view().floor_height(PolygonId(5)), 64.0);
    }
}
