//! Serialized level format and load-time validation
//!
//! Levels arrive as JSON (camelCase keys). Everything the geometry queries
//! assume is checked here so queries never have to: closed loops of at least
//! three edges, finite numbers, in-range and symmetric portals.

use glam::{EulerRot, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{Edge, EdgeId, EdgeTextures, Level, Location, LocationKind, Polygon, PolygonId};
use crate::sim::EntityKind;

/// Errors rejecting a level before it reaches the simulation
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("invalid level JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("level has no polygons")]
    Empty,
    #[error("polygon {polygon} has {count} edges, at least 3 are required")]
    TooFewEdges { polygon: usize, count: usize },
    #[error("polygon {polygon} contains a non-finite number")]
    NonFinite { polygon: usize },
    #[error("polygon {polygon} ceiling {ceil} is not above its floor {floor}")]
    InvertedHeights { polygon: usize, floor: f32, ceil: f32 },
    #[error("polygon {polygon} encloses no area")]
    ZeroArea { polygon: usize },
    #[error("polygon {polygon} edge {edge} has zero length")]
    DegenerateEdge { polygon: usize, edge: usize },
    #[error("polygon {polygon} edge {edge} links to missing polygon {back}")]
    BackPolygonOutOfRange { polygon: usize, edge: usize, back: u32 },
    #[error("polygon {polygon} edge {edge} is a portal to itself")]
    SelfPortal { polygon: usize, edge: usize },
    #[error("polygon {polygon} edge {edge} portals to polygon {back}, which has no reversed edge back")]
    AsymmetricPortal { polygon: usize, edge: usize, back: u32 },
    #[error("location {location} references missing polygon {polygon}")]
    LocationOutOfRange { location: usize, polygon: u32 },
    #[error("location {location} contains a non-finite number")]
    NonFiniteLocation { location: usize },
    #[error("entity location {location} has no entityConfig")]
    MissingEntityConfig { location: usize },
}

/// One edge as stored on disk: its start vertex plus optional portal link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub vertex: [f32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_tex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_tex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_tex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_poly: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonData {
    pub edges: Vec<EdgeData>,
    pub floor_height: f32,
    pub ceil_height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_tex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceil_tex: Option<String>,
    #[serde(default = "full_brightness")]
    pub brightness: [f32; 3],
}

fn full_brightness() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    #[serde(rename = "type")]
    pub kind: LocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_config: Option<EntityKind>,
    pub polygon: u32,
    pub position: [f32; 3],
    /// Euler angles in degrees: pitch, roll, yaw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f32; 3]>,
}

/// The whole serialized level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    pub polygons: Vec<PolygonData>,
    #[serde(default)]
    pub locations: Vec<LocationData>,
}

/// Twice the signed area of a vertex loop (positive when counter-clockwise)
fn signed_area2(vertices: &[Vec2]) -> f32 {
    let mut sum = 0.0;
    for (i, a) in vertices.iter().enumerate() {
        let b = vertices[(i + 1) % vertices.len()];
        sum += a.perp_dot(b);
    }
    sum
}

/// Rotation from `[pitch, roll, yaw]` in degrees
fn rotation_from_degrees(angles: [f32; 3]) -> Quat {
    let [pitch, roll, yaw] = angles;
    Quat::from_euler(
        EulerRot::ZXY,
        yaw.to_radians(),
        pitch.to_radians(),
        roll.to_radians(),
    )
}

fn rotation_to_degrees(rotation: Quat) -> [f32; 3] {
    let (yaw, pitch, roll) = rotation.to_euler(EulerRot::ZXY);
    [pitch.to_degrees(), roll.to_degrees(), yaw.to_degrees()]
}

fn validate_polygon(index: usize, data: &PolygonData, polygon_count: usize) -> Result<(), LevelError> {
    if data.edges.len() < 3 {
        return Err(LevelError::TooFewEdges {
            polygon: index,
            count: data.edges.len(),
        });
    }
    let finite = data.floor_height.is_finite()
        && data.ceil_height.is_finite()
        && data.brightness.iter().all(|c| c.is_finite())
        && data.edges.iter().all(|e| e.vertex.iter().all(|c| c.is_finite()));
    if !finite {
        return Err(LevelError::NonFinite { polygon: index });
    }
    if data.ceil_height <= data.floor_height {
        return Err(LevelError::InvertedHeights {
            polygon: index,
            floor: data.floor_height,
            ceil: data.ceil_height,
        });
    }
    for (i, edge) in data.edges.iter().enumerate() {
        let next = &data.edges[(i + 1) % data.edges.len()];
        if edge.vertex == next.vertex {
            return Err(LevelError::DegenerateEdge {
                polygon: index,
                edge: i,
            });
        }
        if let Some(back) = edge.back_poly {
            if back as usize >= polygon_count {
                return Err(LevelError::BackPolygonOutOfRange {
                    polygon: index,
                    edge: i,
                    back,
                });
            }
            if back as usize == index {
                return Err(LevelError::SelfPortal {
                    polygon: index,
                    edge: i,
                });
            }
        }
    }
    Ok(())
}

/// Check that every portal has a reversed twin in its back polygon
fn validate_portals(level: &Level) -> Result<(), LevelError> {
    for polygon in level.polygons() {
        let edges = level.edges_of(polygon.id);
        for (i, edge) in edges.iter().enumerate() {
            let Some(back) = edge.back_polygon else {
                continue;
            };
            let twin = level.edges_of(back).iter().any(|other| {
                other.back_polygon == Some(polygon.id)
                    && other.start() == edge.end()
                    && other.end() == edge.start()
            });
            if !twin {
                return Err(LevelError::AsymmetricPortal {
                    polygon: polygon.id.index(),
                    edge: i,
                    back: back.0,
                });
            }
        }
    }
    Ok(())
}

impl Level {
    /// Parse and validate a level from JSON
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let data: LevelData = serde_json::from_str(json)?;
        Self::from_data(&data)
    }

    /// Validate serialized level data and flatten it into the edge/polygon arena
    pub fn from_data(data: &LevelData) -> Result<Self, LevelError> {
        if data.polygons.is_empty() {
            return Err(LevelError::Empty);
        }
        let polygon_count = data.polygons.len();

        let mut polygons = Vec::with_capacity(polygon_count);
        let mut edges = Vec::new();
        for (index, poly) in data.polygons.iter().enumerate() {
            validate_polygon(index, poly, polygon_count)?;

            let vertices: Vec<Vec2> = poly.edges.iter().map(|e| Vec2::from(e.vertex)).collect();
            let area2 = signed_area2(&vertices);
            if area2.abs() <= f32::EPSILON {
                return Err(LevelError::ZeroArea { polygon: index });
            }
            let winding = area2.signum();
            let id = PolygonId(index as u32);
            let first_edge = edges.len() as u32;

            for (i, edge_data) in poly.edges.iter().enumerate() {
                let mut edge = Edge::new(
                    EdgeId(edges.len() as u32),
                    id,
                    vertices[i],
                    vertices[(i + 1) % vertices.len()],
                    edge_data.back_poly.map(PolygonId),
                    winding,
                );
                edge.textures = EdgeTextures {
                    upper: edge_data.upper_tex.clone(),
                    middle: edge_data.middle_tex.clone(),
                    lower: edge_data.lower_tex.clone(),
                };
                edges.push(edge);
            }

            polygons.push(Polygon {
                id,
                floor_height: poly.floor_height,
                ceil_height: poly.ceil_height,
                floor_tex: poly.floor_tex.clone(),
                ceil_tex: poly.ceil_tex.clone(),
                brightness: Vec3::from(poly.brightness),
                first_edge,
                edge_count: poly.edges.len() as u32,
            });
        }

        let mut locations = Vec::with_capacity(data.locations.len());
        for (index, loc) in data.locations.iter().enumerate() {
            if loc.polygon as usize >= polygon_count {
                return Err(LevelError::LocationOutOfRange {
                    location: index,
                    polygon: loc.polygon,
                });
            }
            let finite = loc.position.iter().all(|c| c.is_finite())
                && loc.rotation.is_none_or(|r| r.iter().all(|c| c.is_finite()));
            if !finite {
                return Err(LevelError::NonFiniteLocation { location: index });
            }
            if loc.kind == LocationKind::Entity && loc.entity_config.is_none() {
                return Err(LevelError::MissingEntityConfig { location: index });
            }
            locations.push(Location {
                kind: loc.kind,
                entity_kind: loc.entity_config,
                polygon: PolygonId(loc.polygon),
                position: Vec3::from(loc.position),
                rotation: loc.rotation.map(rotation_from_degrees).unwrap_or(Quat::IDENTITY),
            });
        }

        let level = Level {
            polygons,
            edges,
            locations,
        };
        validate_portals(&level)?;

        log::info!(
            "Loaded level: {} polygons, {} edges, {} locations",
            level.polygons.len(),
            level.edges.len(),
            level.locations.len()
        );
        Ok(level)
    }

    /// Re-emit the serialized form of this level
    pub fn to_data(&self) -> LevelData {
        let polygons = self
            .polygons
            .iter()
            .map(|polygon| PolygonData {
                edges: self
                    .edges_of(polygon.id)
                    .iter()
                    .map(|edge| EdgeData {
                        vertex: edge.start().to_array(),
                        upper_tex: edge.textures.upper.clone(),
                        middle_tex: edge.textures.middle.clone(),
                        lower_tex: edge.textures.lower.clone(),
                        back_poly: edge.back_polygon.map(|p| p.0),
                    })
                    .collect(),
                floor_height: polygon.floor_height,
                ceil_height: polygon.ceil_height,
                floor_tex: polygon.floor_tex.clone(),
                ceil_tex: polygon.ceil_tex.clone(),
                brightness: polygon.brightness.to_array(),
            })
            .collect();
        let locations = self
            .locations
            .iter()
            .map(|loc| LocationData {
                kind: loc.kind,
                entity_config: loc.entity_kind,
                polygon: loc.polygon.0,
                position: loc.position.to_array(),
                rotation: Some(rotation_to_degrees(loc.rotation)),
            })
            .collect();
        LevelData {
            polygons,
            locations,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_data())
    }
}
