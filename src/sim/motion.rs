//! Entity motion resolver
//!
//! Moves an entity's cylinder (radius, height) through the level in up to four
//! sub-steps so a fast entity cannot pass through geometry thinner than its
//! radius. Walls slide the entity along their face; a corner gets a second
//! slide; anything still blocked cancels the sub-step's horizontal movement.

use std::collections::BTreeSet;

use glam::{Vec2, Vec3};
use thiserror::Error;

use super::state::{Entity, EntityConfig};
use crate::consts::GEOM_EPSILON;
use crate::level::geometry::{circle_touches_edge, closest_point_on_segment};
use crate::level::{EdgeId, LevelView, PolygonId};
use crate::tuning::Tuning;

/// Fatal resolver failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// No polygon reachable from the entity's last polygon contains it
    #[error("entity left the polygon graph at {position}")]
    LeftPolygonGraph { position: Vec3 },
}

/// What an entity's body touches at a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    Nothing,
    /// Nearest blocking edge
    Edge {
        edge: EdgeId,
        /// Closest point on the edge to the entity's centre
        point: Vec2,
        /// Edge normal, oriented toward the entity's side
        push: Vec2,
    },
    /// The position is outside every reachable polygon
    Void,
}

/// Result of moving an entity for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub position: Vec3,
    pub polygon: PolygonId,
    pub velocity: Vec3,
    /// Standing on the highest floor under the body
    pub on_floor: bool,
}

/// Whether a body standing at `z` fits through a portal into `back`
fn portal_passable(view: LevelView<'_>, config: &EntityConfig, tuning: &Tuning, back: PolygonId, z: f32) -> bool {
    let floor = view.floor_height(back);
    let ceil = view.ceil_height(back);
    floor <= z + tuning.step_height && ceil - z.max(floor) >= config.height
}

/// Polygons the body at `position` overlaps, entering only portals it fits through
pub fn overlapped_polygons(
    view: LevelView<'_>,
    config: &EntityConfig,
    tuning: &Tuning,
    polygon: PolygonId,
    position: Vec3,
) -> BTreeSet<PolygonId> {
    let center = position.truncate();
    view.level().flood(polygon, |check, _source, edge| {
        circle_touches_edge(center, config.radius, edge) && portal_passable(view, config, tuning, check, position.z)
    })
}

/// Highest floor under the body
pub fn support_height(view: LevelView<'_>, tuning: &Tuning, entity: &Entity) -> f32 {
    overlapped_polygons(view, entity.config(), tuning, entity.polygon, entity.position)
        .into_iter()
        .map(|p| view.floor_height(p))
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Test a body against walls, impassable portals and the void
pub fn entity_touches_level(
    view: LevelView<'_>,
    config: &EntityConfig,
    tuning: &Tuning,
    polygon: Option<PolygonId>,
    position: Vec3,
) -> Contact {
    let Some(polygon) = polygon else {
        return Contact::Void;
    };
    let level = view.level();
    let center = position.truncate();
    let radius_sq = config.radius * config.radius;
    let mut nearest: Option<(f32, Contact)> = None;

    for p in overlapped_polygons(view, config, tuning, polygon, position) {
        for edge in level.edges_of(p) {
            let blocking = match edge.back_polygon {
                None => true,
                Some(back) => !portal_passable(view, config, tuning, back, position.z),
            };
            if !blocking {
                continue;
            }
            let point = closest_point_on_segment(center, edge.start(), edge.end());
            let dist_sq = center.distance_squared(point);
            if dist_sq >= radius_sq {
                continue;
            }
            if nearest.is_some_and(|(best, _)| dist_sq >= best) {
                continue;
            }
            let normal = edge.normal();
            let push = if (center - point).dot(normal) > 0.0 {
                normal
            } else {
                -normal
            };
            nearest = Some((
                dist_sq,
                Contact::Edge {
                    edge: edge.id,
                    point,
                    push,
                },
            ));
        }
    }

    nearest.map_or(Contact::Nothing, |(_, contact)| contact)
}

/// Horizontal position and polygon while resolving a sub-step
#[derive(Clone, Copy)]
struct Footing {
    xy: Vec2,
    polygon: PolygonId,
}

/// Number of equal sub-steps for a horizontal displacement
fn substep_count(radius: f32, displacement: Vec2) -> u32 {
    let length = displacement.length();
    if length <= 0.0 {
        return 1;
    }
    let scale = radius / length;
    if scale >= 1.0 {
        1
    } else if scale >= 0.5 {
        2
    } else {
        4
    }
}

/// Slide `xy` out of a contact along the edge normal, leaving it `radius` away
fn slide(xy: Vec2, radius: f32, point: Vec2, push: Vec2) -> Vec2 {
    xy + push * (radius - (xy - point).dot(push))
}

/// Remove the part of the horizontal velocity heading into the edge
fn clip_velocity(velocity: &mut Vec3, push: Vec2) {
    let into = velocity.truncate().dot(push);
    if into < 0.0 {
        let clipped = velocity.truncate() - push * into;
        velocity.x = clipped.x;
        velocity.y = clipped.y;
    }
}

struct Resolver<'a> {
    view: LevelView<'a>,
    config: &'static EntityConfig,
    tuning: &'a Tuning,
}

impl Resolver<'_> {
    fn touches(&self, footing: Option<Footing>, z: f32) -> Contact {
        match footing {
            Some(f) => entity_touches_level(self.view, self.config, self.tuning, Some(f.polygon), f.xy.extend(z)),
            None => Contact::Void,
        }
    }

    fn locate(&self, from: PolygonId, xy: Vec2) -> Option<Footing> {
        self.view
            .level()
            .find_polygon(from, xy)
            .map(|polygon| Footing { xy, polygon })
    }

    /// Move horizontally by `partial`, sliding up to twice; `None` cancels
    fn step_xy(&self, start: Footing, partial: Vec2, z: f32, velocity: &mut Vec3) -> Option<Footing> {
        let mut footing = self.locate(start.polygon, start.xy + partial);
        // First contact slides, the corner slides once more, a third cancels
        for _ in 0..2 {
            match self.touches(footing, z) {
                Contact::Nothing => return footing,
                Contact::Void => return None,
                Contact::Edge { point, push, .. } => {
                    let current = footing?;
                    let xy = slide(current.xy, self.config.radius, point, push);
                    clip_velocity(velocity, push);
                    footing = self.locate(current.polygon, xy);
                }
            }
        }
        match self.touches(footing, z) {
            Contact::Nothing => footing,
            Contact::Edge { .. } | Contact::Void => None,
        }
    }

    /// Push the body out of the floors and ceilings it overlaps
    fn clamp_z(&self, footing: Footing, position: &mut Vec3, velocity: &mut Vec3) {
        let overlapped = overlapped_polygons(self.view, self.config, self.tuning, footing.polygon, *position);
        let floor = overlapped
            .iter()
            .map(|&p| self.view.floor_height(p))
            .fold(f32::NEG_INFINITY, f32::max);
        let ceil = overlapped
            .iter()
            .map(|&p| self.view.ceil_height(p))
            .fold(f32::INFINITY, f32::min);

        if position.z > ceil - self.config.height {
            position.z = ceil - self.config.height;
            if velocity.z > 0.0 {
                velocity.z = 0.0;
            }
        }
        if position.z < floor {
            position.z = floor;
            if velocity.z < 0.0 {
                velocity.z = 0.0;
            }
        }
    }
}

/// Integrate an entity's velocity over `dt` seconds against the level
pub fn move_entity(view: LevelView<'_>, tuning: &Tuning, entity: &Entity, dt: f32) -> Result<Motion, MotionError> {
    let resolver = Resolver {
        view,
        config: entity.config(),
        tuning,
    };
    let mut velocity = entity.velocity;
    let mut position = entity.position;
    let mut footing = Footing {
        xy: position.truncate(),
        polygon: entity.polygon,
    };

    let displacement = entity.velocity * dt;
    let steps = substep_count(resolver.config.radius, displacement.truncate());
    let partial = displacement / steps as f32;

    for _ in 0..steps {
        position.z += partial.z;
        if partial.x != 0.0 || partial.y != 0.0 {
            match resolver.step_xy(footing, partial.truncate(), position.z, &mut velocity) {
                Some(next) => footing = next,
                None => {
                    velocity.x = 0.0;
                    velocity.y = 0.0;
                }
            }
        }
        position.x = footing.xy.x;
        position.y = footing.xy.y;
        resolver.clamp_z(footing, &mut position, &mut velocity);
    }

    let polygon = view
        .level()
        .find_polygon(footing.polygon, position.truncate())
        .ok_or(MotionError::LeftPolygonGraph { position })?;

    let floor = overlapped_polygons(view, resolver.config, tuning, polygon, position)
        .into_iter()
        .map(|p| view.floor_height(p))
        .fold(f32::NEG_INFINITY, f32::max);

    Ok(Motion {
        position,
        polygon,
        velocity,
        on_floor: position.z <= floor + GEOM_EPSILON,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{Level, Overlay, reference_level};
    use crate::sim::state::EntityKind;
    use glam::Quat;

    fn player(polygon: u32, position: Vec3, velocity: Vec3) -> Entity {
        let mut entity = Entity::new(EntityKind::Player, PolygonId(polygon), position, Quat::IDENTITY);
        entity.velocity = velocity;
        entity
    }

    fn run(level: &Level, entity: &Entity) -> Motion {
        move_entity(level.view(), &Tuning::default(), entity, 1.0).unwrap()
    }

    fn assert_near(actual: Vec3, expected: Vec3) {
        assert!(
            actual.distance(expected) < 1e-3,
            "got {:?}, expected {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_substep_count() {
        assert_eq!(substep_count(16.0, Vec2::ZERO), 1);
        assert_eq!(substep_count(16.0, Vec2::new(16.0, 0.0)), 1);
        assert_eq!(substep_count(16.0, Vec2::new(-16.0, 16.0)), 2);
        assert_eq!(substep_count(16.0, Vec2::new(32.0, 0.0)), 2);
        assert_eq!(substep_count(16.0, Vec2::new(-32.0, 32.0)), 4);
    }

    #[test]
    fn test_straight_into_wall_stops_at_radius() {
        let level = reference_level();
        let entity = player(0, Vec3::new(-232.0, 0.0, 0.0), Vec3::new(-16.0, 0.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(-240.0, 0.0, 0.0));
        assert_eq!(motion.velocity.x, 0.0);
        assert_eq!(motion.polygon, PolygonId(0));
        assert!(motion.on_floor);
    }

    #[test]
    fn test_angled_wall_slides() {
        let level = reference_level();
        let entity = player(0, Vec3::new(-232.0, 0.0, 0.0), Vec3::new(-16.0, 16.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(-240.0, 16.0, 0.0));
        assert_eq!(motion.velocity.x, 0.0);
        assert_eq!(motion.velocity.y, 16.0);
    }

    #[test]
    fn test_fast_slide_matches_slow_slide() {
        let level = reference_level();
        let entity = player(0, Vec3::new(-232.0, 0.0, 0.0), Vec3::new(-32.0, 32.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(-240.0, 32.0, 0.0));
    }

    #[test]
    fn test_corner_slides_twice() {
        let level = reference_level();
        let entity = player(0, Vec3::new(-232.0, -40.0, 0.0), Vec3::new(-16.0, -16.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(-240.0, -48.0, 0.0));
        assert_eq!(motion.velocity.truncate(), Vec2::ZERO);
    }

    #[test]
    fn test_void_cancels_movement() {
        let level = reference_level();
        let entity = player(0, Vec3::new(-200.0, 0.0, 0.0), Vec3::new(-1000.0, 0.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(-200.0, 0.0, 0.0));
        assert_eq!(motion.velocity, Vec3::ZERO);
        assert_eq!(motion.polygon, PolygonId(0));
    }

    #[test]
    fn test_walks_through_portal() {
        let level = reference_level();
        let entity = player(0, Vec3::new(0.0, 56.0, 0.0), Vec3::new(0.0, 16.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(0.0, 72.0, 0.0));
        assert_eq!(motion.polygon, PolygonId(1));
    }

    #[test]
    fn test_steps_up_onto_low_floor() {
        let level = reference_level();
        let entity = player(1, Vec3::new(0.0, 230.0, 0.0), Vec3::new(0.0, 32.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(0.0, 262.0, 16.0));
        assert_eq!(motion.polygon, PolygonId(2));
        assert!(motion.on_floor);
    }

    #[test]
    fn test_raised_floor_blocks_like_wall() {
        let level = reference_level();
        let entity = player(1, Vec3::new(40.0, 192.0, 0.0), Vec3::new(16.0, 0.0, 0.0));
        let motion = run(&level, &entity);
        assert_near(motion.position, Vec3::new(48.0, 192.0, 0.0));
        assert_eq!(motion.polygon, PolygonId(1));
    }

    #[test]
    fn test_lowered_lift_is_walkable() {
        let level = reference_level();
        let mut overlay = Overlay::new();
        overlay.set_floor_height(PolygonId(5), 0.0);
        let view = LevelView::new(&level, &overlay);
        let entity = player(1, Vec3::new(40.0, 192.0, 0.0), Vec3::new(16.0, 0.0, 0.0));
        let motion = move_entity(view, &Tuning::default(), &entity, 1.0).unwrap();
        assert_near(motion.position, Vec3::new(56.0, 192.0, 0.0));
    }

    #[test]
    fn test_floor_and_ceiling_clamp() {
        let level = reference_level();
        let falling = player(0, Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, -10.0));
        let motion = run(&level, &falling);
        assert_eq!(motion.position.z, 0.0);
        assert_eq!(motion.velocity.z, 0.0);
        assert!(motion.on_floor);

        let rising = player(0, Vec3::new(0.0, 0.0, 60.0), Vec3::new(0.0, 0.0, 100.0));
        let motion = run(&level, &rising);
        assert_eq!(motion.position.z, 128.0 - 56.0);
        assert_eq!(motion.velocity.z, 0.0);
        assert!(!motion.on_floor);
    }

    #[test]
    fn test_lost_entity_is_an_error() {
        let level = reference_level();
        let entity = player(0, Vec3::new(0.0, -300.0, 0.0), Vec3::ZERO);
        let err = move_entity(level.view(), &Tuning::default(), &entity, 1.0).unwrap_err();
        assert!(matches!(err, MotionError::LeftPolygonGraph { .. }));
    }

    #[test]
    fn test_touches_nearest_edge() {
        let level = reference_level();
        let config = EntityKind::Player.config();
        let tuning = Tuning::default();
        let contact = entity_touches_level(
            level.view(),
            config,
            &tuning,
            Some(PolygonId(0)),
            Vec3::new(-250.0, -60.0, 0.0),
        );
        let Contact::Edge { push, .. } = contact else {
            panic!("expected an edge contact, got {:?}", contact);
        };
        // South wall is 4 away, west wall 6
        assert_eq!(push, Vec2::Y);
        assert_eq!(
            entity_touches_level(level.view(), config, &tuning, None, Vec3::ZERO),
            Contact::Void
        );
    }
}
