//! Fixed timestep simulation tick
//!
//! Pure snapshot-to-snapshot step. Given the same previous snapshot, command
//! batch, level and period it produces the same snapshot, so clients can
//! replay it for prediction and servers can treat it as canonical history.

use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use thiserror::Error;

use super::command::{Buttons, ClientId, Command, InputPayload, PlayerAction};
use super::motion::{MotionError, move_entity, support_height};
use super::mutator::{Mutator, MutatorStatus};
use super::state::{
    Entity, EntityId, EntityKind, EntityState, Snapshot, SnapshotBuilder, view_angles, view_rotation,
};
use crate::consts::{GEOM_EPSILON, PITCH_LIMIT_DEG};
use crate::level::{HitKind, Level, LevelView, LocationKind, Overlay, PolygonId};
use crate::tuning::Tuning;
use crate::{cartesian_to_polar, normalize_angle, polar_to_cartesian};

/// A tick that could not be completed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    #[error("{entity} left the level")]
    EntityLeftLevel {
        entity: EntityId,
        #[source]
        source: MotionError,
    },
}

/// Advance `previous` by one tick with the default tuning
pub fn tick_snapshot(
    previous: &Snapshot,
    commands: &[Command],
    level: &Level,
    tick_period_ms: f32,
) -> Result<Snapshot, TickError> {
    tick_snapshot_tuned(previous, commands, level, tick_period_ms, &Tuning::default())
}

/// Advance `previous` by one tick.
///
/// Commands are applied in the order given, so a join earlier in the batch
/// can be addressed by an input later in it.
pub fn tick_snapshot_tuned(
    previous: &Snapshot,
    commands: &[Command],
    level: &Level,
    tick_period_ms: f32,
    tuning: &Tuning,
) -> Result<Snapshot, TickError> {
    let mut next = previous.to_builder();
    next.clock += 1;
    let clock = next.clock;

    // Mutators
    let mut overlay = Overlay::new();
    next.mutators.retain(|id, mutator| {
        match mutator.think(level, clock, tick_period_ms, tuning, &mut overlay) {
            MutatorStatus::Active => true,
            MutatorStatus::Finished => {
                log::debug!("mutator {:?} finished at tick {}", id, clock);
                false
            }
        }
    });
    let view = LevelView::new(level, &overlay);

    // Commands
    for command in commands {
        match *command {
            Command::Input {
                client_id,
                clock: input_clock,
                input,
            } => apply_input(&mut next, view, tuning, client_id, input_clock, &input),
            Command::Player { client_id, action } => match action {
                PlayerAction::Add => add_player(&mut next, level, client_id),
                PlayerAction::Remove => remove_player(&mut next, client_id),
            },
        }
    }

    // Entities, in id order
    let dt = tick_period_ms / 1000.0;
    let friction = tuning.friction_for_period(tick_period_ms);
    for (&id, entity) in next.entities.iter_mut() {
        tick_entity(entity, view, tuning, dt, friction, clock)
            .map_err(|source| TickError::EntityLeftLevel { entity: id, source })?;
    }

    Ok(next.build())
}

/// Speed to add along one movement axis without passing the per-axis cap
fn axis_push(current: f32, axis: f32, tuning: &Tuning) -> f32 {
    if axis == 0.0 {
        return 0.0;
    }
    let room = tuning.max_move_speed - current * axis;
    if room <= 0.0 {
        return 0.0;
    }
    axis * tuning.move_force.min(room)
}

fn apply_input(
    next: &mut SnapshotBuilder,
    view: LevelView<'_>,
    tuning: &Tuning,
    client: ClientId,
    input_clock: u64,
    input: &InputPayload,
) {
    if input_clock != next.clock {
        log::debug!(
            "ignoring input from client {:?} for tick {} during tick {}",
            client,
            input_clock,
            next.clock
        );
        return;
    }
    let Some(&entity_id) = next.players.get(&client) else {
        log::debug!("ignoring input from client {:?} with no entity", client);
        return;
    };

    let previous = next.held_buttons.get(&client).copied().unwrap_or_default();
    let pressed = input.pressed_mask.unwrap_or(input.buttons.newly_pressed(previous));
    next.held_buttons.insert(client, input.buttons);

    let Some(entity) = next.entities.get_mut(&entity_id) else {
        return;
    };

    // Look
    let (yaw, pitch) = view_angles(entity.rotation);
    let limit = PITCH_LIMIT_DEG.to_radians();
    let yaw = normalize_angle(yaw + input.yaw);
    let pitch = (pitch + input.pitch).clamp(-limit, limit);
    entity.rotation = view_rotation(yaw, pitch);

    // Move: forward and strafe are capped independently
    let forward = Vec2::new(-yaw.sin(), yaw.cos());
    let right = Vec2::new(yaw.cos(), yaw.sin());
    let horizontal = entity.velocity.truncate();
    let forward_push = axis_push(
        horizontal.dot(forward),
        input.buttons.axis(Buttons::FORWARD, Buttons::BACK),
        tuning,
    );
    let strafe_push = axis_push(
        horizontal.dot(right),
        input.buttons.axis(Buttons::RIGHT, Buttons::LEFT),
        tuning,
    );
    entity.velocity += (forward * forward_push + right * strafe_push).extend(0.0);

    if pressed.contains(Buttons::JUMP) && entity.config().grounded {
        let support = support_height(view, tuning, entity);
        if entity.position.z <= support + GEOM_EPSILON {
            entity.velocity.z = tuning.jump_speed;
        }
    }

    if pressed.contains(Buttons::USE) {
        let eye = entity.position + Vec3::Z * tuning.eye_height(entity.config().height);
        let (polygon, direction) = (entity.polygon, entity.view_direction());
        use_line(next, view, tuning, polygon, eye, direction);
    }
}

/// Activate whatever the eye line reaches
fn use_line(
    next: &mut SnapshotBuilder,
    view: LevelView<'_>,
    tuning: &Tuning,
    polygon: PolygonId,
    eye: Vec3,
    direction: Vec3,
) {
    let Some(hit) = view.hitscan(polygon, eye, direction) else {
        return;
    };
    if hit.kind != HitKind::Wall || hit.position.distance(eye) > tuning.use_range {
        return;
    }
    let Some(back) = hit.edge.and_then(|edge| view.level().edge(edge).back_polygon) else {
        return;
    };
    if next.mutators.values().any(|m| m.targets(back)) {
        return;
    }
    let id = next.spawn_mutator(Mutator::lift(back, next.clock));
    log::debug!("mutator {:?} lifts {} at tick {}", id, back, next.clock);
}

fn add_player(next: &mut SnapshotBuilder, level: &Level, client: ClientId) {
    if next.players.contains_key(&client) {
        log::debug!("client {:?} already has an entity", client);
        return;
    }
    let spawns: Vec<_> = level
        .locations()
        .iter()
        .filter(|l| l.kind == LocationKind::PlayerSpawn)
        .collect();
    if spawns.is_empty() {
        log::warn!("no player spawn for client {:?}, join ignored", client);
        return;
    }

    let mut rng = Pcg32::seed_from_u64((next.clock << 32) | u64::from(client.0));
    let spawn = spawns[rng.random_range(0..spawns.len())];
    let mut entity = Entity::new(EntityKind::Player, spawn.polygon, spawn.position, spawn.rotation);
    entity.state_clock = next.clock;

    let id = next.spawn_entity(entity);
    next.players.insert(client, id);
    next.held_buttons.insert(client, Buttons::NONE);
    log::info!("client {:?} joined as {} in {}", client, id, spawn.polygon);
}

fn remove_player(next: &mut SnapshotBuilder, client: ClientId) {
    match next.remove_player(client) {
        Some(_) => log::info!("client {:?} left", client),
        None => log::debug!("ignoring leave from unknown client {:?}", client),
    }
}

fn tick_entity(
    entity: &mut Entity,
    view: LevelView<'_>,
    tuning: &Tuning,
    dt: f32,
    friction: f32,
    clock: u64,
) -> Result<(), MotionError> {
    let config = entity.config();

    if config.grounded && entity.position.z > support_height(view, tuning, entity) + GEOM_EPSILON {
        entity.velocity.z -= tuning.gravity * dt;
    }

    // Friction in polar form so it does not depend on direction
    let (speed, angle) = cartesian_to_polar(entity.velocity.truncate());
    let horizontal = if speed > 0.0 {
        polar_to_cartesian(speed * friction, angle)
    } else {
        Vec2::ZERO
    };
    entity.velocity.x = horizontal.x;
    entity.velocity.y = horizontal.y;

    let motion = move_entity(view, tuning, entity, dt)?;
    entity.position = motion.position;
    entity.polygon = motion.polygon;
    entity.velocity = motion.velocity;

    let epsilon = tuning.velocity_epsilon;
    for component in [&mut entity.velocity.x, &mut entity.velocity.y, &mut entity.velocity.z] {
        if component.abs() < epsilon {
            *component = 0.0;
        }
    }

    let state = if config.grounded && !motion.on_floor {
        EntityState::Airborne
    } else if entity.velocity != Vec3::ZERO {
        EntityState::Moving
    } else {
        EntityState::Idle
    };
    entity.set_state(state, clock);
    Ok(())
}
