//! Simulation state types
//!
//! A [`Snapshot`] is one tick's complete state and cannot be edited once
//! built. The tick engine works on a [`SnapshotBuilder`] copied from the
//! previous snapshot and freezes it into the next one.

use std::collections::BTreeMap;

use glam::{DVec3, EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::command::{Buttons, ClientId};
use super::mutator::Mutator;
use crate::level::{Level, LocationKind, PolygonId};

/// Identifies an entity within a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// Identifies a mutator within a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutatorId(pub u32);

/// Read-only shape/behaviour of an entity kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityConfig {
    pub radius: f32,
    pub height: f32,
    /// Affected by gravity
    pub grounded: bool,
}

const PLAYER: EntityConfig = EntityConfig {
    radius: 16.0,
    height: 56.0,
    grounded: true,
};

const BARREL: EntityConfig = EntityConfig {
    radius: 10.0,
    height: 32.0,
    grounded: true,
};

const LAMP: EntityConfig = EntityConfig {
    radius: 8.0,
    height: 48.0,
    grounded: false,
};

/// Entity kinds a level or a join can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Barrel,
    Lamp,
}

impl EntityKind {
    pub fn config(self) -> &'static EntityConfig {
        match self {
            EntityKind::Player => &PLAYER,
            EntityKind::Barrel => &BARREL,
            EntityKind::Lamp => &LAMP,
        }
    }
}

/// Coarse animation state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    #[default]
    Idle,
    Moving,
    Airborne,
}

/// Rotation for a view with the given yaw and pitch (radians)
pub fn view_rotation(yaw: f32, pitch: f32) -> Quat {
    Quat::from_euler(EulerRot::ZXY, yaw, pitch, 0.0)
}

/// Yaw and pitch (radians) encoded in a rotation
///
/// Yaw is read from the right axis, which pitch never tilts, so it survives
/// a view pinned at the pitch limit.
pub fn view_angles(rotation: Quat) -> (f32, f32) {
    let rotation = rotation.as_dquat();
    let right = rotation * DVec3::X;
    let forward = rotation * DVec3::Y;
    let yaw = right.y.atan2(right.x);
    let pitch = forward.z.atan2(forward.truncate().length());
    (yaw as f32, pitch as f32)
}

/// A dynamic actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "config")]
    pub kind: EntityKind,
    /// Polygon believed to contain the entity
    pub polygon: PolygonId,
    /// Feet position
    pub position: Vec3,
    pub rotation: Quat,
    /// Units per second
    pub velocity: Vec3,
    #[serde(default)]
    pub state: EntityState,
    /// Tick the current state began
    #[serde(default)]
    pub state_clock: u64,
}

impl Entity {
    pub fn new(kind: EntityKind, polygon: PolygonId, position: Vec3, rotation: Quat) -> Self {
        Self {
            kind,
            polygon,
            position,
            rotation,
            velocity: Vec3::ZERO,
            state: EntityState::Idle,
            state_clock: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &'static EntityConfig {
        self.kind.config()
    }

    /// Unit vector the entity is looking along
    pub fn view_direction(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Change state, stamping the tick it changed on
    pub fn set_state(&mut self, state: EntityState, clock: u64) {
        if self.state != state {
            self.state = state;
            self.state_clock = clock;
        }
    }
}

/// Complete simulation state at one tick (immutable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    clock: u64,
    entities: BTreeMap<EntityId, Entity>,
    players: BTreeMap<ClientId, EntityId>,
    held_buttons: BTreeMap<ClientId, Buttons>,
    mutators: BTreeMap<MutatorId, Mutator>,
    next_entity_id: u32,
    next_mutator_id: u32,
}

impl Snapshot {
    /// Tick 0 for a level: every entity location unpacked, no players
    pub fn initial(level: &Level) -> Self {
        let mut builder = SnapshotBuilder::default();
        for location in level.locations() {
            if location.kind != LocationKind::Entity {
                continue;
            }
            if let Some(kind) = location.entity_kind {
                builder.spawn_entity(Entity::new(
                    kind,
                    location.polygon,
                    location.position,
                    location.rotation,
                ));
            }
        }
        builder.build()
    }

    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, Entity> {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn players(&self) -> &BTreeMap<ClientId, EntityId> {
        &self.players
    }

    /// Entity controlled by a client
    pub fn player_entity(&self, client: ClientId) -> Option<&Entity> {
        self.players.get(&client).and_then(|id| self.entities.get(id))
    }

    pub fn held_buttons(&self, client: ClientId) -> Buttons {
        self.held_buttons.get(&client).copied().unwrap_or_default()
    }

    pub fn mutators(&self) -> &BTreeMap<MutatorId, Mutator> {
        &self.mutators
    }

    /// Copy into a working value for producing a new snapshot
    pub fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            clock: self.clock,
            entities: self.entities.clone(),
            players: self.players.clone(),
            held_buttons: self.held_buttons.clone(),
            mutators: self.mutators.clone(),
            next_entity_id: self.next_entity_id,
            next_mutator_id: self.next_mutator_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Mutable working copy of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBuilder {
    pub clock: u64,
    pub entities: BTreeMap<EntityId, Entity>,
    pub players: BTreeMap<ClientId, EntityId>,
    pub held_buttons: BTreeMap<ClientId, Buttons>,
    pub mutators: BTreeMap<MutatorId, Mutator>,
    next_entity_id: u32,
    next_mutator_id: u32,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self {
            clock: 0,
            entities: BTreeMap::new(),
            players: BTreeMap::new(),
            held_buttons: BTreeMap::new(),
            mutators: BTreeMap::new(),
            next_entity_id: 1,
            next_mutator_id: 1,
        }
    }
}

impl SnapshotBuilder {
    /// Allocate a new entity ID
    pub fn allocate_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        id
    }

    /// Allocate a new mutator ID
    pub fn allocate_mutator_id(&mut self) -> MutatorId {
        let id = MutatorId(self.next_mutator_id);
        self.next_mutator_id += 1;
        id
    }

    pub fn spawn_entity(&mut self, entity: Entity) -> EntityId {
        let id = self.allocate_entity_id();
        self.entities.insert(id, entity);
        id
    }

    pub fn spawn_mutator(&mut self, mutator: Mutator) -> MutatorId {
        let id = self.allocate_mutator_id();
        self.mutators.insert(id, mutator);
        id
    }

    /// Drop a client's entity and bookkeeping, returning the entity
    pub fn remove_player(&mut self, client: ClientId) -> Option<Entity> {
        self.held_buttons.remove(&client);
        let id = self.players.remove(&client)?;
        self.entities.remove(&id)
    }

    /// Freeze into an immutable snapshot
    pub fn build(self) -> Snapshot {
        Snapshot {
            clock: self.clock,
            entities: self.entities,
            players: self.players,
            held_buttons: self.held_buttons,
            mutators: self.mutators,
            next_entity_id: self.next_entity_id,
            next_mutator_id: self.next_mutator_id,
        }
    }
}
