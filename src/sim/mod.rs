//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No I/O, no clocks, no global state

pub mod command;
pub mod motion;
pub mod mutator;
pub mod state;
pub mod tick;

pub use command::{Buttons, ClientId, Command, InputPayload, PlayerAction};
pub use motion::{Contact, Motion, MotionError, entity_touches_level, move_entity};
pub use mutator::{Mutator, MutatorKind, MutatorStatus};
pub use state::{
    Entity, EntityConfig, EntityId, EntityKind, EntityState, MutatorId, Snapshot, SnapshotBuilder,
};
pub use tick::{TickError, tick_snapshot, tick_snapshot_tuned};
