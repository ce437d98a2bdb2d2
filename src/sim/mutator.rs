//! Time-driven level changes
//!
//! A mutator never edits the level. Each tick its think function derives the
//! patched heights from the base level and the ticks elapsed since it was
//! activated, and writes them into that tick's [`Overlay`].

use serde::{Deserialize, Serialize};

use crate::level::{Level, Overlay, PolygonId};
use crate::tuning::Tuning;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutatorKind {
    /// Lower a polygon's floor to its lowest neighbour, wait, raise it back
    Lift { polygon: PolygonId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorStatus {
    Active,
    Finished,
}

/// An active level mutator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutator {
    pub kind: MutatorKind,
    /// Tick the mutator was spawned on
    pub activation_clock: u64,
}

impl Mutator {
    pub fn lift(polygon: PolygonId, activation_clock: u64) -> Self {
        Self {
            kind: MutatorKind::Lift { polygon },
            activation_clock,
        }
    }

    /// Whether this mutator drives `polygon`
    pub fn targets(&self, polygon: PolygonId) -> bool {
        match self.kind {
            MutatorKind::Lift { polygon: target } => target == polygon,
        }
    }

    /// Write this tick's patch into `overlay`
    pub fn think(
        &self,
        level: &Level,
        clock: u64,
        tick_period_ms: f32,
        tuning: &Tuning,
        overlay: &mut Overlay,
    ) -> MutatorStatus {
        let elapsed_ms = clock.saturating_sub(self.activation_clock) as f32 * tick_period_ms;
        match self.kind {
            MutatorKind::Lift { polygon } => lift_think(level, polygon, elapsed_ms, tuning, overlay),
        }
    }
}

/// Lowest floor among the polygons sharing a portal with `polygon`
fn lowest_neighbour_floor(level: &Level, polygon: PolygonId) -> Option<f32> {
    level
        .edges_of(polygon)
        .iter()
        .filter_map(|edge| edge.back_polygon)
        .map(|back| level.polygon(back).floor_height)
        .reduce(f32::min)
}

fn lift_think(
    level: &Level,
    polygon: PolygonId,
    elapsed_ms: f32,
    tuning: &Tuning,
    overlay: &mut Overlay,
) -> MutatorStatus {
    let top = level.polygon(polygon).floor_height;
    let Some(bottom) = lowest_neighbour_floor(level, polygon) else {
        return MutatorStatus::Finished;
    };
    if bottom >= top || tuning.lift_speed <= 0.0 {
        return MutatorStatus::Finished;
    }

    let travel_ms = (top - bottom) / tuning.lift_speed;
    let height = if elapsed_ms < travel_ms {
        top - tuning.lift_speed * elapsed_ms
    } else if elapsed_ms < travel_ms + tuning.lift_wait_ms {
        bottom
    } else if elapsed_ms < 2.0 * travel_ms + tuning.lift_wait_ms {
        bottom + tuning.lift_speed * (elapsed_ms - travel_ms - tuning.lift_wait_ms)
    } else {
        return MutatorStatus::Finished;
    };

    overlay.set_floor_height(polygon, height.clamp(bottom, top));
    MutatorStatus::Active
}
