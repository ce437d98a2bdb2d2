//! Sector Sim - sector/portal levels with a deterministic tick simulation
//!
//! Core modules:
//! - `level`: Immutable polygon/portal geometry and its queries
//! - `sim`: Deterministic simulation (commands, motion, mutators, snapshots)
//! - `sync`: Server snapshot history and client-side prediction
//! - `tuning`: Data-driven simulation constants

pub mod level;
pub mod sim;
pub mod sync;
pub mod tuning;

pub use level::{Hit, HitKind, Level, LevelError, LevelView, PolygonId};
pub use sim::{Command, Snapshot, TickError, tick_snapshot};
pub use tuning::Tuning;

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Default fixed tick period (~60 Hz)
    pub const TICK_PERIOD_MS: f32 = 1000.0 / 60.0;
    /// Maximum ticks per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Snapshots kept by the server history
    pub const HISTORY_CAPACITY: usize = 64;

    /// Pitch limit (degrees) short of straight up/down
    pub const PITCH_LIMIT_DEG: f32 = 89.999;

    /// Tolerance for geometric comparisons (map units)
    pub const GEOM_EPSILON: f32 = 1e-4;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Convert cartesian (x, y) to polar (r, theta)
#[inline]
pub fn cartesian_to_polar(pos: Vec2) -> (f32, f32) {
    (pos.length(), pos.y.atan2(pos.x))
}
