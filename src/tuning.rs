//! Simulation tuning
//!
//! Every constant the tick engine reads. Client and server must run with the
//! same values or prediction will diverge from the authoritative history.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Data-driven simulation constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tuning {
    // === Movement ===
    /// Downward acceleration (units/s²)
    pub gravity: f32,
    /// Horizontal speed retained per elapsed millisecond
    pub friction_per_ms: f32,
    /// Speed added per input along each held axis (units/s)
    pub move_force: f32,
    /// Per-axis cap on input-driven speed (units/s)
    pub max_move_speed: f32,
    /// Vertical speed given by a jump (units/s)
    pub jump_speed: f32,
    /// Tallest floor rise an entity walks onto without being blocked
    pub step_height: f32,
    /// Velocity components smaller than this are snapped to zero
    pub velocity_epsilon: f32,

    // === Interaction ===
    /// Maximum reach of a USE press
    pub use_range: f32,
    /// Eye height as a fraction of entity height
    pub eye_height_fraction: f32,

    // === Lifts ===
    /// Lift floor travel speed (units/ms)
    pub lift_speed: f32,
    /// Time a lowered lift waits before rising (ms)
    pub lift_wait_ms: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            gravity: 800.0,
            friction_per_ms: 0.99,
            move_force: 40.0,
            max_move_speed: 320.0,
            jump_speed: 270.0,
            step_height: 24.0,
            velocity_epsilon: 0.01,

            use_range: 64.0,
            eye_height_fraction: 0.75,

            lift_speed: 0.128,
            lift_wait_ms: 2000.0,
        }
    }
}

/// Failure to read a tuning file
#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tuning JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Tuning {
    /// Parse tuning from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load tuning from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let tuning = Self::from_json(&json)?;
        log::info!("Loaded tuning from {}", path.as_ref().display());
        Ok(tuning)
    }

    /// Horizontal friction factor for one tick
    pub fn friction_for_period(&self, tick_period_ms: f32) -> f32 {
        self.friction_per_ms.powf(tick_period_ms)
    }

    /// Eye offset above the feet of an entity of the given height
    pub fn eye_height(&self, entity_height: f32) -> f32 {
        entity_height * self.eye_height_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let tuning = Tuning::from_json(r#"{ "gravity": 400.0, "stepHeight": 16 }"#).unwrap();
        assert_eq!(tuning.gravity, 400.0);
        assert_eq!(tuning.step_height, 16.0);
        assert_eq!(tuning.jump_speed, Tuning::default().jump_speed);
    }

    #[test]
    fn test_friction_for_period_compounds() {
        let tuning = Tuning::default();
        let per_two = tuning.friction_for_period(2.0);
        assert!((per_two - 0.99 * 0.99).abs() < 1e-6);
        assert_eq!(tuning.friction_for_period(0.0), 1.0);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(Tuning::from_json("{ gravity: }").is_err());
    }
}
