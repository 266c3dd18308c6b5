use crate::physics_world::{Vec2, normalize_angle};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Per-step movement limits below which a body counts as at rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StationarityThresholds {
    pub position: f64,
    /// Radians.
    pub angle: f64,
}

impl Default for StationarityThresholds {
    fn default() -> Self {
        Self {
            position: 3.0,
            angle: 0.03,
        }
    }
}

/// Remembers the last observed pose of one body and reports whether it moved.
#[derive(Debug, Clone)]
pub struct StationarityTracker {
    prev_position: Vec2,
    prev_angle: f64,
    thresholds: StationarityThresholds,
}

impl StationarityTracker {
    pub fn new(position: Vec2, angle: f64, thresholds: StationarityThresholds) -> Self {
        Self {
            prev_position: position,
            prev_angle: normalize_angle(angle),
            thresholds,
        }
    }

    /// True if both displacement and rotation since the reference are under the thresholds.
    pub fn is_stationary(&self, position: Vec2, angle: f64) -> bool {
        let moved = position.distance(self.prev_position);
        let turned = angle_delta(self.prev_angle, normalize_angle(angle));
        moved < self.thresholds.position && turned < self.thresholds.angle
    }

    /// Commits `position`/`angle` as the new reference.
    pub fn update(&mut self, position: Vec2, angle: f64) {
        self.prev_position = position;
        self.prev_angle = normalize_angle(angle);
    }

    /// Checks against the reference, then commits the observation.
    pub fn observe(&mut self, position: Vec2, angle: f64) -> bool {
        let still = self.is_stationary(position, angle);
        self.update(position, angle);
        still
    }

    pub fn reference(&self) -> (Vec2, f64) {
        (self.prev_position, self.prev_angle)
    }

    pub fn thresholds(&self) -> StationarityThresholds {
        self.thresholds
    }
}

/// Shortest circular distance between two angles already in `[0, 2π)`.
pub(crate) fn angle_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % TAU;
    d.min(TAU - d)
}
