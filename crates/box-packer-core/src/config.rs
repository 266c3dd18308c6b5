use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Packing strategies and their configuration.
/// Key notes:
///   - `strategy` selects Physics/Exact/BranchAndBound/Nfdh
///   - `physics` tunes the drop/settle/rotate/shake/gap-fill simulation
///   - `exact` bounds each solve attempt and the subset search
///   - `branch_bound` sets the position lattice and time budget of the grid search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Drop the objects into a simulated container, settle, snap, shake, and fill gaps.
    Physics,
    /// Constraint model per candidate subset; largest feasible subset found first wins.
    Exact,
    /// Depth-first search over lattice positions keeping the largest placement count.
    #[serde(rename = "branch-and-bound", alias = "bnb")]
    BranchAndBound,
    /// Next-Fit Decreasing Height shelves (fast baseline).
    Nfdh,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Physics => "physics",
            Self::Exact => "exact",
            Self::BranchAndBound => "branch-and-bound",
            Self::Nfdh => "nfdh",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "physics" | "phys" => Ok(Self::Physics),
            "exact" | "cp" => Ok(Self::Exact),
            "branch-and-bound" | "bnb" | "bb" => Ok(Self::BranchAndBound),
            "nfdh" | "simple" => Ok(Self::Nfdh),
            _ => Err(()),
        }
    }
}

/// Settings of the physics strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (length units / s²). Positive y points down into the container.
    pub gravity: (f64, f64),
    /// Fraction of velocity kept per simulated second.
    pub damping: f64,
    /// Contact resolution passes per step.
    pub solver_iterations: usize,
    /// Fixed simulation timestep in seconds.
    pub time_step: f64,

    pub body_mass: f64,
    pub body_friction: f64,
    pub body_elasticity: f64,

    /// Consecutive all-stationary steps required to leave the settle phase.
    pub stationary_threshold: usize,
    /// Per-step displacement below which a body counts as stationary.
    pub position_threshold: f64,
    /// Per-step rotation (radians) below which a body counts as stationary.
    pub angle_threshold: f64,
    /// Allowed orientations the rotate phase snaps to.
    pub rotation_angles_deg: Vec<f64>,

    /// Simulated seconds of shaking after the rotate phase.
    pub shake_duration: f64,
    /// Impulse magnitude while settling, if `initial_shake_duration` > 0.
    pub initial_shake_strength: f64,
    /// Simulated seconds of shaking at the start of the settle phase (0 disables).
    pub initial_shake_duration: f64,
    /// Impulse magnitude after the rotate phase.
    pub post_rotation_shake_strength: f64,

    /// Vertical gap between dropped objects.
    pub object_spacing: f64,
    /// How far the side walls reach above the container.
    pub boundary_depth: f64,
    /// Edge length of one occupancy raster cell.
    pub raster_cell_size: f64,

    /// Seed for drop jitter and shake impulses. None draws from entropy.
    pub seed: Option<u64>,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: (0.0, 1000.0),
            damping: 0.9,
            solver_iterations: 50,
            time_step: 1.0 / 60.0,
            body_mass: 0.1,
            body_friction: 0.5,
            body_elasticity: 0.0,
            stationary_threshold: 3,
            position_threshold: 3.0,
            angle_threshold: 0.03,
            rotation_angles_deg: vec![0.0, 90.0, 180.0, 270.0],
            shake_duration: 4.0,
            initial_shake_strength: 10.0,
            initial_shake_duration: 4.0,
            post_rotation_shake_strength: 2.0,
            object_spacing: 10.0,
            boundary_depth: 10000.0,
            raster_cell_size: 1.0,
            seed: None,
        }
    }
}

impl PhysicsConfig {
    /// Allowed orientations in radians, normalized to `[0, 2π)`.
    pub fn rotation_angles_rad(&self) -> Vec<f64> {
        self.rotation_angles_deg
            .iter()
            .map(|d| d.to_radians().rem_euclid(std::f64::consts::TAU))
            .collect()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::PackingError;

        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(PackingError::InvalidConfig(format!(
                "physics.time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.body_mass > 0.0) {
            return Err(PackingError::InvalidConfig(format!(
                "physics.body_mass must be positive, got {}",
                self.body_mass
            )));
        }
        if self.stationary_threshold == 0 {
            return Err(PackingError::InvalidConfig(
                "physics.stationary_threshold must be at least 1".into(),
            ));
        }
        if self.rotation_angles_deg.is_empty() {
            return Err(PackingError::InvalidConfig(
                "physics.rotation_angles_deg must list at least one angle".into(),
            ));
        }
        if !(self.raster_cell_size > 0.0) {
            return Err(PackingError::InvalidConfig(format!(
                "physics.raster_cell_size must be positive, got {}",
                self.raster_cell_size
            )));
        }
        if self.shake_duration < 0.0 || self.initial_shake_duration < 0.0 {
            return Err(PackingError::InvalidConfig(
                "physics shake durations must not be negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.damping) || !(0.0..=1.0).contains(&self.body_friction) {
            return Err(PackingError::InvalidConfig(
                "physics.damping and physics.body_friction must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

/// Settings of the exact strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExactConfig {
    /// Wall-clock budget of one solve attempt in milliseconds.
    pub time_limit_ms: u64,
    /// Retry with smaller subsets when the full set has no solution.
    pub try_subsets: bool,
    /// Combinations tried per subset size when the size exceeds `small_subset_max_size`.
    pub large_subset_attempts: usize,
    /// Combinations tried per subset size up to `small_subset_max_size`.
    pub small_subset_attempts: usize,
    pub small_subset_max_size: usize,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 300_000,
            try_subsets: true,
            large_subset_attempts: 20,
            small_subset_attempts: 100,
            small_subset_max_size: 8,
        }
    }
}

impl ExactConfig {
    /// Combination budget for one subset size.
    pub fn attempts_for(&self, size: usize) -> usize {
        if size > self.small_subset_max_size {
            self.large_subset_attempts
        } else {
            self.small_subset_attempts
        }
    }
}

/// Settings of the branch-and-bound strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BranchBoundConfig {
    /// Spacing of candidate top-left positions, in container units.
    pub grid_step: f64,
    /// Wall-clock budget of the whole search; the best layout so far is kept when it runs out.
    pub time_limit_ms: u64,
}

impl Default for BranchBoundConfig {
    fn default() -> Self {
        Self {
            grid_step: 5.0,
            time_limit_ms: 60_000,
        }
    }
}

impl BranchBoundConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::PackingError;

        if !(self.grid_step > 0.0 && self.grid_step.is_finite()) {
            return Err(PackingError::InvalidConfig(format!(
                "branch_bound.grid_step must be positive, got {}",
                self.grid_step
            )));
        }
        if self.time_limit_ms == 0 {
            return Err(PackingError::InvalidConfig(
                "branch_bound.time_limit_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackerConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Allow 90° rotations of non-square objects.
    #[serde(default = "default_allow_rotation")]
    pub allow_rotation: bool,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub exact: ExactConfig,
    #[serde(default)]
    pub branch_bound: BranchBoundConfig,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            allow_rotation: default_allow_rotation(),
            physics: PhysicsConfig::default(),
            exact: ExactConfig::default(),
            branch_bound: BranchBoundConfig::default(),
        }
    }
}

impl PackerConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if physics timing/thresholds are unusable, the exact
    /// solver has no time budget or the branch-and-bound lattice is degenerate.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::PackingError;

        self.physics.validate()?;
        if self.exact.time_limit_ms == 0 {
            return Err(PackingError::InvalidConfig(
                "exact.time_limit_ms must be greater than zero".into(),
            ));
        }
        self.branch_bound.validate()
    }
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Physics
}
fn default_allow_rotation() -> bool {
    true
}

/// Builder for `PackerConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct PackerConfigBuilder {
    cfg: PackerConfig,
}

impl PackerConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PackerConfig::default(),
        }
    }
    pub fn strategy(mut self, v: StrategyKind) -> Self {
        self.cfg.strategy = v;
        self
    }
    pub fn allow_rotation(mut self, v: bool) -> Self {
        self.cfg.allow_rotation = v;
        self
    }
    pub fn physics(mut self, v: PhysicsConfig) -> Self {
        self.cfg.physics = v;
        self
    }
    pub fn exact(mut self, v: ExactConfig) -> Self {
        self.cfg.exact = v;
        self
    }
    pub fn branch_bound(mut self, v: BranchBoundConfig) -> Self {
        self.cfg.branch_bound = v;
        self
    }
    pub fn grid_step(mut self, v: f64) -> Self {
        self.cfg.branch_bound.grid_step = v;
        self
    }
    pub fn seed(mut self, v: Option<u64>) -> Self {
        self.cfg.physics.seed = v;
        self
    }
    pub fn time_step(mut self, v: f64) -> Self {
        self.cfg.physics.time_step = v;
        self
    }
    pub fn shake_duration(mut self, v: f64) -> Self {
        self.cfg.physics.shake_duration = v;
        self
    }
    pub fn raster_cell_size(mut self, v: f64) -> Self {
        self.cfg.physics.raster_cell_size = v;
        self
    }
    pub fn time_limit_ms(mut self, v: u64) -> Self {
        self.cfg.exact.time_limit_ms = v;
        self
    }
    pub fn try_subsets(mut self, v: bool) -> Self {
        self.cfg.exact.try_subsets = v;
        self
    }
    pub fn build(self) -> PackerConfig {
        self.cfg
    }
}

impl PackerConfig {
    /// Create a fluent builder for `PackerConfig`.
    pub fn builder() -> PackerConfigBuilder {
        PackerConfigBuilder::new()
    }
}
