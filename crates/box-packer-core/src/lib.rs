//! Core library for packing rectangular boxes into a container.
//!
//! - Strategies: physics (drop/settle/rotate/shake/gap-fill), exact constraint model with
//!   decreasing-subset fallback, and an NFDH shelf baseline, all behind the `Packer` trait
//! - Ports: `PhysicsWorld` (built-in `AabbWorld`) and `ConstraintSolver` (built-in `BacktrackingSolver`)
//! - `TaskRunner` runs one task at a time on a worker thread with cooperative cancellation
//! - Data model is serde-serializable; the CLI crate reads tasks and writes layouts as JSON.
//!
//! Quick example:
//! ```ignore
//! use box_packer_core::prelude::*;
//! # fn main() -> box_packer_core::Result<()> {
//! let task = PackingTask::new(
//!     PackingContainer::new(400.0, 300.0, 5.0),
//!     vec![PackInputObject::new(1, 120.0, 80.0), PackInputObject::new(2, 60.0, 60.0)],
//! );
//! let cfg = PackerConfig::builder().strategy(StrategyKind::Exact).build();
//! let placed = pack_task(&task, &cfg)?;
//! println!("{}", PackStats::from_layout(&task, &placed).summary());
//! # Ok(()) }
//! ```

pub mod config;
pub mod empty_area;
pub mod error;
pub mod model;
pub mod packer;
pub mod physics_world;
pub mod raster;
pub mod runner;
pub mod solver;
pub mod tracker;

pub use config::*;
pub use empty_area::find_empty_areas;
pub use error::*;
pub use model::*;
pub use packer::*;
pub use raster::OccupancyRaster;
pub use runner::{CancelToken, TaskEvent, TaskId, TaskOutcome, TaskRunner, TaskStatus};
pub use tracker::{StationarityThresholds, StationarityTracker};

/// Convenience prelude for common types and functions.
/// Importing `box_packer_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{
        BranchBoundConfig, ExactConfig, PackerConfig, PackerConfigBuilder, PhysicsConfig,
        StrategyKind,
    };
    pub use crate::model::{
        PackInputObject, PackStats, PackingContainer, PackingTask, PlacedObject, Rect,
        validate_layout,
    };
    pub use crate::physics_world::{AabbWorld, PhysicsWorld, Vec2};
    pub use crate::runner::{CancelToken, TaskRunner, TaskStatus};
    pub use crate::solver::{BacktrackingSolver, ConstraintSolver};
    pub use crate::{Packer, build_packer, find_empty_areas, pack_task};
}
