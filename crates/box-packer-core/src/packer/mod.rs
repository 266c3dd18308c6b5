use crate::config::{PackerConfig, StrategyKind};
use crate::error::Result;
use crate::model::{PackingTask, PlacedObject};
use crate::runner::CancelToken;
use tracing::instrument;

pub mod branch_bound;
pub mod exact;
pub mod nfdh;
pub mod physics;

pub use branch_bound::BranchBoundPacker;
pub use exact::{ExactModel, ExactPacker};
pub use nfdh::NfdhPacker;
pub use physics::{Phase, PhysicsPacker, PhysicsPackingOrchestrator, SimulationBody, StepReport};

/// A packing strategy places the objects of a task into its container.
///
/// Implementations must never mutate the task, must return only input ids
/// (each at most once) and must keep every placement inside the usable area
/// without overlaps. Objects that cannot be placed are simply absent.
pub trait Packer: Send + Sync {
    fn name(&self) -> &'static str;
    fn pack(&self, task: &PackingTask, cancel: &CancelToken) -> Result<Vec<PlacedObject>>;
}

/// Builds the configured strategy with its built-in backend.
pub fn build_packer(cfg: &PackerConfig) -> Box<dyn Packer> {
    match cfg.strategy {
        StrategyKind::Physics => Box::new(PhysicsPacker::new(cfg.physics.clone(), cfg.allow_rotation)),
        StrategyKind::Exact => Box::new(ExactPacker::new(cfg.exact.clone(), cfg.allow_rotation)),
        StrategyKind::BranchAndBound => Box::new(BranchBoundPacker::new(
            cfg.branch_bound.clone(),
            cfg.allow_rotation,
        )),
        StrategyKind::Nfdh => Box::new(NfdhPacker::new(cfg.allow_rotation)),
    }
}

/// Validates `cfg` and runs the configured strategy on the calling thread.
#[instrument(skip_all, fields(strategy = cfg.strategy.name()))]
pub fn pack_task(task: &PackingTask, cfg: &PackerConfig) -> Result<Vec<PlacedObject>> {
    cfg.validate()?;
    task.validate()?;
    build_packer(cfg).pack(task, &CancelToken::new())
}
