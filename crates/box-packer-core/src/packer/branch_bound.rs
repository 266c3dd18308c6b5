use super::Packer;
use crate::config::BranchBoundConfig;
use crate::error::Result;
use crate::model::{LAYOUT_EPSILON, PackInputObject, PackingContainer, PackingTask, PlacedObject};
use crate::runner::CancelToken;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Depth-first branch and bound over grid positions.
///
/// Objects are taken by descending area. Each one is either placed at a free
/// position of a `grid_step` lattice anchored at the usable top-left corner,
/// or skipped. The largest placement count seen wins; branches that cannot
/// beat it even by placing every remaining object are cut.
pub struct BranchBoundPacker {
    config: BranchBoundConfig,
    allow_rotation: bool,
}

impl BranchBoundPacker {
    pub fn new(config: BranchBoundConfig, allow_rotation: bool) -> Self {
        Self {
            config,
            allow_rotation,
        }
    }
}

/// Offsets `0, step, 2*step, ..` up to `limit`.
fn lattice(limit: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = if limit < -LAYOUT_EPSILON {
        0
    } else {
        ((limit + LAYOUT_EPSILON) / step).floor() as u64 + 1
    };
    (0..count).map(move |k| k as f64 * step)
}

struct Search<'a> {
    objects: Vec<PackInputObject>,
    container: PackingContainer,
    step: f64,
    allow_rotation: bool,
    cancel: &'a CancelToken,
    deadline: Instant,
    current: Vec<PlacedObject>,
    best: Vec<PlacedObject>,
    nodes: u64,
    improvements: u32,
    timed_out: bool,
}

impl Search<'_> {
    fn finished(&self) -> bool {
        self.timed_out || self.best.len() == self.objects.len()
    }

    fn is_free(&self, candidate: &PlacedObject) -> bool {
        self.current
            .iter()
            .all(|p| !p.overlaps(candidate, LAYOUT_EPSILON))
    }

    fn branch(&mut self, index: usize) -> Result<()> {
        self.cancel.check()?;
        self.nodes += 1;
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return Ok(());
        }
        if self.current.len() > self.best.len() {
            self.best = self.current.clone();
            self.improvements += 1;
            debug!(
                best = self.best.len(),
                of = self.objects.len(),
                nodes = self.nodes,
                "new best"
            );
        }
        if index >= self.objects.len() || self.finished() {
            return Ok(());
        }
        // bound: even placing everything left cannot beat the best
        if self.current.len() + (self.objects.len() - index) <= self.best.len() {
            return Ok(());
        }

        let obj = self.objects[index];
        let mut orientations = vec![(obj.width, obj.height)];
        if self.allow_rotation && !obj.is_square() {
            orientations.push((obj.height, obj.width));
        }
        let (pad, uw, uh) = (
            self.container.padding,
            self.container.usable_width(),
            self.container.usable_height(),
        );
        for (w, h) in orientations {
            for x in lattice(uw - w, self.step) {
                for y in lattice(uh - h, self.step) {
                    let candidate = PlacedObject::from_top_left(obj.id, pad + x, pad + y, w, h);
                    if !self.is_free(&candidate) {
                        continue;
                    }
                    self.current.push(candidate);
                    self.branch(index + 1)?;
                    self.current.pop();
                    if self.finished() {
                        return Ok(());
                    }
                }
            }
        }

        self.branch(index + 1)
    }
}

impl Packer for BranchBoundPacker {
    fn name(&self) -> &'static str {
        "branch-and-bound"
    }

    #[instrument(skip_all, fields(objects = task.objects.len()))]
    fn pack(&self, task: &PackingTask, cancel: &CancelToken) -> Result<Vec<PlacedObject>> {
        task.validate()?;
        self.config.validate()?;
        let mut objects = task.objects.clone();
        objects.sort_by(|a, b| b.area().total_cmp(&a.area()));

        let mut search = Search {
            objects,
            container: task.container,
            step: self.config.grid_step,
            allow_rotation: self.allow_rotation,
            cancel,
            deadline: Instant::now() + Duration::from_millis(self.config.time_limit_ms),
            current: Vec::with_capacity(task.objects.len()),
            best: Vec::new(),
            nodes: 0,
            improvements: 0,
            timed_out: false,
        };
        search.branch(0)?;
        if search.timed_out {
            warn!(
                best = search.best.len(),
                nodes = search.nodes,
                "branch and bound ran out of time, keeping the best layout so far"
            );
        }
        info!(
            placed = search.best.len(),
            of = task.objects.len(),
            nodes = search.nodes,
            improvements = search.improvements,
            "branch and bound finished"
        );
        Ok(search.best)
    }
}
