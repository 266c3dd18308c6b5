//! Physics-driven packing: drop the objects into a simulated container, let
//! them settle, snap their rotations, shake them down, then re-insert every
//! misplaced object into the leftover free rectangles.

use super::Packer;
use crate::config::PhysicsConfig;
use crate::empty_area::find_empty_areas;
use crate::error::Result;
use crate::model::{
    LAYOUT_EPSILON, ObjectId, PackInputObject, PackingContainer, PackingTask, PlacedObject, Rect,
};
use crate::physics_world::{
    AabbWorld, BodyHandle, BoxBodyDesc, PhysicsWorld, Pose, Vec2, normalize_angle,
    orientation_extent,
};
use crate::raster::OccupancyRaster;
use crate::runner::CancelToken;
use crate::tracker::{StationarityThresholds, StationarityTracker, angle_delta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::marker::PhantomData;
use tracing::{debug, info, instrument};

/// Bodies overlapping by more than this are separated during gap-fill.
const EVICTION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Drop,
    Settle { calm_steps: usize, elapsed: f64 },
    Rotate { next: usize },
    Shake { remaining: f64 },
    GapFill,
    Done,
}

/// What one update observed; input of `Phase::transition`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub body_count: usize,
    pub all_stationary: bool,
    pub dt: f64,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Drop => "drop",
            Phase::Settle { .. } => "settle",
            Phase::Rotate { .. } => "rotate",
            Phase::Shake { .. } => "shake",
            Phase::GapFill => "gap-fill",
            Phase::Done => "done",
        }
    }

    /// The single place where phases advance.
    pub fn transition(self, report: &StepReport, cfg: &PhysicsConfig) -> Phase {
        match self {
            Phase::Drop if report.body_count == 0 => Phase::Done,
            Phase::Drop => Phase::Settle {
                calm_steps: 0,
                elapsed: 0.0,
            },
            Phase::Settle {
                calm_steps,
                elapsed,
            } => {
                let calm_steps = if report.all_stationary { calm_steps + 1 } else { 0 };
                if calm_steps >= cfg.stationary_threshold {
                    Phase::Rotate { next: 0 }
                } else {
                    Phase::Settle {
                        calm_steps,
                        elapsed: elapsed + report.dt,
                    }
                }
            }
            Phase::Rotate { next } if next + 1 >= report.body_count => Phase::Shake {
                remaining: cfg.shake_duration,
            },
            Phase::Rotate { next } => Phase::Rotate { next: next + 1 },
            Phase::Shake { remaining } => {
                let remaining = remaining - report.dt;
                if remaining <= 0.0 {
                    Phase::GapFill
                } else {
                    Phase::Shake { remaining }
                }
            }
            Phase::GapFill | Phase::Done => Phase::Done,
        }
    }
}

/// One simulated object.
#[derive(Debug, Clone)]
pub struct SimulationBody {
    pub object: PackInputObject,
    pub handle: BodyHandle,
    tracker: StationarityTracker,
    rotation_locked: bool,
}

impl SimulationBody {
    pub fn rotation_locked(&self) -> bool {
        self.rotation_locked
    }
}

/// Drives one physics packing run over a `PhysicsWorld`.
pub struct PhysicsPackingOrchestrator<W: PhysicsWorld> {
    world: W,
    container: PackingContainer,
    config: PhysicsConfig,
    allow_rotation: bool,
    allowed_angles: Vec<f64>,
    pending: Vec<PackInputObject>,
    rejected: Vec<ObjectId>,
    bodies: Vec<SimulationBody>,
    phase: Phase,
    rng: StdRng,
    steps: u64,
    simulated: f64,
    empty_areas: Vec<Rect>,
}

impl<W: PhysicsWorld> PhysicsPackingOrchestrator<W> {
    /// Objects that fit in no allowed orientation are rejected here; the rest are
    /// sorted by descending area (stable).
    pub fn new(
        world: W,
        container: PackingContainer,
        objects: &[PackInputObject],
        config: PhysicsConfig,
        allow_rotation: bool,
    ) -> Result<Self> {
        config.validate()?;
        let (mut pending, rejected): (Vec<PackInputObject>, Vec<PackInputObject>) = objects
            .iter()
            .partition(|o| {
                container.fits(o.width, o.height)
                    || (allow_rotation && container.fits(o.height, o.width))
            });
        pending.sort_by(|a, b| b.area().total_cmp(&a.area()));
        if !rejected.is_empty() {
            info!(rejected = rejected.len(), "objects larger than the container were rejected");
        }

        let allowed_angles = if allow_rotation {
            config.rotation_angles_rad()
        } else {
            vec![0.0]
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            world,
            container,
            config,
            allow_rotation,
            allowed_angles,
            pending,
            rejected: rejected.into_iter().map(|o| o.id).collect(),
            bodies: Vec::new(),
            phase: Phase::Drop,
            rng,
            steps: 0,
            simulated: 0.0,
            empty_areas: Vec::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn bodies(&self) -> &[SimulationBody] {
        &self.bodies
    }

    /// Ids rejected before simulation because they fit in no orientation.
    pub fn rejected(&self) -> &[ObjectId] {
        &self.rejected
    }

    /// Free rectangles (raster cells) found by the last gap-fill.
    pub fn empty_areas(&self) -> &[Rect] {
        &self.empty_areas
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated seconds so far.
    pub fn simulated_time(&self) -> f64 {
        self.simulated
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Advances the run by one timestep of `dt` seconds.
    pub fn update(&mut self, dt: f64) -> Result<()> {
        let mut all_stationary = false;
        match self.phase {
            Phase::Done => return Ok(()),
            Phase::Drop => self.drop_bodies()?,
            Phase::Settle { elapsed, .. } => {
                if elapsed < self.config.initial_shake_duration {
                    self.shake(self.config.initial_shake_strength)?;
                }
                self.step_world(dt)?;
                all_stationary = self.observe_trackers()?;
            }
            Phase::Rotate { next } => {
                self.snap_rotation(next)?;
                self.step_world(dt)?;
            }
            Phase::Shake { .. } => {
                self.shake(self.config.post_rotation_shake_strength)?;
                self.step_world(dt)?;
            }
            Phase::GapFill => self.gap_fill()?,
        }
        let report = StepReport {
            body_count: self.bodies.len(),
            all_stationary,
            dt,
        };
        let next = self.phase.transition(&report, &self.config);
        if std::mem::discriminant(&next) != std::mem::discriminant(&self.phase) {
            debug!(
                from = self.phase.name(),
                to = next.name(),
                steps = self.steps,
                simulated = self.simulated,
                "phase change"
            );
        }
        self.phase = next;
        Ok(())
    }

    /// Steps until done, checking `cancel` before every step.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<Vec<PlacedObject>> {
        let dt = self.config.time_step;
        while !self.is_done() {
            cancel.check()?;
            self.update(dt)?;
        }
        self.placements()
    }

    /// Current placement of every body, using its orientation-adjusted extent.
    pub fn placements(&self) -> Result<Vec<PlacedObject>> {
        self.bodies.iter().map(|b| self.placement_of(b)).collect()
    }

    fn placement_of(&self, body: &SimulationBody) -> Result<PlacedObject> {
        let pose = self.world.pose(body.handle)?;
        let (w, h) = orientation_extent(body.object.width, body.object.height, pose.angle);
        Ok(PlacedObject {
            id: body.object.id,
            center_x: pose.position.x,
            center_y: pose.position.y,
            width: w,
            height: h,
        })
    }

    fn step_world(&mut self, dt: f64) -> Result<()> {
        self.world.step(dt)?;
        self.steps += 1;
        self.simulated += dt;
        Ok(())
    }

    fn body_desc(&self, pose: Pose, obj: &PackInputObject) -> BoxBodyDesc {
        BoxBodyDesc {
            width: obj.width,
            height: obj.height,
            mass: self.config.body_mass,
            friction: self.config.body_friction,
            elasticity: self.config.body_elasticity,
            pose,
        }
    }

    fn drop_bodies(&mut self) -> Result<()> {
        let c = self.container;
        let (left, right) = (c.padding, c.width - c.padding);
        let floor = c.height - c.padding;
        let top = -self.config.boundary_depth;
        self.world.add_static_segment(Vec2::new(left, floor), Vec2::new(right, floor))?;
        self.world.add_static_segment(Vec2::new(left, top), Vec2::new(left, floor))?;
        self.world.add_static_segment(Vec2::new(right, top), Vec2::new(right, floor))?;

        let thresholds = StationarityThresholds {
            position: self.config.position_threshold,
            angle: self.config.angle_threshold,
        };
        let pending = std::mem::take(&mut self.pending);
        // first object starts just inside the top edge, the rest stack upwards
        let mut next_bottom: Option<f64> = None;
        for obj in pending {
            let upright = c.fits(obj.width, obj.height);
            let (angle, (w, h)) = if upright {
                (0.0, (obj.width, obj.height))
            } else {
                (FRAC_PI_2, (obj.height, obj.width))
            };
            let slack = (c.usable_width() - w).max(0.0);
            let offset = if slack > 0.0 {
                self.rng.gen_range(0.0..=slack)
            } else {
                0.0
            };
            let top = match next_bottom {
                None => c.padding,
                Some(bottom) => bottom - h,
            };
            next_bottom = Some(top - self.config.object_spacing);
            let center = Vec2::new(c.padding + offset + w / 2.0, top + h / 2.0);

            let desc = self.body_desc(Pose::new(center, angle), &obj);
            let handle = self.world.add_dynamic_box(&desc)?;
            let locked = !self.allow_rotation;
            if locked {
                self.world.set_rotation_locked(handle, true)?;
            }
            self.bodies.push(SimulationBody {
                object: obj,
                handle,
                tracker: StationarityTracker::new(center, angle, thresholds),
                rotation_locked: locked,
            });
        }
        info!(bodies = self.bodies.len(), "objects dropped");
        Ok(())
    }

    fn observe_trackers(&mut self) -> Result<bool> {
        let mut all = true;
        for body in &mut self.bodies {
            let pose = self.world.pose(body.handle)?;
            all &= body.tracker.observe(pose.position, pose.angle);
        }
        Ok(all)
    }

    fn snap_rotation(&mut self, index: usize) -> Result<()> {
        let Some(body) = self.bodies.get_mut(index) else {
            return Ok(());
        };
        let pose = self.world.pose(body.handle)?;
        let angle = normalize_angle(pose.angle);
        let snapped = self
            .allowed_angles
            .iter()
            .copied()
            .min_by(|a, b| angle_delta(angle, *a).total_cmp(&angle_delta(angle, *b)))
            .unwrap_or(0.0);
        self.world.set_pose(body.handle, Pose::new(pose.position, snapped))?;
        self.world.set_velocity(body.handle, Vec2::ZERO, 0.0)?;
        self.world.set_rotation_locked(body.handle, true)?;
        body.rotation_locked = true;
        Ok(())
    }

    fn shake(&mut self, strength: f64) -> Result<()> {
        if strength <= 0.0 {
            return Ok(());
        }
        for body in &self.bodies {
            let dir = self.rng.gen_range(0.0..TAU);
            let magnitude = self.rng.gen_range(0.0..=strength);
            self.world.apply_impulse(body.handle, Vec2::from_angle(dir) * magnitude)?;
        }
        Ok(())
    }

    fn gap_fill(&mut self) -> Result<()> {
        let bodies = std::mem::take(&mut self.bodies);
        let mut kept: Vec<SimulationBody> = Vec::with_capacity(bodies.len());
        let mut kept_boxes: Vec<PlacedObject> = Vec::with_capacity(bodies.len());
        let mut evicted: Vec<SimulationBody> = Vec::new();
        for body in bodies {
            let placed = self.placement_of(&body)?;
            let outside = !placed.inside(&self.container, LAYOUT_EPSILON);
            let clashing = kept_boxes.iter().any(|k| k.overlaps(&placed, EVICTION_TOLERANCE));
            if outside || clashing {
                debug!(id = body.object.id, outside, clashing, "evicting body");
                self.world.remove_body(body.handle)?;
                evicted.push(body);
            } else {
                kept_boxes.push(placed);
                kept.push(body);
            }
        }

        let cell = self.config.raster_cell_size;
        let raster = OccupancyRaster::from_layout(&self.container, &kept_boxes, cell)?;
        let mut free = find_empty_areas(&raster);
        self.empty_areas = free.clone();
        let evicted_count = evicted.len();
        let mut refilled = 0usize;

        for body in evicted {
            let obj = body.object;
            let mut orientations = vec![(obj.width, obj.height, 0.0)];
            if self.allow_rotation && !obj.is_square() {
                orientations.push((obj.height, obj.width, FRAC_PI_2));
            }
            let cells = |v: f64| ((v / cell) - LAYOUT_EPSILON).ceil().max(1.0) as u32;
            let fit = free.iter().enumerate().find_map(|(i, r)| {
                orientations
                    .iter()
                    .find(|(w, h, _)| cells(*w) <= r.w && cells(*h) <= r.h)
                    .map(|o| (i, *o))
            });
            let Some((i, (w, h, angle))) = fit else {
                debug!(id = obj.id, "no free area for evicted object");
                continue;
            };

            let slot = free.swap_remove(i);
            let used = Rect::new(slot.x, slot.y, cells(w), cells(h));
            let (a, b) = split_free_rect(&slot, &used);
            free.extend(a);
            free.extend(b);

            let (x0, y0, _, _) = OccupancyRaster::cell_rect_to_world(&slot, cell);
            let center = Vec2::new(x0 + w / 2.0, y0 + h / 2.0);
            let desc = self.body_desc(Pose::new(center, angle), &obj);
            let handle = self.world.add_dynamic_box(&desc)?;
            self.world.set_rotation_locked(handle, true)?;
            kept.push(SimulationBody {
                object: obj,
                handle,
                tracker: body.tracker,
                rotation_locked: true,
            });
            refilled += 1;
        }
        info!(
            kept = kept.len() - refilled,
            evicted = evicted_count,
            refilled,
            free_areas = self.empty_areas.len(),
            "gap-fill done"
        );
        self.bodies = kept;
        Ok(())
    }
}

/// Guillotine split of free rect `fr` after `used` took its top-left corner,
/// along the shorter leftover axis. Returns the bottom and right remainders.
fn split_free_rect(fr: &Rect, used: &Rect) -> (Option<Rect>, Option<Rect>) {
    let w_right = fr.right().saturating_sub(used.right());
    let h_bottom = fr.bottom().saturating_sub(used.bottom());
    let split_horizontal = h_bottom < w_right;

    let mut bottom = Rect::new(fr.x, used.bottom(), 0, fr.h.saturating_sub(used.h));
    let mut right = Rect::new(used.right(), fr.y, fr.w.saturating_sub(used.w), 0);
    if split_horizontal {
        bottom.w = fr.w;
        right.h = used.h;
    } else {
        bottom.w = used.w;
        right.h = fr.h;
    }
    let keep = |r: Rect| (r.w > 0 && r.h > 0).then_some(r);
    (keep(bottom), keep(right))
}

type WorldFactory<W> = fn(&PhysicsConfig) -> Result<W>;

fn aabb_world(cfg: &PhysicsConfig) -> Result<AabbWorld> {
    Ok(AabbWorld::new(cfg.gravity.into(), cfg.damping, cfg.solver_iterations))
}

/// Physics strategy. Each `pack` call builds a fresh world with the factory.
pub struct PhysicsPacker<W = AabbWorld, F = WorldFactory<W>> {
    config: PhysicsConfig,
    allow_rotation: bool,
    factory: F,
    _world: PhantomData<fn() -> W>,
}

impl PhysicsPacker<AabbWorld, WorldFactory<AabbWorld>> {
    pub fn new(config: PhysicsConfig, allow_rotation: bool) -> Self {
        Self::with_backend(config, allow_rotation, aabb_world)
    }
}

impl<W, F> PhysicsPacker<W, F>
where
    W: PhysicsWorld,
    F: Fn(&PhysicsConfig) -> Result<W> + Send + Sync,
{
    pub fn with_backend(config: PhysicsConfig, allow_rotation: bool, factory: F) -> Self {
        Self {
            config,
            allow_rotation,
            factory,
            _world: PhantomData,
        }
    }
}

impl<W, F> Packer for PhysicsPacker<W, F>
where
    W: PhysicsWorld,
    F: Fn(&PhysicsConfig) -> Result<W> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "physics"
    }

    #[instrument(skip_all, fields(objects = task.objects.len()))]
    fn pack(&self, task: &PackingTask, cancel: &CancelToken) -> Result<Vec<PlacedObject>> {
        task.validate()?;
        let world = (self.factory)(&self.config)?;
        let mut orchestrator = PhysicsPackingOrchestrator::new(
            world,
            task.container,
            &task.objects,
            self.config.clone(),
            self.allow_rotation,
        )?;
        let placed = orchestrator.run(cancel)?;
        info!(
            placed = placed.len(),
            steps = orchestrator.steps(),
            simulated = orchestrator.simulated_time(),
            "physics packing finished"
        );
        Ok(placed)
    }
}
