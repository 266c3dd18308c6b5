use super::Packer;
use crate::config::ExactConfig;
use crate::error::{PackingError, Result};
use crate::model::{PackInputObject, PackingContainer, PackingTask, PlacedObject};
use crate::runner::CancelToken;
use crate::solver::{
    BacktrackingSolver, BoolVar, ConstraintSolver, CpModel, IntVar, LinearExpr, Literal,
    SolveOutcome,
};
use itertools::Itertools;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Variables of one object in an `ExactModel`.
#[derive(Debug, Clone)]
pub struct ObjectVars {
    pub object: PackInputObject,
    pub x: IntVar,
    pub y: IntVar,
    /// Width/height actually occupied, either constants or variables tied to `rotated`.
    pub width: LinearExpr,
    pub height: LinearExpr,
    pub rotated: Option<BoolVar>,
}

/// Non-overlap placement model of a list of objects on an integer grid.
///
/// The usable container size is floored and object sides are ceiled, so any
/// solution decodes to a valid layout of the real sizes.
#[derive(Debug, Clone)]
pub struct ExactModel {
    pub model: CpModel,
    pub vars: Vec<ObjectVars>,
    container: PackingContainer,
}

/// Integer size of an object as seen by the model.
fn grid_size(obj: &PackInputObject) -> (i64, i64) {
    (obj.width.ceil() as i64, obj.height.ceil() as i64)
}

/// Usable container size on the integer grid.
pub fn grid_container(c: &PackingContainer) -> (i64, i64) {
    (
        c.usable_width().max(0.0).floor() as i64,
        c.usable_height().max(0.0).floor() as i64,
    )
}

/// True if `obj` fits the integer grid in an allowed orientation.
pub fn fits_grid(c: &PackingContainer, obj: &PackInputObject, allow_rotation: bool) -> bool {
    let (cw, ch) = grid_container(c);
    let (w, h) = grid_size(obj);
    (w <= cw && h <= ch) || (allow_rotation && h <= cw && w <= ch)
}

impl ExactModel {
    pub fn build(container: &PackingContainer, objects: &[PackInputObject], allow_rotation: bool) -> Self {
        let (cw, ch) = grid_container(container);
        let mut model = CpModel::new();
        let mut vars = Vec::with_capacity(objects.len());

        for obj in objects {
            let (w, h) = grid_size(obj);
            let id = obj.id;
            let v = if allow_rotation && w != h {
                let min_side = w.min(h);
                let x = model.new_int_var(0, cw - min_side, format!("x_{id}"));
                let y = model.new_int_var(0, ch - min_side, format!("y_{id}"));
                let rot = model.new_bool_var(format!("rotated_{id}"));
                let aw = model.new_int_var(w.min(h), w.max(h), format!("actual_width_{id}"));
                let ah = model.new_int_var(w.min(h), w.max(h), format!("actual_height_{id}"));
                model
                    .add_eq(aw.into(), LinearExpr::constant(w))
                    .only_enforce_if(&[rot.not()]);
                model
                    .add_eq(ah.into(), LinearExpr::constant(h))
                    .only_enforce_if(&[rot.not()]);
                model
                    .add_eq(aw.into(), LinearExpr::constant(h))
                    .only_enforce_if(&[Literal::from(rot)]);
                model
                    .add_eq(ah.into(), LinearExpr::constant(w))
                    .only_enforce_if(&[Literal::from(rot)]);
                ObjectVars {
                    object: *obj,
                    x,
                    y,
                    width: aw.into(),
                    height: ah.into(),
                    rotated: Some(rot),
                }
            } else {
                ObjectVars {
                    object: *obj,
                    x: model.new_int_var(0, cw - w, format!("x_{id}")),
                    y: model.new_int_var(0, ch - h, format!("y_{id}")),
                    width: LinearExpr::constant(w),
                    height: LinearExpr::constant(h),
                    rotated: None,
                }
            };
            let right = LinearExpr::from(v.x).add_expr(&v.width);
            let bottom = LinearExpr::from(v.y).add_expr(&v.height);
            model.add_le(right, LinearExpr::constant(cw));
            model.add_le(bottom, LinearExpr::constant(ch));
            vars.push(v);
        }

        for (i, j) in (0..vars.len()).tuple_combinations() {
            let (a, b) = (&vars[i], &vars[j]);
            let (ia, ib) = (a.object.id, b.object.id);
            let sides: [(IntVar, &LinearExpr, IntVar, &str); 4] = [
                (a.x, &a.width, b.x, "left"),
                (b.x, &b.width, a.x, "right"),
                (a.y, &a.height, b.y, "above"),
                (b.y, &b.height, a.y, "below"),
            ];
            let mut lits: Vec<Literal> = Vec::with_capacity(4);
            for (from, extent, to, name) in sides {
                let lit: Literal = model.new_bool_var(format!("{ia}_{name}_{ib}")).into();
                // from + extent <= to
                let lhs = LinearExpr::from(from).add_expr(extent);
                model.add_le(lhs, LinearExpr::from(to)).only_enforce_if(&[lit]);
                lits.push(lit);
            }
            model.add_bool_or(&lits);
        }

        Self {
            model,
            vars,
            container: *container,
        }
    }

    /// Turns a solver assignment into placements of the real object sizes.
    ///
    /// `Ok(None)` when the outcome carries no assignment. An assignment that
    /// violates the model is a solver bug and yields `PackingError::Solver`.
    pub fn decode(&self, outcome: &SolveOutcome) -> Result<Option<Vec<PlacedObject>>> {
        let Some(a) = outcome.assignment() else {
            return Ok(None);
        };
        if !self.model.is_satisfied_by(a) {
            return Err(PackingError::Solver(format!(
                "assignment violates the model of {} objects",
                self.vars.len()
            )));
        }
        let pad = self.container.padding;
        Ok(Some(
            self.vars
                .iter()
                .map(|v| {
                    let rotated = v.rotated.is_some_and(|r| a.bool_value(r));
                    let (w, h) = if rotated {
                        (v.object.height, v.object.width)
                    } else {
                        (v.object.width, v.object.height)
                    };
                    PlacedObject::from_top_left(
                        v.object.id,
                        pad + a.value(v.x) as f64,
                        pad + a.value(v.y) as f64,
                        w,
                        h,
                    )
                })
                .collect(),
        ))
    }
}

/// Constraint-model packer with decreasing-subset fallback.
pub struct ExactPacker<S: ConstraintSolver = BacktrackingSolver> {
    solver: S,
    config: ExactConfig,
    allow_rotation: bool,
}

impl ExactPacker<BacktrackingSolver> {
    pub fn new(config: ExactConfig, allow_rotation: bool) -> Self {
        Self::with_solver(BacktrackingSolver::new(), config, allow_rotation)
    }
}

impl<S: ConstraintSolver> ExactPacker<S> {
    pub fn with_solver(solver: S, config: ExactConfig, allow_rotation: bool) -> Self {
        Self {
            solver,
            config,
            allow_rotation,
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// One solve attempt. `Ok(None)` when infeasible or out of time.
    fn attempt(
        &self,
        container: &PackingContainer,
        objects: &[PackInputObject],
        cancel: &CancelToken,
    ) -> Result<Option<Vec<PlacedObject>>> {
        cancel.check()?;
        let (cw, ch) = grid_container(container);
        let area: i64 = objects
            .iter()
            .map(|o| {
                let (w, h) = grid_size(o);
                w * h
            })
            .sum();
        if area > cw * ch {
            debug!(size = objects.len(), area, "subset exceeds container area");
            return Ok(None);
        }
        let model = ExactModel::build(container, objects, self.allow_rotation);
        let limit = Duration::from_millis(self.config.time_limit_ms);
        let outcome = self.solver.solve(&model.model, limit)?;
        if outcome == SolveOutcome::TimeExceeded {
            warn!(size = objects.len(), "solve attempt ran out of time");
        }
        model.decode(&outcome)
    }
}

impl<S: ConstraintSolver> Packer for ExactPacker<S> {
    fn name(&self) -> &'static str {
        "exact"
    }

    #[instrument(skip_all, fields(objects = task.objects.len()))]
    fn pack(&self, task: &PackingTask, cancel: &CancelToken) -> Result<Vec<PlacedObject>> {
        task.validate()?;
        let container = &task.container;
        let candidates: Vec<PackInputObject> = task
            .objects
            .iter()
            .filter(|o| fits_grid(container, o, self.allow_rotation))
            .copied()
            .collect();
        if candidates.len() < task.objects.len() {
            info!(
                rejected = task.objects.len() - candidates.len(),
                "objects larger than the container were excluded"
            );
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(placed) = self.attempt(container, &candidates, cancel)? {
            return Ok(placed);
        }
        if !self.config.try_subsets {
            info!("full set infeasible and subset search disabled");
            return Ok(Vec::new());
        }

        for size in (1..candidates.len()).rev() {
            let budget = self.config.attempts_for(size);
            debug!(size, budget, "trying subsets");
            for subset in candidates.iter().copied().combinations(size).take(budget) {
                if let Some(placed) = self.attempt(container, &subset, cancel)? {
                    info!(placed = placed.len(), of = candidates.len(), "feasible subset found");
                    return Ok(placed);
                }
            }
        }
        info!("no feasible subset");
        Ok(Vec::new())
    }
}
