//! Constraint model port and a small built-in solver.
//!
//! A `CpModel` holds bounded integer variables, boolean variables, linear
//! constraints `expr <= 0` (optionally enforced by a conjunction of literals)
//! and clauses. Any `ConstraintSolver` can be plugged into the exact packer;
//! `BacktrackingSolver` is the in-process default.

use crate::error::{PackingError, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntVar(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(usize);

impl BoolVar {
    pub fn index(&self) -> usize {
        self.0
    }
    pub fn not(self) -> Literal {
        Literal {
            var: self,
            positive: false,
        }
    }
}

impl IntVar {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A boolean variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    pub var: BoolVar,
    pub positive: bool,
}

impl Literal {
    pub fn not(self) -> Literal {
        Literal {
            var: self.var,
            positive: !self.positive,
        }
    }
}

impl From<BoolVar> for Literal {
    fn from(var: BoolVar) -> Self {
        Literal {
            var,
            positive: true,
        }
    }
}

/// `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub terms: Vec<(IntVar, i64)>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn constant(c: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: c,
        }
    }
    pub fn term(mut self, var: IntVar, coef: i64) -> Self {
        if coef != 0 {
            self.terms.push((var, coef));
        }
        self
    }
    pub fn plus(mut self, c: i64) -> Self {
        self.constant += c;
        self
    }
    /// `self + other`.
    pub fn add_expr(mut self, other: &LinearExpr) -> Self {
        self.terms.extend_from_slice(&other.terms);
        self.constant += other.constant;
        self
    }
    /// `self - other`.
    pub fn minus(mut self, other: &LinearExpr) -> Self {
        for &(v, c) in &other.terms {
            self.terms.push((v, -c));
        }
        self.constant -= other.constant;
        self
    }
}

impl From<IntVar> for LinearExpr {
    fn from(var: IntVar) -> Self {
        LinearExpr::new().term(var, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `expr <= 0`, active only when every literal in `enforce` is true.
    Linear {
        expr: LinearExpr,
        enforce: Vec<Literal>,
    },
    /// At least one literal is true.
    BoolOr(Vec<Literal>),
}

#[derive(Debug, Clone, Default)]
pub struct CpModel {
    int_domains: Vec<(i64, i64)>,
    int_names: Vec<String>,
    bool_names: Vec<String>,
    constraints: Vec<Constraint>,
}

/// Handle to freshly added linear constraints, used to attach enforcement literals.
pub struct ConstraintRef<'a> {
    model: &'a mut CpModel,
    indices: Vec<usize>,
}

impl ConstraintRef<'_> {
    pub fn only_enforce_if(self, literals: &[Literal]) {
        for &i in &self.indices {
            if let Constraint::Linear { enforce, .. } = &mut self.model.constraints[i] {
                enforce.extend_from_slice(literals);
            }
        }
    }
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, lo: i64, hi: i64, name: impl Into<String>) -> IntVar {
        self.int_domains.push((lo, hi));
        self.int_names.push(name.into());
        IntVar(self.int_domains.len() - 1)
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> BoolVar {
        self.bool_names.push(name.into());
        BoolVar(self.bool_names.len() - 1)
    }

    /// `lhs <= rhs`.
    pub fn add_le(&mut self, lhs: LinearExpr, rhs: LinearExpr) -> ConstraintRef<'_> {
        self.constraints.push(Constraint::Linear {
            expr: lhs.minus(&rhs),
            enforce: Vec::new(),
        });
        let i = self.constraints.len() - 1;
        ConstraintRef {
            model: self,
            indices: vec![i],
        }
    }

    /// `lhs == rhs`, stored as two inequalities.
    pub fn add_eq(&mut self, lhs: LinearExpr, rhs: LinearExpr) -> ConstraintRef<'_> {
        let start = self.constraints.len();
        self.constraints.push(Constraint::Linear {
            expr: lhs.clone().minus(&rhs),
            enforce: Vec::new(),
        });
        self.constraints.push(Constraint::Linear {
            expr: rhs.minus(&lhs),
            enforce: Vec::new(),
        });
        ConstraintRef {
            model: self,
            indices: vec![start, start + 1],
        }
    }

    pub fn add_bool_or(&mut self, literals: &[Literal]) {
        self.constraints.push(Constraint::BoolOr(literals.to_vec()));
    }

    pub fn num_int_vars(&self) -> usize {
        self.int_domains.len()
    }

    pub fn num_bool_vars(&self) -> usize {
        self.bool_names.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn domain(&self, v: IntVar) -> (i64, i64) {
        self.int_domains[v.0]
    }

    pub fn int_name(&self, v: IntVar) -> &str {
        &self.int_names[v.0]
    }

    pub fn bool_name(&self, v: BoolVar) -> &str {
        &self.bool_names[v.0]
    }

    /// True if `a` respects every domain and constraint of the model.
    pub fn is_satisfied_by(&self, a: &Assignment) -> bool {
        if a.ints.len() != self.int_domains.len() || a.bools.len() != self.bool_names.len() {
            return false;
        }
        let in_domain = self
            .int_domains
            .iter()
            .zip(&a.ints)
            .all(|(&(lo, hi), &v)| lo <= v && v <= hi);
        in_domain
            && self.constraints.iter().all(|c| match c {
                Constraint::Linear { expr, enforce } => {
                    !enforce.iter().all(|l| a.literal(*l))
                        || expr.constant + expr.terms.iter().map(|(v, k)| k * a.ints[v.0]).sum::<i64>()
                            <= 0
                }
                Constraint::BoolOr(lits) => lits.iter().any(|l| a.literal(*l)),
            })
    }
}

/// Values of every variable of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    ints: Vec<i64>,
    bools: Vec<bool>,
}

impl Assignment {
    pub fn new(ints: Vec<i64>, bools: Vec<bool>) -> Self {
        Self { ints, bools }
    }
    pub fn value(&self, v: IntVar) -> i64 {
        self.ints[v.0]
    }
    pub fn bool_value(&self, v: BoolVar) -> bool {
        self.bools[v.0]
    }
    pub fn literal(&self, l: Literal) -> bool {
        self.bools[l.var.0] == l.positive
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// Proven solution. Models without an objective report this for any solution.
    Optimal(Assignment),
    Feasible(Assignment),
    Infeasible,
    TimeExceeded,
}

impl SolveOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            SolveOutcome::Optimal(a) | SolveOutcome::Feasible(a) => Some(a),
            _ => None,
        }
    }
}

pub trait ConstraintSolver: Send + Sync {
    fn solve(&self, model: &CpModel, time_limit: Duration) -> Result<SolveOutcome>;
}

/// Depth-first search with bounds and unit propagation.
///
/// Branches first on booleans outside clauses (false first), then on the first
/// unsatisfied clause (true first), then splits integer domains. The wall-clock
/// deadline is checked at every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
struct SearchState {
    lo: Vec<i64>,
    hi: Vec<i64>,
    bools: Vec<Option<bool>>,
}

impl SearchState {
    fn literal(&self, l: Literal) -> Option<bool> {
        self.bools[l.var.0].map(|b| b == l.positive)
    }
    fn assign(&mut self, l: Literal, value: bool) {
        self.bools[l.var.0] = Some(l.positive == value);
    }
}

struct Timeout;

struct Search<'m> {
    model: &'m CpModel,
    clause_vars: Vec<bool>,
    deadline: Instant,
    nodes: u64,
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

impl Search<'_> {
    fn min_sum(expr: &LinearExpr, s: &SearchState) -> i64 {
        expr.constant
            + expr
                .terms
                .iter()
                .map(|&(v, k)| if k > 0 { k * s.lo[v.0] } else { k * s.hi[v.0] })
                .sum::<i64>()
    }

    /// Runs propagation to a fixpoint. Returns false on conflict.
    fn propagate(&self, s: &mut SearchState) -> bool {
        loop {
            let mut changed = false;
            for c in &self.model.constraints {
                match c {
                    Constraint::Linear { expr, enforce } => {
                        let mut unknown = None;
                        let mut unknown_count = 0;
                        let mut inactive = false;
                        for &l in enforce {
                            match s.literal(l) {
                                Some(false) => {
                                    inactive = true;
                                    break;
                                }
                                None => {
                                    unknown = Some(l);
                                    unknown_count += 1;
                                }
                                Some(true) => {}
                            }
                        }
                        if inactive {
                            continue;
                        }
                        let min = Self::min_sum(expr, s);
                        if unknown_count > 0 {
                            // an impossible constraint falsifies its last open enforcement literal
                            if unknown_count == 1 && min > 0 {
                                if let Some(l) = unknown {
                                    s.assign(l, false);
                                    changed = true;
                                }
                            }
                            continue;
                        }
                        if min > 0 {
                            return false;
                        }
                        for &(v, k) in &expr.terms {
                            let term_min = if k > 0 { k * s.lo[v.0] } else { k * s.hi[v.0] };
                            let rest = -(min - term_min);
                            if k > 0 {
                                let bound = floor_div(rest, k);
                                if bound < s.hi[v.0] {
                                    s.hi[v.0] = bound;
                                    changed = true;
                                }
                            } else {
                                let bound = ceil_div(rest, k);
                                if bound > s.lo[v.0] {
                                    s.lo[v.0] = bound;
                                    changed = true;
                                }
                            }
                            if s.lo[v.0] > s.hi[v.0] {
                                return false;
                            }
                        }
                    }
                    Constraint::BoolOr(lits) => {
                        if lits.iter().any(|l| s.literal(*l) == Some(true)) {
                            continue;
                        }
                        let mut open = lits.iter().filter(|l| s.literal(**l).is_none());
                        match (open.next(), open.next()) {
                            (None, _) => return false,
                            (Some(l), None) => {
                                s.assign(*l, true);
                                changed = true;
                            }
                            _ => {}
                        }
                    }
                }
            }
            if !changed {
                return true;
            }
        }
    }

    fn branch_literal(&self, s: &SearchState) -> Option<(Literal, bool)> {
        if let Some(i) = (0..s.bools.len()).find(|&i| s.bools[i].is_none() && !self.clause_vars[i]) {
            return Some((Literal::from(BoolVar(i)), false));
        }
        for c in &self.model.constraints {
            if let Constraint::BoolOr(lits) = c {
                if lits.iter().any(|l| s.literal(*l) == Some(true)) {
                    continue;
                }
                if let Some(l) = lits.iter().find(|l| s.literal(**l).is_none()) {
                    return Some((*l, true));
                }
            }
        }
        (0..s.bools.len())
            .find(|&i| s.bools[i].is_none())
            .map(|i| (Literal::from(BoolVar(i)), false))
    }

    fn search(&mut self, mut s: SearchState) -> std::result::Result<Option<Assignment>, Timeout> {
        self.nodes += 1;
        if Instant::now() >= self.deadline {
            return Err(Timeout);
        }
        if !self.propagate(&mut s) {
            return Ok(None);
        }

        if let Some((lit, first)) = self.branch_literal(&s) {
            for value in [first, !first] {
                let mut child = s.clone();
                child.assign(lit, value);
                if let Some(a) = self.search(child)? {
                    return Ok(Some(a));
                }
            }
            return Ok(None);
        }

        let bools: Vec<bool> = s.bools.iter().map(|b| b.unwrap_or(false)).collect();
        let candidate = Assignment::new(s.lo.clone(), bools);
        if self.model.is_satisfied_by(&candidate) {
            return Ok(Some(candidate));
        }

        let Some(v) = (0..s.lo.len()).find(|&i| s.lo[i] < s.hi[i]) else {
            return Ok(None);
        };
        let mid = s.lo[v] + (s.hi[v] - s.lo[v]) / 2;
        let mut low = s.clone();
        low.hi[v] = mid;
        if let Some(a) = self.search(low)? {
            return Ok(Some(a));
        }
        let mut high = s;
        high.lo[v] = mid + 1;
        self.search(high)
    }
}

impl ConstraintSolver for BacktrackingSolver {
    fn solve(&self, model: &CpModel, time_limit: Duration) -> Result<SolveOutcome> {
        let started = Instant::now();
        if let Some(&(lo, hi)) = model.int_domains.iter().find(|(lo, hi)| lo > hi) {
            debug!(lo, hi, "empty integer domain");
            return Ok(SolveOutcome::Infeasible);
        }
        let mut clause_vars = vec![false; model.num_bool_vars()];
        let unknown = |kind: &str, i: usize| {
            PackingError::Solver(format!("constraint refers to unknown {kind} variable {i}"))
        };
        for c in &model.constraints {
            match c {
                Constraint::BoolOr(lits) => {
                    for l in lits {
                        let slot = clause_vars
                            .get_mut(l.var.0)
                            .ok_or_else(|| unknown("boolean", l.var.0))?;
                        *slot = true;
                    }
                }
                Constraint::Linear { expr, enforce } => {
                    if let Some((v, _)) = expr.terms.iter().find(|(v, _)| v.0 >= model.num_int_vars()) {
                        return Err(unknown("integer", v.0));
                    }
                    if let Some(l) = enforce.iter().find(|l| l.var.0 >= model.num_bool_vars()) {
                        return Err(unknown("boolean", l.var.0));
                    }
                }
            }
        }
        let mut search = Search {
            model,
            clause_vars,
            deadline: started + time_limit,
            nodes: 0,
        };
        let state = SearchState {
            lo: model.int_domains.iter().map(|d| d.0).collect(),
            hi: model.int_domains.iter().map(|d| d.1).collect(),
            bools: vec![None; model.num_bool_vars()],
        };
        let outcome = match search.search(state) {
            Ok(Some(a)) => SolveOutcome::Optimal(a),
            Ok(None) => SolveOutcome::Infeasible,
            Err(Timeout) => SolveOutcome::TimeExceeded,
        };
        trace!(
            nodes = search.nodes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(outcome)
    }
}
