//! Exact depth-first branch and bound over boolean programs.
//!
//! Every expression keeps an interval `[lo, hi]` of the values it can still
//! take under the current partial assignment. Assigning a variable updates
//! only the expressions that mention it, so constraint violation and the
//! objective bound are detected without re-evaluating the whole program.
//!
//! A feasible warm start becomes the first incumbent, so a search that runs
//! out of budget still returns at least that assignment.

use std::time::{Duration, Instant};

use tracing::debug;

use super::{SolveStatus, Solver, SolverFault, SolverOutcome};
use crate::constants::solver::{
    DEADLINE_CHECK_INTERVAL, FEASIBILITY_TOLERANCE, IMPROVEMENT_TOLERANCE,
};
use crate::program::{Expr, Program, SolvedValues};

/// Built-in exact backend. Single-threaded; the thread hint is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBound;

impl Solver for BranchAndBound {
    fn name(&self) -> &str {
        "bnb"
    }

    fn solve(
        &self,
        program: &Program,
        budget: Duration,
        threads: usize,
    ) -> Result<SolverOutcome, SolverFault> {
        validate(program)?;
        debug!(
            "[splitsail:bnb] searching {} variables under {} constraints (budget {:?}, threads hint {})",
            program.var_count(),
            program.constraints().len(),
            budget,
            threads
        );
        let started = Instant::now();
        let outcome = Search::new(program).run(started + budget);
        debug!(
            "[splitsail:bnb] finished with {:?} after {} nodes in {:?}",
            outcome.status,
            outcome.nodes,
            started.elapsed()
        );
        Ok(outcome)
    }
}

fn validate(program: &Program) -> Result<(), SolverFault> {
    let count = program.var_count();
    let exprs = program
        .constraints()
        .iter()
        .map(|c| &c.expr)
        .chain(std::iter::once(program.objective()));
    for expr in exprs {
        if let Some(var) = expr.max_var()
            && var.0 >= count
        {
            return Err(SolverFault::Lookup {
                index: var.0,
                count,
            });
        }
        let finite = expr.constant_part().is_finite()
            && expr.linear_terms().iter().all(|(_, c)| c.is_finite())
            && expr.quadratic_terms().iter().all(|(_, _, c)| c.is_finite());
        if !finite {
            return Err(SolverFault::Backend(
                "program contains non-finite coefficients".to_string(),
            ));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Interval {
    lo: f64,
    hi: f64,
}

#[derive(Clone, Copy, Debug)]
enum TermRef {
    Linear(usize),
    Quadratic(usize),
}

#[derive(Debug)]
struct Frame {
    var: usize,
    order: [bool; 2],
    tried: usize,
    mark: usize,
    assigned: bool,
}

struct Search<'p> {
    program: &'p Program,
    /// Constraint expressions followed by the objective.
    exprs: Vec<&'p Expr>,
    bounds: Vec<Interval>,
    /// Per variable: every `(expression, term)` mentioning it.
    occurrences: Vec<Vec<(usize, TermRef)>>,
    /// Per variable: constraints mentioning it.
    touched: Vec<Vec<usize>>,
    assignment: Vec<Option<bool>>,
    trail: Vec<(usize, Interval)>,
    scratch: Vec<Interval>,
    best: Option<(f64, Vec<bool>)>,
    nodes: u64,
}

impl<'p> Search<'p> {
    fn new(program: &'p Program) -> Self {
        let n = program.var_count();
        let exprs: Vec<&Expr> = program
            .constraints()
            .iter()
            .map(|c| &c.expr)
            .chain(std::iter::once(program.objective()))
            .collect();
        let objective = exprs.len() - 1;
        let mut occurrences = vec![Vec::new(); n];
        let mut touched: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut bounds = Vec::with_capacity(exprs.len());
        for (idx, expr) in exprs.iter().enumerate() {
            let mut interval = Interval {
                lo: expr.constant_part(),
                hi: expr.constant_part(),
            };
            for (t, (var, coeff)) in expr.linear_terms().iter().enumerate() {
                occurrences[var.0].push((idx, TermRef::Linear(t)));
                if idx != objective && touched[var.0].last() != Some(&idx) {
                    touched[var.0].push(idx);
                }
                interval.lo += coeff.min(0.0);
                interval.hi += coeff.max(0.0);
            }
            for (t, (a, b, coeff)) in expr.quadratic_terms().iter().enumerate() {
                for var in [a.0, b.0] {
                    occurrences[var].push((idx, TermRef::Quadratic(t)));
                    if idx != objective && touched[var].last() != Some(&idx) {
                        touched[var].push(idx);
                    }
                }
                interval.lo += coeff.min(0.0);
                interval.hi += coeff.max(0.0);
            }
            bounds.push(interval);
        }
        Self {
            program,
            exprs,
            bounds,
            occurrences,
            touched,
            assignment: vec![None; n],
            trail: Vec::new(),
            scratch: Vec::new(),
            best: None,
            nodes: 0,
        }
    }

    fn objective_index(&self) -> usize {
        self.exprs.len() - 1
    }

    fn term_interval(&self, expr: usize, term: TermRef) -> Interval {
        let expr = self.exprs[expr];
        let (coeff, state) = match term {
            TermRef::Linear(t) => {
                let (var, coeff) = expr.linear_terms()[t];
                (coeff, self.assignment[var.0])
            }
            TermRef::Quadratic(t) => {
                let (a, b, coeff) = expr.quadratic_terms()[t];
                let state = match (self.assignment[a.0], self.assignment[b.0]) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                (coeff, state)
            }
        };
        match state {
            Some(true) => Interval { lo: coeff, hi: coeff },
            Some(false) => Interval { lo: 0.0, hi: 0.0 },
            None => Interval {
                lo: coeff.min(0.0),
                hi: coeff.max(0.0),
            },
        }
    }

    /// Assign `var` and tighten affected intervals. Returns `false` when a
    /// constraint can no longer be met.
    fn assign(&mut self, var: usize, value: bool) -> bool {
        let mut before = std::mem::take(&mut self.scratch);
        before.clear();
        for &(expr, term) in &self.occurrences[var] {
            before.push(self.term_interval(expr, term));
        }
        self.assignment[var] = Some(value);
        for (k, &(expr, term)) in self.occurrences[var].iter().enumerate() {
            let after = self.term_interval(expr, term);
            let current = self.bounds[expr];
            self.trail.push((expr, current));
            self.bounds[expr] = Interval {
                lo: current.lo - before[k].lo + after.lo,
                hi: current.hi - before[k].hi + after.hi,
            };
        }
        self.scratch = before;
        let program = self.program;
        let constraints = program.constraints();
        self.touched[var].iter().all(|&idx| {
            let interval = self.bounds[idx];
            constraints[idx].admits(interval.lo, interval.hi, FEASIBILITY_TOLERANCE)
        })
    }

    fn unassign(&mut self, var: usize, mark: usize) {
        while self.trail.len() > mark {
            if let Some((expr, interval)) = self.trail.pop() {
                self.bounds[expr] = interval;
            }
        }
        self.assignment[var] = None;
    }

    /// Objective lower bound after assigning `var = value`, or infinity when
    /// the assignment is infeasible.
    fn probe(&mut self, var: usize, value: bool) -> f64 {
        let mark = self.trail.len();
        let lo = if self.assign(var, value) {
            self.bounds[self.objective_index()].lo
        } else {
            f64::INFINITY
        };
        self.unassign(var, mark);
        lo
    }

    fn frame(&mut self, var: usize) -> Frame {
        let lo_true = self.probe(var, true);
        let lo_false = self.probe(var, false);
        let order = if lo_false < lo_true {
            [false, true]
        } else {
            [true, false]
        };
        Frame {
            var,
            order,
            tried: 0,
            mark: 0,
            assigned: false,
        }
    }

    fn dominated(&self) -> bool {
        match &self.best {
            Some((best, _)) => {
                self.bounds[self.objective_index()].lo >= best - IMPROVEMENT_TOLERANCE
            }
            None => false,
        }
    }

    fn record_incumbent(&mut self) {
        let values: Vec<f64> = self
            .assignment
            .iter()
            .map(|v| if *v == Some(true) { 1.0 } else { 0.0 })
            .collect();
        let value = self.program.objective().evaluate(&values);
        let improves = self
            .best
            .as_ref()
            .is_none_or(|(best, _)| value < best - IMPROVEMENT_TOLERANCE);
        if improves {
            debug!(
                "[splitsail:bnb] incumbent {value:.6} at node {}",
                self.nodes
            );
            let bits = self.assignment.iter().map(|v| *v == Some(true)).collect();
            self.best = Some((value, bits));
        }
    }

    fn seed_incumbent(&mut self, start: &[f64]) {
        let values: Vec<f64> = start
            .iter()
            .map(|v| if *v > 0.5 { 1.0 } else { 0.0 })
            .collect();
        let value = self.program.objective().evaluate(&values);
        debug!("[splitsail:bnb] warm start accepted with objective {value:.6}");
        self.best = Some((value, values.iter().map(|v| *v > 0.5).collect()));
    }

    fn run(mut self, deadline: Instant) -> SolverOutcome {
        let program = self.program;
        let n = program.var_count();
        let constraints = program.constraints();
        let feasible_root = constraints.iter().enumerate().all(|(idx, c)| {
            let interval = self.bounds[idx];
            c.admits(interval.lo, interval.hi, FEASIBILITY_TOLERANCE)
        });
        if !feasible_root {
            return self.finish(false);
        }
        if n == 0 {
            self.record_incumbent();
            return self.finish(false);
        }
        match program.warm_start() {
            Some(start) if program.is_feasible(start, FEASIBILITY_TOLERANCE) => {
                self.seed_incumbent(start);
            }
            Some(_) => debug!("[splitsail:bnb] warm start violates constraints, ignored"),
            None => {}
        }

        let mut timed_out = false;
        let mut stack = vec![self.frame(0)];
        while let Some(frame) = stack.last_mut() {
            if frame.assigned {
                let (var, mark) = (frame.var, frame.mark);
                frame.assigned = false;
                self.unassign(var, mark);
            }
            if frame.tried == frame.order.len() {
                stack.pop();
                continue;
            }
            let var = frame.var;
            let value = frame.order[frame.tried];
            frame.tried += 1;
            frame.mark = self.trail.len();
            frame.assigned = true;

            self.nodes += 1;
            if self.nodes % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            if !self.assign(var, value) || self.dominated() {
                continue;
            }
            if var + 1 == n {
                self.record_incumbent();
                continue;
            }
            let next = self.frame(var + 1);
            stack.push(next);
        }
        self.finish(timed_out)
    }

    fn finish(self, timed_out: bool) -> SolverOutcome {
        let status = match (self.best.is_some(), timed_out) {
            (true, false) => SolveStatus::Optimal,
            (true, true) => SolveStatus::TimeLimit,
            (false, false) => SolveStatus::Infeasible,
            (false, true) => SolveStatus::NoIncumbent,
        };
        let (objective, values) = match self.best {
            Some((value, bits)) => (
                Some(value),
                Some(SolvedValues::new(
                    bits.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect(),
                )),
            ),
            None => (None, None),
        };
        SolverOutcome {
            status,
            objective,
            values,
            nodes: self.nodes,
        }
    }
}
