//! Solver gateway: backend abstraction plus the `solve` wrapper that scopes
//! backend logging to a file and turns every non-accepted outcome into `None`.

mod branch_bound;
mod log_sink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

pub use branch_bound::BranchAndBound;
pub use log_sink::with_log_sink;

use crate::constants::solver::RELAX_HINT;
use crate::errors::SplitError;
use crate::program::{Program, SolvedValues};

/// Terminal status reported by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Search completed; the incumbent is optimal.
    Optimal,
    /// Budget expired with a feasible incumbent.
    TimeLimit,
    /// Search completed without a feasible point.
    Infeasible,
    /// Budget expired before any feasible point was found.
    NoIncumbent,
}

impl SolveStatus {
    /// Whether the gateway hands the incumbent back to the caller.
    pub fn is_accepted(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::TimeLimit)
    }
}

/// Raw backend result.
#[derive(Clone, Debug)]
pub struct SolverOutcome {
    /// Terminal status.
    pub status: SolveStatus,
    /// Objective of the incumbent, if any.
    pub objective: Option<f64>,
    /// Incumbent values, if any.
    pub values: Option<SolvedValues>,
    /// Search nodes explored.
    pub nodes: u64,
}

/// Internal backend failure; never surfaces past [`solve`].
#[derive(Debug, Error)]
pub enum SolverFault {
    #[error("variable {index} is outside the program's {count} variables")]
    Lookup { index: usize, count: usize },
    #[error("backend failure: {0}")]
    Backend(String),
}

/// A backend able to minimize a boolean [`Program`] within a time budget.
pub trait Solver: Send + Sync {
    /// Identity used in logs.
    fn name(&self) -> &str;

    /// Minimize `program`, returning the best incumbent found within `budget`.
    /// `threads` is a hint; `0` means all available.
    fn solve(
        &self,
        program: &Program,
        budget: Duration,
        threads: usize,
    ) -> Result<SolverOutcome, SolverFault>;
}

/// Closed set of available backends, selected by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    /// Built-in exact branch and bound.
    #[default]
    #[serde(rename = "bnb")]
    BranchAndBound,
}

impl SolverKind {
    /// Instantiate the backend.
    pub fn backend(self) -> Box<dyn Solver> {
        match self {
            SolverKind::BranchAndBound => Box::new(BranchAndBound),
        }
    }
}

impl FromStr for SolverKind {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bnb" | "branch-and-bound" | "branch_and_bound" => Ok(SolverKind::BranchAndBound),
            _ => Err(SplitError::UnknownSolver(value.to_string())),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::BranchAndBound => f.write_str("bnb"),
        }
    }
}

/// Everything a single solve call needs besides the program.
pub struct SolveContext<'a> {
    /// Backend.
    pub solver: &'a dyn Solver,
    /// Wall-clock budget.
    pub budget: Duration,
    /// Thread hint passed through to the backend.
    pub threads: usize,
    /// File receiving backend logging for the duration of the call.
    pub log_file: Option<PathBuf>,
}

/// Solve `program`, returning its values only for accepted statuses.
///
/// Infeasibility, budget expiry without an incumbent and backend faults are
/// logged as warnings suggesting relaxed split settings and yield `None`.
pub fn solve(program: &Program, ctx: &SolveContext<'_>) -> Option<SolvedValues> {
    info!(
        "[splitsail:solver] {} variables, {} constraints via {}",
        program.var_count(),
        program.constraints().len(),
        ctx.solver.name()
    );
    let result = with_log_sink(ctx.log_file.as_deref(), || {
        ctx.solver.solve(program, ctx.budget, ctx.threads)
    });
    match result {
        Ok(SolverOutcome {
            status,
            values: Some(values),
            objective,
            nodes,
        }) if status.is_accepted() => {
            if status == SolveStatus::TimeLimit {
                warn!(
                    "[splitsail:solver] {} hit the {:?} budget; using best incumbent (objective {:?})",
                    ctx.solver.name(),
                    ctx.budget,
                    objective
                );
            } else {
                info!(
                    "[splitsail:solver] optimal objective {:?} after {nodes} nodes",
                    objective
                );
            }
            Some(values)
        }
        Ok(outcome) => {
            warn!(
                "[splitsail:solver] {} cannot solve the problem ({:?}). {RELAX_HINT}",
                ctx.solver.name(),
                outcome.status
            );
            None
        }
        Err(fault) => {
            warn!(
                "[splitsail:solver] {} failed: {fault}. {RELAX_HINT}",
                ctx.solver.name()
            );
            None
        }
    }
}
