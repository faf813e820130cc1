//! Split optimizers.
//!
//! Four formulations share one shape: allocate assignment grids, add
//! constraints and loss terms from [`crate::builder`], solve through the
//! gateway and decode. They hold no state between calls.
//!
//! | formulation | rows | constraints |
//! |---|---|---|
//! | identity, single | entities | one-hot, size |
//! | cluster, single | groups | one-hot, size, relatedness |
//! | identity, double | entities (both sides) + observed pairs | one-hot, at-most-one, interaction size, link |
//! | cluster, double | groups (both sides) + observed group pairs | as above + relatedness on both sides |

mod double;
mod random;
mod single;
mod warm;

pub use double::{solve_cluster_double, solve_identity_double};
pub use random::{DeterministicRng, random_split};
pub use single::{solve_cluster_single, solve_identity_single};

use crate::solver::SolveContext;
use crate::splits::SplitSpec;

/// Inputs shared by every formulation.
pub struct SplitProblem<'a> {
    /// Target splits.
    pub splits: &'a SplitSpec,
    /// Allowed deviation from each target fraction.
    pub epsilon: f64,
    /// Solver gateway settings.
    pub solver: SolveContext<'a>,
}
