#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Constraint and loss construction for split programs.
pub mod builder;
/// Cluster count calibration by parameter search.
pub mod calibrate;
/// Command line front end.
pub mod cli;
/// Techniques and run configuration.
pub mod config;
/// Centralized constants used by the optimizers, solver and outputs.
pub mod constants;
/// Entity sets, relations, groupings and interactions.
pub mod dataset;
/// Decoding of solved values into split assignments.
pub mod decode;
/// Tab-separated input readers.
pub mod input;
/// Balance and leakage summaries.
pub mod metrics;
/// The four split formulations and the random baseline.
pub mod optimize;
/// Assignment files and run reports.
pub mod output;
/// Technique orchestration.
pub mod pipeline;
/// Boolean program representation.
pub mod program;
/// Solver gateway and backends.
pub mod solver;
/// Similarity sources and relation matrices.
pub mod source;
/// Split names, fractions and size limits.
pub mod splits;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{Side, SideRequest, SolverSettings, SplitRequest, Technique};
pub use dataset::{EntitySet, GroupedSet, Grouping, InteractionSet, RawEntities, Relation, SymMatrix};
pub use decode::{Assignment, DoubleAssignment, PairAssignment};
pub use errors::{ErrorKind, SplitError};
pub use optimize::SplitProblem;
pub use pipeline::{SideData, SplitInputs, TechniqueOutput, run_technique};
pub use solver::{SolveContext, Solver, SolverKind};
pub use source::{ClusterTool, EntityMatrix, RelationKind};
pub use splits::{PairLabel, SizeLimits, SplitSpec};
pub use types::{DatasetName, EntityId, GroupId, InteractionPair, ParamLabel, SplitName};
