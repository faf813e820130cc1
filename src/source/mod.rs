//! Similarity sources: everything that turns an entity collection into groups
//! and a relation over those groups.
//!
//! Tools form a closed set ([`ClusterTool`]); each has one
//! [`SimilaritySource`] implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::dataset::{EntitySet, Grouping};
use crate::errors::SplitError;

/// Threshold single-linkage clustering.
pub mod linkage;
/// Relation matrix files.
pub mod matrix;

pub use linkage::{CutoffSearch, LinkageSource};
pub use matrix::{EntityMatrix, RelationKind, read_relation_matrix};

/// Closed set of grouping tools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterTool {
    /// Every entity is its own group; no relation.
    #[default]
    Identity,
    /// Every entity is its own group; relation taken from a matrix file.
    #[serde(alias = "matrix")]
    Precomputed,
    /// Single-linkage clustering of a matrix, calibrated over the cut-off.
    Linkage,
}

impl ClusterTool {
    /// Whether this tool needs a relation matrix.
    pub fn needs_matrix(self) -> bool {
        !matches!(self, ClusterTool::Identity)
    }
}

impl fmt::Display for ClusterTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterTool::Identity => "identity",
            ClusterTool::Precomputed => "precomputed",
            ClusterTool::Linkage => "linkage",
        };
        f.write_str(name)
    }
}

impl FromStr for ClusterTool {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "identity" | "none" => Ok(ClusterTool::Identity),
            "precomputed" | "matrix" => Ok(ClusterTool::Precomputed),
            "linkage" | "single-linkage" => Ok(ClusterTool::Linkage),
            _ => Err(SplitError::UnknownClusterTool(value.to_string())),
        }
    }
}

/// One grouping procedure, run once per parameter value.
pub trait SimilaritySource: Send + Sync {
    /// Tool parameter varied by calibration.
    type Param: Copy + fmt::Debug;

    /// Tool identity, used in log names and error reports.
    fn tool(&self) -> ClusterTool;

    /// Group `entities` with `param`. When `log_file` is set the trial writes
    /// its own log there.
    fn trial(
        &self,
        entities: &EntitySet,
        param: Self::Param,
        log_file: Option<&Path>,
    ) -> Result<Grouping, SplitError>;
}

/// Singleton groups without a relation.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentitySource;

impl SimilaritySource for IdentitySource {
    type Param = ();

    fn tool(&self) -> ClusterTool {
        ClusterTool::Identity
    }

    fn trial(&self, entities: &EntitySet, _: (), _: Option<&Path>) -> Result<Grouping, SplitError> {
        Ok(entities.identity_grouping())
    }
}

/// Singleton groups carrying a precomputed relation.
#[derive(Clone, Debug)]
pub struct PrecomputedSource {
    matrix: EntityMatrix,
}

impl PrecomputedSource {
    /// Use `matrix` as the relation between entities.
    pub fn new(matrix: EntityMatrix) -> Self {
        Self { matrix }
    }
}

impl SimilaritySource for PrecomputedSource {
    type Param = ();

    fn tool(&self) -> ClusterTool {
        ClusterTool::Precomputed
    }

    fn trial(&self, entities: &EntitySet, _: (), _: Option<&Path>) -> Result<Grouping, SplitError> {
        let relation = self.matrix.restrict(entities, &self.tool().to_string())?;
        let mut grouping = entities.identity_grouping();
        grouping.relation = Some(relation);
        Ok(grouping)
    }
}
