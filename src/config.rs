use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::random::DEFAULT_SEED;
use crate::constants::solver::DEFAULT_MAX_SEC;
use crate::constants::splits::DEFAULT_EPSILON;
use crate::errors::SplitError;
use crate::solver::SolverKind;
use crate::source::ClusterTool;
use crate::splits::SplitSpec;

/// One of the two entity collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// First collection.
    E,
    /// Second collection.
    F,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::E => f.write_str("e"),
            Side::F => f.write_str("f"),
        }
    }
}

/// Splitting technique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Technique {
    /// Seeded random split of interactions (or entities without interactions).
    Random,
    /// Entity-level split of one side.
    IdentitySingle(Side),
    /// Group-level split of one side.
    ClusterSingle(Side),
    /// Entity-level split of both sides and their interactions.
    IdentityDouble,
    /// Group-level split of both sides and their interactions.
    ClusterDouble,
}

impl Technique {
    /// Whether both sides and interactions are required.
    pub fn is_double(self) -> bool {
        matches!(self, Technique::IdentityDouble | Technique::ClusterDouble)
    }

    /// Whether the technique groups entities before splitting.
    pub fn is_cluster(self) -> bool {
        matches!(self, Technique::ClusterSingle(_) | Technique::ClusterDouble)
    }

    /// Side split by a single-sided technique.
    pub fn side(self) -> Option<Side> {
        match self {
            Technique::IdentitySingle(side) | Technique::ClusterSingle(side) => Some(side),
            _ => None,
        }
    }

    /// Short code used on the command line and as output directory name.
    pub fn code(self) -> &'static str {
        match self {
            Technique::Random => "R",
            Technique::IdentitySingle(Side::E) => "I1e",
            Technique::IdentitySingle(Side::F) => "I1f",
            Technique::ClusterSingle(Side::E) => "C1e",
            Technique::ClusterSingle(Side::F) => "C1f",
            Technique::IdentityDouble => "I2",
            Technique::ClusterDouble => "C2",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Technique {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let technique = match value.trim() {
            "R" => Technique::Random,
            "I1e" | "ICS" => Technique::IdentitySingle(Side::E),
            "I1f" => Technique::IdentitySingle(Side::F),
            "C1e" | "CCS" => Technique::ClusterSingle(Side::E),
            "C1f" => Technique::ClusterSingle(Side::F),
            "I2" | "ICD" => Technique::IdentityDouble,
            "C2" | "CCD" => Technique::ClusterDouble,
            _ => return Err(SplitError::UnknownTechnique(value.to_string())),
        };
        Ok(technique)
    }
}

impl TryFrom<String> for Technique {
    type Error = SplitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Technique> for String {
    fn from(technique: Technique) -> Self {
        technique.code().to_string()
    }
}

/// Per-side grouping settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideRequest {
    /// Grouping tool used by cluster techniques.
    pub cluster: ClusterTool,
    /// Relatedness cap; `None` adds no relatedness constraints.
    pub threshold: Option<f64>,
}

/// Solver selection and limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Backend.
    pub kind: SolverKind,
    /// Wall-clock budget per solve, in seconds.
    pub max_sec: u64,
    /// Thread hint; `0` means all available.
    pub threads: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            max_sec: DEFAULT_MAX_SEC,
            threads: 0,
        }
    }
}

impl SolverSettings {
    /// Budget as a [`Duration`].
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.max_sec)
    }

    /// Thread hint with `0` resolved to the available parallelism.
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Everything that parameterizes one run, shared read-only by all techniques.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitRequest {
    /// Target splits.
    pub splits: SplitSpec,
    /// Allowed deviation from each target fraction.
    pub epsilon: f64,
    /// e-side settings.
    pub e: SideRequest,
    /// f-side settings.
    pub f: SideRequest,
    /// Solver settings.
    pub solver: SolverSettings,
    /// Directory for solver and clustering logs.
    pub log_dir: Option<PathBuf>,
    /// Seed for the random technique.
    pub seed: u64,
}

impl Default for SplitRequest {
    fn default() -> Self {
        Self {
            splits: SplitSpec::default(),
            epsilon: DEFAULT_EPSILON,
            e: SideRequest::default(),
            f: SideRequest::default(),
            solver: SolverSettings::default(),
            log_dir: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitRequest {
    /// Settings for `side`.
    pub fn side(&self, side: Side) -> &SideRequest {
        match side {
            Side::E => &self.e,
            Side::F => &self.f,
        }
    }

    /// Reject settings that cannot describe a solvable request.
    pub fn validate(&self) -> Result<(), SplitError> {
        if !(0.0..1.0).contains(&self.epsilon) {
            return Err(SplitError::Configuration(format!(
                "epsilon must be in [0, 1), got {}",
                self.epsilon
            )));
        }
        for (side, request) in [(Side::E, &self.e), (Side::F, &self.f)] {
            if let Some(threshold) = request.threshold
                && (!threshold.is_finite() || threshold < 0.0)
            {
                return Err(SplitError::Configuration(format!(
                    "{side}-side threshold must be a non-negative number, got {threshold}"
                )));
            }
        }
        if self.solver.max_sec == 0 {
            return Err(SplitError::Configuration(
                "solver budget must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technique_codes_and_aliases_parse() {
        for code in ["R", "I1e", "I1f", "C1e", "C1f", "I2", "C2"] {
            assert_eq!(code.parse::<Technique>().unwrap().code(), code);
        }
        assert_eq!("CCD".parse::<Technique>().unwrap(), Technique::ClusterDouble);
        assert_eq!(
            "ICS".parse::<Technique>().unwrap(),
            Technique::IdentitySingle(Side::E)
        );
        let err = "X9".parse::<Technique>().unwrap_err();
        assert!(matches!(err, SplitError::UnknownTechnique(ref code) if code == "X9"));
    }

    #[test]
    fn technique_axes() {
        assert!(Technique::ClusterDouble.is_double());
        assert!(Technique::ClusterDouble.is_cluster());
        assert!(!Technique::IdentitySingle(Side::F).is_cluster());
        assert_eq!(Technique::ClusterSingle(Side::F).side(), Some(Side::F));
        assert_eq!(Technique::Random.side(), None);
    }

    #[test]
    fn request_validation_rejects_bad_values() {
        let mut request = SplitRequest::default();
        assert!(request.validate().is_ok());
        request.epsilon = 1.5;
        assert!(matches!(request.validate(), Err(SplitError::Configuration(_))));
        request.epsilon = 0.1;
        request.f.threshold = Some(-1.0);
        let err = request.validate().unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.starts_with("f-side")));
        request.f.threshold = None;
        request.solver.max_sec = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: SplitRequest =
            serde_json::from_str(r#"{"epsilon":0.2,"e":{"cluster":"linkage","threshold":0.5}}"#)
                .unwrap();
        assert_eq!(request.epsilon, 0.2);
        assert_eq!(request.e.cluster, ClusterTool::Linkage);
        assert_eq!(request.splits, SplitSpec::default());
        assert_eq!(request.solver.max_sec, DEFAULT_MAX_SEC);
        assert!(request.solver.resolved_threads() >= 1);
    }
}
