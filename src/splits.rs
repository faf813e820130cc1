use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::splits::{
    DEFAULT_SPLIT_FRACTIONS, DEFAULT_SPLIT_NAMES, FRACTION_SUM_TOLERANCE, NOT_SELECTED,
};
use crate::errors::SplitError;
use crate::types::SplitName;

/// Ordered list of named splits with their target share of total weight.
///
/// Construct through [`SplitSpec::new`], which enforces `K >= 2`, matching
/// name/fraction counts, distinct names, and positive fractions, and
/// normalizes fractions that do not sum to `1.0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSplitSpec", into = "RawSplitSpec")]
pub struct SplitSpec {
    names: Vec<SplitName>,
    fractions: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawSplitSpec {
    names: Vec<SplitName>,
    fractions: Vec<f64>,
}

impl TryFrom<RawSplitSpec> for SplitSpec {
    type Error = SplitError;

    fn try_from(raw: RawSplitSpec) -> Result<Self, Self::Error> {
        SplitSpec::new(raw.names, raw.fractions)
    }
}

impl From<SplitSpec> for RawSplitSpec {
    fn from(spec: SplitSpec) -> Self {
        Self {
            names: spec.names,
            fractions: spec.fractions,
        }
    }
}

impl Default for SplitSpec {
    fn default() -> Self {
        Self {
            names: DEFAULT_SPLIT_NAMES.iter().map(|n| n.to_string()).collect(),
            fractions: DEFAULT_SPLIT_FRACTIONS.to_vec(),
        }
    }
}

impl SplitSpec {
    /// Validate and normalize a split specification.
    pub fn new(names: Vec<SplitName>, fractions: Vec<f64>) -> Result<Self, SplitError> {
        if fractions.len() < 2 {
            return Err(SplitError::Configuration(
                "at least two splits are required".to_string(),
            ));
        }
        if names.len() != fractions.len() {
            return Err(SplitError::Configuration(format!(
                "got {} split names for {} split fractions",
                names.len(),
                fractions.len()
            )));
        }
        for (idx, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SplitError::Configuration(format!(
                    "split name at position {idx} is empty"
                )));
            }
            if name == NOT_SELECTED {
                return Err(SplitError::Configuration(format!(
                    "'{NOT_SELECTED}' is reserved and cannot name a split"
                )));
            }
            if names[..idx].contains(name) {
                return Err(SplitError::Configuration(format!(
                    "split name '{name}' is used more than once"
                )));
            }
        }
        if fractions.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(SplitError::Configuration(
                "split fractions must be positive finite numbers".to_string(),
            ));
        }
        let sum: f64 = fractions.iter().sum();
        let fractions = if (sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            fractions.iter().map(|f| f / sum).collect()
        } else {
            fractions
        };
        Ok(Self { names, fractions })
    }

    /// Build a specification with generated names `Split1..SplitK`.
    pub fn unnamed(fractions: Vec<f64>) -> Result<Self, SplitError> {
        let names = (1..=fractions.len()).map(|i| format!("Split{i}")).collect();
        Self::new(names, fractions)
    }

    /// Number of splits `K`.
    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    /// Always `false`; a valid specification holds at least two splits.
    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }

    /// Split names in configured order.
    pub fn names(&self) -> &[SplitName] {
        &self.names
    }

    /// Normalized target fractions in configured order.
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// Name of split `index`.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Per-split inclusive weight bounds for tolerance `epsilon`.
    ///
    /// Bounds are truncated toward zero: `trunc((f - eps) * total)` and
    /// `trunc((f + eps) * total)`.
    pub fn size_limits(&self, epsilon: f64, total: f64) -> Vec<SizeLimits> {
        self.fractions
            .iter()
            .map(|fraction| SizeLimits {
                lower: ((fraction - epsilon) * total).trunc().max(0.0),
                upper: ((fraction + epsilon) * total).trunc(),
            })
            .collect()
    }
}

/// Inclusive weight window one split must land in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeLimits {
    /// Lowest admissible assigned weight.
    pub lower: f64,
    /// Highest admissible assigned weight.
    pub upper: f64,
}

impl SizeLimits {
    /// Whether `weight` lies inside the window.
    pub fn contains(&self, weight: f64) -> bool {
        weight >= self.lower && weight <= self.upper
    }
}

/// Split assigned to one interaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairLabel {
    /// The interaction belongs to this split.
    Split(SplitName),
    /// The optimizer deliberately left the interaction out of every split.
    NotSelected,
}

impl PairLabel {
    /// Split name, if the pair was selected.
    pub fn split(&self) -> Option<&str> {
        match self {
            PairLabel::Split(name) => Some(name),
            PairLabel::NotSelected => None,
        }
    }
}

impl fmt::Display for PairLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairLabel::Split(name) => f.write_str(name),
            PairLabel::NotSelected => f.write_str(NOT_SELECTED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<SplitName> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn split_spec_rejects_single_split_and_count_mismatch() {
        let err = SplitSpec::new(names(&["train"]), vec![1.0]).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.contains("two splits")));

        let err = SplitSpec::new(names(&["train", "test"]), vec![0.5, 0.3, 0.2]).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.contains("split names")));
    }

    #[test]
    fn split_spec_rejects_reserved_and_duplicate_names() {
        let err = SplitSpec::new(names(&["train", NOT_SELECTED]), vec![0.5, 0.5]).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.contains("reserved")));

        let err = SplitSpec::new(names(&["a", "a"]), vec![0.5, 0.5]).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.contains("more than once")));

        let err = SplitSpec::new(names(&["a", "b"]), vec![0.5, 0.0]).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(ref msg) if msg.contains("positive")));
    }

    #[test]
    fn split_spec_normalizes_fractions() {
        let spec = SplitSpec::new(names(&["a", "b", "c"]), vec![7.0, 2.0, 1.0]).unwrap();
        let fractions = spec.fractions();
        assert!((fractions[0] - 0.7).abs() < 1e-12);
        assert!((fractions[1] - 0.2).abs() < 1e-12);
        assert!((fractions[2] - 0.1).abs() < 1e-12);
        assert!((fractions.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unnamed_spec_generates_names() {
        let spec = SplitSpec::unnamed(vec![0.5, 0.5]).unwrap();
        assert_eq!(spec.names(), &["Split1".to_string(), "Split2".to_string()]);
        assert_eq!(spec.len(), 2);
        assert!(!spec.is_empty());
    }

    #[test]
    fn size_limits_truncate_toward_integers() {
        let spec = SplitSpec::new(names(&["train", "test"]), vec![0.7, 0.3]).unwrap();
        let limits = spec.size_limits(0.1, 12.0);
        assert_eq!(limits[0].upper, 9.0);
        assert_eq!(limits[1].lower, 2.0);
        assert_eq!(limits[1].upper, 4.0);
        assert!(limits[0].lower >= 6.0 && limits[0].lower <= 7.0);
        assert!(limits[1].contains(3.0));
        assert!(!limits[1].contains(5.0));
    }

    #[test]
    fn pair_label_renders_sentinel() {
        assert_eq!(PairLabel::NotSelected.to_string(), NOT_SELECTED);
        assert_eq!(PairLabel::Split("val".into()).to_string(), "val");
        assert_eq!(PairLabel::Split("val".into()).split(), Some("val"));
        assert_eq!(PairLabel::NotSelected.split(), None);
    }

    #[test]
    fn split_spec_deserialization_validates() {
        let spec: SplitSpec =
            serde_json::from_str(r#"{"names":["a","b"],"fractions":[3.0,1.0]}"#).unwrap();
        assert!((spec.fractions()[0] - 0.75).abs() < 1e-12);
        let err = serde_json::from_str::<SplitSpec>(r#"{"names":["a"],"fractions":[1.0]}"#);
        assert!(err.is_err());
    }
}
