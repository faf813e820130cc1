//! Solved values → split names.

use indexmap::IndexMap;

use crate::constants::optimizer::ASSIGNED_THRESHOLD;
use crate::dataset::{GroupedSet, InteractionSet};
use crate::program::{BoolGrid, SolvedValues};
use crate::splits::{PairLabel, SplitSpec};
use crate::types::{EntityId, GroupId, InteractionPair, SplitName};

/// Row label → split name.
pub type Assignment = IndexMap<String, SplitName>;

/// Interaction → split or [`PairLabel::NotSelected`].
pub type PairAssignment = IndexMap<InteractionPair, PairLabel>;

/// Result of a two-sided solve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DoubleAssignment {
    /// e-side rows (entities or groups).
    pub e: Assignment,
    /// f-side rows (entities or groups).
    pub f: Assignment,
    /// Pair rows (interactions or group pairs).
    pub pairs: PairAssignment,
}

/// Split index chosen for one row of a one-hot grid.
///
/// The first split whose value exceeds the threshold wins; otherwise the
/// largest value, so every row lands in exactly one split.
fn row_split(values: &SolvedValues, grid: &BoolGrid, row: usize) -> usize {
    let row_values = values.row(grid, row);
    if let Some(split) = row_values.iter().position(|v| *v > ASSIGNED_THRESHOLD) {
        return split;
    }
    row_values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (split, value)| {
            if *value > best_value {
                (split, *value)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Decode every row of a one-hot `grid` labelled by `names`.
pub fn decode_rows(
    values: &SolvedValues,
    grid: &BoolGrid,
    names: &[String],
    splits: &SplitSpec,
) -> Assignment {
    names
        .iter()
        .enumerate()
        .map(|(row, name)| {
            (
                name.clone(),
                splits.name(row_split(values, grid, row)).to_string(),
            )
        })
        .collect()
}

/// Decode every row of an at-most-one pair `grid`; rows with no split above
/// the threshold become [`PairLabel::NotSelected`].
pub fn decode_pairs(
    values: &SolvedValues,
    grid: &BoolGrid,
    pairs: &[InteractionPair],
    splits: &SplitSpec,
) -> PairAssignment {
    pairs
        .iter()
        .enumerate()
        .map(|(row, pair)| {
            let label = values
                .row(grid, row)
                .iter()
                .position(|v| *v > ASSIGNED_THRESHOLD)
                .map(|split| PairLabel::Split(splits.name(split).to_string()))
                .unwrap_or(PairLabel::NotSelected);
            (pair.clone(), label)
        })
        .collect()
}

/// Expand group assignments to every member entity.
pub fn expand_groups(grouped: &GroupedSet, groups: &Assignment) -> IndexMap<EntityId, SplitName> {
    grouped
        .entities()
        .ids()
        .filter_map(|id| {
            let group = grouped.group_of(id)?;
            groups.get(group).map(|split| (id.clone(), split.clone()))
        })
        .collect()
}

/// Expand group-pair labels to every interaction between their members.
/// Interactions whose group pair was not decoded are not selected.
pub fn expand_group_pairs(
    interactions: &InteractionSet,
    e: &GroupedSet,
    f: &GroupedSet,
    group_pairs: &IndexMap<(GroupId, GroupId), PairLabel>,
) -> PairAssignment {
    interactions
        .pairs()
        .map(|(left, right)| {
            let label = e
                .group_of(left)
                .zip(f.group_of(right))
                .and_then(|(ge, gf)| group_pairs.get(&(ge.clone(), gf.clone())))
                .cloned()
                .unwrap_or(PairLabel::NotSelected);
            ((left.clone(), right.clone()), label)
        })
        .collect()
}

/// Label each interaction with the split of one endpoint, as single-sided
/// techniques do.
pub fn label_by_endpoint(
    interactions: &InteractionSet,
    side: &IndexMap<EntityId, SplitName>,
    left: bool,
) -> PairAssignment {
    interactions
        .pairs()
        .map(|pair| {
            let endpoint = if left { &pair.0 } else { &pair.1 };
            let label = side
                .get(endpoint)
                .map(|split| PairLabel::Split(split.clone()))
                .unwrap_or(PairLabel::NotSelected);
            (pair.clone(), label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{EntitySet, Grouping};
    use crate::program::ProgramBuilder;

    fn spec() -> SplitSpec {
        SplitSpec::new(vec!["train".into(), "test".into()], vec![0.5, 0.5]).unwrap()
    }

    #[test]
    fn rows_use_threshold_then_argmax() {
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(3, 2);
        let values = SolvedValues::new(vec![0.0, 1.0, 0.05, 0.08, 0.9, 0.0]);
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let decoded = decode_rows(&values, &grid, &names, &spec());
        assert_eq!(decoded["a"], "test");
        assert_eq!(decoded["b"], "test");
        assert_eq!(decoded["c"], "train");
    }

    #[test]
    fn unselected_pairs_get_sentinel() {
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(2, 2);
        let values = SolvedValues::new(vec![0.0, 0.0, 1.0, 0.0]);
        let pairs = vec![
            ("e1".to_string(), "f1".to_string()),
            ("e2".to_string(), "f1".to_string()),
        ];
        let decoded = decode_pairs(&values, &grid, &pairs, &spec());
        assert_eq!(decoded[&pairs[0]], PairLabel::NotSelected);
        assert_eq!(decoded[&pairs[1]], PairLabel::Split("train".into()));
    }

    #[test]
    fn group_assignments_expand_to_members() {
        let entities = EntitySet::uniform("e", ["a", "b", "c"]).unwrap();
        let grouping = Grouping {
            names: vec!["a".into(), "c".into()],
            group_of: [("a", "a"), ("b", "a"), ("c", "c")]
                .into_iter()
                .map(|(e, g)| (e.to_string(), g.to_string()))
                .collect(),
            relation: None,
        };
        let grouped = GroupedSet::new(entities, grouping).unwrap();
        let mut groups = Assignment::new();
        groups.insert("a".into(), "train".into());
        groups.insert("c".into(), "test".into());
        let expanded = expand_groups(&grouped, &groups);
        assert_eq!(expanded["b"], "train");
        assert_eq!(expanded["c"], "test");
    }

    #[test]
    fn endpoint_labels_follow_chosen_side() {
        let e = EntitySet::uniform("e", ["e1", "e2"]).unwrap();
        let f = EntitySet::uniform("f", ["f1"]).unwrap();
        let inter = InteractionSet::new(
            vec![("e1".into(), "f1".into()), ("e2".into(), "f1".into())],
            &e,
            &f,
        )
        .unwrap();
        let mut side = IndexMap::new();
        side.insert("e1".to_string(), "train".to_string());
        let labels = label_by_endpoint(&inter, &side, true);
        assert_eq!(labels.values().map(|l| l.to_string()).collect::<Vec<_>>(), vec!["train", "not selected"]);
    }
}
