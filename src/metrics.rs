use indexmap::IndexMap;
use serde::Serialize;

use crate::dataset::{EntitySet, Relation};
use crate::decode::PairAssignment;
use crate::splits::{PairLabel, SplitSpec};
use crate::types::{EntityId, SplitName};

/// Aggregate balance of one finished assignment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SplitBalance {
    pub total: f64,
    pub unassigned: f64,
    pub max_deviation: f64,
    pub per_split: Vec<SplitShare>,
}

/// Per-split weight against its target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SplitShare {
    pub split: SplitName,
    pub weight: f64,
    pub share: f64,
    pub target: f64,
    pub deviation: f64,
}

fn balance<I>(weights: I, total: f64, splits: &SplitSpec) -> SplitBalance
where
    I: IntoIterator<Item = (Option<String>, f64)>,
{
    let mut per_name: IndexMap<&str, f64> = splits.names().iter().map(|n| (n.as_str(), 0.0)).collect();
    let mut unassigned = 0.0;
    for (split, weight) in weights {
        match split.as_deref().and_then(|name| per_name.get_mut(name)) {
            Some(slot) => *slot += weight,
            None => unassigned += weight,
        }
    }
    let per_split: Vec<SplitShare> = per_name
        .into_iter()
        .zip(splits.fractions())
        .map(|((name, weight), target)| {
            let share = if total > 0.0 { weight / total } else { 0.0 };
            SplitShare {
                split: name.to_string(),
                weight,
                share,
                target: *target,
                deviation: share - target,
            }
        })
        .collect();
    let max_deviation = per_split
        .iter()
        .map(|s| s.deviation.abs())
        .fold(0.0, f64::max);
    SplitBalance {
        total,
        unassigned,
        max_deviation,
        per_split,
    }
}

/// Weighted share of each split among `entities`. Entities missing from
/// `assignment` count as unassigned.
pub fn split_balance(
    assignment: &IndexMap<EntityId, SplitName>,
    entities: &EntitySet,
    splits: &SplitSpec,
) -> SplitBalance {
    balance(
        entities
            .weights()
            .iter()
            .map(|(id, weight)| (assignment.get(id).cloned(), *weight)),
        entities.total_weight(),
        splits,
    )
}

/// Share of interactions per split; unselected pairs count as unassigned.
pub fn pair_balance(pairs: &PairAssignment, splits: &SplitSpec) -> SplitBalance {
    balance(
        pairs.values().map(|label| match label {
            PairLabel::Split(name) => (Some(name.clone()), 1.0),
            PairLabel::NotSelected => (None, 1.0),
        }),
        pairs.len() as f64,
        splits,
    )
}

/// Relation mass crossing split boundaries, in `[0, 1]`.
///
/// For similarities this is the weighted similarity of pairs placed in
/// different splits; for distances, the weighted distance of pairs sharing a
/// split. `relation` is indexed in `entities` order. Unassigned entities are
/// ignored. Returns `None` when no pair carries relation mass.
pub fn leakage(
    assignment: &IndexMap<EntityId, SplitName>,
    entities: &EntitySet,
    relation: &Relation,
) -> Option<f64> {
    let rows: Vec<(Option<&SplitName>, f64)> = entities
        .weights()
        .iter()
        .map(|(id, weight)| (assignment.get(id), *weight))
        .collect();
    let mut mass = 0.0;
    let mut leaked = 0.0;
    for (i, (split_i, w_i)) in rows.iter().enumerate() {
        for (j, (split_j, w_j)) in rows.iter().enumerate().skip(i + 1) {
            let (Some(a), Some(b)) = (split_i, split_j) else {
                continue;
            };
            let value = relation.matrix().get(i, j) * w_i * w_j;
            mass += value;
            let counted = if relation.is_similarity() { a != b } else { a == b };
            if counted {
                leaked += value;
            }
        }
    }
    (mass > 0.0).then(|| leaked / mass)
}
