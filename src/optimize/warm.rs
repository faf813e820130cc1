//! Greedy starting assignments handed to the solver as a warm start.
//!
//! Rows tied by a similarity cap form one unit and are placed whole,
//! heaviest unit first, into the split furthest below its target weight
//! that still has room. Rows separated by a distance cap never share a
//! split. The result only seeds the search; the solver checks it against
//! every constraint before using it.

use crate::constants::solver::FEASIBILITY_TOLERANCE;
use crate::dataset::Relation;
use crate::program::BoolGrid;
use crate::splits::SplitSpec;

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// Rows that must share a split, and per row the rows it must avoid.
fn ties(
    rows: usize,
    relation: Option<&Relation>,
    threshold: Option<f64>,
) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let mut parent: Vec<usize> = (0..rows).collect();
    let mut conflicts = vec![Vec::new(); rows];
    if let (Some(relation), Some(threshold)) = (relation, threshold) {
        let matrix = relation.matrix();
        for i in 0..rows {
            for j in (i + 1)..rows {
                if matrix.get(i, j) <= threshold {
                    continue;
                }
                if relation.is_similarity() {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    parent[a.max(b)] = a.min(b);
                } else {
                    conflicts[i].push(j);
                    conflicts[j].push(i);
                }
            }
        }
    }
    let mut units: Vec<Vec<usize>> = Vec::new();
    let mut unit_of = vec![usize::MAX; rows];
    for row in 0..rows {
        let root = find(&mut parent, row);
        if unit_of[root] == usize::MAX {
            unit_of[root] = units.len();
            units.push(Vec::new());
        }
        units[unit_of[root]].push(row);
    }
    (units, conflicts)
}

fn unit_weight(weights: &[f64], unit: &[usize]) -> f64 {
    unit.iter().map(|&row| weights[row]).sum()
}

/// Split index per row.
///
/// `affinity[row][split]`, when given, takes precedence over the size
/// deficit when choosing among admissible splits. Returns `None` when some
/// unit fits nowhere.
pub(super) fn place_rows(
    weights: &[f64],
    splits: &SplitSpec,
    epsilon: f64,
    relation: Option<&Relation>,
    threshold: Option<f64>,
    affinity: Option<&[Vec<f64>]>,
) -> Option<Vec<usize>> {
    let total: f64 = weights.iter().sum();
    let limits = splits.size_limits(epsilon, total);
    let targets: Vec<f64> = splits.fractions().iter().map(|f| f * total).collect();
    let (mut units, conflicts) = ties(weights.len(), relation, threshold);
    units.sort_by(|a, b| unit_weight(weights, b).total_cmp(&unit_weight(weights, a)));

    let mut load = vec![0.0; splits.len()];
    let mut placed: Vec<Option<usize>> = vec![None; weights.len()];
    for unit in &units {
        let weight = unit_weight(weights, unit);
        let admissible = (0..splits.len()).filter(|&split| {
            load[split] + weight <= limits[split].upper + FEASIBILITY_TOLERANCE
                && unit.iter().all(|&row| {
                    conflicts[row]
                        .iter()
                        .all(|&other| placed[other] != Some(split))
                })
        });
        let score = |split: usize| {
            let pull = affinity.map_or(0.0, |affinity| {
                unit.iter().map(|&row| affinity[row][split]).sum::<f64>()
            });
            (pull, targets[split] - load[split])
        };
        let split = admissible.max_by(|&a, &b| {
            let (sa, sb) = (score(a), score(b));
            sa.0.total_cmp(&sb.0).then(sa.1.total_cmp(&sb.1))
        })?;
        load[split] += weight;
        for &row in unit {
            placed[row] = Some(split);
        }
    }
    placed.into_iter().collect()
}

/// Set the one-hot variables of `grid` for `rows` in `values`.
pub(super) fn mark_rows(values: &mut [f64], grid: &BoolGrid, rows: &[usize]) {
    for (row, &split) in rows.iter().enumerate() {
        values[grid.at(row, split).0] = 1.0;
    }
}
