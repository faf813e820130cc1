use indexmap::IndexMap;
use tracing::info;

use super::SplitProblem;
use super::warm::{mark_rows, place_rows};
use crate::builder::{
    at_most_one, coverage_loss, interaction_constraints, leakage_loss, one_hot,
    relatedness_constraints, size_constraints,
};
use crate::constants::optimizer::{COVERAGE_LOSS_WEIGHT, LEAKAGE_LOSS_WEIGHT};
use crate::dataset::{EntitySet, GroupedSet, InteractionSet, Relation};
use crate::decode::{DoubleAssignment, decode_pairs, decode_rows};
use crate::program::{BoolGrid, ProgramBuilder};
use crate::solver::solve;
use crate::types::InteractionPair;

/// Pair rows of a two-sided program: each observed pair with its weight and
/// the e/f rows it links.
struct PairRows {
    labels: Vec<InteractionPair>,
    links: Vec<(usize, usize)>,
    weights: Vec<f64>,
}

/// Allocate pair indicators and tie them to the e/f grids: at most one split
/// per pair, interaction weight per split inside the size windows, and each
/// indicator equal to the AND of its endpoints.
fn link_pairs(
    builder: &mut ProgramBuilder,
    problem: &SplitProblem<'_>,
    e_grid: &BoolGrid,
    f_grid: &BoolGrid,
    rows: &PairRows,
) -> BoolGrid {
    let splits = problem.splits.len();
    let pairs = builder.grid(rows.labels.len(), splits);
    builder.constrain(at_most_one(&pairs));
    let total: f64 = rows.weights.iter().sum();
    let limits = problem.splits.size_limits(problem.epsilon, total);
    for (split, limit) in limits.into_iter().enumerate() {
        builder.constrain(size_constraints(&pairs, split, &rows.weights, limit));
        for (row, &(e, f)) in rows.links.iter().enumerate() {
            builder.constrain(interaction_constraints(
                e_grid.at(e, split),
                f_grid.at(f, split),
                pairs.at(row, split),
            ));
        }
    }
    builder.minimize(coverage_loss(&pairs, &rows.weights), COVERAGE_LOSS_WEIGHT);
    pairs
}

/// Relatedness ties of one side: relation and cap, when both exist.
type SideTies<'a> = (Option<&'a Relation>, Option<f64>);

/// Greedy start for a two-sided program: e rows placed by the interaction
/// weight they carry, f rows drawn to the splits of their partners, pair
/// indicators set where both ends agree.
fn seed_pairs(
    builder: &mut ProgramBuilder,
    problem: &SplitProblem<'_>,
    grids: [&BoolGrid; 3],
    rows: &PairRows,
    e_ties: SideTies<'_>,
    f_ties: SideTies<'_>,
) {
    let [e_grid, f_grid, pair_grid] = grids;
    let splits = problem.splits.len();
    let mut e_load = vec![0.0; e_grid.rows()];
    let mut f_load = vec![0.0; f_grid.rows()];
    for (&(e, f), weight) in rows.links.iter().zip(&rows.weights) {
        e_load[e] += weight;
        f_load[f] += weight;
    }
    let Some(e_rows) = place_rows(&e_load, problem.splits, problem.epsilon, e_ties.0, e_ties.1, None)
    else {
        return;
    };
    let mut affinity = vec![vec![0.0; splits]; f_grid.rows()];
    for (&(e, f), weight) in rows.links.iter().zip(&rows.weights) {
        affinity[f][e_rows[e]] += weight;
    }
    let Some(f_rows) = place_rows(
        &f_load,
        problem.splits,
        problem.epsilon,
        f_ties.0,
        f_ties.1,
        Some(&affinity),
    ) else {
        return;
    };
    let mut start = vec![0.0; builder.var_count()];
    mark_rows(&mut start, e_grid, &e_rows);
    mark_rows(&mut start, f_grid, &f_rows);
    for (row, &(e, f)) in rows.links.iter().enumerate() {
        if e_rows[e] == f_rows[f] {
            start[pair_grid.at(row, e_rows[e]).0] = 1.0;
        }
    }
    builder.warm_start(start);
}

/// Split two entity collections and their interactions so that every selected
/// interaction has both endpoints in its split.
///
/// Only observed interactions get indicators. Interactions whose endpoints
/// land in different splits are [`crate::splits::PairLabel::NotSelected`].
pub fn solve_identity_double(
    problem: &SplitProblem<'_>,
    e: &EntitySet,
    f: &EntitySet,
    interactions: &InteractionSet,
) -> Option<DoubleAssignment> {
    let e_names: Vec<String> = e.ids().cloned().collect();
    let f_names: Vec<String> = f.ids().cloned().collect();
    let mut rows = PairRows {
        labels: Vec::with_capacity(interactions.len()),
        links: Vec::with_capacity(interactions.len()),
        weights: Vec::with_capacity(interactions.len()),
    };
    for (left, right) in interactions.pairs() {
        if let (Some(ei), Some(fi)) = (
            e.weights().get_index_of(left),
            f.weights().get_index_of(right),
        ) {
            rows.labels.push((left.clone(), right.clone()));
            rows.links.push((ei, fi));
            rows.weights.push(1.0);
        }
    }
    info!(
        "[splitsail:optimize] identity double split: {} e, {} f, {} interactions, {} splits",
        e_names.len(),
        f_names.len(),
        rows.labels.len(),
        problem.splits.len()
    );

    let mut builder = ProgramBuilder::new();
    let e_grid = builder.grid(e_names.len(), problem.splits.len());
    let f_grid = builder.grid(f_names.len(), problem.splits.len());
    builder.constrain(one_hot(&e_grid));
    builder.constrain(one_hot(&f_grid));
    let pair_grid = link_pairs(&mut builder, problem, &e_grid, &f_grid, &rows);
    seed_pairs(
        &mut builder,
        problem,
        [&e_grid, &f_grid, &pair_grid],
        &rows,
        (None, None),
        (None, None),
    );

    let values = solve(&builder.build(), &problem.solver)?;
    Some(DoubleAssignment {
        e: decode_rows(&values, &e_grid, &e_names, problem.splits),
        f: decode_rows(&values, &f_grid, &f_names, problem.splits),
        pairs: decode_pairs(&values, &pair_grid, &rows.labels, problem.splits),
    })
}

/// Two-sided split over groups. Pair rows are the observed group pairs,
/// weighted by how many interactions they carry; relatedness caps apply on
/// each side that has both a relation and a threshold.
///
/// Returns group-level assignments; pair keys are `(e group, f group)`.
pub fn solve_cluster_double(
    problem: &SplitProblem<'_>,
    e: &GroupedSet,
    f: &GroupedSet,
    interactions: &InteractionSet,
    e_threshold: Option<f64>,
    f_threshold: Option<f64>,
) -> Option<DoubleAssignment> {
    let mut group_pairs: IndexMap<(usize, usize), f64> = IndexMap::new();
    for (left, right) in interactions.pairs() {
        let ge = e.group_of(left).and_then(|g| e.group_index(g));
        let gf = f.group_of(right).and_then(|g| f.group_index(g));
        if let (Some(ge), Some(gf)) = (ge, gf) {
            *group_pairs.entry((ge, gf)).or_insert(0.0) += 1.0;
        }
    }
    let rows = PairRows {
        labels: group_pairs
            .keys()
            .map(|&(ge, gf)| (e.groups()[ge].clone(), f.groups()[gf].clone()))
            .collect(),
        links: group_pairs.keys().copied().collect(),
        weights: group_pairs.values().copied().collect(),
    };
    info!(
        "[splitsail:optimize] cluster double split: {} e groups, {} f groups, {} group pairs, {} splits",
        e.group_count(),
        f.group_count(),
        rows.labels.len(),
        problem.splits.len()
    );

    let mut builder = ProgramBuilder::new();
    let e_grid = builder.grid(e.group_count(), problem.splits.len());
    let f_grid = builder.grid(f.group_count(), problem.splits.len());
    builder.constrain(one_hot(&e_grid));
    builder.constrain(one_hot(&f_grid));
    for (side, grid, threshold) in [(e, &e_grid, e_threshold), (f, &f_grid, f_threshold)] {
        if let Some(relation) = side.relation() {
            if let Some(threshold) = threshold {
                builder.constrain(relatedness_constraints(grid, relation, threshold));
            }
            builder.minimize(
                leakage_loss(grid, relation, side.group_weights()),
                LEAKAGE_LOSS_WEIGHT,
            );
        }
    }
    let pair_grid = link_pairs(&mut builder, problem, &e_grid, &f_grid, &rows);
    seed_pairs(
        &mut builder,
        problem,
        [&e_grid, &f_grid, &pair_grid],
        &rows,
        (e.relation(), e_threshold),
        (f.relation(), f_threshold),
    );

    let values = solve(&builder.build(), &problem.solver)?;
    Some(DoubleAssignment {
        e: decode_rows(&values, &e_grid, e.groups(), problem.splits),
        f: decode_rows(&values, &f_grid, f.groups(), problem.splits),
        pairs: decode_pairs(&values, &pair_grid, &rows.labels, problem.splits),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Grouping, SymMatrix};
    use crate::decode::{expand_group_pairs, expand_groups};
    use crate::solver::{BranchAndBound, SolveContext};
    use crate::splits::{PairLabel, SplitSpec};
    use std::time::Duration;

    fn setup() -> (EntitySet, EntitySet, InteractionSet) {
        let e = EntitySet::uniform("e", ["e1", "e2", "e3", "e4"]).unwrap();
        let f = EntitySet::uniform("f", ["f1", "f2", "f3", "f4"]).unwrap();
        let pairs = [
            ("e1", "f1"),
            ("e1", "f2"),
            ("e2", "f2"),
            ("e3", "f3"),
            ("e4", "f4"),
            ("e4", "f1"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()));
        let inter = InteractionSet::new(pairs, &e, &f).unwrap();
        (e, f, inter)
    }

    #[test]
    fn identity_double_keeps_selected_pairs_consistent() {
        let (e, f, inter) = setup();
        let splits = SplitSpec::new(vec!["train".into(), "test".into()], vec![0.5, 0.5]).unwrap();
        let backend = BranchAndBound;
        let problem = SplitProblem {
            splits: &splits,
            epsilon: 0.2,
            solver: SolveContext {
                solver: &backend,
                budget: Duration::from_secs(5),
                threads: 1,
                log_file: None,
            },
        };
        let result = solve_identity_double(&problem, &e, &f, &inter).unwrap();
        assert_eq!(result.e.len(), 4);
        assert_eq!(result.f.len(), 4);
        assert_eq!(result.pairs.len(), inter.len());
        let mut selected = 0;
        for ((left, right), label) in &result.pairs {
            match label {
                PairLabel::Split(split) => {
                    selected += 1;
                    assert_eq!(&result.e[left], split);
                    assert_eq!(&result.f[right], split);
                }
                PairLabel::NotSelected => assert_ne!(result.e[left], result.f[right]),
            }
        }
        // Window for 6 interactions at 0.5 ± 0.2 is [1, 4] per split.
        assert!(selected >= 2);
    }

    /// Eight entities in four two-member groups; groups `hot.0` and `hot.1`
    /// are closely related, the rest only loosely.
    fn paired_groups(prefix: &str, hot: (usize, usize)) -> GroupedSet {
        let entities =
            EntitySet::uniform(prefix, (0..8).map(|i| format!("{prefix}{i}"))).unwrap();
        let upper = prefix.to_uppercase();
        let mut matrix = SymMatrix::filled(4, 0.1);
        for g in 0..4 {
            matrix.set(g, g, 1.0);
        }
        matrix.set(hot.0, hot.1, 0.9);
        let grouping = Grouping {
            names: (0..4).map(|g| format!("{upper}{g}")).collect(),
            group_of: (0..8)
                .map(|i| (format!("{prefix}{i}"), format!("{upper}{}", i / 2)))
                .collect(),
            relation: Some(Relation::Similarity(matrix)),
        };
        GroupedSet::new(entities, grouping).unwrap()
    }

    #[test]
    fn cluster_double_keeps_groups_and_pairs_consistent() {
        let e = paired_groups("e", (0, 1));
        let f = paired_groups("f", (2, 3));
        let pairs = (0..8).flat_map(|i| {
            [
                (format!("e{i}"), format!("f{i}")),
                (format!("e{i}"), format!("f{}", (i + 2) % 8)),
            ]
        });
        let inter = InteractionSet::new(pairs, e.entities(), f.entities()).unwrap();
        let splits = SplitSpec::new(vec!["train".into(), "test".into()], vec![0.5, 0.5]).unwrap();
        let backend = BranchAndBound;
        let problem = SplitProblem {
            splits: &splits,
            epsilon: 0.2,
            solver: SolveContext {
                solver: &backend,
                budget: Duration::from_secs(5),
                threads: 1,
                log_file: None,
            },
        };

        let result = solve_cluster_double(&problem, &e, &f, &inter, Some(0.5), Some(0.5)).unwrap();
        assert_eq!(result.e.len(), 4);
        assert_eq!(result.f.len(), 4);
        assert_eq!(result.pairs.len(), 8);
        assert_eq!(result.e["E0"], result.e["E1"]);
        assert_eq!(result.f["F2"], result.f["F3"]);
        let mut selected = 0.0;
        for ((ge, gf), label) in &result.pairs {
            match label {
                PairLabel::Split(split) => {
                    selected += 2.0;
                    assert_eq!(&result.e[ge], split);
                    assert_eq!(&result.f[gf], split);
                }
                PairLabel::NotSelected => assert_ne!(result.e[ge], result.f[gf]),
            }
        }
        // Each split must carry between 4 and 11 of the 16 interactions.
        assert!(selected >= 8.0);

        let e_entities = expand_groups(&e, &result.e);
        let f_entities = expand_groups(&f, &result.f);
        let expanded = expand_group_pairs(&inter, &e, &f, &result.pairs);
        assert_eq!(expanded.len(), inter.len());
        for ((left, right), label) in &expanded {
            let same = e_entities[left] == f_entities[right];
            match label {
                PairLabel::Split(split) => {
                    assert!(same);
                    assert_eq!(&e_entities[left], split);
                }
                PairLabel::NotSelected => assert!(!same),
            }
        }
    }
}
