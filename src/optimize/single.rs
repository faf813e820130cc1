use tracing::info;

use super::SplitProblem;
use super::warm::{mark_rows, place_rows};
use crate::builder::{leakage_loss, one_hot, relatedness_constraints, size_constraints, size_loss};
use crate::constants::optimizer::{LEAKAGE_LOSS_WEIGHT, SIZE_LOSS_WEIGHT};
use crate::dataset::{EntitySet, GroupedSet};
use crate::decode::{Assignment, decode_rows};
use crate::dataset::Relation;
use crate::program::{BoolGrid, ProgramBuilder};
use crate::solver::solve;

/// Hand the greedy placement of `grid`'s rows to the solver as a start.
fn seed_rows(
    builder: &mut ProgramBuilder,
    problem: &SplitProblem<'_>,
    grid: &BoolGrid,
    weights: &[f64],
    relation: Option<&Relation>,
    threshold: Option<f64>,
) {
    if let Some(rows) = place_rows(weights, problem.splits, problem.epsilon, relation, threshold, None) {
        let mut start = vec![0.0; builder.var_count()];
        mark_rows(&mut start, grid, &rows);
        builder.warm_start(start);
    }
}

/// Assign every entity of one collection to a split, balancing weight only.
///
/// Returns `None` when no assignment meets the size windows.
pub fn solve_identity_single(problem: &SplitProblem<'_>, entities: &EntitySet) -> Option<Assignment> {
    let names: Vec<String> = entities.ids().cloned().collect();
    let weights: Vec<f64> = entities.weights().values().copied().collect();
    info!(
        "[splitsail:optimize] identity split of {} entities into {} splits",
        names.len(),
        problem.splits.len()
    );

    let mut builder = ProgramBuilder::new();
    let grid = builder.grid(names.len(), problem.splits.len());
    builder.constrain(one_hot(&grid));
    let limits = problem
        .splits
        .size_limits(problem.epsilon, entities.total_weight());
    for (split, limit) in limits.into_iter().enumerate() {
        builder.constrain(size_constraints(&grid, split, &weights, limit));
    }
    builder.minimize(size_loss(&grid, &weights, problem.splits.fractions()), 1.0);
    seed_rows(&mut builder, problem, &grid, &weights, None, None);

    let values = solve(&builder.build(), &problem.solver)?;
    Some(decode_rows(&values, &grid, &names, problem.splits))
}

/// Assign every group of one collection to a split.
///
/// With a relation and a threshold, related groups are kept together (or
/// apart, for distances) up to the threshold, and the leakage loss is added
/// to the size loss. Returns group → split, or `None` without a solution.
pub fn solve_cluster_single(
    problem: &SplitProblem<'_>,
    grouped: &GroupedSet,
    threshold: Option<f64>,
) -> Option<Assignment> {
    let names = grouped.groups();
    let weights = grouped.group_weights();
    info!(
        "[splitsail:optimize] cluster split of {} groups ({} entities) into {} splits",
        names.len(),
        grouped.entities().len(),
        problem.splits.len()
    );

    let mut builder = ProgramBuilder::new();
    let grid = builder.grid(names.len(), problem.splits.len());
    builder.constrain(one_hot(&grid));
    let limits = problem.splits.size_limits(problem.epsilon, weights.iter().sum());
    for (split, limit) in limits.into_iter().enumerate() {
        builder.constrain(size_constraints(&grid, split, weights, limit));
    }
    builder.minimize(
        size_loss(&grid, weights, problem.splits.fractions()),
        SIZE_LOSS_WEIGHT,
    );
    if let Some(relation) = grouped.relation() {
        if let Some(threshold) = threshold {
            builder.constrain(relatedness_constraints(&grid, relation, threshold));
        }
        builder.minimize(leakage_loss(&grid, relation, weights), LEAKAGE_LOSS_WEIGHT);
    }
    seed_rows(&mut builder, problem, &grid, weights, grouped.relation(), threshold);

    let values = solve(&builder.build(), &problem.solver)?;
    Some(decode_rows(&values, &grid, names, problem.splits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Grouping, Relation, SymMatrix};
    use crate::solver::{BranchAndBound, SolveContext};
    use crate::splits::SplitSpec;
    use std::time::Duration;

    fn problem<'a>(splits: &'a SplitSpec, solver: &'a BranchAndBound, epsilon: f64) -> SplitProblem<'a> {
        SplitProblem {
            splits,
            epsilon,
            solver: SolveContext {
                solver,
                budget: Duration::from_secs(5),
                threads: 1,
                log_file: None,
            },
        }
    }

    #[test]
    fn identity_split_meets_size_window() {
        let splits = SplitSpec::new(vec!["train".into(), "test".into()], vec![0.75, 0.25]).unwrap();
        let backend = BranchAndBound;
        let entities = EntitySet::uniform("e", (0..8).map(|i| format!("e{i}"))).unwrap();
        let assignment = solve_identity_single(&problem(&splits, &backend, 0.0), &entities).unwrap();
        assert_eq!(assignment.len(), 8);
        let train = assignment.values().filter(|s| *s == "train").count();
        assert_eq!(train, 6);
    }

    #[test]
    fn identity_split_reports_infeasible_window() {
        let splits = SplitSpec::new(vec!["a".into(), "b".into()], vec![0.5, 0.5]).unwrap();
        let backend = BranchAndBound;
        let entities = crate::dataset::RawEntities::new("e")
            .with_entity("big", 9.0)
            .with_entity("small", 1.0)
            .deduplicate()
            .unwrap();
        assert!(solve_identity_single(&problem(&splits, &backend, 0.1), &entities).is_none());
    }

    #[test]
    fn cluster_split_keeps_similar_groups_together() {
        let splits = SplitSpec::new(vec!["train".into(), "test".into()], vec![0.5, 0.5]).unwrap();
        let backend = BranchAndBound;
        let entities = EntitySet::uniform("e", ["a", "b", "c", "d"]).unwrap();
        let relation = Relation::Similarity(
            SymMatrix::from_rows(vec![
                vec![1.0, 0.9, 0.0, 0.0],
                vec![0.9, 1.0, 0.0, 0.0],
                vec![0.0, 0.0, 1.0, 0.9],
                vec![0.0, 0.0, 0.9, 1.0],
            ])
            .unwrap(),
        );
        let mut grouping: Grouping = entities.identity_grouping();
        grouping.relation = Some(relation);
        let grouped = GroupedSet::new(entities, grouping).unwrap();
        let assignment =
            solve_cluster_single(&problem(&splits, &backend, 0.0), &grouped, Some(0.5)).unwrap();
        assert_eq!(assignment["a"], assignment["b"]);
        assert_eq!(assignment["c"], assignment["d"]);
        assert_ne!(assignment["a"], assignment["c"]);
    }

    #[test]
    fn cluster_split_with_sparse_caps_solves_within_budget() {
        let n = 60;
        let mut matrix = SymMatrix::filled(n, 0.3);
        for i in 0..n {
            matrix.set(i, i, 1.0);
        }
        // One 14-group chain plus three far-apart capped pairs.
        for i in 0..13 {
            matrix.set(i, i + 1, 0.9);
        }
        for (a, b) in [(20, 45), (22, 50), (30, 59)] {
            matrix.set(a, b, 0.8);
        }
        let entities = EntitySet::uniform("g", (0..n).map(|i| format!("g{i}"))).unwrap();
        let mut grouping: Grouping = entities.identity_grouping();
        grouping.relation = Some(Relation::Similarity(matrix));
        let grouped = GroupedSet::new(entities, grouping).unwrap();
        let splits = SplitSpec::new(
            vec!["train".into(), "val".into(), "test".into()],
            vec![0.7, 0.2, 0.1],
        )
        .unwrap();
        let backend = BranchAndBound;
        let mut problem = problem(&splits, &backend, 0.05);
        problem.solver.budget = Duration::from_secs(1);

        let assignment = solve_cluster_single(&problem, &grouped, Some(0.595)).unwrap();
        assert_eq!(assignment.len(), n);
        assert!((1..14).all(|i| assignment[&format!("g{i}")] == assignment["g0"]));
        for (a, b) in [("g20", "g45"), ("g22", "g50"), ("g30", "g59")] {
            assert_eq!(assignment[a], assignment[b]);
        }
        let train = assignment.values().filter(|s| *s == "train").count();
        assert!((38..=45).contains(&train), "train holds {train}");
    }
}
