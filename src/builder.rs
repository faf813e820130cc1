//! Constraint and objective construction over [`BoolGrid`] assignment blocks.
//!
//! Grids are laid out with one row per entity, group or interaction pair and
//! one column per split.

use crate::constants::optimizer::{AND_LOWER_OFFSET, AND_UPPER_FACTOR};
use crate::dataset::Relation;
use crate::program::{BoolGrid, Constraint, ConstraintKind, Expr, Var};
use crate::splits::SizeLimits;

/// Every row is assigned to exactly one split.
pub fn one_hot(grid: &BoolGrid) -> Vec<Constraint> {
    (0..grid.rows())
        .map(|row| {
            Constraint::eq(
                Expr::sum(grid.row(row).map(|v| (v, 1.0))),
                1.0,
                ConstraintKind::OneHot,
            )
        })
        .collect()
}

/// Every row is assigned to at most one split.
pub fn at_most_one(grid: &BoolGrid) -> Vec<Constraint> {
    (0..grid.rows())
        .map(|row| {
            Constraint::le(
                Expr::sum(grid.row(row).map(|v| (v, 1.0))),
                1.0,
                ConstraintKind::AtMostOne,
            )
        })
        .collect()
}

/// Weighted size of split `split` must lie inside `limits`.
pub fn size_constraints(
    grid: &BoolGrid,
    split: usize,
    weights: &[f64],
    limits: SizeLimits,
) -> Vec<Constraint> {
    let assigned = Expr::sum(
        grid.column(split)
            .zip(weights.iter().copied())
            .filter(|(_, w)| *w != 0.0),
    );
    vec![
        Constraint::ge(assigned.clone(), limits.lower, ConstraintKind::Size),
        Constraint::le(assigned, limits.upper, ConstraintKind::Size),
    ]
}

/// Pairwise relatedness caps for every split.
///
/// Similarity: a pair separated by split `s` costs `(x_i − x_j)² · sim_ij`,
/// capped at `threshold`. Distance: a pair sharing split `s` costs
/// `x_i · x_j · dist_ij`, capped at `threshold`. Pairs whose relation value
/// does not exceed the threshold can never violate the cap and are skipped.
pub fn relatedness_constraints(
    grid: &BoolGrid,
    relation: &Relation,
    threshold: f64,
) -> Vec<Constraint> {
    let matrix = relation.matrix();
    let mut constraints = Vec::new();
    for i in 0..grid.rows() {
        for j in (i + 1)..grid.rows() {
            let value = matrix.get(i, j);
            if value <= threshold {
                continue;
            }
            for split in 0..grid.cols() {
                let (a, b) = (grid.at(i, split), grid.at(j, split));
                let expr = match relation {
                    Relation::Similarity(_) => separated(a, b) * value,
                    Relation::Distance(_) => Expr::product(a, b, value),
                };
                constraints.push(Constraint::le(expr, threshold, ConstraintKind::Relatedness));
            }
        }
    }
    constraints
}

/// `(a − b)²` for booleans: `a + b − 2ab`.
fn separated(a: Var, b: Var) -> Expr {
    Expr::term(a, 1.0) + Expr::term(b, 1.0) + Expr::product(a, b, -2.0)
}

/// Sandwich pair indicator `pair` between its endpoints so that it equals
/// `left AND right` on booleans.
pub fn interaction_constraints(left: Var, right: Var, pair: Var) -> [Constraint; 4] {
    let kind = ConstraintKind::InteractionLink;
    [
        Constraint::ge(
            Expr::sum([(pair, 1.0), (left, -1.0), (right, -1.0)]),
            -AND_LOWER_OFFSET,
            kind,
        ),
        Constraint::le(
            Expr::sum([(pair, 1.0), (left, -AND_UPPER_FACTOR), (right, -AND_UPPER_FACTOR)]),
            0.0,
            kind,
        ),
        Constraint::le(Expr::sum([(pair, 1.0), (left, -1.0)]), 0.0, kind),
        Constraint::le(Expr::sum([(pair, 1.0), (right, -1.0)]), 0.0, kind),
    ]
}

/// `Σ_s (Σ_i w_i x_is − f_s W)² / W²`.
pub fn size_loss(grid: &BoolGrid, weights: &[f64], fractions: &[f64]) -> Expr {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Expr::zero();
    }
    let mut loss = Expr::zero();
    for (split, fraction) in fractions.iter().enumerate() {
        let terms: Vec<(Var, f64)> = grid
            .column(split)
            .zip(weights.iter().map(|w| w / total))
            .collect();
        loss += Expr::square_of_affine(-fraction, &terms);
    }
    loss
}

/// Weighted relation mass counted by the relatedness penalty, normalised by
/// the total pairwise mass so the term stays in `[0, K]`.
///
/// Similarity counts separated pairs, distance counts co-assigned pairs.
pub fn leakage_loss(grid: &BoolGrid, relation: &Relation, weights: &[f64]) -> Expr {
    let matrix = relation.matrix();
    let mut mass = 0.0;
    let mut loss = Expr::zero();
    for i in 0..grid.rows() {
        for j in (i + 1)..grid.rows() {
            let coeff = matrix.get(i, j) * weights[i] * weights[j];
            if coeff == 0.0 {
                continue;
            }
            mass += coeff;
            for split in 0..grid.cols() {
                let (a, b) = (grid.at(i, split), grid.at(j, split));
                loss += match relation {
                    Relation::Similarity(_) => separated(a, b) * coeff,
                    Relation::Distance(_) => Expr::product(a, b, coeff),
                };
            }
        }
    }
    if mass > 0.0 { loss * (1.0 / mass) } else { loss }
}

/// `Σ_p w_p (1 − Σ_s y_ps) / Σ_p w_p`: share of interaction weight left out
/// of every split.
pub fn coverage_loss(pairs: &BoolGrid, pair_weights: &[f64]) -> Expr {
    let total: f64 = pair_weights.iter().sum();
    if total <= 0.0 {
        return Expr::zero();
    }
    let mut loss = Expr::constant(1.0);
    for (row, weight) in pair_weights.iter().enumerate() {
        for var in pairs.row(row) {
            loss.push_term(var, -weight / total);
        }
    }
    loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SymMatrix;
    use crate::program::ProgramBuilder;

    fn assignment(grid: &BoolGrid, splits: &[usize], var_count: usize) -> Vec<f64> {
        let mut values = vec![0.0; var_count];
        for (row, split) in splits.iter().enumerate() {
            values[grid.at(row, *split).0] = 1.0;
        }
        values
    }

    #[test]
    fn one_hot_and_size_constraints_accept_balanced_assignment() {
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(4, 2);
        builder.constrain(one_hot(&grid));
        let limits = SizeLimits {
            lower: 2.0,
            upper: 2.0,
        };
        for split in 0..2 {
            builder.constrain(size_constraints(&grid, split, &[1.0; 4], limits));
        }
        let program = builder.build();
        assert!(program.is_feasible(&assignment(&grid, &[0, 1, 0, 1], 8), 1e-9));
        assert!(!program.is_feasible(&assignment(&grid, &[0, 0, 0, 1], 8), 1e-9));
    }

    #[test]
    fn interaction_sandwich_is_logical_and() {
        let constraints = interaction_constraints(Var(0), Var(1), Var(2));
        for bits in 0..8u32 {
            let values: Vec<f64> = (0..3).map(|i| f64::from((bits >> i) & 1)).collect();
            let feasible = constraints.iter().all(|c| c.is_satisfied(&values, 1e-9));
            let expected = values[2] == f64::from(values[0] == 1.0 && values[1] == 1.0);
            assert_eq!(feasible, expected, "assignment {values:?}");
        }
    }

    #[test]
    fn similarity_cap_forbids_separating_close_pairs() {
        let matrix = SymMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.1],
            vec![0.9, 1.0, 0.1],
            vec![0.1, 0.1, 1.0],
        ])
        .unwrap();
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(3, 2);
        let caps = relatedness_constraints(&grid, &Relation::Similarity(matrix), 0.5);
        assert_eq!(caps.len(), 2);
        builder.constrain(caps);
        let program = builder.build();
        assert!(program.is_feasible(&assignment(&grid, &[0, 0, 1], 6), 1e-9));
        assert!(!program.is_feasible(&assignment(&grid, &[0, 1, 1], 6), 1e-9));
    }

    #[test]
    fn distance_cap_forbids_sharing_distant_pairs() {
        let matrix = SymMatrix::from_rows(vec![vec![0.0, 0.8], vec![0.8, 0.0]]).unwrap();
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(2, 2);
        builder.constrain(relatedness_constraints(&grid, &Relation::Distance(matrix), 0.5));
        let program = builder.build();
        assert!(program.is_feasible(&assignment(&grid, &[0, 1], 4), 1e-9));
        assert!(!program.is_feasible(&assignment(&grid, &[1, 1], 4), 1e-9));
    }

    #[test]
    fn size_loss_is_zero_on_target() {
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(4, 2);
        let loss = size_loss(&grid, &[1.0; 4], &[0.75, 0.25]).compact();
        assert!(loss.evaluate(&assignment(&grid, &[0, 0, 0, 1], 8)).abs() < 1e-12);
        let off = loss.evaluate(&assignment(&grid, &[0, 0, 1, 1], 8));
        assert!((off - 0.125).abs() < 1e-12);
    }

    #[test]
    fn leakage_loss_counts_separated_similarity_mass() {
        let matrix = SymMatrix::from_rows(vec![vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let mut builder = ProgramBuilder::new();
        let grid = builder.grid(2, 2);
        let loss = leakage_loss(&grid, &Relation::Similarity(matrix), &[1.0, 1.0]).compact();
        assert_eq!(loss.evaluate(&assignment(&grid, &[0, 0], 4)), 0.0);
        assert!((loss.evaluate(&assignment(&grid, &[0, 1], 4)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_loss_is_share_of_unselected_weight() {
        let mut builder = ProgramBuilder::new();
        let pairs = builder.grid(2, 2);
        let loss = coverage_loss(&pairs, &[3.0, 1.0]);
        let mut values = vec![0.0; 4];
        assert_eq!(loss.evaluate(&values), 1.0);
        values[pairs.at(0, 1).0] = 1.0;
        assert!((loss.evaluate(&values) - 0.25).abs() < 1e-12);
    }
}
