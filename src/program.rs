//! Boolean decision programs: variables, linear/quadratic expressions,
//! constraints and the objective handed to a solver backend.

use indexmap::IndexMap;
use std::ops::{Add, AddAssign, Mul};

/// Index of one boolean decision variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub usize);

/// Scalar expression `constant + Σ c·x + Σ c·x·y` over boolean variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expr {
    constant: f64,
    linear: Vec<(Var, f64)>,
    quadratic: Vec<(Var, Var, f64)>,
}

impl Expr {
    /// The zero expression.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant(value: f64) -> Self {
        Self {
            constant: value,
            ..Self::default()
        }
    }

    /// `coeff · var`.
    pub fn term(var: Var, coeff: f64) -> Self {
        Self {
            linear: vec![(var, coeff)],
            ..Self::default()
        }
    }

    /// `coeff · a · b`.
    pub fn product(a: Var, b: Var, coeff: f64) -> Self {
        Self {
            quadratic: vec![(a, b, coeff)],
            ..Self::default()
        }
    }

    /// Weighted sum `Σ c·x`.
    pub fn sum<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (Var, f64)>,
    {
        Self {
            linear: terms.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `(constant + Σ c·x)²`, expanded into linear and pairwise terms.
    pub fn square_of_affine(constant: f64, terms: &[(Var, f64)]) -> Self {
        let mut expr = Self::constant(constant * constant);
        for (i, &(a, ca)) in terms.iter().enumerate() {
            expr.linear.push((a, 2.0 * constant * ca));
            expr.quadratic.push((a, a, ca * ca));
            for &(b, cb) in &terms[i + 1..] {
                expr.quadratic.push((a, b, 2.0 * ca * cb));
            }
        }
        expr
    }

    /// Add `coeff · var` in place.
    pub fn push_term(&mut self, var: Var, coeff: f64) {
        self.linear.push((var, coeff));
    }

    /// Add `coeff · a · b` in place.
    pub fn push_product(&mut self, a: Var, b: Var, coeff: f64) {
        self.quadratic.push((a, b, coeff));
    }

    /// Constant part.
    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// Linear terms.
    pub fn linear_terms(&self) -> &[(Var, f64)] {
        &self.linear
    }

    /// Pairwise terms.
    pub fn quadratic_terms(&self) -> &[(Var, Var, f64)] {
        &self.quadratic
    }

    /// Whether the expression has no variable terms.
    pub fn is_constant(&self) -> bool {
        self.linear.is_empty() && self.quadratic.is_empty()
    }

    /// Merge duplicate terms, fold `x·x` into `x` (booleans are idempotent),
    /// orient pairs as `(min, max)` and drop zero coefficients.
    pub fn compact(self) -> Self {
        let mut linear: IndexMap<Var, f64> = IndexMap::new();
        let mut quadratic: IndexMap<(Var, Var), f64> = IndexMap::new();
        for (var, coeff) in self.linear {
            *linear.entry(var).or_insert(0.0) += coeff;
        }
        for (a, b, coeff) in self.quadratic {
            if a == b {
                *linear.entry(a).or_insert(0.0) += coeff;
            } else {
                *quadratic.entry((a.min(b), a.max(b))).or_insert(0.0) += coeff;
            }
        }
        Self {
            constant: self.constant,
            linear: linear.into_iter().filter(|(_, c)| *c != 0.0).collect(),
            quadratic: quadratic
                .into_iter()
                .filter(|(_, c)| *c != 0.0)
                .map(|((a, b), c)| (a, b, c))
                .collect(),
        }
    }

    /// Value under a full assignment.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        let linear: f64 = self.linear.iter().map(|(v, c)| c * values[v.0]).sum();
        let quadratic: f64 = self
            .quadratic
            .iter()
            .map(|(a, b, c)| c * values[a.0] * values[b.0])
            .sum();
        self.constant + linear + quadratic
    }

    /// Largest variable index mentioned, if any.
    pub fn max_var(&self) -> Option<Var> {
        let linear = self.linear.iter().map(|(v, _)| *v);
        let quadratic = self.quadratic.iter().map(|(a, b, _)| (*a).max(*b));
        linear.chain(quadratic).max()
    }
}

impl AddAssign for Expr {
    fn add_assign(&mut self, rhs: Expr) {
        self.constant += rhs.constant;
        self.linear.extend(rhs.linear);
        self.quadratic.extend(rhs.quadratic);
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(mut self, rhs: Expr) -> Expr {
        self += rhs;
        self
    }
}

impl Mul<f64> for Expr {
    type Output = Expr;

    fn mul(self, factor: f64) -> Expr {
        Self {
            constant: self.constant * factor,
            linear: self.linear.into_iter().map(|(v, c)| (v, c * factor)).collect(),
            quadratic: self
                .quadratic
                .into_iter()
                .map(|(a, b, c)| (a, b, c * factor))
                .collect(),
        }
    }
}

/// Comparison between a constraint expression and its right-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

/// Origin of a constraint, used for program statistics and debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Exactly one split per entity or group.
    OneHot,
    /// At most one split per interaction pair.
    AtMostOne,
    /// Weighted split size window.
    Size,
    /// Pairwise similarity/distance cap.
    Relatedness,
    /// Link between a pair indicator and its endpoints.
    InteractionLink,
}

/// One (in)equality of a program.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    /// Left-hand side.
    pub expr: Expr,
    /// Comparison.
    pub sense: Sense,
    /// Right-hand side.
    pub rhs: f64,
    /// What produced this constraint.
    pub kind: ConstraintKind,
}

impl Constraint {
    /// `expr <= rhs`
    pub fn le(expr: Expr, rhs: f64, kind: ConstraintKind) -> Self {
        Self {
            expr,
            sense: Sense::Le,
            rhs,
            kind,
        }
    }

    /// `expr >= rhs`
    pub fn ge(expr: Expr, rhs: f64, kind: ConstraintKind) -> Self {
        Self {
            expr,
            sense: Sense::Ge,
            rhs,
            kind,
        }
    }

    /// `expr == rhs`
    pub fn eq(expr: Expr, rhs: f64, kind: ConstraintKind) -> Self {
        Self {
            expr,
            sense: Sense::Eq,
            rhs,
            kind,
        }
    }

    /// Whether a value interval `[lo, hi]` of the expression can still meet
    /// the constraint.
    pub fn admits(&self, lo: f64, hi: f64, tolerance: f64) -> bool {
        match self.sense {
            Sense::Le => lo <= self.rhs + tolerance,
            Sense::Ge => hi >= self.rhs - tolerance,
            Sense::Eq => lo <= self.rhs + tolerance && hi >= self.rhs - tolerance,
        }
    }

    /// Whether a full assignment satisfies the constraint.
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let value = self.expr.evaluate(values);
        self.admits(value, value, tolerance)
    }
}

/// Rectangular block of boolean variables, row-major (`rows × cols`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoolGrid {
    offset: usize,
    rows: usize,
    cols: usize,
}

impl BoolGrid {
    /// Variable at `(row, col)`.
    pub fn at(&self, row: usize, col: usize) -> Var {
        debug_assert!(row < self.rows && col < self.cols);
        Var(self.offset + row * self.cols + col)
    }

    /// Number of rows (entities, groups or pairs).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (splits).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Variables of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = Var> + '_ {
        (0..self.cols).map(move |col| self.at(row, col))
    }

    /// Variables of one column.
    pub fn column(&self, col: usize) -> impl Iterator<Item = Var> + '_ {
        (0..self.rows).map(move |row| self.at(row, col))
    }
}

/// Incrementally assembles a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    var_count: usize,
    constraints: Vec<Constraint>,
    objective: Expr,
    warm_start: Option<Vec<f64>>,
}

impl ProgramBuilder {
    /// Empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a `rows × cols` block of fresh variables.
    pub fn grid(&mut self, rows: usize, cols: usize) -> BoolGrid {
        let grid = BoolGrid {
            offset: self.var_count,
            rows,
            cols,
        };
        self.var_count += rows * cols;
        grid
    }

    /// Variables allocated so far.
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Suggest a starting assignment. Backends ignore it unless it is
    /// feasible.
    pub fn warm_start(&mut self, values: Vec<f64>) {
        self.warm_start = Some(values);
    }

    /// Add constraints.
    pub fn constrain<I>(&mut self, constraints: I)
    where
        I: IntoIterator<Item = Constraint>,
    {
        self.constraints.extend(constraints);
    }

    /// Add `weight · term` to the objective (minimized).
    pub fn minimize(&mut self, term: Expr, weight: f64) {
        if weight != 0.0 {
            self.objective += term * weight;
        }
    }

    /// Finish, compacting every expression.
    pub fn build(self) -> Program {
        Program {
            var_count: self.var_count,
            constraints: self
                .constraints
                .into_iter()
                .map(|c| Constraint {
                    expr: c.expr.compact(),
                    ..c
                })
                .collect(),
            objective: self.objective.compact(),
            warm_start: self.warm_start,
        }
    }
}

/// Minimization program over boolean variables `0..var_count`.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    var_count: usize,
    constraints: Vec<Constraint>,
    objective: Expr,
    warm_start: Option<Vec<f64>>,
}

impl Program {
    /// Number of boolean variables.
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// All constraints.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Objective to minimize.
    pub fn objective(&self) -> &Expr {
        &self.objective
    }

    /// Suggested starting assignment, if any.
    pub fn warm_start(&self) -> Option<&[f64]> {
        self.warm_start.as_deref()
    }

    /// Constraint count per kind.
    pub fn constraint_counts(&self) -> IndexMap<ConstraintKind, usize> {
        let mut counts = IndexMap::new();
        for constraint in &self.constraints {
            *counts.entry(constraint.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Whether `values` satisfies every constraint.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        values.len() == self.var_count
            && self
                .constraints
                .iter()
                .all(|c| c.is_satisfied(values, tolerance))
    }
}

/// Variable values returned by a solver.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedValues {
    values: Vec<f64>,
}

impl SolvedValues {
    /// Wrap raw values indexed by variable.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Value of `var` (`0.0` when out of range).
    pub fn value(&self, var: Var) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }

    /// Values of one grid row.
    pub fn row(&self, grid: &BoolGrid, row: usize) -> Vec<f64> {
        grid.row(row).map(|var| self.value(var)).collect()
    }

    /// Raw values.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}
