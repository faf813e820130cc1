/// Constants used by the cluster count calibrator.
pub mod calibration {
    /// Group counts at or below this value are too few to split meaningfully.
    pub const WINDOW_MIN_EXCLUSIVE: usize = 10;
    /// Group counts above this value defeat the purpose of clustering.
    pub const WINDOW_MAX_INCLUSIVE: usize = 100;
    /// Binary-search trials allowed after the initial and extreme trials.
    pub const MAX_SEARCH_ROUNDS: usize = 8;
    /// Starting similarity cut-off for linkage clustering.
    pub const LINKAGE_INITIAL_CUTOFF: f64 = 0.8;
    /// Cut-off that links every pair of entities.
    pub const LINKAGE_FEWEST_GROUPS_CUTOFF: f64 = 0.0;
    /// Cut-off no similarity in `[0, 1]` can reach (one group per entity).
    pub const LINKAGE_MOST_GROUPS_CUTOFF: f64 = 1.000_001;
}

/// Constants used when building and weighting split programs.
pub mod optimizer {
    /// Weight of the normalized size-deviation loss in cluster-based objectives.
    pub const SIZE_LOSS_WEIGHT: f64 = 0.1;
    /// Weight of the interaction-coverage loss in double-sided objectives.
    pub const COVERAGE_LOSS_WEIGHT: f64 = 1.0;
    /// Weight of each side's leakage loss.
    pub const LEAKAGE_LOSS_WEIGHT: f64 = 1.0;
    /// Offset in `y >= e + f - AND_LOWER_OFFSET` forcing the pair indicator on.
    pub const AND_LOWER_OFFSET: f64 = 1.5;
    /// Factor in `y <= (e + f) * AND_UPPER_FACTOR` forcing the pair indicator off.
    pub const AND_UPPER_FACTOR: f64 = 0.5;
    /// Solved values above this threshold count as "set".
    pub const ASSIGNED_THRESHOLD: f64 = 0.1;
}

/// Constants used by the solver gateway and the built-in backend.
pub mod solver {
    /// Default wall-clock budget for one solve, in seconds.
    pub const DEFAULT_MAX_SEC: u64 = 10;
    /// Absolute tolerance applied to constraint checks.
    pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;
    /// Minimum objective improvement for a new incumbent.
    pub const IMPROVEMENT_TOLERANCE: f64 = 1e-9;
    /// Search nodes between two deadline checks.
    pub const DEADLINE_CHECK_INTERVAL: u64 = 1024;
    /// Log message suggesting how to make a program solvable.
    pub const RELAX_HINT: &str = "Please consider relaxing split restrictions, e.g., less splits, \
         or a higher tolerance level for exceeding cluster limits.";
}

/// Constants used by split specifications and assignment artifacts.
pub mod splits {
    /// Label written for interactions the optimizer leaves unassigned.
    pub const NOT_SELECTED: &str = "not selected";
    /// Default split names when none are configured.
    pub const DEFAULT_SPLIT_NAMES: [&str; 3] = ["train", "val", "test"];
    /// Default split fractions matching [`DEFAULT_SPLIT_NAMES`].
    pub const DEFAULT_SPLIT_FRACTIONS: [f64; 3] = [0.7, 0.2, 0.1];
    /// Default size tolerance as a fraction of total weight.
    pub const DEFAULT_EPSILON: f64 = 0.05;
    /// Tolerance when checking that fractions sum to one.
    pub const FRACTION_SUM_TOLERANCE: f64 = 1e-6;
}

/// Constants used by on-disk artifacts.
pub mod output {
    /// File holding the e-side entity assignment.
    pub const E_SPLITS_FILENAME: &str = "e_splits.tsv";
    /// File holding the f-side entity assignment.
    pub const F_SPLITS_FILENAME: &str = "f_splits.tsv";
    /// File holding the interaction assignment.
    pub const INTER_SPLITS_FILENAME: &str = "inter.tsv";
    /// File holding the JSON run report.
    pub const REPORT_FILENAME: &str = "report.json";
    /// Header of single-entity assignment files.
    pub const ENTITY_HEADER: &str = "id\tsplit";
    /// Header of interaction assignment files.
    pub const INTER_HEADER: &str = "id_e\tid_f\tsplit";
    /// File extension of per-trial and per-solve log files.
    pub const LOG_EXTENSION: &str = "log";
}

/// Constants used by the random baseline split.
pub mod random {
    /// Default seed for the random baseline.
    pub const DEFAULT_SEED: u64 = 42;
}
