//! Cluster count calibration.
//!
//! Re-runs a grouping trial with different parameters until the group count
//! lands in `(10, 100]`. The trial must be monotone in its parameter: moving
//! from [`ParamSearch::fewest_groups`] towards [`ParamSearch::most_groups`]
//! never decreases the group count. Violations are logged, not trusted.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::constants::calibration::{
    MAX_SEARCH_ROUNDS, WINDOW_MAX_INCLUSIVE, WINDOW_MIN_EXCLUSIVE,
};
use crate::constants::output::LOG_EXTENSION;
use crate::dataset::Grouping;
use crate::errors::SplitError;

/// Parameter strategy for one grouping tool.
pub trait ParamSearch {
    /// Tool parameter.
    type Param: Copy + fmt::Debug;

    /// First parameter tried.
    fn initial(&self) -> Self::Param;
    /// Parameter expected to produce the fewest groups.
    fn fewest_groups(&self) -> Self::Param;
    /// Parameter guaranteed to produce one group per entity.
    fn most_groups(&self) -> Self::Param;
    /// Next probe between a too-few-groups and a too-many-groups parameter.
    fn midpoint(&self, fewer: Self::Param, more: Self::Param) -> Self::Param;
    /// Human-readable parameter rendering used in log file names.
    fn label(&self, param: Self::Param) -> String;
}

/// Anything a trial returns that has a group count.
pub trait GroupCount {
    /// Number of groups produced.
    fn group_count(&self) -> usize;
}

impl GroupCount for Grouping {
    fn group_count(&self) -> usize {
        self.len()
    }
}

impl GroupCount for usize {
    fn group_count(&self) -> usize {
        *self
    }
}

/// Where per-trial logs go.
#[derive(Clone, Debug, Default)]
pub struct TrialLogs {
    /// Directory receiving one log per trial; `None` disables trial logs.
    pub dir: Option<PathBuf>,
    /// Dataset label.
    pub dataset: String,
    /// Tool label.
    pub tool: String,
}

impl TrialLogs {
    /// `<dir>/<dataset>_<tool>_<label>.log`, with `-` removed from the label
    /// and spaces replaced by `_`.
    pub fn path_for(&self, label: &str) -> Option<PathBuf> {
        let dir = self.dir.as_deref()?;
        let label = label.replace('-', "").replace(' ', "_");
        Some(dir.join(format!(
            "{}_{}_{}.{LOG_EXTENSION}",
            self.dataset, self.tool, label
        )))
    }
}

/// Grouping chosen by [`calibrate`].
#[derive(Clone, Debug)]
pub struct Calibrated<G> {
    /// Chosen trial output.
    pub grouping: G,
    /// Label of the parameter that produced it.
    pub param_label: String,
    /// Trials run.
    pub trials: usize,
    /// Whether the group count is inside the window.
    pub in_window: bool,
}

/// Whether `count` is inside `(10, 100]`.
pub fn in_window(count: usize) -> bool {
    count > WINDOW_MIN_EXCLUSIVE && count <= WINDOW_MAX_INCLUSIVE
}

struct Sample<P, G> {
    param: P,
    output: G,
}

impl<P, G: GroupCount> Sample<P, G> {
    fn count(&self) -> usize {
        self.output.group_count()
    }
}

/// Search parameters of `search` until `trial` yields an in-window count.
///
/// Runs at most ten trials: the initial one, one extreme, and up to eight
/// bisection rounds, the last of which is accepted unconditionally. When the
/// window is unreachable the closest extreme is returned with a warning. Only
/// trial errors propagate.
pub fn calibrate<S, G, F>(
    search: &S,
    logs: &TrialLogs,
    mut trial: F,
) -> Result<Calibrated<G>, SplitError>
where
    S: ParamSearch,
    G: GroupCount,
    F: FnMut(S::Param, Option<&Path>) -> Result<G, SplitError>,
{
    let mut trials = 0usize;
    let mut run = |param: S::Param| -> Result<Sample<S::Param, G>, SplitError> {
        trials += 1;
        let log_file = logs.path_for(&search.label(param));
        let output = trial(param, log_file.as_deref())?;
        info!(
            "[splitsail:calibrate] {} trial {trials} ({}) produced {} groups",
            logs.tool,
            search.label(param),
            output.group_count()
        );
        Ok(Sample { param, output })
    };

    let first = run(search.initial())?;
    if in_window(first.count()) {
        return Ok(finish(search, first, 1, true));
    }
    let (mut fewer, mut more) = if first.count() <= WINDOW_MIN_EXCLUSIVE {
        let more = run(search.most_groups())?;
        (first, more)
    } else {
        let fewer = run(search.fewest_groups())?;
        (fewer, first)
    };
    if fewer.count() > more.count() {
        warn!(
            "[splitsail:calibrate] {} produced {} groups at {} but {} at {}; group count is not monotone in the parameter",
            logs.tool,
            fewer.count(),
            search.label(fewer.param),
            more.count(),
            search.label(more.param)
        );
    }
    if in_window(fewer.count()) {
        return Ok(finish(search, fewer, 2, true));
    }
    if in_window(more.count()) {
        return Ok(finish(search, more, 2, true));
    }
    if more.count() <= WINDOW_MIN_EXCLUSIVE {
        warn!(
            "[splitsail:calibrate] {} cannot reach the cluster window; the maximal number of groups is {}",
            logs.tool,
            more.count()
        );
        return Ok(finish(search, more, 2, false));
    }
    if fewer.count() > WINDOW_MAX_INCLUSIVE {
        warn!(
            "[splitsail:calibrate] {} cannot reach the cluster window; the minimal number of groups is {}",
            logs.tool,
            fewer.count()
        );
        return Ok(finish(search, fewer, 2, false));
    }

    let mut round = 0;
    loop {
        round += 1;
        let probe = run(search.midpoint(fewer.param, more.param))?;
        let count = probe.count();
        if in_window(count) || round >= MAX_SEARCH_ROUNDS {
            return Ok(finish(search, probe, 2 + round, in_window(count)));
        }
        if count <= WINDOW_MIN_EXCLUSIVE {
            fewer = probe;
        } else {
            more = probe;
        }
    }
}

fn finish<S: ParamSearch, G>(
    search: &S,
    sample: Sample<S::Param, G>,
    trials: usize,
    in_window: bool,
) -> Calibrated<G> {
    Calibrated {
        grouping: sample.output,
        param_label: search.label(sample.param),
        trials,
        in_window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count = floor(1 / p)`: small parameters give many groups.
    struct Reciprocal;

    impl ParamSearch for Reciprocal {
        type Param = f64;

        fn initial(&self) -> f64 {
            0.5
        }

        fn fewest_groups(&self) -> f64 {
            1.0
        }

        fn most_groups(&self) -> f64 {
            0.001
        }

        fn midpoint(&self, fewer: f64, more: f64) -> f64 {
            (fewer + more) / 2.0
        }

        fn label(&self, param: f64) -> String {
            format!("p {param}")
        }
    }

    fn reciprocal(p: f64) -> usize {
        (1.0 / p).floor() as usize
    }

    #[test]
    fn window_bounds_are_exclusive_then_inclusive() {
        assert!(!in_window(10));
        assert!(in_window(11));
        assert!(in_window(100));
        assert!(!in_window(101));
    }

    #[test]
    fn reciprocal_trial_converges_in_window() {
        let mut calls = Vec::new();
        let result = calibrate(&Reciprocal, &TrialLogs::default(), |p, log| {
            assert!(log.is_none());
            calls.push(p);
            Ok(reciprocal(p))
        })
        .unwrap();
        assert!(result.in_window);
        assert!(in_window(result.grouping));
        assert!(calls.len() <= 10);
        assert_eq!(result.trials, calls.len());
        assert_eq!(result.grouping, 15);
    }

    #[test]
    fn initial_hit_returns_immediately() {
        struct Direct;
        impl ParamSearch for Direct {
            type Param = usize;
            fn initial(&self) -> usize {
                50
            }
            fn fewest_groups(&self) -> usize {
                1
            }
            fn most_groups(&self) -> usize {
                1000
            }
            fn midpoint(&self, fewer: usize, more: usize) -> usize {
                (fewer + more) / 2
            }
            fn label(&self, param: usize) -> String {
                param.to_string()
            }
        }
        let mut trials = 0;
        let result = calibrate(&Direct, &TrialLogs::default(), |p, _| {
            trials += 1;
            Ok(p)
        })
        .unwrap();
        assert_eq!(trials, 1);
        assert_eq!(result.grouping, 50);
    }

    #[test]
    fn unreachable_window_returns_closest_extreme() {
        // Never more than 8 groups.
        let result = calibrate(&Reciprocal, &TrialLogs::default(), |p, _| {
            Ok(reciprocal(p).min(8))
        })
        .unwrap();
        assert!(!result.in_window);
        assert_eq!(result.trials, 2);
        assert_eq!(result.grouping, 8);

        // Never fewer than 500 groups.
        let result = calibrate(&Reciprocal, &TrialLogs::default(), |p, _| {
            Ok(reciprocal(p).max(500))
        })
        .unwrap();
        assert!(!result.in_window);
        assert_eq!(result.grouping, 500);
        assert_eq!(result.param_label, "p 1");
    }

    #[test]
    fn narrow_window_stops_after_ten_trials() {
        // Jumps straight from 10 to 101 groups; the window is never hit.
        let mut trials = 0;
        let result = calibrate(&Reciprocal, &TrialLogs::default(), |p, _| {
            trials += 1;
            Ok(if p > 0.05 { 10 } else { 101 })
        })
        .unwrap();
        assert_eq!(trials, 10);
        assert_eq!(result.trials, 10);
        assert!(!result.in_window);
    }

    #[test]
    fn trial_errors_propagate() {
        let err = calibrate(&Reciprocal, &TrialLogs::default(), |_, _| {
            Err::<usize, _>(SplitError::ExternalTool {
                tool: "linkage".into(),
                details: "crashed".into(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, SplitError::ExternalTool { .. }));
    }

    #[test]
    fn trial_log_paths_are_sanitised() {
        let logs = TrialLogs {
            dir: Some(PathBuf::from("/tmp/logs")),
            dataset: "proteins".into(),
            tool: "linkage".into(),
        };
        let path = logs.path_for("cutoff -0.5 x").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/logs/proteins_linkage_cutoff_0.5_x.log"));
        assert!(TrialLogs::default().path_for("x").is_none());
    }
}
