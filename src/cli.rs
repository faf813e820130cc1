//! Command line front end: flags, input loading and concurrent technique runs.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, error::ErrorKind as ClapErrorKind};
use rayon::prelude::*;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use crate::config::{Side, SideRequest, SolverSettings, SplitRequest, Technique};
use crate::constants::random::DEFAULT_SEED;
use crate::constants::solver::DEFAULT_MAX_SEC;
use crate::constants::splits::DEFAULT_EPSILON;
use crate::dataset::InteractionSet;
use crate::errors::{ErrorKind, SplitError};
use crate::input::{read_entities, read_interactions, read_weights};
use crate::output::{build_report, write_outputs};
use crate::pipeline::{SideData, SplitInputs, resolve_weights, run_technique};
use crate::solver::SolverKind;
use crate::source::{ClusterTool, RelationKind, read_relation_matrix};
use crate::splits::SplitSpec;

#[derive(Debug, Parser)]
#[command(
    name = "splitsail",
    disable_help_subcommand = true,
    about = "Leakage-aware data splitting",
    long_about = "Split one or two entity collections (and their interactions) into named splits while keeping similar entities together.",
    after_help = "Each technique writes its assignments to <OUTPUT>/<TECHNIQUE>/. Techniques run concurrently; one failing technique does not stop the others."
)]
/// Command line of the `splitsail` binary.
pub struct SplitCli {
    #[arg(long, short = 'o', value_name = "DIR", help = "Output directory")]
    output: PathBuf,
    #[arg(
        long = "techniques",
        short = 't',
        num_args = 1..,
        required = true,
        value_name = "CODE",
        help = "Techniques to run: R, I1e, I1f, C1e, C1f, I2, C2"
    )]
    techniques: Vec<Technique>,
    #[arg(
        long,
        num_args = 1..,
        value_name = "FRACTION",
        help = "Split fractions, summing to 1 (default 0.7 0.2 0.1)"
    )]
    splits: Vec<f64>,
    #[arg(long, num_args = 1.., value_name = "NAME", help = "Split names")]
    names: Vec<String>,
    #[arg(
        long,
        default_value_t = DEFAULT_EPSILON,
        help = "Allowed deviation from each split fraction"
    )]
    epsilon: f64,

    #[arg(long = "e-data", value_name = "FILE", help = "e-side entities (id[\\tweight])")]
    e_data: Option<PathBuf>,
    #[arg(long = "e-weights", value_name = "FILE", help = "e-side weight overrides")]
    e_weights: Option<PathBuf>,
    #[arg(long = "e-sim", value_name = "FILE", conflicts_with = "e_dist", help = "e-side similarity matrix")]
    e_sim: Option<PathBuf>,
    #[arg(long = "e-dist", value_name = "FILE", help = "e-side distance matrix")]
    e_dist: Option<PathBuf>,
    #[arg(long = "e-cluster", default_value = "identity", help = "e-side grouping: identity, matrix or linkage")]
    e_cluster: ClusterTool,
    #[arg(long = "e-max-sim", conflicts_with = "e_max_dist", help = "Similarity cap between e entities in different splits")]
    e_max_sim: Option<f64>,
    #[arg(long = "e-max-dist", help = "Distance cap between e entities in the same split")]
    e_max_dist: Option<f64>,

    #[arg(long = "f-data", value_name = "FILE", help = "f-side entities (id[\\tweight])")]
    f_data: Option<PathBuf>,
    #[arg(long = "f-weights", value_name = "FILE", help = "f-side weight overrides")]
    f_weights: Option<PathBuf>,
    #[arg(long = "f-sim", value_name = "FILE", conflicts_with = "f_dist", help = "f-side similarity matrix")]
    f_sim: Option<PathBuf>,
    #[arg(long = "f-dist", value_name = "FILE", help = "f-side distance matrix")]
    f_dist: Option<PathBuf>,
    #[arg(long = "f-cluster", default_value = "identity", help = "f-side grouping: identity, matrix or linkage")]
    f_cluster: ClusterTool,
    #[arg(long = "f-max-sim", conflicts_with = "f_max_dist", help = "Similarity cap between f entities in different splits")]
    f_max_sim: Option<f64>,
    #[arg(long = "f-max-dist", help = "Distance cap between f entities in the same split")]
    f_max_dist: Option<f64>,

    #[arg(long = "inter", value_name = "FILE", help = "Interactions (id_e\\tid_f)")]
    inter: Option<PathBuf>,
    #[arg(long, default_value = "bnb", help = "Solver backend")]
    solver: SolverKind,
    #[arg(long = "max-sec", default_value_t = DEFAULT_MAX_SEC, help = "Solver time budget per technique")]
    max_sec: u64,
    #[arg(long, default_value_t = 0, help = "Solver threads (0 = all cores)")]
    threads: usize,
    #[arg(long = "logdir", value_name = "DIR", help = "Directory for solver and clustering logs")]
    log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Seed for the random technique")]
    seed: u64,
    #[arg(
        long = "verbosity",
        short = 'v',
        default_value = "W",
        value_parser = parse_verbosity,
        help = "Log level: C, F, E, W, I or D"
    )]
    verbosity: LevelFilter,
}

fn parse_verbosity(raw: &str) -> Result<LevelFilter, String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "C" | "F" | "E" => Ok(LevelFilter::ERROR),
        "W" => Ok(LevelFilter::WARN),
        "I" => Ok(LevelFilter::INFO),
        "D" => Ok(LevelFilter::DEBUG),
        other => Err(format!(
            "unknown verbosity '{other}', expected one of C, F, E, W, I, D"
        )),
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

impl SplitCli {
    /// Translate flags into a validated [`SplitRequest`].
    pub fn request(&self) -> Result<SplitRequest, SplitError> {
        let splits = match (self.splits.is_empty(), self.names.is_empty()) {
            (true, true) => SplitSpec::default(),
            (true, false) => {
                return Err(SplitError::Configuration(
                    "--names requires --splits".to_string(),
                ));
            }
            (false, true) => SplitSpec::unnamed(self.splits.clone())?,
            (false, false) => SplitSpec::new(self.names.clone(), self.splits.clone())?,
        };
        let request = SplitRequest {
            splits,
            epsilon: self.epsilon,
            e: SideRequest {
                cluster: self.e_cluster,
                threshold: self.e_max_sim.or(self.e_max_dist),
            },
            f: SideRequest {
                cluster: self.f_cluster,
                threshold: self.f_max_sim.or(self.f_max_dist),
            },
            solver: SolverSettings {
                kind: self.solver,
                max_sec: self.max_sec,
                threads: self.threads,
            },
            log_dir: self.log_dir.clone(),
            seed: self.seed,
        };
        request.validate()?;
        Ok(request)
    }

    fn matrix_path(&self, side: Side) -> Option<(&Path, RelationKind)> {
        let (sim, dist) = match side {
            Side::E => (&self.e_sim, &self.e_dist),
            Side::F => (&self.f_sim, &self.f_dist),
        };
        sim.as_deref()
            .map(|path| (path, RelationKind::Similarity))
            .or_else(|| dist.as_deref().map(|path| (path, RelationKind::Distance)))
    }

    /// Reject a cap whose kind disagrees with the side's matrix.
    fn check_cap_kind(&self, side: Side) -> Result<(), SplitError> {
        let (max_sim, max_dist) = match side {
            Side::E => (self.e_max_sim, self.e_max_dist),
            Side::F => (self.f_max_sim, self.f_max_dist),
        };
        let mismatch = match self.matrix_path(side).map(|(_, kind)| kind) {
            Some(RelationKind::Similarity) if max_dist.is_some() => Some(("dist", "sim")),
            Some(RelationKind::Distance) if max_sim.is_some() => Some(("sim", "dist")),
            _ => None,
        };
        match mismatch {
            Some((cap, matrix)) => Err(SplitError::Configuration(format!(
                "--{side}-max-{cap} cannot cap a --{side}-{matrix} matrix"
            ))),
            None => Ok(()),
        }
    }

    /// Read every input file named on the command line.
    pub fn inputs(&self) -> Result<SplitInputs, SplitError> {
        let e = self.e_data.as_deref().map(read_entities).transpose()?;
        let f = self.f_data.as_deref().map(read_entities).transpose()?;
        let interactions = match &self.inter {
            Some(path) => {
                let pairs = read_interactions(path)?;
                let (Some(e), Some(f)) = (&e, &f) else {
                    return Err(SplitError::MissingInput(
                        "--e-data and --f-data are required with --inter".to_string(),
                    ));
                };
                Some(InteractionSet::new(pairs, e, f)?)
            }
            None => None,
        };

        let mut inputs = SplitInputs {
            interactions,
            ..SplitInputs::default()
        };
        for (side, entities, weights) in [
            (Side::E, e, self.e_weights.as_deref()),
            (Side::F, f, self.f_weights.as_deref()),
        ] {
            self.check_cap_kind(side)?;
            let Some(entities) = entities else { continue };
            let explicit = weights.map(read_weights).transpose()?;
            let entities = resolve_weights(
                entities,
                explicit.as_ref(),
                inputs.interactions.as_ref(),
                side,
            )?;
            let mut data = SideData::new(entities);
            if let Some((path, kind)) = self.matrix_path(side) {
                data = data.with_matrix(read_relation_matrix(path, kind)?);
            }
            match side {
                Side::E => inputs.e = Some(data),
                Side::F => inputs.f = Some(data),
            }
        }
        Ok(inputs)
    }
}

/// Run every technique concurrently and write its artifacts.
///
/// Results keep the order of `techniques`; a failing technique leaves the
/// others untouched.
pub fn execute(
    out_dir: &Path,
    techniques: &[Technique],
    request: &SplitRequest,
    inputs: &SplitInputs,
) -> Vec<(Technique, Result<PathBuf, SplitError>)> {
    techniques
        .par_iter()
        .map(|&technique| {
            let written = run_technique(technique, request, inputs).and_then(|output| {
                let report = build_report(&output, request, inputs);
                write_outputs(out_dir, &output, &report)
            });
            (technique, written)
        })
        .collect()
}

fn init_tracing(level: LevelFilter) {
    // A global subscriber may already exist when embedded in another binary.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn exit_code(kind: ErrorKind) -> ExitCode {
    ExitCode::from(kind.code())
}

/// Entry point shared by the binary and tests.
pub fn run<I>(args: I) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    let cli = match parse_cli::<SplitCli, _>(args) {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            return exit_code(ErrorKind::Configuration);
        }
    };
    init_tracing(cli.verbosity);

    let prepared = cli.request().and_then(|request| Ok((request, cli.inputs()?)));
    let (request, inputs) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            error!("[splitsail:cli] {err}");
            return exit_code(err.kind());
        }
    };

    let mut failure = None;
    for (technique, result) in execute(&cli.output, &cli.techniques, &request, &inputs) {
        match result {
            Ok(dir) => info!("[splitsail:cli] {technique} done: {}", dir.display()),
            Err(err) => {
                error!("[splitsail:cli] {technique} failed: {err}");
                failure.get_or_insert(err.kind());
            }
        }
    }
    match failure {
        Some(kind) => exit_code(kind),
        None => ExitCode::SUCCESS,
    }
}
