//! Assignment artifacts: one directory per technique holding
//! `e_splits.tsv`, `f_splits.tsv`, `inter.tsv` and `report.json`.

use indexmap::IndexMap;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::SplitRequest;
use crate::constants::output::{
    E_SPLITS_FILENAME, ENTITY_HEADER, F_SPLITS_FILENAME, INTER_HEADER, INTER_SPLITS_FILENAME,
    REPORT_FILENAME,
};
use crate::decode::PairAssignment;
use crate::errors::SplitError;
use crate::metrics::{SplitBalance, leakage, pair_balance, split_balance};
use crate::pipeline::{SideData, SplitInputs, TechniqueOutput};
use crate::types::{EntityId, SplitName};

/// Balance and leakage of one side's assignment.
#[derive(Clone, Debug, Serialize)]
pub struct SideReport {
    pub dataset: String,
    pub groups: Option<usize>,
    pub balance: SplitBalance,
    pub leakage: Option<f64>,
}

/// Summary written next to the assignment files.
#[derive(Clone, Debug, Serialize)]
pub struct TechniqueReport {
    pub technique: String,
    pub solved: bool,
    pub e: Option<SideReport>,
    pub f: Option<SideReport>,
    pub interactions: Option<SplitBalance>,
    pub request: SplitRequest,
}

fn side_report(
    data: &SideData,
    assignment: &IndexMap<EntityId, SplitName>,
    groups: Option<usize>,
    request: &SplitRequest,
) -> Option<SideReport> {
    if assignment.is_empty() {
        return None;
    }
    let relation = data
        .matrix
        .as_ref()
        .and_then(|matrix| matrix.restrict(&data.entities, "report").ok());
    Some(SideReport {
        dataset: data.entities.name().to_string(),
        groups,
        balance: split_balance(assignment, &data.entities, &request.splits),
        leakage: relation.and_then(|r| leakage(assignment, &data.entities, &r)),
    })
}

/// Summarize `output` against its inputs.
pub fn build_report(
    output: &TechniqueOutput,
    request: &SplitRequest,
    inputs: &SplitInputs,
) -> TechniqueReport {
    use crate::config::Side;
    TechniqueReport {
        technique: output.technique.code().to_string(),
        solved: output.solved,
        e: inputs.e.as_ref().and_then(|data| {
            side_report(data, &output.e, output.group_counts.get(&Side::E).copied(), request)
        }),
        f: inputs.f.as_ref().and_then(|data| {
            side_report(data, &output.f, output.group_counts.get(&Side::F).copied(), request)
        }),
        interactions: (!output.pairs.is_empty())
            .then(|| pair_balance(&output.pairs, &request.splits)),
        request: request.clone(),
    }
}

fn write_entities(path: &Path, assignment: &IndexMap<EntityId, SplitName>) -> Result<(), SplitError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{ENTITY_HEADER}")?;
    for (id, split) in assignment {
        writeln!(writer, "{id}\t{split}")?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pairs(path: &Path, pairs: &PairAssignment) -> Result<(), SplitError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{INTER_HEADER}")?;
    for ((left, right), label) in pairs {
        writeln!(writer, "{left}\t{right}\t{label}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `<out_dir>/<technique>/…` and return that directory.
///
/// Assignment files are written only for non-empty assignments; the report
/// is always written.
pub fn write_outputs(
    out_dir: &Path,
    output: &TechniqueOutput,
    report: &TechniqueReport,
) -> Result<PathBuf, SplitError> {
    let dir = out_dir.join(output.technique.code());
    fs::create_dir_all(&dir)?;
    if !output.e.is_empty() {
        write_entities(&dir.join(E_SPLITS_FILENAME), &output.e)?;
    }
    if !output.f.is_empty() {
        write_entities(&dir.join(F_SPLITS_FILENAME), &output.f)?;
    }
    if !output.pairs.is_empty() {
        write_pairs(&dir.join(INTER_SPLITS_FILENAME), &output.pairs)?;
    }
    let report_file = File::create(dir.join(REPORT_FILENAME))?;
    serde_json::to_writer_pretty(BufWriter::new(report_file), report)?;
    info!(
        "[splitsail:output] wrote {} results to {}",
        output.technique,
        dir.display()
    );
    Ok(dir)
}
