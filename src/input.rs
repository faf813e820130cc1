//! Tab-separated input readers.
//!
//! Blank lines and `#` comments are skipped. A first row whose first field
//! is `id` or `id_e` is a header.

use indexmap::IndexMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::dataset::{EntitySet, RawEntities};
use crate::errors::SplitError;
use crate::types::{EntityId, InteractionPair};

struct Row {
    line: usize,
    fields: Vec<String>,
}

fn read_rows(path: &Path) -> Result<Vec<Row>, SplitError> {
    if !path.exists() {
        return Err(SplitError::MissingInput(path.display().to_string()));
    }
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = trimmed.split('\t').map(|f| f.trim().to_string()).collect();
        if rows.is_empty() && matches!(fields[0].as_str(), "id" | "id_e") {
            continue;
        }
        rows.push(Row {
            line: idx + 1,
            fields,
        });
    }
    Ok(rows)
}

fn parse_weight(path: &Path, row: &Row, raw: &str) -> Result<f64, SplitError> {
    raw.parse::<f64>().map_err(|err| {
        SplitError::malformed(
            path.display().to_string(),
            format!("line {}: weight '{raw}' is not a number ({err})", row.line),
        )
    })
}

/// Dataset label derived from a file name (`proteins.tsv` → `proteins`).
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

/// Read `id[\tweight]` rows. Repeated ids aggregate their weights; rows
/// without a weight count `1.0`.
pub fn read_entities(path: &Path) -> Result<EntitySet, SplitError> {
    let mut raw = RawEntities::new(dataset_name(path));
    for row in read_rows(path)? {
        let weight = match row.fields.get(1) {
            Some(value) if !value.is_empty() => parse_weight(path, &row, value)?,
            _ => 1.0,
        };
        raw = raw.with_entity(row.fields[0].clone(), weight);
    }
    let rows = raw.len();
    let entities = raw.deduplicate()?;
    info!(
        "[splitsail:input] read {} entities ({} rows) from {}",
        entities.len(),
        rows,
        path.display()
    );
    Ok(entities)
}

/// Read `id\tweight` rows into an override map. Later rows win.
pub fn read_weights(path: &Path) -> Result<IndexMap<EntityId, f64>, SplitError> {
    let mut weights = IndexMap::new();
    for row in read_rows(path)? {
        let Some(raw) = row.fields.get(1) else {
            return Err(SplitError::malformed(
                path.display().to_string(),
                format!("line {} has no weight column", row.line),
            ));
        };
        let weight = parse_weight(path, &row, raw)?;
        weights.insert(row.fields[0].clone(), weight);
    }
    Ok(weights)
}

/// Read `id_e\tid_f` rows.
pub fn read_interactions(path: &Path) -> Result<Vec<InteractionPair>, SplitError> {
    let pairs = read_rows(path)?
        .into_iter()
        .map(|row| match row.fields.as_slice() {
            [left, right, ..] if !left.is_empty() && !right.is_empty() => {
                Ok((left.clone(), right.clone()))
            }
            _ => Err(SplitError::malformed(
                path.display().to_string(),
                format!("line {} needs two tab-separated ids", row.line),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        "[splitsail:input] read {} interactions from {}",
        pairs.len(),
        path.display()
    );
    Ok(pairs)
}
