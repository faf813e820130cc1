//! Entity-level relation matrices read from tab-separated files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::dataset::{EntitySet, Relation, SymMatrix};
use crate::errors::SplitError;
use crate::types::EntityId;

/// Which way a matrix should be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// High values mean related.
    Similarity,
    /// Low values mean related.
    Distance,
}

impl RelationKind {
    /// Wrap `matrix` as a relation of this kind.
    pub fn wrap(self, matrix: SymMatrix) -> Relation {
        match self {
            RelationKind::Similarity => Relation::Similarity(matrix),
            RelationKind::Distance => Relation::Distance(matrix),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Similarity => f.write_str("similarity"),
            RelationKind::Distance => f.write_str("distance"),
        }
    }
}

impl FromStr for RelationKind {
    type Err = SplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "similarity" | "sim" => Ok(RelationKind::Similarity),
            "distance" | "dist" => Ok(RelationKind::Distance),
            other => Err(SplitError::Configuration(format!(
                "unknown relation kind '{other}'"
            ))),
        }
    }
}

/// Relation over named entities, independent of any particular entity set.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityMatrix {
    index: IndexMap<EntityId, usize>,
    relation: Relation,
}

impl EntityMatrix {
    /// Pair entity names with a relation of the same dimension.
    pub fn new(names: Vec<EntityId>, relation: Relation) -> Result<Self, SplitError> {
        if names.len() != relation.dim() {
            return Err(SplitError::malformed(
                "relation matrix",
                format!(
                    "{} names for a {n}x{n} matrix",
                    names.len(),
                    n = relation.dim()
                ),
            ));
        }
        let mut index = IndexMap::with_capacity(names.len());
        for (idx, name) in names.into_iter().enumerate() {
            if let Some(previous) = index.insert(name.clone(), idx) {
                return Err(SplitError::malformed(
                    "relation matrix",
                    format!("entity '{name}' labels rows {previous} and {idx}"),
                ));
            }
        }
        Ok(Self { index, relation })
    }

    /// Whether this is a similarity matrix.
    pub fn is_similarity(&self) -> bool {
        self.relation.is_similarity()
    }

    /// Number of named entities.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the matrix names no entities.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Relation restricted to `entities`, in their order.
    ///
    /// An entity without a row is a failure of the tool that produced the
    /// matrix and is reported under `tool`.
    pub fn restrict(&self, entities: &EntitySet, tool: &str) -> Result<Relation, SplitError> {
        let indices = entities
            .ids()
            .map(|id| {
                self.index
                    .get(id)
                    .copied()
                    .ok_or_else(|| SplitError::ExternalTool {
                        tool: tool.to_string(),
                        details: format!("no relation row for entity '{id}'"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.relation.select(&indices))
    }
}

/// Read a relation matrix: one header line, then `name \t v1 \t v2 …` rows.
pub fn read_relation_matrix(path: &Path, kind: RelationKind) -> Result<EntityMatrix, SplitError> {
    if !path.exists() {
        return Err(SplitError::MissingInput(path.display().to_string()));
    }
    let origin = path.display().to_string();
    let text = fs::read_to_string(path)?;
    let mut names = Vec::new();
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate().skip(1) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split('\t');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(SplitError::malformed(
                &origin,
                format!("line {} has no entity name", line_no + 1),
            ));
        }
        let values = parts
            .map(|raw| {
                raw.trim().parse::<f64>().map_err(|err| {
                    SplitError::malformed(
                        &origin,
                        format!("line {}: '{raw}' is not a number ({err})", line_no + 1),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        names.push(name.to_string());
        rows.push(values);
    }
    let matrix = SymMatrix::from_rows(rows).map_err(|err| match err {
        SplitError::MalformedInput { details, .. } => SplitError::malformed(&origin, details),
        other => other,
    })?;
    info!(
        "[splitsail:source] read {} matrix over {} entities from {}",
        kind,
        names.len(),
        origin
    );
    EntityMatrix::new(names, kind.wrap(matrix))
}
