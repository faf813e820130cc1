//! Threshold single-linkage clustering over an entity relation matrix.
//!
//! Entities whose similarity reaches the cut-off are joined, and groups are
//! the connected components of that graph. Raising the cut-off can only
//! split components, so the group count is monotone in the parameter.

use std::path::Path;

use tracing::{debug, info};

use super::matrix::EntityMatrix;
use super::{ClusterTool, SimilaritySource};
use crate::calibrate::ParamSearch;
use crate::constants::calibration::{
    LINKAGE_FEWEST_GROUPS_CUTOFF, LINKAGE_INITIAL_CUTOFF, LINKAGE_MOST_GROUPS_CUTOFF,
};
use crate::dataset::{EntitySet, Grouping, Relation, SymMatrix};
use crate::errors::SplitError;
use crate::solver::with_log_sink;
use crate::types::GroupId;

/// Clusters entities by joining every pair whose similarity is at least the
/// cut-off. Distances are compared as `1 - d`.
#[derive(Clone, Debug)]
pub struct LinkageSource {
    matrix: EntityMatrix,
}

impl LinkageSource {
    /// Cluster over `matrix`.
    pub fn new(matrix: EntityMatrix) -> Self {
        Self { matrix }
    }
}

impl SimilaritySource for LinkageSource {
    type Param = f64;

    fn tool(&self) -> ClusterTool {
        ClusterTool::Linkage
    }

    fn trial(
        &self,
        entities: &EntitySet,
        cutoff: f64,
        log_file: Option<&Path>,
    ) -> Result<Grouping, SplitError> {
        let relation = self.matrix.restrict(entities, &self.tool().to_string())?;
        Ok(with_log_sink(log_file, || {
            let grouping = link(entities, &relation, cutoff);
            info!(
                "[splitsail:linkage] cut-off {cutoff} grouped {} entities into {} groups",
                entities.len(),
                grouping.len()
            );
            grouping
        }))
    }
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

fn link(entities: &EntitySet, relation: &Relation, cutoff: f64) -> Grouping {
    let n = relation.dim();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if relation.similarity(i, j) >= cutoff {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    // Keep the earliest entity as root so it names the group.
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let ids: Vec<&String> = entities.ids().collect();
    let mut roots: Vec<usize> = Vec::new();
    let mut member_group = vec![0usize; n];
    for (idx, slot) in member_group.iter_mut().enumerate() {
        let root = find(&mut parent, idx);
        *slot = match roots.iter().position(|r| *r == root) {
            Some(group) => group,
            None => {
                roots.push(root);
                roots.len() - 1
            }
        };
    }
    let names: Vec<GroupId> = roots.iter().map(|r| ids[*r].clone()).collect();
    let group_of = ids
        .iter()
        .zip(&member_group)
        .map(|(id, group)| ((*id).clone(), names[*group].clone()))
        .collect();

    let k = names.len();
    let (fill, diagonal) = if relation.is_similarity() {
        (f64::NEG_INFINITY, 1.0)
    } else {
        (f64::INFINITY, 0.0)
    };
    let mut grouped = SymMatrix::filled(k, fill);
    for i in 0..n {
        for j in (i + 1)..n {
            let (gi, gj) = (member_group[i], member_group[j]);
            if gi == gj {
                continue;
            }
            let value = relation.matrix().get(i, j);
            let current = grouped.get(gi, gj);
            let merged = if relation.is_similarity() {
                current.max(value)
            } else {
                current.min(value)
            };
            grouped.set(gi, gj, merged);
        }
    }
    for g in 0..k {
        grouped.set(g, g, diagonal);
    }
    debug!("[splitsail:linkage] {k} groups at cut-off {cutoff}");
    let relation = match relation {
        Relation::Similarity(_) => Relation::Similarity(grouped),
        Relation::Distance(_) => Relation::Distance(grouped),
    };
    Grouping {
        names,
        group_of,
        relation: Some(relation),
    }
}

/// Bisection over the similarity cut-off.
#[derive(Clone, Copy, Debug, Default)]
pub struct CutoffSearch;

impl ParamSearch for CutoffSearch {
    type Param = f64;

    fn initial(&self) -> f64 {
        LINKAGE_INITIAL_CUTOFF
    }

    fn fewest_groups(&self) -> f64 {
        LINKAGE_FEWEST_GROUPS_CUTOFF
    }

    fn most_groups(&self) -> f64 {
        LINKAGE_MOST_GROUPS_CUTOFF
    }

    fn midpoint(&self, fewer: f64, more: f64) -> f64 {
        (fewer + more) / 2.0
    }

    fn label(&self, param: f64) -> String {
        format!("cutoff {param:.6}")
    }
}
