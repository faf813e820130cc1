//! Technique orchestration: group each side, optimize, decode and expand to
//! per-entity and per-interaction assignments.
//!
//! Every call builds its own program from immutable inputs, so independent
//! techniques can run concurrently over the same data.

use indexmap::IndexMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::calibrate::{TrialLogs, calibrate};
use crate::config::{Side, SplitRequest, Technique};
use crate::constants::output::LOG_EXTENSION;
use crate::dataset::{EntitySet, GroupedSet, InteractionSet, interaction_counts};
use crate::decode::{PairAssignment, expand_group_pairs, expand_groups, label_by_endpoint};
use crate::errors::SplitError;
use crate::optimize::{
    SplitProblem, random_split, solve_cluster_double, solve_cluster_single,
    solve_identity_double, solve_identity_single,
};
use crate::solver::SolveContext;
use crate::source::{
    ClusterTool, CutoffSearch, EntityMatrix, LinkageSource, PrecomputedSource, SimilaritySource,
};
use crate::splits::PairLabel;
use crate::types::{EntityId, SplitName};

/// One side's entities and, optionally, its entity-level relation matrix.
#[derive(Clone, Debug)]
pub struct SideData {
    /// Deduplicated, weighted entities.
    pub entities: EntitySet,
    /// Relation used by precomputed and linkage grouping.
    pub matrix: Option<EntityMatrix>,
}

impl SideData {
    /// Entities without a relation matrix.
    pub fn new(entities: EntitySet) -> Self {
        Self {
            entities,
            matrix: None,
        }
    }

    /// Attach a relation matrix.
    pub fn with_matrix(mut self, matrix: EntityMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }
}

/// Inputs of one run: up to two sides and their interactions.
#[derive(Clone, Debug, Default)]
pub struct SplitInputs {
    /// e-side data.
    pub e: Option<SideData>,
    /// f-side data.
    pub f: Option<SideData>,
    /// Interactions between e and f.
    pub interactions: Option<InteractionSet>,
}

impl SplitInputs {
    fn side(&self, side: Side) -> Result<&SideData, SplitError> {
        let data = match side {
            Side::E => self.e.as_ref(),
            Side::F => self.f.as_ref(),
        };
        data.ok_or_else(|| SplitError::MissingInput(format!("{side} dataset")))
    }

    fn interactions(&self) -> Result<&InteractionSet, SplitError> {
        self.interactions
            .as_ref()
            .ok_or_else(|| SplitError::MissingInput("interactions".to_string()))
    }
}

/// Final assignment of one technique. Empty maps mean no solution was found.
#[derive(Clone, Debug)]
pub struct TechniqueOutput {
    /// Technique that produced this output.
    pub technique: Technique,
    /// e-entity → split.
    pub e: IndexMap<EntityId, SplitName>,
    /// f-entity → split.
    pub f: IndexMap<EntityId, SplitName>,
    /// Interaction → split or not selected.
    pub pairs: PairAssignment,
    /// Group count per grouped side.
    pub group_counts: IndexMap<Side, usize>,
    /// Whether the optimizer returned a solution.
    pub solved: bool,
}

impl TechniqueOutput {
    fn empty(technique: Technique) -> Self {
        Self {
            technique,
            e: IndexMap::new(),
            f: IndexMap::new(),
            pairs: PairAssignment::new(),
            group_counts: IndexMap::new(),
            solved: false,
        }
    }
}

/// Choose entity weights: explicit overrides, else interaction counts, else
/// the weights already on `entities`.
pub fn resolve_weights(
    entities: EntitySet,
    explicit: Option<&IndexMap<EntityId, f64>>,
    interactions: Option<&InteractionSet>,
    side: Side,
) -> Result<EntitySet, SplitError> {
    if let Some(weights) = explicit {
        return entities.reweighted(weights);
    }
    match interactions {
        Some(interactions) if !interactions.is_empty() => {
            let counts = interaction_counts(interactions.pairs(), side == Side::E);
            let mut weights: IndexMap<EntityId, f64> =
                entities.ids().map(|id| (id.clone(), 0.0)).collect();
            for (id, count) in counts {
                if let Some(slot) = weights.get_mut(&id) {
                    *slot = count;
                }
            }
            entities.reweighted(&weights)
        }
        _ => Ok(entities),
    }
}

/// Group one side according to its configured tool.
pub fn group_side(
    side: Side,
    data: &SideData,
    request: &SplitRequest,
) -> Result<GroupedSet, SplitError> {
    let entities = &data.entities;
    let tool = request.side(side).cluster;
    let matrix = || {
        data.matrix
            .clone()
            .ok_or_else(|| SplitError::MissingInput(format!("{side}-side relation matrix")))
    };
    let grouped = match tool {
        ClusterTool::Identity => GroupedSet::identity(entities.clone()),
        ClusterTool::Precomputed => {
            let grouping = PrecomputedSource::new(matrix()?).trial(entities, (), None)?;
            GroupedSet::new(entities.clone(), grouping)?
        }
        ClusterTool::Linkage => {
            let source = LinkageSource::new(matrix()?);
            let logs = TrialLogs {
                dir: request.log_dir.clone(),
                dataset: entities.name().to_string(),
                tool: tool.to_string(),
            };
            let calibrated = calibrate(&CutoffSearch, &logs, |cutoff, log_file| {
                source.trial(entities, cutoff, log_file)
            })?;
            info!(
                "[splitsail:pipeline] {side}-side linkage settled on {} ({} groups after {} trials)",
                calibrated.param_label,
                calibrated.grouping.len(),
                calibrated.trials
            );
            GroupedSet::new(entities.clone(), calibrated.grouping)?
        }
    };
    Ok(grouped)
}

fn solver_log(request: &SplitRequest, technique: Technique, dataset: &str) -> Option<PathBuf> {
    request.log_dir.as_ref().map(|dir| {
        dir.join(format!(
            "{dataset}_{}_{}.{LOG_EXTENSION}",
            technique.code(),
            request.solver.kind
        ))
    })
}

/// Run one technique end to end.
///
/// Configuration and input problems fail fast; an unsolvable program yields
/// an output with `solved == false` and empty assignments.
pub fn run_technique(
    technique: Technique,
    request: &SplitRequest,
    inputs: &SplitInputs,
) -> Result<TechniqueOutput, SplitError> {
    request.validate()?;
    info!("[splitsail:pipeline] running technique {technique}");

    if technique == Technique::Random {
        return Ok(run_random(request, inputs));
    }

    let backend = request.solver.kind.backend();
    let dataset = match technique.side() {
        Some(side) => inputs.side(side)?.entities.name().to_string(),
        None => inputs.side(Side::E)?.entities.name().to_string(),
    };
    let problem = SplitProblem {
        splits: &request.splits,
        epsilon: request.epsilon,
        solver: SolveContext {
            solver: backend.as_ref(),
            budget: request.solver.budget(),
            threads: request.solver.resolved_threads(),
            log_file: solver_log(request, technique, &dataset),
        },
    };
    let mut output = TechniqueOutput::empty(technique);

    match technique {
        Technique::Random => {}
        Technique::IdentitySingle(side) | Technique::ClusterSingle(side) => {
            let data = inputs.side(side)?;
            let assignment = if technique.is_cluster() {
                let grouped = group_side(side, data, request)?;
                output.group_counts.insert(side, grouped.group_count());
                let threshold = request.side(side).threshold;
                solve_cluster_single(&problem, &grouped, threshold)
                    .map(|groups| expand_groups(&grouped, &groups))
            } else {
                solve_identity_single(&problem, &data.entities)
            };
            if let Some(assignment) = assignment {
                if let Some(interactions) = &inputs.interactions {
                    output.pairs = label_by_endpoint(interactions, &assignment, side == Side::E);
                }
                match side {
                    Side::E => output.e = assignment,
                    Side::F => output.f = assignment,
                }
                output.solved = true;
            }
        }
        Technique::IdentityDouble => {
            let (e, f) = (inputs.side(Side::E)?, inputs.side(Side::F)?);
            let interactions = inputs.interactions()?;
            if let Some(result) =
                solve_identity_double(&problem, &e.entities, &f.entities, interactions)
            {
                output.e = result.e;
                output.f = result.f;
                output.pairs = result.pairs;
                output.solved = true;
            }
        }
        Technique::ClusterDouble => {
            let (e, f) = (inputs.side(Side::E)?, inputs.side(Side::F)?);
            let interactions = inputs.interactions()?;
            let e_grouped = group_side(Side::E, e, request)?;
            let f_grouped = group_side(Side::F, f, request)?;
            output.group_counts.insert(Side::E, e_grouped.group_count());
            output.group_counts.insert(Side::F, f_grouped.group_count());
            if let Some(result) = solve_cluster_double(
                &problem,
                &e_grouped,
                &f_grouped,
                interactions,
                request.e.threshold,
                request.f.threshold,
            ) {
                output.e = expand_groups(&e_grouped, &result.e);
                output.f = expand_groups(&f_grouped, &result.f);
                output.pairs = expand_group_pairs(interactions, &e_grouped, &f_grouped, &result.pairs);
                output.solved = true;
            }
        }
    }
    if !output.solved {
        warn!("[splitsail:pipeline] technique {technique} produced no split");
    }
    Ok(output)
}

fn run_random(request: &SplitRequest, inputs: &SplitInputs) -> TechniqueOutput {
    let mut output = TechniqueOutput::empty(Technique::Random);
    match &inputs.interactions {
        Some(interactions) if !interactions.is_empty() => {
            let pairs: Vec<_> = interactions.pairs().cloned().collect();
            output.pairs = random_split(&pairs, &request.splits, request.seed)
                .into_iter()
                .map(|(pair, split)| (pair, PairLabel::Split(split)))
                .collect();
        }
        _ => {
            for (side, data) in [(Side::E, &inputs.e), (Side::F, &inputs.f)] {
                let Some(data) = data else { continue };
                let ids: Vec<EntityId> = data.entities.ids().cloned().collect();
                let assignment = random_split(&ids, &request.splits, request.seed);
                match side {
                    Side::E => output.e = assignment,
                    Side::F => output.f = assignment,
                }
            }
        }
    }
    output.solved = true;
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splits::SplitSpec;

    fn interactions(e: &EntitySet, f: &EntitySet) -> InteractionSet {
        let pairs = [("e1", "f1"), ("e1", "f2"), ("e2", "f2")]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()));
        InteractionSet::new(pairs, e, f).unwrap()
    }

    #[test]
    fn weights_prefer_explicit_then_interaction_counts() {
        let e = EntitySet::uniform("e", ["e1", "e2", "e3"]).unwrap();
        let f = EntitySet::uniform("f", ["f1", "f2"]).unwrap();
        let inter = interactions(&e, &f);

        let counted = resolve_weights(e.clone(), None, Some(&inter), Side::E).unwrap();
        assert_eq!(counted.weight("e1"), Some(2.0));
        assert_eq!(counted.weight("e3"), Some(0.0));

        let mut explicit = IndexMap::new();
        explicit.insert("e3".to_string(), 5.0);
        let weighted = resolve_weights(e.clone(), Some(&explicit), Some(&inter), Side::E).unwrap();
        assert_eq!(weighted.weight("e3"), Some(5.0));
        assert_eq!(weighted.weight("e1"), Some(1.0));

        let untouched = resolve_weights(e, None, None, Side::E).unwrap();
        assert_eq!(untouched.weight("e2"), Some(1.0));
    }

    #[test]
    fn double_techniques_require_both_sides_and_interactions() {
        let request = SplitRequest::default();
        let inputs = SplitInputs {
            e: Some(SideData::new(EntitySet::uniform("e", ["e1"]).unwrap())),
            ..SplitInputs::default()
        };
        let err = run_technique(Technique::IdentityDouble, &request, &inputs).unwrap_err();
        assert!(matches!(err, SplitError::MissingInput(ref what) if what == "f dataset"));
    }

    #[test]
    fn linkage_without_matrix_is_missing_input() {
        let mut request = SplitRequest::default();
        request.e.cluster = ClusterTool::Linkage;
        let inputs = SplitInputs {
            e: Some(SideData::new(EntitySet::uniform("e", ["e1", "e2"]).unwrap())),
            ..SplitInputs::default()
        };
        let err = run_technique(Technique::ClusterSingle(Side::E), &request, &inputs).unwrap_err();
        assert!(matches!(err, SplitError::MissingInput(ref what) if what.contains("relation matrix")));
    }

    #[test]
    fn random_technique_labels_every_interaction() {
        let e = EntitySet::uniform("e", ["e1", "e2"]).unwrap();
        let f = EntitySet::uniform("f", ["f1", "f2"]).unwrap();
        let inter = interactions(&e, &f);
        let request = SplitRequest {
            splits: SplitSpec::new(vec!["a".into(), "b".into()], vec![0.5, 0.5]).unwrap(),
            ..SplitRequest::default()
        };
        let inputs = SplitInputs {
            e: Some(SideData::new(e)),
            f: Some(SideData::new(f)),
            interactions: Some(inter),
        };
        let output = run_technique(Technique::Random, &request, &inputs).unwrap();
        assert!(output.solved);
        assert_eq!(output.pairs.len(), 3);
        assert!(output.pairs.values().all(|label| label.split().is_some()));
    }

    #[test]
    fn invalid_request_fails_before_solving() {
        let request = SplitRequest {
            epsilon: -0.1,
            ..SplitRequest::default()
        };
        let err = run_technique(Technique::Random, &request, &SplitInputs::default()).unwrap_err();
        assert!(matches!(err, SplitError::Configuration(_)));
    }
}
