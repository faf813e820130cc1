//! Immutable entity-collection stages.
//!
//! A collection moves forward through `RawEntities` (as read, possibly with
//! repeated ids) → `EntitySet` (deduplicated, weighted) → `GroupedSet`
//! (grouped, with a relation matrix over groups). Each stage is built from the
//! previous one and never mutated afterwards.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::errors::SplitError;
use crate::types::{DatasetName, EntityId, GroupId, InteractionPair};

/// Entities as read from input, possibly repeating ids.
#[derive(Clone, Debug, Default)]
pub struct RawEntities {
    name: DatasetName,
    rows: Vec<(EntityId, f64)>,
}

impl RawEntities {
    /// Start an empty collection labelled `name`.
    pub fn new(name: impl Into<DatasetName>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Append one entity occurrence with `weight`.
    pub fn with_entity(mut self, id: impl Into<EntityId>, weight: f64) -> Self {
        self.rows.push((id.into(), weight));
        self
    }

    /// Append one entity occurrence with weight `1.0`.
    pub fn with_id(self, id: impl Into<EntityId>) -> Self {
        self.with_entity(id, 1.0)
    }

    /// Number of rows read (duplicates included).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were read.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collapse repeated ids into one entity whose weight is the sum of its rows.
    pub fn deduplicate(self) -> Result<EntitySet, SplitError> {
        let mut weights: IndexMap<EntityId, f64> = IndexMap::with_capacity(self.rows.len());
        for (id, weight) in self.rows {
            if id.is_empty() {
                return Err(SplitError::malformed(&self.name, "empty entity id"));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(SplitError::malformed(
                    &self.name,
                    format!("entity '{id}' has invalid weight {weight}"),
                ));
            }
            *weights.entry(id).or_insert(0.0) += weight;
        }
        EntitySet::new(self.name, weights)
    }
}

/// Deduplicated entity collection with non-negative weights.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySet {
    name: DatasetName,
    weights: IndexMap<EntityId, f64>,
}

impl EntitySet {
    /// Build a collection from unique ids and their weights.
    pub fn new(
        name: impl Into<DatasetName>,
        weights: IndexMap<EntityId, f64>,
    ) -> Result<Self, SplitError> {
        let name = name.into();
        if weights.is_empty() {
            return Err(SplitError::malformed(&name, "entity collection is empty"));
        }
        if let Some((id, weight)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(SplitError::malformed(
                &name,
                format!("entity '{id}' has invalid weight {weight}"),
            ));
        }
        Ok(Self { name, weights })
    }

    /// Build a collection of unit-weight entities.
    pub fn uniform<I, S>(name: impl Into<DatasetName>, ids: I) -> Result<Self, SplitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        let mut raw = RawEntities::new(name);
        for id in ids {
            raw = raw.with_id(id);
        }
        raw.deduplicate()
    }

    /// Dataset label used in logs and file names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity ids in input order.
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.weights.keys()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the collection holds no entities.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &str) -> bool {
        self.weights.contains_key(id)
    }

    /// Weight of `id`, if present.
    pub fn weight(&self, id: &str) -> Option<f64> {
        self.weights.get(id).copied()
    }

    /// Entity → weight map in input order.
    pub fn weights(&self) -> &IndexMap<EntityId, f64> {
        &self.weights
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Replace weights for the listed entities, keeping the rest.
    ///
    /// Unknown ids are rejected.
    pub fn reweighted(&self, overrides: &IndexMap<EntityId, f64>) -> Result<Self, SplitError> {
        let mut weights = self.weights.clone();
        for (id, weight) in overrides {
            match weights.get_mut(id) {
                Some(slot) => *slot = *weight,
                None => {
                    return Err(SplitError::UnknownEntity {
                        entity: id.clone(),
                        context: format!("weights of '{}'", self.name),
                    });
                }
            }
        }
        Self::new(self.name.clone(), weights)
    }

    /// Treat every entity as its own group.
    pub fn identity_grouping(&self) -> Grouping {
        Grouping {
            names: self.weights.keys().cloned().collect(),
            group_of: self
                .weights
                .keys()
                .map(|id| (id.clone(), id.clone()))
                .collect(),
            relation: None,
        }
    }
}

/// Dense symmetric matrix stored row-major. Serialized as a list of rows and
/// validated like [`SymMatrix::from_rows`] when deserialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct SymMatrix {
    dim: usize,
    values: Vec<f64>,
}

impl SymMatrix {
    /// Matrix of size `dim × dim` filled with `fill`.
    pub fn filled(dim: usize, fill: f64) -> Self {
        Self {
            dim,
            values: vec![fill; dim * dim],
        }
    }

    /// Build from rows; rows must be square and symmetric within `1e-9`.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SplitError> {
        let dim = rows.len();
        let mut values = Vec::with_capacity(dim * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(SplitError::malformed(
                    "relation matrix",
                    format!("row {i} has {} values, expected {dim}", row.len()),
                ));
            }
            values.extend(row);
        }
        let matrix = Self { dim, values };
        matrix.check_symmetric()?;
        Ok(matrix)
    }

    fn check_symmetric(&self) -> Result<(), SplitError> {
        for i in 0..self.dim {
            for j in (i + 1)..self.dim {
                let (a, b) = (self.get(i, j), self.get(j, i));
                if !a.is_finite() || (a - b).abs() > 1e-9 {
                    return Err(SplitError::malformed(
                        "relation matrix",
                        format!("entries ({i},{j})={a} and ({j},{i})={b} are not symmetric"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Dimension `N` of the `N × N` matrix.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim + j]
    }

    /// Set `(i, j)` and `(j, i)`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.dim + j] = value;
        self.values[j * self.dim + i] = value;
    }
}

impl TryFrom<Vec<Vec<f64>>> for SymMatrix {
    type Error = SplitError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<SymMatrix> for Vec<Vec<f64>> {
    fn from(matrix: SymMatrix) -> Self {
        if matrix.dim == 0 {
            return Vec::new();
        }
        matrix
            .values
            .chunks(matrix.dim)
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Pairwise relation over groups; exactly one of similarity or distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    /// High values mean related; diagonal is `1`.
    Similarity(SymMatrix),
    /// Low values mean related; diagonal is `0`.
    Distance(SymMatrix),
}

impl Relation {
    /// Underlying matrix.
    pub fn matrix(&self) -> &SymMatrix {
        match self {
            Relation::Similarity(m) | Relation::Distance(m) => m,
        }
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.matrix().dim()
    }

    /// Whether this is a similarity relation.
    pub fn is_similarity(&self) -> bool {
        matches!(self, Relation::Similarity(_))
    }

    /// Entry rescaled to similarity space (`1 - d` for distances).
    pub fn similarity(&self, i: usize, j: usize) -> f64 {
        match self {
            Relation::Similarity(m) => m.get(i, j),
            Relation::Distance(m) => 1.0 - m.get(i, j),
        }
    }

    /// Restrict/reorder the relation to `indices`.
    pub fn select(&self, indices: &[usize]) -> Relation {
        let source = self.matrix();
        let mut picked = SymMatrix::filled(indices.len(), 0.0);
        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate().skip(a) {
                picked.set(a, b, source.get(i, j));
            }
        }
        match self {
            Relation::Similarity(_) => Relation::Similarity(picked),
            Relation::Distance(_) => Relation::Distance(picked),
        }
    }
}

/// Output of one clustering trial.
#[derive(Clone, Debug, PartialEq)]
pub struct Grouping {
    /// Group names (representatives) in matrix order.
    pub names: Vec<GroupId>,
    /// Entity → group map.
    pub group_of: IndexMap<EntityId, GroupId>,
    /// Relation over `names`, if the source produced one.
    pub relation: Option<Relation>,
}

impl Grouping {
    /// Number of groups.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the trial produced no groups.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Entity collection paired with a validated grouping.
#[derive(Clone, Debug)]
pub struct GroupedSet {
    entities: EntitySet,
    groups: Vec<GroupId>,
    group_index: IndexMap<GroupId, usize>,
    group_of: IndexMap<EntityId, GroupId>,
    group_weights: Vec<f64>,
    relation: Option<Relation>,
}

impl GroupedSet {
    /// Attach `grouping` to `entities`, checking that every entity maps to a
    /// known group and that the relation matches the group count.
    pub fn new(entities: EntitySet, grouping: Grouping) -> Result<Self, SplitError> {
        let Grouping {
            names,
            group_of,
            relation,
        } = grouping;
        let mut group_index = IndexMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if group_index.insert(name.clone(), idx).is_some() {
                return Err(SplitError::malformed(
                    entities.name(),
                    format!("group '{name}' appears twice"),
                ));
            }
        }
        let mut group_weights = vec![0.0; names.len()];
        for (id, weight) in entities.weights() {
            let group = group_of.get(id).ok_or_else(|| {
                SplitError::malformed(
                    entities.name(),
                    format!("entity '{id}' is not assigned to a group"),
                )
            })?;
            let idx = group_index.get(group).copied().ok_or_else(|| {
                SplitError::malformed(
                    entities.name(),
                    format!("entity '{id}' maps to unknown group '{group}'"),
                )
            })?;
            group_weights[idx] += weight;
        }
        if let Some(relation) = &relation
            && relation.dim() != names.len()
        {
            return Err(SplitError::malformed(
                entities.name(),
                format!(
                    "relation covers {} groups but {} groups were produced",
                    relation.dim(),
                    names.len()
                ),
            ));
        }
        let group_of = entities
            .ids()
            .filter_map(|id| group_of.get(id).map(|g| (id.clone(), g.clone())))
            .collect();
        Ok(Self {
            entities,
            groups: names,
            group_index,
            group_of,
            group_weights,
            relation,
        })
    }

    /// Group every entity by itself, without a relation.
    pub fn identity(entities: EntitySet) -> Self {
        let names: Vec<GroupId> = entities.ids().cloned().collect();
        let group_index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let group_weights = entities.weights().values().copied().collect();
        let group_of = names.iter().map(|n| (n.clone(), n.clone())).collect();
        Self {
            entities,
            groups: names,
            group_index,
            group_of,
            group_weights,
            relation: None,
        }
    }

    /// Same grouping with `relation` attached.
    pub fn with_relation(self, relation: Relation) -> Result<Self, SplitError> {
        let grouping = Grouping {
            names: self.groups,
            group_of: self.group_of,
            relation: Some(relation),
        };
        Self::new(self.entities, grouping)
    }

    /// Underlying entity collection.
    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    /// Group names in matrix order.
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Summed member weight per group, in matrix order.
    pub fn group_weights(&self) -> &[f64] {
        &self.group_weights
    }

    /// Group of entity `id`.
    pub fn group_of(&self, id: &str) -> Option<&GroupId> {
        self.group_of.get(id)
    }

    /// Matrix index of group `name`.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_index.get(name).copied()
    }

    /// Relation over groups, if any.
    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Validated bipartite interactions between an e-collection and an f-collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionSet {
    pairs: IndexSet<InteractionPair>,
}

impl InteractionSet {
    /// Keep unique pairs whose endpoints exist in `e` and `f`.
    pub fn new<I>(pairs: I, e: &EntitySet, f: &EntitySet) -> Result<Self, SplitError>
    where
        I: IntoIterator<Item = InteractionPair>,
    {
        let mut unique = IndexSet::new();
        for (left, right) in pairs {
            if !e.contains(&left) {
                return Err(SplitError::UnknownEntity {
                    entity: left,
                    context: format!("interactions (dataset '{}')", e.name()),
                });
            }
            if !f.contains(&right) {
                return Err(SplitError::UnknownEntity {
                    entity: right,
                    context: format!("interactions (dataset '{}')", f.name()),
                });
            }
            unique.insert((left, right));
        }
        Ok(Self { pairs: unique })
    }

    /// Pairs in input order.
    pub fn pairs(&self) -> impl Iterator<Item = &InteractionPair> {
        self.pairs.iter()
    }

    /// Number of unique pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pairs were given.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Whether `(e, f)` is an observed pair.
    pub fn contains(&self, e: &str, f: &str) -> bool {
        self.pairs.contains(&(e.to_string(), f.to_string()))
    }
}

/// Count how many interaction rows mention each entity on one side.
///
/// `left == true` counts e-endpoints, otherwise f-endpoints. Used as default
/// entity weights when interactions are available.
pub fn interaction_counts<'a, I>(pairs: I, left: bool) -> IndexMap<EntityId, f64>
where
    I: IntoIterator<Item = &'a InteractionPair>,
{
    let mut counts: IndexMap<EntityId, f64> = IndexMap::new();
    for (e, f) in pairs {
        let key = if left { e } else { f };
        *counts.entry(key.clone()).or_insert(0.0) += 1.0;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(ids: &[&str]) -> EntitySet {
        EntitySet::uniform("test", ids.iter().copied()).unwrap()
    }

    #[test]
    fn deduplicate_aggregates_weights() {
        let set = RawEntities::new("e")
            .with_entity("a", 1.0)
            .with_entity("b", 2.0)
            .with_entity("a", 0.5)
            .deduplicate()
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.weight("a"), Some(1.5));
        assert_eq!(set.ids().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!((set.total_weight() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn deduplicate_rejects_negative_weight_and_empty() {
        let err = RawEntities::new("e")
            .with_entity("a", -1.0)
            .deduplicate()
            .unwrap_err();
        assert!(matches!(err, SplitError::MalformedInput { .. }));
        let err = RawEntities::new("e").deduplicate().unwrap_err();
        assert!(matches!(err, SplitError::MalformedInput { ref details, .. } if details.contains("empty")));
    }

    #[test]
    fn grouped_set_sums_member_weights() {
        let set = RawEntities::new("e")
            .with_entity("a", 1.0)
            .with_entity("b", 2.0)
            .with_entity("c", 4.0)
            .deduplicate()
            .unwrap();
        let grouping = Grouping {
            names: vec!["a".into(), "c".into()],
            group_of: [("a", "a"), ("b", "a"), ("c", "c")]
                .into_iter()
                .map(|(e, g)| (e.to_string(), g.to_string()))
                .collect(),
            relation: Some(Relation::Similarity(SymMatrix::filled(2, 1.0))),
        };
        let grouped = GroupedSet::new(set, grouping).unwrap();
        assert_eq!(grouped.group_weights(), &[3.0, 4.0]);
        assert_eq!(grouped.group_of("b").map(String::as_str), Some("a"));
        assert_eq!(grouped.group_index("c"), Some(1));
    }

    #[test]
    fn grouped_set_rejects_unmapped_entity_and_wrong_dim() {
        let set = entities(&["a", "b"]);
        let grouping = Grouping {
            names: vec!["a".into()],
            group_of: [("a".to_string(), "a".to_string())].into_iter().collect(),
            relation: None,
        };
        let err = GroupedSet::new(set.clone(), grouping).unwrap_err();
        assert!(matches!(err, SplitError::MalformedInput { ref details, .. } if details.contains("'b'")));

        let mut grouping = set.identity_grouping();
        grouping.relation = Some(Relation::Distance(SymMatrix::filled(3, 0.0)));
        let err = GroupedSet::new(set, grouping).unwrap_err();
        assert!(matches!(err, SplitError::MalformedInput { ref details, .. } if details.contains("relation covers 3")));
    }

    #[test]
    fn sym_matrix_requires_square_symmetric_rows() {
        assert!(SymMatrix::from_rows(vec![vec![1.0, 0.5], vec![0.5, 1.0]]).is_ok());
        assert!(SymMatrix::from_rows(vec![vec![1.0, 0.5], vec![0.4, 1.0]]).is_err());
        assert!(SymMatrix::from_rows(vec![vec![1.0], vec![0.4, 1.0]]).is_err());
    }

    #[test]
    fn relation_select_reorders_entries() {
        let matrix = SymMatrix::from_rows(vec![
            vec![0.0, 0.1, 0.2],
            vec![0.1, 0.0, 0.3],
            vec![0.2, 0.3, 0.0],
        ])
        .unwrap();
        let picked = Relation::Distance(matrix).select(&[2, 0]);
        assert_eq!(picked.dim(), 2);
        assert!((picked.matrix().get(0, 1) - 0.2).abs() < 1e-12);
        assert!((picked.similarity(0, 1) - 0.8).abs() < 1e-12);
        assert!(!picked.is_similarity());
    }

    #[test]
    fn interactions_reject_unknown_endpoints() {
        let e = entities(&["e1", "e2"]);
        let f = entities(&["f1"]);
        let ok = InteractionSet::new(
            vec![
                ("e1".to_string(), "f1".to_string()),
                ("e1".to_string(), "f1".to_string()),
                ("e2".to_string(), "f1".to_string()),
            ],
            &e,
            &f,
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.contains("e2", "f1"));

        let err = InteractionSet::new(vec![("e3".to_string(), "f1".to_string())], &e, &f)
            .unwrap_err();
        assert!(matches!(err, SplitError::UnknownEntity { ref entity, .. } if entity == "e3"));
    }

    #[test]
    fn interaction_counts_by_side() {
        let pairs = vec![
            ("e1".to_string(), "f1".to_string()),
            ("e1".to_string(), "f2".to_string()),
            ("e2".to_string(), "f1".to_string()),
        ];
        let left = interaction_counts(&pairs, true);
        assert_eq!(left.get("e1"), Some(&2.0));
        let right = interaction_counts(&pairs, false);
        assert_eq!(right.get("f1"), Some(&2.0));
        assert_eq!(right.get("f2"), Some(&1.0));
    }

    #[test]
    fn reweighted_rejects_unknown_ids() {
        let set = entities(&["a", "b"]);
        let mut overrides = IndexMap::new();
        overrides.insert("b".to_string(), 3.0);
        let updated = set.reweighted(&overrides).unwrap();
        assert_eq!(updated.weight("b"), Some(3.0));
        assert_eq!(set.weight("b"), Some(1.0));
        overrides.insert("z".to_string(), 1.0);
        assert!(matches!(
            set.reweighted(&overrides),
            Err(SplitError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn sym_matrix_deserialization_validates_rows() {
        let matrix: SymMatrix = serde_json::from_str("[[1.0, 0.5], [0.5, 1.0]]").unwrap();
        assert_eq!(matrix.dim(), 2);
        assert_eq!(matrix.get(1, 0), 0.5);
        assert_eq!(serde_json::to_string(&matrix).unwrap(), "[[1.0,0.5],[0.5,1.0]]");
        assert!(serde_json::from_str::<SymMatrix>("[[1.0, 0.5], [0.4, 1.0]]").is_err());
        assert!(serde_json::from_str::<SymMatrix>("[[1.0, 0.5], [0.5]]").is_err());
    }
}
