/// Unique entity identifier within one collection.
/// Examples: `P69905`, `CHEMBL25`, `GCF_000005845.2`
pub type EntityId = String;
/// Identifier of a group (cluster); the name of its representative entity.
/// Example: `P69905`
pub type GroupId = String;
/// Name of a configured split.
/// Examples: `train`, `val`, `test`
pub type SplitName = String;
/// Interaction between an e-entity and an f-entity.
/// Example: (`CHEMBL25`, `P69905`)
pub type InteractionPair = (EntityId, EntityId);
/// Human-readable label of a dataset used in logs and file names.
/// Examples: `e`, `f`, `ligands`
pub type DatasetName = String;
/// Rendered clustering parameter used in log-file names.
/// Example: `cutoff_0.8125`
pub type ParamLabel = String;
