// src/core/elasticsearch/types.rs

//! Serde models for the cluster responses the control plane consumes, plus
//! the merged per-node read model.

use crate::core::errors::ScaleGuardError;
use serde::Deserialize;
use std::collections::HashMap;

/// Envelope shared by the `/_nodes/*` family of endpoints: entries are keyed
/// by node id, not node name.
#[derive(Debug, Clone, Deserialize)]
pub struct NodesEnvelope<T> {
    pub cluster_name: String,
    #[serde(default = "HashMap::new")]
    pub nodes: HashMap<String, T>,
}

pub type NodesInfoResponse = NodesEnvelope<NodeInfo>;
pub type NodesStatsResponse = NodesEnvelope<NodeStats>;

/// One entry of `GET /_nodes/*/_all`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// One entry of `GET /_nodes/*/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStats {
    #[serde(default)]
    pub name: String,
    pub jvm: Option<JvmStats>,
    pub os: Option<OsStats>,
    pub fs: Option<FsStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JvmStats {
    pub mem: JvmMem,
    #[serde(default)]
    pub gc: JvmGc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JvmMem {
    #[serde(default)]
    pub heap_used_in_bytes: u64,
    #[serde(default)]
    pub heap_max_in_bytes: u64,
    #[serde(default)]
    pub pools: HashMap<String, JvmPool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JvmPool {
    #[serde(default)]
    pub used_in_bytes: u64,
    #[serde(default)]
    pub max_in_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JvmGc {
    #[serde(default)]
    pub collectors: HashMap<String, GcCollector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcCollector {
    #[serde(default)]
    pub collection_count: u64,
    #[serde(default)]
    pub collection_time_in_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsStats {
    pub cpu: Option<OsCpu>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsCpu {
    pub load_average: Option<LoadAverage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadAverage {
    #[serde(rename = "1m", default)]
    pub one: f64,
    #[serde(rename = "5m", default)]
    pub five: f64,
    #[serde(rename = "15m", default)]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsStats {
    pub total: Option<FsTotal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FsTotal {
    #[serde(default)]
    pub total_in_bytes: u64,
    #[serde(default)]
    pub available_in_bytes: u64,
}

/// One row of `GET /_cat/shards?h=*&format=json`. The cat API returns every
/// column as a string; only the columns the control plane reads are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct CatShard {
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub shard: String,
    #[serde(default)]
    pub prirep: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub node: Option<String>,
}

/// `GET /_cluster/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub relocating_shards: u64,
    #[serde(default)]
    pub initializing_shards: u64,
    #[serde(default)]
    pub unassigned_shards: u64,
    #[serde(default)]
    pub delayed_unassigned_shards: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

/// A registered snapshot repository, from `GET /_snapshot/<repo>`.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRepository {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// The merged, point-in-time view of one cluster node.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub cluster_name: String,
    pub host: String,
    pub ip: String,
    pub roles: Vec<String>,
    pub attributes: HashMap<String, String>,
    /// Whether the current exclusion settings keep shards off this node.
    pub excluded_from_shard_allocation: bool,
    pub stats: NodeStats,
    pub shards: Vec<CatShard>,
}

impl Node {
    pub fn is_master_eligible(&self) -> bool {
        self.roles.iter().any(|r| r == "master")
    }
}

/// Extracts the node names referenced by a `/_cat/shards` node cell.
///
/// The cell is one of: empty (unassigned shard), a single node name, or the
/// five-token relocation form `<from> -> <ip> <uuid> <to>` which references
/// both endpoints. Anything else is a fatal parse error.
pub fn parse_shard_nodes(cell: &str) -> Result<Vec<String>, ScaleGuardError> {
    let tokens: Vec<&str> = cell.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Ok(Vec::new()),
        [single] => Ok(vec![single.to_string()]),
        [from, "->", _ip, _uuid, to] => Ok(vec![from.to_string(), to.to_string()]),
        _ => Err(ScaleGuardError::ShardCellParse(cell.to_string())),
    }
}
