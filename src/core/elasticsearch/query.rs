// src/core/elasticsearch/query.rs

//! The read side of cluster integration: a consistent per-node view merged
//! from four concurrent endpoint reads.

use super::ElasticsearchApi;
use super::settings::ShardAllocationExcludeSettings;
use super::types::{
    CatShard, ClusterHealth, Node, NodesInfoResponse, NodesStatsResponse, parse_shard_nodes,
};
use crate::core::errors::ScaleGuardError;
use crate::core::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Attempts per public read before a protocol inconsistency is surfaced.
/// A retry tolerates cluster membership changing mid-fan-out.
const CONSISTENCY_ATTEMPTS: usize = 3;

/// Read-only fan-out over the cluster: node info, node stats, shard
/// assignments, and exclusion settings, merged by node name.
pub struct ClusterQuery {
    es: Arc<dyn ElasticsearchApi>,
}

impl ClusterQuery {
    pub fn new(es: Arc<dyn ElasticsearchApi>) -> Self {
        Self { es }
    }

    /// A consistent snapshot of every node in the cluster, keyed by name.
    pub async fn nodes(&self) -> Result<HashMap<String, Node>, ScaleGuardError> {
        let mut last_err = None;
        for attempt in 1..=CONSISTENCY_ATTEMPTS {
            let _timer = metrics::CLUSTER_QUERY_SECONDS.start_timer();
            // First failed request aborts the other three.
            let (info, stats, shards, excludes) = tokio::try_join!(
                self.es.nodes_info(),
                self.es.nodes_stats(),
                self.es.cat_shards(),
                self.es.exclusion_settings(),
            )?;
            match merge(info, stats, shards, &excludes) {
                Ok(nodes) => return Ok(nodes),
                Err(
                    e @ (ScaleGuardError::InconsistentNodes(_) | ScaleGuardError::ShardCellParse(_)),
                ) => {
                    warn!(
                        attempt,
                        "cluster responses disagree, retrying fan-out: {}", e
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("loop ran at least once"))
    }

    /// Like [`nodes`](Self::nodes), restricted to the given names. Filtering
    /// happens after the merge so consistency is always checked against the
    /// whole cluster.
    pub async fn nodes_named(
        &self,
        names: &[&str],
    ) -> Result<HashMap<String, Node>, ScaleGuardError> {
        let mut all = self.nodes().await?;
        all.retain(|name, _| names.contains(&name.as_str()));
        Ok(all)
    }

    /// A single node's snapshot, or None when it is not in the cluster.
    pub async fn node(&self, name: &str) -> Result<Option<Node>, ScaleGuardError> {
        Ok(self.nodes().await?.remove(name))
    }

    pub async fn health(&self) -> Result<ClusterHealth, ScaleGuardError> {
        self.es.cluster_health().await
    }
}

/// Merges the four responses into the per-node read model.
///
/// Fails with `InconsistentNodes` when the info and stats responses disagree
/// on membership, or when a stats/shards entry names a node the info
/// response does not know.
fn merge(
    info: NodesInfoResponse,
    stats: NodesStatsResponse,
    shards: Vec<CatShard>,
    excludes: &ShardAllocationExcludeSettings,
) -> Result<HashMap<String, Node>, ScaleGuardError> {
    if info.nodes.len() != stats.nodes.len() {
        return Err(ScaleGuardError::InconsistentNodes(format!(
            "info reports {} nodes, stats reports {}",
            info.nodes.len(),
            stats.nodes.len()
        )));
    }

    let cluster_name = info.cluster_name;
    let mut nodes: HashMap<String, Node> = info
        .nodes
        .into_values()
        .map(|entry| {
            let excluded =
                excludes.excludes(&entry.name, &entry.host, &entry.ip, &entry.attributes);
            let node = Node {
                name: entry.name.clone(),
                cluster_name: cluster_name.clone(),
                host: entry.host,
                ip: entry.ip,
                roles: entry.roles,
                attributes: entry.attributes,
                excluded_from_shard_allocation: excluded,
                stats: Default::default(),
                shards: Vec::new(),
            };
            (entry.name, node)
        })
        .collect();

    for entry in stats.nodes.into_values() {
        let Some(node) = nodes.get_mut(&entry.name) else {
            return Err(ScaleGuardError::InconsistentNodes(format!(
                "stats entry for unknown node '{}'",
                entry.name
            )));
        };
        node.stats = entry;
    }

    for row in shards {
        let cell = row.node.as_deref().unwrap_or("");
        for name in parse_shard_nodes(cell)? {
            let Some(node) = nodes.get_mut(&name) else {
                return Err(ScaleGuardError::InconsistentNodes(format!(
                    "shard row for index '{}' references unknown node '{}'",
                    row.index, name
                )));
            };
            node.shards.push(row.clone());
        }
    }

    Ok(nodes)
}
