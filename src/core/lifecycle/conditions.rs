// src/core/lifecycle/conditions.rs

//! The admission conditions evaluated at each keep-alive boundary.

use crate::core::elasticsearch::{ClusterHealth, ClusterQuery, HealthStatus};
use crate::core::errors::ScaleGuardError;
use crate::core::events::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The contract handed to the keep-alive loop: `Ok(true)` admits the
/// scaling action, `Ok(false)` asks for another heartbeat, `Err` aborts.
#[async_trait]
pub trait AdmissionCondition: Send + Sync {
    async fn check(&self, event: &LifecycleEvent) -> Result<bool, ScaleGuardError>;
}

/// Whether the cluster as a whole is quiescent enough to admit a scaling
/// action. A timed-out health response is transient: retry next boundary.
fn cluster_stable(health: &ClusterHealth) -> bool {
    health.status == HealthStatus::Green
        && health.relocating_shards == 0
        && health.initializing_shards == 0
        && health.delayed_unassigned_shards == 0
        && health.unassigned_shards == 0
}

/// Scale-in gate: the cluster must be stable and the terminating node must
/// hold no shards. A node already gone from the cluster trivially passes.
pub struct TerminateCondition {
    query: Arc<ClusterQuery>,
    node_name: String,
}

impl TerminateCondition {
    pub fn new(query: Arc<ClusterQuery>, node_name: String) -> Self {
        Self { query, node_name }
    }
}

#[async_trait]
impl AdmissionCondition for TerminateCondition {
    async fn check(&self, event: &LifecycleEvent) -> Result<bool, ScaleGuardError> {
        let health = self.query.health().await?;
        if health.timed_out {
            debug!(instance = %event.instance_id, "cluster health timed out, retrying next boundary");
            return Ok(false);
        }
        if !cluster_stable(&health) {
            debug!(
                instance = %event.instance_id,
                status = ?health.status,
                relocating = health.relocating_shards,
                initializing = health.initializing_shards,
                unassigned = health.unassigned_shards,
                "cluster not yet stable"
            );
            return Ok(false);
        }
        let shard_count = match self.query.node(&self.node_name).await? {
            Some(node) => node.shards.len(),
            None => 0,
        };
        debug!(node = %self.node_name, shards = shard_count, "terminate condition evaluated");
        Ok(shard_count == 0)
    }
}

/// Scale-out gate: the cluster must be stable; the new node carries no
/// per-node requirement.
pub struct LaunchCondition {
    query: Arc<ClusterQuery>,
}

impl LaunchCondition {
    pub fn new(query: Arc<ClusterQuery>) -> Self {
        Self { query }
    }
}

#[async_trait]
impl AdmissionCondition for LaunchCondition {
    async fn check(&self, event: &LifecycleEvent) -> Result<bool, ScaleGuardError> {
        let health = self.query.health().await?;
        if health.timed_out {
            debug!(instance = %event.instance_id, "cluster health timed out, retrying next boundary");
            return Ok(false);
        }
        Ok(cluster_stable(&health))
    }
}
