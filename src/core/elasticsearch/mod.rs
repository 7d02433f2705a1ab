// src/core/elasticsearch/mod.rs

//! Cluster integration: the HTTP transport contract, the read-side query
//! service, and the write-side command service.

use crate::core::errors::ScaleGuardError;
use async_trait::async_trait;

pub mod client;
pub mod command;
pub mod query;
pub mod settings;
pub mod types;

pub use client::HttpElasticsearchClient;
pub use command::ClusterCommand;
pub use query::ClusterQuery;
pub use settings::ShardAllocationExcludeSettings;
pub use types::{ClusterHealth, HealthStatus, Node};

/// The narrow contract every cluster read and write goes through.
///
/// One method per endpoint the control plane touches. Production uses the
/// reqwest-backed [`HttpElasticsearchClient`]; tests substitute in-memory
/// fakes.
#[async_trait]
pub trait ElasticsearchApi: Send + Sync {
    async fn nodes_info(&self) -> Result<types::NodesInfoResponse, ScaleGuardError>;

    async fn nodes_stats(&self) -> Result<types::NodesStatsResponse, ScaleGuardError>;

    async fn cat_shards(&self) -> Result<Vec<types::CatShard>, ScaleGuardError>;

    /// Current shard-allocation exclusion settings, already parsed.
    async fn exclusion_settings(&self) -> Result<ShardAllocationExcludeSettings, ScaleGuardError>;

    async fn cluster_health(&self) -> Result<ClusterHealth, ScaleGuardError>;

    /// `PUT /_cluster/settings` with a prebuilt `transient` body.
    async fn update_transient_settings(
        &self,
        body: serde_json::Value,
    ) -> Result<(), ScaleGuardError>;

    async fn add_voting_exclusion(&self, node_name: &str) -> Result<(), ScaleGuardError>;

    async fn clear_voting_exclusions(&self) -> Result<(), ScaleGuardError>;

    /// None when the repository does not exist.
    async fn snapshot_repository(
        &self,
        repository: &str,
    ) -> Result<Option<types::SnapshotRepository>, ScaleGuardError>;

    async fn put_snapshot_repository(
        &self,
        repository: &str,
        body: serde_json::Value,
    ) -> Result<(), ScaleGuardError>;

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError>;

    async fn delete_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError>;
}
