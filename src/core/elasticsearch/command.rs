// src/core/elasticsearch/command.rs

//! The write side of cluster integration: exclusion-list edits, voting
//! exclusions, and snapshot plumbing. All operations are idempotent.

use super::ElasticsearchApi;
use crate::core::errors::ScaleGuardError;
use crate::core::metrics;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Issues cluster writes. Owns the process-wide lock that serializes every
/// read-modify-write of the exclusion settings; the settings API has no
/// atomic compare-and-set, so two concurrent drains would otherwise lose
/// one name. Running two processes against the same cluster is unsupported.
pub struct ClusterCommand {
    es: Arc<dyn ElasticsearchApi>,
    settings_lock: Mutex<()>,
}

impl ClusterCommand {
    pub fn new(es: Arc<dyn ElasticsearchApi>) -> Self {
        Self {
            es,
            settings_lock: Mutex::new(()),
        }
    }

    /// Adds `node_name` to the shard-allocation exclusion list so the
    /// cluster migrates its shards elsewhere. No write is issued when the
    /// name is already excluded.
    pub async fn drain(&self, node_name: &str) -> Result<(), ScaleGuardError> {
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.es.exclusion_settings().await?;
        if !settings.insert_name(node_name) {
            debug!(node = node_name, "node already excluded from allocation");
            return Ok(());
        }
        info!(node = node_name, excluded = ?settings.name, "draining node");
        self.es
            .update_transient_settings(settings.transient_name_update())
            .await?;
        metrics::DRAINS_TOTAL.inc();
        Ok(())
    }

    /// Removes `node_name` from the exclusion list. Removing the last name
    /// writes an explicit null, clearing the setting entirely.
    pub async fn undrain(&self, node_name: &str) -> Result<(), ScaleGuardError> {
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.es.exclusion_settings().await?;
        if !settings.remove_name(node_name) {
            debug!(node = node_name, "node not excluded, nothing to undrain");
            return Ok(());
        }
        info!(node = node_name, excluded = ?settings.name, "undraining node");
        self.es
            .update_transient_settings(settings.transient_name_update())
            .await?;
        metrics::UNDRAINS_TOTAL.inc();
        Ok(())
    }

    /// Removes a node from the set eligible to vote in master elections.
    pub async fn exclude_from_voting(&self, node_name: &str) -> Result<(), ScaleGuardError> {
        info!(node = node_name, "excluding node from master voting");
        self.es.add_voting_exclusion(node_name).await
    }

    pub async fn clear_voting_exclusions(&self) -> Result<(), ScaleGuardError> {
        info!("clearing master-voting exclusions");
        self.es.clear_voting_exclusions().await
    }

    /// Registers a snapshot repository if it is missing. A repository that
    /// already exists with a different type is a hard error.
    pub async fn ensure_snapshot_repo(
        &self,
        repository: &str,
        kind: &str,
        repo_settings: Value,
    ) -> Result<(), ScaleGuardError> {
        match self.es.snapshot_repository(repository).await? {
            Some(existing) if existing.kind == kind => {
                debug!(repository, kind, "snapshot repository already registered");
                Ok(())
            }
            Some(existing) => Err(ScaleGuardError::WrongRepoType {
                repository: repository.to_string(),
                expected: kind.to_string(),
                actual: existing.kind,
            }),
            None => {
                info!(repository, kind, "registering snapshot repository");
                let body = json!({ "type": kind, "settings": repo_settings });
                self.es.put_snapshot_repository(repository, body).await
            }
        }
    }

    /// Creates a snapshot named by formatting `now` with `format`, waiting
    /// for completion. Returns the snapshot name.
    pub async fn create_snapshot(
        &self,
        repository: &str,
        format: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ScaleGuardError> {
        // Snapshot names must be lowercase.
        let snapshot = now.format(format).to_string().to_lowercase();
        info!(repository, snapshot, "creating snapshot");
        self.es.create_snapshot(repository, &snapshot).await?;
        Ok(snapshot)
    }

    pub async fn delete_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError> {
        info!(repository, snapshot, "deleting snapshot");
        self.es.delete_snapshot(repository, snapshot).await
    }
}
