// src/core/elasticsearch/client.rs

//! The reqwest-backed implementation of [`ElasticsearchApi`].

use super::ElasticsearchApi;
use super::settings::ShardAllocationExcludeSettings;
use super::types::{
    CatShard, ClusterHealth, NodesInfoResponse, NodesStatsResponse, SnapshotRepository,
};
use crate::core::errors::ScaleGuardError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
// Sized for the stats fan-out on large clusters, not for settings writes.
const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP transport for a single cluster, addressed by its base URL.
pub struct HttpElasticsearchClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpElasticsearchClient {
    pub fn new(base: Url) -> Result<Self, ScaleGuardError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CLIENT_CONNECT_TIMEOUT)
            .timeout(CLIENT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ScaleGuardError> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Issues a request and maps any non-2xx response to an error carrying
    /// the status and body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ScaleGuardError> {
        let url = self.endpoint(path, query)?;
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ScaleGuardError::Elasticsearch { status, body })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ScaleGuardError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ElasticsearchApi for HttpElasticsearchClient {
    async fn nodes_info(&self) -> Result<NodesInfoResponse, ScaleGuardError> {
        self.get_json("_nodes/*/_all", &[]).await
    }

    async fn nodes_stats(&self) -> Result<NodesStatsResponse, ScaleGuardError> {
        self.get_json("_nodes/*/stats", &[]).await
    }

    async fn cat_shards(&self) -> Result<Vec<CatShard>, ScaleGuardError> {
        self.get_json("_cat/shards", &[("h", "*"), ("format", "json")])
            .await
    }

    async fn exclusion_settings(&self) -> Result<ShardAllocationExcludeSettings, ScaleGuardError> {
        let body: Value = self
            .get_json(
                "_cluster/settings",
                &[("filter_path", "*.cluster.routing.allocation.exclude.*")],
            )
            .await?;
        ShardAllocationExcludeSettings::from_settings_body(&body)
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, ScaleGuardError> {
        self.get_json("_cluster/health", &[]).await
    }

    async fn update_transient_settings(&self, body: Value) -> Result<(), ScaleGuardError> {
        self.send(Method::PUT, "_cluster/settings", &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn add_voting_exclusion(&self, node_name: &str) -> Result<(), ScaleGuardError> {
        let path = format!("_cluster/voting_config_exclusions/{node_name}");
        self.send(Method::POST, &path, &[], None).await?;
        Ok(())
    }

    async fn clear_voting_exclusions(&self) -> Result<(), ScaleGuardError> {
        self.send(Method::DELETE, "_cluster/voting_config_exclusions", &[], None)
            .await?;
        Ok(())
    }

    async fn snapshot_repository(
        &self,
        repository: &str,
    ) -> Result<Option<SnapshotRepository>, ScaleGuardError> {
        let path = format!("_snapshot/{repository}");
        let url = self.endpoint(&path, &[])?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ScaleGuardError::Elasticsearch { status, body });
        }
        // The response is keyed by repository name.
        let repos: HashMap<String, SnapshotRepository> = response.json().await?;
        Ok(repos.into_iter().find(|(k, _)| k == repository).map(|(_, v)| v))
    }

    async fn put_snapshot_repository(
        &self,
        repository: &str,
        body: Value,
    ) -> Result<(), ScaleGuardError> {
        let path = format!("_snapshot/{repository}");
        self.send(Method::PUT, &path, &[], Some(&body)).await?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError> {
        let path = format!("_snapshot/{repository}/{snapshot}");
        self.send(Method::PUT, &path, &[("wait_for_completion", "true")], None)
            .await?;
        Ok(())
    }

    async fn delete_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError> {
        let path = format!("_snapshot/{repository}/{snapshot}");
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }
}
