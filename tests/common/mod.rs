#![allow(dead_code)]

//! Shared in-memory fakes for the three external seams, plus fixture
//! builders for cluster responses.

use async_trait::async_trait;
use parking_lot::Mutex;
use scaleguard::core::ScaleGuardError;
use scaleguard::core::cloud::{AutoScalingApi, HookTimeouts, MessageQueue, QueueMessage};
use scaleguard::core::elasticsearch::settings::{
    ShardAllocationExcludeSettings, parse_exclusion_list,
};
use scaleguard::core::elasticsearch::types::{
    CatShard, ClusterHealth, HealthStatus, NodeInfo, NodeStats, NodesEnvelope, NodesInfoResponse,
    NodesStatsResponse, SnapshotRepository,
};
use scaleguard::core::elasticsearch::ElasticsearchApi;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// --- Fixture builders ---

pub fn green_health() -> ClusterHealth {
    ClusterHealth {
        status: HealthStatus::Green,
        timed_out: false,
        relocating_shards: 0,
        initializing_shards: 0,
        unassigned_shards: 0,
        delayed_unassigned_shards: 0,
    }
}

pub fn relocating_health() -> ClusterHealth {
    ClusterHealth {
        relocating_shards: 2,
        ..green_health()
    }
}

pub fn node_info(name: &str, roles: &[&str]) -> NodeInfo {
    NodeInfo {
        name: name.to_string(),
        host: format!("{name}.internal"),
        ip: "10.0.0.1".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        attributes: HashMap::new(),
    }
}

pub fn node_stats(name: &str) -> NodeStats {
    NodeStats {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn cat_shard(index: &str, shard: &str, node: &str) -> CatShard {
    CatShard {
        index: index.to_string(),
        shard: shard.to_string(),
        prirep: "p".to_string(),
        state: "STARTED".to_string(),
        node: if node.is_empty() {
            None
        } else {
            Some(node.to_string())
        },
    }
}

/// One consistent set of fan-out responses.
#[derive(Clone)]
pub struct FanoutFixture {
    pub info: NodesInfoResponse,
    pub stats: NodesStatsResponse,
    pub shards: Vec<CatShard>,
}

impl FanoutFixture {
    /// A cluster of the given nodes, each `(info, shard rows)`.
    pub fn cluster(nodes: Vec<(NodeInfo, Vec<CatShard>)>) -> Self {
        let mut info = HashMap::new();
        let mut stats = HashMap::new();
        let mut shards = Vec::new();
        for (i, (entry, rows)) in nodes.into_iter().enumerate() {
            let id = format!("id-{i}");
            stats.insert(id.clone(), node_stats(&entry.name));
            shards.extend(rows);
            info.insert(id, entry);
        }
        Self {
            info: NodesEnvelope {
                cluster_name: "test-cluster".to_string(),
                nodes: info,
            },
            stats: NodesEnvelope {
                cluster_name: "test-cluster".to_string(),
                nodes: stats,
            },
            shards,
        }
    }
}

// --- Elasticsearch fake ---

/// In-memory [`ElasticsearchApi`]. Fan-out fixtures advance once per query
/// attempt (the node-info read, always polled first, moves the cursor; the
/// last fixture is sticky). Settings writes are recorded verbatim and the
/// `_name` key is applied so later reads observe earlier drains.
pub struct MockElasticsearch {
    pub fanouts: Mutex<Vec<FanoutFixture>>,
    pub attempts: AtomicUsize,
    pub settings: Mutex<ShardAllocationExcludeSettings>,
    pub settings_writes: Mutex<Vec<Value>>,
    pub voting_added: Mutex<Vec<String>>,
    pub voting_cleared: AtomicUsize,
    /// Order of write-side calls, for asserting rollback sequencing.
    pub call_log: Mutex<Vec<String>>,
    pub healths: Mutex<VecDeque<ClusterHealth>>,
    pub repos: Mutex<HashMap<String, SnapshotRepository>>,
    pub repo_puts: Mutex<Vec<(String, Value)>>,
    pub snapshots_created: Mutex<Vec<(String, String)>>,
    pub snapshots_deleted: Mutex<Vec<(String, String)>>,
}

impl MockElasticsearch {
    pub fn new() -> Self {
        Self {
            fanouts: Mutex::new(vec![FanoutFixture::cluster(Vec::new())]),
            attempts: AtomicUsize::new(0),
            settings: Mutex::new(ShardAllocationExcludeSettings::default()),
            settings_writes: Mutex::new(Vec::new()),
            voting_added: Mutex::new(Vec::new()),
            voting_cleared: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
            healths: Mutex::new(VecDeque::new()),
            repos: Mutex::new(HashMap::new()),
            repo_puts: Mutex::new(Vec::new()),
            snapshots_created: Mutex::new(Vec::new()),
            snapshots_deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fanouts(fanouts: Vec<FanoutFixture>) -> Self {
        let mock = Self::new();
        *mock.fanouts.lock() = fanouts;
        mock
    }

    pub fn push_health(&self, health: ClusterHealth) {
        self.healths.lock().push_back(health);
    }

    fn fixture(&self, index: usize) -> FanoutFixture {
        let fanouts = self.fanouts.lock();
        fanouts[index.min(fanouts.len() - 1)].clone()
    }

    /// The `_name` values of every recorded settings write, in order.
    pub fn written_name_lists(&self) -> Vec<Value> {
        self.settings_writes
            .lock()
            .iter()
            .map(|body| body["transient"]["cluster.routing.allocation.exclude._name"].clone())
            .collect()
    }
}

#[async_trait]
impl ElasticsearchApi for MockElasticsearch {
    async fn nodes_info(&self) -> Result<NodesInfoResponse, ScaleGuardError> {
        let index = self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(self.fixture(index).info)
    }

    async fn nodes_stats(&self) -> Result<NodesStatsResponse, ScaleGuardError> {
        let index = self.attempts.load(Ordering::SeqCst).saturating_sub(1);
        Ok(self.fixture(index).stats)
    }

    async fn cat_shards(&self) -> Result<Vec<CatShard>, ScaleGuardError> {
        let index = self.attempts.load(Ordering::SeqCst).saturating_sub(1);
        Ok(self.fixture(index).shards)
    }

    async fn exclusion_settings(&self) -> Result<ShardAllocationExcludeSettings, ScaleGuardError> {
        Ok(self.settings.lock().clone())
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, ScaleGuardError> {
        Ok(self.healths.lock().pop_front().unwrap_or_else(green_health))
    }

    async fn update_transient_settings(&self, body: Value) -> Result<(), ScaleGuardError> {
        let name_value = &body["transient"]["cluster.routing.allocation.exclude._name"];
        let mut settings = self.settings.lock();
        settings.name = match name_value {
            Value::Null => Vec::new(),
            Value::String(joined) => parse_exclusion_list(joined),
            other => {
                return Err(ScaleGuardError::Internal(format!(
                    "unexpected _name value in settings write: {other}"
                )));
            }
        };
        drop(settings);
        self.settings_writes.lock().push(body);
        self.call_log.lock().push("settings_write".to_string());
        Ok(())
    }

    async fn add_voting_exclusion(&self, node_name: &str) -> Result<(), ScaleGuardError> {
        self.voting_added.lock().push(node_name.to_string());
        self.call_log.lock().push("add_voting".to_string());
        Ok(())
    }

    async fn clear_voting_exclusions(&self) -> Result<(), ScaleGuardError> {
        self.voting_cleared.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().push("clear_voting".to_string());
        Ok(())
    }

    async fn snapshot_repository(
        &self,
        repository: &str,
    ) -> Result<Option<SnapshotRepository>, ScaleGuardError> {
        Ok(self.repos.lock().get(repository).cloned())
    }

    async fn put_snapshot_repository(
        &self,
        repository: &str,
        body: Value,
    ) -> Result<(), ScaleGuardError> {
        self.repo_puts.lock().push((repository.to_string(), body));
        Ok(())
    }

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError> {
        self.snapshots_created
            .lock()
            .push((repository.to_string(), snapshot.to_string()));
        Ok(())
    }

    async fn delete_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
    ) -> Result<(), ScaleGuardError> {
        self.snapshots_deleted
            .lock()
            .push((repository.to_string(), snapshot.to_string()));
        Ok(())
    }
}

// --- Queue fake ---

/// In-memory [`MessageQueue`]. Each receive pops one scripted batch; with
/// none left it emulates an empty long poll.
pub struct MockQueue {
    pub batches: Mutex<VecDeque<Result<Vec<QueueMessage>, String>>>,
    pub receive_args: Mutex<Vec<(usize, Duration, Duration)>>,
    pub visibility_changes: Mutex<Vec<(String, Duration)>>,
    pub deletes: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<String>>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            receive_args: Mutex::new(Vec::new()),
            visibility_changes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push_batch(&self, messages: Vec<QueueMessage>) {
        self.batches.lock().push_back(Ok(messages));
    }

    pub fn push_receive_error(&self, error: &str) {
        self.batches.lock().push_back(Err(error.to_string()));
    }
}

pub fn message(receipt: &str, body: &str) -> QueueMessage {
    QueueMessage {
        body: body.to_string(),
        receipt_handle: receipt.to_string(),
    }
}

#[async_trait]
impl MessageQueue for MockQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, ScaleGuardError> {
        self.receive_args
            .lock()
            .push((max_messages, wait, visibility_timeout));
        let next = self.batches.lock().pop_front();
        match next {
            Some(Ok(messages)) => Ok(messages),
            Some(Err(error)) => Err(ScaleGuardError::Queue(error)),
            None => {
                tokio::time::sleep(wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), ScaleGuardError> {
        self.visibility_changes
            .lock()
            .push((receipt_handle.to_string(), timeout));
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), ScaleGuardError> {
        self.deletes.lock().push(receipt_handle.to_string());
        Ok(())
    }

    async fn send(&self, body: String) -> Result<(), ScaleGuardError> {
        self.sent.lock().push(body);
        Ok(())
    }
}

// --- Auto-scaling fake ---

pub struct MockAutoScaling {
    pub timeouts: Mutex<HookTimeouts>,
    pub describe_calls: AtomicUsize,
    pub heartbeats: Mutex<Vec<String>>,
    /// Scripted outcomes for successive heartbeat calls; `Some(msg)` fails.
    /// An exhausted script succeeds.
    pub heartbeat_script: Mutex<VecDeque<Option<String>>>,
    pub completions: Mutex<Vec<(String, String)>>,
}

impl MockAutoScaling {
    pub fn new(heartbeat: Duration, global: Duration) -> Self {
        Self {
            timeouts: Mutex::new(HookTimeouts { heartbeat, global }),
            describe_calls: AtomicUsize::new(0),
            heartbeats: Mutex::new(Vec::new()),
            heartbeat_script: Mutex::new(VecDeque::new()),
            completions: Mutex::new(Vec::new()),
        }
    }

    pub fn script_heartbeat_ok(&self) {
        self.heartbeat_script.lock().push_back(None);
    }

    pub fn script_heartbeat_failure(&self, error: &str) {
        self.heartbeat_script.lock().push_back(Some(error.to_string()));
    }
}

#[async_trait]
impl AutoScalingApi for MockAutoScaling {
    async fn hook_timeouts(
        &self,
        _group: &str,
        _hook: &str,
    ) -> Result<HookTimeouts, ScaleGuardError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.timeouts.lock())
    }

    async fn record_heartbeat(
        &self,
        _group: &str,
        _hook: &str,
        token: &str,
        _instance_id: &str,
    ) -> Result<(), ScaleGuardError> {
        if let Some(Some(error)) = self.heartbeat_script.lock().pop_front() {
            return Err(ScaleGuardError::CloudApi(error));
        }
        self.heartbeats.lock().push(token.to_string());
        Ok(())
    }

    async fn complete_lifecycle_action(
        &self,
        _group: &str,
        _hook: &str,
        token: &str,
        _instance_id: &str,
        result: &str,
    ) -> Result<(), ScaleGuardError> {
        self.completions
            .lock()
            .push((token.to_string(), result.to_string()));
        Ok(())
    }
}
