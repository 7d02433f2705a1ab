// src/core/tasks/observer.rs

//! A background task that periodically samples cluster node stats,
//! publishes them as Prometheus metrics, and keeps the latest sample
//! available for admission decisions.

use crate::core::elasticsearch::{ClusterQuery, Node};
use crate::core::errors::ScaleGuardError;
use crate::core::metrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// The most recent successful observation of the cluster.
#[derive(Debug, Clone)]
pub struct ClusterSample {
    pub at: DateTime<Utc>,
    pub nodes: HashMap<String, Node>,
}

/// Periodically samples node stats, feeding the per-node gauges and the
/// latest-sample slot.
pub struct ClusterObserverTask {
    query: Arc<ClusterQuery>,
    interval: Duration,
    latest: Arc<RwLock<Option<ClusterSample>>>,
}

impl ClusterObserverTask {
    pub fn new(query: Arc<ClusterQuery>, interval: Duration) -> Self {
        Self {
            query,
            interval,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// A handle to the latest-sample slot, for consumers that want the most
    /// recent cluster view without issuing a query of their own.
    pub fn latest(&self) -> Arc<RwLock<Option<ClusterSample>>> {
        self.latest.clone()
    }

    /// Samples on the configured interval until shutdown. Failed samples
    /// are logged and skipped; the next tick retries.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval = ?self.interval, "cluster observer started");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sample().await {
                        warn!("cluster observation failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("cluster observer shutting down");
                    return;
                }
            }
        }
    }

    async fn sample(&self) -> Result<(), ScaleGuardError> {
        let nodes = self.query.nodes().await?;

        // Drop series for nodes that have left the cluster.
        metrics::NODE_HEAP_RATIO.reset();
        metrics::NODE_LOAD1.reset();
        metrics::NODE_FS_AVAILABLE_BYTES.reset();
        metrics::NODE_SHARDS.reset();

        let mut excluded = 0u64;
        for (name, node) in &nodes {
            if let Some(jvm) = &node.stats.jvm {
                if jvm.mem.heap_max_in_bytes > 0 {
                    let ratio =
                        jvm.mem.heap_used_in_bytes as f64 / jvm.mem.heap_max_in_bytes as f64;
                    metrics::NODE_HEAP_RATIO.with_label_values(&[name]).set(ratio);
                }
            }
            if let Some(load) = node
                .stats
                .os
                .as_ref()
                .and_then(|os| os.cpu.as_ref())
                .and_then(|cpu| cpu.load_average.as_ref())
            {
                metrics::NODE_LOAD1.with_label_values(&[name]).set(load.one);
            }
            if let Some(fs) = node.stats.fs.as_ref().and_then(|fs| fs.total.as_ref()) {
                metrics::NODE_FS_AVAILABLE_BYTES
                    .with_label_values(&[name])
                    .set(fs.available_in_bytes as f64);
            }
            metrics::NODE_SHARDS
                .with_label_values(&[name])
                .set(node.shards.len() as f64);
            if node.excluded_from_shard_allocation {
                excluded += 1;
            }
        }
        metrics::NODES_EXCLUDED.set(excluded as f64);

        *self.latest.write() = Some(ClusterSample {
            at: Utc::now(),
            nodes,
        });
        Ok(())
    }
}
