// src/core/metrics.rs

//! Prometheus metrics for the control plane.
//!
//! Registered once in the process-global registry so the dispatcher, the
//! keep-alive loops, and the observer can record without threading handles
//! around.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};

lazy_static! {
    // --- Dispatcher ---
    /// The number of queue messages currently being handled.
    pub static ref MESSAGES_IN_FLIGHT: Gauge =
        register_gauge!("scaleguard_messages_in_flight", "Number of queue messages currently being handled.").unwrap();
    /// The total number of queue messages received since startup.
    pub static ref MESSAGES_RECEIVED_TOTAL: Counter =
        register_counter!("scaleguard_messages_received_total", "Total number of queue messages received.").unwrap();
    /// The total number of queue messages deleted after successful handling.
    pub static ref MESSAGES_DELETED_TOTAL: Counter =
        register_counter!("scaleguard_messages_deleted_total", "Total number of queue messages deleted.").unwrap();
    /// The total number of visibility-timeout extensions issued.
    pub static ref VISIBILITY_EXTENSIONS_TOTAL: Counter =
        register_counter!("scaleguard_visibility_extensions_total", "Total number of visibility-timeout extensions issued.").unwrap();

    // --- Lifecycle ---
    /// The total number of lifecycle hook heartbeats recorded, labeled by auto-scaling group.
    pub static ref HEARTBEATS_TOTAL: CounterVec =
        register_counter_vec!("scaleguard_heartbeats_total", "Total number of lifecycle heartbeats recorded, labeled by group.", &["group"]).unwrap();
    /// The total number of lifecycle events that completed, labeled by outcome.
    pub static ref LIFECYCLE_EVENTS_TOTAL: CounterVec =
        register_counter_vec!("scaleguard_lifecycle_events_total", "Total number of lifecycle events handled, labeled by outcome.", &["outcome"]).unwrap();
    /// The total number of drain operations that issued a settings write.
    pub static ref DRAINS_TOTAL: Counter =
        register_counter!("scaleguard_drains_total", "Total number of shard-allocation drains written.").unwrap();
    /// The total number of undrain operations that issued a settings write.
    pub static ref UNDRAINS_TOTAL: Counter =
        register_counter!("scaleguard_undrains_total", "Total number of shard-allocation undrains written.").unwrap();
    /// The number of master-voting exclusions currently held by in-flight orchestrations.
    pub static ref VOTING_EXCLUSIONS_HELD: Gauge =
        register_gauge!("scaleguard_voting_exclusions_held", "Master-voting exclusions currently held.").unwrap();

    // --- Cluster observer ---
    /// Per-node JVM heap usage as a fraction of the configured maximum.
    pub static ref NODE_HEAP_RATIO: GaugeVec =
        register_gauge_vec!("scaleguard_node_heap_ratio", "JVM heap used over heap max, per node.", &["node"]).unwrap();
    /// Per-node one-minute load average.
    pub static ref NODE_LOAD1: GaugeVec =
        register_gauge_vec!("scaleguard_node_load1", "One-minute OS load average, per node.", &["node"]).unwrap();
    /// Per-node filesystem bytes still available.
    pub static ref NODE_FS_AVAILABLE_BYTES: GaugeVec =
        register_gauge_vec!("scaleguard_node_fs_available_bytes", "Filesystem bytes available, per node.", &["node"]).unwrap();
    /// Per-node count of assigned shards.
    pub static ref NODE_SHARDS: GaugeVec =
        register_gauge_vec!("scaleguard_node_shards", "Assigned shard count, per node.", &["node"]).unwrap();
    /// The number of nodes currently excluded from shard allocation.
    pub static ref NODES_EXCLUDED: Gauge =
        register_gauge!("scaleguard_nodes_excluded", "Nodes currently excluded from shard allocation.").unwrap();

    // --- Histograms ---
    /// A histogram of full cluster-query fan-out latencies.
    pub static ref CLUSTER_QUERY_SECONDS: Histogram =
        register_histogram!("scaleguard_cluster_query_seconds", "Latency of the cluster query fan-out in seconds.").unwrap();
}

/// Encodes every registered metric in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
