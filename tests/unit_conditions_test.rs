mod common;

use chrono::Utc;
use common::{FanoutFixture, MockElasticsearch, cat_shard, green_health, node_info, relocating_health};
use scaleguard::core::elasticsearch::ClusterQuery;
use scaleguard::core::events::{LifecycleEvent, LifecycleTransition};
use scaleguard::core::lifecycle::conditions::{
    AdmissionCondition, LaunchCondition, TerminateCondition,
};
use std::sync::Arc;
use std::time::Duration;

fn event(transition: LifecycleTransition) -> LifecycleEvent {
    LifecycleEvent {
        account_id: "123456789012".into(),
        group: "es-data".into(),
        instance_id: "i-abc".into(),
        hook: "drain".into(),
        token: "tok-1".into(),
        transition,
        start: Utc::now(),
        heartbeat_timeout: Duration::from_secs(300),
        global_timeout: Duration::from_secs(3600),
        heartbeat_count: 0,
    }
}

fn cluster_with_node(shards: Vec<scaleguard::core::elasticsearch::types::CatShard>) -> Arc<MockElasticsearch> {
    Arc::new(MockElasticsearch::with_fanouts(vec![FanoutFixture::cluster(
        vec![(node_info("i-abc", &["master", "data"]), shards)],
    )]))
}

#[tokio::test]
async fn test_terminate_holds_when_node_is_empty_and_cluster_green() {
    let es = cluster_with_node(Vec::new());
    let condition = TerminateCondition::new(Arc::new(ClusterQuery::new(es)), "i-abc".into());

    assert!(condition.check(&event(LifecycleTransition::Terminating)).await.unwrap());
}

#[tokio::test]
async fn test_terminate_waits_while_node_still_holds_shards() {
    let es = cluster_with_node(vec![cat_shard("logs", "0", "i-abc")]);
    let condition = TerminateCondition::new(Arc::new(ClusterQuery::new(es)), "i-abc".into());

    assert!(!condition.check(&event(LifecycleTransition::Terminating)).await.unwrap());
}

#[tokio::test]
async fn test_terminate_waits_while_shards_are_moving() {
    let es = cluster_with_node(Vec::new());
    es.push_health(relocating_health());
    let condition = TerminateCondition::new(Arc::new(ClusterQuery::new(es)), "i-abc".into());

    assert!(!condition.check(&event(LifecycleTransition::Terminating)).await.unwrap());
}

#[tokio::test]
async fn test_terminate_treats_health_timeout_as_transient() {
    let es = cluster_with_node(Vec::new());
    let mut timed_out = green_health();
    timed_out.timed_out = true;
    es.push_health(timed_out);
    let condition = TerminateCondition::new(Arc::new(ClusterQuery::new(es)), "i-abc".into());

    // Not an error: try again at the next boundary.
    assert!(!condition.check(&event(LifecycleTransition::Terminating)).await.unwrap());
}

#[tokio::test]
async fn test_terminate_passes_for_a_node_already_gone() {
    let es = Arc::new(MockElasticsearch::with_fanouts(vec![FanoutFixture::cluster(
        vec![(node_info("i-other", &["data"]), Vec::new())],
    )]));
    let condition = TerminateCondition::new(Arc::new(ClusterQuery::new(es)), "i-abc".into());

    assert!(condition.check(&event(LifecycleTransition::Terminating)).await.unwrap());
}

#[tokio::test]
async fn test_launch_ignores_per_node_shards() {
    let es = cluster_with_node(vec![cat_shard("logs", "0", "i-abc")]);
    let condition = LaunchCondition::new(Arc::new(ClusterQuery::new(es)));

    assert!(condition.check(&event(LifecycleTransition::Launching)).await.unwrap());
}

#[tokio::test]
async fn test_launch_waits_for_cluster_stability() {
    let es = cluster_with_node(Vec::new());
    es.push_health(relocating_health());
    let condition = LaunchCondition::new(Arc::new(ClusterQuery::new(es)));

    assert!(!condition.check(&event(LifecycleTransition::Launching)).await.unwrap());
}
