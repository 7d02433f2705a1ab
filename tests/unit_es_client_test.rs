use scaleguard::core::ScaleGuardError;
use scaleguard::core::elasticsearch::{ElasticsearchApi, HttpElasticsearchClient};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> HttpElasticsearchClient {
    HttpElasticsearchClient::new(Url::parse(&server.uri()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_exclusion_settings_request_and_merge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/settings"))
        .and(query_param(
            "filter_path",
            "*.cluster.routing.allocation.exclude.*",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "persistent": {"cluster": {"routing": {"allocation": {"exclude": {
                "_name": "stale",
            }}}}},
            "transient": {"cluster": {"routing": {"allocation": {"exclude": {
                "_name": "i-abc,i-def",
                "_ip": "10.0.0.9",
            }}}}},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = client_for(&server).await.exclusion_settings().await.unwrap();
    assert_eq!(settings.name, vec!["i-abc", "i-def"]);
    assert_eq!(settings.ip, vec!["10.0.0.9"]);
}

#[tokio::test]
async fn test_transient_settings_write_body() {
    let server = MockServer::start().await;
    let body = json!({
        "transient": {
            "cluster.routing.allocation.exclude._name": "i-abc",
            "cluster.routing.allocation.exclude._host": null,
            "cluster.routing.allocation.exclude._ip": null,
        }
    });
    Mock::given(method("PUT"))
        .and(path("/_cluster/settings"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .await
        .update_transient_settings(body.clone())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cat_shards_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cat/shards"))
        .and(query_param("h", "*"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"index": "logs", "shard": "0", "prirep": "p", "state": "STARTED", "node": "i-abc"},
            {"index": "logs", "shard": "1", "prirep": "r", "state": "UNASSIGNED", "node": null},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let shards = client_for(&server).await.cat_shards().await.unwrap();
    assert_eq!(shards.len(), 2);
    assert_eq!(shards[0].node.as_deref(), Some("i-abc"));
    assert!(shards[1].node.is_none());
}

#[tokio::test]
async fn test_nodes_endpoints_use_wildcard_paths() {
    let server = MockServer::start().await;
    let empty = json!({"cluster_name": "test-cluster", "nodes": {}});
    Mock::given(method("GET"))
        .and(path("/_nodes/*/_all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_nodes/*/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(client.nodes_info().await.unwrap().cluster_name, "test-cluster");
    assert!(client.nodes_stats().await.unwrap().nodes.is_empty());
}

#[tokio::test]
async fn test_voting_exclusion_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_cluster/voting_config_exclusions/i-abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/_cluster/voting_config_exclusions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.add_voting_exclusion("i-abc").await.unwrap();
    client.clear_voting_exclusions().await.unwrap();
}

#[tokio::test]
async fn test_missing_snapshot_repository_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_snapshot/backups"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"type": "repository_missing_exception"}, "status": 404
        })))
        .mount(&server)
        .await;

    let repo = client_for(&server)
        .await
        .snapshot_repository("backups")
        .await
        .unwrap();
    assert!(repo.is_none());
}

#[tokio::test]
async fn test_existing_snapshot_repository_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_snapshot/backups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "backups": {"type": "s3", "settings": {"bucket": "es-backups"}}
        })))
        .mount(&server)
        .await;

    let repo = client_for(&server)
        .await
        .snapshot_repository("backups")
        .await
        .unwrap()
        .expect("repository should exist");
    assert_eq!(repo.kind, "s3");
}

#[tokio::test]
async fn test_create_snapshot_waits_for_completion() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/_snapshot/backups/snap-1"))
        .and(query_param("wait_for_completion", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshot": {}})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .await
        .create_snapshot("backups", "snap-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster down"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.cluster_health().await.unwrap_err();
    assert!(matches!(
        err,
        ScaleGuardError::Elasticsearch { status: 503, body } if body == "cluster down"
    ));
}
