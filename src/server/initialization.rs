// src/server/initialization.rs

//! Builds the clients and services and assembles the server context.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::cloud::{AutoScalingApi, AwsAutoScaling, MessageQueue, SqsQueue};
use crate::core::elasticsearch::{
    ClusterCommand, ClusterQuery, ElasticsearchApi, HttpElasticsearchClient,
};
use crate::core::lifecycle::orchestrator::OrchestratorOptions;
use crate::core::lifecycle::{KeepAlive, LifecycleOrchestrator};
use crate::core::queue::{Dispatcher, DispatcherOptions};
use crate::core::tasks::ClusterObserverTask;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

pub async fn setup(config: Config) -> Result<ServerContext> {
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let queue: Arc<dyn MessageQueue> = Arc::new(SqsQueue::new(
        aws_sdk_sqs::Client::new(&aws),
        config.queue.url.clone(),
    ));
    let autoscaling: Arc<dyn AutoScalingApi> =
        Arc::new(AwsAutoScaling::new(aws_sdk_autoscaling::Client::new(&aws)));

    let es: Arc<dyn ElasticsearchApi> =
        Arc::new(HttpElasticsearchClient::new(config.elasticsearch.url.clone())?);
    let cluster_query = Arc::new(ClusterQuery::new(es.clone()));
    let cluster_command = Arc::new(ClusterCommand::new(es));

    let keep_alive = KeepAlive::new(autoscaling.clone(), config.lifecycle.comm_buffer);
    let orchestrator = Arc::new(LifecycleOrchestrator::new(
        cluster_query.clone(),
        cluster_command,
        autoscaling,
        queue.clone(),
        keep_alive,
        OrchestratorOptions {
            reenqueue_safety_margin: config.lifecycle.reenqueue_safety_margin,
        },
    ));

    let dispatcher = Dispatcher::new(
        queue,
        DispatcherOptions {
            max_concurrent: config.dispatcher.max_concurrent,
            poll_interval: config.dispatcher.poll_interval,
            initial_visibility_timeout: config.dispatcher.initial_visibility_timeout,
            max_visibility_timeout: config.dispatcher.max_visibility_timeout,
            comm_buffer: config.dispatcher.comm_buffer,
        },
    )?;

    let observer = config
        .observer
        .enabled
        .then(|| ClusterObserverTask::new(cluster_query, config.observer.interval));

    info!(
        cluster = %config.elasticsearch.url,
        queue = %config.queue.url,
        "ScaleGuard initialized"
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    Ok(ServerContext {
        config,
        orchestrator,
        dispatcher,
        observer,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}
