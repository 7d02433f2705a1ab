// src/server/context.rs

//! The assembled state everything after initialization works from.

use crate::config::Config;
use crate::core::lifecycle::LifecycleOrchestrator;
use crate::core::queue::Dispatcher;
use crate::core::tasks::ClusterObserverTask;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

pub struct ServerContext {
    pub config: Config,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub dispatcher: Dispatcher,
    pub observer: Option<ClusterObserverTask>,
    /// Broadcast channel every background task subscribes to for shutdown.
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<()>>,
}
