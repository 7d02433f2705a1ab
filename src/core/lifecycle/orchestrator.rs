// src/core/lifecycle/orchestrator.rs

//! Wires the keep-alive loop over the queue dispatcher: decodes each
//! message, prepares cluster state for the scaling action, waits for the
//! admission condition, and unwinds its changes afterwards.

use crate::core::cloud::{AutoScalingApi, MessageQueue, QueueMessage};
use crate::core::elasticsearch::{ClusterCommand, ClusterQuery};
use crate::core::errors::ScaleGuardError;
use crate::core::events::{DecodedMessage, EventDecoder, LifecycleEvent, LifecycleTransition};
use crate::core::lifecycle::conditions::{AdmissionCondition, LaunchCondition, TerminateCondition};
use crate::core::lifecycle::keep_alive::{KeepAlive, KeepAliveStatus};
use crate::core::metrics;
use crate::core::queue::MessageHandler;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cluster-side changes to unwind, in the order they were made; executed in
/// reverse.
#[derive(Debug)]
enum RollbackStep {
    Undrain { node: String },
    ReleaseVotingExclusion,
}

/// Reference count of master-voting exclusions held by in-flight
/// orchestrations. The cluster only offers a clear-all endpoint, so the
/// last holder out clears for everyone; the mutex spans the clear call to
/// keep release and clearance atomic with respect to concurrent holders.
struct VotingExclusions {
    held: Mutex<u64>,
}

impl VotingExclusions {
    fn new() -> Self {
        Self { held: Mutex::new(0) }
    }

    async fn acquire(&self) {
        let mut held = self.held.lock().await;
        *held += 1;
        metrics::VOTING_EXCLUSIONS_HELD.set(*held as f64);
    }

    async fn release(&self, command: &ClusterCommand) -> Result<(), ScaleGuardError> {
        let mut held = self.held.lock().await;
        *held = held.saturating_sub(1);
        metrics::VOTING_EXCLUSIONS_HELD.set(*held as f64);
        if *held == 0 {
            command.clear_voting_exclusions().await?;
        }
        Ok(())
    }
}

pub struct OrchestratorOptions {
    /// Refuse to re-enqueue a partially handled event whose remaining
    /// global-timeout budget is below this margin.
    pub reenqueue_safety_margin: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            reenqueue_safety_margin: Duration::from_secs(10),
        }
    }
}

/// The per-message handler the dispatcher runs.
pub struct LifecycleOrchestrator {
    decoder: EventDecoder,
    query: Arc<ClusterQuery>,
    command: Arc<ClusterCommand>,
    autoscaling: Arc<dyn AutoScalingApi>,
    queue: Arc<dyn MessageQueue>,
    keep_alive: KeepAlive,
    voting: VotingExclusions,
    options: OrchestratorOptions,
}

impl LifecycleOrchestrator {
    pub fn new(
        query: Arc<ClusterQuery>,
        command: Arc<ClusterCommand>,
        autoscaling: Arc<dyn AutoScalingApi>,
        queue: Arc<dyn MessageQueue>,
        keep_alive: KeepAlive,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            decoder: EventDecoder::new(autoscaling.clone()),
            query,
            command,
            autoscaling,
            queue,
            keep_alive,
            voting: VotingExclusions::new(),
            options,
        }
    }

    /// Prepares cluster state for a terminating node and returns the
    /// matching condition, or None when the node has already left the
    /// cluster.
    async fn prepare_terminating(
        &self,
        event: &LifecycleEvent,
        rollback: &mut Vec<RollbackStep>,
    ) -> Result<Option<TerminateCondition>, ScaleGuardError> {
        let Some(node) = self.query.node(&event.instance_id).await? else {
            return Ok(None);
        };

        self.command.drain(&node.name).await?;
        rollback.push(RollbackStep::Undrain {
            node: node.name.clone(),
        });

        if node.is_master_eligible() {
            self.command.exclude_from_voting(&node.name).await?;
            self.voting.acquire().await;
            rollback.push(RollbackStep::ReleaseVotingExclusion);
        }

        Ok(Some(TerminateCondition::new(
            self.query.clone(),
            node.name,
        )))
    }

    /// Unwinds the rollback stack in reverse order. Any failure here leaves
    /// the cluster in an unknown state and must abort the process.
    async fn run_rollbacks(
        &self,
        rollback: &mut Vec<RollbackStep>,
    ) -> Result<(), ScaleGuardError> {
        while let Some(step) = rollback.pop() {
            let result = match &step {
                RollbackStep::Undrain { node } => self.command.undrain(node).await,
                RollbackStep::ReleaseVotingExclusion => self.voting.release(&self.command).await,
            };
            if let Err(e) = result {
                return Err(ScaleGuardError::RollbackFailed(format!("{step:?}: {e}")));
            }
        }
        Ok(())
    }

    /// Disposition for a generic keep-alive error. With recorded heartbeats
    /// the event is re-enqueued (carrying its count) and the original
    /// deleted, so progress survives the restart the propagated error is
    /// about to cause. Without heartbeats, or too close to the hook's
    /// global deadline, the message is left for redelivery.
    async fn dispose_error(
        &self,
        cause: ScaleGuardError,
        event: &LifecycleEvent,
        message: &QueueMessage,
    ) -> Result<(), ScaleGuardError> {
        if event.heartbeat_count == 0 {
            return Err(cause);
        }

        let margin =
            TimeDelta::from_std(self.options.reenqueue_safety_margin).unwrap_or(TimeDelta::MAX);
        if event.global_timeout_at() - Utc::now() < margin {
            warn!(
                group = %event.group,
                hook = %event.hook,
                instance = %event.instance_id,
                "hook nearly at global timeout, not re-enqueueing"
            );
            return Err(cause);
        }

        if let Err(send_err) = self.queue.send(event.to_message_body()).await {
            error!(error = %send_err, "failed to re-enqueue event, leaving original for redelivery");
            return Err(cause);
        }
        if let Err(delete_err) = self.queue.delete(&message.receipt_handle).await {
            error!(error = %delete_err, "failed to delete re-enqueued event's original message");
            return Err(cause);
        }
        metrics::LIFECYCLE_EVENTS_TOTAL
            .with_label_values(&["reenqueued"])
            .inc();
        warn!(
            group = %event.group,
            hook = %event.hook,
            instance = %event.instance_id,
            token = %event.token,
            heartbeats = event.heartbeat_count,
            error = %cause,
            "re-enqueued partially handled event"
        );
        Err(cause)
    }
}

#[async_trait]
impl MessageHandler for LifecycleOrchestrator {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        message: &QueueMessage,
    ) -> Result<(), ScaleGuardError> {
        let mut event = match self.decoder.decode(&message.body).await {
            Ok(DecodedMessage::Event(event)) => event,
            Ok(DecodedMessage::TestNotification) => {
                info!("test notification received, acking");
                metrics::LIFECYCLE_EVENTS_TOTAL
                    .with_label_values(&["test_notification"])
                    .inc();
                return Ok(());
            }
            Err(ScaleGuardError::UnknownTransition(transition)) => {
                error!(transition = %transition, "unknown lifecycle transition, dropping message");
                metrics::LIFECYCLE_EVENTS_TOTAL
                    .with_label_values(&["unknown_transition"])
                    .inc();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        info!(
            group = %event.group,
            hook = %event.hook,
            instance = %event.instance_id,
            token = %event.token,
            transition = ?event.transition,
            heartbeats = event.heartbeat_count,
            "handling lifecycle event"
        );

        let mut rollback = Vec::new();
        let condition: Box<dyn AdmissionCondition> = match event.transition {
            LifecycleTransition::Terminating => {
                match self.prepare_terminating(&event, &mut rollback).await? {
                    Some(condition) => Box::new(condition),
                    None => {
                        info!(
                            instance = %event.instance_id,
                            "node already absent from cluster, acking"
                        );
                        metrics::LIFECYCLE_EVENTS_TOTAL
                            .with_label_values(&["node_absent"])
                            .inc();
                        return Ok(());
                    }
                }
            }
            LifecycleTransition::Launching => {
                Box::new(LaunchCondition::new(self.query.clone()))
            }
        };

        match self
            .keep_alive
            .keep_alive(cancel, &mut event, condition.as_ref())
            .await
        {
            Ok(KeepAliveStatus::Completed) => {
                if let Err(e) = self
                    .autoscaling
                    .complete_lifecycle_action(
                        &event.group,
                        &event.hook,
                        &event.token,
                        &event.instance_id,
                        "CONTINUE",
                    )
                    .await
                {
                    return self.dispose_error(e, &event, message).await;
                }
                self.run_rollbacks(&mut rollback).await?;
                metrics::LIFECYCLE_EVENTS_TOTAL
                    .with_label_values(&["completed"])
                    .inc();
                info!(
                    group = %event.group,
                    hook = %event.hook,
                    instance = %event.instance_id,
                    token = %event.token,
                    "lifecycle event completed"
                );
                Ok(())
            }
            Ok(KeepAliveStatus::Expired) => {
                warn!(
                    group = %event.group,
                    hook = %event.hook,
                    instance = %event.instance_id,
                    token = %event.token,
                    "hook expired before the cluster reached a safe state, acking"
                );
                metrics::LIFECYCLE_EVENTS_TOTAL
                    .with_label_values(&["expired"])
                    .inc();
                Ok(())
            }
            Ok(KeepAliveStatus::Cancelled) => Err(ScaleGuardError::Cancelled),
            Err(e) => self.dispose_error(e, &event, message).await,
        }
    }
}
