// src/core/cloud/api.rs

//! The seam traits production and test implementations share.

use super::{HookTimeouts, QueueMessage};
use crate::core::errors::ScaleGuardError;
use async_trait::async_trait;
use std::time::Duration;

/// A managed work queue with per-delivery visibility control.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-polls for up to `max_messages` messages, waiting at most `wait`,
    /// hiding each delivery for `visibility_timeout`.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, ScaleGuardError>;

    /// Resets the delivery's visibility timeout to `timeout` from now.
    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), ScaleGuardError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), ScaleGuardError>;

    /// Enqueues a fresh message (used to re-enqueue partially handled
    /// lifecycle events).
    async fn send(&self, body: String) -> Result<(), ScaleGuardError>;
}

/// The auto-scaling lifecycle-hook API.
#[async_trait]
pub trait AutoScalingApi: Send + Sync {
    /// Resolves a hook's per-heartbeat and global timeouts.
    async fn hook_timeouts(&self, group: &str, hook: &str)
    -> Result<HookTimeouts, ScaleGuardError>;

    /// Postpones the hook's expiry by its per-heartbeat increment.
    async fn record_heartbeat(
        &self,
        group: &str,
        hook: &str,
        token: &str,
        instance_id: &str,
    ) -> Result<(), ScaleGuardError>;

    /// Tells the control plane to proceed with the paused scaling action.
    async fn complete_lifecycle_action(
        &self,
        group: &str,
        hook: &str,
        token: &str,
        instance_id: &str,
        result: &str,
    ) -> Result<(), ScaleGuardError>;
}
