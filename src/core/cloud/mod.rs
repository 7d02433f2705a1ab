// src/core/cloud/mod.rs

//! Narrow contracts for the cloud control plane: the managed work queue and
//! the auto-scaling lifecycle API, plus their AWS SDK implementations.

use std::time::Duration;

pub mod api;
pub mod aws;

pub use api::{AutoScalingApi, MessageQueue};
pub use aws::{AwsAutoScaling, SqsQueue};

/// One message received from the managed queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Raw message body, expected to be a JSON lifecycle notification.
    pub body: String,
    /// Opaque handle that authenticates visibility changes and deletion for
    /// this delivery of the message.
    pub receipt_handle: String,
}

/// The two timeout knobs of a lifecycle hook, resolved from the control
/// plane (they are not carried in the queue message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookTimeouts {
    /// How far one heartbeat postpones the hook's expiry.
    pub heartbeat: Duration,
    /// The absolute ceiling on the hook's lifetime, heartbeats or not.
    pub global: Duration,
}
