// src/core/lifecycle/keep_alive.rs

//! The per-event keep-alive loop.
//!
//! A single timer fires `comm_buffer` before the event's `timeout_at`. At
//! each boundary the condition is evaluated; while it holds false, a
//! heartbeat postpones the hook and the timer is rearmed. `comm_buffer`
//! reserves time for the condition evaluation and the heartbeat round trip,
//! and must be strictly less than the hook's per-heartbeat timeout.

use crate::core::cloud::AutoScalingApi;
use crate::core::errors::ScaleGuardError;
use crate::core::events::LifecycleEvent;
use crate::core::lifecycle::conditions::AdmissionCondition;
use crate::core::metrics;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a keep-alive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveStatus {
    /// The condition passed.
    Completed,
    /// The hook ran out of budget before the condition passed.
    Expired,
    /// The ambient context was cancelled; the message will be retried.
    Cancelled,
}

pub struct KeepAlive {
    autoscaling: Arc<dyn AutoScalingApi>,
    comm_buffer: Duration,
}

impl KeepAlive {
    pub fn new(autoscaling: Arc<dyn AutoScalingApi>, comm_buffer: Duration) -> Self {
        Self {
            autoscaling,
            comm_buffer,
        }
    }

    /// Runs the loop for one event. The condition, the heartbeat call, and
    /// the timer all honor `cancel`; cancellation is not an error.
    pub async fn keep_alive(
        &self,
        cancel: &CancellationToken,
        event: &mut LifecycleEvent,
        condition: &dyn AdmissionCondition,
    ) -> Result<KeepAliveStatus, ScaleGuardError> {
        if self.comm_buffer >= event.heartbeat_timeout {
            return Err(ScaleGuardError::InvalidConfig(format!(
                "comm_buffer {:?} must be below the hook's heartbeat timeout {:?}",
                self.comm_buffer, event.heartbeat_timeout
            )));
        }
        let comm_buffer = TimeDelta::from_std(self.comm_buffer).unwrap_or(TimeDelta::MAX);

        loop {
            let wake_at = event.timeout_at() - comm_buffer;
            let sleep_for = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(KeepAliveStatus::Cancelled),
                _ = tokio::time::sleep(sleep_for) => {}
            }

            let holds = tokio::select! {
                _ = cancel.cancelled() => return Ok(KeepAliveStatus::Cancelled),
                res = condition.check(event) => res?,
            };
            if holds {
                return Ok(KeepAliveStatus::Completed);
            }

            event.record_heartbeat();
            if event.timeout_at() - comm_buffer <= Utc::now() {
                return Ok(KeepAliveStatus::Expired);
            }

            let heartbeat = tokio::select! {
                _ = cancel.cancelled() => return Ok(KeepAliveStatus::Cancelled),
                res = self.autoscaling.record_heartbeat(
                    &event.group,
                    &event.hook,
                    &event.token,
                    &event.instance_id,
                ) => res,
            };
            if let Err(e) = heartbeat {
                event.revert_heartbeat();
                return Err(e);
            }
            metrics::HEARTBEATS_TOTAL
                .with_label_values(&[&event.group])
                .inc();
            info!(
                group = %event.group,
                hook = %event.hook,
                instance = %event.instance_id,
                token = %event.token,
                heartbeats = event.heartbeat_count,
                timeout_at = %event.timeout_at(),
                "recorded lifecycle heartbeat"
            );
            debug!(wake_at = %(event.timeout_at() - comm_buffer), "rearmed keep-alive timer");
        }
    }
}
