// src/core/events.rs

//! The lifecycle-event model and the queue-message decoder.
//!
//! A queue message describes a pending scale-in/scale-out hook. Decoding
//! validates the wire fields and resolves the hook's timeout budget from
//! the cloud control plane, since the message itself does not carry it.

use crate::core::cloud::AutoScalingApi;
use crate::core::errors::ScaleGuardError;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Marks a setup-time probe message; acked without side effects.
pub const TEST_NOTIFICATION_EVENT: &str = "autoscaling:TEST_NOTIFICATION";

const TRANSITION_LAUNCHING: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";
const TRANSITION_TERMINATING: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    Launching,
    Terminating,
}

impl LifecycleTransition {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            LifecycleTransition::Launching => TRANSITION_LAUNCHING,
            LifecycleTransition::Terminating => TRANSITION_TERMINATING,
        }
    }
}

/// A pending scaling action paused by its lifecycle hook.
///
/// Immutable once decoded, except for `heartbeat_count`, which the
/// keep-alive loop increments on each successful heartbeat.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub account_id: String,
    pub group: String,
    pub instance_id: String,
    pub hook: String,
    /// One-time identifier authenticating heartbeats and completion.
    pub token: String,
    pub transition: LifecycleTransition,
    pub start: DateTime<Utc>,
    pub heartbeat_timeout: Duration,
    pub global_timeout: Duration,
    pub heartbeat_count: u32,
}

impl LifecycleEvent {
    /// When the hook expires given the heartbeats recorded so far:
    /// `start + (heartbeat_count + 1) × heartbeat_timeout`, never past
    /// `start + global_timeout`.
    pub fn timeout_at(&self) -> DateTime<Utc> {
        let budget = (self.heartbeat_timeout * (self.heartbeat_count + 1)).min(self.global_timeout);
        self.start + TimeDelta::from_std(budget).unwrap_or(TimeDelta::MAX)
    }

    /// The hook's absolute deadline regardless of heartbeats.
    pub fn global_timeout_at(&self) -> DateTime<Utc> {
        self.start + TimeDelta::from_std(self.global_timeout).unwrap_or(TimeDelta::MAX)
    }

    pub fn record_heartbeat(&mut self) {
        self.heartbeat_count += 1;
    }

    pub fn revert_heartbeat(&mut self) {
        self.heartbeat_count = self.heartbeat_count.saturating_sub(1);
    }

    /// Serializes the event back into the queue wire format, carrying
    /// `HeartbeatCount` so a re-enqueued event resumes where it left off.
    pub fn to_message_body(&self) -> String {
        json!({
            "AccountId": self.account_id,
            "AutoScalingGroupName": self.group,
            "LifecycleHookName": self.hook,
            "LifecycleActionToken": self.token,
            "EC2InstanceId": self.instance_id,
            "LifecycleTransition": self.transition.as_wire_str(),
            "Time": self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            "HeartbeatCount": self.heartbeat_count,
        })
        .to_string()
    }
}

/// A successfully decoded queue message.
#[derive(Debug)]
pub enum DecodedMessage {
    Event(LifecycleEvent),
    /// A probe message; the caller acks it and moves on.
    TestNotification,
}

/// Every wire field is optional at this stage; which ones are required
/// depends on whether the message is a probe.
#[derive(Debug, Deserialize)]
struct RawLifecycleMessage {
    #[serde(rename = "AccountId")]
    account_id: Option<String>,
    #[serde(rename = "AutoScalingGroupName")]
    group: Option<String>,
    #[serde(rename = "LifecycleHookName")]
    hook: Option<String>,
    #[serde(rename = "LifecycleActionToken")]
    token: Option<String>,
    #[serde(rename = "EC2InstanceId")]
    instance_id: Option<String>,
    #[serde(rename = "LifecycleTransition")]
    transition: Option<String>,
    #[serde(rename = "Time")]
    time: Option<String>,
    #[serde(rename = "Event")]
    event: Option<String>,
    #[serde(rename = "HeartbeatCount")]
    heartbeat_count: Option<u32>,
}

fn require(field: Option<String>, name: &str) -> Result<String, ScaleGuardError> {
    field.ok_or_else(|| ScaleGuardError::MessageDecode(format!("missing field {name}")))
}

/// Decodes raw queue-message bodies, resolving hook timeouts on demand.
pub struct EventDecoder {
    autoscaling: Arc<dyn AutoScalingApi>,
}

impl EventDecoder {
    pub fn new(autoscaling: Arc<dyn AutoScalingApi>) -> Self {
        Self { autoscaling }
    }

    /// Decodes one message body.
    ///
    /// Probe messages are recognized before any field validation or control
    /// plane call, so a test notification never touches the hook-describe
    /// endpoint. An unrecognized `LifecycleTransition` is
    /// [`ScaleGuardError::UnknownTransition`].
    pub async fn decode(&self, body: &str) -> Result<DecodedMessage, ScaleGuardError> {
        let raw: RawLifecycleMessage = serde_json::from_str(body)?;

        if raw.event.as_deref() == Some(TEST_NOTIFICATION_EVENT) {
            return Ok(DecodedMessage::TestNotification);
        }

        let transition = match raw.transition.as_deref() {
            Some(TRANSITION_LAUNCHING) => LifecycleTransition::Launching,
            Some(TRANSITION_TERMINATING) => LifecycleTransition::Terminating,
            Some(other) => return Err(ScaleGuardError::UnknownTransition(other.to_string())),
            None => {
                return Err(ScaleGuardError::MessageDecode(
                    "missing field LifecycleTransition".to_string(),
                ));
            }
        };

        let group = require(raw.group, "AutoScalingGroupName")?;
        let hook = require(raw.hook, "LifecycleHookName")?;
        let token = require(raw.token, "LifecycleActionToken")?;
        let instance_id = require(raw.instance_id, "EC2InstanceId")?;
        let time = require(raw.time, "Time")?;
        let start = DateTime::parse_from_rfc3339(&time)?.with_timezone(&Utc);

        let timeouts = self.autoscaling.hook_timeouts(&group, &hook).await?;

        Ok(DecodedMessage::Event(LifecycleEvent {
            account_id: raw.account_id.unwrap_or_default(),
            group,
            instance_id,
            hook,
            token,
            transition,
            start,
            heartbeat_timeout: timeouts.heartbeat,
            global_timeout: timeouts.global,
            heartbeat_count: raw.heartbeat_count.unwrap_or(0),
        }))
    }
}
