// src/core/cloud/aws.rs

//! AWS SDK implementations of the cloud seams: SQS for the work queue and
//! the Auto Scaling API for lifecycle hooks.

use super::api::{AutoScalingApi, MessageQueue};
use super::{HookTimeouts, QueueMessage};
use crate::core::errors::ScaleGuardError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// The SQS-backed queue, bound to a single queue URL.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

fn queue_err<E: std::error::Error + Send + Sync + 'static>(
    e: aws_sdk_sqs::error::SdkError<E>,
) -> ScaleGuardError {
    ScaleGuardError::Queue(format!("{}", aws_sdk_sqs::error::DisplayErrorContext(e)))
}

fn asg_err<E: std::error::Error + Send + Sync + 'static>(
    e: aws_sdk_autoscaling::error::SdkError<E>,
) -> ScaleGuardError {
    ScaleGuardError::CloudApi(format!(
        "{}",
        aws_sdk_autoscaling::error::DisplayErrorContext(e)
    ))
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, ScaleGuardError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait.as_secs() as i32)
            .visibility_timeout(visibility_timeout.as_secs() as i32)
            .send()
            .await
            .map_err(queue_err)?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                // A message without a body or receipt handle is undeliverable.
                Some(QueueMessage {
                    body: m.body?,
                    receipt_handle: m.receipt_handle?,
                })
            })
            .collect();
        Ok(messages)
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), ScaleGuardError> {
        debug!(timeout = ?timeout, "changing message visibility");
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout.as_secs() as i32)
            .send()
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), ScaleGuardError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn send(&self, body: String) -> Result<(), ScaleGuardError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(queue_err)?;
        Ok(())
    }
}

/// The Auto Scaling-backed lifecycle API.
pub struct AwsAutoScaling {
    client: aws_sdk_autoscaling::Client,
}

impl AwsAutoScaling {
    pub fn new(client: aws_sdk_autoscaling::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AutoScalingApi for AwsAutoScaling {
    async fn hook_timeouts(
        &self,
        group: &str,
        hook: &str,
    ) -> Result<HookTimeouts, ScaleGuardError> {
        let output = self
            .client
            .describe_lifecycle_hooks()
            .auto_scaling_group_name(group)
            .lifecycle_hook_names(hook)
            .send()
            .await
            .map_err(asg_err)?;

        let described = output
            .lifecycle_hooks
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                ScaleGuardError::CloudApi(format!("lifecycle hook '{hook}' not found on '{group}'"))
            })?;

        let heartbeat = described.heartbeat_timeout.ok_or_else(|| {
            ScaleGuardError::CloudApi(format!("hook '{hook}' has no heartbeat timeout"))
        })?;
        let global = described.global_timeout.ok_or_else(|| {
            ScaleGuardError::CloudApi(format!("hook '{hook}' has no global timeout"))
        })?;

        Ok(HookTimeouts {
            heartbeat: Duration::from_secs(heartbeat.max(0) as u64),
            global: Duration::from_secs(global.max(0) as u64),
        })
    }

    async fn record_heartbeat(
        &self,
        group: &str,
        hook: &str,
        token: &str,
        instance_id: &str,
    ) -> Result<(), ScaleGuardError> {
        self.client
            .record_lifecycle_action_heartbeat()
            .auto_scaling_group_name(group)
            .lifecycle_hook_name(hook)
            .lifecycle_action_token(token)
            .instance_id(instance_id)
            .send()
            .await
            .map_err(asg_err)?;
        Ok(())
    }

    async fn complete_lifecycle_action(
        &self,
        group: &str,
        hook: &str,
        token: &str,
        instance_id: &str,
        result: &str,
    ) -> Result<(), ScaleGuardError> {
        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(group)
            .lifecycle_hook_name(hook)
            .lifecycle_action_token(token)
            .instance_id(instance_id)
            .lifecycle_action_result(result)
            .send()
            .await
            .map_err(asg_err)?;
        Ok(())
    }
}
