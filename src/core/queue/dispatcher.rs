// src/core/queue/dispatcher.rs

//! The dispatcher event loop.
//!
//! One task owns all dispatcher state (the in-flight map, the receive gate);
//! receives, handlers, extensions, and deletes run as worker tasks that
//! report back through channels. Every select arm below is non-blocking.

use super::visibility::{PostponeNotice, run_visibility_scheduler};
use crate::core::cloud::{MessageQueue, QueueMessage};
use crate::core::errors::ScaleGuardError;
use crate::core::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The queue's hard ceiling on messages returned by a single receive call.
pub const MAX_MESSAGES_PER_RECEIVE: usize = 10;

const CHANNEL_CAPACITY: usize = 32;

/// The work a dispatcher runs per message. Implementations must honor the
/// cancellation token; the dispatcher will not ack a message whose handler
/// returned an error.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        message: &QueueMessage,
    ) -> Result<(), ScaleGuardError>;
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Upper bound on concurrently handled messages. 0 means unbounded up
    /// to the per-call receive ceiling.
    pub max_concurrent: usize,
    /// Interval of the receive ticker, and the long-poll wait passed to the
    /// queue.
    pub poll_interval: Duration,
    /// Visibility timeout applied at receive time; the back-off's starting
    /// point.
    pub initial_visibility_timeout: Duration,
    /// Cap on the visibility back-off.
    pub max_visibility_timeout: Duration,
    /// Reserved round-trip time: extensions are scheduled this long before
    /// the current visibility timeout lapses.
    pub comm_buffer: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            poll_interval: Duration::from_secs(10),
            initial_visibility_timeout: Duration::from_secs(60),
            max_visibility_timeout: Duration::from_secs(900),
            comm_buffer: Duration::from_secs(5),
        }
    }
}

/// Event-loop-owned bookkeeping for one in-flight message.
struct InFlightMessage {
    /// Stops the per-message extension scheduler.
    scheduler_cancel: CancellationToken,
    /// Aborts the extension request currently in flight, if any. At most
    /// one extension request exists per receipt handle at any instant.
    extend_cancel: Option<CancellationToken>,
}

pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        options: DispatcherOptions,
    ) -> Result<Self, ScaleGuardError> {
        if options.poll_interval.is_zero() {
            return Err(ScaleGuardError::InvalidConfig(
                "dispatcher poll_interval must be non-zero".into(),
            ));
        }
        if options.comm_buffer.is_zero() {
            return Err(ScaleGuardError::InvalidConfig(
                "dispatcher comm_buffer must be non-zero".into(),
            ));
        }
        if options.comm_buffer >= options.initial_visibility_timeout {
            return Err(ScaleGuardError::InvalidConfig(format!(
                "comm_buffer {:?} must be below the initial visibility timeout {:?}",
                options.comm_buffer, options.initial_visibility_timeout
            )));
        }
        if options.initial_visibility_timeout > options.max_visibility_timeout {
            return Err(ScaleGuardError::InvalidConfig(format!(
                "initial visibility timeout {:?} exceeds the maximum {:?}",
                options.initial_visibility_timeout, options.max_visibility_timeout
            )));
        }
        Ok(Self { queue, options })
    }

    /// Messages a receive may ask for right now without oversubscribing.
    fn receive_capacity(&self, pending: usize) -> usize {
        if self.options.max_concurrent == 0 {
            MAX_MESSAGES_PER_RECEIVE
        } else {
            MAX_MESSAGES_PER_RECEIVE.min(self.options.max_concurrent.saturating_sub(pending))
        }
    }

    /// Runs the event loop until `cancel` fires or a worker fails.
    ///
    /// Returns the failure (or [`ScaleGuardError::Cancelled`] on shutdown)
    /// only after every spawned worker has exited.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ScaleGuardError> {
        // All workers descend from this token; cancelling it is the single
        // teardown signal.
        let work = cancel.child_token();
        let mut tasks: JoinSet<()> = JoinSet::new();

        let (receive_tx, mut receive_rx) =
            mpsc::channel::<Result<Vec<QueueMessage>, ScaleGuardError>>(1);
        let (handler_tx, mut handler_rx) =
            mpsc::channel::<(String, Result<(), ScaleGuardError>)>(CHANNEL_CAPACITY);
        let (postpone_tx, mut postpone_rx) = mpsc::channel::<PostponeNotice>(CHANNEL_CAPACITY);
        let (extend_tx, mut extend_rx) =
            mpsc::channel::<(String, Result<(), ScaleGuardError>)>(CHANNEL_CAPACITY);
        let (delete_tx, mut delete_rx) =
            mpsc::channel::<(String, Result<(), ScaleGuardError>)>(CHANNEL_CAPACITY);

        let mut pending: HashMap<String, InFlightMessage> = HashMap::new();
        let mut receive_in_flight = false;

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_concurrent = self.options.max_concurrent,
            poll_interval = ?self.options.poll_interval,
            "queue dispatcher started"
        );

        let failure = loop {
            let can_receive = !receive_in_flight && self.receive_capacity(pending.len()) > 0;

            tokio::select! {
                _ = cancel.cancelled() => break ScaleGuardError::Cancelled,

                _ = ticker.tick(), if can_receive => {
                    receive_in_flight = true;
                    let capacity = self.receive_capacity(pending.len());
                    let queue = self.queue.clone();
                    let wait = self.options.poll_interval;
                    let visibility = self.options.initial_visibility_timeout;
                    let tx = receive_tx.clone();
                    tasks.spawn(async move {
                        let batch = queue.receive(capacity, wait, visibility).await;
                        let _ = tx.send(batch).await;
                    });
                }

                Some(batch) = receive_rx.recv() => {
                    receive_in_flight = false;
                    let messages = match batch {
                        Ok(messages) => messages,
                        Err(e) => break e,
                    };
                    for message in messages {
                        if self.options.max_concurrent != 0
                            && pending.len() >= self.options.max_concurrent
                        {
                            // Not admitted: left invisible until its timeout
                            // lapses, then redelivered.
                            warn!(
                                receipt = %message.receipt_handle,
                                "receive returned more messages than remaining capacity"
                            );
                            continue;
                        }
                        metrics::MESSAGES_RECEIVED_TOTAL.inc();
                        self.admit(message, &work, &mut pending, &mut tasks, &postpone_tx, &handler_tx, handler.clone());
                    }
                    metrics::MESSAGES_IN_FLIGHT.set(pending.len() as f64);
                }

                Some(notice) = postpone_rx.recv() => {
                    let PostponeNotice { receipt_handle, timeout, ack } = notice;
                    // Consuming the notice in time is the liveness signal the
                    // scheduler is waiting on.
                    let _ = ack.send(());
                    if let Some(inflight) = pending.get_mut(&receipt_handle) {
                        if let Some(previous) = inflight.extend_cancel.take() {
                            previous.cancel();
                        }
                        let extend_cancel = work.child_token();
                        inflight.extend_cancel = Some(extend_cancel.clone());
                        let queue = self.queue.clone();
                        let tx = extend_tx.clone();
                        tasks.spawn(async move {
                            let result = tokio::select! {
                                _ = extend_cancel.cancelled() => None,
                                result = queue.change_visibility(&receipt_handle, timeout) => Some(result),
                            };
                            if let Some(result) = result {
                                let _ = tx.send((receipt_handle, result)).await;
                            }
                        });
                        metrics::VISIBILITY_EXTENSIONS_TOTAL.inc();
                    }
                }

                Some((receipt_handle, result)) = extend_rx.recv() => {
                    if let Some(inflight) = pending.get_mut(&receipt_handle) {
                        inflight.extend_cancel = None;
                    }
                    if let Err(e) = result {
                        break e;
                    }
                    debug!(receipt = %receipt_handle, "visibility extended");
                }

                Some((receipt_handle, result)) = handler_rx.recv() => {
                    if let Err(e) = result {
                        break e;
                    }
                    if let Some(inflight) = pending.remove(&receipt_handle) {
                        // Success: stop extending, delete exactly once.
                        inflight.scheduler_cancel.cancel();
                        if let Some(extend) = inflight.extend_cancel {
                            extend.cancel();
                        }
                        let queue = self.queue.clone();
                        let tx = delete_tx.clone();
                        tasks.spawn(async move {
                            let result = queue.delete(&receipt_handle).await;
                            let _ = tx.send((receipt_handle, result)).await;
                        });
                    }
                    metrics::MESSAGES_IN_FLIGHT.set(pending.len() as f64);
                }

                Some((receipt_handle, result)) = delete_rx.recv() => {
                    if let Err(e) = result {
                        break e;
                    }
                    metrics::MESSAGES_DELETED_TOTAL.inc();
                    debug!(receipt = %receipt_handle, "message deleted");
                }
            }
        };

        // Teardown: cancel every worker, unblock any sender, then wait for
        // full quiescence before surfacing the failure.
        work.cancel();
        drop(receive_rx);
        drop(postpone_rx);
        drop(extend_rx);
        drop(handler_rx);
        drop(delete_rx);
        while tasks.join_next().await.is_some() {}
        metrics::MESSAGES_IN_FLIGHT.set(0.0);

        info!(error = %failure, "queue dispatcher stopped");
        Err(failure)
    }

    /// Inserts a message into the in-flight map and starts its handler and
    /// extension-scheduler workers.
    #[allow(clippy::too_many_arguments)]
    fn admit(
        &self,
        message: QueueMessage,
        work: &CancellationToken,
        pending: &mut HashMap<String, InFlightMessage>,
        tasks: &mut JoinSet<()>,
        postpone_tx: &mpsc::Sender<PostponeNotice>,
        handler_tx: &mpsc::Sender<(String, Result<(), ScaleGuardError>)>,
        handler: Arc<dyn MessageHandler>,
    ) {
        let receipt_handle = message.receipt_handle.clone();
        debug!(receipt = %receipt_handle, "message admitted");

        let scheduler_cancel = work.child_token();
        pending.insert(
            receipt_handle.clone(),
            InFlightMessage {
                scheduler_cancel: scheduler_cancel.clone(),
                extend_cancel: None,
            },
        );

        tasks.spawn(run_visibility_scheduler(
            receipt_handle.clone(),
            self.options.initial_visibility_timeout,
            self.options.max_visibility_timeout,
            self.options.comm_buffer,
            postpone_tx.clone(),
            scheduler_cancel,
        ));

        let work = work.clone();
        let tx = handler_tx.clone();
        tasks.spawn(async move {
            let result = handler.handle(&work, &message).await;
            let _ = tx.send((receipt_handle, result)).await;
        });
    }
}
