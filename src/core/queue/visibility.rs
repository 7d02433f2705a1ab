// src/core/queue/visibility.rs

//! Per-message visibility-extension scheduling.
//!
//! Each in-flight message gets one scheduler task. It wakes `comm_buffer`
//! before the current visibility timeout would lapse and offers the event
//! loop a [`PostponeNotice`]; the event loop turns the notice into an actual
//! extension request. Successive timeouts follow a truncated exponential
//! back-off so long-running handlers cost ever fewer queue calls.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const BACKOFF_MULTIPLIER: f64 = 1.5;
const BACKOFF_JITTER: f64 = 0.05;

/// Produced by a scheduler task, consumed by the dispatcher's event loop.
#[derive(Debug)]
pub struct PostponeNotice {
    pub receipt_handle: String,
    /// The visibility timeout the next extension should install.
    pub timeout: Duration,
    /// Consumption acknowledgement; see [`run_visibility_scheduler`].
    pub ack: oneshot::Sender<()>,
}

/// The next visibility timeout: grow by ×1.5 with ±5 % jitter, truncated at
/// `max`. Growth stays strictly monotonic until the cap because the jittered
/// multiplier never drops below 1.
pub(crate) fn next_visibility_timeout(
    current: Duration,
    max: Duration,
    rng: &mut SmallRng,
) -> Duration {
    let factor = BACKOFF_MULTIPLIER * (1.0 + rng.gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER));
    current.mul_f64(factor).min(max)
}

/// Runs the extension schedule for one message until cancelled.
///
/// Every notice must be consumed (acked) by the event loop within
/// `comm_buffer` of being sent. A notice that sits unconsumed means the
/// dispatcher is wedged and the message's visibility is about to lapse into
/// a duplicate delivery, so the scheduler panics rather than let that
/// invariant break silently. Cancellation and loop teardown are exempt.
pub(crate) async fn run_visibility_scheduler(
    receipt_handle: String,
    initial: Duration,
    max: Duration,
    comm_buffer: Duration,
    postpone_tx: mpsc::Sender<PostponeNotice>,
    cancel: CancellationToken,
) {
    let mut rng = SmallRng::from_entropy();
    let mut current = initial;
    loop {
        let wake_after = current.saturating_sub(comm_buffer);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wake_after) => {}
        }

        let next = next_visibility_timeout(current, max, &mut rng);
        let (ack_tx, ack_rx) = oneshot::channel();
        let notice = PostponeNotice {
            receipt_handle: receipt_handle.clone(),
            timeout: next,
            ack: ack_tx,
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = postpone_tx.send(notice) => {
                if sent.is_err() {
                    // Event loop is gone; nothing left to schedule for.
                    return;
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            consumed = tokio::time::timeout(comm_buffer, ack_rx) => match consumed {
                Ok(Ok(())) => {}
                // Notice dropped unacked: the loop is tearing down.
                Ok(Err(_)) => return,
                Err(_) => panic!(
                    "visibility extension for message {receipt_handle} not consumed within \
                     {comm_buffer:?}; dispatcher is wedged and the message will be redelivered"
                ),
            }
        }

        current = next;
    }
}
