//! Cancelable, single-fire results of background bucket loops.
//!
//! Every [`Bucket::watch`](crate::Bucket::watch), [`Bucket::fill`](crate::Bucket::fill)
//! and [`Bucket::dynamic_fill`](crate::Bucket::dynamic_fill) call spawns one task and
//! hands back one [`Watchable`]. The pair is wired with two oneshot channels:
//!
//! - **result:** task → caller, carries the single [`WatchResult`]
//! - **cancel:** caller → task, carries an optional reason
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──success──────────▶ Ok(WatchOutcome::Completed)
//!    │  ──cancel(None)───────▶ Ok(WatchOutcome::Cancelled)
//!    │  ──cancel(Some(err))──▶ Err(err)
//!    └──timeout / failure────▶ Err(BucketError::Timeout | Refill | ..)
//! ```
//!
//! Exactly one payload is ever delivered. Cancelling after termination, or
//! cancelling twice, does nothing.
//!
//! # Dropping
//!
//! - Dropping the [`Watchable`] (or its [`WatchCanceller`]) without cancelling
//!   counts as `cancel(None)`: the task stops at once.
//! - Dropping only the [`WatchDone`] half stops the task at its next tick.
//! - The task never waits for a reader; delivering the result cannot block.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;

use crate::BucketError;

/// Successful terminal states of a background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The loop finished on its own: a watch acquired its tokens, or a dynamic
    /// fill's trigger ran dry.
    Completed,
    /// The loop was cancelled without a reason.
    Cancelled,
}

/// Payload delivered by a [`Watchable`].
pub type WatchResult = Result<WatchOutcome, BucketError>;

/// Handle on one background loop.
///
/// Await it to get the loop's [`WatchResult`]; call [`Watchable::cancel`] to stop
/// the loop early.
///
/// # Examples
///
/// ```ignore
/// let mut watchable = bucket.fill(100, Duration::from_secs(1));
/// watchable.cancel(None);
///
/// assert!(matches!(watchable.await, Ok(WatchOutcome::Cancelled)));
/// ```
#[derive(Debug)]
pub struct Watchable {
    canceller: Option<WatchCanceller>,
    done: WatchDone,
}

impl Watchable {
    /// Stop the loop.
    ///
    /// `None` resolves the watchable with `Ok(WatchOutcome::Cancelled)`; `Some(err)`
    /// resolves it with `Err(err)`. A no-op once the loop has terminated or after a
    /// previous call.
    pub fn cancel(&mut self, reason: Option<BucketError>) {
        if let Some(canceller) = self.canceller.take() {
            canceller.cancel(reason);
        }
    }

    /// The result, if the loop has already terminated.
    ///
    /// Returns `None` while pending. Once a result has been returned here it is
    /// consumed; awaiting afterwards yields `Err(BucketError::Abandoned)`.
    pub fn try_result(&mut self) -> Option<WatchResult> {
        self.done.try_result()
    }

    /// Separate the cancel side from the result side, e.g. to cancel from one task
    /// while another awaits.
    ///
    /// The canceller is `None` if [`Watchable::cancel`] was already called.
    pub fn split(self) -> (Option<WatchCanceller>, WatchDone) {
        (self.canceller, self.done)
    }
}

impl Future for Watchable {
    type Output = WatchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done).poll(cx)
    }
}

/// Cancel side of a split [`Watchable`].
///
/// Dropping it without calling [`WatchCanceller::cancel`] cancels the loop with no
/// reason.
#[derive(Debug)]
pub struct WatchCanceller {
    cancel_tx: oneshot::Sender<Option<BucketError>>,
}

impl WatchCanceller {
    /// Stop the loop. See [`Watchable::cancel`].
    pub fn cancel(self, reason: Option<BucketError>) {
        // Err means the loop already terminated.
        let _ = self.cancel_tx.send(reason);
    }

    /// Whether the loop has already terminated.
    pub fn is_terminated(&self) -> bool {
        self.cancel_tx.is_canceled()
    }
}

/// Result side of a split [`Watchable`].
#[derive(Debug)]
pub struct WatchDone {
    done_rx: oneshot::Receiver<WatchResult>,
}

impl WatchDone {
    /// The result, if the loop has already terminated. See [`Watchable::try_result`].
    pub fn try_result(&mut self) -> Option<WatchResult> {
        match self.done_rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::Canceled) => Some(Err(BucketError::Abandoned)),
        }
    }
}

impl Future for WatchDone {
    type Output = WatchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done_rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(BucketError::Abandoned)))
    }
}

/// Producer side held by the background task.
pub(crate) struct WatchSignal {
    done_tx: Option<oneshot::Sender<WatchResult>>,
}

impl WatchSignal {
    /// Deliver the terminal result. Only the first call has an effect.
    pub(crate) fn signal(&mut self, result: WatchResult) {
        match self.done_tx.take() {
            Some(done_tx) => {
                // Err means nobody is listening any more, which is fine.
                let _ = done_tx.send(result);
            }
            None => tracing::trace!("Watchable already signalled, ignoring"),
        }
    }

    pub(crate) fn complete(&mut self) {
        self.signal(Ok(WatchOutcome::Completed));
    }

    pub(crate) fn fail(&mut self, err: BucketError) {
        self.signal(Err(err));
    }

    /// Resolve from what arrived on the cancel channel.
    ///
    /// A dropped canceller reads as `Err(Canceled)` and is treated as a cancel with
    /// no reason.
    pub(crate) fn cancelled(&mut self, reason: Result<Option<BucketError>, oneshot::Canceled>) {
        match reason {
            Ok(Some(err)) => self.signal(Err(err)),
            Ok(None) | Err(oneshot::Canceled) => self.signal(Ok(WatchOutcome::Cancelled)),
        }
    }

    /// Whether the result can no longer be delivered to anyone.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.done_tx
            .as_ref()
            .is_none_or(|done_tx| done_tx.is_canceled())
    }
}

/// Receiving end of the cancel channel, selected on by the background task.
pub(crate) type CancelReceiver = oneshot::Receiver<Option<BucketError>>;

/// Create a connected watchable and the two task-side halves.
pub(crate) fn watchable() -> (Watchable, WatchSignal, CancelReceiver) {
    let (done_tx, done_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let watchable = Watchable {
        canceller: Some(WatchCanceller { cancel_tx }),
        done: WatchDone { done_rx },
    };

    let signal = WatchSignal {
        done_tx: Some(done_tx),
    };

    (watchable, signal, cancel_rx)
}

/// A watchable that is already terminated with `result`, for loops that are never
/// started.
pub(crate) fn resolved(result: WatchResult) -> Watchable {
    let (watchable, mut signal, _cancel_rx) = watchable();
    signal.signal(result);

    watchable
}
