//! Error types for bridge admission and end-to-end delivery.

use core::fmt;

use thiserror::Error;

/// Recoverable failures reported by [`CallBridge`](crate::CallBridge) operations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The bridge is closing or finalized and no longer accepts work.
    #[error("bridge is closed")]
    Closed,
    /// A non-blocking call found a bounded queue at capacity.
    #[error("bridge queue is full")]
    QueueFull,
    /// A bounded queue was requested with zero capacity.
    #[error("bounded capacity must be at least 1")]
    InvalidCapacity,
}

/// A call the bridge refused, handing the item back to the producer.
pub struct Rejected<I> {
    item: I,
    reason: BridgeError,
}

impl<I> Rejected<I> {
    pub(crate) fn new(item: I, reason: BridgeError) -> Self {
        Self { item, reason }
    }

    /// Why the call was refused.
    #[inline]
    pub fn reason(&self) -> BridgeError {
        self.reason
    }

    /// Recover the refused item, e.g. to retry after `QueueFull`.
    #[inline]
    pub fn into_item(self) -> I {
        self.item
    }
}

impl<I> fmt::Debug for Rejected<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<I> fmt::Display for Rejected<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call rejected: {}", self.reason)
    }
}

impl<I> std::error::Error for Rejected<I> {}

impl<I> From<Rejected<I>> for BridgeError {
    fn from(r: Rejected<I>) -> Self {
        r.reason
    }
}

/// Failure outcomes a [`CompletionSignal`](crate::CompletionSignal) can resolve with.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// A blocking call was refused mid-stream.
    #[error("bridge closed after {delivered} item(s) were accepted")]
    Rejected {
        /// Items accepted before the refusal.
        delivered: usize,
    },
    /// The producer thread panicked before finishing.
    #[error("producer thread panicked: {0}")]
    ProducerPanicked(String),
    /// The consumer side was torn down before it could finalize.
    #[error("bridge was dropped before finalization")]
    Abandoned,
    /// The bridge could not be built.
    #[error("bridge setup failed: {0}")]
    Setup(#[from] BridgeError),
    /// The item count does not fit the `i64` payload range.
    #[error("cannot deliver {0} items: payloads are i64")]
    TooManyItems(usize),
    /// The producer thread could not be started.
    #[error("failed to spawn producer thread: {0}")]
    Spawn(String),
}
