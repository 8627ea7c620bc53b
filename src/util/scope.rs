//! Consumer-thread scope tracking.
//!
//! While a consumer delivers items, the thread is marked with the id of the
//! bridge it serves. A blocking call into that same bridge from inside an
//! invocation would wait for a slot only this thread can free, so it is
//! refused with a panic instead of hanging forever.

use core::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static BRIDGE_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static DRAINING: Cell<usize> = const { Cell::new(0) };
}

/// Allocate a process-unique bridge id (never 0).
pub(crate) fn next_bridge_id() -> usize {
    BRIDGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Is the current thread delivering items for bridge `id`?
#[inline]
pub(crate) fn is_draining(id: usize) -> bool {
    DRAINING.with(|c| c.get() == id)
}

/// Marks the current thread as the consumer of one bridge until dropped.
pub(crate) struct ConsumerScopeGuard {
    prev: usize,
}

impl ConsumerScopeGuard {
    pub(crate) fn enter(id: usize) -> Self {
        let prev = DRAINING.with(|c| c.replace(id));
        Self { prev }
    }
}

impl Drop for ConsumerScopeGuard {
    fn drop(&mut self) {
        DRAINING.with(|c| c.set(self.prev));
    }
}
