//! CompletionSignal: a single-assignment outcome settable from any thread.
//!
//! One [`Resolver`] writes, any number of [`CompletionSignal`] clones read.
//! Readers can block (`wait`), poll (`try_get`) or `.await` the signal.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use smallvec::SmallVec;

use crate::error::DeliveryError;

/// Outcome carried by a resolved signal.
pub type Outcome<T> = Result<T, DeliveryError>;

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

struct SlotState<T> {
    outcome: Option<Outcome<T>>,
    // At most one waker per signal clone, keyed by the clone's id.
    wakers: SmallVec<[(usize, Waker); 2]>,
    next_key: usize,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected resolver/signal pair.
pub fn completion<T>() -> (Resolver<T>, CompletionSignal<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState {
            outcome: None,
            wakers: SmallVec::new(),
            next_key: 1,
        }),
        ready: Condvar::new(),
    });
    (
        Resolver {
            slot: Some(slot.clone()),
        },
        CompletionSignal { slot, key: 0 },
    )
}

/// The single writer of a [`CompletionSignal`].
///
/// Dropping it unresolved settles the signal with [`DeliveryError::Abandoned`].
pub struct Resolver<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Resolver<T> {
    /// Settle the signal and wake every reader.
    pub fn resolve(mut self, outcome: Outcome<T>) {
        if let Some(slot) = self.slot.take() {
            settle(&slot, outcome);
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::debug!("completion resolver dropped unresolved");
            settle(&slot, Err(DeliveryError::Abandoned));
        }
    }
}

fn settle<T>(slot: &Slot<T>, outcome: Outcome<T>) {
    let wakers = {
        let mut st = slot.lock();
        assert!(st.outcome.is_none(), "completion signal resolved twice");
        st.outcome = Some(outcome);
        core::mem::take(&mut st.wakers)
    };
    slot.ready.notify_all();
    for (_, w) in wakers {
        w.wake();
    }
}

/// Read side of a single-fire outcome.
pub struct CompletionSignal<T> {
    slot: Arc<Slot<T>>,
    key: usize,
}

impl<T> Clone for CompletionSignal<T> {
    fn clone(&self) -> Self {
        let key = {
            let mut st = self.slot.lock();
            st.next_key += 1;
            st.next_key - 1
        };
        Self {
            slot: self.slot.clone(),
            key,
        }
    }
}

impl<T> Drop for CompletionSignal<T> {
    fn drop(&mut self) {
        let key = self.key;
        self.slot.lock().wakers.retain(|(k, _)| *k != key);
    }
}

impl<T> core::fmt::Debug for CompletionSignal<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T> CompletionSignal<T> {
    /// Has the outcome been set?
    pub fn is_resolved(&self) -> bool {
        self.slot.lock().outcome.is_some()
    }
}

impl<T: Clone> CompletionSignal<T> {
    /// The outcome if already resolved.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.slot.lock().outcome.clone()
    }

    /// Block the calling thread until resolved.
    pub fn wait(&self) -> Outcome<T> {
        let mut st = self.slot.lock();
        loop {
            if let Some(out) = &st.outcome {
                return out.clone();
            }
            st = self
                .slot
                .ready
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`; `None` if still unresolved.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        let deadline = Instant::now() + timeout;
        let mut st = self.slot.lock();
        loop {
            if let Some(out) = &st.outcome {
                return Some(out.clone());
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            st = self
                .slot
                .ready
                .wait_timeout(st, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl<T: Clone> Future for CompletionSignal<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut st = self.slot.lock();
        if let Some(out) = &st.outcome {
            return Poll::Ready(out.clone());
        }
        let key = self.key;
        match st.wakers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, w)) => w.clone_from(cx.waker()),
            None => st.wakers.push((key, cx.waker().clone())),
        }
        Poll::Pending
    }
}
