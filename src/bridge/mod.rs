//! CallBridge: hand-off of work items from producer threads to one consumer thread.
//!
//! Producers hold counted [`BridgeHandle`]s and `call` items into a shared queue.
//! The single [`Consumer`] delivers them to its invoker in admission order and,
//! once the last handle is gone and the queue is drained, runs the finalizer.
//!
//! Admission, refcount and state transitions all happen under one mutex, so
//! every thread observes the same order of `call`, `acquire`, `release` and
//! finalization. The queue itself is lock-free on the consumer side.

mod consumer;
mod queue;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::{
    error::{BridgeError, Rejected},
    invoke::Invoker,
    util::{WaitBudget, scope},
};

pub use consumer::{Consumer, Turn};
pub use queue::Capacity;
use queue::ItemQueue;

/// Default number of items a consumer delivers per burst.
pub const DEFAULT_BURST: usize = 64;

/// Lifecycle of a bridge. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// Accepting calls.
    Active,
    /// No longer accepting calls; queued items still drain.
    Closing,
    /// Drained and finalized.
    Finalized,
}

/// Admission behavior when a bounded queue is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallMode {
    /// Wait for a free slot, or until the bridge closes.
    #[default]
    Blocking,
    /// Fail with `QueueFull` at once.
    NonBlocking,
}

struct Lifecycle {
    refcount: usize,
    state: BridgeState,
}

impl Lifecycle {
    #[inline]
    fn released_out(&self) -> bool {
        self.state == BridgeState::Closing && self.refcount == 0
    }
}

pub(crate) struct Shared<I> {
    id: usize,
    name: Arc<str>,
    queue: ItemQueue<I>,
    life: Mutex<Lifecycle>,
    // Producers parked on a full bounded queue.
    not_full: Condvar,
    // The consumer parked on an empty queue.
    wake: Condvar,
}

impl<I> Shared<I> {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.life.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<(), BridgeError> {
        let mut life = self.lock();
        if life.state != BridgeState::Active {
            return Err(BridgeError::Closed);
        }
        life.refcount += 1;
        tracing::debug!(bridge = %self.name, refcount = life.refcount, "acquire");
        Ok(())
    }

    fn call(&self, mut item: I, mode: CallMode) -> Result<(), Rejected<I>> {
        let mut budget = WaitBudget::hot();
        let mut life = self.lock();
        loop {
            if life.state != BridgeState::Active {
                return Err(Rejected::new(item, BridgeError::Closed));
            }
            match self.queue.push(item) {
                Ok(()) => {
                    drop(life);
                    self.wake.notify_one();
                    return Ok(());
                }
                Err(back) => item = back,
            }
            if mode == CallMode::NonBlocking {
                return Err(Rejected::new(item, BridgeError::QueueFull));
            }
            assert!(
                !scope::is_draining(self.id),
                "blocking call into bridge `{}` from its own consumer thread would deadlock",
                self.name
            );
            if budget.has_budget() {
                drop(life);
                budget.step();
                life = self.lock();
            } else {
                life = self
                    .not_full
                    .wait(life)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn release(&self) {
        let mut life = self.lock();
        assert!(
            life.refcount > 0,
            "double release: bridge `{}` released more often than acquired",
            self.name
        );
        life.refcount -= 1;
        let last = life.refcount == 0;
        if last && life.state == BridgeState::Active {
            life.state = BridgeState::Closing;
        }
        tracing::debug!(bridge = %self.name, refcount = life.refcount, state = ?life.state, "release");
        drop(life);
        if last {
            self.not_full.notify_all();
            self.wake.notify_all();
        }
    }

    fn abort(&self) {
        let mut life = self.lock();
        if life.state != BridgeState::Active {
            return;
        }
        life.state = BridgeState::Closing;
        tracing::debug!(bridge = %self.name, refcount = life.refcount, "abort");
        drop(life);
        self.not_full.notify_all();
        self.wake.notify_all();
    }

    /// Wake producers waiting for space after the consumer dequeued items.
    fn slots_freed(&self) {
        if let ItemQueue::Bounded(_) = self.queue {
            // Taking the lock orders this notify after any producer that saw
            // the queue full has started waiting.
            drop(self.lock());
            self.not_full.notify_all();
        }
    }
}

/// Builder for a [`CallBridge`] and its consumer.
#[derive(Clone, Debug)]
pub struct BridgeBuilder {
    capacity: Capacity,
    name: String,
    burst: usize,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            capacity: Capacity::Unbounded,
            name: String::from("call-bridge"),
            burst: DEFAULT_BURST,
        }
    }
}

impl BridgeBuilder {
    /// Start from an unbounded queue named `call-bridge`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue capacity. Defaults to unbounded.
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Resource name used in logs and [`Env::name`](crate::Env::name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Maximum items the consumer dequeues before invoking them. Clamped to at least 1.
    pub fn burst(mut self, burst: usize) -> Self {
        self.burst = burst.max(1);
        self
    }

    /// Create the bridge bound to `invoker`.
    ///
    /// The returned handle holds the initial reference; the bridge closes when
    /// it and every handle acquired from it are released.
    pub fn build<I, V>(
        self,
        invoker: V,
    ) -> Result<(CallBridge<I>, BridgeHandle<I>, Consumer<I>), BridgeError>
    where
        I: Send + 'static,
        V: Invoker<I> + 'static,
    {
        let shared = Arc::new(Shared {
            id: scope::next_bridge_id(),
            name: Arc::from(self.name),
            queue: ItemQueue::new(self.capacity)?,
            life: Mutex::new(Lifecycle {
                refcount: 1,
                state: BridgeState::Active,
            }),
            not_full: Condvar::new(),
            wake: Condvar::new(),
        });
        tracing::debug!(bridge = %shared.name, capacity = ?self.capacity, "bridge created");
        let bridge = CallBridge {
            shared: shared.clone(),
        };
        let handle = BridgeHandle {
            shared: shared.clone(),
        };
        let consumer = Consumer::new(shared, Box::new(invoker), self.burst);
        Ok((bridge, handle, consumer))
    }
}

/// Non-counting reference to a bridge, used to inspect it and acquire handles.
pub struct CallBridge<I> {
    shared: Arc<Shared<I>>,
}

impl<I> Clone for CallBridge<I> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl CallBridge<()> {
    /// Start configuring a bridge. The item type is fixed by
    /// [`BridgeBuilder::build`].
    ///
    /// ```
    /// use call_bridge::{CallBridge, Capacity, Env};
    ///
    /// let (bridge, handle, mut consumer) = CallBridge::builder()
    ///     .capacity(Capacity::Bounded(4))
    ///     .name("doc")
    ///     .build::<u8, _>(|_env: &mut Env, _v: u8| {})
    ///     .unwrap();
    /// handle.blocking_call(1).unwrap();
    /// handle.release();
    /// consumer.run();
    /// assert_eq!(bridge.pending(), 0);
    /// ```
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }
}

impl<I> CallBridge<I> {
    /// Take a new producer handle. Fails once the bridge is closing or finalized.
    pub fn acquire(&self) -> Result<BridgeHandle<I>, BridgeError> {
        self.shared.acquire()?;
        Ok(BridgeHandle {
            shared: self.shared.clone(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.shared.lock().state
    }

    /// Outstanding producer handles.
    pub fn refcount(&self) -> usize {
        self.shared.lock().refcount
    }

    /// Items accepted but not yet dequeued by the consumer.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<I> core::fmt::Debug for CallBridge<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let life = self.shared.lock();
        f.debug_struct("CallBridge")
            .field("name", &self.shared.name)
            .field("state", &life.state)
            .field("refcount", &life.refcount)
            .field("pending", &self.shared.queue.len())
            .finish()
    }
}

/// A counted producer reference. Dropping it releases it.
pub struct BridgeHandle<I> {
    shared: Arc<Shared<I>>,
}

impl<I> BridgeHandle<I> {
    /// Enqueue `item` for the consumer.
    ///
    /// Items from one producer are delivered in call order. On failure the
    /// item is handed back inside [`Rejected`].
    pub fn call(&self, item: I, mode: CallMode) -> Result<(), Rejected<I>> {
        self.shared.call(item, mode)
    }

    /// Shorthand for `call(item, CallMode::Blocking)`.
    #[inline]
    pub fn blocking_call(&self, item: I) -> Result<(), Rejected<I>> {
        self.call(item, CallMode::Blocking)
    }

    /// Shorthand for `call(item, CallMode::NonBlocking)`.
    #[inline]
    pub fn try_call(&self, item: I) -> Result<(), Rejected<I>> {
        self.call(item, CallMode::NonBlocking)
    }

    /// Take another handle on the same bridge.
    pub fn acquire(&self) -> Result<BridgeHandle<I>, BridgeError> {
        self.shared.acquire()?;
        Ok(BridgeHandle {
            shared: self.shared.clone(),
        })
    }

    /// Stop admitting calls on every handle. Queued items still drain, and
    /// finalization still waits for all handles to be released.
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// A non-counting reference to the same bridge.
    pub fn bridge(&self) -> CallBridge<I> {
        CallBridge {
            shared: self.shared.clone(),
        }
    }

    /// Release this handle.
    pub fn release(self) {
        drop(self);
    }
}

impl<I> Drop for BridgeHandle<I> {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl<I> core::fmt::Debug for BridgeHandle<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}
