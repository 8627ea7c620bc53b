//! Consumer side of a bridge: drains the queue on the run-loop thread and finalizes.

use std::{
    sync::{Arc, PoisonError},
    thread,
    time::{Duration, Instant},
};

use smallvec::SmallVec;

use super::{BridgeState, Shared};
use crate::{
    invoke::{Env, Invoker},
    util::{WaitBudget, scope::ConsumerScopeGuard},
};

type Finalizer = Box<dyn FnOnce(&mut Env) + Send>;

/// Result of one consumer turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    /// Nothing left to deliver right now; the bridge is still open.
    Idle,
    /// The bridge is finalized; further turns do nothing.
    Finalized,
}

/// The consumer half of a bridge, owning its invoker and finalizer.
///
/// Drive it from exactly one thread: the first turn binds it to the calling
/// thread. Dropping it before finalization closes the bridge, discards queued
/// items and drops the finalizer without running it.
pub struct Consumer<I> {
    shared: Arc<Shared<I>>,
    invoker: Option<Box<dyn Invoker<I>>>,
    finalizer: Option<Finalizer>,
    env: Option<Env>,
    burst: usize,
    // Dequeued but not yet invoked, next item last. Survives an invoker panic.
    carried: SmallVec<[I; 16]>,
    finalized: bool,
}

impl<I> Consumer<I> {
    pub(super) fn new(shared: Arc<Shared<I>>, invoker: Box<dyn Invoker<I>>, burst: usize) -> Self {
        Self {
            shared,
            invoker: Some(invoker),
            finalizer: None,
            env: None,
            burst,
            carried: SmallVec::new(),
            finalized: false,
        }
    }

    /// Install the routine run once on this thread after the last release and
    /// the final drain. Replaces any previously installed finalizer.
    pub fn on_finalize<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Env) + Send + 'static,
    {
        self.finalizer = Some(Box::new(f));
    }

    /// Has the finalizer run?
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Deliver the items queued at entry, then finalize if the bridge is
    /// released, closed and drained. Never blocks.
    ///
    /// If an invocation panics, the items dequeued behind it stay with the
    /// consumer and are delivered first on the next turn.
    pub fn run_pending(&mut self) -> Turn {
        if self.finalized {
            return Turn::Finalized;
        }
        self.bind_thread();
        let _scope = ConsumerScopeGuard::enter(self.shared.id);

        // Leftovers from a turn cut short by an invoker panic go first.
        self.deliver_carried();
        let mut left = self.shared.queue.len();
        while left > 0 {
            let want = self.burst.min(left);
            while self.carried.len() < want {
                match self.shared.queue.pop() {
                    Some(item) => self.carried.push(item),
                    None => break,
                }
            }
            if self.carried.is_empty() {
                break;
            }
            left -= self.carried.len();
            self.carried.reverse();
            self.shared.slots_freed();
            self.deliver_carried();
        }

        if self.try_finalize() {
            Turn::Finalized
        } else {
            Turn::Idle
        }
    }

    /// Run until finalized, parking while the queue is empty.
    pub fn run(&mut self) {
        while self.turn_or_park(None) == Turn::Idle {}
    }

    /// Like [`run`](Self::run) but gives up after `timeout` without finalization.
    pub fn run_timeout(&mut self, timeout: Duration) -> Turn {
        let deadline = Instant::now() + timeout;
        loop {
            match self.turn_or_park(Some(deadline)) {
                Turn::Finalized => return Turn::Finalized,
                Turn::Idle if Instant::now() >= deadline => return Turn::Idle,
                Turn::Idle => {}
            }
        }
    }

    fn turn_or_park(&mut self, deadline: Option<Instant>) -> Turn {
        if self.run_pending() == Turn::Finalized {
            return Turn::Finalized;
        }
        let mut budget = WaitBudget::default();
        while budget.step() {
            if self.has_work() {
                return Turn::Idle;
            }
        }
        let shared = &self.shared;
        let mut life = shared.lock();
        while self.carried.is_empty() && shared.queue.is_empty() && !life.released_out() {
            match deadline {
                None => {
                    life = shared
                        .wake
                        .wait(life)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        break;
                    }
                    life = shared
                        .wake
                        .wait_timeout(life, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        Turn::Idle
    }

    fn has_work(&self) -> bool {
        !self.carried.is_empty()
            || !self.shared.queue.is_empty() || self.shared.lock().released_out()
    }

    fn bind_thread(&mut self) {
        let name = &self.shared.name;
        let env = self.env.get_or_insert_with(|| Env::new(name.clone()));
        assert_eq!(
            env.thread(),
            thread::current().id(),
            "consumer of bridge `{name}` driven from a second thread"
        );
    }

    fn deliver_carried(&mut self) {
        let (Some(invoker), Some(env)) = (self.invoker.as_mut(), self.env.as_mut()) else {
            self.carried.clear();
            return;
        };
        while let Some(item) = self.carried.pop() {
            tracing::trace!(bridge = env.name(), seq = env.delivered(), "deliver");
            invoker.invoke(env, item);
            env.bump();
        }
    }

    fn try_finalize(&mut self) -> bool {
        {
            let mut life = self.shared.lock();
            let drained = self.shared.queue.is_empty() && self.carried.is_empty();
            if !life.released_out() || !drained {
                return false;
            }
            life.state = BridgeState::Finalized;
        }
        self.finalized = true;
        let Some(env) = self.env.as_mut() else {
            return true;
        };
        tracing::info!(bridge = env.name(), delivered = env.delivered(), "bridge finalized");
        if let Some(finalize) = self.finalizer.take() {
            finalize(env);
        }
        self.invoker = None;
        true
    }
}

impl<I> Drop for Consumer<I> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let refcount = {
            let mut life = self.shared.lock();
            if life.state == BridgeState::Active {
                life.state = BridgeState::Closing;
            }
            life.refcount
        };
        self.shared.not_full.notify_all();
        let mut dropped = self.carried.len();
        self.carried.clear();
        while self.shared.queue.pop().is_some() {
            dropped += 1;
        }
        tracing::warn!(
            bridge = %self.shared.name,
            refcount,
            dropped,
            "consumer dropped before finalization"
        );
    }
}

impl<I> core::fmt::Debug for Consumer<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.shared.name)
            .field("finalized", &self.finalized)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}
