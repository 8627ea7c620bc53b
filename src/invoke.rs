//! Consumer-side execution: the invoker capability and the work items it runs.
//!
//! The bridge never looks inside an item. It hands each one, together with the
//! consumer's [`Env`], to the [`Invoker`] it was built with.

use std::{sync::Arc, thread::ThreadId};

/// Execution context of the consumer thread, passed to every invocation.
#[derive(Debug)]
pub struct Env {
    name: Arc<str>,
    thread: ThreadId,
    delivered: u64,
}

impl Env {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            thread: std::thread::current().id(),
            delivered: 0,
        }
    }

    /// Name of the bridge this context belongs to.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The run-loop thread driving the bridge.
    #[inline]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Items delivered so far, not counting the one in progress.
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    #[inline]
    pub(crate) fn bump(&mut self) {
        self.delivered += 1;
    }
}

/// Executes one dequeued item on the consumer thread.
pub trait Invoker<I>: Send {
    /// Run `item`. Called once per accepted item, in admission order.
    fn invoke(&mut self, env: &mut Env, item: I);
}

impl<I, F> Invoker<I> for F
where
    F: FnMut(&mut Env, I) + Send,
{
    #[inline]
    fn invoke(&mut self, env: &mut Env, item: I) {
        self(env, item)
    }
}

/// A payload plus the adapter turning it into a call on the consumer's target.
///
/// The adapter is a plain `fn` so items stay small and carry no captured state
/// across threads.
pub struct WorkItem<P, T: ?Sized> {
    payload: P,
    adapt: fn(&mut Env, &mut T, P),
}

impl<P, T: ?Sized> WorkItem<P, T> {
    /// Pair `payload` with the adapter that delivers it.
    #[inline]
    pub fn new(payload: P, adapt: fn(&mut Env, &mut T, P)) -> Self {
        Self { payload, adapt }
    }

    /// Borrow the payload.
    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Apply the adapter to `target`, consuming the item.
    #[inline]
    pub fn run(self, env: &mut Env, target: &mut T) {
        (self.adapt)(env, target, self.payload)
    }
}

impl<P: core::fmt::Debug, T: ?Sized> core::fmt::Debug for WorkItem<P, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("WorkItem").field(&self.payload).finish()
    }
}

/// Invoker owning a consumer-side target that [`WorkItem`]s are applied to.
pub struct CallbackInvoker<T> {
    target: T,
}

impl<T: Send> CallbackInvoker<T> {
    /// Wrap the target callable.
    pub fn new(target: T) -> Self {
        Self { target }
    }

    /// Recover the target.
    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<P, T: Send> Invoker<WorkItem<P, T>> for CallbackInvoker<T> {
    #[inline]
    fn invoke(&mut self, env: &mut Env, item: WorkItem<P, T>) {
        item.run(env, &mut self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_doubled(_env: &mut Env, out: &mut Vec<i64>, v: i64) {
        out.push(v * 2);
    }

    #[test]
    fn callback_invoker_applies_adapter() {
        let mut env = Env::new(Arc::from("t"));
        let mut inv = CallbackInvoker::new(Vec::new());
        inv.invoke(&mut env, WorkItem::new(3, push_doubled));
        inv.invoke(&mut env, WorkItem::new(4, push_doubled));
        assert_eq!(inv.into_inner(), vec![6, 8]);
    }

    #[test]
    fn closures_are_invokers() {
        let mut seen = Vec::new();
        {
            let mut env = Env::new(Arc::from("t"));
            let mut inv = |env: &mut Env, v: u8| seen.push((env.delivered(), v));
            inv.invoke(&mut env, 7);
            env.bump();
            inv.invoke(&mut env, 9);
        }
        assert_eq!(seen, vec![(0, 7), (1, 9)]);
    }
}
