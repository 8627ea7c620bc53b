//! Item queue backing a bridge: a bounded MPMC ring or an unbounded segment queue.

use crossbeam_queue::{ArrayQueue, SegQueue};

use crate::error::BridgeError;

/// Queue capacity chosen at bridge construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Capacity {
    /// Never reports full.
    #[default]
    Unbounded,
    /// At most `n` items queued at once; `n` must be positive.
    Bounded(usize),
}

impl Capacity {
    /// Map a raw limit to a capacity, where `0` means unbounded.
    pub fn from_limit(limit: usize) -> Self {
        if limit == 0 {
            Self::Unbounded
        } else {
            Self::Bounded(limit)
        }
    }
}

pub(crate) enum ItemQueue<I> {
    Bounded(ArrayQueue<I>),
    Unbounded(SegQueue<I>),
}

impl<I> ItemQueue<I> {
    pub(crate) fn new(capacity: Capacity) -> Result<Self, BridgeError> {
        match capacity {
            Capacity::Unbounded => Ok(Self::Unbounded(SegQueue::new())),
            Capacity::Bounded(0) => Err(BridgeError::InvalidCapacity),
            Capacity::Bounded(n) => Ok(Self::Bounded(ArrayQueue::new(n))),
        }
    }

    /// Enqueue at the tail; hands the item back when a bounded queue is full.
    #[inline]
    pub(crate) fn push(&self, item: I) -> Result<(), I> {
        match self {
            Self::Bounded(q) => q.push(item),
            Self::Unbounded(q) => {
                q.push(item);
                Ok(())
            }
        }
    }

    #[inline]
    pub(crate) fn pop(&self) -> Option<I> {
        match self {
            Self::Bounded(q) => q.pop(),
            Self::Unbounded(q) => q.pop(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Bounded(q) => q.len(),
            Self::Unbounded(q) => q.len(),
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Self::Bounded(q) => q.is_empty(),
            Self::Unbounded(q) => q.is_empty(),
        }
    }
}
