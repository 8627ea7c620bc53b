#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]

//! Cross-thread call bridge: producer threads hand work items to a single
//! run-loop thread through a counted, optionally bounded queue. The run loop
//! delivers items in admission order and, after the last producer handle is
//! released and the queue is drained, runs a one-time finalizer that can
//! settle a [`CompletionSignal`].

mod bridge;
mod deliver;
mod driver;
mod error;
mod invoke;
mod signal;
/// Thread pinning and wait strategies.
pub mod util;

pub use bridge::{
    BridgeBuilder, BridgeHandle, BridgeState, CallBridge, CallMode, Capacity, Consumer,
    DEFAULT_BURST, Turn,
};
pub use deliver::{DEFAULT_ITEMS, Delivery, DeliveryConfig, Item, deliver};
pub use driver::{DEFAULT_PACING, FailurePolicy, WorkerDriver};
pub use error::{BridgeError, DeliveryError, Rejected};
pub use invoke::{CallbackInvoker, Env, Invoker, WorkItem};
pub use signal::{CompletionSignal, Outcome, Resolver, completion};
pub use util::{PinConfig, pin_current_thread};

/// Common imports for producers and run loops.
pub mod prelude {
    pub use crate::{
        BridgeBuilder, BridgeHandle, CallBridge, CallMode, Capacity, CompletionSignal, Consumer,
        Env, Turn, WorkItem, WorkerDriver,
    };
}
