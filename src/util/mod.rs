/// Producer thread pinning.
pub mod affinity;
pub(crate) mod scope;
/// Wait budget utilities for spin-then-park loops.
pub mod wait;

pub use affinity::{PinConfig, pin_current_thread};
pub use wait::WaitBudget;
