//! WorkerDriver: pushes a finite sequence of items through one bridge handle.

use std::{
    io,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    bridge::BridgeHandle,
    error::DeliveryError,
    util::{PinConfig, pin_current_thread},
};

/// Default pause between successive calls.
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);

/// What the driver does when a blocking call is refused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and abort the process.
    Abort,
    /// Release the handle and return [`DeliveryError::Rejected`].
    #[default]
    Report,
}

/// Producer loop owning one bridge handle.
pub struct WorkerDriver<I> {
    handle: BridgeHandle<I>,
    pacing: Duration,
    policy: FailurePolicy,
    pin: Option<PinConfig>,
}

impl<I: Send + 'static> WorkerDriver<I> {
    /// Drive `handle` with default pacing and the `Report` policy.
    pub fn new(handle: BridgeHandle<I>) -> Self {
        Self {
            handle,
            pacing: DEFAULT_PACING,
            policy: FailurePolicy::default(),
            pin: None,
        }
    }

    /// Pause between successive calls; zero disables it.
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Reaction to a refused blocking call.
    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pin the producer thread before the first call.
    pub fn pin(mut self, pin: PinConfig) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Call every item in order on the current thread, then release the handle.
    ///
    /// Returns the number of accepted items.
    pub fn drive<It>(self, items: It) -> Result<usize, DeliveryError>
    where
        It: IntoIterator<Item = I>,
    {
        let Self {
            handle,
            pacing,
            policy,
            pin,
        } = self;
        if let Some(cfg) = pin {
            pin_current_thread(&cfg);
        }

        let mut delivered = 0usize;
        for item in items {
            if delivered > 0 && !pacing.is_zero() {
                thread::sleep(pacing);
            }
            if let Err(rejected) = handle.blocking_call(item) {
                let reason = rejected.reason();
                match policy {
                    FailurePolicy::Abort => {
                        tracing::error!(%reason, delivered, "blocking call failed; aborting");
                        std::process::abort();
                    }
                    FailurePolicy::Report => {
                        tracing::warn!(%reason, delivered, "blocking call failed; stopping producer");
                        handle.release();
                        return Err(DeliveryError::Rejected { delivered });
                    }
                }
            }
            delivered += 1;
        }

        tracing::debug!(delivered, "producer done");
        handle.release();
        Ok(delivered)
    }

    /// Run [`drive`](Self::drive) on a new named thread.
    pub fn spawn<It>(self, name: &str, items: It) -> io::Result<JoinHandle<Result<usize, DeliveryError>>>
    where
        It: IntoIterator<Item = I> + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.drive(items))
    }
}

impl<I> core::fmt::Debug for WorkerDriver<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerDriver")
            .field("handle", &self.handle)
            .field("pacing", &self.pacing)
            .field("policy", &self.policy)
            .finish()
    }
}
