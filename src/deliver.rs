//! One-call setup: bridge + producer thread + completion signal.
//!
//! [`deliver`] binds a bridge to a consumer-side callable, starts a
//! [`WorkerDriver`] feeding it `0..items`, and returns the consumer to run on
//! the caller's run loop together with the signal that settles once the
//! bridge has fully shut down.

use std::{env, thread::JoinHandle, time::Duration};

use crate::{
    bridge::{BridgeBuilder, CallBridge, Capacity, Consumer, DEFAULT_BURST},
    driver::{DEFAULT_PACING, FailurePolicy, WorkerDriver},
    error::DeliveryError,
    invoke::{CallbackInvoker, Env, WorkItem},
    signal::{CompletionSignal, Resolver, completion},
    util::PinConfig,
};

/// Default number of items delivered.
pub const DEFAULT_ITEMS: usize = 10;

/// Item type carried by bridges created through [`deliver`].
pub type Item<F> = WorkItem<i64, F>;

/// Settings for [`deliver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Number of payloads, delivered as `0..items`.
    pub items: usize,
    /// Pause between successive calls.
    pub pacing: Duration,
    /// Bridge queue capacity.
    pub capacity: Capacity,
    /// Producer reaction to a refused call.
    pub policy: FailurePolicy,
    /// Consumer burst size.
    pub burst: usize,
    /// Optional producer thread pinning.
    pub pin: Option<PinConfig>,
    /// Bridge name; the producer thread is named after it.
    pub name: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEMS,
            pacing: DEFAULT_PACING,
            capacity: Capacity::Unbounded,
            policy: FailurePolicy::Report,
            burst: DEFAULT_BURST,
            pin: None,
            name: String::from("call-bridge"),
        }
    }
}

impl DeliveryConfig {
    /// Defaults overridden by `BRIDGE_ITEMS`, `BRIDGE_DELAY_MS`,
    /// `BRIDGE_CAPACITY` (0 = unbounded), `BRIDGE_POLICY` (`abort`|`report`)
    /// and `BRIDGE_PIN_CORE`. Unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let mut cfg = Self::default();
        if let Some(n) = parse("BRIDGE_ITEMS").and_then(|n| usize::try_from(n).ok()) {
            cfg.items = n;
        }
        if let Some(ms) = parse("BRIDGE_DELAY_MS") {
            cfg.pacing = Duration::from_millis(ms);
        }
        if let Some(limit) = parse("BRIDGE_CAPACITY").and_then(|n| usize::try_from(n).ok()) {
            cfg.capacity = Capacity::from_limit(limit);
        }
        match lookup("BRIDGE_POLICY").as_deref().map(str::trim) {
            Some("abort") => cfg.policy = FailurePolicy::Abort,
            Some("report") => cfg.policy = FailurePolicy::Report,
            _ => {}
        }
        if let Some(core) = parse("BRIDGE_PIN_CORE").and_then(|n| usize::try_from(n).ok()) {
            cfg.pin = Some(PinConfig::core(core));
        }
        cfg
    }

    /// Set the item count.
    pub fn items(mut self, items: usize) -> Self {
        self.items = items;
        self
    }

    /// Set the pause between calls.
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the queue capacity.
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the failure policy.
    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the consumer burst size.
    pub fn burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Pin the producer thread.
    pub fn pin(mut self, pin: PinConfig) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Set the bridge name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A started delivery: run `consumer` on the run-loop thread, await `signal`.
pub struct Delivery<F> {
    /// Non-counting reference for inspection.
    pub bridge: CallBridge<Item<F>>,
    /// Consumer to drive on the run-loop thread.
    pub consumer: Consumer<Item<F>>,
    /// Settles with the accepted item count once the bridge is finalized.
    pub signal: CompletionSignal<usize>,
}

fn call_target<F: FnMut(i64)>(_env: &mut Env, target: &mut F, value: i64) {
    target(value)
}

/// Create a bridge bound to `target`, start delivering `0..config.items` on a
/// new thread, and return the consumer plus its completion signal.
pub fn deliver<F>(target: F, config: &DeliveryConfig) -> Result<Delivery<F>, DeliveryError>
where
    F: FnMut(i64) + Send + 'static,
{
    let count =
        i64::try_from(config.items).map_err(|_| DeliveryError::TooManyItems(config.items))?;
    let (bridge, handle, mut consumer) = BridgeBuilder::new()
        .capacity(config.capacity)
        .name(config.name.clone())
        .burst(config.burst)
        .build::<Item<F>, _>(CallbackInvoker::new(target))?;

    let mut driver = WorkerDriver::new(handle)
        .pacing(config.pacing)
        .policy(config.policy);
    if let Some(pin) = config.pin {
        driver = driver.pin(pin);
    }
    let adapt: fn(&mut Env, &mut F, i64) = call_target::<F>;
    let items = (0..count).map(move |v| WorkItem::new(v, adapt));
    let producer = driver
        .spawn(&format!("{}-producer", config.name), items)
        .map_err(|e| DeliveryError::Spawn(e.to_string()))?;

    let (resolver, signal) = completion();
    consumer.on_finalize(move |env| settle(env, producer, resolver));
    tracing::debug!(bridge = %config.name, items = config.items, "delivery started");

    Ok(Delivery {
        bridge,
        consumer,
        signal,
    })
}

fn settle(
    env: &mut Env,
    producer: JoinHandle<Result<usize, DeliveryError>>,
    resolver: Resolver<usize>,
) {
    // The producer released its handle before finishing, so this join is short.
    let outcome = match producer.join() {
        Ok(result) => result,
        Err(panic) => Err(DeliveryError::ProducerPanicked(panic_message(&*panic))),
    };
    tracing::info!(bridge = env.name(), ok = outcome.is_ok(), "delivery settled");
    resolver.resolve(outcome);
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_harness() {
        let cfg = DeliveryConfig::default();
        assert_eq!(cfg.items, 10);
        assert_eq!(cfg.pacing, Duration::from_millis(200));
        assert_eq!(cfg.capacity, Capacity::Unbounded);
        assert_eq!(cfg.policy, FailurePolicy::Report);
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = DeliveryConfig::from_lookup(lookup(&[
            ("BRIDGE_ITEMS", " 25 "),
            ("BRIDGE_DELAY_MS", "5"),
            ("BRIDGE_CAPACITY", "8"),
            ("BRIDGE_POLICY", "abort"),
            ("BRIDGE_PIN_CORE", "2"),
        ]));
        assert_eq!(cfg.items, 25);
        assert_eq!(cfg.pacing, Duration::from_millis(5));
        assert_eq!(cfg.capacity, Capacity::Bounded(8));
        assert_eq!(cfg.policy, FailurePolicy::Abort);
        assert_eq!(cfg.pin, Some(PinConfig::core(2)));
    }

    #[test]
    fn unparsable_env_keeps_defaults() {
        let cfg = DeliveryConfig::from_lookup(lookup(&[
            ("BRIDGE_ITEMS", "ten"),
            ("BRIDGE_DELAY_MS", "-3"),
            ("BRIDGE_CAPACITY", "0"),
            ("BRIDGE_POLICY", "explode"),
            ("BRIDGE_PIN_CORE", ""),
        ]));
        assert_eq!(cfg, DeliveryConfig::default());
    }

    #[test]
    fn setters_fill_every_field() {
        let cfg = DeliveryConfig::default()
            .items(3)
            .pacing(Duration::ZERO)
            .capacity(Capacity::Bounded(2))
            .policy(FailurePolicy::Abort)
            .burst(4)
            .pin(PinConfig::core(1))
            .name("set");
        assert_eq!(
            cfg,
            DeliveryConfig {
                items: 3,
                pacing: Duration::ZERO,
                capacity: Capacity::Bounded(2),
                policy: FailurePolicy::Abort,
                burst: 4,
                pin: Some(PinConfig::core(1)),
                name: String::from("set"),
            }
        );
    }

    #[test]
    fn panic_messages_are_extracted() {
        let p: Box<dyn core::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*p), "boom");
        let p: Box<dyn core::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*p), "bang");
        let p: Box<dyn core::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*p), "non-string panic payload");
    }
}
