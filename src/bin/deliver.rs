use std::process::ExitCode;

use call_bridge::{DeliveryConfig, deliver};

fn main() -> ExitCode {
    // Default to INFO, RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cfg = DeliveryConfig::from_env();
    tracing::info!(
        items = cfg.items,
        pacing_ms = cfg.pacing.as_millis() as u64,
        capacity = ?cfg.capacity,
        policy = ?cfg.policy,
        "starting delivery"
    );

    let delivery = match deliver(|v| println!("value: {v}"), &cfg) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // The main thread is the run loop.
    let mut consumer = delivery.consumer;
    consumer.run();

    match delivery.signal.wait() {
        Ok(n) => {
            println!("resolved: true ({n} items)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("resolved with failure: {e}");
            ExitCode::FAILURE
        }
    }
}
