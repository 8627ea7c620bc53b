//! Behaviour that only shows at process level: environment configuration and
//! `FailurePolicy::Abort`. Each test re-runs this binary filtered to itself;
//! the child branch runs when `CALL_BRIDGE_CHILD` names the test.

use std::env;
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

use call_bridge::prelude::*;
use call_bridge::{DeliveryConfig, FailurePolicy, PinConfig};

const CHILD_VAR: &str = "CALL_BRIDGE_CHILD";

fn is_child(test: &str) -> bool {
    env::var(CHILD_VAR).is_ok_and(|v| v == test)
}

fn rerun(test: &str, vars: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env::current_exe().unwrap());
    cmd.args(["--exact", test, "--nocapture", "--test-threads=1"])
        .env(CHILD_VAR, test);
    for (key, _) in env::vars().filter(|(k, _)| k.starts_with("BRIDGE_")) {
        cmd.env_remove(key);
    }
    for &(key, value) in vars {
        cmd.env(key, value);
    }
    cmd.output().unwrap()
}

fn describe(out: &Output) -> String {
    format!(
        "status: {:?}\nstdout:\n{}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

#[test]
fn from_env_reads_bridge_variables() {
    const NAME: &str = "from_env_reads_bridge_variables";
    if is_child(NAME) {
        let cfg = DeliveryConfig::from_env();
        assert_eq!(cfg.items, 3);
        // Unparsable: default kept.
        assert_eq!(cfg.pacing, Duration::from_millis(200));
        // Zero means unbounded.
        assert_eq!(cfg.capacity, Capacity::Unbounded);
        assert_eq!(cfg.policy, FailurePolicy::Abort);
        assert_eq!(cfg.pin, Some(PinConfig::core(1)));
        return;
    }

    let out = rerun(
        NAME,
        &[
            ("BRIDGE_ITEMS", "3"),
            ("BRIDGE_DELAY_MS", "soon"),
            ("BRIDGE_CAPACITY", "0"),
            ("BRIDGE_POLICY", "abort"),
            ("BRIDGE_PIN_CORE", "1"),
        ],
    );
    assert!(out.status.success(), "{}", describe(&out));
}

#[test]
fn abort_policy_kills_process_on_rejected_call() {
    const NAME: &str = "abort_policy_kills_process_on_rejected_call";
    if is_child(NAME) {
        let (bridge, handle, _consumer) = BridgeBuilder::new()
            .capacity(Capacity::Bounded(1))
            .build::<u32, _>(|_env: &mut Env, _v: u32| {})
            .unwrap();
        let admin = handle.acquire().unwrap();
        let producer = WorkerDriver::new(handle)
            .pacing(Duration::ZERO)
            .policy(FailurePolicy::Abort)
            .spawn("doomed-producer", 0..5u32)
            .unwrap();

        // Nobody drains: the second call blocks on the full queue.
        let deadline = Instant::now() + Duration::from_secs(5);
        while bridge.pending() < 1 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        admin.abort();

        let _ = producer.join();
        panic!("producer returned instead of aborting the process");
    }

    let out = rerun(NAME, &[]);
    assert!(!out.status.success(), "{}", describe(&out));
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(out.status.signal(), Some(libc::SIGABRT), "{}", describe(&out));
    }
}
