//! Best-effort pinning for producer threads.
//!
//! Linux:
//!   - CPU pin: pthread_setaffinity_np on the current thread.
//! macOS:
//!   - Affinity tag: thread_policy_set(THREAD_AFFINITY_POLICY).
//!
//! Other targets ignore the configuration.

/// Where to place a producer thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinConfig {
    /// Logical core to pin the thread to (Linux only).
    pub core_id: Option<usize>,
    /// Mach thread affinity tag (macOS only).
    pub mac_affinity_tag: Option<i32>,
}

impl PinConfig {
    /// Pin to a single logical core.
    pub fn core(core_id: usize) -> Self {
        Self {
            core_id: Some(core_id),
            mac_affinity_tag: None,
        }
    }
}

/// Apply `cfg` to the calling thread. Returns whether the OS accepted it.
pub fn pin_current_thread(cfg: &PinConfig) -> bool {
    let applied = apply(cfg);
    if applied {
        tracing::debug!(?cfg, "pinned producer thread");
    } else if cfg.core_id.is_some() || cfg.mac_affinity_tag.is_some() {
        tracing::warn!(?cfg, "thread pinning was not applied");
    }
    applied
}

#[cfg(target_os = "linux")]
fn apply(cfg: &PinConfig) -> bool {
    let Some(core) = cfg.core_id else {
        return false;
    };
    if core >= libc::CPU_SETSIZE as usize {
        return false;
    }
    // SAFETY: cpu_set_t is plain data; the set is fully initialized before use
    // and only passed by pointer to the current thread's affinity call.
    unsafe {
        let mut set: libc::cpu_set_t = core::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            core::mem::size_of::<libc::cpu_set_t>(),
            &set,
        ) == 0
    }
}

#[cfg(target_os = "macos")]
fn apply(cfg: &PinConfig) -> bool {
    let Some(tag) = cfg.mac_affinity_tag else {
        return false;
    };
    #[repr(C)]
    struct ThreadAffinityPolicy {
        affinity_tag: libc::integer_t,
    }
    unsafe extern "C" {
        fn mach_thread_self() -> libc::mach_port_t;
        fn thread_policy_set(
            thread: libc::mach_port_t,
            flavor: libc::c_int,
            policy_info: *const libc::integer_t,
            count: libc::mach_msg_type_number_t,
        ) -> libc::kern_return_t;
    }
    const THREAD_AFFINITY_POLICY: libc::c_int = 4;
    let pol = ThreadAffinityPolicy { affinity_tag: tag };
    let cnt = (core::mem::size_of::<ThreadAffinityPolicy>()
        / core::mem::size_of::<libc::integer_t>()) as libc::mach_msg_type_number_t;
    // SAFETY: the policy struct outlives the call and matches the Mach layout.
    unsafe {
        thread_policy_set(
            mach_thread_self(),
            THREAD_AFFINITY_POLICY,
            (&pol as *const ThreadAffinityPolicy).cast(),
            cnt,
        ) == 0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn apply(_cfg: &PinConfig) -> bool {
    false
}
