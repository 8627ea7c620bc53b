/// Hot wait budget: bounded spin then yield, after which the caller should park.
#[derive(Copy, Clone, Debug)]
pub struct WaitBudget {
    spins: u32,
    yields: u32,
    spin_cap: u32,
    yield_cap: u32,
}

impl WaitBudget {
    /// Budget for producers stalled on a full queue, where the consumer
    /// usually frees a slot within a few microseconds.
    #[inline]
    pub fn hot() -> Self {
        Self {
            spins: 0,
            yields: 0,
            spin_cap: 128,
            yield_cap: 8,
        }
    }

    /// Perform one step of the wait strategy.
    ///
    /// Returns `false` once the budget is spent; the caller parks from then on.
    #[inline]
    pub fn step(&mut self) -> bool {
        if self.spins < self.spin_cap {
            core::hint::spin_loop();
            self.spins += 1;
            true
        } else if self.yields < self.yield_cap {
            std::thread::yield_now();
            self.yields += 1;
            true
        } else {
            false
        }
    }

    /// Whether `step` would still spin or yield.
    #[inline]
    pub fn has_budget(&self) -> bool {
        self.spins < self.spin_cap || self.yields < self.yield_cap
    }
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            spins: 0,
            yields: 0,
            spin_cap: 64,
            yield_cap: 4,
        }
    }
}
