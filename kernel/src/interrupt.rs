//! The simulated interrupt controller.
//!
//! The machine is a uniprocessor, so masking interrupts is the kernel's
//! mutual exclusion. Simulated time advances whenever the level goes from
//! off back to on; every `TIMER_TICKS` of simulated time the timer fires,
//! which is the only source of preemption. The actual level changes go
//! through [`crate::Kernel::set_interrupt_level`], which owns the follow-up
//! work (advancing the clock, honoring a pending yield).

use config::sched::TIMER_TICKS;
use mutex::SpinLock;
use rand::{Rng, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntStatus {
    Off,
    On,
}

pub struct Interrupt {
    inner: SpinLock<IntrInner>,
}

struct IntrInner {
    level: IntStatus,
    /// Set by the timer when the runner's quantum expires; honored at the
    /// next moment interrupts are enabled.
    yield_on_return: bool,
    /// Simulated time at which the timer fires next.
    next_timer: u64,
    /// Randomized time slicing (`-rs`).
    rng: Option<StdRng>,
}

impl Interrupt {
    pub fn new(random_seed: Option<u64>) -> Self {
        Interrupt {
            inner: SpinLock::new(IntrInner {
                level: IntStatus::On,
                yield_on_return: false,
                next_timer: TIMER_TICKS,
                rng: random_seed.map(StdRng::seed_from_u64),
            }),
        }
    }

    pub fn level(&self) -> IntStatus {
        self.inner.lock().level
    }

    pub fn assert_off(&self) {
        assert_eq!(
            self.level(),
            IntStatus::Off,
            "interrupts must be disabled here"
        );
    }

    /// Flip the level flag, returning the previous level. The caller handles
    /// the clock tick an off->on transition implies.
    pub(crate) fn change_level(&self, level: IntStatus) -> IntStatus {
        let mut inner = self.inner.lock();
        std::mem::replace(&mut inner.level, level)
    }

    /// Whether the timer fires at simulated time `now`; reschedules it if so.
    pub(crate) fn timer_due(&self, now: u64) -> bool {
        let mut inner = self.inner.lock();
        if now < inner.next_timer {
            return false;
        }
        let interval = match inner.rng.as_mut() {
            Some(rng) => rng.gen_range(1..=TIMER_TICKS),
            None => TIMER_TICKS,
        };
        inner.next_timer = now + interval;
        true
    }

    pub(crate) fn request_yield(&self) {
        self.inner.lock().yield_on_return = true;
    }

    /// Consume a pending yield request, but only once interrupts are back on.
    pub(crate) fn take_yield_request(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.level == IntStatus::On && inner.yield_on_return {
            inner.yield_on_return = false;
            true
        } else {
            false
        }
    }
}
