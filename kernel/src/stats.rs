//! Kernel performance counters.
//!
//! Counters are atomics because every simulated thread is carried by a host
//! thread; only one runs at a time but the compiler does not know that.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Statistics {
    total_ticks: AtomicU64,
    idle_ticks: AtomicU64,
    num_address_translations: AtomicU64,
    num_page_faults: AtomicU64,
    num_tlb_misses: AtomicU64,
    num_syscalls: AtomicU64,
    num_context_switches: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance simulated time, returning the new total.
    pub fn advance_ticks(&self, ticks: u64) -> u64 {
        self.total_ticks.fetch_add(ticks, Ordering::Relaxed) + ticks
    }

    pub fn advance_idle_ticks(&self, ticks: u64) {
        self.idle_ticks.fetch_add(ticks, Ordering::Relaxed);
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks.load(Ordering::Relaxed)
    }

    pub fn inc_address_translations(&self) {
        self.num_address_translations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_address_translations(&self) -> u64 {
        self.num_address_translations.load(Ordering::Relaxed)
    }

    pub fn inc_page_faults(&self) {
        self.num_page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_page_faults(&self) -> u64 {
        self.num_page_faults.load(Ordering::Relaxed)
    }

    pub fn inc_tlb_misses(&self) {
        self.num_tlb_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_tlb_misses(&self) -> u64 {
        self.num_tlb_misses.load(Ordering::Relaxed)
    }

    pub fn inc_syscalls(&self) {
        self.num_syscalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_context_switches(&self) {
        self.num_context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_context_switches(&self) -> u64 {
        self.num_context_switches.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Ticks: total {}, idle {}",
            self.total_ticks(),
            self.idle_ticks.load(Ordering::Relaxed)
        )?;
        writeln!(
            f,
            "Memory: {} translations, {} page faults, {} TLB misses",
            self.num_address_translations(),
            self.num_page_faults(),
            self.num_tlb_misses()
        )?;
        write!(
            f,
            "Kernel: {} system calls, {} context switches",
            self.num_syscalls.load(Ordering::Relaxed),
            self.num_context_switches()
        )
    }
}
