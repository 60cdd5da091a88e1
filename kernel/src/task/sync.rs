//! Synchronization primitives, built atop interrupt masking.
//!
//! Masking is sufficient mutual exclusion because the simulated machine is
//! a uniprocessor. A `V` hands its permit directly to a waiter when one
//! exists, so a woken `P` returns without decrementing; the ordering
//! guarantee is that the `V` happens before the matching `P` returns.

use std::collections::VecDeque;

use mutex::SpinLock;

use super::Tid;
use crate::kernel::Kernel;

pub struct Semaphore {
    name: String,
    inner: SpinLock<SemInner>,
}

struct SemInner {
    value: usize,
    waiters: VecDeque<Tid>,
}

impl Semaphore {
    pub fn new(name: &str, value: usize) -> Self {
        Semaphore {
            name: name.to_string(),
            inner: SpinLock::new(SemInner {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait: take a permit, sleeping until one is handed over.
    pub fn p(&self, kernel: &Kernel) {
        let _guard = kernel.interrupts_off();
        let mut inner = self.inner.lock();
        if inner.value == 0 {
            inner.waiters.push_back(kernel.current_thread().tid());
            log::trace!("semaphore {}: wait", self.name);
            drop(inner);
            kernel.sleep(false);
        } else {
            inner.value -= 1;
        }
    }

    /// Signal: wake one waiter, handing it the permit, or bank the permit.
    pub fn v(&self, kernel: &Kernel) {
        let _guard = kernel.interrupts_off();
        let mut inner = self.inner.lock();
        match inner.waiters.pop_front() {
            Some(tid) => {
                drop(inner);
                log::trace!("semaphore {}: wake {tid}", self.name);
                kernel.ready_thread(tid);
            }
            None => inner.value += 1,
        }
    }
}

/// Mutual exclusion with an owner: only the holder may release.
pub struct Lock {
    name: String,
    sem: Semaphore,
    holder: SpinLock<Option<Tid>>,
}

impl Lock {
    pub fn new(name: &str) -> Self {
        Lock {
            name: name.to_string(),
            sem: Semaphore::new(name, 1),
            holder: SpinLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn acquire(&self, kernel: &Kernel) {
        assert!(
            !self.held_by_current_thread(kernel),
            "lock {} acquired twice by its holder",
            self.name
        );
        self.sem.p(kernel);
        *self.holder.lock() = Some(kernel.current_thread().tid());
    }

    pub fn release(&self, kernel: &Kernel) {
        assert!(
            self.held_by_current_thread(kernel),
            "lock {} released by a non-holder",
            self.name
        );
        *self.holder.lock() = None;
        self.sem.v(kernel);
    }

    pub fn held_by_current_thread(&self, kernel: &Kernel) -> bool {
        *self.holder.lock() == Some(kernel.current_thread().tid())
    }
}

/// Mesa-style condition variable: signalling does not transfer the lock,
/// so a woken waiter reacquires it and must re-check its predicate.
pub struct Condition {
    name: String,
    waiters: SpinLock<VecDeque<Tid>>,
}

impl Condition {
    pub fn new(name: &str) -> Self {
        Condition {
            name: name.to_string(),
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release `lock`, sleep until signalled, reacquire `lock`.
    pub fn wait(&self, kernel: &Kernel, lock: &Lock) {
        assert!(lock.held_by_current_thread(kernel));
        let _guard = kernel.interrupts_off();
        self.waiters
            .lock()
            .push_back(kernel.current_thread().tid());
        lock.release(kernel);
        kernel.sleep(false);
        lock.acquire(kernel);
    }

    /// Wake at most one waiter.
    pub fn signal(&self, kernel: &Kernel) {
        let _guard = kernel.interrupts_off();
        let woken = self.waiters.lock().pop_front();
        if let Some(tid) = woken {
            kernel.ready_thread(tid);
        }
    }

    /// Wake every waiter.
    pub fn broadcast(&self, kernel: &Kernel) {
        let _guard = kernel.interrupts_off();
        let woken: Vec<Tid> = self.waiters.lock().drain(..).collect();
        for tid in woken {
            kernel.ready_thread(tid);
        }
    }
}

/// N-party rendezvous: the last arrival wakes everyone. Reusable across
/// rounds via a generation count.
pub struct Barrier {
    lock: Lock,
    cond: Condition,
    inner: SpinLock<BarrierInner>,
    parties: usize,
}

struct BarrierInner {
    count: usize,
    generation: usize,
}

impl Barrier {
    pub fn new(name: &str, parties: usize) -> Self {
        assert!(parties > 0);
        Barrier {
            lock: Lock::new(name),
            cond: Condition::new(name),
            inner: SpinLock::new(BarrierInner {
                count: 0,
                generation: 0,
            }),
            parties,
        }
    }

    /// Block until `parties` threads have arrived.
    pub fn arrive(&self, kernel: &Kernel) {
        self.lock.acquire(kernel);
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        inner.count += 1;
        if inner.count == self.parties {
            inner.count = 0;
            inner.generation += 1;
            drop(inner);
            self.cond.broadcast(kernel);
        } else {
            drop(inner);
            while self.inner.lock().generation == generation {
                self.cond.wait(kernel, &self.lock);
            }
        }
        self.lock.release(kernel);
    }
}
