//! The kernel context value.
//!
//! One `Kernel` owns every subsystem: the simulated machine, the scheduler,
//! the thread table, the interrupt state, statistics, the backing store and
//! the file-system façade. It is threaded explicitly through all kernel
//! operations; there is no ambient singleton.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use config::machine::BAD_VADDR_REG;
use config::mm::{PAGE_SIZE, USER_DATA_PAGES, USER_STACK_PAGES};
use config::process::MAX_THREAD_NUM;
use config::sched::SYSTEM_TICK;
use mm::address::VirtAddr;
use mutex::SpinLock;

use crate::fs::HostFileSys;
use crate::interrupt::{IntStatus, Interrupt};
use crate::machine::{Machine, MachineConfig};
use crate::stats::Statistics;
use crate::swap::FileBackingStore;
use crate::task::scheduler::{self, SchedPolicy, Scheduler};
use crate::task::thread::{AddrSpace, Thread, ThreadStatus};
use crate::task::{ThreadTable, Tid};
use crate::trap;

/// Boot-time configuration, mostly from the command line.
#[derive(Debug, Clone)]
pub struct KernelOptions {
    pub sched: SchedPolicy,
    pub machine: MachineConfig,
    /// Randomized time slicing, seeded (`-rs`).
    pub random_seed: Option<u64>,
    /// Where per-thread swap files live.
    pub swap_dir: PathBuf,
    /// Alternate console input (`--ci`); stdin when unset.
    pub console_in: Option<PathBuf>,
    /// Alternate console output (`--co`); stdout when unset.
    pub console_out: Option<PathBuf>,
    /// `-f`; meaningful only with a real file system behind the façade.
    pub format_fs: bool,
    /// Network reliability in [0,1] (`-n`); the network model is external.
    pub reliability: f64,
    /// Host id on the simulated network (`-m`).
    pub host_id: u32,
    /// Single-step user programs (`-s`); read by the instruction decoder.
    pub single_step: bool,
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            sched: SchedPolicy::default(),
            machine: MachineConfig::default(),
            random_seed: None,
            swap_dir: std::env::temp_dir().join(format!("oskern-{}", std::process::id())),
            console_in: None,
            console_out: None,
            format_fs: false,
            reliability: 1.0,
            host_id: 0,
            single_step: false,
        }
    }
}

pub struct Kernel {
    pub opts: KernelOptions,
    pub machine: SpinLock<Machine>,
    pub scheduler: SpinLock<Scheduler>,
    pub threads: ThreadTable,
    current: SpinLock<Option<Arc<Thread>>>,
    pub interrupt: Interrupt,
    pub stats: Statistics,
    pub swap: FileBackingStore,
    pub files: HostFileSys,
    exit_status: AtomicI32,
}

/// Scoped interrupt masking: disables on construction, restores the prior
/// level on every exit path.
pub struct InterruptGuard<'a> {
    kernel: &'a Kernel,
    old: IntStatus,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.kernel.set_interrupt_level(self.old);
    }
}

impl Kernel {
    /// Build and initialize a kernel: subsystems up, the caller's thread
    /// registered as `main` and running, interrupts enabled.
    pub fn new(opts: KernelOptions) -> Arc<Kernel> {
        let kernel = Arc::new(Kernel {
            machine: SpinLock::new(Machine::new(&opts.machine)),
            scheduler: SpinLock::new(Scheduler::new(opts.sched)),
            threads: ThreadTable::new(MAX_THREAD_NUM),
            current: SpinLock::new(None),
            interrupt: Interrupt::new(opts.random_seed),
            stats: Statistics::new(),
            swap: FileBackingStore::new(&opts.swap_dir),
            files: HostFileSys::new(opts.console_in.clone(), opts.console_out.clone()),
            exit_status: AtomicI32::new(0),
            opts,
        });
        if kernel.opts.format_fs {
            log::info!("file system façade has nothing to format");
        }
        let policy = kernel.opts.sched;
        let main = kernel.threads.register(|tid| Thread::new(tid, "main", policy));
        main.set_status(ThreadStatus::Running);
        kernel.set_current(main);
        log::info!("kernel initialized");
        kernel
    }

    pub fn current_thread(&self) -> Arc<Thread> {
        self.current
            .lock()
            .clone()
            .expect("no thread is running")
    }

    pub(crate) fn set_current(&self, thread: Arc<Thread>) {
        *self.current.lock() = Some(thread);
    }

    /* ----- interrupt discipline ----- */

    pub fn interrupt_level(&self) -> IntStatus {
        self.interrupt.level()
    }

    /// Change the interrupt level. Re-enabling advances the simulated
    /// clock, which may fire the timer and, at this safe point, a pending
    /// quantum-expiry yield.
    pub fn set_interrupt_level(&self, level: IntStatus) -> IntStatus {
        let old = self.interrupt.change_level(level);
        if old == IntStatus::Off && level == IntStatus::On {
            self.one_tick();
        }
        old
    }

    /// Disable interrupts for the current scope.
    pub fn interrupts_off(&self) -> InterruptGuard<'_> {
        let old = self.set_interrupt_level(IntStatus::Off);
        InterruptGuard { kernel: self, old }
    }

    fn one_tick(&self) {
        let now = self.stats.advance_ticks(SYSTEM_TICK);
        if self.interrupt.timer_due(now) {
            self.alarm();
        }
        if self.interrupt.take_yield_request() {
            self.yield_now();
        }
    }

    /// The timer interrupt: burn a quantum unit under the sliced policies.
    fn alarm(&self) {
        let policy = self.scheduler.lock().policy();
        if !matches!(policy, SchedPolicy::RoundRobin | SchedPolicy::Mlfq) {
            return;
        }
        let current = self.current_thread();
        if current.consume_quantum() <= 0 {
            log::debug!("quantum expired for {}", current.name());
            self.interrupt.request_yield();
        }
    }

    /* ----- thread lifecycle ----- */

    /// Register a new thread control block. Start it with [`Kernel::fork`].
    pub fn new_thread(&self, name: &str) -> Arc<Thread> {
        let policy = self.scheduler.lock().policy();
        self.threads.register(|tid| Thread::new(tid, name, policy))
    }

    /// Start `thread` running `body` concurrently with the caller. Under
    /// static priority the caller yields immediately when the new thread
    /// outranks it.
    pub fn fork<F>(self: &Arc<Self>, thread: &Arc<Thread>, body: F)
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        log::debug!("forking thread {}", thread.name());
        thread.alloc_stack();
        let kernel = Arc::clone(self);
        let t = Arc::clone(thread);
        let handle = std::thread::Builder::new()
            .name(t.name().to_string())
            .spawn(move || {
                t.park(); // until first dispatched
                kernel.thread_begin(&t);
                body(&kernel);
                kernel.finish_current();
            })
            .expect("cannot spawn host thread");
        *thread.os_handle.lock() = Some(handle);

        let old = self.set_interrupt_level(IntStatus::Off);
        self.scheduler.lock().ready_to_run(thread);
        self.set_interrupt_level(old);

        let preempted = {
            let scheduler = self.scheduler.lock();
            matches!(scheduler.policy(), SchedPolicy::StaticPriority)
                && scheduler
                    .front_priority()
                    .is_some_and(|p| p < self.current_thread().priority())
        };
        if preempted {
            self.yield_now();
        }
    }

    /// First code a forked thread runs: reap the thread we were switched
    /// from if it finished, then open interrupts.
    fn thread_begin(&self, thread: &Arc<Thread>) {
        assert_eq!(self.current_thread().tid(), thread.tid());
        log::debug!("beginning thread {}", thread.name());
        self.check_to_be_destroyed();
        self.set_interrupt_level(IntStatus::On);
    }

    /// Relinquish the CPU if another thread is ready; return when
    /// rescheduled.
    pub fn yield_now(&self) {
        let old = self.set_interrupt_level(IntStatus::Off);
        let current = self.current_thread();
        log::debug!("yielding thread {}", current.name());
        let next = self.scheduler.lock().find_next();
        if let Some(tid) = next {
            let next = self.threads.get(tid).expect("ready thread vanished");
            self.scheduler.lock().ready_to_run(&current);
            scheduler::run(self, next, false);
        }
        self.set_interrupt_level(old);
    }

    /// Relinquish the CPU without becoming ready: the thread blocked on a
    /// primitive (or, with `finishing`, is done for good). Interrupts must
    /// already be off.
    pub fn sleep(&self, finishing: bool) {
        self.interrupt.assert_off();
        let current = self.current_thread();
        log::debug!("sleeping thread {}", current.name());
        self.scheduler.lock().block(&current, finishing);
        loop {
            let next = self.scheduler.lock().find_next();
            match next {
                Some(tid) => {
                    let next = self.threads.get(tid).expect("ready thread vanished");
                    scheduler::run(self, next, finishing);
                    return;
                }
                None => self.machine_idle(),
            }
        }
    }

    /// End the current thread. Its storage is reclaimed by the next thread
    /// scheduled; a stack cannot free itself.
    pub fn finish_current(&self) {
        self.set_interrupt_level(IntStatus::Off);
        let current = self.current_thread();
        log::debug!("finishing thread {}", current.name());
        self.sleep(true);
        // The switch away returned on this host thread; it now unwinds out
        // of the thread body and exits.
    }

    /// Reap the previously running thread if it finished. The host thread
    /// behind it is detached, not joined: a thread killed mid-computation
    /// abandons its stack and parks its host thread forever, so a join
    /// here could wait on a thread that never exits.
    pub(crate) fn check_to_be_destroyed(&self) {
        let tid = self.scheduler.lock().to_be_destroyed.take();
        if let Some(tid) = tid {
            assert_ne!(tid, self.current_thread().tid(), "thread destroying itself");
            if let Some(zombie) = self.threads.remove(tid) {
                drop(zombie.os_handle.lock().take());
                log::debug!("destroyed thread {}", zombie.name());
            }
        }
    }

    /// Make a blocked thread runnable again. Interrupts must be off.
    pub(crate) fn ready_thread(&self, tid: Tid) {
        self.interrupt.assert_off();
        if let Some(thread) = self.threads.get(tid) {
            self.scheduler.lock().ready_to_run(&thread);
        }
    }

    /// No thread is ready and none can become ready without one running:
    /// the simulation is over.
    fn machine_idle(&self) -> ! {
        if !self.scheduler.lock().blocked_is_empty() {
            log::warn!("halting with threads still blocked");
        }
        self.stats.advance_idle_ticks(SYSTEM_TICK);
        self.halt(self.exit_status.load(Ordering::Relaxed))
    }

    pub(crate) fn record_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Relaxed);
    }

    /// Print statistics and stop the simulation.
    pub fn halt(&self, status: i32) -> ! {
        println!("Machine halting!");
        println!("{}", self.stats);
        std::process::exit(status)
    }

    /* ----- memory, the instruction-model boundary ----- */

    /// Read `size` bytes of user memory at `vaddr`. On a failed
    /// translation the exception is raised to the handler and `None` comes
    /// back; the faulting instruction re-executes.
    pub fn read_mem(&self, vaddr: usize, size: usize) -> Option<i32> {
        let tid = self.current_thread().tid();
        let result =
            self.machine
                .lock()
                .read_mem(tid, VirtAddr::new(vaddr), size, &self.stats, &self.swap);
        match result {
            Ok(value) => Some(value),
            Err(kind) => {
                self.raise_exception(kind, vaddr);
                None
            }
        }
    }

    /// Write `size` bytes of `value` to user memory at `vaddr`. Returns
    /// whether the write took effect.
    pub fn write_mem(&self, vaddr: usize, size: usize, value: i32) -> bool {
        let tid = self.current_thread().tid();
        let result = self.machine.lock().write_mem(
            tid,
            VirtAddr::new(vaddr),
            size,
            value,
            &self.stats,
            &self.swap,
        );
        match result {
            Ok(()) => true,
            Err(kind) => {
                self.raise_exception(kind, vaddr);
                false
            }
        }
    }

    /// Hand a machine exception to the kernel handler.
    pub fn raise_exception(&self, kind: crate::machine::ExceptionKind, vaddr: usize) {
        self.machine
            .lock()
            .write_register(BAD_VADDR_REG, vaddr as i32);
        trap::handle_exception(self, kind);
    }

    /* ----- address spaces, suspend and resume ----- */

    /// Give `thread` a user address space sized for `code_size` bytes of
    /// program plus the fixed data and stack pages.
    pub fn create_address_space(&self, thread: &Arc<Thread>, code_size: usize) {
        let num_pages = code_size.div_ceil(PAGE_SIZE) + USER_DATA_PAGES + USER_STACK_PAGES;
        self.machine
            .lock()
            .tables_mut()
            .create_table(thread.tid(), num_pages);
        thread.set_space(Some(AddrSpace { num_pages }));
        log::debug!(
            "address space for {}: {num_pages} pages",
            thread.name()
        );
    }

    /// Push a ready thread out of memory: its resident pages go to its
    /// swap file. Returns whether the thread was suspended.
    pub fn suspend_thread(&self, tid: Tid) -> bool {
        let _guard = self.interrupts_off();
        let Some(thread) = self.threads.get(tid) else {
            return false;
        };
        let mut scheduler = self.scheduler.lock();
        if !scheduler.remove_from_ready(tid) {
            return false;
        }
        scheduler.note_suspended(&thread);
        drop(scheduler);
        let saved = self.machine.lock().save_resident_pages(tid, &self.swap);
        log::debug!("suspended {} ({saved} pages out)", thread.name());
        true
    }

    /// Bring a suspended thread back: reload its pages and ready it.
    pub fn resume_thread(&self, tid: Tid) -> bool {
        let _guard = self.interrupts_off();
        let Some(thread) = self.threads.get(tid) else {
            return false;
        };
        if thread.status() != ThreadStatus::Suspended {
            return false;
        }
        let loaded = self.machine.lock().load_resident_pages(tid, &self.swap);
        self.scheduler.lock().ready_to_run(&thread);
        log::debug!("resumed {} ({loaded} pages in)", thread.name());
        true
    }

    /// One line per live thread, for the console.
    pub fn thread_report(&self) -> String {
        let mut out = String::from("tid\tname\towner\tstatus\tpriority\n");
        for t in self.threads.snapshot() {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                t.tid(),
                t.name(),
                t.user_id(),
                t.status().as_str(),
                t.priority()
            ));
        }
        out
    }
}
