//! The thread control block.
//!
//! A thread is owned by the thread table as an `Arc<Thread>`; the scheduler,
//! wait lists and `current` refer to it by tid. Each simulated thread is
//! carried by a host thread, and the baton below is the context-switch
//! primitive: exactly one baton in the whole kernel holds the token at any
//! moment, so exactly one simulated thread runs.

use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;

use config::machine::NUM_TOTAL_REGS;
use config::process::{STACK_FENCEPOST, STACK_SIZE};
use config::sched::{DEFAULT_PRIORITY, TIME_SLICE};
use mutex::SpinLock;

use super::scheduler::SchedPolicy;
use super::Tid;
use crate::machine::Machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
    Suspended,
    Zombie,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::JustCreated => "just created",
            ThreadStatus::Ready => "ready",
            ThreadStatus::Running => "running",
            ThreadStatus::Blocked => "blocked",
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Zombie => "zombie",
        }
    }
}

/// What the kernel remembers about a user address space: how many pages the
/// forward page table spans. The mappings themselves live on the machine.
#[derive(Debug, Clone, Copy)]
pub struct AddrSpace {
    pub num_pages: usize,
}

/// Simulated kernel stack. The fencepost word at the base is checked on
/// every context switch; an overwritten fencepost means the stack overflowed.
struct KernelStack {
    words: Vec<u32>,
}

impl KernelStack {
    fn new() -> Self {
        let mut words = vec![0u32; STACK_SIZE];
        words[0] = STACK_FENCEPOST;
        KernelStack { words }
    }

    fn check(&self) {
        assert_eq!(self.words[0], STACK_FENCEPOST, "thread stack overflowed");
    }
}

/// One-token handoff used to switch between simulated threads.
struct Baton {
    token: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    fn new() -> Self {
        Baton {
            token: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Block the host thread until the token arrives, consuming it.
    fn wait(&self) {
        let mut token = self.token.lock().unwrap();
        while !*token {
            token = self.cv.wait(token).unwrap();
        }
        *token = false;
    }

    /// Hand the token over, waking the owner.
    fn post(&self) {
        *self.token.lock().unwrap() = true;
        self.cv.notify_one();
    }
}

pub(crate) struct SchedState {
    pub status: ThreadStatus,
    pub priority: i32,
    pub remain_time: i32,
}

pub struct Thread {
    tid: Tid,
    name: String,
    user_id: u32,
    pub(crate) sched: SpinLock<SchedState>,
    user_regs: SpinLock<[i32; NUM_TOTAL_REGS]>,
    space: SpinLock<Option<AddrSpace>>,
    stack: SpinLock<Option<KernelStack>>,
    baton: Baton,
    pub(crate) os_handle: SpinLock<Option<JoinHandle<()>>>,
}

impl Thread {
    /// A control block ready for `Kernel::fork`. The starting priority
    /// depends on the scheduling policy: static priority hands out
    /// `DEFAULT_PRIORITY`, MLFQ starts one below level 0 so that the first
    /// `ready_to_run` lands the thread on level 0.
    pub(crate) fn new(tid: Tid, name: &str, policy: SchedPolicy) -> Self {
        let priority = match policy {
            SchedPolicy::StaticPriority => DEFAULT_PRIORITY,
            SchedPolicy::Mlfq => -1,
            _ => 0,
        };
        Thread {
            tid,
            name: name.to_string(),
            user_id: 0,
            sched: SpinLock::new(SchedState {
                status: ThreadStatus::JustCreated,
                priority,
                remain_time: TIME_SLICE,
            }),
            user_regs: SpinLock::new([0; NUM_TOTAL_REGS]),
            space: SpinLock::new(None),
            stack: SpinLock::new(None),
            baton: Baton::new(),
            os_handle: SpinLock::new(None),
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn status(&self) -> ThreadStatus {
        self.sched.lock().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.sched.lock().status = status;
    }

    pub fn priority(&self) -> i32 {
        self.sched.lock().priority
    }

    pub fn set_priority(&self, priority: i32) {
        self.sched.lock().priority = priority;
    }

    pub fn remain_time(&self) -> i32 {
        self.sched.lock().remain_time
    }

    /// Burn one quantum unit; returns the remaining amount.
    pub(crate) fn consume_quantum(&self) -> i32 {
        let mut sched = self.sched.lock();
        sched.remain_time -= 1;
        sched.remain_time
    }

    pub fn space(&self) -> Option<AddrSpace> {
        *self.space.lock()
    }

    pub fn set_space(&self, space: Option<AddrSpace>) {
        *self.space.lock() = space;
    }

    /// Give the thread its kernel stack, fencepost planted.
    pub(crate) fn alloc_stack(&self) {
        *self.stack.lock() = Some(KernelStack::new());
    }

    /// Check for an undetected stack overflow. The main thread got its
    /// stack from the host and has nothing to check.
    pub fn check_overflow(&self) {
        if let Some(stack) = self.stack.lock().as_ref() {
            stack.check();
        }
    }

    /// Save the user-mode register file across a context switch.
    pub(crate) fn save_user_state(&self, machine: &Machine) {
        *self.user_regs.lock() = *machine.registers();
    }

    /// Restore the user-mode register file after a context switch.
    pub(crate) fn restore_user_state(&self, machine: &mut Machine) {
        *machine.registers_mut() = *self.user_regs.lock();
    }

    /// Park the host thread carrying this simulated thread.
    pub(crate) fn park(&self) {
        self.baton.wait();
    }

    /// Hand the CPU token to this thread.
    pub(crate) fn unpark(&self) {
        self.baton.post();
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("status", &self.status().as_str())
            .finish()
    }
}
