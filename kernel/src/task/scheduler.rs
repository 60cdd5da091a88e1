//! Thread dispatch: ready structures, policy, and the context switch.
//!
//! Every entry point assumes interrupts are already disabled; on a
//! uniprocessor that is mutual exclusion. Locks cannot serve here — waiting
//! on one would recurse into `find_next`.

use std::collections::VecDeque;
use std::sync::Arc;

use config::sched::{MLFQ_TIME_SLICE, QUEUE_NUM, TIME_SLICE};

use super::thread::{Thread, ThreadStatus};
use super::Tid;
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Straight FIFO.
    #[default]
    Fifo,
    /// Preemptive static priority; a smaller number wins, ties are FIFO.
    StaticPriority,
    /// FIFO with a fixed quantum refreshed on every ready.
    RoundRobin,
    /// Multi-level feedback: a thread that consumed its quantum demotes one
    /// level and receives the next, longer one.
    Mlfq,
}

enum ReadyQueue {
    Single(VecDeque<Tid>),
    /// Ascending by priority; equal priorities keep arrival order.
    Sorted(Vec<(Tid, i32)>),
    Levels(Vec<VecDeque<Tid>>),
}

pub struct Scheduler {
    policy: SchedPolicy,
    ready: ReadyQueue,
    blocked: Vec<Tid>,
    suspended: Vec<Tid>,
    /// The finishing thread the next scheduled thread must reap. Never the
    /// running thread: a stack cannot free itself.
    pub(crate) to_be_destroyed: Option<Tid>,
}

impl Scheduler {
    pub fn new(policy: SchedPolicy) -> Self {
        let ready = match policy {
            SchedPolicy::Fifo | SchedPolicy::RoundRobin => ReadyQueue::Single(VecDeque::new()),
            SchedPolicy::StaticPriority => ReadyQueue::Sorted(Vec::new()),
            SchedPolicy::Mlfq => {
                ReadyQueue::Levels((0..QUEUE_NUM).map(|_| VecDeque::new()).collect())
            }
        };
        Scheduler {
            policy,
            ready,
            blocked: Vec::new(),
            suspended: Vec::new(),
            to_be_destroyed: None,
        }
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    /// Mark `thread` ready and enqueue it per policy.
    pub fn ready_to_run(&mut self, thread: &Arc<Thread>) {
        let tid = thread.tid();
        log::debug!("putting thread on ready list: {}", thread.name());
        self.blocked.retain(|&t| t != tid);
        self.suspended.retain(|&t| t != tid);
        thread.set_status(ThreadStatus::Ready);
        match (&mut self.ready, self.policy) {
            (ReadyQueue::Single(queue), SchedPolicy::Fifo) => queue.push_back(tid),
            (ReadyQueue::Single(queue), SchedPolicy::RoundRobin) => {
                let mut sched = thread.sched.lock();
                sched.remain_time = TIME_SLICE;
                drop(sched);
                queue.push_back(tid);
            }
            (ReadyQueue::Sorted(queue), _) => {
                let priority = thread.priority();
                let at = queue
                    .iter()
                    .position(|&(_, p)| p > priority)
                    .unwrap_or(queue.len());
                queue.insert(at, (tid, priority));
            }
            (ReadyQueue::Levels(levels), _) => {
                let mut sched = thread.sched.lock();
                if sched.priority < (QUEUE_NUM - 1) as i32 {
                    sched.priority += 1;
                }
                let level = sched.priority as usize;
                sched.remain_time = MLFQ_TIME_SLICE[level];
                let quantum = sched.remain_time;
                drop(sched);
                levels[level].push_back(tid);
                log::debug!(
                    "{} enters level {level} with quantum {quantum}",
                    thread.name()
                );
            }
            _ => unreachable!("ready structure does not match policy"),
        }
    }

    /// Dequeue the next thread to dispatch, if any.
    pub fn find_next(&mut self) -> Option<Tid> {
        match &mut self.ready {
            ReadyQueue::Single(queue) => queue.pop_front(),
            ReadyQueue::Sorted(queue) => {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0).0)
                }
            }
            ReadyQueue::Levels(levels) => levels.iter_mut().find_map(VecDeque::pop_front),
        }
    }

    /// Priority of the thread `find_next` would return, under static
    /// priority.
    pub fn front_priority(&self) -> Option<i32> {
        match &self.ready {
            ReadyQueue::Sorted(queue) => queue.first().map(|&(_, p)| p),
            _ => None,
        }
    }

    pub fn ready_is_empty(&self) -> bool {
        match &self.ready {
            ReadyQueue::Single(queue) => queue.is_empty(),
            ReadyQueue::Sorted(queue) => queue.is_empty(),
            ReadyQueue::Levels(levels) => levels.iter().all(VecDeque::is_empty),
        }
    }

    /// Pull a specific thread back out of the ready structure.
    pub fn remove_from_ready(&mut self, tid: Tid) -> bool {
        match &mut self.ready {
            ReadyQueue::Single(queue) => match queue.iter().position(|&t| t == tid) {
                Some(i) => {
                    queue.remove(i);
                    true
                }
                None => false,
            },
            ReadyQueue::Sorted(queue) => match queue.iter().position(|&(t, _)| t == tid) {
                Some(i) => {
                    queue.remove(i);
                    true
                }
                None => false,
            },
            ReadyQueue::Levels(levels) => {
                for level in levels {
                    if let Some(i) = level.iter().position(|&t| t == tid) {
                        level.remove(i);
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Record that `thread` left the CPU without becoming ready: blocked on
    /// a primitive, or a zombie on its way out.
    pub fn block(&mut self, thread: &Arc<Thread>, finishing: bool) {
        if finishing {
            thread.set_status(ThreadStatus::Zombie);
        } else {
            thread.set_status(ThreadStatus::Blocked);
            self.blocked.push(thread.tid());
        }
    }

    pub fn blocked_is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn note_suspended(&mut self, thread: &Arc<Thread>) {
        thread.set_status(ThreadStatus::Suspended);
        self.suspended.push(thread.tid());
    }

    pub fn suspended_is_empty(&self) -> bool {
        self.suspended.is_empty()
    }
}

/// Dispatch the CPU to `next`, saving the state of the running thread.
///
/// With `finishing` set the caller is a zombie: the switch does not return
/// on its stack, and the successor reaps it.
pub(crate) fn run(kernel: &Kernel, next: Arc<Thread>, finishing: bool) {
    kernel.interrupt.assert_off();
    let old = kernel.current_thread();

    if finishing {
        let mut scheduler = kernel.scheduler.lock();
        assert!(
            scheduler.to_be_destroyed.is_none(),
            "two threads finishing at once"
        );
        scheduler.to_be_destroyed = Some(old.tid());
    }

    {
        let mut machine = kernel.machine.lock();
        if old.space().is_some() {
            old.save_user_state(&machine);
        }
        // Stale translations must never serve the incoming thread.
        machine.switch_address_space();
    }

    old.check_overflow();

    kernel.set_current(Arc::clone(&next));
    next.set_status(ThreadStatus::Running);
    kernel.stats.inc_context_switches();
    log::debug!("switching from {} to {}", old.name(), next.name());

    next.unpark();
    if finishing {
        // Still briefly on the zombie's host thread; it unwinds out of the
        // thread body and exits without touching kernel state again.
        return;
    }
    old.park();

    // Back on this thread's stack; interrupts are off, as the thread that
    // switched to us left them.
    kernel.interrupt.assert_off();
    log::debug!("now in thread {}", old.name());
    kernel.check_to_be_destroyed();
    if old.space().is_some() {
        let mut machine = kernel.machine.lock();
        old.restore_user_state(&mut machine);
    }
}
