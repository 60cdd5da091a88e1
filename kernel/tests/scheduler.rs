//! Scheduler behavior across the four policies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use config::sched::MLFQ_TIME_SLICE;
use kernel::machine::MachineConfig;
use kernel::task::{SchedPolicy, ThreadStatus};
use kernel::{Kernel, KernelOptions};
use mutex::SpinLock;

fn boot(sched: SchedPolicy) -> (tempfile::TempDir, Arc<Kernel>) {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(KernelOptions {
        sched,
        machine: MachineConfig::default(),
        swap_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    (dir, kernel)
}

/// Wait until a forked thread has been reaped.
fn join(kernel: &Arc<Kernel>, tid: usize) {
    while kernel.threads.get(tid).is_some() {
        kernel.yield_now();
    }
}

#[test]
fn fifo_dispatches_in_arrival_order() {
    let (_dir, kernel) = boot(SchedPolicy::Fifo);
    let a = kernel.new_thread("A");
    let b = kernel.new_thread("B");
    let c = kernel.new_thread("C");

    let _guard = kernel.interrupts_off();
    let mut scheduler = kernel.scheduler.lock();
    scheduler.ready_to_run(&a);
    scheduler.ready_to_run(&b);
    scheduler.ready_to_run(&c);
    assert_eq!(scheduler.find_next(), Some(a.tid()));
    assert_eq!(scheduler.find_next(), Some(b.tid()));
    assert_eq!(scheduler.find_next(), Some(c.tid()));
    assert_eq!(scheduler.find_next(), None);
}

#[test]
fn fifo_threads_interleave_on_yield() {
    let (_dir, kernel) = boot(SchedPolicy::Fifo);
    let log = Arc::new(SpinLock::new(Vec::new()));

    let a = kernel.new_thread("A");
    let log_a = Arc::clone(&log);
    kernel.fork(&a, move |k| {
        for round in 0..3 {
            log_a.lock().push(format!("A{round}"));
            k.yield_now();
        }
    });
    let b = kernel.new_thread("B");
    let log_b = Arc::clone(&log);
    kernel.fork(&b, move |k| {
        for round in 0..3 {
            log_b.lock().push(format!("B{round}"));
            k.yield_now();
        }
    });

    join(&kernel, a.tid());
    join(&kernel, b.tid());
    let log = log.lock();
    assert_eq!(
        *log,
        vec!["A0", "B0", "A1", "B1", "A2", "B2"]
    );
}

#[test]
fn higher_priority_fork_preempts_the_runner() {
    let (_dir, kernel) = boot(SchedPolicy::StaticPriority);
    let main = kernel.current_thread();
    assert_eq!(main.priority(), 8);

    let ran = Arc::new(AtomicBool::new(false));
    let child = kernel.new_thread("urgent");
    child.set_priority(4);
    let ran_in_child = Arc::clone(&ran);
    kernel.fork(&child, move |_| {
        ran_in_child.store(true, Ordering::SeqCst);
    });

    // The fork itself yielded to the higher-priority thread.
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(main.status(), ThreadStatus::Running);
    assert_eq!(main.priority(), 8);
}

#[test]
fn lower_priority_fork_does_not_preempt() {
    let (_dir, kernel) = boot(SchedPolicy::StaticPriority);
    let ran = Arc::new(AtomicBool::new(false));
    let child = kernel.new_thread("background");
    child.set_priority(9);
    let ran_in_child = Arc::clone(&ran);
    kernel.fork(&child, move |_| {
        ran_in_child.store(true, Ordering::SeqCst);
    });
    assert!(!ran.load(Ordering::SeqCst));
    join(&kernel, child.tid());
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn round_robin_preempts_busy_threads() {
    let (_dir, kernel) = boot(SchedPolicy::RoundRobin);
    let done = Arc::new(SpinLock::new(Vec::new()));

    let mut tids = Vec::new();
    for name in ["worker-0", "worker-1"] {
        let t = kernel.new_thread(name);
        let done = Arc::clone(&done);
        kernel.fork(&t, move |k| {
            // Pure computation: no voluntary yields, only interrupt
            // windows in which the timer can fire.
            for _ in 0..400 {
                let guard = k.interrupts_off();
                drop(guard);
            }
            done.lock().push(std::thread::current().name().unwrap().to_string());
        });
        tids.push(t.tid());
    }

    let before = kernel.stats.num_context_switches();
    for tid in tids {
        join(&kernel, tid);
    }
    assert_eq!(done.lock().len(), 2);
    // Both workers ran to completion without ever yielding; only the
    // timer could have multiplexed them.
    assert!(kernel.stats.num_context_switches() > before + 2);
}

#[test]
fn mlfq_demotes_a_quantum_burner() {
    let (_dir, kernel) = boot(SchedPolicy::Mlfq);
    assert_eq!(MLFQ_TIME_SLICE, [3, 4, 5, 6, 7]);

    let log = Arc::new(SpinLock::new(Vec::new()));
    let stop = Arc::new(AtomicBool::new(false));

    let x = kernel.new_thread("burner");
    let x_log = Arc::clone(&log);
    let x_stop = Arc::clone(&stop);
    kernel.fork(&x, move |k| {
        while !x_stop.load(Ordering::SeqCst) {
            let guard = k.interrupts_off();
            drop(guard);
        }
        x_log.lock().push("burner done".to_string());
    });

    // First ready landed the burner on level 0 with quantum 3; burning
    // through three consecutive quanta demotes it to level 3.
    while x.priority() < 3 {
        kernel.yield_now();
    }
    assert_eq!(x.priority(), 3);

    // A thread readied at level 0 runs before the demoted burner.
    let y = kernel.new_thread("fresh");
    let y_log = Arc::clone(&log);
    let y_stop = Arc::clone(&stop);
    kernel.fork(&y, move |_| {
        y_log.lock().push("fresh ran".to_string());
        y_stop.store(true, Ordering::SeqCst);
    });

    join(&kernel, x.tid());
    let log = log.lock();
    assert_eq!(*log, vec!["fresh ran", "burner done"]);
}

#[test]
fn suspend_and_resume_a_ready_thread() {
    let (_dir, kernel) = boot(SchedPolicy::Fifo);
    let done = Arc::new(AtomicBool::new(false));
    let t = kernel.new_thread("parked");
    let done_in_t = Arc::clone(&done);
    kernel.fork(&t, move |_| {
        done_in_t.store(true, Ordering::SeqCst);
    });

    assert!(kernel.suspend_thread(t.tid()));
    assert_eq!(t.status(), ThreadStatus::Suspended);
    kernel.yield_now();
    assert!(!done.load(Ordering::SeqCst));

    assert!(kernel.resume_thread(t.tid()));
    join(&kernel, t.tid());
    assert!(done.load(Ordering::SeqCst));
}
