//! The exception handler: syscall dispatch and fatal-exception cleanup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use config::machine::{NEXT_PC_REG, PC_REG, PREV_PC_REG};
use config::mm::PAGE_SIZE;
use kernel::machine::ExceptionKind;
use kernel::swap::BackingStore;
use kernel::{Kernel, KernelOptions};
use mm::address::{PhysPageNum, VirtPageNum};

fn boot() -> (tempfile::TempDir, Arc<Kernel>) {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(KernelOptions {
        swap_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    (dir, kernel)
}

fn join(kernel: &Arc<Kernel>, tid: usize) {
    while kernel.threads.get(tid).is_some() {
        kernel.yield_now();
    }
}

#[test]
fn add_syscall_returns_sum_and_advances_pc() {
    let (_dir, kernel) = boot();
    {
        let mut machine = kernel.machine.lock();
        machine.write_register(2, 42); // Add
        machine.write_register(4, 3);
        machine.write_register(5, 4);
        machine.write_register(PC_REG, 100);
        machine.write_register(NEXT_PC_REG, 104);
    }
    kernel.raise_exception(ExceptionKind::Syscall, 0);

    let machine = kernel.machine.lock();
    assert_eq!(machine.read_register(2), 7);
    assert_eq!(machine.read_register(PREV_PC_REG), 100);
    assert_eq!(machine.read_register(PC_REG), 104);
    assert_eq!(machine.read_register(NEXT_PC_REG), 108);
}

#[test]
fn thread_yield_syscall_round_trips() {
    let (_dir, kernel) = boot();
    kernel.machine.lock().write_register(2, 13); // ThreadYield
    kernel.raise_exception(ExceptionKind::Syscall, 0);
    assert_eq!(kernel.machine.lock().read_register(2), 0);
}

#[test]
fn fatal_exception_terminates_the_offender_and_releases_memory() {
    let (_dir, kernel) = boot();
    let survived = Arc::new(AtomicBool::new(false));

    let t = kernel.new_thread("offender");
    let flag = Arc::clone(&survived);
    kernel.fork(&t, move |k| {
        let tid = k.current_thread().tid();
        {
            let mut machine = k.machine.lock();
            machine.tables_mut().create_table(tid, 4);
            machine.map_page(tid, VirtPageNum::new(0), PhysPageNum::new(0), false);
        }
        assert!(k.write_mem(0, 4, 0x77));
        k.raise_exception(ExceptionKind::IllegalInstr, 0);
        // The handler killed us; this must never run.
        flag.store(true, Ordering::SeqCst);
    });

    let tid = t.tid();
    join(&kernel, tid);
    assert!(!survived.load(Ordering::SeqCst));

    let machine = kernel.machine.lock();
    assert!(!machine.bitmap.in_use(PhysPageNum::new(0)));
    assert!(machine.tables().entry(tid, VirtPageNum::new(0)).is_none());
    machine.check_invariants();
}

#[test]
fn write_to_read_only_page_kills_the_writer() {
    let (_dir, kernel) = boot();
    let survived = Arc::new(AtomicBool::new(false));

    let t = kernel.new_thread("scribbler");
    let flag = Arc::clone(&survived);
    kernel.fork(&t, move |k| {
        let tid = k.current_thread().tid();
        {
            let mut machine = k.machine.lock();
            machine.tables_mut().create_table(tid, 4);
            machine.map_page(tid, VirtPageNum::new(1), PhysPageNum::new(1), true);
        }
        k.write_mem(PAGE_SIZE, 4, 1);
        flag.store(true, Ordering::SeqCst);
    });

    join(&kernel, t.tid());
    assert!(!survived.load(Ordering::SeqCst));
}

#[test]
fn exit_syscall_releases_space_and_swap_file() {
    let (_dir, kernel) = boot();
    let t = kernel.new_thread("exiter");
    kernel.fork(&t, move |k| {
        let me = k.current_thread();
        k.create_address_space(&me, 100);

        // Fault the first page in, then dirty it.
        assert!(!k.write_mem(0, 4, 7));
        assert!(k.write_mem(0, 4, 7));
        assert_eq!(k.read_mem(0, 4), Some(7));

        k.swap
            .write_page(me.tid(), VirtPageNum::new(1), &[1u8; PAGE_SIZE]);
        assert_eq!(k.swap.page_count(me.tid()), 1);
        {
            let mut machine = k.machine.lock();
            machine.write_register(2, 1); // Exit
            machine.write_register(4, 0);
        }
        k.raise_exception(ExceptionKind::Syscall, 0);
        unreachable!("exit returned");
    });

    let tid = t.tid();
    join(&kernel, tid);
    assert_eq!(kernel.swap.page_count(tid), 0);
    let machine = kernel.machine.lock();
    assert!(machine.tables().entry(tid, VirtPageNum::new(0)).is_none());
    machine.check_invariants();
}
