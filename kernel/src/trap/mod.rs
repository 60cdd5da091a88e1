//! The kernel exception handler.
//!
//! The single place where machine exceptions become visible side effects.
//! Page faults and TLB misses are recovered here and the faulting
//! instruction re-executes (the PC is left alone); system calls dispatch
//! and advance the PC; everything else is fatal to the offending thread.

use config::machine::BAD_VADDR_REG;
use mm::address::VirtAddr;

use crate::kernel::Kernel;
use crate::machine::ExceptionKind;
use crate::swap::BackingStore;
use crate::syscall;

pub fn handle_exception(kernel: &Kernel, which: ExceptionKind) {
    log::debug!("received exception: {}", which.as_str());
    match which {
        ExceptionKind::Syscall => {
            kernel.stats.inc_syscalls();
            syscall::dispatch(kernel);
        }
        ExceptionKind::PageFault => {
            kernel.stats.inc_page_faults();
            let vaddr = kernel.machine.lock().read_register(BAD_VADDR_REG) as usize;
            handle_page_fault(kernel, vaddr);
        }
        ExceptionKind::TlbMiss => {
            kernel.stats.inc_tlb_misses();
            let vaddr = kernel.machine.lock().read_register(BAD_VADDR_REG) as usize;
            handle_tlb_miss(kernel, vaddr);
        }
        ExceptionKind::ReadOnly
        | ExceptionKind::AddressError
        | ExceptionKind::BusError
        | ExceptionKind::Overflow
        | ExceptionKind::IllegalInstr => {
            let current = kernel.current_thread();
            log::error!(
                "{}: terminating thread {}",
                which.as_str(),
                current.name()
            );
            terminate_current(kernel, -1);
        }
        ExceptionKind::NoException => unreachable!("handler invoked without an exception"),
    }
}

/// Bring the faulted page into a frame, evicting per policy when memory is
/// full. The PC is not advanced; the reference retries.
fn handle_page_fault(kernel: &Kernel, vaddr: usize) {
    let _guard = kernel.interrupts_off();
    let tid = kernel.current_thread().tid();
    let vpn = VirtAddr::new(vaddr).page_number();
    log::debug!(
        "page fault: thread {tid}, vpn {}, offset {}",
        vpn.to_usize(),
        VirtAddr::new(vaddr).page_offset()
    );

    let mut machine = kernel.machine.lock();
    let frame = machine.free_frame_or_victim(tid, &kernel.swap);
    kernel
        .swap
        .read_page(tid, vpn, machine.frame_bytes_mut(frame));
    let now = machine.bump_use_clock();
    machine.tables_mut().install(tid, vpn, frame, false, now);
    log::debug!("page fault: vpn {} into frame {}", vpn.to_usize(), frame.to_usize());
}

/// Refill the TLB from the page table. A failure of the page-table walk is
/// handled as its own exception; the reference retries either way.
fn handle_tlb_miss(kernel: &Kernel, vaddr: usize) {
    let _guard = kernel.interrupts_off();
    let tid = kernel.current_thread().tid();
    let vpn = VirtAddr::new(vaddr).page_number();

    let mut machine = kernel.machine.lock();
    match machine.page_table_translate(tid, vpn, &kernel.swap) {
        Ok(entry) => {
            let now = machine.bump_use_clock();
            machine
                .tlb_mut()
                .expect("TLB miss raised without a TLB")
                .update(entry, now);
        }
        Err(kind) => {
            drop(machine);
            handle_exception(kernel, kind);
        }
    }
}

/// Kill the current thread, releasing everything it owns: page-table
/// entries, frame bitmap bits, TLB slots, and its swap file.
///
/// Never returns: the killed computation's stack is abandoned, so the host
/// thread parks for good once the successor is running.
pub fn terminate_current(kernel: &Kernel, status: i32) -> ! {
    let current = kernel.current_thread();
    log::info!("thread {} exits with status {status}", current.name());
    kernel.record_exit_status(status);
    {
        let _guard = kernel.interrupts_off();
        kernel.machine.lock().release_thread(current.tid());
        kernel.swap.remove(current.tid());
    }
    kernel.set_interrupt_level(crate::interrupt::IntStatus::Off);
    kernel.sleep(true);
    loop {
        std::thread::park();
    }
}
