//! Demand paging and TLB handling, end to end through the kernel.

use std::sync::Arc;

use config::mm::PAGE_SIZE;
use kernel::machine::{MachineConfig, ReplacePolicy, TranslationKind};
use kernel::swap::BackingStore;
use kernel::{Kernel, KernelOptions};
use mm::address::{PhysPageNum, VirtAddr, VirtPageNum};

fn boot(machine: MachineConfig) -> (tempfile::TempDir, Arc<Kernel>) {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(KernelOptions {
        machine,
        swap_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    (dir, kernel)
}

#[test]
fn tlb_miss_refills_and_retry_hits() {
    let (_dir, kernel) = boot(MachineConfig {
        num_phys_pages: 8,
        use_tlb: true,
        tlb_size: 4,
        ..Default::default()
    });
    let tid = kernel.current_thread().tid();
    {
        let mut machine = kernel.machine.lock();
        machine.tables_mut().create_table(tid, 8);
        machine.map_page(tid, VirtPageNum::new(5), PhysPageNum::new(2), false);
    }

    let va = 5 * PAGE_SIZE + 10;
    // Cold TLB: the reference traps, the handler refills, the caller
    // re-executes.
    assert_eq!(kernel.read_mem(va, 2), None);
    assert_eq!(kernel.stats.num_tlb_misses(), 1);
    assert!(kernel.read_mem(va, 2).is_some());
    assert_eq!(kernel.stats.num_tlb_misses(), 1);

    // The resolved physical address is frame 2 plus the page offset.
    let phys = kernel
        .machine
        .lock()
        .translate(tid, VirtAddr::new(va), 2, false, &kernel.stats, &kernel.swap)
        .unwrap();
    assert_eq!(phys.to_usize(), 2 * PAGE_SIZE + 10);
    kernel.machine.lock().check_invariants();
}

#[test]
fn page_fault_evicts_lru_and_loads_from_swap() {
    let (_dir, kernel) = boot(MachineConfig {
        num_phys_pages: 2,
        translation: TranslationKind::Forward,
        replace: ReplacePolicy::Lru,
        ..Default::default()
    });
    let tid = kernel.current_thread().tid();
    kernel
        .machine
        .lock()
        .tables_mut()
        .create_table(tid, 8);
    {
        let mut machine = kernel.machine.lock();
        machine.map_page(tid, VirtPageNum::new(0), PhysPageNum::new(0), false);
        machine.map_page(tid, VirtPageNum::new(1), PhysPageNum::new(1), false);
    }
    // Page 0 becomes the least recently used, and dirty.
    assert!(kernel.write_mem(0, 4, 0x0dd0));
    assert!(kernel.write_mem(PAGE_SIZE, 4, 0x0dd1));
    assert!(kernel.read_mem(PAGE_SIZE, 4).is_some());

    // Page 7 lives only in the swap file.
    let pattern: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 251) as u8).collect();
    kernel.swap.write_page(tid, VirtPageNum::new(7), &pattern);

    // Both frames are full: the fault evicts page 0 and loads page 7.
    let va7 = 7 * PAGE_SIZE;
    assert_eq!(kernel.read_mem(va7, 4), None);
    assert_eq!(kernel.stats.num_page_faults(), 1);
    let expected = i32::from_le_bytes([pattern[0], pattern[1], pattern[2], pattern[3]]);
    assert_eq!(kernel.read_mem(va7, 4), Some(expected));

    {
        let machine = kernel.machine.lock();
        let tables = machine.tables();
        assert!(!tables.entry(tid, VirtPageNum::new(0)).unwrap().is_valid());
        let seven = tables.entry(tid, VirtPageNum::new(7)).unwrap();
        assert!(seven.is_valid());
        assert_eq!(seven.ppn, PhysPageNum::new(0));
        machine.check_invariants();
    }

    // The evicted dirty page went out to swap; faulting it back restores
    // its bytes exactly.
    assert_eq!(kernel.read_mem(0, 4), None);
    assert_eq!(kernel.read_mem(0, 4), Some(0x0dd0));
    kernel.machine.lock().check_invariants();
}

#[test]
fn reverse_table_pages_per_thread() {
    let (_dir, kernel) = boot(MachineConfig {
        num_phys_pages: 2,
        translation: TranslationKind::Reverse,
        replace: ReplacePolicy::Fifo,
        ..Default::default()
    });
    let tid = kernel.current_thread().tid();

    // Nothing resident: the first touch faults a zero page in.
    assert_eq!(kernel.read_mem(0, 4), None);
    assert_eq!(kernel.read_mem(0, 4), Some(0));
    assert!(kernel.write_mem(0, 4, 77));

    // Touch two more pages; the FIFO victim is page 0.
    assert_eq!(kernel.read_mem(PAGE_SIZE, 4), None);
    assert!(kernel.read_mem(PAGE_SIZE, 4).is_some());
    assert_eq!(kernel.read_mem(2 * PAGE_SIZE, 4), None);
    assert!(kernel.read_mem(2 * PAGE_SIZE, 4).is_some());

    // Its dirty bytes come back from the swap file.
    assert_eq!(kernel.read_mem(0, 4), None);
    assert_eq!(kernel.read_mem(0, 4), Some(77));
    kernel.machine.lock().check_invariants();
}

#[test]
fn saving_and_loading_resident_pages_preserves_bytes() {
    let (_dir, kernel) = boot(MachineConfig {
        num_phys_pages: 4,
        ..Default::default()
    });
    let tid = kernel.current_thread().tid();
    {
        let mut machine = kernel.machine.lock();
        machine.tables_mut().create_table(tid, 4);
        machine.map_page(tid, VirtPageNum::new(0), PhysPageNum::new(0), false);
        machine.map_page(tid, VirtPageNum::new(3), PhysPageNum::new(2), false);
    }
    assert!(kernel.write_mem(0, 4, 0x5151));
    assert!(kernel.write_mem(3 * PAGE_SIZE + 4, 4, 0x6161));

    let saved = kernel
        .machine
        .lock()
        .save_resident_pages(tid, &kernel.swap);
    assert_eq!(saved, 2);
    assert_eq!(kernel.swap.page_count(tid), 2);
    kernel.machine.lock().check_invariants();

    let loaded = kernel
        .machine
        .lock()
        .load_resident_pages(tid, &kernel.swap);
    assert_eq!(loaded, 2);
    assert_eq!(kernel.read_mem(0, 4), Some(0x5151));
    assert_eq!(kernel.read_mem(3 * PAGE_SIZE + 4, 4), Some(0x6161));
    kernel.machine.lock().check_invariants();
}
