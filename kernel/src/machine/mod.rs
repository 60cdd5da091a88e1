//! The simulated machine: physical memory, the register file, and the MMU.
//!
//! The kernel drives user programs through this machine. Memory references
//! go through [`Machine::read_mem`]/[`Machine::write_mem`], which translate
//! through the TLB or a page table and *return* a typed exception on
//! failure; raising it to the exception handler is the caller's decision.

mod entry;
mod pagetable;
mod replace;
mod tlb;
mod translate;

pub use entry::{EntryFlags, TranslationEntry};
pub use pagetable::{PageTables, TranslationKind};
pub use replace::{ReplacePolicy, Replacer};
pub use tlb::Tlb;

use config::mm::{NUM_PHYS_PAGES, PAGE_SIZE, TLB_SIZE};
use config::machine::NUM_TOTAL_REGS;
use mm::address::{PhysPageNum, VirtPageNum};
use mm::frame::FrameBitmap;

use crate::swap::BackingStore;
use crate::task::Tid;

/// What the MMU (or the decoder, for the last two) can signal to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    NoException,
    /// A program executed a system call.
    Syscall,
    /// No valid translation for the referenced page.
    PageFault,
    /// Write attempted through a read-only mapping.
    ReadOnly,
    /// Translation resolved to a nonexistent physical frame.
    BusError,
    /// Unaligned or out-of-space reference.
    AddressError,
    /// Integer overflow in an arithmetic instruction.
    Overflow,
    /// Undefined instruction.
    IllegalInstr,
    /// The TLB holds no entry for the referenced page.
    TlbMiss,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::NoException => "no exception",
            ExceptionKind::Syscall => "system call",
            ExceptionKind::PageFault => "page fault",
            ExceptionKind::ReadOnly => "write to read-only page",
            ExceptionKind::BusError => "bus error",
            ExceptionKind::AddressError => "address error",
            ExceptionKind::Overflow => "arithmetic overflow",
            ExceptionKind::IllegalInstr => "illegal instruction",
            ExceptionKind::TlbMiss => "TLB miss",
        }
    }
}

/// Geometry and policy of one machine instance. The defaults come from
/// `config`; tests shrink them.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub num_phys_pages: usize,
    /// Translate through a TLB; a miss traps to the kernel. Without a TLB
    /// the page table is walked directly. A TLB always has a page table
    /// behind it as the refill source.
    pub use_tlb: bool,
    pub tlb_size: usize,
    pub translation: TranslationKind,
    pub replace: ReplacePolicy,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            num_phys_pages: NUM_PHYS_PAGES,
            use_tlb: false,
            tlb_size: TLB_SIZE,
            translation: TranslationKind::Forward,
            replace: ReplacePolicy::Lru,
        }
    }
}

pub struct Machine {
    num_phys_pages: usize,
    memory: Vec<u8>,
    registers: [i32; NUM_TOTAL_REGS],
    tlb: Option<Tlb>,
    tables: PageTables,
    pub bitmap: FrameBitmap,
    replacer: Replacer,
    /// Logical reference clock stamping LRU metadata.
    use_clock: u64,
}

impl Machine {
    pub fn new(config: &MachineConfig) -> Self {
        Machine {
            num_phys_pages: config.num_phys_pages,
            memory: vec![0; config.num_phys_pages * PAGE_SIZE],
            registers: [0; NUM_TOTAL_REGS],
            tlb: config
                .use_tlb
                .then(|| Tlb::new(config.tlb_size, config.replace)),
            tables: PageTables::new(config.translation, config.num_phys_pages),
            bitmap: FrameBitmap::new(config.num_phys_pages),
            replacer: Replacer::new(config.replace),
            use_clock: 0,
        }
    }

    pub fn num_phys_pages(&self) -> usize {
        self.num_phys_pages
    }

    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    pub fn read_register(&self, reg: usize) -> i32 {
        self.registers[reg]
    }

    pub fn write_register(&mut self, reg: usize, value: i32) {
        self.registers[reg] = value;
    }

    pub fn registers(&self) -> &[i32; NUM_TOTAL_REGS] {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut [i32; NUM_TOTAL_REGS] {
        &mut self.registers
    }

    pub fn tlb(&self) -> Option<&Tlb> {
        self.tlb.as_ref()
    }

    pub fn tlb_mut(&mut self) -> Option<&mut Tlb> {
        self.tlb.as_mut()
    }

    pub fn tables(&self) -> &PageTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut PageTables {
        &mut self.tables
    }

    /// The bytes of physical frame `frame`.
    pub fn frame_bytes(&self, frame: PhysPageNum) -> &[u8] {
        let start = frame.address().to_usize();
        &self.memory[start..start + PAGE_SIZE]
    }

    pub fn frame_bytes_mut(&mut self, frame: PhysPageNum) -> &mut [u8] {
        let start = frame.address().to_usize();
        &mut self.memory[start..start + PAGE_SIZE]
    }

    /// Map `(tid, vpn)` to a caller-chosen frame, claiming its bitmap bit.
    /// This is how an address-space image is built before the thread runs.
    pub fn map_page(&mut self, tid: Tid, vpn: VirtPageNum, frame: PhysPageNum, read_only: bool) {
        assert!(frame.to_usize() < self.num_phys_pages, "no such frame");
        self.bitmap.claim(frame);
        let now = self.bump_use_clock();
        self.tables.install(tid, vpn, frame, read_only, now);
    }

    /// Claim a free frame, evicting a resident page if memory is full.
    /// Forward mode evicts among `tid`'s own pages; reverse mode among all
    /// frames. A dirty victim is written to its owner's swap file first.
    pub fn free_frame_or_victim(&mut self, tid: Tid, swap: &dyn BackingStore) -> PhysPageNum {
        if let Some(frame) = self.bitmap.alloc() {
            return frame;
        }
        let frame = self.evict_victim(tid, swap);
        let claimed = self.bitmap.claim(frame);
        debug_assert!(claimed);
        frame
    }

    /// Evict one resident page per the replacement policy, freeing its
    /// frame. Returns the freed frame.
    fn evict_victim(&mut self, tid: Tid, swap: &dyn BackingStore) -> PhysPageNum {
        match &mut self.tables {
            PageTables::Forward { tables } => {
                let table = tables.get_mut(&tid).expect("thread has no page table");
                let vpn = self
                    .replacer
                    .pick_victim(table)
                    .expect("no resident page to evict");
                let frame = table[vpn].ppn;
                if table[vpn].is_dirty() {
                    let start = frame.address().to_usize();
                    swap.write_page(tid, VirtPageNum::new(vpn), &self.memory[start..start + PAGE_SIZE]);
                }
                log::debug!(
                    "evict: thread {tid} vpn {vpn} out of frame {}",
                    frame.to_usize()
                );
                table[vpn].flags = EntryFlags::empty();
                table[vpn].swap_slot = None;
                self.bitmap.free(frame);
                frame
            }
            PageTables::Reverse { frames } => {
                let slot = self
                    .replacer
                    .pick_victim(frames)
                    .expect("no resident page to evict");
                let victim = frames[slot];
                let frame = PhysPageNum::new(slot);
                if victim.is_dirty() {
                    let start = frame.address().to_usize();
                    swap.write_page(
                        victim.tid,
                        victim.vpn,
                        &self.memory[start..start + PAGE_SIZE],
                    );
                }
                log::debug!(
                    "evict: thread {} vpn {} out of frame {slot}",
                    victim.tid,
                    victim.vpn.to_usize()
                );
                frames[slot].reset();
                self.bitmap.free(frame);
                frame
            }
        }
    }

    /// Write every resident page of `tid` to its swap file and drop the
    /// mappings. Returns how many pages went out.
    pub fn save_resident_pages(&mut self, tid: Tid, swap: &dyn BackingStore) -> usize {
        let pages = self.tables.resident_pages(tid);
        for &(vpn, frame) in &pages {
            let start = frame.address().to_usize();
            swap.write_page(tid, vpn, &self.memory[start..start + PAGE_SIZE]);
            let entry = self
                .tables
                .entry_mut(tid, vpn)
                .expect("resident page has an entry");
            entry.flags = EntryFlags::empty();
            entry.swap_slot = None;
            self.bitmap.free(frame);
        }
        if let Some(tlb) = self.tlb.as_mut() {
            tlb.invalidate_all();
        }
        pages.len()
    }

    /// Bring every swapped page of `tid` back into memory.
    pub fn load_resident_pages(&mut self, tid: Tid, swap: &dyn BackingStore) -> usize {
        let vpns = swap.pages(tid);
        for &vpn in &vpns {
            let frame = self.free_frame_or_victim(tid, swap);
            swap.read_page(tid, vpn, self.frame_bytes_mut(frame));
            let now = self.bump_use_clock();
            self.tables.install(tid, vpn, frame, false, now);
        }
        vpns.len()
    }

    /// Drop everything `tid` owns: page-table entries, bitmap bits, and TLB
    /// slots. Forward mode flushes the whole TLB, reverse mode only the
    /// thread's slots.
    pub fn release_thread(&mut self, tid: Tid) {
        let kind = self.tables.kind();
        self.tables.release_thread(tid, &mut self.bitmap);
        if let Some(tlb) = self.tlb.as_mut() {
            match kind {
                TranslationKind::Forward => tlb.invalidate_all(),
                TranslationKind::Reverse => tlb.invalidate_thread(tid),
            }
        }
    }

    /// Called on every context switch: stale translations must never serve
    /// the incoming thread.
    pub fn switch_address_space(&mut self) {
        if let Some(tlb) = self.tlb.as_mut() {
            tlb.invalidate_all();
        }
    }

    pub(crate) fn bump_use_clock(&mut self) -> u64 {
        self.use_clock += 1;
        self.use_clock
    }

    /// Panic if a cross-structure invariant is broken. Test support.
    pub fn check_invariants(&self) {
        let entries: Vec<TranslationEntry> = match &self.tables {
            PageTables::Forward { tables } => {
                tables.values().flatten().copied().collect()
            }
            PageTables::Reverse { frames } => frames.clone(),
        };
        let valid: Vec<&TranslationEntry> = entries.iter().filter(|e| e.is_valid()).collect();
        for frame in 0..self.num_phys_pages {
            let mapped = valid
                .iter()
                .filter(|e| e.ppn.to_usize() == frame)
                .count();
            assert!(mapped <= 1, "frame {frame} mapped {mapped} times");
            assert_eq!(
                self.bitmap.in_use(PhysPageNum::new(frame)),
                mapped == 1,
                "bitmap out of sync for frame {frame}"
            );
        }
        for e in &valid {
            let same = valid
                .iter()
                .filter(|o| o.tid == e.tid && o.vpn == e.vpn)
                .count();
            assert_eq!(same, 1, "duplicate mapping for thread {} vpn {}", e.tid, e.vpn.to_usize());
        }
        if let Some(tlb) = &self.tlb {
            for slot in tlb.entries().iter().filter(|e| e.is_valid()) {
                let authoritative = self
                    .tables
                    .entry(slot.tid, slot.vpn)
                    .expect("TLB entry without page-table entry");
                assert!(authoritative.is_valid());
                assert_eq!(authoritative.ppn, slot.ppn, "TLB disagrees on frame");
                assert_eq!(
                    authoritative.is_read_only(),
                    slot.is_read_only(),
                    "TLB disagrees on protection"
                );
            }
        }
    }
}
