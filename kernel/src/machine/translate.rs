//! Virtual-to-physical translation and the memory access paths.
//!
//! Translation resolves through the TLB when one is configured (a miss
//! traps to the kernel, which refills from the page table and retries) or
//! through the page table directly. The forward layout can demand-load a
//! page whose entry carries a designated frame without kernel help; every
//! other miss becomes a typed exception for the handler.

use config::mm::PAGE_SIZE;
use mm::address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum};

use super::entry::{EntryFlags, TranslationEntry};
use super::pagetable::PageTables;
use super::{ExceptionKind, Machine};
use crate::stats::Statistics;
use crate::swap::BackingStore;
use crate::task::Tid;

impl Machine {
    /// Read `size` (1, 2, or 4) bytes of virtual memory at `vaddr`.
    ///
    /// The simulated machine is little-endian; the conversion to host order
    /// is free in the byte-array decoding.
    pub fn read_mem(
        &mut self,
        tid: Tid,
        vaddr: VirtAddr,
        size: usize,
        stats: &Statistics,
        swap: &dyn BackingStore,
    ) -> Result<i32, ExceptionKind> {
        log::trace!("read VA {:#x}, size {size}", vaddr.to_usize());
        let phys = self.translate(tid, vaddr, size, false, stats, swap)?;
        let pa = phys.to_usize();
        let value = match size {
            1 => self.memory[pa] as i32,
            2 => u16::from_le_bytes([self.memory[pa], self.memory[pa + 1]]) as i32,
            4 => u32::from_le_bytes([
                self.memory[pa],
                self.memory[pa + 1],
                self.memory[pa + 2],
                self.memory[pa + 3],
            ]) as i32,
            _ => panic!("unsupported access size {size}"),
        };
        log::trace!("\tvalue read = {value:#x}");
        Ok(value)
    }

    /// Write `size` (1, 2, or 4) bytes of `value` to virtual memory at
    /// `vaddr`.
    pub fn write_mem(
        &mut self,
        tid: Tid,
        vaddr: VirtAddr,
        size: usize,
        value: i32,
        stats: &Statistics,
        swap: &dyn BackingStore,
    ) -> Result<(), ExceptionKind> {
        log::trace!("write VA {:#x}, size {size}, value {value:#x}", vaddr.to_usize());
        let phys = self.translate(tid, vaddr, size, true, stats, swap)?;
        let pa = phys.to_usize();
        match size {
            1 => self.memory[pa] = value as u8,
            2 => self.memory[pa..pa + 2].copy_from_slice(&(value as u16).to_le_bytes()),
            4 => self.memory[pa..pa + 4].copy_from_slice(&(value as u32).to_le_bytes()),
            _ => panic!("unsupported access size {size}"),
        }
        Ok(())
    }

    /// Translate `vaddr`, checking alignment and protection, setting the
    /// use/dirty bits and replacement metadata on success.
    pub fn translate(
        &mut self,
        tid: Tid,
        vaddr: VirtAddr,
        size: usize,
        writing: bool,
        stats: &Statistics,
        swap: &dyn BackingStore,
    ) -> Result<PhysAddr, ExceptionKind> {
        stats.inc_address_translations();
        let addr = vaddr.to_usize();
        log::trace!(
            "\ttranslate {addr:#x}, {}",
            if writing { "write" } else { "read" }
        );

        if (size == 4 && addr & 0x3 != 0) || (size == 2 && addr & 0x1 != 0) {
            log::debug!("alignment problem at {addr:#x}, size {size}");
            return Err(ExceptionKind::AddressError);
        }

        let vpn = vaddr.page_number();
        let offset = vaddr.page_offset();

        let probe = self
            .tlb
            .as_ref()
            .map(|tlb| tlb.lookup(vpn).map(|slot| (tlb.entries()[slot], slot)));
        let (entry, tlb_slot) = match probe {
            // TLB hit: adopt the cached entry.
            Some(Some((entry, slot))) => (entry, Some(slot)),
            // TLB miss: trap; the kernel refills and the access retries.
            Some(None) => {
                log::debug!("no TLB entry for vpn {}", vpn.to_usize());
                return Err(ExceptionKind::TlbMiss);
            }
            // No TLB: walk the page table directly.
            None => (self.page_table_translate(tid, vpn, swap)?, None),
        };

        if entry.is_read_only() && writing {
            log::debug!("write to read-only page at {addr:#x}");
            return Err(ExceptionKind::ReadOnly);
        }

        let frame = entry.ppn;
        if frame.to_usize() >= self.num_phys_pages {
            log::debug!("illegal page frame {}", frame.to_usize());
            return Err(ExceptionKind::BusError);
        }

        // Commit: use/dirty bits and the LRU stamp go to the authoritative
        // entry, and to the TLB slot that served the hit.
        self.use_clock += 1;
        let now = self.use_clock;
        if let Some(e) = self.tables.entry_mut(tid, vpn) {
            if e.is_valid() {
                e.flags.insert(EntryFlags::USED);
                if writing {
                    e.flags.insert(EntryFlags::DIRTY);
                }
                e.last_use = now;
            }
        }
        if let Some(slot) = tlb_slot {
            if let Some(tlb) = self.tlb.as_mut() {
                tlb.touch(slot, writing, now);
            }
        }

        let phys = frame.to_usize() * PAGE_SIZE + offset;
        assert!(phys + size <= self.memory.len());
        log::trace!("\tphys addr = {phys:#x}");
        Ok(PhysAddr::new(phys))
    }

    /// Resolve `vpn` through the page table alone. Used by `translate` when
    /// no TLB is configured and by the kernel's TLB-miss handler as the
    /// refill source.
    pub fn page_table_translate(
        &mut self,
        tid: Tid,
        vpn: VirtPageNum,
        swap: &dyn BackingStore,
    ) -> Result<TranslationEntry, ExceptionKind> {
        let num_phys_pages = self.num_phys_pages;
        match &mut self.tables {
            PageTables::Reverse { frames } => frames
                .iter()
                .find(|e| e.is_valid() && e.tid == tid && e.vpn == vpn)
                .copied()
                .ok_or_else(|| {
                    log::debug!("no frame holds thread {tid} vpn {}", vpn.to_usize());
                    ExceptionKind::PageFault
                }),
            PageTables::Forward { tables } => {
                let table = match tables.get_mut(&tid) {
                    Some(table) if vpn.to_usize() < table.len() => table,
                    _ => {
                        log::debug!("illegal virtual page {} for thread {tid}", vpn.to_usize());
                        return Err(ExceptionKind::AddressError);
                    }
                };
                let v = vpn.to_usize();
                if !table[v].is_valid() {
                    let Some(slot) = table[v].swap_slot.filter(|&f| f < num_phys_pages) else {
                        log::debug!("invalid virtual page {v}");
                        return Err(ExceptionKind::PageFault);
                    };
                    // The designated frame is shared with whatever page
                    // occupies it now: swap that page out, bring ours in.
                    let start = slot * PAGE_SIZE;
                    if let Some(resident) = table
                        .iter()
                        .position(|e| e.is_valid() && e.ppn.to_usize() == slot)
                    {
                        log::debug!("swap out vpn {resident} to make room in frame {slot}");
                        swap.write_page(
                            tid,
                            VirtPageNum::new(resident),
                            &self.memory[start..start + PAGE_SIZE],
                        );
                        table[resident].flags = EntryFlags::empty();
                        table[resident].swap_slot = Some(slot);
                    }
                    swap.read_page(tid, vpn, &mut self.memory[start..start + PAGE_SIZE]);
                    self.use_clock += 1;
                    let entry = &mut table[v];
                    entry.ppn = PhysPageNum::new(slot);
                    entry.flags = EntryFlags::VALID;
                    entry.swap_slot = None;
                    entry.loaded_at = self.use_clock;
                    entry.last_use = self.use_clock;
                    self.bitmap.claim(entry.ppn);
                    log::debug!("demand page-in: vpn {v} into frame {slot}");
                }
                Ok(table[v])
            }
        }
    }
}
