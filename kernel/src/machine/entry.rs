//! The translation entry: one virtual-to-physical mapping.

use bitflags::bitflags;
use mm::address::{PhysPageNum, VirtPageNum};

use crate::task::Tid;

bitflags! {
    /// Status bits of a translation entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// The mapping is usable.
        const VALID = 1 << 0;
        /// Writes through this mapping are forbidden.
        const READ_ONLY = 1 << 1;
        /// The page was referenced since the bit was last cleared.
        const USED = 1 << 2;
        /// The page was written since it was loaded.
        const DIRTY = 1 << 3;
    }
}

/// One virtual-to-physical mapping, in a page table or a TLB slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    pub vpn: VirtPageNum,
    pub ppn: PhysPageNum,
    pub flags: EntryFlags,
    /// Owning thread. Meaningful in the reverse page table and in TLB
    /// entries, where mappings of several threads would otherwise alias.
    pub tid: Tid,
    /// While the entry is not valid, the frame this page is designated to
    /// be demand-loaded into, shared with whatever page currently occupies
    /// that frame. `None` means the page has no frame claim at all and a
    /// reference faults to the kernel.
    pub swap_slot: Option<usize>,
    /// Logical time of the last reference, for LRU replacement.
    pub last_use: u64,
    /// Logical time the page was brought in, for FIFO replacement.
    pub loaded_at: u64,
}

impl TranslationEntry {
    /// An empty, invalid entry.
    pub fn invalid() -> Self {
        TranslationEntry {
            vpn: VirtPageNum::new(0),
            ppn: PhysPageNum::new(0),
            flags: EntryFlags::empty(),
            tid: 0,
            swap_slot: None,
            last_use: 0,
            loaded_at: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    /// Wipe the entry back to the invalid state.
    pub fn reset(&mut self) {
        *self = TranslationEntry::invalid();
    }
}

impl Default for TranslationEntry {
    fn default() -> Self {
        TranslationEntry::invalid()
    }
}
