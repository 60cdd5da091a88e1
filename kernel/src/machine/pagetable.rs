//! Forward and reverse page tables.
//!
//! The two layouts are a build-time switch in spirit but a tagged variant in
//! code: `Forward` gives every thread a dense table indexed by VPN,
//! `Reverse` keeps one system-wide table indexed by physical frame that
//! records which `(thread, VPN)` occupies it. The translation algorithm
//! differs only in the lookup step; eviction and bitmap logic are shared.

use hashbrown::HashMap;
use mm::address::{PhysPageNum, VirtPageNum};
use mm::frame::FrameBitmap;

use super::entry::{EntryFlags, TranslationEntry};
use crate::task::Tid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationKind {
    /// Per-thread dense tables indexed by VPN.
    #[default]
    Forward,
    /// One system-wide table indexed by frame.
    Reverse,
}

pub enum PageTables {
    Forward {
        tables: HashMap<Tid, Vec<TranslationEntry>>,
    },
    Reverse {
        frames: Vec<TranslationEntry>,
    },
}

impl PageTables {
    pub fn new(kind: TranslationKind, num_phys_pages: usize) -> Self {
        match kind {
            TranslationKind::Forward => PageTables::Forward {
                tables: HashMap::new(),
            },
            TranslationKind::Reverse => PageTables::Reverse {
                frames: vec![TranslationEntry::invalid(); num_phys_pages],
            },
        }
    }

    pub fn kind(&self) -> TranslationKind {
        match self {
            PageTables::Forward { .. } => TranslationKind::Forward,
            PageTables::Reverse { .. } => TranslationKind::Reverse,
        }
    }

    /// Give `tid` a forward table of `num_pages` invalid entries. A no-op in
    /// reverse mode, where the frame table serves every thread.
    pub fn create_table(&mut self, tid: Tid, num_pages: usize) {
        if let PageTables::Forward { tables } = self {
            let mut table = vec![TranslationEntry::invalid(); num_pages];
            for (vpn, entry) in table.iter_mut().enumerate() {
                entry.vpn = VirtPageNum::new(vpn);
                entry.tid = tid;
            }
            tables.insert(tid, table);
        }
    }

    /// The forward table of `tid`, if any.
    pub fn forward_table(&self, tid: Tid) -> Option<&[TranslationEntry]> {
        match self {
            PageTables::Forward { tables } => tables.get(&tid).map(Vec::as_slice),
            PageTables::Reverse { .. } => None,
        }
    }

    pub fn forward_table_mut(&mut self, tid: Tid) -> Option<&mut [TranslationEntry]> {
        match self {
            PageTables::Forward { tables } => tables.get_mut(&tid).map(Vec::as_mut_slice),
            PageTables::Reverse { .. } => None,
        }
    }

    /// The system-wide frame table, in reverse mode.
    pub fn frame_table_mut(&mut self) -> Option<&mut [TranslationEntry]> {
        match self {
            PageTables::Forward { .. } => None,
            PageTables::Reverse { frames } => Some(frames.as_mut_slice()),
        }
    }

    /// The authoritative entry for `(tid, vpn)`, valid or not.
    pub fn entry(&self, tid: Tid, vpn: VirtPageNum) -> Option<&TranslationEntry> {
        match self {
            PageTables::Forward { tables } => tables.get(&tid)?.get(vpn.to_usize()),
            PageTables::Reverse { frames } => frames
                .iter()
                .find(|e| e.is_valid() && e.tid == tid && e.vpn == vpn),
        }
    }

    pub fn entry_mut(&mut self, tid: Tid, vpn: VirtPageNum) -> Option<&mut TranslationEntry> {
        match self {
            PageTables::Forward { tables } => tables.get_mut(&tid)?.get_mut(vpn.to_usize()),
            PageTables::Reverse { frames } => frames
                .iter_mut()
                .find(|e| e.is_valid() && e.tid == tid && e.vpn == vpn),
        }
    }

    /// Record that `(tid, vpn)` now resides in `frame`.
    ///
    /// The caller has already claimed `frame` in the bitmap. `now` stamps
    /// the FIFO load time.
    pub fn install(
        &mut self,
        tid: Tid,
        vpn: VirtPageNum,
        frame: PhysPageNum,
        read_only: bool,
        now: u64,
    ) {
        let mut flags = EntryFlags::VALID;
        if read_only {
            flags.insert(EntryFlags::READ_ONLY);
        }
        match self {
            PageTables::Forward { tables } => {
                let table = tables.get_mut(&tid).expect("thread has no page table");
                let entry = &mut table[vpn.to_usize()];
                entry.vpn = vpn;
                entry.ppn = frame;
                entry.tid = tid;
                entry.flags = flags;
                entry.swap_slot = None;
                entry.last_use = now;
                entry.loaded_at = now;
            }
            PageTables::Reverse { frames } => {
                let entry = &mut frames[frame.to_usize()];
                debug_assert!(!entry.is_valid(), "frame already mapped");
                entry.vpn = vpn;
                entry.ppn = frame;
                entry.tid = tid;
                entry.flags = flags;
                entry.swap_slot = None;
                entry.last_use = now;
                entry.loaded_at = now;
            }
        }
    }

    /// The resident pages of `tid`, as `(vpn, frame)` pairs.
    pub fn resident_pages(&self, tid: Tid) -> Vec<(VirtPageNum, PhysPageNum)> {
        match self {
            PageTables::Forward { tables } => tables
                .get(&tid)
                .map(|table| {
                    table
                        .iter()
                        .filter(|e| e.is_valid())
                        .map(|e| (e.vpn, e.ppn))
                        .collect()
                })
                .unwrap_or_default(),
            PageTables::Reverse { frames } => frames
                .iter()
                .filter(|e| e.is_valid() && e.tid == tid)
                .map(|e| (e.vpn, e.ppn))
                .collect(),
        }
    }

    /// Drop every mapping of `tid`, clearing the matching bitmap bits.
    /// Forward mode drops the table itself.
    pub fn release_thread(&mut self, tid: Tid, bitmap: &mut FrameBitmap) {
        match self {
            PageTables::Forward { tables } => {
                if let Some(table) = tables.remove(&tid) {
                    for entry in table.iter().filter(|e| e.is_valid()) {
                        bitmap.free(entry.ppn);
                    }
                }
            }
            PageTables::Reverse { frames } => {
                for entry in frames.iter_mut() {
                    if entry.is_valid() && entry.tid == tid {
                        bitmap.free(entry.ppn);
                        entry.reset();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_install_and_lookup() {
        let mut pt = PageTables::new(TranslationKind::Forward, 4);
        pt.create_table(7, 8);
        pt.install(7, VirtPageNum::new(5), PhysPageNum::new(2), false, 1);
        let entry = pt.entry(7, VirtPageNum::new(5)).unwrap();
        assert!(entry.is_valid());
        assert_eq!(entry.ppn, PhysPageNum::new(2));
        assert!(!pt.entry(7, VirtPageNum::new(4)).unwrap().is_valid());
    }

    #[test]
    fn reverse_lookup_is_per_thread() {
        let mut pt = PageTables::new(TranslationKind::Reverse, 4);
        pt.install(1, VirtPageNum::new(5), PhysPageNum::new(0), false, 1);
        pt.install(2, VirtPageNum::new(5), PhysPageNum::new(1), false, 1);
        assert_eq!(
            pt.entry(1, VirtPageNum::new(5)).unwrap().ppn,
            PhysPageNum::new(0)
        );
        assert_eq!(
            pt.entry(2, VirtPageNum::new(5)).unwrap().ppn,
            PhysPageNum::new(1)
        );
    }

    #[test]
    fn release_thread_clears_bitmap() {
        let mut bitmap = FrameBitmap::new(4);
        let f = bitmap.alloc().unwrap();
        let mut pt = PageTables::new(TranslationKind::Reverse, 4);
        pt.install(1, VirtPageNum::new(0), f, false, 1);
        pt.release_thread(1, &mut bitmap);
        assert!(!bitmap.in_use(f));
        assert!(pt.entry(1, VirtPageNum::new(0)).is_none());
    }
}
