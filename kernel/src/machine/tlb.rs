//! The translation lookaside buffer.
//!
//! A small associative cache of translation entries. Every valid entry
//! belongs to the running thread; a context switch invalidates the whole
//! buffer so that stale mappings never alias another thread's pages.

use mm::address::VirtPageNum;

use super::entry::{EntryFlags, TranslationEntry};
use super::replace::{ReplacePolicy, Replacer};
use crate::task::Tid;

pub struct Tlb {
    entries: Vec<TranslationEntry>,
    replacer: Replacer,
}

impl Tlb {
    pub fn new(size: usize, policy: ReplacePolicy) -> Self {
        Tlb {
            entries: vec![TranslationEntry::invalid(); size],
            replacer: Replacer::new(policy),
        }
    }

    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [TranslationEntry] {
        &mut self.entries
    }

    /// Linear scan for a valid entry mapping `vpn`. Returns its slot index.
    pub fn lookup(&self, vpn: VirtPageNum) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_valid() && e.vpn == vpn)
    }

    /// Install `entry`, preferring an invalid slot and otherwise replacing
    /// per policy. `now` stamps the load time.
    pub fn update(&mut self, mut entry: TranslationEntry, now: u64) {
        entry.loaded_at = now;
        let slot = match self.entries.iter().position(|e| !e.is_valid()) {
            Some(free) => free,
            None => self
                .replacer
                .pick_victim(&mut self.entries)
                .expect("a full TLB always yields a victim"),
        };
        log::trace!(
            "tlb: install vpn {} -> ppn {} in slot {}",
            entry.vpn.to_usize(),
            entry.ppn.to_usize(),
            slot
        );
        self.entries[slot] = entry;
    }

    /// Throw away every entry. Done on every context switch.
    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.reset();
        }
    }

    /// Throw away the entries owned by one thread.
    pub fn invalidate_thread(&mut self, tid: Tid) {
        for entry in &mut self.entries {
            if entry.is_valid() && entry.tid == tid {
                entry.reset();
            }
        }
    }

    /// Record a reference through slot `slot`.
    pub fn touch(&mut self, slot: usize, writing: bool, now: u64) {
        let entry = &mut self.entries[slot];
        entry.flags.insert(EntryFlags::USED);
        if writing {
            entry.flags.insert(EntryFlags::DIRTY);
        }
        entry.last_use = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm::address::PhysPageNum;

    fn mapping(vpn: usize, ppn: usize) -> TranslationEntry {
        let mut e = TranslationEntry::invalid();
        e.vpn = VirtPageNum::new(vpn);
        e.ppn = PhysPageNum::new(ppn);
        e.flags.insert(EntryFlags::VALID);
        e
    }

    #[test]
    fn fills_invalid_slots_first() {
        let mut tlb = Tlb::new(2, ReplacePolicy::Lru);
        tlb.update(mapping(1, 1), 0);
        tlb.update(mapping(2, 2), 1);
        assert_eq!(tlb.lookup(VirtPageNum::new(1)), Some(0));
        assert_eq!(tlb.lookup(VirtPageNum::new(2)), Some(1));
    }

    #[test]
    fn replaces_least_recently_used_when_full() {
        let mut tlb = Tlb::new(2, ReplacePolicy::Lru);
        tlb.update(mapping(1, 1), 0);
        tlb.update(mapping(2, 2), 1);
        tlb.touch(0, false, 5);
        tlb.touch(1, false, 2);
        tlb.update(mapping(3, 3), 6);
        assert_eq!(tlb.lookup(VirtPageNum::new(2)), None);
        assert!(tlb.lookup(VirtPageNum::new(1)).is_some());
        assert!(tlb.lookup(VirtPageNum::new(3)).is_some());
    }

    #[test]
    fn invalidate_thread_spares_other_owners() {
        let mut tlb = Tlb::new(2, ReplacePolicy::Lru);
        let mut a = mapping(1, 1);
        a.tid = 1;
        let mut b = mapping(2, 2);
        b.tid = 2;
        tlb.update(a, 0);
        tlb.update(b, 0);
        tlb.invalidate_thread(1);
        assert_eq!(tlb.lookup(VirtPageNum::new(1)), None);
        assert!(tlb.lookup(VirtPageNum::new(2)).is_some());
    }
}
