//! Replacement policies shared by the page-table evictor and the TLB.

use super::entry::{EntryFlags, TranslationEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Evict the oldest resident entry.
    Fifo,
    /// Evict the least recently referenced entry.
    #[default]
    Lru,
    /// Second chance: sweep clearing the use bit, evict the first entry
    /// found unused.
    Clock,
}

/// Policy plus the sweep position the clock variant keeps between calls.
#[derive(Debug, Default)]
pub struct Replacer {
    policy: ReplacePolicy,
    clock_hand: usize,
}

impl Replacer {
    pub fn new(policy: ReplacePolicy) -> Self {
        Replacer {
            policy,
            clock_hand: 0,
        }
    }

    pub fn policy(&self) -> ReplacePolicy {
        self.policy
    }

    /// Pick a victim among the valid entries of `entries`, returning its
    /// index. Returns `None` when no entry is valid.
    pub fn pick_victim(&mut self, entries: &mut [TranslationEntry]) -> Option<usize> {
        match self.policy {
            ReplacePolicy::Fifo => entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_valid())
                .min_by_key(|(_, e)| e.loaded_at)
                .map(|(i, _)| i),
            ReplacePolicy::Lru => entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_valid())
                .min_by_key(|(_, e)| e.last_use)
                .map(|(i, _)| i),
            ReplacePolicy::Clock => {
                if !entries.iter().any(|e| e.is_valid()) {
                    return None;
                }
                // Two sweeps suffice: the first pass clears every use bit.
                for _ in 0..2 * entries.len() {
                    let i = self.clock_hand % entries.len();
                    self.clock_hand = (self.clock_hand + 1) % entries.len();
                    let entry = &mut entries[i];
                    if !entry.is_valid() {
                        continue;
                    }
                    if entry.flags.contains(EntryFlags::USED) {
                        entry.flags.remove(EntryFlags::USED);
                    } else {
                        return Some(i);
                    }
                }
                unreachable!("clock sweep found no victim");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm::address::{PhysPageNum, VirtPageNum};

    fn entry(valid: bool, last_use: u64, loaded_at: u64) -> TranslationEntry {
        let mut e = TranslationEntry::invalid();
        if valid {
            e.flags.insert(EntryFlags::VALID);
        }
        e.vpn = VirtPageNum::new(0);
        e.ppn = PhysPageNum::new(0);
        e.last_use = last_use;
        e.loaded_at = loaded_at;
        e
    }

    #[test]
    fn fifo_picks_oldest_load() {
        let mut entries = vec![entry(true, 9, 5), entry(true, 1, 3), entry(false, 0, 0)];
        let mut r = Replacer::new(ReplacePolicy::Fifo);
        assert_eq!(r.pick_victim(&mut entries), Some(1));
    }

    #[test]
    fn lru_picks_least_recent_use() {
        let mut entries = vec![entry(true, 9, 5), entry(true, 1, 3)];
        let mut r = Replacer::new(ReplacePolicy::Lru);
        assert_eq!(r.pick_victim(&mut entries), Some(1));
    }

    #[test]
    fn clock_clears_use_bits_then_evicts() {
        let mut entries = vec![entry(true, 0, 0), entry(true, 0, 0)];
        entries[0].flags.insert(EntryFlags::USED);
        entries[1].flags.insert(EntryFlags::USED);
        let mut r = Replacer::new(ReplacePolicy::Clock);
        assert_eq!(r.pick_victim(&mut entries), Some(0));
        assert!(!entries[1].flags.contains(EntryFlags::USED));
    }

    #[test]
    fn no_valid_entries_means_no_victim() {
        let mut entries = vec![entry(false, 0, 0)];
        let mut r = Replacer::new(ReplacePolicy::Lru);
        assert_eq!(r.pick_victim(&mut entries), None);
    }
}
