//! The global thread table.
//!
//! The table is the sole owner of thread control blocks; everything else
//! holds tids and looks threads up here, so destroying a thread is a table
//! removal.

use std::sync::Arc;

use id_allocator::{IdAllocator, RangeIdAllocator};
use mutex::SpinLock;

use super::thread::Thread;
use super::Tid;

pub struct ThreadTable {
    inner: SpinLock<Inner>,
}

struct Inner {
    slots: Vec<Option<Arc<Thread>>>,
    ids: RangeIdAllocator,
}

impl ThreadTable {
    pub fn new(capacity: usize) -> Self {
        ThreadTable {
            inner: SpinLock::new(Inner {
                slots: (0..capacity).map(|_| None).collect(),
                ids: RangeIdAllocator::new(0, capacity),
            }),
        }
    }

    /// Allocate a tid and register the thread `make` builds for it.
    ///
    /// # Panics
    ///
    /// Panics when the table is full; the kernel cannot run without a slot
    /// for the thread it was asked to create.
    pub fn register(&self, make: impl FnOnce(Tid) -> Thread) -> Arc<Thread> {
        let mut inner = self.inner.lock();
        let tid = inner.ids.alloc().expect("thread table is full");
        let thread = Arc::new(make(tid));
        inner.slots[tid] = Some(Arc::clone(&thread));
        log::debug!("thread table: register {} as tid {tid}", thread.name());
        thread
    }

    pub fn get(&self, tid: Tid) -> Option<Arc<Thread>> {
        self.inner.lock().slots.get(tid)?.clone()
    }

    /// Drop the table's ownership of `tid`, recycling the id.
    pub fn remove(&self, tid: Tid) -> Option<Arc<Thread>> {
        let mut inner = self.inner.lock();
        let thread = inner.slots.get_mut(tid)?.take();
        if thread.is_some() {
            log::debug!("thread table: remove tid {tid}");
            unsafe { inner.ids.dealloc(tid) };
        }
        thread
    }

    /// Every live thread, in tid order.
    pub fn snapshot(&self) -> Vec<Arc<Thread>> {
        self.inner.lock().slots.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::scheduler::SchedPolicy;

    #[test]
    fn tids_are_table_indices() {
        let table = ThreadTable::new(4);
        let a = table.register(|tid| Thread::new(tid, "a", SchedPolicy::Fifo));
        let b = table.register(|tid| Thread::new(tid, "b", SchedPolicy::Fifo));
        assert_eq!(a.tid(), 0);
        assert_eq!(b.tid(), 1);
        assert_eq!(table.get(1).unwrap().name(), "b");
    }

    #[test]
    fn removed_tid_is_recycled() {
        let table = ThreadTable::new(2);
        let a = table.register(|tid| Thread::new(tid, "a", SchedPolicy::Fifo));
        table.register(|tid| Thread::new(tid, "b", SchedPolicy::Fifo));
        table.remove(a.tid());
        let c = table.register(|tid| Thread::new(tid, "c", SchedPolicy::Fifo));
        assert_eq!(c.tid(), 0);
    }
}
