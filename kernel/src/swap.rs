//! The backing store: one swap file per thread.
//!
//! A swap file starts with a `u32` count of saved pages, followed by one
//! record per page: a `u32` VPN and `PAGE_SIZE` raw bytes. Writing a page
//! updates its record in place or appends a new one; all I/O is at page
//! granularity. A backing-store failure is fatal to the kernel — it means
//! the host environment broke underneath the simulation, not a user error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use config::mm::PAGE_SIZE;
use hashbrown::HashMap;
use mm::address::VirtPageNum;
use mutex::SpinLock;

use crate::task::Tid;

/// Page I/O between physical memory and a thread's swap storage.
pub trait BackingStore: Send + Sync {
    /// Read the saved copy of `vpn` into `buf`. A page that was never
    /// saved zero-fills `buf`; returns whether a saved copy existed.
    fn read_page(&self, tid: Tid, vpn: VirtPageNum, buf: &mut [u8]) -> bool;

    /// Save `page` as the copy of `vpn`.
    fn write_page(&self, tid: Tid, vpn: VirtPageNum, page: &[u8]);

    /// The VPNs currently saved for `tid`, in record order.
    fn pages(&self, tid: Tid) -> Vec<VirtPageNum>;

    fn page_count(&self, tid: Tid) -> usize {
        self.pages(tid).len()
    }

    /// Delete `tid`'s swap storage outright.
    fn remove(&self, tid: Tid);
}

/// Swap files on the host file system, one per thread, under one directory.
pub struct FileBackingStore {
    dir: PathBuf,
    files: SpinLock<HashMap<Tid, SwapFile>>,
}

struct SwapFile {
    file: File,
    /// `index[i]` is the VPN stored in record `i`.
    index: Vec<u32>,
}

fn record_offset(i: usize) -> u64 {
    (4 + i * (4 + PAGE_SIZE)) as u64
}

impl SwapFile {
    fn open(path: &Path) -> SwapFile {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .expect("cannot open swap file");
        let mut index = Vec::new();
        let mut count_buf = [0u8; 4];
        if file.read_exact(&mut count_buf).is_ok() {
            let count = u32::from_le_bytes(count_buf);
            let mut vpn_buf = [0u8; 4];
            for i in 0..count as usize {
                file.seek(SeekFrom::Start(record_offset(i)))
                    .expect("swap file seek failed");
                file.read_exact(&mut vpn_buf).expect("truncated swap file");
                index.push(u32::from_le_bytes(vpn_buf));
            }
        } else {
            file.seek(SeekFrom::Start(0)).expect("swap file seek failed");
            file.write_all(&0u32.to_le_bytes())
                .expect("cannot initialize swap file");
        }
        SwapFile { file, index }
    }

    fn read(&mut self, vpn: u32, buf: &mut [u8]) -> bool {
        match self.index.iter().position(|&v| v == vpn) {
            Some(i) => {
                self.file
                    .seek(SeekFrom::Start(record_offset(i) + 4))
                    .expect("swap file seek failed");
                self.file.read_exact(buf).expect("truncated swap file");
                true
            }
            None => {
                buf.fill(0);
                false
            }
        }
    }

    fn write(&mut self, vpn: u32, page: &[u8]) {
        match self.index.iter().position(|&v| v == vpn) {
            Some(i) => {
                self.file
                    .seek(SeekFrom::Start(record_offset(i) + 4))
                    .expect("swap file seek failed");
                self.file.write_all(page).expect("swap file write failed");
            }
            None => {
                let i = self.index.len();
                self.file
                    .seek(SeekFrom::Start(record_offset(i)))
                    .expect("swap file seek failed");
                self.file
                    .write_all(&vpn.to_le_bytes())
                    .expect("swap file write failed");
                self.file.write_all(page).expect("swap file write failed");
                self.index.push(vpn);
                self.file
                    .seek(SeekFrom::Start(0))
                    .expect("swap file seek failed");
                self.file
                    .write_all(&(self.index.len() as u32).to_le_bytes())
                    .expect("swap file write failed");
            }
        }
    }
}

impl FileBackingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).expect("cannot create swap directory");
        FileBackingStore {
            dir,
            files: SpinLock::new(HashMap::new()),
        }
    }

    fn path(&self, tid: Tid) -> PathBuf {
        self.dir.join(format!("thread-{tid}.swap"))
    }
}

impl BackingStore for FileBackingStore {
    fn read_page(&self, tid: Tid, vpn: VirtPageNum, buf: &mut [u8]) -> bool {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let mut files = self.files.lock();
        if !files.contains_key(&tid) && !self.path(tid).exists() {
            buf.fill(0);
            return false;
        }
        let swap = files
            .entry(tid)
            .or_insert_with(|| SwapFile::open(&self.path(tid)));
        swap.read(vpn.to_usize() as u32, buf)
    }

    fn write_page(&self, tid: Tid, vpn: VirtPageNum, page: &[u8]) {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let mut files = self.files.lock();
        let swap = files
            .entry(tid)
            .or_insert_with(|| SwapFile::open(&self.path(tid)));
        swap.write(vpn.to_usize() as u32, page);
    }

    fn pages(&self, tid: Tid) -> Vec<VirtPageNum> {
        let mut files = self.files.lock();
        if !files.contains_key(&tid) && !self.path(tid).exists() {
            return Vec::new();
        }
        let swap = files
            .entry(tid)
            .or_insert_with(|| SwapFile::open(&self.path(tid)));
        swap.index
            .iter()
            .map(|&v| VirtPageNum::new(v as usize))
            .collect()
    }

    fn remove(&self, tid: Tid) {
        self.files.lock().remove(&tid);
        let _ = std::fs::remove_file(self.path(tid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackingStore::new(dir.path());
        let page: Vec<u8> = (0..PAGE_SIZE).map(|i| i as u8).collect();
        store.write_page(3, VirtPageNum::new(7), &page);

        let mut buf = vec![0xff; PAGE_SIZE];
        assert!(store.read_page(3, VirtPageNum::new(7), &mut buf));
        assert_eq!(buf, page);
    }

    #[test]
    fn absent_page_zero_fills() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackingStore::new(dir.path());
        let mut buf = vec![0xff; PAGE_SIZE];
        assert!(!store.read_page(1, VirtPageNum::new(0), &mut buf));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn rewrite_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.write_page(1, VirtPageNum::new(2), &[1u8; PAGE_SIZE]);
        store.write_page(1, VirtPageNum::new(2), &[2u8; PAGE_SIZE]);
        assert_eq!(store.page_count(1), 1);

        let mut buf = vec![0; PAGE_SIZE];
        store.read_page(1, VirtPageNum::new(2), &mut buf);
        assert_eq!(buf, [2u8; PAGE_SIZE]);
    }

    #[test]
    fn index_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileBackingStore::new(dir.path());
            store.write_page(5, VirtPageNum::new(1), &[7u8; PAGE_SIZE]);
            store.write_page(5, VirtPageNum::new(9), &[9u8; PAGE_SIZE]);
        }
        let store = FileBackingStore::new(dir.path());
        assert_eq!(
            store.pages(5),
            vec![VirtPageNum::new(1), VirtPageNum::new(9)]
        );
        let mut buf = vec![0; PAGE_SIZE];
        store.read_page(5, VirtPageNum::new(9), &mut buf);
        assert_eq!(buf, [9u8; PAGE_SIZE]);
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.write_page(2, VirtPageNum::new(0), &[1u8; PAGE_SIZE]);
        store.remove(2);
        assert_eq!(store.page_count(2), 0);
        let mut buf = vec![0xff; PAGE_SIZE];
        assert!(!store.read_page(2, VirtPageNum::new(0), &mut buf));
    }
}
