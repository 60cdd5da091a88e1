//! The file-system façade behind the file system calls.
//!
//! The real on-disk file system is an external collaborator; this façade
//! forwards to the host file system, the way a stub file system would.
//! Console input and output are the pre-opened ids 0 and 1, optionally
//! redirected to files (`--ci`/`--co`).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use hashbrown::HashMap;
use mutex::SpinLock;
use strum::FromRepr;
use systype::{SysError, SysResult};

pub const CONSOLE_INPUT: i32 = 0;
pub const CONSOLE_OUTPUT: i32 = 1;

/// Requested operation mode of `Open`.
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpenMode {
    ReadOnly = 1,
    ReadWrite = 2,
    Append = 3,
}

pub struct HostFileSys {
    table: SpinLock<OpenTable>,
}

struct OpenTable {
    files: HashMap<i32, File>,
    next_id: i32,
}

impl HostFileSys {
    /// Open-file table with the console ids wired up. Without redirect
    /// paths, id 0 reads the host stdin and id 1 writes the host stdout.
    pub fn new(console_in: Option<PathBuf>, console_out: Option<PathBuf>) -> Self {
        let mut files = HashMap::new();
        if let Some(path) = console_in {
            let file = File::open(&path).expect("cannot open console input");
            files.insert(CONSOLE_INPUT, file);
        }
        if let Some(path) = console_out {
            let file = File::create(&path).expect("cannot open console output");
            files.insert(CONSOLE_OUTPUT, file);
        }
        HostFileSys {
            table: SpinLock::new(OpenTable { files, next_id: 2 }),
        }
    }

    pub fn create(&self, name: &str) -> SysResult<()> {
        File::create(name).map_err(|_| SysError::EIO)?;
        Ok(())
    }

    pub fn remove(&self, name: &str) -> SysResult<()> {
        std::fs::remove_file(name).map_err(|_| SysError::ENOENT)
    }

    pub fn open(&self, name: &str, mode: OpenMode) -> SysResult<i32> {
        let file = match mode {
            OpenMode::ReadOnly => OpenOptions::new().read(true).open(name),
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(name),
            OpenMode::Append => OpenOptions::new().read(true).append(true).open(name),
        }
        .map_err(|_| SysError::ENOENT)?;
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id = table.next_id.checked_add(1).ok_or(SysError::EMFILE)?;
        table.files.insert(id, file);
        Ok(id)
    }

    pub fn read(&self, id: i32, buf: &mut [u8]) -> SysResult<usize> {
        let mut table = self.table.lock();
        match table.files.get_mut(&id) {
            Some(file) => file.read(buf).map_err(|_| SysError::EIO),
            None if id == CONSOLE_INPUT => std::io::stdin().read(buf).map_err(|_| SysError::EIO),
            None => Err(SysError::EBADF),
        }
    }

    pub fn write(&self, id: i32, buf: &[u8]) -> SysResult<usize> {
        let mut table = self.table.lock();
        match table.files.get_mut(&id) {
            Some(file) => file.write(buf).map_err(|_| SysError::EIO),
            None if id == CONSOLE_OUTPUT => {
                let mut out = std::io::stdout().lock();
                out.write(buf).map_err(|_| SysError::EIO)
            }
            None => Err(SysError::EBADF),
        }
    }

    /// Move the file position to `position` bytes from the start.
    pub fn seek(&self, id: i32, position: u64) -> SysResult<()> {
        if id == CONSOLE_INPUT || id == CONSOLE_OUTPUT {
            return Err(SysError::ESPIPE);
        }
        let mut table = self.table.lock();
        let file = table.files.get_mut(&id).ok_or(SysError::EBADF)?;
        file.seek(SeekFrom::Start(position))
            .map_err(|_| SysError::EIO)?;
        Ok(())
    }

    pub fn close(&self, id: i32) -> SysResult<()> {
        if id == CONSOLE_INPUT || id == CONSOLE_OUTPUT {
            return Err(SysError::EPERM);
        }
        self.table
            .lock()
            .files
            .remove(&id)
            .map(|_| ())
            .ok_or(SysError::EBADF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_read_write_seek_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let name = path.to_str().unwrap();

        let fs = HostFileSys::new(None, None);
        fs.create(name).unwrap();
        let id = fs.open(name, OpenMode::ReadWrite).unwrap();
        assert_eq!(fs.write(id, b"hello").unwrap(), 5);
        fs.seek(id, 1).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(id, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ello");
        fs.close(id).unwrap();
        assert_eq!(fs.read(id, &mut buf), Err(SysError::EBADF));
        fs.remove(name).unwrap();
    }

    #[test]
    fn console_ids_cannot_close_or_seek() {
        let fs = HostFileSys::new(None, None);
        assert_eq!(fs.close(CONSOLE_INPUT), Err(SysError::EPERM));
        assert_eq!(fs.seek(CONSOLE_OUTPUT, 0), Err(SysError::ESPIPE));
    }

    #[test]
    fn console_output_redirects_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.out");
        let fs = HostFileSys::new(None, Some(path.clone()));
        fs.write(CONSOLE_OUTPUT, b"echo").unwrap();
        drop(fs);
        assert_eq!(std::fs::read(path).unwrap(), b"echo");
    }
}
