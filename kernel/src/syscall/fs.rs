//! The file system calls, forwarding to the file-system façade.

use systype::{SysError, SyscallResult};

use super::user::{copy_from_user, copy_to_user, read_user_str};
use crate::fs::OpenMode;
use crate::kernel::Kernel;

pub fn sys_create(kernel: &Kernel, name_addr: i32) -> SyscallResult {
    let name = read_user_str(kernel, name_addr as usize)?;
    kernel.files.create(&name)?;
    Ok(1)
}

pub fn sys_remove(kernel: &Kernel, name_addr: i32) -> SyscallResult {
    let name = read_user_str(kernel, name_addr as usize)?;
    kernel.files.remove(&name)?;
    Ok(1)
}

pub fn sys_open(kernel: &Kernel, name_addr: i32, mode: i32) -> SyscallResult {
    let name = read_user_str(kernel, name_addr as usize)?;
    let mode = OpenMode::from_repr(mode).ok_or(SysError::EINVAL)?;
    kernel.files.open(&name, mode)
}

pub fn sys_read(kernel: &Kernel, buf_addr: i32, size: i32, id: i32) -> SyscallResult {
    if size < 0 {
        return Err(SysError::EINVAL);
    }
    let mut buf = vec![0u8; size as usize];
    let n = kernel.files.read(id, &mut buf)?;
    copy_to_user(kernel, buf_addr as usize, &buf[..n])?;
    Ok(n as i32)
}

pub fn sys_write(kernel: &Kernel, buf_addr: i32, size: i32, id: i32) -> SyscallResult {
    if size < 0 {
        return Err(SysError::EINVAL);
    }
    let bytes = copy_from_user(kernel, buf_addr as usize, size as usize)?;
    let n = kernel.files.write(id, &bytes)?;
    Ok(n as i32)
}

/// Seek to `position` bytes from the start of the file.
pub fn sys_seek(kernel: &Kernel, position: i32, id: i32) -> SyscallResult {
    if position < 0 {
        return Err(SysError::EINVAL);
    }
    kernel.files.seek(id, position as u64)?;
    Ok(position)
}

pub fn sys_close(kernel: &Kernel, id: i32) -> SyscallResult {
    kernel.files.close(id)?;
    Ok(1)
}
