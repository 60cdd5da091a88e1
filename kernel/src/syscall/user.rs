//! Moving data across the user-memory boundary.
//!
//! A reference can fault more than once on its way to success: a TLB miss
//! refill can itself hit a not-resident page. Each recovered fault returns
//! control here and the reference retries; the bound covers the longest
//! legitimate chain, after which the address is genuinely bad.

use systype::{SysError, SysResult};

use crate::kernel::Kernel;

/// TLB miss, page-in behind the refill, TLB miss again, then the access.
const MAX_FAULT_RETRIES: usize = 4;

fn read_user_byte(kernel: &Kernel, addr: usize) -> SysResult<u8> {
    for _ in 0..MAX_FAULT_RETRIES {
        if let Some(value) = kernel.read_mem(addr, 1) {
            return Ok(value as u8);
        }
    }
    Err(SysError::EFAULT)
}

fn write_user_byte(kernel: &Kernel, addr: usize, value: u8) -> SysResult<()> {
    for _ in 0..MAX_FAULT_RETRIES {
        if kernel.write_mem(addr, 1, value as i32) {
            return Ok(());
        }
    }
    Err(SysError::EFAULT)
}

/// Copy `len` bytes out of user memory.
pub fn copy_from_user(kernel: &Kernel, addr: usize, len: usize) -> SysResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len {
        bytes.push(read_user_byte(kernel, addr + i)?);
    }
    Ok(bytes)
}

/// Copy `bytes` into user memory at `addr`.
pub fn copy_to_user(kernel: &Kernel, addr: usize, bytes: &[u8]) -> SysResult<()> {
    for (i, &b) in bytes.iter().enumerate() {
        write_user_byte(kernel, addr + i, b)?;
    }
    Ok(())
}

/// Longest accepted user string, NUL included.
const MAX_STRING_LEN: usize = 256;

/// Copy a NUL-terminated string out of user memory.
pub fn read_user_str(kernel: &Kernel, addr: usize) -> SysResult<String> {
    let mut bytes = Vec::new();
    for i in 0..MAX_STRING_LEN {
        match read_user_byte(kernel, addr + i)? {
            0 => return String::from_utf8(bytes).map_err(|_| SysError::EINVAL),
            b => bytes.push(b),
        }
    }
    Err(SysError::EINVAL)
}
