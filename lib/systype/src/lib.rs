mod error;

pub use error::{SysError, SysResult, SyscallResult};
