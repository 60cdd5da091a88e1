use strum::FromRepr;

/// Type alias for syscall result. A syscall returns an `i32` that user code
/// reads back out of the result register.
pub type SyscallResult = Result<i32, SysError>;
/// Type alias for result of general kernel functions.
pub type SysResult<T> = Result<T, SysError>;

/// Error codes surfaced to user programs as negative syscall returns.
#[derive(FromRepr, Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum SysError {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// No such process
    ESRCH = 3,
    /// I/O error
    EIO = 5,
    /// Bad file number
    EBADF = 9,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address
    EFAULT = 14,
    /// File exists
    EEXIST = 17,
    /// Invalid argument
    EINVAL = 22,
    /// Too many open files
    EMFILE = 24,
    /// Illegal seek
    ESPIPE = 29,
    /// Invalid system call number
    ENOSYS = 38,
}

impl SysError {
    /// The name of the error, for logs.
    pub fn as_str(&self) -> &'static str {
        use SysError::*;
        match self {
            EPERM => "Operation not permitted",
            ENOENT => "No such file or directory",
            ESRCH => "No such process",
            EIO => "I/O error",
            EBADF => "Bad file number",
            ENOMEM => "Out of memory",
            EACCES => "Permission denied",
            EFAULT => "Bad address",
            EEXIST => "File exists",
            EINVAL => "Invalid argument",
            EMFILE => "Too many open files",
            ESPIPE => "Illegal seek",
            ENOSYS => "Invalid system call number",
        }
    }

    /// The value user programs see: the negated code.
    pub fn code(&self) -> i32 {
        -(*self as i32)
    }
}
