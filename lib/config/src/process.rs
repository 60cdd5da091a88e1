//! Thread and process tunables

/// Capacity of the global thread table; thread ids index into it.
pub const MAX_THREAD_NUM: usize = 128;

/// Words of simulated kernel stack owned by each thread
pub const STACK_SIZE: usize = 8 * 1024;

/// Sentinel written at the base of every kernel stack; an overwritten
/// fencepost means the stack overflowed.
pub const STACK_FENCEPOST: u32 = 0x0ded_beef;
