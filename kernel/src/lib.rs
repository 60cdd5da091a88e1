//! A pedagogical operating-system kernel running on a simulated CPU.
//!
//! The kernel proper (threads, scheduler, synchronization, exception
//! handling) and the simulated machine (memory, registers, MMU, TLB) live
//! side by side; the machine raises typed exceptions and the kernel resolves
//! them by paging, refilling the TLB, or dispatching system calls.

pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod machine;
pub mod stats;
pub mod swap;
pub mod syscall;
pub mod task;
pub mod trap;

pub use kernel::{Kernel, KernelOptions};
