//! Register file layout of the simulated CPU

/// General-purpose registers
pub const NUM_GP_REGS: usize = 32;
/// Stack pointer
pub const STACK_REG: usize = 29;
/// Holds the return address for procedure calls
pub const RET_ADDR_REG: usize = 31;
/// Double-register to hold multiply result
pub const HI_REG: usize = 32;
pub const LO_REG: usize = 33;
/// Current program counter
pub const PC_REG: usize = 34;
/// Next program counter (for branch delay)
pub const NEXT_PC_REG: usize = 35;
/// Previous program counter (for debugging)
pub const PREV_PC_REG: usize = 36;
/// The register target of a delayed load
pub const LOAD_REG: usize = 37;
/// The value to be loaded by a delayed load
pub const LOAD_VALUE_REG: usize = 38;
/// The failing virtual address on an exception
pub const BAD_VADDR_REG: usize = 39;
/// Total registers in the simulated register file
pub const NUM_TOTAL_REGS: usize = 40;

/// Register carrying the syscall number, and the syscall result on return
pub const SYSCALL_NO_REG: usize = 2;
/// Registers carrying the first four syscall arguments
pub const SYSCALL_ARG_REGS: [usize; 4] = [4, 5, 6, 7];

/// Every simulated instruction is this many bytes wide
pub const INSTRUCTION_SIZE: i32 = 4;
