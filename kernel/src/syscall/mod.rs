//! System call numbers and dispatch.
//!
//! Calling convention: the syscall number arrives in register 2, arguments
//! in registers 4 through 7, and the result goes back in register 2. On
//! return from a syscall (never from a fault) the PC triple advances by one
//! instruction — forgetting that would re-execute the same call forever.

mod fs;
mod user;

pub use user::{copy_from_user, copy_to_user, read_user_str};

use config::machine::{
    INSTRUCTION_SIZE, NEXT_PC_REG, PC_REG, PREV_PC_REG, SYSCALL_ARG_REGS, SYSCALL_NO_REG,
};
use strum::FromRepr;
use systype::{SysError, SyscallResult};

use crate::kernel::Kernel;
use crate::trap;

#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallNo {
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Join = 3,
    Create = 4,
    Remove = 5,
    Open = 6,
    Read = 7,
    Write = 8,
    Seek = 9,
    Close = 10,
    Delete = 11,
    ThreadFork = 12,
    ThreadYield = 13,
    ExecV = 14,
    ThreadExit = 15,
    ThreadJoin = 16,
    GetSpaceId = 17,
    GetThreadId = 18,
    Ipc = 19,
    Clock = 20,
    Add = 42,
}

impl SyscallNo {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyscallNo::Halt => "Halt",
            SyscallNo::Exit => "Exit",
            SyscallNo::Exec => "Exec",
            SyscallNo::Join => "Join",
            SyscallNo::Create => "Create",
            SyscallNo::Remove => "Remove",
            SyscallNo::Open => "Open",
            SyscallNo::Read => "Read",
            SyscallNo::Write => "Write",
            SyscallNo::Seek => "Seek",
            SyscallNo::Close => "Close",
            SyscallNo::Delete => "Delete",
            SyscallNo::ThreadFork => "ThreadFork",
            SyscallNo::ThreadYield => "ThreadYield",
            SyscallNo::ExecV => "ExecV",
            SyscallNo::ThreadExit => "ThreadExit",
            SyscallNo::ThreadJoin => "ThreadJoin",
            SyscallNo::GetSpaceId => "GetSpaceId",
            SyscallNo::GetThreadId => "GetThreadId",
            SyscallNo::Ipc => "Ipc",
            SyscallNo::Clock => "Clock",
            SyscallNo::Add => "Add",
        }
    }
}

pub fn dispatch(kernel: &Kernel) {
    let (no, args) = {
        let machine = kernel.machine.lock();
        (
            machine.read_register(SYSCALL_NO_REG),
            SYSCALL_ARG_REGS.map(|r| machine.read_register(r)),
        )
    };
    let Some(call) = SyscallNo::from_repr(no) else {
        log::error!("unexpected system call {no}");
        advance_pc(kernel);
        return;
    };
    log::debug!("system call {}", call.as_str());

    let result: SyscallResult = match call {
        SyscallNo::Halt => {
            log::info!("shutdown, initiated by user program");
            kernel.halt(0)
        }
        SyscallNo::Exit | SyscallNo::ThreadExit => trap::terminate_current(kernel, args[0]),
        SyscallNo::Add => Ok(args[0].wrapping_add(args[1])),
        SyscallNo::ThreadYield => {
            kernel.yield_now();
            Ok(0)
        }
        // One thread per address space: the space id is the thread id.
        SyscallNo::GetSpaceId | SyscallNo::GetThreadId => {
            Ok(kernel.current_thread().tid() as i32)
        }
        SyscallNo::Clock => Ok(kernel.stats.total_ticks() as i32),
        SyscallNo::Create => fs::sys_create(kernel, args[0]),
        SyscallNo::Remove | SyscallNo::Delete => fs::sys_remove(kernel, args[0]),
        SyscallNo::Open => fs::sys_open(kernel, args[0], args[1]),
        SyscallNo::Read => fs::sys_read(kernel, args[0], args[1], args[2]),
        SyscallNo::Write => fs::sys_write(kernel, args[0], args[1], args[2]),
        SyscallNo::Seek => fs::sys_seek(kernel, args[0], args[1]),
        SyscallNo::Close => fs::sys_close(kernel, args[0]),
        SyscallNo::Exec
        | SyscallNo::ExecV
        | SyscallNo::Join
        | SyscallNo::ThreadFork
        | SyscallNo::ThreadJoin
        | SyscallNo::Ipc => {
            log::error!(
                "system call {} needs the user-program loader",
                call.as_str()
            );
            Err(SysError::ENOSYS)
        }
    };

    let value = match result {
        Ok(v) => v,
        Err(e) => {
            log::warn!("system call {} failed: {}", call.as_str(), e.as_str());
            e.code()
        }
    };
    kernel.machine.lock().write_register(SYSCALL_NO_REG, value);
    advance_pc(kernel);
}

/// Step the PC triple past the syscall instruction.
pub fn advance_pc(kernel: &Kernel) {
    let mut machine = kernel.machine.lock();
    let pc = machine.read_register(PC_REG);
    machine.write_register(PREV_PC_REG, pc);
    machine.write_register(PC_REG, pc + INSTRUCTION_SIZE);
    machine.write_register(NEXT_PC_REG, pc + 2 * INSTRUCTION_SIZE);
}
