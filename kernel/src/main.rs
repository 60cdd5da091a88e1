//! Boot the simulated kernel from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, ValueEnum};

use kernel::machine::{MachineConfig, ReplacePolicy, TranslationKind};
use kernel::task::SchedPolicy;
use kernel::{Kernel, KernelOptions};

#[derive(Parser, Debug)]
#[command(name = "oskern", about = "A pedagogical OS kernel on a simulated CPU")]
struct Args {
    /// Enable randomized time slicing with the given seed
    #[arg(long = "rs", value_name = "SEED")]
    random_seed: Option<u64>,

    /// Single-step user programs
    #[arg(short = 's')]
    single_step: bool,

    /// Read console input from a file instead of stdin
    #[arg(long = "ci", value_name = "PATH")]
    console_in: Option<PathBuf>,

    /// Write console output to a file instead of stdout
    #[arg(long = "co", value_name = "PATH")]
    console_out: Option<PathBuf>,

    /// Format the file system (meaningful with a real file system)
    #[arg(short = 'f')]
    format: bool,

    /// Network reliability, in [0, 1]
    #[arg(short = 'n', value_name = "FLOAT", default_value_t = 1.0)]
    reliability: f64,

    /// Host id on the simulated network
    #[arg(short = 'm', value_name = "INT", default_value_t = 0)]
    host_id: u32,

    /// Print usage
    #[arg(short = 'u')]
    usage: bool,

    /// Scheduling policy
    #[arg(long, value_enum, default_value = "fifo")]
    sched: PolicyArg,

    /// Page replacement policy
    #[arg(long, value_enum, default_value = "lru")]
    replace: ReplaceArg,

    /// Use the system-wide reverse page table instead of per-thread tables
    #[arg(long)]
    rpt: bool,

    /// Translate through the TLB, with the page table as refill source
    #[arg(long)]
    tlb: bool,

    /// Directory for per-thread swap files
    #[arg(long, value_name = "DIR")]
    swap_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Fifo,
    Priority,
    Rr,
    Mlfq,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReplaceArg {
    Fifo,
    Lru,
    Clock,
}

fn options(args: &Args) -> KernelOptions {
    let defaults = KernelOptions::default();
    KernelOptions {
        sched: match args.sched {
            PolicyArg::Fifo => SchedPolicy::Fifo,
            PolicyArg::Priority => SchedPolicy::StaticPriority,
            PolicyArg::Rr => SchedPolicy::RoundRobin,
            PolicyArg::Mlfq => SchedPolicy::Mlfq,
        },
        machine: MachineConfig {
            use_tlb: args.tlb,
            translation: if args.rpt {
                TranslationKind::Reverse
            } else {
                TranslationKind::Forward
            },
            replace: match args.replace {
                ReplaceArg::Fifo => ReplacePolicy::Fifo,
                ReplaceArg::Lru => ReplacePolicy::Lru,
                ReplaceArg::Clock => ReplacePolicy::Clock,
            },
            ..defaults.machine
        },
        random_seed: args.random_seed,
        swap_dir: args.swap_dir.clone().unwrap_or(defaults.swap_dir),
        console_in: args.console_in.clone(),
        console_out: args.console_out.clone(),
        format_fs: args.format,
        reliability: args.reliability,
        host_id: args.host_id,
        single_step: args.single_step,
    }
}

/// Ping-pong between the main thread and a forked one, the classic first
/// sign of life for the scheduler and context switch.
fn self_test(kernel: &Arc<Kernel>) {
    let forked = kernel.new_thread("forked thread");
    kernel.fork(&forked, |k| {
        for round in 0..5 {
            println!("*** forked thread looped {round} times");
            k.yield_now();
        }
    });
    for round in 0..5 {
        println!("*** main thread looped {round} times");
        kernel.yield_now();
    }
    while !kernel.scheduler.lock().ready_is_empty() {
        kernel.yield_now();
    }
}

fn main() {
    logger::init();
    let args = Args::parse();
    if args.usage {
        Args::command().print_help().expect("cannot print usage");
        return;
    }
    log::info!(
        "booting: host {} with network reliability {}",
        args.host_id,
        args.reliability
    );

    let kernel = Kernel::new(options(&args));
    self_test(&kernel);
    print!("{}", kernel.thread_report());
    kernel.halt(0);
}
