//! Scheduler tunables

/// Quantum, in timer interrupts, handed to a thread under round robin
pub const TIME_SLICE: i32 = 3;

/// Number of feedback levels in the multi-level feedback queue
pub const QUEUE_NUM: usize = 5;
/// Per-level quantum under the multi-level feedback queue. A thread that
/// burns its whole quantum demotes one level and receives the next, longer
/// one.
pub const MLFQ_TIME_SLICE: [i32; QUEUE_NUM] = [3, 4, 5, 6, 7];

/// Priority given to a thread that never asked for one. Smaller wins.
pub const DEFAULT_PRIORITY: i32 = 8;

/// Simulated time advanced by each clock tick
pub const SYSTEM_TICK: u64 = 10;
/// Simulated time between two timer interrupts
pub const TIMER_TICKS: u64 = 100;
