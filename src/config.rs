//! # Kestrel Configuration
//!
//! Compile-time constants governing the kernel and the demo application.
//! All limits are fixed at build time — the kernel never allocates.

/// Maximum number of tasks the kernel can manage, including the idle task.
/// Bounds the static TCB table; raising it costs RAM for the table only —
/// stacks come out of [`STACK_ARENA_SIZE`].
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is the unit of all delays and timeouts.
pub const TICK_HZ: u32 = 1_000;

/// System clock frequency in Hz (STM32F401 on the 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Default round-robin time slice in ticks for tasks that do not request
/// their own. `0` disables slicing entirely, making equal-priority
/// scheduling purely run-to-block.
pub const TIME_SLICE_TICKS: u32 = 10;

/// Total bytes available for task stacks. Stacks are carved from this
/// arena at task creation and never returned.
pub const STACK_ARENA_SIZE: usize = 8 * 1024;

/// Smallest stack the kernel will carve. Requests below this are rounded
/// up; the exception frame alone needs 64 bytes plus call headroom.
pub const MIN_STACK_SIZE: usize = 256;

/// Stack carved for the kernel's own idle task.
pub const IDLE_STACK_SIZE: usize = 256;

/// Word painted at the floor of every task stack. An overwritten canary
/// on context save means the stack overflowed, which is fatal.
pub const STACK_CANARY: u32 = 0xA5A5_A5A5;

/// Maximum number of mutexes.
pub const MAX_MUTEXES: usize = 4;

/// Maximum number of message queues.
pub const MAX_QUEUES: usize = 4;

/// Size of one queue message slot in bytes. Queues may carry shorter
/// items; they may not carry longer ones.
pub const QUEUE_MSG_SIZE: usize = 8;

/// Ring-buffer slots per queue. A queue's capacity is chosen at creation
/// and may be at most this many slots.
pub const QUEUE_SLOTS: usize = 8;

// ---------------------------------------------------------------------------
// Demo application tuning
// ---------------------------------------------------------------------------

/// Ticks to wait before each ADC read. A short recovery time between
/// channels gives noticeably more stable readings.
pub const SAMPLE_SETTLE_TICKS: u32 = 1;

/// Sampler period in ticks.
pub const SAMPLE_PERIOD_TICKS: u32 = 50;

/// Shortest blink half-period the sampler will produce, in milliseconds.
pub const DELAY_MIN_MS: u16 = 10;

/// Longest blink half-period, in milliseconds.
pub const DELAY_MAX_MS: u16 = 1_000;

/// A channel must move by more than this many milliseconds before the
/// sampler publishes again. This gating is what keeps the log queue from
/// overflowing on a noisy input.
pub const CHANGE_THRESHOLD_MS: u16 = 5;

/// Depth of the sampler → logger message queue.
pub const LOG_QUEUE_DEPTH: usize = 3;

/// How long an actuator sleeps before re-checking a channel that has no
/// published value yet.
pub const ACTUATOR_RETRY_TICKS: u32 = 10;

/// Logger receive timeout. Hitting it means the producer is starved, not
/// that the kernel is broken; the logger reports it and keeps waiting.
pub const LOGGER_TIMEOUT_TICKS: u32 = 5_000;

/// Full-scale value of the 10-bit ADC readings the sampler consumes.
pub const ADC_MAX: u16 = 1_023;
