//! # Task Control Block
//!
//! Defines the task model for Kestrel. Each task is a unit of concurrent
//! execution with a fixed base priority, a stack carved from the kernel
//! arena, and a body that runs forever. Tasks are created before the
//! scheduler starts and are destroyed only by system reset.

use crate::config::{QUEUE_MSG_SIZE, TIME_SLICE_TICKS};
use crate::time::Tick;

/// Index of a task in the scheduler's task table.
pub type TaskId = usize;

/// Task entry point. `arg` is the creation-time argument, delivered in
/// the first register on hardware. Bodies never return.
pub type TaskEntry = extern "C" fn(usize) -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐      schedule()       ┌─────────┐
///   │  Ready   │ ────────────────────► │ Running │
///   └──────────┘                       └─────────┘
///      ▲  ▲          preempt / yield        │
///      │  └────────────────────────────────┘
///      │                                    │ delay / take / send / receive
///      │ wake (granted or timed out)        ▼
///      │                               ┌──────────┐
///      └────────────────────────────── │ Blocked  │
///                                      └──────────┘
/// ```
///
/// `Suspended` sits outside the cycle: a suspended task is invisible to
/// the scheduler until [`resume`](crate::scheduler::Scheduler::resume).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Runnable, waiting its turn in the ready set.
    Ready,
    /// Currently executing. Exactly one task is Running at any instant.
    Running,
    /// Waiting on a delay, mutex, or queue, possibly with a deadline.
    Blocked,
    /// Removed from scheduling until explicitly resumed.
    Suspended,
}

// ---------------------------------------------------------------------------
// Wait bookkeeping
// ---------------------------------------------------------------------------

/// What a Blocked task is waiting for. Wait-set membership lives here, in
/// the TCB: the waiters of a mutex or queue are exactly the blocked tasks
/// whose `pend` names it, recovered by a bounded table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendOn {
    /// Pure time delay; wakes `Granted` when the deadline arrives.
    Delay,
    /// Waiting to acquire the mutex with this handle.
    Mutex(usize),
    /// Waiting for free space in the queue with this handle.
    QueueSend(usize),
    /// Waiting for a message from the queue with this handle.
    QueueRecv(usize),
}

/// Why a Blocked task was woken. Read by the caller of the blocking
/// operation once it is running again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The wait condition was satisfied: delay elapsed, mutex granted,
    /// message delivered, or queue space claimed.
    Granted,
    /// The deadline arrived first. The primitive was left untouched.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static per-task configuration, fixed at creation.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Base priority; higher runs first. The effective priority may rise
    /// above this temporarily through mutex priority inheritance.
    pub priority: u8,

    /// Requested stack size in bytes, carved from the kernel stack arena.
    /// Rounded up to [`MIN_STACK_SIZE`](crate::config::MIN_STACK_SIZE).
    pub stack_size: usize,

    /// Round-robin slice in ticks. `0` uses the system default
    /// [`TIME_SLICE_TICKS`]; if that is also 0, the task is never sliced.
    pub time_slice: u32,
}

impl TaskConfig {
    /// The slice this task actually runs with.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            TIME_SLICE_TICKS
        }
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block — everything the kernel tracks per task.
///
/// TCBs live in a fixed array inside the scheduler; no heap. The stack
/// itself is not inline: `stack_base`/`stack_size` locate the task's
/// region inside the scheduler's stack arena, and `stack_pointer` is the
/// saved process stack pointer, updated on every context switch.
pub struct TaskControlBlock {
    /// Table index; doubles as the task's identity.
    pub id: TaskId,

    /// Current execution state.
    pub state: TaskState,

    /// Priority assigned at creation. Never changes.
    pub base_priority: u8,

    /// Priority the scheduler actually compares. Equal to
    /// `base_priority` except while elevated by priority inheritance.
    pub priority: u8,

    /// Arrival-order stamp, renewed whenever the task enters the ready
    /// set voluntarily (yield, slice expiry, wake) and when it blocks.
    /// Ties among equal priorities go to the smallest stamp.
    pub order_stamp: u32,

    /// What the task is blocked on, if anything.
    pub pend: Option<PendOn>,

    /// Absolute wake deadline for a timed wait. `None` = wait forever.
    pub wake_at: Option<Tick>,

    /// Outcome of the most recent wait, valid after wake.
    pub wait_result: WaitResult,

    /// Staging buffer for queue hand-off: holds the outgoing message of
    /// a blocked sender, or the delivered message of a woken receiver.
    pub msg: [u8; QUEUE_MSG_SIZE],

    /// Valid bytes in `msg`.
    pub msg_len: usize,

    /// Saved process stack pointer. Only meaningful on hardware.
    pub stack_pointer: *mut u32,

    /// Offset of the task's stack region in the kernel stack arena.
    pub stack_base: usize,

    /// Length of the stack region in bytes.
    pub stack_size: usize,

    /// Configured time slice (0 = never sliced).
    pub time_slice: u32,

    /// Ticks left in the current slice.
    pub ticks_remaining: u32,

    /// Total ticks spent Running.
    pub total_ticks: u32,

    /// Whether this slot holds a live task.
    pub active: bool,
}

impl TaskControlBlock {
    /// An unallocated slot, for initializing the static table.
    pub const EMPTY: Self = Self {
        id: 0,
        state: TaskState::Suspended,
        base_priority: 0,
        priority: 0,
        order_stamp: 0,
        pend: None,
        wake_at: None,
        wait_result: WaitResult::Granted,
        msg: [0u8; QUEUE_MSG_SIZE],
        msg_len: 0,
        stack_pointer: core::ptr::null_mut(),
        stack_base: 0,
        stack_size: 0,
        time_slice: 0,
        ticks_remaining: 0,
        total_ticks: 0,
        active: false,
    };

    /// Initialize this slot for a new task. The stack region and initial
    /// frame are set up separately by the scheduler and the arch port.
    pub fn init(&mut self, id: TaskId, config: TaskConfig) {
        let slice = config.effective_time_slice();
        *self = Self {
            id,
            state: TaskState::Ready,
            base_priority: config.priority,
            priority: config.priority,
            time_slice: slice,
            ticks_remaining: slice,
            active: true,
            ..Self::EMPTY
        };
    }

    /// Runnable right now: allocated and Ready.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.state == TaskState::Ready
    }

    /// Blocked on exactly this wait object.
    #[inline]
    pub fn is_waiting_on(&self, pend: PendOn) -> bool {
        self.active && self.state == TaskState::Blocked && self.pend == Some(pend)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
