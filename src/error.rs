//! # Kernel Error Taxonomy
//!
//! Every recoverable failure the kernel can report. Fatal conditions
//! (stack overflow, task-table corruption) are not represented here —
//! the kernel panics and the panic handler halts the system, because a
//! control system that keeps running on corrupted state is worse than
//! one that visibly stops.

use core::fmt;

/// Recoverable kernel errors, returned to the caller to retry, skip, or
/// escalate. The kernel never silently retries on the caller's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// A static table (tasks, mutexes, queues) or the stack arena is full.
    ResourceExhausted,
    /// A blocking operation exceeded its deadline.
    TimedOut,
    /// `give` called on a mutex the caller does not hold.
    NotOwner,
    /// Non-blocking send on a full queue. Loss is observable, never silent.
    Full,
    /// Non-blocking receive on an empty queue.
    Empty,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KernelError::ResourceExhausted => "resource exhausted",
            KernelError::TimedOut => "timed out",
            KernelError::NotOwner => "caller does not hold the mutex",
            KernelError::Full => "queue full",
            KernelError::Empty => "queue empty",
        };
        f.write_str(text)
    }
}
