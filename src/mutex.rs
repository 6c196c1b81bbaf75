//! # Mutex
//!
//! Binary mutual exclusion with priority inheritance. A mutex protects
//! one shared resource for the lifetime of the system; the only safe way
//! to touch the protected data is between a successful `take` and the
//! matching `give`.
//!
//! ## Priority Inheritance
//!
//! ```text
//!   holder L (prio 1) ──────── owns ────────► mutex
//!                                               ▲
//!   waiter H (prio 5) ───── take() blocks ──────┘
//!
//!   ⇒ L runs at effective priority 5 until it gives the mutex,
//!     then reverts to 1. A waiter that times out triggers a
//!     recomputation, so no stale elevation survives.
//! ```
//!
//! Without inheritance, a middle-priority task could starve H
//! indefinitely by preempting L — the classic unbounded inversion.
//!
//! On release the mutex is granted directly to the best waiter
//! (highest effective priority, ties by arrival); the grantee wakes
//! already owning it, so there is no retry window for a third task to
//! steal the grant.

use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::task::{PendOn, TaskId, WaitResult};
use crate::time::Timeout;

/// Mutex control block. Wait-set membership lives in the TCBs
/// (`PendOn::Mutex`), so the block itself only tracks ownership.
pub struct MutexControlBlock {
    /// Task currently holding the mutex, if any.
    pub holder: Option<TaskId>,
    /// Whether this slot has been handed out by `mutex_create`.
    pub active: bool,
}

impl MutexControlBlock {
    pub const EMPTY: Self = Self {
        holder: None,
        active: false,
    };
}

/// Immediate outcome of a `take` at the kernel-core level. The blocking
/// API layer turns `Blocked` into a context switch and reads the wait
/// result once the task resumes; `Unavailable` is a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeStatus {
    /// The caller now holds the mutex.
    Acquired,
    /// Held by someone else and the caller chose not to wait.
    Unavailable,
    /// The caller was queued on the mutex and must be switched out.
    Blocked,
}

impl Scheduler {
    /// Hand out a mutex slot. Fails with
    /// [`KernelError::ResourceExhausted`] once the table is full.
    pub fn mutex_create(&mut self) -> Result<usize, KernelError> {
        if self.mutex_count >= self.mutexes.len() {
            return Err(KernelError::ResourceExhausted);
        }
        let mid = self.mutex_count;
        self.mutexes[mid] = MutexControlBlock {
            holder: None,
            active: true,
        };
        self.mutex_count += 1;
        Ok(mid)
    }

    /// Attempt to acquire a mutex for the current task.
    ///
    /// A free mutex is acquired on the spot. A held mutex either fails
    /// the poll (`Unavailable`) or blocks the caller, elevating the
    /// holder to the caller's effective priority if it is below it.
    /// Recursive takes are not supported and will deadlock, exactly as
    /// a non-recursive mutex should.
    pub fn mutex_take(&mut self, mid: usize, timeout: Timeout) -> TakeStatus {
        debug_assert!(self.mutexes[mid].active);
        let cur = self.current_task;

        match self.mutexes[mid].holder {
            None => {
                self.mutexes[mid].holder = Some(cur);
                TakeStatus::Acquired
            }
            Some(holder) => {
                debug_assert!(holder != cur, "recursive mutex take");
                if timeout.is_poll() {
                    return TakeStatus::Unavailable;
                }
                let waiter_priority = self.tasks[cur].priority;
                if self.tasks[holder].priority < waiter_priority {
                    self.tasks[holder].priority = waiter_priority;
                }
                let deadline = timeout.deadline_after(self.tick_count);
                self.block_current(PendOn::Mutex(mid), deadline);
                TakeStatus::Blocked
            }
        }
    }

    /// Release a mutex held by the current task.
    ///
    /// Reverts any inherited priority, then grants the mutex to the
    /// highest-priority waiter (arrival order on ties) and wakes it.
    /// Returns [`KernelError::NotOwner`] if the caller does not hold the
    /// mutex — a protocol violation the caller gets to see.
    pub fn mutex_give(&mut self, mid: usize) -> Result<(), KernelError> {
        debug_assert!(self.mutexes[mid].active);
        let cur = self.current_task;

        if self.mutexes[mid].holder != Some(cur) {
            crate::warn!("task {} gave a mutex it does not hold", cur);
            return Err(KernelError::NotOwner);
        }

        self.tasks[cur].priority = self.tasks[cur].base_priority;

        match self.first_waiter(PendOn::Mutex(mid)) {
            Some(next) => {
                self.mutexes[mid].holder = Some(next);
                self.wake(next, WaitResult::Granted);
            }
            None => self.mutexes[mid].holder = None,
        }
        Ok(())
    }

    /// Recompute a holder's effective priority from its remaining
    /// waiters. Called when a waiter abandons the wait-set (timeout or
    /// suspension) so the elevation never outlives its cause.
    pub(crate) fn refresh_mutex_inheritance(&mut self, mid: usize) {
        let Some(holder) = self.mutexes[mid].holder else {
            return;
        };
        let mut priority = self.tasks[holder].base_priority;
        for i in 0..self.task_count {
            if self.tasks[i].is_waiting_on(PendOn::Mutex(mid)) {
                priority = priority.max(self.tasks[i].priority);
            }
        }
        self.tasks[holder].priority = priority;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskConfig, TaskState};

    extern "C" fn task_body(_: usize) -> ! {
        loop {}
    }

    fn spawn(s: &mut Scheduler, priority: u8) -> TaskId {
        s.create_task(
            task_body,
            0,
            TaskConfig {
                priority,
                stack_size: 256,
                time_slice: 0,
            },
        )
        .unwrap()
    }

    fn run_as(s: &mut Scheduler, tid: TaskId) {
        let cur = s.current_task;
        if s.tasks[cur].state == TaskState::Running {
            s.tasks[cur].state = TaskState::Ready;
        }
        s.tasks[tid].state = TaskState::Running;
        s.current_task = tid;
    }

    #[test]
    fn test_single_holder() {
        let mut s = Scheduler::new();
        let a = spawn(&mut s, 2);
        let b = spawn(&mut s, 2);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, a);
        assert_eq!(s.mutex_take(m, Timeout::Forever), TakeStatus::Acquired);
        assert_eq!(s.mutexes[m].holder, Some(a));

        run_as(&mut s, b);
        assert_eq!(s.mutex_take(m, Timeout::NoWait), TakeStatus::Unavailable);
        assert_eq!(s.mutexes[m].holder, Some(a));
    }

    #[test]
    fn test_give_grants_highest_priority_waiter() {
        let mut s = Scheduler::new();
        let holder = spawn(&mut s, 1);
        let mid_waiter = spawn(&mut s, 3);
        let high_waiter = spawn(&mut s, 5);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, holder);
        assert_eq!(s.mutex_take(m, Timeout::Forever), TakeStatus::Acquired);

        run_as(&mut s, mid_waiter);
        assert_eq!(s.mutex_take(m, Timeout::Forever), TakeStatus::Blocked);
        run_as(&mut s, high_waiter);
        assert_eq!(s.mutex_take(m, Timeout::Forever), TakeStatus::Blocked);

        run_as(&mut s, holder);
        s.mutex_give(m).unwrap();
        assert_eq!(s.mutexes[m].holder, Some(high_waiter));
        assert_eq!(s.tasks[high_waiter].state, TaskState::Ready);
        assert_eq!(s.tasks[high_waiter].wait_result, WaitResult::Granted);
        // The other waiter is still queued
        assert_eq!(s.tasks[mid_waiter].state, TaskState::Blocked);
    }

    #[test]
    fn test_equal_priority_waiters_granted_in_arrival_order() {
        let mut s = Scheduler::new();
        let holder = spawn(&mut s, 1);
        let first = spawn(&mut s, 3);
        let second = spawn(&mut s, 3);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, holder);
        s.mutex_take(m, Timeout::Forever);
        run_as(&mut s, first);
        s.mutex_take(m, Timeout::Forever);
        run_as(&mut s, second);
        s.mutex_take(m, Timeout::Forever);

        run_as(&mut s, holder);
        s.mutex_give(m).unwrap();
        assert_eq!(s.mutexes[m].holder, Some(first));
    }

    #[test]
    fn test_priority_inheritance_raises_and_reverts() {
        let mut s = Scheduler::new();
        let low = spawn(&mut s, 1);
        let high = spawn(&mut s, 5);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, low);
        s.mutex_take(m, Timeout::Forever);
        assert_eq!(s.tasks[low].priority, 1);

        run_as(&mut s, high);
        assert_eq!(s.mutex_take(m, Timeout::Forever), TakeStatus::Blocked);
        // Holder elevated to the waiter's priority
        assert_eq!(s.tasks[low].priority, 5);
        assert_eq!(s.tasks[low].base_priority, 1);

        run_as(&mut s, low);
        s.mutex_give(m).unwrap();
        // Reverts immediately on release
        assert_eq!(s.tasks[low].priority, 1);
        assert_eq!(s.mutexes[m].holder, Some(high));
    }

    #[test]
    fn test_give_without_ownership() {
        let mut s = Scheduler::new();
        let a = spawn(&mut s, 2);
        let b = spawn(&mut s, 2);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, a);
        s.mutex_take(m, Timeout::Forever);

        run_as(&mut s, b);
        assert_eq!(s.mutex_give(m), Err(KernelError::NotOwner));
        assert_eq!(s.mutexes[m].holder, Some(a));

        // Releasing an unheld mutex is the same violation
        s.mutex_give(m).ok();
        run_as(&mut s, a);
        s.mutex_give(m).unwrap();
        assert_eq!(s.mutex_give(m), Err(KernelError::NotOwner));
    }

    #[test]
    fn test_take_timeout_leaves_mutex_untouched() {
        let mut s = Scheduler::new();
        let holder = spawn(&mut s, 1);
        let waiter = spawn(&mut s, 5);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, holder);
        s.mutex_take(m, Timeout::Forever);

        run_as(&mut s, waiter);
        let start = s.tick_count;
        assert_eq!(s.mutex_take(m, Timeout::Ticks(4)), TakeStatus::Blocked);
        assert_eq!(s.tasks[holder].priority, 5);

        s.tick();
        s.tick();
        s.tick();
        assert_eq!(s.tasks[waiter].state, TaskState::Blocked);
        s.tick();
        assert!(s.tick_count >= start + 4);
        assert_eq!(s.tasks[waiter].state, TaskState::Ready);
        assert_eq!(s.tasks[waiter].wait_result, WaitResult::TimedOut);

        // Ownership unchanged, inherited elevation dropped with the waiter
        assert_eq!(s.mutexes[m].holder, Some(holder));
        assert_eq!(s.tasks[holder].priority, 1);
    }

    #[test]
    fn test_inheritance_refresh_keeps_remaining_waiters() {
        let mut s = Scheduler::new();
        let low = spawn(&mut s, 1);
        let mid = spawn(&mut s, 3);
        let high = spawn(&mut s, 5);
        let m = s.mutex_create().unwrap();

        run_as(&mut s, low);
        s.mutex_take(m, Timeout::Forever);
        run_as(&mut s, mid);
        s.mutex_take(m, Timeout::Forever);
        run_as(&mut s, high);
        s.mutex_take(m, Timeout::Ticks(2));
        assert_eq!(s.tasks[low].priority, 5);

        s.tick();
        s.tick();
        // High-priority waiter gave up; elevation falls back to the
        // best remaining waiter, not to base
        assert_eq!(s.tasks[high].wait_result, WaitResult::TimedOut);
        assert_eq!(s.tasks[low].priority, 3);
    }

    #[test]
    fn test_mutex_table_exhaustion() {
        let mut s = Scheduler::new();
        for _ in 0..s.mutexes.len() {
            s.mutex_create().unwrap();
        }
        assert_eq!(s.mutex_create(), Err(KernelError::ResourceExhausted));
    }
}
