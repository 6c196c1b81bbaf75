//! # Scheduler
//!
//! Core scheduling logic for Kestrel: a preemptive, fixed-priority
//! scheduler with round-robin rotation among equal priorities.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Advance time**: Increment the tick counter (wrapping)
//! 2. **Charge the slice**: Decrement the running task's time slice;
//!    an expired slice sends it to the back of its priority group
//! 3. **Expire timed waits**: Wake every blocked task whose deadline
//!    arrived — delays complete, timed mutex/queue waits report
//!    `TimedOut` and leave their primitive untouched
//! 4. **Reschedule if needed**: The port triggers PendSV, which calls
//!    [`Scheduler::schedule`] to pick the next task
//!
//! Selection is strict: the highest effective-priority Ready task always
//! wins; ties go to the task that entered the ready set first. A task
//! that is preempted involuntarily keeps its arrival stamp, so it does
//! not lose its turn to an equal-priority peer.
//!
//! ## Ownership
//!
//! The scheduler owns everything the kernel tracks: the task table, the
//! stack arena, and the mutex and queue control blocks (their operations
//! live in [`crate::mutex`] and [`crate::queue`]). Wait-set membership is
//! recorded in each TCB and recovered by a bounded table scan — with a
//! task table this small, scanning beats intrusive lists.

use crate::config::{MAX_MUTEXES, MAX_QUEUES, MAX_TASKS, MIN_STACK_SIZE, STACK_ARENA_SIZE, STACK_CANARY};
use crate::error::KernelError;
use crate::mutex::MutexControlBlock;
use crate::queue::QueueControlBlock;
use crate::task::{PendOn, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState, WaitResult};
use crate::time::{deadline_reached, is_before, Tick};

// ---------------------------------------------------------------------------
// Stack arena
// ---------------------------------------------------------------------------

/// Fixed pool that task stacks are carved from by bump allocation.
/// Regions are never returned — tasks live until reset.
pub struct StackArena {
    /// Backing storage for every task stack.
    pub mem: [u8; STACK_ARENA_SIZE],
    /// Bytes carved so far.
    pub used: usize,
}

impl StackArena {
    pub const fn new() -> Self {
        Self {
            mem: [0u8; STACK_ARENA_SIZE],
            used: 0,
        }
    }

    /// Carve an 8-byte-aligned region of at least `size` bytes.
    /// Returns `(base_offset, size)`, or `None` when the arena is spent.
    pub fn carve(&mut self, size: usize) -> Option<(usize, usize)> {
        let base = (self.used + 7) & !7;
        let size = (size + 7) & !7;
        let end = base.checked_add(size)?;
        if end > STACK_ARENA_SIZE {
            return None;
        }
        self.used = end;
        Some((base, size))
    }
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Central kernel state: task table, tick counter, stack arena, and the
/// mutex/queue control-block tables. On hardware a single instance lives
/// in a `static` owned by `kernel`; host tests construct their own.
pub struct Scheduler {
    /// Fixed task table. Index = task id.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated tasks.
    pub task_count: usize,

    /// Index of the task currently considered Running.
    pub current_task: TaskId,

    /// Monotonic (wrapping) tick counter.
    pub tick_count: Tick,

    /// Set whenever a state change may demand a context switch;
    /// cleared by [`Scheduler::schedule`].
    pub needs_reschedule: bool,

    /// Source of arrival-order stamps for ready sets and wait-sets.
    pub stamp_counter: u32,

    /// Mutex control blocks.
    pub mutexes: [MutexControlBlock; MAX_MUTEXES],

    /// Number of created mutexes.
    pub mutex_count: usize,

    /// Queue control blocks.
    pub queues: [QueueControlBlock; MAX_QUEUES],

    /// Number of created queues.
    pub queue_count: usize,

    /// Pool backing all task stacks.
    pub arena: StackArena,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current_task: 0,
            tick_count: 0,
            needs_reschedule: false,
            stamp_counter: 0,
            mutexes: [MutexControlBlock::EMPTY; MAX_MUTEXES],
            mutex_count: 0,
            queues: [QueueControlBlock::EMPTY; MAX_QUEUES],
            queue_count: 0,
            arena: StackArena::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Task creation
    // -----------------------------------------------------------------------

    /// Register a new task.
    ///
    /// Carves the requested stack from the arena (rounded up to
    /// [`MIN_STACK_SIZE`]), paints the overflow canary at the stack
    /// floor, and — on hardware — seeds the initial exception frame so
    /// the first dispatch lands in `entry(arg)`.
    ///
    /// Fails with [`KernelError::ResourceExhausted`] when the task table
    /// or the stack arena is full.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        arg: usize,
        config: TaskConfig,
    ) -> Result<TaskId, KernelError> {
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::ResourceExhausted);
        }
        let request = config.stack_size.max(MIN_STACK_SIZE);
        let (base, size) = self
            .arena
            .carve(request)
            .ok_or(KernelError::ResourceExhausted)?;

        let id = self.task_count;
        self.tasks[id].init(id, config);
        self.tasks[id].stack_base = base;
        self.tasks[id].stack_size = size;
        self.tasks[id].order_stamp = self.next_stamp();
        self.arena.mem[base..base + 4].copy_from_slice(&STACK_CANARY.to_le_bytes());

        #[cfg(all(target_arch = "arm", target_os = "none"))]
        {
            let sp = crate::arch::cortex_m4::seed_stack_frame(
                &mut self.arena.mem,
                base + size,
                entry,
                arg,
            );
            self.tasks[id].stack_pointer =
                unsafe { self.arena.mem.as_mut_ptr().add(sp) as *mut u32 };
        }
        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        let _ = (entry, arg);

        self.task_count += 1;
        crate::debug!("task {} created, priority {}", id, config.priority);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Tick processing
    // -----------------------------------------------------------------------

    /// Called from the SysTick handler every tick (and by test harnesses
    /// directly). Advances time, charges the running task's slice, and
    /// wakes every timed wait whose deadline arrived.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        // Charge the running task's slice
        let cur = self.current_task;
        if cur < self.task_count
            && self.tasks[cur].active
            && self.tasks[cur].state == TaskState::Running
        {
            self.tasks[cur].total_ticks = self.tasks[cur].total_ticks.wrapping_add(1);
            if self.tasks[cur].time_slice > 0 {
                if self.tasks[cur].ticks_remaining > 0 {
                    self.tasks[cur].ticks_remaining -= 1;
                }
                if self.tasks[cur].ticks_remaining == 0 {
                    // Slice spent: back of its priority group
                    self.tasks[cur].ticks_remaining = self.tasks[cur].time_slice;
                    self.tasks[cur].state = TaskState::Ready;
                    self.tasks[cur].order_stamp = self.next_stamp();
                    self.needs_reschedule = true;
                }
            }
        }

        // Expire timed waits
        let now = self.tick_count;
        for i in 0..self.task_count {
            if !self.tasks[i].active || self.tasks[i].state != TaskState::Blocked {
                continue;
            }
            let Some(deadline) = self.tasks[i].wake_at else {
                continue;
            };
            if !deadline_reached(now, deadline) {
                continue;
            }
            match self.tasks[i].pend {
                Some(PendOn::Mutex(mid)) => {
                    self.wake(i, WaitResult::TimedOut);
                    self.refresh_mutex_inheritance(mid);
                }
                Some(PendOn::QueueSend(_)) | Some(PendOn::QueueRecv(_)) => {
                    self.wake(i, WaitResult::TimedOut);
                }
                Some(PendOn::Delay) | None => self.wake(i, WaitResult::Granted),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Selection and dispatch
    // -----------------------------------------------------------------------

    /// Pick the next task to run and record the switch.
    ///
    /// The running task (if any) rejoins the ready set keeping its
    /// arrival stamp: an involuntary preemption must not cost it its
    /// turn among equal-priority peers. Selection is highest effective
    /// priority first, oldest stamp on ties.
    ///
    /// Returns `None` when nothing is runnable (the firmware never sees
    /// this — the idle task is always Ready).
    pub fn schedule(&mut self) -> Option<TaskId> {
        let cur = self.current_task;
        if cur < self.task_count
            && self.tasks[cur].active
            && self.tasks[cur].state == TaskState::Running
        {
            self.tasks[cur].state = TaskState::Ready;
        }

        let mut best: Option<TaskId> = None;
        for i in 0..self.task_count {
            if !self.tasks[i].is_runnable() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let candidate = &self.tasks[i];
                    let leader = &self.tasks[b];
                    if candidate.priority > leader.priority
                        || (candidate.priority == leader.priority
                            && is_before(candidate.order_stamp, leader.order_stamp))
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }

        if let Some(next) = best {
            self.tasks[next].state = TaskState::Running;
            self.current_task = next;
        }
        self.needs_reschedule = false;
        best
    }

    /// Voluntarily give up the rest of the current slice. The task stays
    /// Ready but moves to the back of its priority group.
    pub fn yield_current(&mut self) {
        let cur = self.current_task;
        if cur < self.task_count && self.tasks[cur].active {
            self.tasks[cur].state = TaskState::Ready;
            self.tasks[cur].ticks_remaining = self.tasks[cur].time_slice;
            self.tasks[cur].order_stamp = self.next_stamp();
            self.needs_reschedule = true;
        }
    }

    /// Block the current task for at least `ticks` ticks. The wake check
    /// runs on the tick after the deadline arithmetic lands, so the task
    /// never resumes early. `delay(0)` degenerates to a yield.
    pub fn delay_current(&mut self, ticks: u32) {
        if ticks == 0 {
            self.yield_current();
            return;
        }
        let deadline = self.tick_count.wrapping_add(ticks);
        self.block_current(PendOn::Delay, Some(deadline));
    }

    // -----------------------------------------------------------------------
    // Blocking and waking (used by the mutex and queue modules)
    // -----------------------------------------------------------------------

    /// Move the current task out of the running set onto a wait object.
    /// Its fresh stamp records arrival order within the wait-set.
    pub(crate) fn block_current(&mut self, pend: PendOn, wake_at: Option<Tick>) {
        let cur = self.current_task;
        self.tasks[cur].state = TaskState::Blocked;
        self.tasks[cur].pend = Some(pend);
        self.tasks[cur].wake_at = wake_at;
        self.tasks[cur].order_stamp = self.next_stamp();
        self.needs_reschedule = true;
    }

    /// Wake a blocked task with the given result. The task becomes Ready
    /// immediately and preempts the running task if, and only if, its
    /// effective priority is strictly higher.
    pub(crate) fn wake(&mut self, tid: TaskId, result: WaitResult) {
        self.tasks[tid].pend = None;
        self.tasks[tid].wake_at = None;
        self.tasks[tid].wait_result = result;
        self.make_ready(tid);
    }

    /// Highest-priority waiter on `pend`, ties by arrival order.
    pub(crate) fn first_waiter(&self, pend: PendOn) -> Option<TaskId> {
        let mut best: Option<TaskId> = None;
        for i in 0..self.task_count {
            if !self.tasks[i].is_waiting_on(pend) {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let candidate = &self.tasks[i];
                    let leader = &self.tasks[b];
                    if candidate.priority > leader.priority
                        || (candidate.priority == leader.priority
                            && is_before(candidate.order_stamp, leader.order_stamp))
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best
    }

    fn make_ready(&mut self, tid: TaskId) {
        self.tasks[tid].state = TaskState::Ready;
        self.tasks[tid].order_stamp = self.next_stamp();

        let cur = self.current_task;
        let cur_running = cur < self.task_count
            && self.tasks[cur].active
            && self.tasks[cur].state == TaskState::Running;
        if !cur_running || self.tasks[tid].priority > self.tasks[cur].priority {
            self.needs_reschedule = true;
        }
    }

    pub(crate) fn next_stamp(&mut self) -> u32 {
        self.stamp_counter = self.stamp_counter.wrapping_add(1);
        self.stamp_counter
    }

    // -----------------------------------------------------------------------
    // Suspension
    // -----------------------------------------------------------------------

    /// Remove a task from scheduling until [`Scheduler::resume`]. Any
    /// wait in progress is abandoned; a mutex the task was queued on has
    /// its holder's inherited priority recomputed.
    pub fn suspend(&mut self, tid: TaskId) {
        if tid >= self.task_count || !self.tasks[tid].active {
            return;
        }
        let pend = self.tasks[tid].pend.take();
        self.tasks[tid].state = TaskState::Suspended;
        self.tasks[tid].wake_at = None;
        if let Some(PendOn::Mutex(mid)) = pend {
            self.refresh_mutex_inheritance(mid);
        }
        if tid == self.current_task {
            self.needs_reschedule = true;
        }
    }

    /// Put a suspended task back in the ready set.
    pub fn resume(&mut self, tid: TaskId) {
        if tid >= self.task_count || !self.tasks[tid].active {
            return;
        }
        if self.tasks[tid].state == TaskState::Suspended {
            self.make_ready(tid);
        }
    }

    // -----------------------------------------------------------------------
    // Accessors and stack integrity
    // -----------------------------------------------------------------------

    pub fn current_tcb(&self) -> &TaskControlBlock {
        &self.tasks[self.current_task]
    }

    pub fn current_tcb_mut(&mut self) -> &mut TaskControlBlock {
        &mut self.tasks[self.current_task]
    }

    /// Outcome of the current task's most recent wait. Read by the
    /// blocking kernel API after the task resumes.
    pub fn current_wait_result(&self) -> WaitResult {
        self.tasks[self.current_task].wait_result
    }

    /// True while the canary at the task's stack floor is unscathed.
    pub fn stack_canary_intact(&self, tid: TaskId) -> bool {
        let base = self.tasks[tid].stack_base;
        self.arena.mem[base..base + 4] == STACK_CANARY.to_le_bytes()
    }

    /// True if an arena offset lies within the task's stack region.
    pub fn stack_in_bounds(&self, tid: TaskId, sp_offset: usize) -> bool {
        let t = &self.tasks[tid];
        sp_offset >= t.stack_base && sp_offset <= t.stack_base + t.stack_size
    }

    /// Halt on a trashed stack. An overflowed stack means arbitrary
    /// kernel state may already be corrupt; stopping visibly beats
    /// running on.
    pub fn assert_stack_integrity(&self, tid: TaskId) {
        if !self.stack_canary_intact(tid) {
            crate::error!("stack overflow in task {}", tid);
            panic!("stack overflow in task {}", tid);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
