//! # Kernel
//!
//! The global kernel instance and the task-facing blocking API.
//!
//! The scheduler core (`scheduler`, `mutex`, `queue`) is a plain state
//! machine; this module is what turns its `Blocked` answers into real
//! suspension. Every blocking wrapper follows the same shape:
//!
//! ```text
//! critical section ─► core operation
//!    ├─ done (acquired / sent / received / failed poll) ─► return
//!    └─ Blocked ─► pend PendSV ─► task switched out here
//!                       ...
//!         woken (granted or timed out) ─► read wait result ─► return
//! ```
//!
//! The grant itself happens on the waker's side (a `give` hands the
//! mutex over, a `receive` pulls a staged message in), so a woken task
//! never has to retry the operation.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()
//!         ├─► kernel::mutex_create() / queue_create() / create_task() …
//!         └─► kernel::start()            ← does not return
//!               ├─► create the idle task
//!               ├─► configure SysTick + exception priorities
//!               └─► launch the first task
//! ```

use core::ptr::addr_of_mut;

use crate::arch::cortex_m4;
use crate::config::IDLE_STACK_SIZE;
use crate::error::KernelError;
use crate::mutex::TakeStatus;
use crate::queue::{RecvStatus, SendStatus};
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::{TaskConfig, TaskEntry, TaskId, WaitResult};
use crate::time::{Tick, Timeout};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// The kernel's one scheduler.
///
/// # Safety
/// Reached through [`SCHEDULER_PTR`], set once in `init()`. Task-level
/// access goes through critical sections; ISR access is serialized by
/// exception priority.
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the scheduler for the exception handlers, which
/// cannot comfortably hold references.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Publish the scheduler pointer. Call exactly once, before any other
/// kernel function.
pub fn init() {
    unsafe {
        SCHEDULER_PTR = addr_of_mut!(SCHEDULER);
    }
}

/// Register a task. See [`Scheduler::create_task`]; `arg` arrives as the
/// entry function's parameter on first dispatch.
pub fn create_task(entry: TaskEntry, arg: usize, config: TaskConfig) -> Result<TaskId, KernelError> {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).create_task(entry, arg, config) })
}

/// Create a mutex.
pub fn mutex_create() -> Result<usize, KernelError> {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).mutex_create() })
}

/// Create a bounded queue of `capacity` messages of `item_len` bytes.
pub fn queue_create(item_len: usize, capacity: usize) -> Result<usize, KernelError> {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).queue_create(item_len, capacity) })
}

/// Start multitasking. **Does not return.**
///
/// Creates the idle task (priority 0, always ready), configures the
/// SysTick timer and exception priorities, and launches the
/// highest-priority task created so far.
///
/// # Panics
/// If the idle task cannot be created — a configuration with no room
/// for the idle task cannot run at all.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    create_task(
        idle_task,
        0,
        TaskConfig {
            priority: 0,
            stack_size: IDLE_STACK_SIZE,
            time_slice: 0,
        },
    )
    .expect("no room for the idle task");

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_exception_priorities();

    crate::info!("kernel starting");

    let first_sp = sync::critical_section(|_cs| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let first = scheduler.schedule().expect("idle task is always ready");
        scheduler.tasks[first].stack_pointer as *const u32
    });

    unsafe { cortex_m4::start_first_task(first_sp) }
}

/// The fallback task: sleeps until the next interrupt, forever. Priority
/// 0 keeps it off the CPU whenever anything else is runnable.
extern "C" fn idle_task(_arg: usize) -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Task-facing API
// ---------------------------------------------------------------------------

/// Give up the rest of the current time slice.
pub fn yield_task() {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).yield_current() });
    cortex_m4::trigger_pendsv();
}

/// Block the calling task for at least `ticks` ticks.
pub fn delay(ticks: u32) {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).delay_current(ticks) });
    cortex_m4::trigger_pendsv();
}

/// Current kernel time.
pub fn current_tick() -> Tick {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).tick_count })
}

/// Acquire a mutex, waiting up to `timeout`.
pub fn mutex_take(mid: usize, timeout: Timeout) -> Result<(), KernelError> {
    let status = sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).mutex_take(mid, timeout) });
    match status {
        TakeStatus::Acquired => Ok(()),
        TakeStatus::Unavailable => Err(KernelError::TimedOut),
        TakeStatus::Blocked => {
            cortex_m4::trigger_pendsv();
            // Running again: the give granted us the mutex, or the wait
            // deadline passed.
            match current_wait_result() {
                WaitResult::Granted => Ok(()),
                WaitResult::TimedOut => Err(KernelError::TimedOut),
            }
        }
    }
}

/// Release a mutex held by the calling task.
pub fn mutex_give(mid: usize) -> Result<(), KernelError> {
    let result = sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).mutex_give(mid) });
    reschedule_if_needed();
    result
}

/// Send `msg` into a queue, waiting up to `timeout` for space.
pub fn queue_send(qid: usize, msg: &[u8], timeout: Timeout) -> Result<(), KernelError> {
    let status =
        sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).queue_send(qid, msg, timeout) });
    match status {
        SendStatus::Sent => {
            reschedule_if_needed();
            Ok(())
        }
        SendStatus::Full => Err(KernelError::Full),
        SendStatus::Blocked => {
            cortex_m4::trigger_pendsv();
            match current_wait_result() {
                WaitResult::Granted => Ok(()),
                WaitResult::TimedOut => Err(KernelError::TimedOut),
            }
        }
    }
}

/// Receive a message into `out`, waiting up to `timeout`. Returns the
/// message length.
pub fn queue_receive(qid: usize, out: &mut [u8], timeout: Timeout) -> Result<usize, KernelError> {
    let status =
        sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).queue_recv(qid, out, timeout) });
    match status {
        RecvStatus::Received(len) => {
            reschedule_if_needed();
            Ok(len)
        }
        RecvStatus::Empty => Err(KernelError::Empty),
        RecvStatus::Blocked => {
            cortex_m4::trigger_pendsv();
            match current_wait_result() {
                WaitResult::Granted => Ok(sync::critical_section(|_cs| unsafe {
                    let scheduler = &*SCHEDULER_PTR;
                    scheduler.delivered_message(scheduler.current_task, out)
                })),
                WaitResult::TimedOut => Err(KernelError::TimedOut),
            }
        }
    }
}

fn current_wait_result() -> WaitResult {
    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).current_wait_result() })
}

/// Pend a context switch if the last operation woke someone who should
/// run before us.
fn reschedule_if_needed() {
    let needed = sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).needs_reschedule });
    if needed {
        cortex_m4::trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// Hooks for the arch port
// ---------------------------------------------------------------------------

/// Tick entry point, called from the SysTick handler.
///
/// # Safety
/// ISR context only, after `init()`.
pub(crate) unsafe fn on_tick() {
    let scheduler = &mut *SCHEDULER_PTR;
    scheduler.tick();
    if scheduler.needs_reschedule {
        cortex_m4::trigger_pendsv();
    }
}

/// Store the preempted task's stack pointer, halting on overflow.
///
/// # Safety
/// Called from PendSV with the task's PSP.
pub(crate) unsafe fn save_task_context(psp: *mut u32) {
    let scheduler = &mut *SCHEDULER_PTR;
    let current = scheduler.current_task;
    if current < scheduler.task_count {
        let base = scheduler.arena.mem.as_ptr() as usize;
        let offset = (psp as usize).wrapping_sub(base);
        if !scheduler.stack_in_bounds(current, offset) {
            panic!("stack overflow in task {}", current);
        }
        scheduler.assert_stack_integrity(current);
        scheduler.tasks[current].stack_pointer = psp;
    }
}

/// Pick the next task and hand back its stack pointer.
///
/// # Safety
/// Called from PendSV.
pub(crate) unsafe fn switch_task_context() -> *mut u32 {
    let scheduler = &mut *SCHEDULER_PTR;
    match scheduler.schedule() {
        Some(next) => scheduler.tasks[next].stack_pointer,
        // Unreachable once start() ran: the idle task never blocks.
        None => scheduler.tasks[scheduler.current_task].stack_pointer,
    }
}
