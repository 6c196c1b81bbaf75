//! # Cortex-M4 Port
//!
//! Context switching over PendSV, the SysTick scheduler heartbeat, and
//! initial stack frames, for the ARM Cortex-M4 (Thumb-2) split-stack
//! model:
//!
//! - **MSP**: kernel and exception handlers
//! - **PSP**: tasks in Thread mode
//!
//! Exception entry hardware-stacks R0–R3, R12, LR, PC, xPSR onto the
//! process stack; the PendSV handler saves and restores R4–R11 around
//! that, completing the context. Both PendSV and SysTick run at the
//! lowest exception priority so a context switch never preempts another
//! handler.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::task::TaskEntry;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Run SysTick off the core clock at [`TICK_HZ`].
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Exception plumbing
// ---------------------------------------------------------------------------

/// Pend a context switch. PendSV fires once no other handler is active.
#[inline]
pub fn trigger_pendsv() {
    // ICSR, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

/// Drop PendSV and SysTick to the lowest exception priority so context
/// switches never interleave with application interrupt handlers.
pub fn set_exception_priorities() {
    unsafe {
        // SHPR3: [23:16] = PendSV, [31:24] = SysTick
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3) | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Initial stack frames
// ---------------------------------------------------------------------------

/// Seed a task's stack with the frame a PendSV return expects, so the
/// first dispatch "returns" into `entry(arg)`.
///
/// Layout, top of stack down (all offsets in words):
///
/// ```text
/// [Hardware-stacked frame]
///   xPSR  (Thumb bit set)
///   PC    (entry)
///   LR    (task_exit — bodies are `-> !`, this is belt over braces)
///   R12, R3, R2, R1
///   R0    (arg)
/// [Software-saved context]
///   R11 … R4                 <- returned stack-pointer offset
/// ```
pub fn seed_stack_frame(arena: &mut [u8], top: usize, entry: TaskEntry, arg: usize) -> usize {
    // AAPCS wants 8-byte alignment at the frame boundary
    let aligned_top = top & !0x07;
    let frame = aligned_top - 16 * 4;

    let mut word = |index: usize, value: u32| {
        let at = frame + index * 4;
        arena[at..at + 4].copy_from_slice(&value.to_le_bytes());
    };

    for reg in 0..8 {
        word(reg, 0); // R4–R11
    }
    word(8, arg as u32); // R0 — the task argument
    word(9, 0); // R1
    word(10, 0); // R2
    word(11, 0); // R3
    word(12, 0); // R12
    word(13, task_exit as usize as u32); // LR
    word(14, entry as usize as u32); // PC
    word(15, 0x0100_0000); // xPSR — Thumb bit

    frame
}

/// Landing pad for a task body that returns anyway.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode onto the PSP and branch into the first task.
/// Called once from `kernel::start`; never returns.
///
/// # Safety
/// `psp` must point at a frame produced by [`seed_stack_frame`].
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Skip the software-saved R4-R11 (8 words)
        "adds r0, #32",
        "msr psp, r0",
        // Thread mode on PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",
        // Unwind the hardware frame by hand: this is a branch, not a
        // real exception return
        "pop {{r0-r3, r12}}",
        "pop {{r4}}", // LR slot (task bodies never return)
        "pop {{r5}}", // PC = task entry
        "pop {{r6}}", // xPSR slot
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// PendSV — the context switch itself.
///
/// 1. Save R4–R11 below the hardware frame on the outgoing task's PSP
/// 2. Store the PSP into its TCB (with the stack-overflow check)
/// 3. Ask the scheduler for the next task
/// 4. Restore R4–R11 from the incoming task's stack and return through
///    EXC_RETURN, letting the hardware unstack the rest
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        save = sym pendsv_save,
        switch = sym pendsv_switch,
    );
}

unsafe extern "C" fn pendsv_save(psp: *mut u32) {
    crate::kernel::save_task_context(psp);
}

unsafe extern "C" fn pendsv_switch() -> *mut u32 {
    crate::kernel::switch_task_context()
}

/// SysTick — the scheduler heartbeat, at [`TICK_HZ`].
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::on_tick();
}
