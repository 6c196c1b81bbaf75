//! # Kernel Critical Sections
//!
//! The scheduler's tables are shared between task-level code and the
//! SysTick/PendSV handlers. Nothing locks them — instead, every
//! task-level kernel operation runs with interrupts disabled, making
//! table manipulation atomic with respect to the tick. Handlers already
//! execute serialized by exception priority.
//!
//! Sections must stay short: a long section delays the tick, and the
//! tick is the unit every timeout in the system is measured in.

use cortex_m::interrupt;

/// Run `f` with interrupts disabled, restoring them afterwards.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
