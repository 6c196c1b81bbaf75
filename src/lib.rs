//! # Kestrel — a compact priority-preemptive RTOS kernel
//!
//! Kestrel is a small real-time kernel for ARM Cortex-M4
//! microcontrollers: fixed-priority preemptive scheduling with
//! round-robin rotation among equals, a mutex with priority
//! inheritance, and bounded message queues that decouple fast producers
//! from slow consumers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Application Tasks (app.rs)               │
//! │        Sampler · Actuator ×2 · Logger · Idle              │
//! ├──────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                    │
//! │   init() · create_task() · start() · delay() · yield     │
//! │   mutex_take/give · queue_send/receive                    │
//! ├──────────────┬───────────────────┬───────────────────────┤
//! │  Scheduler   │  Sync Objects     │  Time                  │
//! │ scheduler.rs │  mutex.rs         │  time.rs               │
//! │ ─ tick()     │  ─ inheritance    │  ─ wrapping deadlines  │
//! │ ─ schedule() │  queue.rs         │  ─ timeouts            │
//! │ ─ delay()    │  ─ ring + handoff │                        │
//! ├──────────────┴───────────────────┴───────────────────────┤
//! │               Task Model (task.rs)                        │
//! │     TCB · TaskState · PendOn · stack arena regions        │
//! ├──────────────────────────────────────────────────────────┤
//! │          Arch Port (arch/cortex_m4.rs)                    │
//! │   PendSV · SysTick · stack frames · first launch          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! Single core, tick-driven, strictly priority-preemptive: the highest
//! priority Ready task always runs, equal priorities rotate in arrival
//! order. Tasks are infinite loops that block at well-defined points —
//! `delay`, `yield`, mutex `take`, queue `send`/`receive` — and are
//! preempted at tick boundaries. Kernel tables are only touched with
//! interrupts disabled (see `sync.rs`).
//!
//! ## Memory Model
//!
//! - No heap, no `alloc` — every table is a fixed array
//! - Task stacks carved from one static arena, canaried at the floor
//! - Stack overflow and table corruption halt the system; recoverable
//!   errors go back to the caller as [`error::KernelError`]
//!
//! ## Portability
//!
//! The kernel core is plain `core` code and is developed and tested on
//! the host. The Cortex-M4 port, the global kernel instance, and the
//! demo firmware only build for `thumbv7em-none-eabi*` targets.

#![no_std]

pub mod app;
pub mod cell;
pub mod config;
pub mod error;
pub mod io;
pub mod log;
pub mod mutex;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
