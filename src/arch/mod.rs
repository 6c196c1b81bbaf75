//! # Architecture Port Layer
//!
//! Hardware-specific code: context switching, the tick timer, and the
//! initial stack frame layout. One port exists today (Cortex-M4);
//! sibling modules would carry others.

pub mod cortex_m4;
