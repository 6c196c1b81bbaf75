//! # Collaborator Interfaces
//!
//! The narrow seams between the kernel's application tasks and the
//! hardware they drive. The kernel treats all three as opaque, bounded,
//! non-blocking calls: the board support crate implements them with
//! register-level drivers, tests implement them with mocks.

use core::fmt;

/// A sampled input channel (e.g. one ADC channel wired to a
/// potentiometer). Reads are bounded-latency and never block the kernel.
pub trait AnalogSource {
    /// Current raw reading, full scale `0..=ADC_MAX`.
    fn sample(&mut self) -> u16;
}

/// A discrete output (e.g. an LED pin).
pub trait DigitalOut {
    /// Invert the current output level.
    fn toggle(&mut self);
}

/// Destination for the logger's formatted lines. Writes may be slow —
/// which is exactly why a queue sits between sampling and logging — but
/// must not block the kernel tick.
pub trait LogSink {
    fn write_line(&mut self, line: &str);
}

/// Capacity of a [`LineBuf`], sized for the longest logger line.
pub const LINE_BUF_SIZE: usize = 64;

/// Fixed-capacity text buffer implementing [`core::fmt::Write`].
/// Formatting past the end reports `fmt::Error` and keeps the prefix.
pub struct LineBuf {
    buf: [u8; LINE_BUF_SIZE],
    len: usize,
}

impl LineBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; LINE_BUF_SIZE],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        // Only &str bytes are ever appended, so the prefix stays UTF-8.
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_BUF_SIZE - self.len;
        if s.len() > room {
            let mut take = room;
            while take > 0 && !s.is_char_boundary(take) {
                take -= 1;
            }
            self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
            self.len += take;
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + s.len()].copy_from_slice(s.as_bytes());
        self.len += s.len();
        Ok(())
    }
}
