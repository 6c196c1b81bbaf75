//! # Demo Application Logic
//!
//! The kernel's intended usage pattern, distilled from the dual-channel
//! blinker: a sampler task reads two analog inputs and derives two blink
//! half-periods; two actuator tasks blink their LEDs at those periods;
//! a logger task reports every published change over a slow text sink.
//!
//! Shared state flows two ways:
//! - the latest half-periods live in a [`SharedDelays`] cell guarded by
//!   a kernel mutex (sampler writes, actuators read);
//! - every accepted change is also snapshotted into the log queue, which
//!   decouples the fast sampler from the slow logger.
//!
//! The decision logic is plain data-in/data-out so the firmware task
//! bodies and the host test harness drive the exact same code.

use core::fmt::Write;

use crate::config::{ADC_MAX, CHANGE_THRESHOLD_MS, DELAY_MAX_MS, DELAY_MIN_MS};
use crate::io::LineBuf;

/// The two sampled channels and their LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red = 0,
    Yellow = 1,
}

impl Channel {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Channel {
        if idx == 0 {
            Channel::Red
        } else {
            Channel::Yellow
        }
    }
}

/// Blink half-periods shared between the sampler and the actuators.
/// `None` means "not sampled yet": actuators skip toggling rather than
/// blink at a garbage rate. Reads and writes happen only while holding
/// the mutex paired with this cell.
#[derive(Debug, Clone, Copy)]
pub struct SharedDelays {
    ms: [Option<u16>; 2],
}

impl SharedDelays {
    pub const fn new() -> Self {
        Self { ms: [None, None] }
    }

    pub fn get(&self, channel: Channel) -> Option<u16> {
        self.ms[channel.index()]
    }

    pub fn set_all(&mut self, snapshot: DelaySnapshot) {
        self.ms = [Some(snapshot.red_ms), Some(snapshot.yellow_ms)];
    }
}

/// One published sampler observation, as carried through the log queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySnapshot {
    pub red_ms: u16,
    pub yellow_ms: u16,
}

impl DelaySnapshot {
    /// Bytes of the wire form.
    pub const WIRE_LEN: usize = 4;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let r = self.red_ms.to_le_bytes();
        let y = self.yellow_ms.to_le_bytes();
        [r[0], r[1], y[0], y[1]]
    }

    pub fn from_bytes(bytes: &[u8]) -> DelaySnapshot {
        DelaySnapshot {
            red_ms: u16::from_le_bytes([bytes[0], bytes[1]]),
            yellow_ms: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Map a raw ADC reading onto the blink half-period range.
pub fn scale_sample(raw: u16) -> u16 {
    let raw = raw.min(ADC_MAX) as u32;
    let span = (DELAY_MAX_MS - DELAY_MIN_MS) as u32;
    DELAY_MIN_MS + (raw * span / ADC_MAX as u32) as u16
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Change-gating state of the sampler task.
///
/// A cycle publishes only when a channel moved by more than
/// [`CHANGE_THRESHOLD_MS`] since the last published values. The first
/// cycle always publishes — there is no previous sample to sit inside
/// the threshold of.
pub struct Sampler {
    last: Option<DelaySnapshot>,
}

impl Sampler {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Evaluate one sampling cycle. Returns the snapshot to publish, or
    /// `None` when both channels sit within the threshold.
    pub fn evaluate(&mut self, red_raw: u16, yellow_raw: u16) -> Option<DelaySnapshot> {
        let snapshot = DelaySnapshot {
            red_ms: scale_sample(red_raw),
            yellow_ms: scale_sample(yellow_raw),
        };
        let publish = match self.last {
            None => true,
            Some(prev) => {
                prev.red_ms.abs_diff(snapshot.red_ms) > CHANGE_THRESHOLD_MS
                    || prev.yellow_ms.abs_diff(snapshot.yellow_ms) > CHANGE_THRESHOLD_MS
            }
        };
        if publish {
            self.last = Some(snapshot);
            Some(snapshot)
        } else {
            None
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Logger formatting
// ---------------------------------------------------------------------------

/// Render a snapshot the way the serial log shows it.
pub fn format_snapshot(snapshot: &DelaySnapshot, buf: &mut LineBuf) {
    buf.clear();
    let _ = write!(
        buf,
        "red: {} ms, yellow: {} ms",
        snapshot.red_ms, snapshot.yellow_ms
    );
}
