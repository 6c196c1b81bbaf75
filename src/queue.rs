//! # Bounded Message Queue
//!
//! Fixed-capacity ring buffer of fixed-size messages, copied in and out
//! by value. The queue is the hand-off point between a fast producer and
//! a slow consumer: senders block (or fail the poll) when it is full,
//! receivers block when it is empty, and messages come out in exactly
//! the order their sends completed.
//!
//! Application code never touches the ring directly — everything goes
//! through `send`/`receive`, which is what makes the buffer safe under
//! concurrent producers and consumers.
//!
//! A blocked peer is served by direct hand-off: a send that finds a
//! waiting receiver copies straight into that receiver's staging buffer,
//! and a receive that frees a slot pulls the best blocked sender's
//! staged message into the ring before returning. Woken tasks therefore
//! never race to re-try the operation.

use crate::config::{QUEUE_MSG_SIZE, QUEUE_SLOTS};
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::task::{PendOn, TaskId, WaitResult};
use crate::time::Timeout;

/// Queue control block: the ring storage plus its indices. Wait-set
/// membership lives in the TCBs (`PendOn::QueueSend` / `QueueRecv`).
pub struct QueueControlBlock {
    /// Message slots. Only the first `item_len` bytes of each are used.
    pub slots: [[u8; QUEUE_MSG_SIZE]; QUEUE_SLOTS],
    /// Index of the oldest message.
    pub head: usize,
    /// Index of the next free slot.
    pub tail: usize,
    /// Messages currently buffered. Always `0 ..= capacity`.
    pub count: usize,
    /// Usable slots, fixed at creation. Never resized.
    pub capacity: usize,
    /// Bytes per message, fixed at creation.
    pub item_len: usize,
    /// Whether this slot has been handed out by `queue_create`.
    pub active: bool,
}

impl QueueControlBlock {
    pub const EMPTY: Self = Self {
        slots: [[0u8; QUEUE_MSG_SIZE]; QUEUE_SLOTS],
        head: 0,
        tail: 0,
        count: 0,
        capacity: 0,
        item_len: 0,
        active: false,
    };
}

/// Immediate outcome of a `send` at the kernel-core level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Message buffered or handed directly to a waiting receiver.
    Sent,
    /// Queue full and the caller chose not to wait. Nothing was dropped
    /// silently — the caller decides what the loss means.
    Full,
    /// Queue full; the message is staged and the caller must be
    /// switched out until space frees up or the deadline passes.
    Blocked,
}

/// Immediate outcome of a `receive` at the kernel-core level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// A message of this many bytes was copied into the caller's buffer.
    Received(usize),
    /// Queue empty and the caller chose not to wait.
    Empty,
    /// Queue empty; the caller must be switched out. On a `Granted`
    /// wake the message is in the caller's staging buffer.
    Blocked,
}

impl Scheduler {
    /// Hand out a queue slot carrying `capacity` messages of `item_len`
    /// bytes each. Fails with [`KernelError::ResourceExhausted`] when
    /// the table is full or the requested shape exceeds the compiled-in
    /// slot size.
    pub fn queue_create(&mut self, item_len: usize, capacity: usize) -> Result<usize, KernelError> {
        if self.queue_count >= self.queues.len()
            || item_len == 0
            || item_len > QUEUE_MSG_SIZE
            || capacity == 0
            || capacity > QUEUE_SLOTS
        {
            return Err(KernelError::ResourceExhausted);
        }
        let qid = self.queue_count;
        self.queues[qid] = QueueControlBlock {
            item_len,
            capacity,
            active: true,
            ..QueueControlBlock::EMPTY
        };
        self.queue_count += 1;
        Ok(qid)
    }

    /// Send a message from the current task.
    pub fn queue_send(&mut self, qid: usize, msg: &[u8], timeout: Timeout) -> SendStatus {
        debug_assert!(self.queues[qid].active);
        debug_assert!(msg.len() <= self.queues[qid].item_len);

        // A waiting receiver means the ring is empty: hand off directly.
        if let Some(rx) = self.first_waiter(PendOn::QueueRecv(qid)) {
            debug_assert_eq!(self.queues[qid].count, 0);
            let len = msg.len();
            self.tasks[rx].msg[..len].copy_from_slice(msg);
            self.tasks[rx].msg_len = len;
            self.wake(rx, WaitResult::Granted);
            return SendStatus::Sent;
        }

        if self.queues[qid].count < self.queues[qid].capacity {
            self.push_slot(qid, msg);
            return SendStatus::Sent;
        }

        if timeout.is_poll() {
            return SendStatus::Full;
        }

        // Stage the outgoing message so a receiver can complete the send
        // while this task sleeps.
        let cur = self.current_task;
        let len = msg.len();
        self.tasks[cur].msg[..len].copy_from_slice(msg);
        self.tasks[cur].msg_len = len;
        let deadline = timeout.deadline_after(self.tick_count);
        self.block_current(PendOn::QueueSend(qid), deadline);
        SendStatus::Blocked
    }

    /// Receive a message into `out` for the current task.
    pub fn queue_recv(&mut self, qid: usize, out: &mut [u8], timeout: Timeout) -> RecvStatus {
        debug_assert!(self.queues[qid].active);
        debug_assert!(out.len() >= self.queues[qid].item_len);

        if self.queues[qid].count > 0 {
            let len = self.pop_slot(qid, out);

            // The freed slot completes at most one blocked send.
            if let Some(tx) = self.first_waiter(PendOn::QueueSend(qid)) {
                debug_assert_eq!(self.queues[qid].count, self.queues[qid].capacity - 1);
                let mut staged = [0u8; QUEUE_MSG_SIZE];
                let staged_len = self.tasks[tx].msg_len;
                staged[..staged_len].copy_from_slice(&self.tasks[tx].msg[..staged_len]);
                self.push_slot(qid, &staged[..staged_len]);
                self.wake(tx, WaitResult::Granted);
            }
            return RecvStatus::Received(len);
        }

        if timeout.is_poll() {
            return RecvStatus::Empty;
        }

        let deadline = timeout.deadline_after(self.tick_count);
        self.block_current(PendOn::QueueRecv(qid), deadline);
        RecvStatus::Blocked
    }

    /// Copy the message delivered to a woken receiver out of its staging
    /// buffer. Valid after a `Granted` wake from `queue_recv`.
    pub fn delivered_message(&self, tid: TaskId, out: &mut [u8]) -> usize {
        let len = self.tasks[tid].msg_len;
        out[..len].copy_from_slice(&self.tasks[tid].msg[..len]);
        len
    }

    fn push_slot(&mut self, qid: usize, msg: &[u8]) {
        let q = &mut self.queues[qid];
        let tail = q.tail;
        q.slots[tail][..msg.len()].copy_from_slice(msg);
        q.tail = (tail + 1) % q.capacity;
        q.count += 1;
    }

    fn pop_slot(&mut self, qid: usize, out: &mut [u8]) -> usize {
        let q = &mut self.queues[qid];
        let head = q.head;
        let len = q.item_len;
        out[..len].copy_from_slice(&q.slots[head][..len]);
        q.head = (head + 1) % q.capacity;
        q.count -= 1;
        len
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
