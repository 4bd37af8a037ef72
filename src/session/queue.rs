//! Receive queue for dump responses
//!
//! Filled by the MIDI input callback on the transport thread, drained by
//! the dump request loop. Pushing never blocks.

use crossbeam::queue::ArrayQueue;
use tracing::warn;

use crate::sysex::SysexMessage;

/// Bounded FIFO of received dump messages
#[derive(Debug)]
pub struct DumpQueue {
    inner: ArrayQueue<SysexMessage>,
}

impl DumpQueue {
    /// Messages held before new arrivals are dropped
    pub const CAPACITY: usize = 16;

    pub fn new() -> Self {
        Self {
            inner: ArrayQueue::new(Self::CAPACITY),
        }
    }

    /// Append a message. Returns `false` (and drops it) when the queue is full.
    pub fn push(&self, msg: SysexMessage) -> bool {
        match self.inner.push(msg) {
            Ok(()) => true,
            Err(msg) => {
                warn!("Receive queue full, dropping SysEx message of {} bytes", msg.len());
                false
            }
        }
    }

    /// Take the oldest message.
    pub fn pop(&self) -> Option<SysexMessage> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for DumpQueue {
    fn default() -> Self {
        Self::new()
    }
}
