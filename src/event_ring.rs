//! # Event Ring Buffer
//!
//! SPSC byte ring used to marshal typed [`crate::event::Event`] records
//! from the render callback (and the decoder worker) to the cooperative
//! event processor. A write is all-or-nothing per logical record; a read
//! drains a full record's header and payload in one call.

use std::sync::atomic::Ordering;

use crate::cache_padded::CachePadded;
use crate::event::{Event, MAX_ENCODED_LEN, TAG_LEN};

/// Lock-free SPSC ring of event-record bytes.
pub struct EventRingBuffer {
    buffer: Box<[u8]>,
    capacity: usize,
    mask: usize,
    write_pos: CachePadded,
    read_pos: CachePadded,
}

impl EventRingBuffer {
    /// Creates a ring with at least `min_capacity_bytes` capacity
    /// (rounded up to the next power of two, minimum 256 per the
    /// configuration default).
    pub fn new(min_capacity_bytes: usize) -> Self {
        let capacity = min_capacity_bytes.max(256).next_power_of_two();
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            mask: capacity - 1,
            write_pos: CachePadded::new(0),
            read_pos: CachePadded::new(0),
        }
    }

    fn bytes_writable(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Relaxed);
        let read = self.read_pos.0.load(Ordering::Acquire);
        self.capacity - write.wrapping_sub(read)
    }

    fn bytes_readable(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Acquire);
        let read = self.read_pos.0.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    /// Encodes and writes `event` as a single logical record. Returns
    /// `false` (silently dropping the event) only if the consumer is
    /// permanently behind and the ring has no room — expected never to
    /// happen in practice; a caller that observes this should treat it as
    /// a bug, per the ring's contract.
    pub fn write_event(&self, event: &Event) -> bool {
        let mut encoded = [0u8; MAX_ENCODED_LEN];
        let len = event.encode(&mut encoded);
        self.write_bytes(&encoded[..len])
    }

    fn write_bytes(&self, record: &[u8]) -> bool {
        if record.len() > self.bytes_writable() {
            return false;
        }
        let write = self.write_pos.0.load(Ordering::Relaxed);
        for (i, byte) in record.iter().enumerate() {
            let idx = (write.wrapping_add(i)) & self.mask;
            // SAFETY: single writer; idx always in bounds; the consumer
            // cannot observe this byte until the Release store below.
            unsafe {
                let ptr = self.buffer.as_ptr() as *mut u8;
                ptr.add(idx).write(*byte);
            }
        }
        self.write_pos
            .0
            .store(write.wrapping_add(record.len()), Ordering::Release);
        true
    }

    fn peek(&self, len: usize, out: &mut [u8]) {
        let read = self.read_pos.0.load(Ordering::Relaxed);
        for i in 0..len {
            let idx = (read.wrapping_add(i)) & self.mask;
            out[i] = self.buffer[idx];
        }
    }

    /// Reads and decodes the next complete event record, advancing the
    /// read cursor past it. Returns `None` if fewer than
    /// [`crate::event::TAG_LEN`] bytes are available.
    pub fn read_event(&self) -> Option<Event> {
        if self.bytes_readable() < TAG_LEN {
            return None;
        }
        let mut scratch = [0u8; MAX_ENCODED_LEN];
        let available = self.bytes_readable().min(MAX_ENCODED_LEN);
        self.peek(available, &mut scratch);
        let (event, consumed) = Event::decode(&scratch[..available])?;
        let read = self.read_pos.0.load(Ordering::Relaxed);
        self.read_pos
            .0
            .store(read.wrapping_add(consumed), Ordering::Release);
        Some(event)
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.bytes_readable()
    }

    /// Returns `true` if no complete record is queued.
    pub fn is_empty(&self) -> bool {
        self.bytes_readable() < TAG_LEN
    }

    /// Ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
