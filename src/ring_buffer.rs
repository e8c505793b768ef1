//! # Audio Ring Buffer
//!
//! Single-producer/single-consumer lock-free ring of planar (non-
//! interleaved) PCM frames in a fixed rendering format. The decoder
//! worker is the sole writer; the render callback is the sole reader.
//! Wait-free for both sides: no mutex, no allocation after construction,
//! no blocking of any kind — required because the render callback must
//! never block.

use std::sync::atomic::Ordering;

use crate::cache_padded::CachePadded;

struct Channel {
    buffer: Box<[f32]>,
}

/// Fixed-capacity planar PCM SPSC ring buffer.
///
/// Capacity is rounded up to a power of two in frames so the read/write
/// cursors can wrap with a bitmask instead of a division.
pub struct AudioRingBuffer {
    channels: Vec<Channel>,
    capacity: usize,
    mask: usize,
    write_pos: CachePadded,
    read_pos: CachePadded,
}

impl AudioRingBuffer {
    /// Creates a ring with `channel_count` planes, each holding at least
    /// `min_capacity_frames` frames (rounded up to the next power of two).
    pub fn new(channel_count: usize, min_capacity_frames: usize) -> Self {
        let capacity = min_capacity_frames.max(1).next_power_of_two();
        let channels = (0..channel_count)
            .map(|_| Channel {
                buffer: vec![0.0f32; capacity].into_boxed_slice(),
            })
            .collect();
        Self {
            channels,
            capacity,
            mask: capacity - 1,
            write_pos: CachePadded::new(0),
            read_pos: CachePadded::new(0),
        }
    }

    /// Number of planes (channels).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Ring capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Coherent snapshot of the number of frames available to write.
    pub fn frames_writable(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Relaxed);
        let read = self.read_pos.0.load(Ordering::Acquire);
        self.capacity - write.wrapping_sub(read)
    }

    /// Coherent snapshot of the number of frames available to read.
    pub fn frames_readable(&self) -> usize {
        let write = self.write_pos.0.load(Ordering::Acquire);
        let read = self.read_pos.0.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    /// Writes up to `frames` frames from `source_planes` (one slice per
    /// channel, each at least `frames` long). Returns the number of
    /// frames actually written; `0` if the ring is full. A partial write
    /// never corrupts the indices — the caller observes the returned
    /// count and may retry with the remainder on its next chunk.
    pub fn write(&self, source_planes: &[&[f32]], frames: usize) -> usize {
        debug_assert_eq!(source_planes.len(), self.channels.len());
        let to_write = frames.min(self.frames_writable());
        if to_write == 0 {
            return 0;
        }
        let write = self.write_pos.0.load(Ordering::Relaxed);
        for (channel, source) in self.channels.iter().zip(source_planes.iter()) {
            for i in 0..to_write {
                let idx = (write.wrapping_add(i)) & self.mask;
                // SAFETY: single writer (the decoder worker); idx is
                // always in bounds; the consumer cannot observe this slot
                // until the Release store below advances write_pos.
                unsafe {
                    let ptr = channel.buffer.as_ptr() as *mut f32;
                    ptr.add(idx).write(source[i]);
                }
            }
        }
        self.write_pos
            .0
            .store(write.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Reads up to `frames` frames into `dest_planes`. Returns the number
    /// of frames actually read; `0` if the ring is empty.
    pub fn read(&self, dest_planes: &mut [&mut [f32]], frames: usize) -> usize {
        debug_assert_eq!(dest_planes.len(), self.channels.len());
        let to_read = frames.min(self.frames_readable());
        if to_read == 0 {
            return 0;
        }
        let read = self.read_pos.0.load(Ordering::Relaxed);
        for (channel, dest) in self.channels.iter().zip(dest_planes.iter_mut()) {
            for i in 0..to_read {
                let idx = (read.wrapping_add(i)) & self.mask;
                dest[i] = channel.buffer[idx];
            }
        }
        self.read_pos
            .0
            .store(read.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Zeroes the read/write indices. Only safe to call while the output
    /// is muted — the caller guarantees nothing concurrently observes a
    /// non-monotonic jump in `frames_readable`.
    pub fn reset(&self) {
        self.write_pos.0.store(0, Ordering::Relaxed);
        self.read_pos.0.store(0, Ordering::Release);
    }

    /// Returns `true` if no frames are available to read.
    pub fn is_empty(&self) -> bool {
        self.frames_readable() == 0
    }

    /// Returns `true` if no frames are available to write.
    pub fn is_full(&self) -> bool {
        self.frames_writable() == 0
    }
}
