//! # Shared Engine State
//!
//! The state every component — the render callback, the decoder worker,
//! the event processor, and the collector — reaches through a shared
//! `Arc`. Nothing here is owned exclusively by any one of them; each
//! field's concurrency story is documented where it is declared.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::decoder_state::DecoderFlags;
use crate::error_table::ErrorTable;
use crate::event_ring::EventRingBuffer;
use crate::format::RenderingFormat;
use crate::queue::DecoderQueue;
use crate::ring_buffer::AudioRingBuffer;
use crate::slot_table::SlotTable;

/// Atomic bitset of player-wide playback flags, read by the render
/// callback and written from both the render callback (the mute
/// handshake) and the façade (play/pause/stop).
pub struct PlaybackFlags(AtomicU8);

impl PlaybackFlags {
    pub const IS_PLAYING: u8 = 1 << 0;
    pub const MUTE_REQUESTED: u8 = 1 << 1;
    pub const OUTPUT_MUTED: u8 = 1 << 2;

    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn contains(&self, mask: u8) -> bool {
        self.0.load(Ordering::Acquire) & mask == mask
    }

    pub fn set(&self, mask: u8) {
        self.0.fetch_or(mask, Ordering::AcqRel);
    }

    pub fn clear(&self, mask: u8) {
        self.0.fetch_and(!mask, Ordering::AcqRel);
    }

    /// Flips `mask` according to `value`.
    pub fn set_to(&self, mask: u8, value: bool) {
        if value {
            self.set(mask);
        } else {
            self.clear(mask);
        }
    }

    /// XORs `mask` into the flag set, returning the new state.
    pub fn toggle(&self, mask: u8) -> bool {
        let previous = self.0.fetch_xor(mask, Ordering::AcqRel);
        (previous ^ mask) & mask == mask
    }
}

/// Every piece of state shared between the player façade and its
/// cooperative/realtime components.
pub struct EngineShared {
    pub rendering_format: RenderingFormat,
    pub chunk_size_frames: usize,
    pub audio_ring: AudioRingBuffer,
    pub event_ring: EventRingBuffer,
    pub slot_table: SlotTable,
    pub decoder_queue: DecoderQueue,
    pub error_table: ErrorTable,
    pub playback_flags: PlaybackFlags,
    sequence_counter: AtomicU64,
    /// Set by the worker when a cancellation requires the render side to
    /// drop stale ring contents without an accompanying seek. Cleared by
    /// the worker once it has performed the mute/reset sequence.
    pub ring_reset_requested: AtomicBool,
    /// Signalled by the façade (enqueue, cancel, seek, stop) and by the
    /// worker itself to wake the decoder worker from its timed wait. The
    /// render callback must NEVER touch this — `Notify::notify_one` takes
    /// its waiter-list mutex whenever a task is parked in `notified()`,
    /// which the worker usually is, so that would be a lock acquisition on
    /// the realtime path. The render callback instead sets
    /// `worker_wake_requested` below, a plain atomic store.
    pub worker_notify: Notify,
    /// Lock-free wake hint for the worker, set by the render callback
    /// (new writable space, or a mute-handshake acknowledgement) and
    /// consumed (swapped back to `false`) by the worker's timed wait so it
    /// can skip the rest of its 100ms timeout without the render callback
    /// ever calling into `Notify`.
    pub worker_wake_requested: AtomicBool,
    /// Signalled by the worker whenever a state becomes `MarkedForRemoval`,
    /// so the collector need not poll on a fixed schedule alone. Like
    /// `worker_notify`, never touched from the render callback.
    pub collector_notify: Notify,
    /// Lock-free wake hint for the collector, set by the render callback
    /// when it marks a decoder `RenderingComplete` (and thus
    /// `MarkedForRemoval`). Consumed the same way as
    /// `worker_wake_requested`.
    pub collector_wake_requested: AtomicBool,
    /// Signalled by the decoder worker whenever it posts a record to the
    /// event ring, so the event processor need not rely on sharing
    /// `worker_notify` with the worker's own wait (where one `notify_one`
    /// wakes only one of the two parked tasks).
    pub event_notify: Notify,
    /// Lock-free wake hint for the event processor, set by the render
    /// callback when it posts a `Rendering*`/`EndOfAudio` record. Consumed
    /// the same way as `worker_wake_requested`.
    pub event_wake_requested: AtomicBool,
}

impl EngineShared {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rendering_format: config.rendering_format,
            chunk_size_frames: config.chunk_size_frames as usize,
            audio_ring: AudioRingBuffer::new(
                config.rendering_format.channel_count as usize,
                config.audio_ring_capacity_frames as usize,
            ),
            event_ring: EventRingBuffer::new(config.event_ring_capacity_bytes as usize),
            slot_table: SlotTable::new(config.slot_table_size as usize),
            decoder_queue: DecoderQueue::new(),
            error_table: ErrorTable::new(),
            playback_flags: PlaybackFlags::new(),
            sequence_counter: AtomicU64::new(0),
            ring_reset_requested: AtomicBool::new(false),
            worker_notify: Notify::new(),
            worker_wake_requested: AtomicBool::new(false),
            collector_notify: Notify::new(),
            collector_wake_requested: AtomicBool::new(false),
            event_notify: Notify::new(),
            event_wake_requested: AtomicBool::new(false),
        }
    }

    /// Allocates the next monotonically increasing sequence number.
    pub fn next_sequence_number(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Sets `CancelRequested` on the smallest-sequence active decoder, if
    /// one exists, and wakes the worker. Returns `true` if a decoder was
    /// found.
    pub fn cancel_active(&self) -> bool {
        let scan = self.slot_table.scan();
        if let Some(state) = scan.active_smallest_sequence() {
            state.flags.set(DecoderFlags::CANCEL_REQUESTED);
            drop(scan);
            self.worker_notify.notify_one();
            true
        } else {
            false
        }
    }
}
