//! # Decoder State
//!
//! Per-decoded-item bookkeeping: the state the decoder worker creates
//! when it adopts a decoder, reads by the render callback through plain
//! atomic loads, and eventually retires through the collector.
//!
//! Invariants (see module tests and [`crate::slot_table`] for how the
//! table enforces the removal-visibility one):
//!   1. `0 <= frames_rendered <= frames_available <= frames_decoded`.
//!   2. `RenderingComplete` implies `frames_rendered == frames_available`
//!      and `DecodingComplete` is set.
//!   3. A state flagged `MarkedForRemoval` is never treated as active
//!      again.
//!   4. Exactly one worker task ever calls the decoder-mutating methods
//!      on a given state.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use tracing::warn;

use crate::decoder::Decoder;
use crate::error::Result;
use crate::format::PlanarBufferList;

/// Atomic bitset of [`DecoderState`] lifecycle flags.
pub struct DecoderFlags(AtomicU8);

impl DecoderFlags {
    pub const CANCEL_REQUESTED: u8 = 1 << 0;
    pub const DECODING_STARTED: u8 = 1 << 1;
    pub const DECODING_COMPLETE: u8 = 1 << 2;
    pub const RENDERING_STARTED: u8 = 1 << 3;
    pub const RENDERING_COMPLETE: u8 = 1 << 4;
    pub const MARKED_FOR_REMOVAL: u8 = 1 << 5;

    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(&self, mask: u8) -> bool {
        self.0.load(Ordering::Acquire) & mask == mask
    }

    /// Sets every bit in `mask`.
    pub fn set(&self, mask: u8) {
        self.0.fetch_or(mask, Ordering::AcqRel);
    }

    /// Clears every bit in `mask`.
    pub fn clear(&self, mask: u8) {
        self.0.fetch_and(!mask, Ordering::AcqRel);
    }

    /// Sets `mask` and reports whether this call was the one that flipped
    /// it from unset to set. Used to make event emission idempotent: the
    /// first caller to observe the transition emits the event, later
    /// callers in the same or later callbacks do not.
    pub fn set_if_absent(&self, mask: u8) -> bool {
        let previous = self.0.fetch_or(mask, Ordering::AcqRel);
        previous & mask == 0
    }
}

/// Per-decoded-item state. Created when the decoder worker adopts a
/// decoder; read lock-free by the render callback; destroyed only by the
/// collector.
pub struct DecoderState {
    /// Monotonically increasing, unique per player instance.
    pub sequence_number: u64,
    pub flags: DecoderFlags,
    pub frames_decoded: AtomicI64,
    pub frames_available: AtomicI64,
    pub frames_rendered: AtomicI64,
    pub frame_length: AtomicI64,
    /// Sentinel `-1` means "no seek pending".
    pub frame_to_seek: AtomicI64,
    // Decoder and its scratch buffer are touched only by the worker task
    // that owns this state (invariant 4); UnsafeCell gives that single
    // writer mutable access while the render callback and collector hold
    // only shared references to this struct.
    decoder: UnsafeCell<Box<dyn Decoder>>,
    scratch: UnsafeCell<Vec<Vec<f32>>>,
    chunk_size_frames: usize,
}

// SAFETY: `decoder` and `scratch` are mutated exclusively by the single
// worker task that owns this state for its whole lifetime (spec invariant
// 4). The render callback and collector only ever touch the plain atomic
// fields above, never `decoder`/`scratch`, so no two threads race on the
// `UnsafeCell` contents.
unsafe impl Sync for DecoderState {}

impl DecoderState {
    /// Adopts an already-open decoder, seeding counters from its current
    /// position (nonzero if the decoder reports one).
    pub fn new(
        sequence_number: u64,
        decoder: Box<dyn Decoder>,
        channel_count: usize,
        chunk_size_frames: usize,
    ) -> Self {
        let frame_length = decoder.frame_length();
        let initial_position = decoder.frame_position().max(0);
        let scratch = (0..channel_count)
            .map(|_| vec![0.0f32; chunk_size_frames])
            .collect();
        Self {
            sequence_number,
            flags: DecoderFlags::new(),
            frames_decoded: AtomicI64::new(initial_position),
            frames_available: AtomicI64::new(initial_position),
            frames_rendered: AtomicI64::new(initial_position),
            frame_length: AtomicI64::new(frame_length),
            frame_to_seek: AtomicI64::new(-1),
            decoder: UnsafeCell::new(decoder),
            scratch: UnsafeCell::new(scratch),
            chunk_size_frames,
        }
    }

    /// Decodes up to one chunk into the owned scratch buffer. Returns the
    /// number of frames decoded; `0` means end-of-stream, at which point
    /// `DecodingComplete` has been set. Advances `frames_decoded` only —
    /// `frames_available` is advanced by the caller once it has written
    /// the scratch buffer into the audio ring.
    pub(crate) fn decode_audio(&self) -> Result<usize> {
        // SAFETY: see the `unsafe impl Sync` note above.
        let decoder = unsafe { &mut *self.decoder.get() };
        let scratch = unsafe { &mut *self.scratch.get() };
        let planes: Vec<&mut [f32]> = scratch.iter_mut().map(|p| p.as_mut_slice()).collect();
        let mut buffer = PlanarBufferList::new(planes);
        let frames_written = decoder.decode_into(&mut buffer, self.chunk_size_frames)?;
        if frames_written == 0 {
            self.flags.set(DecoderFlags::DECODING_COMPLETE);
        } else {
            self.frames_decoded
                .fetch_add(frames_written as i64, Ordering::AcqRel);
        }
        Ok(frames_written)
    }

    /// Borrows the scratch buffer's first `frames` samples of each plane,
    /// for handing to [`crate::ring_buffer::AudioRingBuffer::write`].
    pub(crate) fn scratch_planes(&self, frames: usize) -> Vec<&[f32]> {
        // SAFETY: see the `unsafe impl Sync` note above.
        let scratch = unsafe { &*self.scratch.get() };
        scratch.iter().map(|p| &p[..frames]).collect()
    }

    pub(crate) fn add_frames_available(&self, frames: i64) {
        self.frames_available.fetch_add(frames, Ordering::AcqRel);
    }

    /// Refines `frame_length` from the total frame count actually decoded,
    /// called once `DecodingComplete` is observed for a decoder whose
    /// length was unknown (or merely approximate) up front.
    pub(crate) fn refine_frame_length_at_eos(&self) {
        let decoded = self.frames_decoded.load(Ordering::Acquire);
        self.frame_length.store(decoded, Ordering::Release);
    }

    /// Seeks the underlying decoder to `frame_to_seek`, clearing the
    /// sentinel and resetting all frame counters to the position actually
    /// reached. Inaccurate seeks are accepted and logged, never surfaced
    /// as an error.
    pub(crate) fn perform_seek(&self) -> Result<()> {
        let target = self.frame_to_seek.load(Ordering::Acquire);
        if target < 0 {
            return Ok(());
        }
        // SAFETY: see the `unsafe impl Sync` note above.
        let decoder = unsafe { &mut *self.decoder.get() };
        let actual = decoder.seek_to_frame(target)?;
        self.frame_to_seek.store(-1, Ordering::Release);
        if actual != target {
            warn!(
                seq = self.sequence_number,
                requested = target,
                actual,
                "decoder seek was inaccurate"
            );
        }
        self.frames_decoded.store(actual, Ordering::Release);
        self.frames_available.store(actual, Ordering::Release);
        self.frames_rendered.store(actual, Ordering::Release);
        Ok(())
    }

    /// The decoder's own notion of whether it supports seeking.
    pub(crate) fn supports_seeking(&self) -> bool {
        // SAFETY: see the `unsafe impl Sync` note above.
        let decoder = unsafe { &*self.decoder.get() };
        decoder.supports_seeking()
    }

    /// Current playback position: the pending seek target if one is set,
    /// otherwise the last rendered frame.
    pub fn frame_position(&self) -> i64 {
        let seek = self.frame_to_seek.load(Ordering::Acquire);
        if seek >= 0 {
            seek
        } else {
            self.frames_rendered.load(Ordering::Acquire)
        }
    }

    /// A decoder is active while it is neither marked for removal nor
    /// fully rendered.
    pub fn is_active(&self) -> bool {
        !self.flags.contains(DecoderFlags::MARKED_FOR_REMOVAL)
            && !self.flags.contains(DecoderFlags::RENDERING_COMPLETE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::format::RenderingFormat;

    struct CountingDecoder {
        remaining: usize,
        position: i64,
    }

    impl Decoder for CountingDecoder {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
        fn supports_seeking(&self) -> bool {
            true
        }
        fn processing_format(&self) -> RenderingFormat {
            RenderingFormat::new_f32(44100, 1)
        }
        fn frame_length(&self) -> i64 {
            self.remaining as i64
        }
        fn frame_position(&self) -> i64 {
            self.position
        }
        fn seek_to_frame(&mut self, frame: i64) -> Result<i64> {
            self.position = frame;
            Ok(frame)
        }
        fn decode_into(
            &mut self,
            buffer: &mut PlanarBufferList<'_>,
            max_frames: usize,
        ) -> Result<usize> {
            let n = max_frames.min(self.remaining);
            for i in 0..n {
                buffer.plane_mut(0)[i] = i as f32;
            }
            self.remaining -= n;
            self.position += n as i64;
            Ok(n)
        }
    }

    #[allow(dead_code)]
    struct FailingDecoder;
    impl Decoder for FailingDecoder {
        fn open(&mut self) -> Result<()> {
            Err(EngineError::DecoderOpenFailed("nope".into()))
        }
        fn is_open(&self) -> bool {
            false
        }
        fn supports_seeking(&self) -> bool {
            false
        }
        fn processing_format(&self) -> RenderingFormat {
            RenderingFormat::new_f32(44100, 1)
        }
        fn frame_length(&self) -> i64 {
            -1
        }
        fn frame_position(&self) -> i64 {
            0
        }
        fn seek_to_frame(&mut self, _frame: i64) -> Result<i64> {
            Err(EngineError::SeekFailed("unsupported".into()))
        }
        fn decode_into(
            &mut self,
            _buffer: &mut PlanarBufferList<'_>,
            _max_frames: usize,
        ) -> Result<usize> {
            Err(EngineError::DecodeFailed("nope".into()))
        }
    }

    fn state_with(remaining: usize) -> DecoderState {
        let decoder = Box::new(CountingDecoder {
            remaining,
            position: 0,
        });
        DecoderState::new(0, decoder, 1, 64)
    }

    #[test]
    fn decode_audio_advances_frames_decoded() {
        let state = state_with(100);
        let written = state.decode_audio().unwrap();
        assert_eq!(written, 64);
        assert_eq!(state.frames_decoded.load(Ordering::Acquire), 64);
        assert_eq!(state.frames_available.load(Ordering::Acquire), 0);
    }

    #[test]
    fn decode_audio_sets_decoding_complete_at_end_of_stream() {
        let state = state_with(0);
        let written = state.decode_audio().unwrap();
        assert_eq!(written, 0);
        assert!(state.flags.contains(DecoderFlags::DECODING_COMPLETE));
    }

    #[test]
    fn perform_seek_resets_counters_to_actual_position() {
        let state = state_with(100);
        state.frame_to_seek.store(40, Ordering::Release);
        state.perform_seek().unwrap();
        assert_eq!(state.frame_to_seek.load(Ordering::Acquire), -1);
        assert_eq!(state.frames_decoded.load(Ordering::Acquire), 40);
        assert_eq!(state.frames_available.load(Ordering::Acquire), 40);
        assert_eq!(state.frames_rendered.load(Ordering::Acquire), 40);
    }

    #[test]
    fn perform_seek_is_noop_without_pending_target() {
        let state = state_with(100);
        state.perform_seek().unwrap();
        assert_eq!(state.frames_decoded.load(Ordering::Acquire), 0);
    }

    #[test]
    fn frame_position_prefers_pending_seek() {
        let state = state_with(100);
        state.frames_rendered.store(10, Ordering::Release);
        assert_eq!(state.frame_position(), 10);
        state.frame_to_seek.store(5, Ordering::Release);
        assert_eq!(state.frame_position(), 5);
    }

    #[test]
    fn set_if_absent_only_true_once() {
        let flags = DecoderFlags::new();
        assert!(flags.set_if_absent(DecoderFlags::RENDERING_STARTED));
        assert!(!flags.set_if_absent(DecoderFlags::RENDERING_STARTED));
    }

    #[test]
    fn is_active_false_once_marked_for_removal() {
        let state = state_with(100);
        assert!(state.is_active());
        state.flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
        assert!(!state.is_active());
    }
}
