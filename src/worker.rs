//! # Decoder Worker
//!
//! Cooperative task that dequeues waiting decoders, installs them in the
//! slot table, decodes into the audio ring in fixed chunks, honours
//! seeks and cancellation, and posts lifecycle events. Runs on a
//! dedicated user-initiated `tokio::task`, never on the render thread.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::decoder::Decoder;
use crate::decoder_state::{DecoderFlags, DecoderState};
use crate::error::EngineError;
use crate::event::Event;
use crate::shared::{EngineShared, PlaybackFlags};

/// Upper bound on how long the worker spins waiting for the render
/// callback to acknowledge a mute request, in 10ms steps, before giving
/// up and proceeding anyway. Guards against a stalled or absent render
/// thread hanging the worker forever; 500 steps is 5 seconds, matching
/// the teardown dispatch-group bound in §4.7.
const MAX_MUTE_WAIT_STEPS: u32 = 500;

/// Runs the decoder worker loop forever. Intended to be spawned as its
/// own `tokio::task` for the lifetime of the player.
#[instrument(skip(shared))]
pub async fn run(shared: Arc<EngineShared>) {
    loop {
        let decoder = match shared.decoder_queue.pop() {
            Some(decoder) => decoder,
            None => {
                wait_for_work(&shared).await;
                continue;
            }
        };
        adopt_and_drain(&shared, decoder).await;
    }
}

async fn wait_for_work(shared: &EngineShared) {
    // The render callback can never call `Notify::notify_one` (it would
    // take the waiter-list mutex on the realtime path), so it leaves a
    // lock-free hint here instead. Consume it before falling back to the
    // timed `Notify` wait, which non-realtime signallers (the façade, the
    // worker itself) still use directly.
    if shared.worker_wake_requested.swap(false, Ordering::AcqRel) {
        return;
    }
    let _ = tokio::time::timeout(Duration::from_millis(100), shared.worker_notify.notified()).await;
}

/// Opens, validates, and fully drains one decoder: steps 2-5 of the
/// adoption-and-drain algorithm. Returns once the decoder reaches
/// end-of-stream, is cancelled, or is rejected before a state is ever
/// created.
async fn adopt_and_drain(shared: &EngineShared, mut decoder: Box<dyn Decoder>) {
    if !decoder.is_open() {
        if let Err(error) = decoder.open() {
            post_error(shared, error);
            return;
        }
    }

    if !shared.rendering_format.is_compatible_with(decoder.as_ref()) {
        let format = decoder.processing_format();
        post_error(
            shared,
            EngineError::FormatNotSupported(format!(
                "decoder format {:?} does not match rendering format {:?}",
                format, shared.rendering_format
            )),
        );
        return;
    }

    let seq = shared.next_sequence_number();
    let state = Box::new(DecoderState::new(
        seq,
        decoder,
        shared.rendering_format.channel_count as usize,
        shared.chunk_size_frames,
    ));
    shared.slot_table.insert(state).await;

    drain(shared, seq).await;
}

/// Outcome of one synchronous decode step, decided while a [`crate::slot_table::SlotScan`]
/// is held, then acted on (including any `.await`) after it has been dropped —
/// the guard must never be live across a suspension point, since holding it
/// open blocks the collector from reaping unrelated decoders for as long as
/// this one keeps decoding.
enum Step {
    SeekPending,
    RingResetPending,
    Decoded,
    Complete,
    Cancelled,
    Wait,
}

async fn drain(shared: &EngineShared, seq: u64) {
    loop {
        let step = {
            let scan = shared.slot_table.scan();
            let Some(state) = scan.find(seq) else {
                return;
            };

            if state.frame_to_seek.load(Ordering::Acquire) != -1 {
                Step::SeekPending
            } else if shared.ring_reset_requested.swap(false, Ordering::AcqRel) {
                Step::RingResetPending
            } else if shared.audio_ring.frames_writable() >= shared.chunk_size_frames {
                if state.flags.set_if_absent(DecoderFlags::DECODING_STARTED) {
                    shared.event_ring.write_event(&Event::DecodingStarted { seq });
                    shared.event_notify.notify_one();
                }
                match state.decode_audio() {
                    Ok(frames_written) => {
                        if frames_written > 0 {
                            let planes = state.scratch_planes(frames_written);
                            let written = shared.audio_ring.write(&planes, frames_written);
                            if written < frames_written {
                                warn!(seq, frames_written, written, "partial write to audio ring");
                            }
                            state.add_frames_available(written as i64);
                        }
                        if state.flags.contains(DecoderFlags::DECODING_COMPLETE) {
                            state.refine_frame_length_at_eos();
                            shared.event_ring.write_event(&Event::DecodingComplete { seq });
                            shared.event_notify.notify_one();
                            Step::Complete
                        } else {
                            Step::Decoded
                        }
                    }
                    Err(error) => {
                        post_error(shared, error);
                        state.flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
                        Step::Cancelled
                    }
                }
            } else if state.flags.contains(DecoderFlags::CANCEL_REQUESTED) {
                shared.ring_reset_requested.store(true, Ordering::Release);
                let partially_rendered = state.frames_rendered.load(Ordering::Acquire) > 0;
                shared.event_ring.write_event(&Event::DecodingCanceled {
                    seq,
                    partially_rendered,
                });
                shared.event_notify.notify_one();
                state.flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
                Step::Cancelled
            } else {
                Step::Wait
            }
        };

        match step {
            Step::SeekPending => perform_ring_reset(shared, seq, true).await,
            Step::RingResetPending => perform_ring_reset(shared, seq, false).await,
            Step::Decoded => {}
            Step::Complete | Step::Cancelled => {
                shared.collector_notify.notify_one();
                return;
            }
            Step::Wait => wait_for_work(shared).await,
        }
    }
}

/// Performs the mute → drain → reset-ring → (optional seek) → unmute
/// sequence described in §5's mute protocol. Re-resolves `seq` through a
/// fresh scan after the (awaiting) mute wait, since the state must never
/// be held across that suspension point.
async fn perform_ring_reset(shared: &EngineShared, seq: u64, with_seek: bool) {
    shared.playback_flags.set(PlaybackFlags::MUTE_REQUESTED);
    shared.worker_notify.notify_one();

    let mut steps = 0;
    while shared.playback_flags.contains(PlaybackFlags::MUTE_REQUESTED) {
        steps += 1;
        if steps > MAX_MUTE_WAIT_STEPS {
            warn!("mute handshake did not complete in time; forcing ring reset");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shared.audio_ring.reset();
    if with_seek {
        let scan = shared.slot_table.scan();
        if let Some(state) = scan.find(seq) {
            if let Err(error) = state.perform_seek() {
                post_error(shared, error);
            }
        }
    }
    shared.playback_flags.clear(PlaybackFlags::OUTPUT_MUTED);
    debug!(seq, with_seek, "ring reset complete");
}

fn post_error(shared: &EngineShared, error: EngineError) {
    let handle = shared.error_table.insert(error);
    shared.event_ring.write_event(&Event::Error { handle });
    shared.event_notify.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::Result;
    use crate::format::{PlanarBufferList, RenderingFormat};

    struct CountingDecoder {
        remaining: usize,
        opened: bool,
    }

    impl Decoder for CountingDecoder {
        fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }
        fn is_open(&self) -> bool {
            self.opened
        }
        fn supports_seeking(&self) -> bool {
            false
        }
        fn processing_format(&self) -> RenderingFormat {
            RenderingFormat::new_f32(44100, 1)
        }
        fn frame_length(&self) -> i64 {
            self.remaining as i64
        }
        fn frame_position(&self) -> i64 {
            0
        }
        fn seek_to_frame(&mut self, frame: i64) -> Result<i64> {
            Ok(frame)
        }
        fn decode_into(
            &mut self,
            buffer: &mut PlanarBufferList<'_>,
            max_frames: usize,
        ) -> Result<usize> {
            let n = max_frames.min(self.remaining);
            for i in 0..n {
                buffer.plane_mut(0)[i] = 1.0;
            }
            self.remaining -= n;
            Ok(n)
        }
    }

    struct MismatchedDecoder;
    impl Decoder for MismatchedDecoder {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
        fn supports_seeking(&self) -> bool {
            false
        }
        fn processing_format(&self) -> RenderingFormat {
            RenderingFormat::new_f32(48000, 2)
        }
        fn frame_length(&self) -> i64 {
            -1
        }
        fn frame_position(&self) -> i64 {
            0
        }
        fn seek_to_frame(&mut self, frame: i64) -> Result<i64> {
            Ok(frame)
        }
        fn decode_into(
            &mut self,
            _buffer: &mut PlanarBufferList<'_>,
            _max_frames: usize,
        ) -> Result<usize> {
            Ok(0)
        }
    }

    fn shared() -> EngineShared {
        let mut config = EngineConfig::new(RenderingFormat::new_f32(44100, 1));
        config.chunk_size_frames = 4;
        config.audio_ring_capacity_frames = 16;
        EngineShared::new(&config)
    }

    #[tokio::test]
    async fn adopts_decodes_and_completes() {
        let shared = shared();
        let decoder = Box::new(CountingDecoder {
            remaining: 4,
            opened: false,
        });
        adopt_and_drain(&shared, decoder).await;

        let event = shared.event_ring.read_event().unwrap();
        assert!(matches!(event, Event::DecodingStarted { seq: 0 }));
        let event = shared.event_ring.read_event().unwrap();
        assert!(matches!(event, Event::DecodingComplete { seq: 0 }));
        assert_eq!(shared.audio_ring.frames_readable(), 4);
    }

    #[tokio::test]
    async fn format_mismatch_posts_error_without_creating_state() {
        let shared = shared();
        adopt_and_drain(&shared, Box::new(MismatchedDecoder)).await;

        let event = shared.event_ring.read_event().unwrap();
        let Event::Error { handle } = event else {
            panic!("expected an Error event");
        };
        let error = shared.error_table.take(handle).unwrap();
        assert!(matches!(error, EngineError::FormatNotSupported(_)));

        let scan = shared.slot_table.scan();
        assert!(scan.active_smallest_sequence().is_none());
    }

    #[tokio::test]
    async fn cancellation_emits_decoding_canceled_and_marks_for_removal() {
        let shared = shared();
        let decoder = Box::new(CountingDecoder {
            remaining: 1000,
            opened: false,
        });

        let seq = shared.next_sequence_number();
        let state = Box::new(DecoderState::new(seq, decoder, 1, shared.chunk_size_frames));
        shared.slot_table.insert(state).await;

        {
            let scan = shared.slot_table.scan();
            let state = scan.find(seq).unwrap();
            state.flags.set(DecoderFlags::CANCEL_REQUESTED);
            // Fill the ring so the cancellation branch (not the decode
            // branch) is taken on the first loop iteration.
            shared
                .audio_ring
                .write(&[&vec![0.0f32; shared.audio_ring.capacity()]], shared.audio_ring.capacity());
        }

        drain(&shared, seq).await;
        {
            let scan = shared.slot_table.scan();
            let state = scan.find(seq).unwrap();
            assert!(state.flags.contains(DecoderFlags::MARKED_FOR_REMOVAL));
        }

        let event = shared.event_ring.read_event().unwrap();
        assert!(matches!(
            event,
            Event::DecodingCanceled {
                seq: 0,
                partially_rendered: false
            }
        ));
        assert!(shared.ring_reset_requested.load(Ordering::Acquire));
    }
}
