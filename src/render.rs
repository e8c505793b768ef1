//! # Render Callback
//!
//! The realtime-safe function that fills the output buffer from the
//! audio ring. Fixed contract: no blocking, no allocation, no unbounded
//! work. Every cross-thread communication here is an atomic load/store or
//! a ring-buffer index write — there are no suspension points on this
//! path at all.

use std::sync::atomic::Ordering;

use crate::decoder_state::DecoderFlags;
use crate::event::{Event, HostTimestamp};
use crate::format::PlanarBufferList;
use crate::shared::{EngineShared, PlaybackFlags};

/// Outcome of a render callback invocation. The realtime path never
/// surfaces decode/source errors here — those are reported asynchronously
/// through the event ring — so in practice this is always `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ok,
}

/// Fills `output` with up to `frame_count` frames, attributing rendered
/// frames to active decoders and emitting lifecycle events as it goes.
///
/// `silence_out` is set whenever the callback wrote silence instead of
/// decoded audio (not playing, muted, or the ring was empty).
pub fn render(
    shared: &EngineShared,
    silence_out: &mut bool,
    timestamp: &HostTimestamp,
    frame_count: u32,
    output: &mut PlanarBufferList<'_>,
) -> RenderStatus {
    *silence_out = false;
    let frame_count = frame_count as usize;

    // 1. Mute handshake: acknowledge a pending mute request, then fall
    // through to render (possibly silence, if IsPlaying was also cleared).
    if shared.playback_flags.contains(PlaybackFlags::MUTE_REQUESTED) {
        shared.playback_flags.set(PlaybackFlags::OUTPUT_MUTED);
        shared.playback_flags.clear(PlaybackFlags::MUTE_REQUESTED);
        shared.worker_wake_requested.store(true, Ordering::Release);
    }

    // 2-3. Silence fast path.
    let readable = shared.audio_ring.frames_readable();
    if !shared.playback_flags.contains(PlaybackFlags::IS_PLAYING)
        || shared.playback_flags.contains(PlaybackFlags::OUTPUT_MUTED)
        || readable == 0
    {
        output.fill_silence();
        *silence_out = true;
        return RenderStatus::Ok;
    }

    // 4. Read what we can, zero the rest.
    let to_read = readable.min(frame_count);
    let read = shared.audio_ring.read(output.planes_mut(), to_read);
    if read < frame_count {
        for channel in 0..output.channel_count() {
            output.plane_mut(channel)[read..frame_count].fill(0.0);
        }
    }

    // 5. Wake the worker if there's room for another chunk.
    if shared.audio_ring.frames_writable() >= shared.chunk_size_frames {
        shared.worker_wake_requested.store(true, Ordering::Release);
    }

    // 6. Nothing read — nothing to attribute.
    if read == 0 {
        return RenderStatus::Ok;
    }

    // 7. Attribute the read frames across active decoders in ascending
    // sequence order.
    let mut remaining = read as i64;
    let mut frame_offset: i64 = 0;
    let any_active_remains;
    {
        let scan = shared.slot_table.scan();
        let mut current = scan.active_smallest_sequence();
        while remaining > 0 {
            let Some(state) = current else { break };

            let available = state.frames_available.load(Ordering::Acquire);
            let rendered_before = state.frames_rendered.load(Ordering::Acquire);
            let take = (available - rendered_before).max(0).min(remaining);

            if state.flags.set_if_absent(DecoderFlags::RENDERING_STARTED) {
                let host_time = host_time_at_offset(shared, timestamp, frame_offset);
                shared.event_ring.write_event(&Event::RenderingStarted {
                    seq: state.sequence_number,
                    host_time_ticks: host_time,
                });
                shared.event_wake_requested.store(true, Ordering::Release);
            }

            let rendered_after = state.frames_rendered.fetch_add(take, Ordering::AcqRel) + take;

            if state.flags.contains(DecoderFlags::DECODING_COMPLETE) && rendered_after == available
            {
                if state.flags.set_if_absent(DecoderFlags::RENDERING_COMPLETE) {
                    let host_time = host_time_at_offset(shared, timestamp, frame_offset);
                    shared.event_ring.write_event(&Event::RenderingComplete {
                        seq: state.sequence_number,
                        host_time_ticks: host_time,
                    });
                    shared.event_wake_requested.store(true, Ordering::Release);
                    // A fully-rendered decoder is already excluded from
                    // `is_active` above, but its slot must also be freed
                    // for the next decoder to be adopted (spec.md's slot
                    // lifecycle: nullptr -> state -> nullptr once
                    // MarkedForRemoval is observed). Setting the flag here
                    // is a plain atomic store, same realtime-safety class
                    // as the `collector_wake_requested` hint below — never
                    // `Notify::notify_one`, which would take the waiter
                    // mutex on this path.
                    state.flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
                    shared.collector_wake_requested.store(true, Ordering::Release);
                }
            }

            frame_offset += take;
            remaining -= take;
            current = scan.active_following(state.sequence_number);
        }
        any_active_remains = scan.active_smallest_sequence().is_some();
    }

    // 8. If nothing is left to attribute to, audio has run dry.
    if !any_active_remains {
        let host_time = host_time_at_offset(shared, timestamp, read as i64);
        shared.event_ring.write_event(&Event::EndOfAudio {
            host_time_ticks: host_time,
        });
        shared.event_wake_requested.store(true, Ordering::Release);
    }

    RenderStatus::Ok
}

fn host_time_at_offset(shared: &EngineShared, timestamp: &HostTimestamp, frame_offset: i64) -> u64 {
    let seconds = frame_offset as f64 / shared.rendering_format.sample_rate as f64;
    timestamp
        .host_time_ticks
        .wrapping_add(shared.rendering_format.seconds_to_host_ticks(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decoder_state::DecoderState;
    use crate::error::Result;
    use crate::format::RenderingFormat;

    struct SilentDecoder {
        remaining: usize,
    }

    impl crate::decoder::Decoder for SilentDecoder {
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
            _buffer: &mut PlanarBufferList<'_>,
            max_frames: usize,
        ) -> Result<usize> {
            let n = max_frames.min(self.remaining);
            self.remaining -= n;
            Ok(n)
        }
    }

    fn shared() -> EngineShared {
        let config = EngineConfig::new(RenderingFormat::new_f32(44100, 1));
        EngineShared::new(&config)
    }

    fn timestamp() -> HostTimestamp {
        HostTimestamp {
            host_time_ticks: 1_000_000,
            sample_time: 0,
        }
    }

    #[test]
    fn not_playing_yields_silence() {
        let shared = shared();
        let mut out = [0.0f32; 8];
        let mut planes: Vec<&mut [f32]> = vec![&mut out];
        let mut buffer = PlanarBufferList::new(planes.drain(..).collect());
        let mut silence = false;
        let status = render(&shared, &mut silence, &timestamp(), 8, &mut buffer);
        assert_eq!(status, RenderStatus::Ok);
        assert!(silence);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn empty_ring_while_playing_yields_silence_without_events() {
        let shared = shared();
        shared.playback_flags.set(PlaybackFlags::IS_PLAYING);
        let mut out = [1.0f32; 8];
        let mut buffer = PlanarBufferList::new(vec![&mut out]);
        let mut silence = false;
        render(&shared, &mut silence, &timestamp(), 8, &mut buffer);
        assert!(silence);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(shared.event_ring.read_event().is_none());
    }

    #[test]
    fn reads_available_audio_and_attributes_rendering_started() {
        let shared = shared();
        shared.playback_flags.set(PlaybackFlags::IS_PLAYING);

        let state = DecoderState::new(0, Box::new(SilentDecoder { remaining: 100 }), 1, 64);
        state.frames_decoded.store(4, Ordering::Release);
        state.add_frames_available(4);
        shared.audio_ring.write(&[&[1.0, 2.0, 3.0, 4.0]], 4);

        // Synchronously drive an insert via block_on since this test is
        // not itself async.
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(shared.slot_table.insert(Box::new(state)));

        let mut out = [0.0f32; 4];
        let mut buffer = PlanarBufferList::new(vec![&mut out]);
        let mut silence = false;
        render(&shared, &mut silence, &timestamp(), 4, &mut buffer);
        assert!(!silence);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        let event = shared.event_ring.read_event().unwrap();
        assert_eq!(
            event,
            Event::RenderingStarted {
                seq: 0,
                host_time_ticks: timestamp().host_time_ticks,
            }
        );
    }

    #[test]
    fn end_of_audio_fires_when_no_active_decoder_remains() {
        let shared = shared();
        shared.playback_flags.set(PlaybackFlags::IS_PLAYING);
        shared.audio_ring.write(&[&[1.0, 2.0]], 2);

        let mut out = [0.0f32; 2];
        let mut buffer = PlanarBufferList::new(vec![&mut out]);
        let mut silence = false;
        render(&shared, &mut silence, &timestamp(), 2, &mut buffer);
        assert!(!silence);

        let event = shared.event_ring.read_event().unwrap();
        assert!(matches!(event, Event::EndOfAudio { .. }));
    }
}
