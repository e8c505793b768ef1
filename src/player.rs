//! # Player Façade
//!
//! Public control surface: play/pause/stop, enqueue, reset-and-enqueue,
//! cancel-current, clear-queue, seek, and position/time queries. Owns
//! the three cooperative tasks (worker, event processor, collector) for
//! the lifetime of the player.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::error::{EngineError, Result};
use crate::event::HostTimestamp;
use crate::event_processor::{NoopDelegate, PlaybackDelegate};
use crate::format::PlanarBufferList;
use crate::render::{self, RenderStatus};
use crate::shared::{EngineShared, PlaybackFlags};
use crate::{collector, event_processor, worker};

/// The gapless decode/render engine's public control surface.
///
/// Dropping a `Player` aborts its cooperative tasks immediately; callers
/// that need a bounded, graceful teardown should call [`Player::shutdown`]
/// first.
pub struct Player {
    shared: Arc<EngineShared>,
    worker_handle: JoinHandle<()>,
    event_processor_handle: JoinHandle<()>,
    collector_handle: JoinHandle<()>,
}

impl Player {
    /// Validates `config`, then spawns the worker, event processor, and
    /// collector tasks against a fresh, empty engine.
    pub fn new(config: EngineConfig, delegate: Arc<dyn PlaybackDelegate>) -> Result<Self> {
        config
            .validate()
            .map_err(EngineError::InvalidConfiguration)?;
        let shared = Arc::new(EngineShared::new(&config));
        Ok(Self::spawn(shared, delegate))
    }

    /// Like [`Player::new`], but discards every delegate callback.
    pub fn without_delegate(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(NoopDelegate))
    }

    fn spawn(shared: Arc<EngineShared>, delegate: Arc<dyn PlaybackDelegate>) -> Self {
        let worker_handle = tokio::task::spawn(worker::run(shared.clone()));
        let event_processor_handle = tokio::task::spawn(event_processor::run(shared.clone(), delegate));
        let collector_handle = tokio::task::spawn(collector::run(shared.clone()));
        Self {
            shared,
            worker_handle,
            event_processor_handle,
            collector_handle,
        }
    }

    /// Sets `IsPlaying`.
    pub fn play(&self) {
        self.shared.playback_flags.set(PlaybackFlags::IS_PLAYING);
    }

    /// Clears `IsPlaying`.
    pub fn pause(&self) {
        self.shared.playback_flags.clear(PlaybackFlags::IS_PLAYING);
    }

    /// Flips `IsPlaying`, returning the new state.
    pub fn toggle(&self) -> bool {
        self.shared.playback_flags.toggle(PlaybackFlags::IS_PLAYING)
    }

    /// Clears `IsPlaying`, drops the waiting queue, and requests
    /// cancellation of the active decoder.
    pub fn stop(&self) {
        self.shared.playback_flags.clear(PlaybackFlags::IS_PLAYING);
        self.shared.decoder_queue.clear();
        self.shared.cancel_active();
    }

    /// Opens and validates `decoder`, then pushes it to the back of the
    /// decoder queue and wakes the worker. Rejects a format mismatch
    /// synchronously without touching the queue.
    pub fn enqueue(&self, decoder: Box<dyn Decoder>) -> Result<()> {
        let decoder = open_and_validate(&self.shared, decoder)?;
        self.shared.decoder_queue.push(decoder);
        self.shared.worker_notify.notify_one();
        Ok(())
    }

    /// Opens and validates `decoder`, then clears the waiting queue,
    /// cancels the current decoder, and enqueues the new one in its
    /// place. A format mismatch leaves the current queue and playback
    /// state untouched.
    pub fn reset_and_enqueue(&self, decoder: Box<dyn Decoder>) -> Result<()> {
        let decoder = open_and_validate(&self.shared, decoder)?;
        self.shared.decoder_queue.clear();
        self.shared.cancel_active();
        self.shared.decoder_queue.push(decoder);
        self.shared.worker_notify.notify_one();
        Ok(())
    }

    /// Requests cancellation of the smallest-sequence active decoder.
    /// Returns `true` if an active decoder was found.
    pub fn cancel_current(&self) -> bool {
        self.shared.cancel_active()
    }

    /// Drops every decoder still waiting in the queue without adopting
    /// it.
    pub fn clear_queue(&self) {
        self.shared.decoder_queue.clear();
    }

    /// Requests a seek to `frame` on the smallest-sequence active
    /// decoder, clamped to `[0, frame_length - 1]` when the length is
    /// known. Rejected if there is no active decoder or it does not
    /// support seeking.
    pub fn seek_to_frame(&self, frame: i64) -> Result<()> {
        let scan = self.shared.slot_table.scan();
        let state = scan
            .active_smallest_sequence()
            .ok_or_else(|| EngineError::InternalError("no active decoder to seek".to_string()))?;
        if !state.supports_seeking() {
            return Err(EngineError::SeekFailed(
                "active decoder does not support seeking".to_string(),
            ));
        }
        let length = state.frame_length.load(Ordering::Acquire);
        let clamped = if length >= 0 {
            frame.clamp(0, (length - 1).max(0))
        } else {
            frame.max(0)
        };
        state.frame_to_seek.store(clamped, Ordering::Release);
        drop(scan);
        self.shared.worker_notify.notify_one();
        Ok(())
    }

    /// Convenience wrapper over [`Player::seek_to_frame`] taking a
    /// duration in seconds.
    pub fn seek_to_seconds(&self, seconds: f64) -> Result<()> {
        let frame = self.shared.rendering_format.seconds_to_frames(seconds);
        self.seek_to_frame(frame)
    }

    /// The active decoder's current frame position, or `None` if nothing
    /// is active.
    pub fn playback_position(&self) -> Option<i64> {
        let scan = self.shared.slot_table.scan();
        scan.active_smallest_sequence().map(|state| state.frame_position())
    }

    /// The active decoder's current playback position in seconds, or
    /// `None` if nothing is active.
    pub fn playback_time(&self) -> Option<f64> {
        self.playback_position()
            .map(|frame| self.shared.rendering_format.frames_to_seconds(frame))
    }

    /// The realtime render callback a host output sink calls directly,
    /// once per burst, from its own realtime thread — never from a task
    /// spawned against this player's runtime. See [`crate::render::render`]
    /// for the realtime-safety contract this forwards to unchanged.
    pub fn render(
        &self,
        silence_out: &mut bool,
        timestamp: &HostTimestamp,
        frame_count: u32,
        output: &mut PlanarBufferList<'_>,
    ) -> RenderStatus {
        render::render(&self.shared, silence_out, timestamp, frame_count, output)
    }

    /// Cancels the active decoder, wakes every cooperative task one last
    /// time, and waits up to `timeout` for them to finish before forcing
    /// an abort — mirrors the bounded dispatch-group teardown wait.
    pub async fn shutdown(mut self, timeout: std::time::Duration) {
        self.stop();
        let deadline = tokio::time::Instant::now() + timeout;
        let _ = tokio::time::timeout_at(deadline, &mut self.worker_handle).await;
        let _ = tokio::time::timeout_at(deadline, &mut self.event_processor_handle).await;
        let _ = tokio::time::timeout_at(deadline, &mut self.collector_handle).await;
        self.worker_handle.abort();
        self.event_processor_handle.abort();
        self.collector_handle.abort();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.worker_handle.abort();
        self.event_processor_handle.abort();
        self.collector_handle.abort();
    }
}

fn open_and_validate(
    shared: &EngineShared,
    mut decoder: Box<dyn Decoder>,
) -> Result<Box<dyn Decoder>> {
    if !decoder.is_open() {
        decoder.open()?;
    }
    if !shared.rendering_format.is_compatible_with(decoder.as_ref()) {
        let format = decoder.processing_format();
        return Err(EngineError::FormatNotSupported(format!(
            "decoder format {:?} does not match rendering format {:?}",
            format, shared.rendering_format
        )));
    }
    Ok(decoder)
}
