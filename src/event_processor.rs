//! # Event Processor
//!
//! Cooperative consumer that drains the event ring and invokes
//! user-supplied callbacks on a delegate. Runs as its own `tokio::task`,
//! woken whenever a producer (the worker or the render callback) posts a
//! new record.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::event::Event;
use crate::shared::EngineShared;

/// Host-supplied callbacks invoked as lifecycle events are drained from
/// the event ring. Every method has a no-op default so a delegate only
/// needs to implement what it cares about.
///
/// Invocations correspond 1:1 to the events in [`crate::event::Event`];
/// `decoder_handle` is the originating decoder's `sequence_number`
/// wherever an `Event` carries one.
pub trait PlaybackDelegate: Send + Sync {
    fn decoding_started(&self, decoder_handle: u64) {
        let _ = decoder_handle;
    }
    fn decoding_complete(&self, decoder_handle: u64) {
        let _ = decoder_handle;
    }
    fn decoding_canceled(&self, decoder_handle: u64, partially_rendered: bool) {
        let _ = (decoder_handle, partially_rendered);
    }
    fn rendering_will_start(&self, decoder_handle: u64, host_time_ticks: u64) {
        let _ = (decoder_handle, host_time_ticks);
    }
    fn rendering_will_complete(&self, decoder_handle: u64, host_time_ticks: u64) {
        let _ = (decoder_handle, host_time_ticks);
    }
    fn audio_will_end(&self, host_time_ticks: u64) {
        let _ = host_time_ticks;
    }
    fn encountered_error(&self, error: crate::error::EngineError) {
        let _ = error;
    }
}

/// A delegate that discards every event, for players constructed without
/// one.
pub struct NoopDelegate;
impl PlaybackDelegate for NoopDelegate {}

/// Runs the event processor loop forever, dispatching drained events to
/// `delegate`. Intended to be spawned as its own `tokio::task`.
///
/// Waits on its own `event_notify`/`event_wake_requested` rather than
/// sharing `worker_notify` with the decoder worker: a single
/// `notify_one()` only wakes one parked waiter, so sharing it with the
/// worker meant an event-ready wake could be consumed by the worker
/// instead, leaving dispatch to lag until this loop's own 100ms timeout.
pub async fn run(shared: Arc<EngineShared>, delegate: Arc<dyn PlaybackDelegate>) {
    loop {
        let mut drained_any = false;
        while let Some(event) = shared.event_ring.read_event() {
            drained_any = true;
            dispatch(&shared, &*delegate, event);
        }
        if !drained_any {
            // The render callback can never call `Notify::notify_one` (it
            // would take the waiter-list mutex on the realtime path), so
            // it leaves a lock-free hint here instead.
            if shared.event_wake_requested.swap(false, Ordering::AcqRel) {
                continue;
            }
            let _ = tokio::time::timeout(Duration::from_millis(100), shared.event_notify.notified())
                .await;
        }
    }
}

fn dispatch(shared: &EngineShared, delegate: &dyn PlaybackDelegate, event: Event) {
    match event {
        Event::DecodingStarted { seq } => delegate.decoding_started(seq),
        Event::DecodingComplete { seq } => delegate.decoding_complete(seq),
        Event::DecodingCanceled {
            seq,
            partially_rendered,
        } => delegate.decoding_canceled(seq, partially_rendered),
        Event::RenderingStarted {
            seq,
            host_time_ticks,
        } => delegate.rendering_will_start(seq, host_time_ticks),
        Event::RenderingComplete {
            seq,
            host_time_ticks,
        } => delegate.rendering_will_complete(seq, host_time_ticks),
        Event::EndOfAudio { host_time_ticks } => delegate.audio_will_end(host_time_ticks),
        Event::Error { handle } => match shared.error_table.take(handle) {
            Some(error) => delegate.encountered_error(error),
            None => warn!(handle, "error event referenced an unknown side-table handle"),
        },
    }
}
