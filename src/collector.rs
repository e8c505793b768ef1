//! # Collector
//!
//! Deferred reclamation task for decoder-state objects marked for
//! removal. Reaping is the sole site where a `DecoderState` is
//! destroyed; see [`crate::slot_table::SlotTable::reap`] for the
//! reader-count mechanism that makes this safe without the render
//! callback ever blocking.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::EngineShared;

/// How long the collector waits between reaps when it has not been
/// woken by a worker notification. A fallback, not the primary trigger —
/// the worker calls `collector_notify.notify_one()` as soon as it marks a
/// state for removal.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Runs the collector loop forever, reaping marked-for-removal decoder
/// states whenever woken (or on the idle sweep interval). Intended to be
/// spawned as its own `tokio::task`.
pub async fn run(shared: Arc<EngineShared>) {
    loop {
        // The render callback can never call `Notify::notify_one` (it
        // would take the waiter-list mutex on the realtime path), so it
        // leaves a lock-free hint here instead. Consume it before falling
        // back to the timed `Notify` wait, which the worker (a
        // non-realtime task) still uses directly after marking a state
        // for removal.
        if !shared.collector_wake_requested.swap(false, Ordering::AcqRel) {
            let _ = tokio::time::timeout(IDLE_SWEEP_INTERVAL, shared.collector_notify.notified()).await;
        }
        shared.slot_table.reap().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decoder::Decoder;
    use crate::decoder_state::{DecoderFlags, DecoderState};
    use crate::error::Result;
    use crate::format::{PlanarBufferList, RenderingFormat};

    struct StubDecoder;
    impl Decoder for StubDecoder {
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

    #[tokio::test]
    async fn notification_triggers_a_reap() {
        let shared = Arc::new(EngineShared::new(&EngineConfig::new(RenderingFormat::new_f32(
            44100, 1,
        ))));
        shared
            .slot_table
            .insert(Box::new(DecoderState::new(0, Box::new(StubDecoder), 1, 64)))
            .await;
        {
            let scan = shared.slot_table.scan();
            scan.find(0).unwrap().flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
        }

        let handle = tokio::spawn(run(shared.clone()));
        shared.collector_notify.notify_one();

        // Give the spawned task a chance to run the reap before checking.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            let scan = shared.slot_table.scan();
            if scan.find(0).is_none() {
                break;
            }
        }

        let scan = shared.slot_table.scan();
        assert!(scan.find(0).is_none());
        handle.abort();
    }
}
