//! # Active Decoder Slot Table
//!
//! Fixed-capacity lock-free table of decoder-state handles: leased by the
//! decoder worker, scanned by the render callback, reaped by the
//! collector.
//!
//! Reclamation safety is the one place this module goes beyond what
//! `spec.md` §4.4 specifies verbatim: a [`SlotScan`] increments a
//! wait-free reader count for as long as any scan-returned reference
//! might still be in use, and [`SlotTable::reap`] — which only ever runs
//! on the (non-realtime) collector task — waits for that count to reach
//! zero before freeing a reclaimed [`DecoderState`]. This prevents a
//! use-after-free without the render callback ever blocking: the
//! increment/decrement are themselves just atomic RMW operations, not
//! suspension points. The reader count and the slot pointer are two
//! separate atomics read/written in opposite orders on the scan side
//! (bump the count, then read the slot) versus the collector side (CAS
//! the slot, then read the count), so the increment/load pair on
//! `readers` uses `SeqCst` rather than `Acquire`/`Release` — the latter
//! only orders operations synchronizing through the same atomic and
//! would leave a StoreLoad hole between the two atomics on weakly-ordered
//! targets.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::time::Duration;

use crate::decoder_state::{DecoderFlags, DecoderState};

/// Fixed-size lock-free table of `AtomicPtr<DecoderState>` slots.
pub struct SlotTable {
    slots: Vec<AtomicPtr<DecoderState>>,
    readers: AtomicUsize,
}

impl SlotTable {
    /// Creates a table with `size` slots, all initially empty.
    pub fn new(size: usize) -> Self {
        let slots = (0..size.max(1))
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self {
            slots,
            readers: AtomicUsize::new(0),
        }
    }

    /// Producer (worker) side: finds a null slot and stores `state` into
    /// it. If every slot is occupied, sleeps 50ms and retries — the table
    /// is sized so exhaustion is practically impossible for real music;
    /// blocking here is acceptable because it runs on the cooperative
    /// worker, never the render thread.
    pub async fn insert(&self, state: Box<DecoderState>) {
        let raw = Box::into_raw(state);
        loop {
            for slot in &self.slots {
                if slot
                    .compare_exchange(
                        ptr::null_mut(),
                        raw,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Opens a scan: every lookup performed through the returned
    /// [`SlotScan`] is safe from concurrent reclamation for as long as the
    /// scan is alive.
    pub fn scan(&self) -> SlotScan<'_> {
        SlotScan::new(self)
    }

    fn active_matching(&self, predicate: impl Fn(&DecoderState) -> bool) -> Option<&DecoderState> {
        let mut best: Option<&DecoderState> = None;
        for slot in &self.slots {
            let raw = slot.load(Ordering::Acquire);
            if raw.is_null() {
                continue;
            }
            // SAFETY: the collector only frees a slot after CASing it to
            // null and observing the reader count drop to zero, so any
            // pointer read here stays valid until this `SlotScan` drops.
            let state = unsafe { &*raw };
            if !state.is_active() || !predicate(state) {
                continue;
            }
            best = match best {
                Some(current) if current.sequence_number <= state.sequence_number => Some(current),
                _ => Some(state),
            };
        }
        best
    }

    fn find_raw(&self, seq: u64) -> Option<&DecoderState> {
        for slot in &self.slots {
            let raw = slot.load(Ordering::Acquire);
            if raw.is_null() {
                continue;
            }
            // SAFETY: see `active_matching`.
            let state = unsafe { &*raw };
            if state.flags.contains(DecoderFlags::MARKED_FOR_REMOVAL) {
                continue;
            }
            if state.sequence_number == seq {
                return Some(state);
            }
        }
        None
    }

    /// Collector-only: exchanges every `MarkedForRemoval` slot to null,
    /// waits (off the realtime path) for any in-flight scan to finish,
    /// then drops the reclaimed states. This is the sole site where a
    /// `DecoderState` is destroyed.
    pub async fn reap(&self) {
        let mut reclaimed = Vec::new();
        for slot in &self.slots {
            let raw = slot.load(Ordering::Acquire);
            if raw.is_null() {
                continue;
            }
            // SAFETY: see `active_matching`.
            let marked = unsafe { &*raw }.flags.contains(DecoderFlags::MARKED_FOR_REMOVAL);
            if !marked {
                continue;
            }
            if slot
                .compare_exchange(raw, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                reclaimed.push(raw);
            }
        }
        if reclaimed.is_empty() {
            return;
        }
        // `SeqCst` here (matching the `SeqCst` increment in `SlotScan::new`)
        // is load-bearing, not decorative: `Acquire`/`Release` only order
        // operations that synchronize through the *same* atomic, and this
        // check and the increment are on `readers`, while the hazard is
        // between *this* load and the CAS on `slot` above versus the
        // scan's load of `slot` and its increment of `readers` — two
        // different atomics read/written in opposite orders on each side.
        // Acquire/Release gives no StoreLoad barrier across that pair, so
        // a weakly-ordered target could let this load observe zero while a
        // scan that already read the pre-CAS pointer is still in flight.
        // `SeqCst` on both sides restores a single total order across the
        // two atomics, closing that hole.
        while self.readers.load(Ordering::SeqCst) != 0 {
            tokio::task::yield_now().await;
        }
        for raw in reclaimed {
            // SAFETY: the slot was already CASed to null above, so no new
            // scan can observe `raw`, and the wait loop just above
            // confirmed every scan that began before the CAS has ended.
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

impl Drop for SlotTable {
    fn drop(&mut self) {
        for slot in &self.slots {
            let raw = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                // SAFETY: `&mut self` proves exclusive access; nothing
                // else can be scanning or reaping concurrently.
                drop(unsafe { Box::from_raw(raw) });
            }
        }
    }
}

/// A read-side lookup scope over a [`SlotTable`]. Holding one keeps every
/// returned `&DecoderState` valid, by deferring reclamation of any slot
/// the collector concurrently reaps until the scan ends.
pub struct SlotScan<'a> {
    table: &'a SlotTable,
}

impl<'a> SlotScan<'a> {
    fn new(table: &'a SlotTable) -> Self {
        // `SeqCst`: see the comment on the matching load in `reap`.
        table.readers.fetch_add(1, Ordering::SeqCst);
        Self { table }
    }

    /// Smallest-sequence active decoder (neither `MarkedForRemoval` nor
    /// `RenderingComplete`), or `None` if there isn't one.
    pub fn active_smallest_sequence(&self) -> Option<&'a DecoderState> {
        self.table.active_matching(|_| true)
    }

    /// Smallest-sequence active decoder with `sequence_number > seq`.
    pub fn active_following(&self, seq: u64) -> Option<&'a DecoderState> {
        self.table
            .active_matching(move |state| state.sequence_number > seq)
    }

    /// Looks up a decoder by sequence number, ignoring only
    /// `MarkedForRemoval` (unlike the `active_*` methods, a
    /// `RenderingComplete` state is still findable here) — used by the
    /// event processor to resolve sequence numbers carried in events.
    pub fn find(&self, seq: u64) -> Option<&'a DecoderState> {
        self.table.find_raw(seq)
    }
}

impl<'a> Drop for SlotScan<'a> {
    fn drop(&mut self) {
        // `SeqCst`: see the comment on the matching load in `reap`.
        self.table.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
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

    fn state(seq: u64) -> Box<DecoderState> {
        Box::new(DecoderState::new(seq, Box::new(StubDecoder), 1, 64))
    }

    #[tokio::test]
    async fn insert_then_scan_finds_smallest_sequence() {
        let table = SlotTable::new(8);
        table.insert(state(3)).await;
        table.insert(state(1)).await;
        table.insert(state(2)).await;

        let scan = table.scan();
        let smallest = scan.active_smallest_sequence().unwrap();
        assert_eq!(smallest.sequence_number, 1);
        let next = scan.active_following(1).unwrap();
        assert_eq!(next.sequence_number, 2);
        let last = scan.active_following(2).unwrap();
        assert_eq!(last.sequence_number, 3);
        assert!(scan.active_following(3).is_none());
    }

    #[tokio::test]
    async fn marked_for_removal_is_excluded_from_active_scans() {
        let table = SlotTable::new(8);
        table.insert(state(1)).await;
        {
            let scan = table.scan();
            let found = scan.find(1).unwrap();
            found.flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
        }
        let scan = table.scan();
        assert!(scan.active_smallest_sequence().is_none());
    }

    #[tokio::test]
    async fn reap_frees_marked_slots() {
        let table = SlotTable::new(8);
        table.insert(state(1)).await;
        {
            let scan = table.scan();
            scan.find(1).unwrap().flags.set(DecoderFlags::MARKED_FOR_REMOVAL);
        }
        table.reap().await;
        let scan = table.scan();
        assert!(scan.find(1).is_none());
    }

    #[tokio::test]
    async fn find_ignores_marked_for_removal_but_not_rendering_complete() {
        let table = SlotTable::new(8);
        table.insert(state(1)).await;
        {
            let scan = table.scan();
            scan.find(1).unwrap().flags.set(DecoderFlags::RENDERING_COMPLETE);
        }
        let scan = table.scan();
        assert!(scan.find(1).is_some());
        assert!(scan.active_smallest_sequence().is_none());
    }
}
