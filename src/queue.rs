//! # Decoder Queue
//!
//! Ordered FIFO of decoders awaiting adoption by the decoder worker.
//! Guarded by a short-hold mutex that is never held while allocating or
//! calling into a decoder.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::decoder::Decoder;

/// Thread-safe FIFO of boxed decoders waiting for a free slot.
pub struct DecoderQueue {
    items: Mutex<VecDeque<Box<dyn Decoder>>>,
}

impl DecoderQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Pushes a decoder to the back of the queue.
    pub fn push(&self, decoder: Box<dyn Decoder>) {
        self.items.lock().push_back(decoder);
    }

    /// Pops the decoder at the front of the queue, if any.
    pub fn pop(&self) -> Option<Box<dyn Decoder>> {
        self.items.lock().pop_front()
    }

    /// Drops every waiting decoder without adopting it.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Number of decoders currently waiting.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Default for DecoderQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::format::{PlanarBufferList, RenderingFormat};

    struct StubDecoder(u32);
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

    #[test]
    fn fifo_order_is_preserved() {
        let queue = DecoderQueue::new();
        queue.push(Box::new(StubDecoder(1)));
        queue.push(Box::new(StubDecoder(2)));
        assert_eq!(queue.len(), 2);

        let first = queue.pop().unwrap();
        assert_eq!(first.frame_length(), -1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_drops_waiting_decoders() {
        let queue = DecoderQueue::new();
        queue.push(Box::new(StubDecoder(1)));
        queue.push(Box::new(StubDecoder(2)));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
