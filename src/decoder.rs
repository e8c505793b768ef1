//! # Decoder Capability
//!
//! The external interface the engine consumes. A `Decoder` is an opaque
//! source of PCM frames in a fixed [`RenderingFormat`]; concrete file
//! parsing, network I/O, and sample-format conversion live entirely on
//! the other side of this trait and are out of scope for this crate.
//!
//! Unlike a network-bound decoder, `decode_into` here is a bounded,
//! synchronous call made from the cooperative decoder worker loop, never
//! from the realtime render path.

use crate::error::Result;
use crate::format::{PlanarBufferList, RenderingFormat};

/// A source of decoded PCM frames.
///
/// Implementors own whatever file handle, network socket, or in-memory
/// buffer backs the audio; the engine only ever calls the methods below,
/// always from a single cooperative worker task for the lifetime of one
/// adopted [`crate::decoder_state::DecoderState`].
pub trait Decoder: Send {
    /// Opens the underlying source. Called once, before the decoder is
    /// adopted into the slot table.
    fn open(&mut self) -> Result<()>;

    /// Returns `true` once `open` has succeeded.
    fn is_open(&self) -> bool;

    /// Returns `true` if `seek_to_frame` is supported by this source.
    fn supports_seeking(&self) -> bool;

    /// The format frames are produced in. Must equal the engine's
    /// rendering format exactly; mismatches are rejected at enqueue time.
    fn processing_format(&self) -> RenderingFormat;

    /// Total frame count, or `-1` if unknown until end-of-stream.
    fn frame_length(&self) -> i64;

    /// The decoder's own notion of its current frame position.
    fn frame_position(&self) -> i64;

    /// Seeks to the given frame, returning the position actually reached
    /// (decoders are permitted to be inaccurate; the mismatch is reported
    /// via the returned value, not hidden).
    fn seek_to_frame(&mut self, frame: i64) -> Result<i64>;

    /// Decodes up to `max_frames` into `buffer`, returning the number of
    /// frames actually written. A return value of `0` signals end of
    /// stream.
    fn decode_into(&mut self, buffer: &mut PlanarBufferList<'_>, max_frames: usize)
        -> Result<usize>;
}
