//! # Rendering Format
//!
//! The fixed, non-interleaved PCM description the engine consumes and
//! produces. Chosen once at player construction; every enqueued decoder
//! must match it exactly.

use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;

/// Sample representation used on the rendering path.
///
/// `F32` is the primary target; the engine performs no in-core sample
/// format conversion, so a decoder producing any other representation
/// must convert before handing frames to [`crate::decoder::Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
}

impl SampleFormat {
    /// Size in bytes of one sample in this format.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::F32 => std::mem::size_of::<f32>(),
        }
    }
}

/// Immutable, non-interleaved PCM description chosen at player
/// construction. All enqueued decoders must supply frames in this exact
/// format; mismatches are rejected with no implicit SRC or channel
/// remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (planes).
    pub channel_count: u16,
    /// Sample representation.
    pub sample_format: SampleFormat,
}

impl RenderingFormat {
    /// Convenience constructor for the common 32-bit float case.
    pub fn new_f32(sample_rate: u32, channel_count: u16) -> Self {
        Self {
            sample_rate,
            channel_count,
            sample_format: SampleFormat::F32,
        }
    }

    /// Bytes required to hold `frames` of this format across all planes.
    pub fn frame_bytes(&self, frames: usize) -> usize {
        frames * self.channel_count as usize * self.sample_format.bytes_per_sample()
    }

    /// Converts a duration in seconds to a frame count, rounding down.
    pub fn seconds_to_frames(&self, seconds: f64) -> i64 {
        (seconds * self.sample_rate as f64) as i64
    }

    /// Converts a frame count to a duration in seconds.
    pub fn frames_to_seconds(&self, frames: i64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    /// Converts a duration in seconds to host-clock ticks, assuming ticks
    /// advance 1:1 with nanoseconds (the convention used throughout this
    /// crate's [`crate::event::HostTimestamp`] values).
    pub fn seconds_to_host_ticks(&self, seconds: f64) -> u64 {
        (seconds * 1_000_000_000.0).round() as u64
    }

    /// Returns `true` if `decoder`'s `processing_format` matches this
    /// format exactly. The engine performs no implicit sample-rate
    /// conversion or channel remapping, so this is the single check every
    /// enqueue path (façade and worker) runs before adopting a decoder.
    pub fn is_compatible_with(&self, decoder: &dyn Decoder) -> bool {
        decoder.processing_format() == *self
    }
}

/// A non-owning view over one or more non-interleaved (planar) PCM
/// channels, used both for the decoder's scratch buffer and for the
/// output buffer handed to the render callback. Borrowing rather than
/// owning keeps the render path allocation-free.
pub struct PlanarBufferList<'a> {
    planes: Vec<&'a mut [f32]>,
}

impl<'a> PlanarBufferList<'a> {
    /// Wraps the given per-channel slices.
    pub fn new(planes: Vec<&'a mut [f32]>) -> Self {
        Self { planes }
    }

    /// Number of channels (planes).
    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Mutable access to one channel's samples.
    pub fn plane_mut(&mut self, channel: usize) -> &mut [f32] {
        self.planes[channel]
    }

    /// Immutable access to one channel's samples.
    pub fn plane(&self, channel: usize) -> &[f32] {
        self.planes[channel]
    }

    /// All planes as a mutable slice of slices.
    pub fn planes_mut(&mut self) -> &mut [&'a mut [f32]] {
        &mut self.planes
    }

    /// Writes silence (zero) into every plane.
    pub fn fill_silence(&mut self) {
        for plane in &mut self.planes {
            plane.fill(0.0);
        }
    }
}
