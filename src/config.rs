//! # Engine Configuration
//!
//! Recognised configuration options for the decode/render core, their
//! defaults, and validation.

use serde::{Deserialize, Serialize};

use crate::format::RenderingFormat;

/// Scheduling hint for a cooperative task. The engine runs every
/// cooperative component as a `tokio::task`; these hints are not enforced
/// by `tokio` directly but are threaded through to `tracing` spans so a
/// host can correlate scheduling intent with observed latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QosClass {
    /// Runs at background priority; fine for the collector.
    Background,
    /// Runs promptly in response to user action; the default for the
    /// decoder worker and the event processor.
    UserInitiated,
    /// Runs with the highest cooperative priority available.
    UserInteractive,
}

/// Configuration for a [`crate::player::Player`].
///
/// `rendering_format` has no default — the host must choose it, since the
/// engine performs no sample-rate conversion or channel remapping and
/// rejects any decoder whose format does not match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The fixed PCM format all decoders must match.
    pub rendering_format: RenderingFormat,

    /// Audio ring buffer capacity in frames. Rounded up to the next power
    /// of two by [`crate::ring_buffer::AudioRingBuffer::new`].
    ///
    /// Default: 16384 frames.
    #[serde(default = "default_audio_ring_capacity_frames")]
    pub audio_ring_capacity_frames: u32,

    /// Number of frames decoded and written to the audio ring per worker
    /// iteration.
    ///
    /// Default: 2048 frames.
    #[serde(default = "default_chunk_size_frames")]
    pub chunk_size_frames: u32,

    /// Number of concurrent active-decoder slots.
    ///
    /// Default: 8.
    #[serde(default = "default_slot_table_size")]
    pub slot_table_size: u32,

    /// Event ring buffer capacity in bytes.
    ///
    /// Default: 256 bytes.
    #[serde(default = "default_event_ring_capacity_bytes")]
    pub event_ring_capacity_bytes: u32,

    /// Scheduling hint for the decoder worker task.
    #[serde(default = "default_worker_qos")]
    pub worker_qos: QosClass,

    /// Scheduling hint for the collector task.
    #[serde(default = "default_collector_qos")]
    pub collector_qos: QosClass,

    /// Scheduling hint for the event processor task, which also governs
    /// the queue delegate callbacks are dispatched on.
    #[serde(default = "default_event_qos")]
    pub event_qos: QosClass,
}

impl EngineConfig {
    /// Creates a configuration with every other field at its documented
    /// default for the given rendering format.
    pub fn new(rendering_format: RenderingFormat) -> Self {
        Self {
            rendering_format,
            audio_ring_capacity_frames: default_audio_ring_capacity_frames(),
            chunk_size_frames: default_chunk_size_frames(),
            slot_table_size: default_slot_table_size(),
            event_ring_capacity_bytes: default_event_ring_capacity_bytes(),
            worker_qos: default_worker_qos(),
            collector_qos: default_collector_qos(),
            event_qos: default_event_qos(),
        }
    }

    /// A configuration tuned for low output latency: a smaller ring and
    /// smaller decode chunks, at the cost of less slack against decoder
    /// stalls.
    pub fn low_latency(rendering_format: RenderingFormat) -> Self {
        Self {
            audio_ring_capacity_frames: 4096,
            chunk_size_frames: 512,
            ..Self::new(rendering_format)
        }
    }

    /// A configuration tuned for resilience against an irregular decoder:
    /// a larger ring and larger decode chunks.
    pub fn high_quality(rendering_format: RenderingFormat) -> Self {
        Self {
            audio_ring_capacity_frames: 65536,
            chunk_size_frames: 8192,
            ..Self::new(rendering_format)
        }
    }

    /// Validates the configuration, returning a human-readable error on
    /// the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.audio_ring_capacity_frames == 0 {
            return Err("audio_ring_capacity_frames must be > 0".to_string());
        }
        if self.chunk_size_frames == 0 {
            return Err("chunk_size_frames must be > 0".to_string());
        }
        if self.audio_ring_capacity_frames < self.chunk_size_frames.saturating_mul(2) {
            return Err(
                "audio_ring_capacity_frames must be at least a couple multiples of chunk_size_frames"
                    .to_string(),
            );
        }
        if self.slot_table_size == 0 {
            return Err("slot_table_size must be > 0".to_string());
        }
        if self.event_ring_capacity_bytes < 256 {
            return Err("event_ring_capacity_bytes must be >= 256".to_string());
        }
        Ok(())
    }
}

fn default_audio_ring_capacity_frames() -> u32 {
    16384
}

fn default_chunk_size_frames() -> u32 {
    2048
}

fn default_slot_table_size() -> u32 {
    8
}

fn default_event_ring_capacity_bytes() -> u32 {
    256
}

fn default_worker_qos() -> QosClass {
    QosClass::UserInitiated
}

fn default_collector_qos() -> QosClass {
    QosClass::Background
}

fn default_event_qos() -> QosClass {
    QosClass::UserInitiated
}
