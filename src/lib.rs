//! # Gapless Engine
//!
//! The decode/render core of a gapless audio player: the concurrent
//! machinery that reliably delivers PCM from a non-realtime decoder into
//! a realtime output callback, with queued playback, seamless gapless
//! transitions, seeking, cancellation, and event notifications carrying
//! accurate host-time scheduling.
//!
//! ## Overview
//!
//! This crate does not parse audio files, convert sample rates, or talk
//! to an output device — it defines the contracts by which an opaque
//! [`Decoder`](decoder::Decoder) is consumed and a realtime
//! [`render`](render::render) callback is exposed. Everything else
//! (concrete file parsers, device enumeration, host graph wiring) is an
//! external collaborator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌─────────────────┐      ┌───────────────────┐
//! │  Decoder Queue   │ ───▶ │  Decoder Worker  │ ───▶ │  Audio Ring Buffer │
//! │ (cooperative)    │      │ (cooperative)    │      │       (SPSC)       │
//! └─────────────────┘      └────────┬─────────┘      └──────────┬────────┘
//!                                   │ events                    │ reads
//!                                   ▼                           ▼
//!                           ┌──────────────┐           ┌─────────────────┐
//!                           │  Event Ring   │           │ Render Callback  │
//!                           │    (SPSC)     │           │   (realtime)     │
//!                           └───────┬──────┘           └─────────────────┘
//!                                   │
//!                                   ▼
//!                           ┌──────────────────┐
//!                           │  Event Processor  │ ──▶ PlaybackDelegate
//!                           └──────────────────┘
//! ```
//!
//! The [`Player`](player::Player) façade owns the worker, event
//! processor, and collector cooperative tasks; [`render::render`] is the
//! realtime-safe function a host output sink calls directly.

pub mod cache_padded;
pub mod collector;
pub mod config;
pub mod decoder;
pub mod decoder_state;
pub mod error;
pub mod error_table;
pub mod event;
pub mod event_processor;
pub mod event_ring;
pub mod format;
#[cfg(feature = "tracing-init")]
pub mod logging;
pub mod player;
pub mod queue;
pub mod render;
pub mod ring_buffer;
pub mod shared;
pub mod slot_table;
pub mod worker;

pub use config::{EngineConfig, QosClass};
pub use decoder::Decoder;
pub use error::{EngineError, Result};
pub use event::{Event, HostTimestamp};
pub use event_processor::{NoopDelegate, PlaybackDelegate};
pub use format::{PlanarBufferList, RenderingFormat, SampleFormat};
pub use player::Player;
pub use render::{render, RenderStatus};
