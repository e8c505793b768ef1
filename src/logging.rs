//! # Logging Initializer
//!
//! Optional convenience helper for hosts/binaries that want a ready-made
//! `tracing-subscriber` setup without wiring `EnvFilter` and a formatter
//! themselves. The engine itself never installs a global subscriber on
//! its own — every `tracing` call in this crate (`worker`, `render`'s
//! cfg(test) paths, `decoder_state::perform_seek`) just emits to
//! whatever subscriber the host has already installed, if any.
//!
//! Gated behind the `tracing-init` feature so a host that already has
//! its own logging story never pulls in `tracing-subscriber`.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized output — the default outside release
    /// builds.
    Pretty,
    /// Single-line-per-event output, suited to log aggregation.
    Compact,
    /// Structured JSON, one object per event.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Pretty
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

/// Configuration for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive string, e.g. `"gapless_engine=debug,warn"`.
    /// Falls back to `RUST_LOG`, then to `info` for this crate and
    /// `warn` for everything else.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Installs a global `tracing` subscriber built from `config`.
///
/// Returns an error if a global subscriber is already installed (e.g.
/// this was called twice, or the host installed its own first) — callers
/// that only want a best-effort setup can discard the error.
pub fn init_logging(config: LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = config
        .filter
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gapless_engine=info,warn")));

    match config.format {
        LogFormat::Pretty => fmt().pretty().with_env_filter(filter).try_init(),
        LogFormat::Compact => fmt().compact().with_env_filter(filter).try_init(),
        LogFormat::Json => fmt().json().flatten_event(true).with_env_filter(filter).try_init(),
    }
}
