//! Screen configuration.
//!
//! `ScreenConfig` holds the process-level knobs of a [`Screen`](crate::screen::Screen):
//! registry growth, the size of the emulated immediate-mode vertex buffer, the default
//! backend for new windows and a few policy switches.
//!
//! `ScreenConfig` provides defaults via [`Default`] and a fluent
//! [`ScreenConfig::builder()`] with validation. It can also be read from JSON.
//!
//! # Examples
//!
//! ```rust
//! use stimgl::config::ScreenConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ScreenConfig::builder()
//!     .registry_chunk_size(64)
//!     .vertex_buffer_capacity(1024)
//!     .avoid_framebuffer_blit(true)
//!     .build()?;
//! assert_eq!(cfg.registry_chunk_size, 64);
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `registry_chunk_size`: slots added whenever the handle table is full (default: 4096).
//! - `max_records`: optional hard limit on live records.
//! - `vertex_buffer_capacity`: vertices one emulated primitive group can hold (default: 65536).
//! - `default_backend`: backend kind for windows that do not ask for one.
//! - `avoid_framebuffer_blit`: never use the framebuffer blit fast path for copies.
//! - `clear_color`: color new windows are cleared to, normalized.
//! - `default_color_range`: maximum color component value for new windows (default: 1.0).
//! - `finish_timeout_ms`: bound for waiting on GPU completion (default: 5000).
//! - `loader_threads`: worker threads of the background texture loader (default: 1).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::render::backend::BackendKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub registry_chunk_size: usize,
    pub max_records: Option<usize>,
    pub vertex_buffer_capacity: usize,
    pub default_backend: Option<BackendKind>,
    pub avoid_framebuffer_blit: bool,
    pub clear_color: [f64; 4],
    pub default_color_range: f64,
    pub finish_timeout_ms: u64,
    pub loader_threads: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            registry_chunk_size: 4096,
            max_records: None,
            vertex_buffer_capacity: 65536,
            default_backend: None,
            avoid_framebuffer_blit: false,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            default_color_range: 1.0,
            finish_timeout_ms: 5000,
            loader_threads: 1,
        }
    }
}

impl ScreenConfig {
    pub fn builder() -> ScreenConfigBuilder {
        ScreenConfigBuilder::default()
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_millis(self.finish_timeout_ms)
    }

    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let cfg: ScreenConfig = serde_json::from_str(json)?;
        validate(&cfg)?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenConfigBuilder {
    inner: ScreenConfig,
}

impl ScreenConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut ScreenConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn registry_chunk_size(self, n: usize) -> Self { self.map(|c| c.registry_chunk_size = n) }
    pub fn max_records(self, n: usize) -> Self { self.map(|c| c.max_records = Some(n)) }
    pub fn vertex_buffer_capacity(self, n: usize) -> Self { self.map(|c| c.vertex_buffer_capacity = n) }
    pub fn default_backend(self, kind: BackendKind) -> Self { self.map(|c| c.default_backend = Some(kind)) }
    pub fn avoid_framebuffer_blit(self, on: bool) -> Self { self.map(|c| c.avoid_framebuffer_blit = on) }
    pub fn clear_color(self, rgba: [f64; 4]) -> Self { self.map(|c| c.clear_color = rgba) }
    pub fn default_color_range(self, max: f64) -> Self { self.map(|c| c.default_color_range = max) }
    pub fn finish_timeout_ms(self, ms: u64) -> Self { self.map(|c| c.finish_timeout_ms = ms) }
    pub fn loader_threads(self, n: usize) -> Self { self.map(|c| c.loader_threads = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut ScreenConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<ScreenConfig, ScreenConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenConfigError {
    ZeroChunkSize,
    ZeroVertexCapacity,
    ZeroLoaderThreads,
    InvalidColorRange(f64),
    InvalidClearColor([f64; 4]),
}

impl fmt::Display for ScreenConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenConfigError::ZeroChunkSize =>
                write!(f, "registry_chunk_size must be at least 1"),
            ScreenConfigError::ZeroVertexCapacity =>
                write!(f, "vertex_buffer_capacity must be at least 1"),
            ScreenConfigError::ZeroLoaderThreads =>
                write!(f, "loader_threads must be at least 1"),
            ScreenConfigError::InvalidColorRange(r) =>
                write!(f, "default_color_range {r} must be a positive finite number"),
            ScreenConfigError::InvalidClearColor(c) =>
                write!(f, "clear_color {c:?} must have components in 0.0..=1.0"),
        }
    }
}
impl std::error::Error for ScreenConfigError {}

fn validate(c: &ScreenConfig) -> Result<(), ScreenConfigError> {
    if c.registry_chunk_size == 0 {
        return Err(ScreenConfigError::ZeroChunkSize);
    }
    if c.vertex_buffer_capacity == 0 {
        return Err(ScreenConfigError::ZeroVertexCapacity);
    }
    if c.loader_threads == 0 {
        return Err(ScreenConfigError::ZeroLoaderThreads);
    }
    if !(c.default_color_range.is_finite() && c.default_color_range > 0.0) {
        return Err(ScreenConfigError::InvalidColorRange(c.default_color_range));
    }
    if c.clear_color.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err(ScreenConfigError::InvalidClearColor(c.clear_color));
    }
    Ok(())
}
