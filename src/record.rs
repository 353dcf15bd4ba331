//! Resource records.
//!
//! A [`ResourceRecord`] describes one onscreen window, offscreen window, texture or proxy:
//! its geometry, pixel storage, framebuffer objects and the drawing state commands apply.
//! Records created for a parent window share its GPU context and copy the parent's context
//! state once at creation time.

mod fbo;
mod kind;
#[allow(clippy::module_inception)]
mod record;
mod state;

pub use fbo::{FboDescriptor, FboRole, FboTable};
pub use kind::{KindFilter, WindowKind};
pub use record::{ResourceRecord, SharedState, TextureStore};
pub use state::{
    BlendFactor, BlendState, ColorMask, GammaTable, ShaderBindings, SpecialFlags, StereoDrawBuffer,
    Stipple,
};
