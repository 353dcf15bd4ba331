pub mod blit;
pub mod config;
pub mod errors;
pub mod ffi;
pub mod geometry;
pub mod pixels;
pub mod record;
pub mod registry;
pub mod render;
pub mod screen;

pub use blit::{BatchBlit, BlitOptions, FilterMode};
pub use config::ScreenConfig;
pub use errors::ScreenError;
pub use geometry::Rect;
pub use pixels::PixelBuffer;
pub use registry::Handle;
pub use screen::{OpenWindowOptions, Screen};
