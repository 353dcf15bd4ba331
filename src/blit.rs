//! Texture blits and framebuffer copies.
//!
//! [`blit_texture`](texture::blit_texture) draws a rectangle of a texture as a textured
//! quad through the destination window's draw path. [`BatchBlit`] collects many such draws
//! and merges them into one primitive group when the destination allows it. Copies between
//! framebuffer-backed windows use a direct framebuffer blit when both sides support it.

mod batch;
mod fast_copy;
mod options;
mod texture;

pub use batch::{BatchBlit, BatchItem};
pub use options::{BlitOptions, FilterMode};

pub(crate) use batch::draw_merged;
pub(crate) use fast_copy::{can_fast_copy, fast_copy, CopyEnd};
pub(crate) use texture::{blit_color, blit_texture, check_rotation, quad_vertices, TextureSource};
