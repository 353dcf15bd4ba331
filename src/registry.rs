//! Handle registry.
//!
//! Every onscreen window, offscreen window, texture and proxy lives in one slot of the
//! [`Registry`]. Callers refer to records through a [`Handle`], which combines the slot
//! index with a generation counter so that a handle kept across a close/reopen of the same
//! slot is detected instead of silently aliasing the new record.

mod handle;
mod table;

pub use handle::{Handle, MAX_GENERATION};
pub use table::Registry;
