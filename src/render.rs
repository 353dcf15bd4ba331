//! Cross-backend rendering layer.
//!
//! [`RenderDevice`](backend::RenderDevice) is the driver interface. Windows talk to it
//! through their [`DrawPath`](path::DrawPath), which hides whether the context offers a
//! native immediate mode or needs it emulated with a vertex buffer.

pub mod backend;
pub mod backends;
pub mod caps;
pub mod color;
pub mod group;
pub mod path;

pub use backend::{is_classic, is_embedded, BackendKind, ContextDomain, RenderDevice};
pub use backends::null::NullDevice;
pub use backends::software::SoftwareDevice;
pub use caps::GfxCaps;
pub use color::{ColorRange, ColorState};
pub use group::PrimitiveGroup;
pub use path::{path_for, DrawPath};
