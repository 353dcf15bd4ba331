//! Draw paths.
//!
//! Every window picks one [`DrawPath`] when it is opened, based on its backend kind, and
//! children inherit it. Callers issue begin/vertex/end through the path without caring
//! whether the context has a native immediate mode.

use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::ScreenError;
use crate::render::backend::{BackendKind, RenderDevice, Vertex};
use crate::render::group::{triangulate, PrimitiveGroup};

pub trait DrawPath: Send + Sync + Debug {
    fn backend(&self) -> BackendKind;

    fn begin(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup) -> Result<(), ScreenError>;

    fn vertex(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup, vertex: Vertex);

    fn end(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup) -> Result<(), ScreenError>;
}

/// Native immediate mode of classic contexts.
#[derive(Debug)]
pub struct ClassicPath;

impl DrawPath for ClassicPath {
    fn backend(&self) -> BackendKind {
        BackendKind::Classic
    }

    fn begin(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup) -> Result<(), ScreenError> {
        device.immediate_begin(group.kind())?;
        Ok(())
    }

    fn vertex(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup, vertex: Vertex) {
        device.immediate_vertex(&vertex);
        group.note_emitted();
    }

    fn end(&self, device: &mut dyn RenderDevice, _group: &mut PrimitiveGroup) -> Result<(), ScreenError> {
        device.immediate_end()?;
        Ok(())
    }
}

/// Immediate mode emulation: vertices collect in the group's buffer and go out in one
/// array draw when the group ends.
#[derive(Debug)]
pub struct BufferedPath {
    backend: BackendKind,
}

impl BufferedPath {
    pub fn new(backend: BackendKind) -> Self {
        Self { backend }
    }
}

impl DrawPath for BufferedPath {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn begin(&self, _device: &mut dyn RenderDevice, _group: &mut PrimitiveGroup) -> Result<(), ScreenError> {
        Ok(())
    }

    fn vertex(&self, _device: &mut dyn RenderDevice, group: &mut PrimitiveGroup, vertex: Vertex) {
        group.push(&vertex);
    }

    fn end(&self, device: &mut dyn RenderDevice, group: &mut PrimitiveGroup) -> Result<(), ScreenError> {
        let vertices = group.take_vertices();
        if vertices.is_empty() {
            return Ok(());
        }
        let (kind, vertices) = triangulate(group.kind(), &vertices);
        if vertices.is_empty() {
            return Ok(());
        }
        device.draw_arrays(kind, &vertices)?;
        Ok(())
    }
}

/// Selects the draw path for a window of the given backend kind.
pub fn path_for(backend: BackendKind) -> Arc<dyn DrawPath> {
    match backend {
        BackendKind::Classic => Arc::new(ClassicPath),
        BackendKind::ModernDesktop | BackendKind::Embedded => Arc::new(BufferedPath::new(backend)),
    }
}
