use crate::registry::Handle;
use crate::render::backend::{PrimitiveKind, Vertex, VERTEX_STRIDE};
use crate::render::color::ColorState;

/// State of one begin/end primitive group.
///
/// Created by `begin`, consumed by `end`. Holds the current color and texture coordinate
/// that later vertices pick up, and on buffered draw paths the vertices themselves.
#[derive(Debug)]
pub struct PrimitiveGroup {
    window: Handle,
    kind: PrimitiveKind,
    color: ColorState,
    shader_bound: bool,
    texcoord: Option<[f32; 4]>,
    buffer: Vec<f32>,
    capacity: usize,
    emitted: usize,
    dropped: usize,
}

impl PrimitiveGroup {
    /// `capacity` bounds the number of vertices a buffered path accepts.
    pub fn new(window: Handle, kind: PrimitiveKind, color: ColorState, shader_bound: bool, capacity: usize) -> Self {
        Self {
            window,
            kind,
            color,
            shader_bound,
            texcoord: None,
            buffer: Vec::new(),
            capacity,
            emitted: 0,
            dropped: 0,
        }
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    pub fn window(&self) -> Handle {
        self.window
    }

    pub fn set_color(&mut self, color: ColorState) {
        self.color = color;
    }

    pub fn set_texcoord(&mut self, texcoord: [f32; 4]) {
        self.texcoord = Some(texcoord);
    }

    /// Builds a vertex at `position` from the current color and texture coordinate.
    pub fn make_vertex(&self, position: [f32; 4]) -> Vertex {
        let (color, unclamped) = self.color.vertex_attributes(self.shader_bound);
        let texcoord = self
            .texcoord
            .or(unclamped)
            .unwrap_or([0.0, 0.0, 0.0, 1.0]);
        Vertex {
            position,
            color,
            texcoord,
        }
    }

    /// Appends a vertex to the buffer. Vertices beyond the capacity are dropped, with a
    /// single warning per group.
    pub fn push(&mut self, vertex: &Vertex) -> bool {
        if self.buffered_vertices() >= self.capacity {
            if self.dropped == 0 {
                log::warn!(
                    "Window[{}]: vertex buffer full at {} vertices, dropping further vertices of this group",
                    self.window,
                    self.capacity
                );
            }
            self.dropped += 1;
            return false;
        }
        self.buffer.extend_from_slice(&vertex.to_array());
        true
    }

    pub(crate) fn note_emitted(&mut self) {
        self.emitted += 1;
    }

    fn buffered_vertices(&self) -> usize {
        self.buffer.len() / VERTEX_STRIDE
    }

    /// Vertices accepted so far, buffered or passed through.
    pub fn vertex_count(&self) -> usize {
        self.emitted + self.buffered_vertices()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub(crate) fn take_vertices(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }
}

/// Rewrites legacy-only primitive types into triangles.
///
/// Quads are split along their first diagonal, polygons into a fan around the first vertex.
/// Incomplete trailing quads are discarded, the way native immediate mode does.
pub fn triangulate(kind: PrimitiveKind, vertices: &[f32]) -> (PrimitiveKind, Vec<f32>) {
    let vertex = |i: usize| &vertices[i * VERTEX_STRIDE..(i + 1) * VERTEX_STRIDE];
    let count = vertices.len() / VERTEX_STRIDE;
    let mut out = Vec::new();

    match kind {
        PrimitiveKind::Quads => {
            for quad in 0..count / 4 {
                let b = quad * 4;
                for i in [b, b + 1, b + 2, b, b + 2, b + 3] {
                    out.extend_from_slice(vertex(i));
                }
            }
        }
        PrimitiveKind::Polygon => {
            for i in 1..count.saturating_sub(1) {
                out.extend_from_slice(vertex(0));
                out.extend_from_slice(vertex(i));
                out.extend_from_slice(vertex(i + 1));
            }
        }
        other => return (other, vertices.to_vec()),
    }
    (PrimitiveKind::Triangles, out)
}
