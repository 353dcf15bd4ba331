use std::any::Any;
use std::sync::RwLock;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blit::FilterMode;
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::{BlendState, ColorMask, ResourceRecord, Stipple};
use crate::render::caps::GfxCaps;

/// Rendering model of the context a window lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Legacy fixed-function desktop API with native immediate mode.
    Classic,
    /// Core-profile desktop API: no immediate mode, full precision.
    ModernDesktop,
    /// Embedded API: no immediate mode, reduced fixed-function color path.
    Embedded,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Classic => write!(f, "classic"),
            BackendKind::ModernDesktop => write!(f, "modern-desktop"),
            BackendKind::Embedded => write!(f, "embedded"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(BackendKind::Classic),
            "modern-desktop" | "modern" | "core" => Ok(BackendKind::ModernDesktop),
            "embedded" | "gles" => Ok(BackendKind::Embedded),
            other => Err(format!("unknown backend kind '{other}'")),
        }
    }
}

/// Backend kind answered for questions asked without a window record.
///
/// The kind of the first onscreen window sticks until the last onscreen window closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackBackend {
    kind: Option<BackendKind>,
    onscreen: usize,
}

impl FallbackBackend {
    pub fn window_opened(&mut self, kind: BackendKind) {
        self.onscreen += 1;
        self.kind.get_or_insert(kind);
    }

    pub fn window_closed(&mut self) {
        self.onscreen = self.onscreen.saturating_sub(1);
        if self.onscreen == 0 {
            self.kind = None;
        }
    }

    pub fn get(&self) -> Option<BackendKind> {
        self.kind
    }
}

lazy_static! {
    // Counts the onscreen windows of every screen in the process.
    static ref FALLBACK_BACKEND: RwLock<FallbackBackend> = RwLock::new(FallbackBackend::default());
}

pub(crate) fn note_onscreen_opened(kind: BackendKind) {
    if let Ok(mut guard) = FALLBACK_BACKEND.write() {
        guard.window_opened(kind);
    }
}

pub(crate) fn note_onscreen_closed() {
    if let Ok(mut guard) = FALLBACK_BACKEND.write() {
        guard.window_closed();
    }
}

/// Backend kind used when no window record is at hand.
pub fn fallback_backend() -> BackendKind {
    FALLBACK_BACKEND
        .read()
        .ok()
        .and_then(|g| g.get())
        .unwrap_or(BackendKind::Classic)
}

pub fn is_classic(record: Option<&ResourceRecord>) -> bool {
    record.map(|r| r.backend).unwrap_or_else(fallback_backend) == BackendKind::Classic
}

pub fn is_embedded(record: Option<&ResourceRecord>) -> bool {
    record.map(|r| r.backend).unwrap_or_else(fallback_backend) == BackendKind::Embedded
}

/// Token naming the set of windows that share GPU objects with each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextDomain(Uuid);

impl ContextDomain {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Placeholder domain of records that are not yet populated.
    pub fn unassigned() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_assigned(&self) -> bool {
        !self.0.is_nil()
    }
}

impl Default for ContextDomain {
    fn default() -> Self {
        Self::unassigned()
    }
}

impl std::fmt::Display for ContextDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FramebufferId(pub u32);

/// Shader program handle; `ProgramId(0)` means fixed function / no shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

impl ProgramId {
    pub const NONE: ProgramId = ProgramId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Storage precision of a texture or framebuffer color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TexelFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
}

impl TexelFormat {
    pub fn bits_per_channel(&self) -> u8 {
        match self {
            TexelFormat::Rgba8 => 8,
            TexelFormat::Rgba16F => 16,
            TexelFormat::Rgba32F => 32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerState {
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

/// Primitive types understood by [`RenderDevice::draw_arrays`] and the immediate mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    /// Only available natively on classic contexts.
    Quads,
    /// Only available natively on classic contexts.
    Polygon,
}

impl PrimitiveKind {
    /// True for primitive types that core-profile and embedded contexts lack.
    pub fn is_legacy_only(&self) -> bool {
        matches!(self, PrimitiveKind::Quads | PrimitiveKind::Polygon)
    }
}

/// Number of floats per buffered vertex: position, color and texture coordinate, 4 each.
pub const VERTEX_STRIDE: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub texcoord: [f32; 4],
}

impl Vertex {
    pub fn to_array(&self) -> [f32; VERTEX_STRIDE] {
        let mut out = [0.0; VERTEX_STRIDE];
        out[0..4].copy_from_slice(&self.position);
        out[4..8].copy_from_slice(&self.color);
        out[8..12].copy_from_slice(&self.texcoord);
        out
    }

    pub fn from_slice(v: &[f32]) -> Self {
        let mut vertex = Vertex {
            position: [0.0; 4],
            color: [0.0; 4],
            texcoord: [0.0; 4],
        };
        vertex.position.copy_from_slice(&v[0..4]);
        vertex.color.copy_from_slice(&v[4..8]);
        vertex.texcoord.copy_from_slice(&v[8..12]);
        vertex
    }
}

/// What a device reports about itself when a window is opened on it.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub max_texture_size: u32,
    /// Capabilities the hardware offers before backend-specific restrictions apply.
    pub caps: GfxCaps,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferId),

    #[error("{what} is not supported by a {backend} context")]
    Unsupported {
        what: &'static str,
        backend: BackendKind,
    },

    #[error("texture size {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("invalid device state: {0}")]
    InvalidState(String),
}

/// The GPU driver interface the core talks to. Calls occur on the thread owning the device,
/// and assume the context of the target window has already been made current by the caller.
pub trait RenderDevice: Any {
    fn name(&self) -> &str;

    fn info(&self) -> DeviceInfo;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Switches the device to the rendering model of the window about to be drawn into.
    fn make_current(&mut self, backend: BackendKind);

    /// Creates the system framebuffer of an onscreen window.
    fn create_window_surface(
        &mut self,
        width: u32,
        height: u32,
        multisample: u32,
    ) -> Result<FramebufferId, DeviceError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError>;
    fn upload_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<(), DeviceError>;
    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        multisample: u32,
    ) -> Result<FramebufferId, DeviceError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), DeviceError>;
    fn bind_texture(&mut self, texture: Option<TextureId>, sampler: SamplerState) -> Result<(), DeviceError>;
    fn use_program(&mut self, program: ProgramId);
    fn set_blend(&mut self, blend: BlendState);
    fn set_color_mask(&mut self, mask: ColorMask);
    fn set_line_stipple(&mut self, stipple: Stipple);
    fn set_primitive_smoothing(&mut self, enabled: bool) -> Result<(), DeviceError>;

    /// Native immediate mode. Only classic contexts support it.
    fn immediate_begin(&mut self, kind: PrimitiveKind) -> Result<(), DeviceError>;
    fn immediate_vertex(&mut self, vertex: &Vertex);
    fn immediate_end(&mut self) -> Result<(), DeviceError>;

    /// Draws `vertices`, laid out with [`VERTEX_STRIDE`] floats per vertex, in one call.
    fn draw_arrays(&mut self, kind: PrimitiveKind, vertices: &[f32]) -> Result<(), DeviceError>;

    fn clear(&mut self, color: [f32; 4]) -> Result<(), DeviceError>;

    /// Framebuffer to framebuffer copy, resolving multisampling on the way.
    fn blit_framebuffer(
        &mut self,
        src: FramebufferId,
        dst: FramebufferId,
        src_rect: Rect,
        dst_rect: Rect,
        filter: FilterMode,
    ) -> Result<(), DeviceError>;

    /// Copies `src_rect` of a framebuffer into the top-left corner of a texture.
    fn copy_to_texture(
        &mut self,
        src: FramebufferId,
        src_rect: Rect,
        texture: TextureId,
    ) -> Result<(), DeviceError>;

    /// Reads back normalized RGBA values of `rect`, row by row from the top.
    fn read_pixels(&mut self, framebuffer: FramebufferId, rect: Rect) -> Result<Vec<[f32; 4]>, DeviceError>;

    fn insert_fence(&mut self) -> u64;

    /// Waits for a fence. Returns `false` if it did not signal within `timeout`.
    fn wait_fence(&mut self, fence: u64, timeout: Duration) -> Result<bool, DeviceError>;
}
