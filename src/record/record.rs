use std::sync::Arc;

use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::fbo::{FboDescriptor, FboRole, FboTable};
use crate::record::kind::WindowKind;
use crate::record::state::{
    BlendState, ColorMask, GammaTable, ShaderBindings, SpecialFlags, StereoDrawBuffer, Stipple,
};
use crate::registry::{Handle, Registry};
use crate::render::backend::{
    BackendKind, ContextDomain, FramebufferId, ProgramId, RenderDevice, TexelFormat, TextureDesc,
    TextureId,
};
use crate::render::caps::GfxCaps;
use crate::render::color::{ColorRange, ColorState};
use crate::render::group::PrimitiveGroup;
use crate::render::path::{path_for, DrawPath};

/// Pixel storage of a texture or offscreen window.
///
/// A texture starts out with the CPU buffer it was created from. The first time it is drawn
/// the buffer moves into a GPU texture and the CPU copy is dropped, so at most one of the two
/// exists at any time.
#[derive(Debug, Default)]
pub enum TextureStore {
    #[default]
    Unallocated,
    Cpu(PixelBuffer),
    Gpu(TextureId),
}

impl TextureStore {
    pub fn texture_id(&self) -> Option<TextureId> {
        match self {
            TextureStore::Gpu(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self, TextureStore::Gpu(_))
    }
}

/// Snapshot of the state a child record inherits from its parent.
#[derive(Clone, Debug)]
pub struct SharedState {
    pub parent: Handle,
    pub domain: ContextDomain,
    pub default_draw: ProgramId,
    pub unclamped_draw: ProgramId,
    pub color_range: ColorRange,
    pub caps: GfxCaps,
    pub max_texture_size: u32,
    pub backend: BackendKind,
    pub path: Arc<dyn DrawPath>,
}

/// One onscreen window, offscreen window, texture or proxy.
pub struct ResourceRecord {
    handle: Handle,
    kind: WindowKind,
    valid: bool,

    pub rect: Rect,
    pub depth: u32,
    pub channels: u8,
    pub bpc: u8,
    pub multisample: u32,
    pub store: TextureStore,

    pub fbos: FboTable,
    /// Framebuffer provided by the windowing system, onscreen windows only.
    pub system_framebuffer: Option<FramebufferId>,
    pub stereo: bool,
    pub stereo_draw_buffer: StereoDrawBuffer,
    pub shaders: ShaderBindings,
    pub blend: BlendState,
    pub color_mask: ColorMask,
    pub stipple: Stipple,
    pub color: ColorState,
    pub color_range: ColorRange,
    pub antialiasing: bool,
    pub special_flags: SpecialFlags,

    pub caps: GfxCaps,
    pub max_texture_size: u32,
    pub backend: BackendKind,
    pub path: Arc<dyn DrawPath>,
    pub domain: ContextDomain,
    pub parent: Option<Handle>,

    pub group: Option<PrimitiveGroup>,
    pub smoothing_warned: bool,
    pub pending_gamma: Option<Box<GammaTable>>,
}

impl ResourceRecord {
    pub(crate) fn new(handle: Handle, kind: WindowKind) -> Self {
        Self {
            handle,
            kind,
            valid: false,
            rect: Rect::default(),
            depth: 32,
            channels: 4,
            bpc: 8,
            multisample: 0,
            store: TextureStore::Unallocated,
            fbos: FboTable::default(),
            system_framebuffer: None,
            stereo: false,
            stereo_draw_buffer: StereoDrawBuffer::None,
            shaders: ShaderBindings::default(),
            blend: BlendState::default(),
            color_mask: ColorMask::default(),
            stipple: Stipple::default(),
            color: ColorState::default(),
            color_range: ColorRange::default(),
            antialiasing: false,
            special_flags: SpecialFlags::empty(),
            caps: GfxCaps::empty(),
            max_texture_size: 0,
            backend: BackendKind::Classic,
            path: path_for(BackendKind::Classic),
            domain: ContextDomain::unassigned(),
            parent: None,
            group: None,
            smoothing_warned: false,
            pending_gamma: None,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self) {
        self.valid = true;
    }

    /// Sets the backend kind of a top-level window along with its draw path.
    pub(crate) fn set_backend(&mut self, backend: BackendKind) {
        self.backend = backend;
        self.path = path_for(backend);
    }

    /// Links this record to `parent` and takes over the context state it shares with it.
    ///
    /// The state is copied once. Later changes to the parent do not reach the child.
    pub fn assign_parent(&mut self, parent: &ResourceRecord) {
        self.inherit(parent.shared_state());
    }

    /// Context state children copy from their parent.
    pub fn shared_state(&self) -> SharedState {
        SharedState {
            parent: self.handle,
            domain: self.domain,
            default_draw: self.shaders.default_draw,
            unclamped_draw: self.shaders.unclamped_draw,
            color_range: self.color_range,
            caps: self.caps,
            max_texture_size: self.max_texture_size,
            backend: self.backend,
            path: Arc::clone(&self.path),
        }
    }

    pub fn inherit(&mut self, shared: SharedState) {
        self.parent = Some(shared.parent);
        self.domain = shared.domain;
        self.shaders.default_draw = shared.default_draw;
        self.shaders.unclamped_draw = shared.unclamped_draw;
        self.shaders.current = shared.default_draw;
        self.color_range = shared.color_range;
        self.caps = shared.caps;
        self.max_texture_size = shared.max_texture_size;
        self.backend = shared.backend;
        self.path = shared.path;
    }

    /// Follows parent links up to the owning top-level window.
    ///
    /// Windows are their own root. A parent that has been closed in the meantime ends the
    /// walk at the last record still alive.
    pub fn resolve_root(&self, registry: &Registry) -> Handle {
        let mut root = self.handle;
        let mut next = self.parent;
        let mut hops = 0;
        while let Some(parent) = next {
            match registry.lookup(parent) {
                Ok(record) => {
                    root = parent;
                    next = record.parent;
                }
                Err(e) => {
                    log::debug!("Window[{}]: parent {} is gone ({e})", self.handle, parent);
                    break;
                }
            }
            hops += 1;
            if hops > registry.live() {
                log::error!("Window[{}]: parent chain does not terminate", self.handle);
                break;
            }
        }
        root
    }

    pub fn texel_format(&self) -> TexelFormat {
        match self.bpc {
            16 => TexelFormat::Rgba16F,
            32 => TexelFormat::Rgba32F,
            _ => TexelFormat::Rgba8,
        }
    }

    pub fn is_fbo_backed(&self) -> bool {
        self.fbos.contains(FboRole::LeftEye)
    }

    /// Exact power-of-two textures may repeat when sampled outside their bounds.
    pub fn is_power_of_two(&self) -> bool {
        let (w, h) = (self.rect.width(), self.rect.height());
        w >= 1.0 && h >= 1.0 && (w as u32).is_power_of_two() && (h as u32).is_power_of_two()
    }

    /// Returns the GPU texture of this record, uploading its CPU buffer first if needed.
    pub fn ensure_texture(&mut self, device: &mut dyn RenderDevice) -> Result<TextureId> {
        match &self.store {
            TextureStore::Gpu(id) => Ok(*id),
            TextureStore::Cpu(pixels) => {
                if self.max_texture_size > 0
                    && (pixels.width > self.max_texture_size || pixels.height > self.max_texture_size)
                {
                    return Err(ScreenError::invalid_argument(
                        "texture",
                        format!(
                            "{}x{} exceeds the maximum texture size {}",
                            pixels.width, pixels.height, self.max_texture_size
                        ),
                    ));
                }
                let desc = TextureDesc {
                    width: pixels.width,
                    height: pixels.height,
                    format: self.texel_format(),
                };
                let id = device.create_texture(&desc)?;
                if let Err(e) = device.upload_texture(id, pixels) {
                    device.delete_texture(id);
                    return Err(e.into());
                }
                log::debug!("Window[{}]: uploaded {}x{} texture as {:?}", self.handle, desc.width, desc.height, id);
                self.store = TextureStore::Gpu(id);
                Ok(id)
            }
            TextureStore::Unallocated => Err(ScreenError::WrongKind {
                handle: self.handle,
                expected: "texture or window",
                actual: self.kind.name(),
            }),
        }
    }

    /// Framebuffer that drawing commands for this record go to.
    ///
    /// Textures get an FBO on first use as a drawing target.
    pub fn drawing_framebuffer(&mut self, device: &mut dyn RenderDevice) -> Result<FramebufferId> {
        match self.kind {
            WindowKind::Proxy => Err(ScreenError::WrongKind {
                handle: self.handle,
                expected: "window or texture",
                actual: self.kind.name(),
            }),
            WindowKind::Onscreen => {
                let role = match self.stereo_draw_buffer {
                    StereoDrawBuffer::Right if self.fbos.contains(FboRole::RightEye) => FboRole::RightEye,
                    _ => FboRole::LeftEye,
                };
                self.fbos
                    .get(role)
                    .map(|d| d.fbo)
                    .or(self.system_framebuffer)
                    .ok_or(ScreenError::CorruptRecord { handle: self.handle })
            }
            WindowKind::Offscreen => self
                .fbos
                .get(FboRole::LeftEye)
                .map(|d| d.fbo)
                .ok_or(ScreenError::CorruptRecord { handle: self.handle }),
            WindowKind::Texture => {
                if let Some(desc) = self.fbos.get(FboRole::LeftEye) {
                    return Ok(desc.fbo);
                }
                let color = self.ensure_texture(device)?;
                let fbo = device.create_framebuffer(color, 0)?;
                let (_, _, width, height) = self.rect.to_pixels();
                self.fbos.insert(
                    FboRole::LeftEye,
                    FboDescriptor {
                        fbo,
                        color,
                        owns_color: false,
                        width,
                        height,
                        multisample: 0,
                    },
                );
                Ok(fbo)
            }
        }
    }

    /// Makes this record the current drawing target and applies its drawing state.
    pub fn bind_for_drawing(&mut self, device: &mut dyn RenderDevice) -> Result<FramebufferId> {
        device.make_current(self.backend);
        let fbo = self.drawing_framebuffer(device)?;
        device.bind_framebuffer(fbo)?;
        device.set_blend(self.blend);
        device.set_color_mask(self.color_mask);
        device.set_line_stipple(self.stipple);
        device.use_program(self.shaders.current);
        Ok(fbo)
    }

    /// Deletes all GPU objects of this record, then drops its CPU pixel buffer.
    pub fn release_gpu_objects(&mut self, device: &mut dyn RenderDevice) {
        for (_, desc) in self.fbos.drain_sorted() {
            device.delete_framebuffer(desc.fbo);
            if desc.owns_color {
                device.delete_texture(desc.color);
            }
        }
        if let Some(id) = self.store.texture_id() {
            device.delete_texture(id);
        }
        if let Some(fbo) = self.system_framebuffer.take() {
            device.delete_framebuffer(fbo);
        }
        self.store = TextureStore::Unallocated;
    }
}

impl std::fmt::Debug for ResourceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRecord")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("valid", &self.valid)
            .field("rect", &self.rect)
            .field("backend", &self.backend)
            .field("parent", &self.parent)
            .field("fbos", &self.fbos.len())
            .finish()
    }
}
