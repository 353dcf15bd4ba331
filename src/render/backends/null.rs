use std::any::Any;
use std::time::Duration;

use crate::blit::FilterMode;
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::{BlendState, ColorMask, Stipple};
use crate::render::backend::{
    BackendKind, DeviceError, DeviceInfo, FramebufferId, PrimitiveKind, ProgramId, RenderDevice,
    SamplerState, TextureDesc, TextureId, Vertex, VERTEX_STRIDE,
};
use crate::render::caps::GfxCaps;

/// One call received by a [`NullDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    MakeCurrent(BackendKind),
    CreateWindowSurface { width: u32, height: u32 },
    CreateTexture(TextureId),
    UploadTexture(TextureId),
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(FramebufferId),
    BindTexture(Option<TextureId>),
    UseProgram(ProgramId),
    SetBlend(BlendState),
    SetColorMask(ColorMask),
    SetLineStipple(Stipple),
    SetSmoothing(bool),
    ImmediateBegin(PrimitiveKind),
    ImmediateVertex,
    ImmediateEnd,
    DrawArrays { kind: PrimitiveKind, vertices: usize },
    Clear,
    BlitFramebuffer { src: FramebufferId, dst: FramebufferId },
    CopyToTexture { src: FramebufferId, texture: TextureId },
    ReadPixels(FramebufferId),
    WaitFence(u64),
}

/// Device that draws nothing and records every call it receives.
pub struct NullDevice {
    caps: GfxCaps,
    next_id: u32,
    current: BackendKind,
    calls: Vec<DeviceCall>,
    fence: u64,
    /// Fences never signal; waits run into their timeout.
    stalled: bool,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::with_caps(GfxCaps::all())
    }

    pub fn with_caps(caps: GfxCaps) -> Self {
        Self {
            caps,
            next_id: 1,
            current: BackendKind::Classic,
            calls: Vec::new(),
            fence: 0,
            stalled: false,
        }
    }

    /// Simulates a GPU that never finishes its work.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for NullDevice {
    fn name(&self) -> &str {
        "NullDevice"
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "null".into(),
            max_texture_size: 16384,
            caps: self.caps,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn make_current(&mut self, backend: BackendKind) {
        self.current = backend;
        self.calls.push(DeviceCall::MakeCurrent(backend));
    }

    fn create_window_surface(&mut self, width: u32, height: u32, _multisample: u32) -> Result<FramebufferId, DeviceError> {
        self.calls.push(DeviceCall::CreateWindowSurface { width, height });
        Ok(FramebufferId(self.alloc_id()))
    }

    fn create_texture(&mut self, _desc: &TextureDesc) -> Result<TextureId, DeviceError> {
        let id = TextureId(self.alloc_id());
        self.calls.push(DeviceCall::CreateTexture(id));
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, _pixels: &PixelBuffer) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::UploadTexture(texture));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self, _color: TextureId, _multisample: u32) -> Result<FramebufferId, DeviceError> {
        let id = FramebufferId(self.alloc_id());
        self.calls.push(DeviceCall::CreateFramebuffer(id));
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureId>, _sampler: SamplerState) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::BindTexture(texture));
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn set_blend(&mut self, blend: BlendState) {
        self.calls.push(DeviceCall::SetBlend(blend));
    }

    fn set_color_mask(&mut self, mask: ColorMask) {
        self.calls.push(DeviceCall::SetColorMask(mask));
    }

    fn set_line_stipple(&mut self, stipple: Stipple) {
        self.calls.push(DeviceCall::SetLineStipple(stipple));
    }

    fn set_primitive_smoothing(&mut self, enabled: bool) -> Result<(), DeviceError> {
        if !enabled && self.current == BackendKind::Embedded {
            return Err(DeviceError::Unsupported {
                what: "disabling primitive smoothing",
                backend: self.current,
            });
        }
        self.calls.push(DeviceCall::SetSmoothing(enabled));
        Ok(())
    }

    fn immediate_begin(&mut self, kind: PrimitiveKind) -> Result<(), DeviceError> {
        if self.current != BackendKind::Classic {
            return Err(DeviceError::Unsupported {
                what: "immediate mode",
                backend: self.current,
            });
        }
        self.calls.push(DeviceCall::ImmediateBegin(kind));
        Ok(())
    }

    fn immediate_vertex(&mut self, _vertex: &Vertex) {
        self.calls.push(DeviceCall::ImmediateVertex);
    }

    fn immediate_end(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::ImmediateEnd);
        Ok(())
    }

    fn draw_arrays(&mut self, kind: PrimitiveKind, vertices: &[f32]) -> Result<(), DeviceError> {
        if kind.is_legacy_only() && self.current != BackendKind::Classic {
            return Err(DeviceError::Unsupported {
                what: "quad and polygon primitives",
                backend: self.current,
            });
        }
        self.calls.push(DeviceCall::DrawArrays {
            kind,
            vertices: vertices.len() / VERTEX_STRIDE,
        });
        Ok(())
    }

    fn clear(&mut self, _color: [f32; 4]) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Clear);
        Ok(())
    }

    fn blit_framebuffer(
        &mut self,
        src: FramebufferId,
        dst: FramebufferId,
        _src_rect: Rect,
        _dst_rect: Rect,
        _filter: FilterMode,
    ) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::BlitFramebuffer { src, dst });
        Ok(())
    }

    fn copy_to_texture(&mut self, src: FramebufferId, _src_rect: Rect, texture: TextureId) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::CopyToTexture { src, texture });
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: FramebufferId, rect: Rect) -> Result<Vec<[f32; 4]>, DeviceError> {
        self.calls.push(DeviceCall::ReadPixels(framebuffer));
        let (_, _, w, h) = rect.to_pixels();
        Ok(vec![[0.0; 4]; (w * h) as usize])
    }

    fn insert_fence(&mut self) -> u64 {
        self.fence += 1;
        self.fence
    }

    fn wait_fence(&mut self, fence: u64, timeout: Duration) -> Result<bool, DeviceError> {
        self.calls.push(DeviceCall::WaitFence(fence));
        if self.stalled {
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
            return Ok(false);
        }
        Ok(true)
    }
}
