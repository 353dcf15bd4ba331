//! Deterministic CPU rasterizer implementing [`RenderDevice`].
//!
//! Coordinates are window pixels with the origin at the top-left corner, pixel centers sit
//! at `+0.5`. Texture coordinates are given in texels. Triangles follow a strict coverage
//! rule so that two triangles sharing an edge never both draw a pixel on it, which keeps
//! quads drawn as one batch or one by one pixel-identical.

use std::any::Any;
use std::time::Duration;

use hashbrown::HashMap;

use crate::blit::FilterMode;
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::{BlendState, ColorMask, Stipple};
use crate::render::backend::{
    BackendKind, DeviceError, DeviceInfo, FramebufferId, PrimitiveKind, ProgramId, RenderDevice,
    SamplerState, TexelFormat, TextureDesc, TextureId, Vertex, WrapMode, VERTEX_STRIDE,
};
use crate::render::caps::GfxCaps;

struct TextureImage {
    width: u32,
    height: u32,
    format: TexelFormat,
    texels: Vec<[f32; 4]>,
}

impl TextureImage {
    fn new(width: u32, height: u32, format: TexelFormat) -> Self {
        Self {
            width,
            height,
            format,
            texels: vec![[0.0; 4]; (width * height) as usize],
        }
    }

    fn fetch(&self, x: i64, y: i64, wrap: WrapMode) -> [f32; 4] {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = match wrap {
            WrapMode::ClampToEdge => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
            WrapMode::Repeat => (x.rem_euclid(w), y.rem_euclid(h)),
        };
        self.texels[(y * w + x) as usize]
    }

    fn sample(&self, sampler: SamplerState, u: f64, v: f64) -> [f32; 4] {
        match sampler.filter {
            FilterMode::Nearest => self.fetch(u.floor() as i64, v.floor() as i64, sampler.wrap),
            // No mip chain is kept: mipmapped modes sample the base level bilinearly.
            FilterMode::Bilinear | FilterMode::MipmapNearest | FilterMode::MipmapLinear => {
                let (x, y) = (u - 0.5, v - 0.5);
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = ((x - x0) as f32, (y - y0) as f32);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let t00 = self.fetch(x0, y0, sampler.wrap);
                let t10 = self.fetch(x0 + 1, y0, sampler.wrap);
                let t01 = self.fetch(x0, y0 + 1, sampler.wrap);
                let t11 = self.fetch(x0 + 1, y0 + 1, sampler.wrap);
                let mut out = [0.0; 4];
                for c in 0..4 {
                    let top = t00[c] + (t10[c] - t00[c]) * fx;
                    let bottom = t01[c] + (t11[c] - t01[c]) * fx;
                    out[c] = top + (bottom - top) * fy;
                }
                out
            }
        }
    }

    fn quantize(&self, color: [f32; 4]) -> [f32; 4] {
        match self.format {
            TexelFormat::Rgba8 => color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() / 255.0),
            TexelFormat::Rgba16F | TexelFormat::Rgba32F => color,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }
}

struct FramebufferObject {
    color: TextureId,
    multisample: u32,
    /// System framebuffer of a window; owns its color storage.
    window_surface: bool,
}

struct Pipeline<'a> {
    sampler: Option<(&'a TextureImage, SamplerState)>,
    blend: BlendState,
    mask: ColorMask,
    stipple: Stipple,
}

impl Pipeline<'_> {
    fn shade(&self, color: [f32; 4], u: f64, v: f64) -> [f32; 4] {
        match self.sampler {
            Some((texture, sampler)) => {
                let texel = texture.sample(sampler, u, v);
                [
                    texel[0] * color[0],
                    texel[1] * color[1],
                    texel[2] * color[2],
                    texel[3] * color[3],
                ]
            }
            None => color,
        }
    }

    fn write(&self, target: &mut TextureImage, x: i64, y: i64, src: [f32; 4]) {
        if x < 0 || y < 0 || x >= target.width as i64 || y >= target.height as i64 {
            return;
        }
        let i = target.index(x as u32, y as u32);
        let dst = target.texels[i];
        let mut out = if self.blend.is_enabled() {
            let sw = self.blend.src.weights(src, dst);
            let dw = self.blend.dst.weights(src, dst);
            [0, 1, 2, 3].map(|c| src[c] * sw[c] + dst[c] * dw[c])
        } else {
            src
        };
        for (c, enabled) in self.mask.0.iter().enumerate() {
            if !enabled {
                out[c] = dst[c];
            }
        }
        target.texels[i] = target.quantize(out);
    }

    fn point(&self, target: &mut TextureImage, v: &Vertex) {
        let color = self.shade(v.color, v.texcoord[0] as f64, v.texcoord[1] as f64);
        self.write(target, v.position[0].floor() as i64, v.position[1].floor() as i64, color);
    }

    fn line(&self, target: &mut TextureImage, a: &Vertex, b: &Vertex, step_offset: u32) -> u32 {
        let (x0, y0) = (a.position[0].floor() as i64, a.position[1].floor() as i64);
        let (x1, y1) = (b.position[0].floor() as i64, b.position[1].floor() as i64);
        let steps = (x1 - x0).abs().max((y1 - y0).abs());
        for i in 0..steps {
            if !self.stipple.covers(step_offset + i as u32) {
                continue;
            }
            let t = i as f32 / steps as f32;
            let lerp = |p: f32, q: f32| p + (q - p) * t;
            let color = [0, 1, 2, 3].map(|c| lerp(a.color[c], b.color[c]));
            let u = lerp(a.texcoord[0], b.texcoord[0]) as f64;
            let v = lerp(a.texcoord[1], b.texcoord[1]) as f64;
            let x = x0 as f64 + (x1 - x0) as f64 * i as f64 / steps as f64;
            let y = y0 as f64 + (y1 - y0) as f64 * i as f64 / steps as f64;
            let shaded = self.shade(color, u, v);
            self.write(target, x.round() as i64, y.round() as i64, shaded);
        }
        steps as u32
    }

    fn triangle(&self, target: &mut TextureImage, a: &Vertex, b: &Vertex, c: &Vertex) {
        let pos = |v: &Vertex| (v.position[0] as f64, v.position[1] as f64);
        let (mut v0, mut v1, v2) = (a, b, c);
        let mut area = edge(pos(v0), pos(v1), pos(v2));
        if area == 0.0 {
            return;
        }
        if area < 0.0 {
            std::mem::swap(&mut v0, &mut v1);
            area = -area;
        }
        let (p0, p1, p2) = (pos(v0), pos(v1), pos(v2));

        let min_x = p0.0.min(p1.0).min(p2.0).floor().max(0.0) as i64;
        let min_y = p0.1.min(p1.1).min(p2.1).floor().max(0.0) as i64;
        let max_x = (p0.0.max(p1.0).max(p2.0).ceil() as i64).min(target.width as i64);
        let max_y = (p0.1.max(p1.1).max(p2.1).ceil() as i64).min(target.height as i64);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = (x as f64 + 0.5, y as f64 + 0.5);
                let w0 = edge(p1, p2, p);
                let w1 = edge(p2, p0, p);
                let w2 = edge(p0, p1, p);
                if !(covers(w0, p1, p2) && covers(w1, p2, p0) && covers(w2, p0, p1)) {
                    continue;
                }
                let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
                let mix = |q0: f32, q1: f32, q2: f32| q0 as f64 * l0 + q1 as f64 * l1 + q2 as f64 * l2;
                let color = [0, 1, 2, 3].map(|i| mix(v0.color[i], v1.color[i], v2.color[i]) as f32);
                let u = mix(v0.texcoord[0], v1.texcoord[0], v2.texcoord[0]);
                let v = mix(v0.texcoord[1], v1.texcoord[1], v2.texcoord[1]);
                let shaded = self.shade(color, u, v);
                self.write(target, x, y, shaded);
            }
        }
    }

    fn draw(&self, target: &mut TextureImage, kind: PrimitiveKind, v: &[Vertex]) {
        let n = v.len();
        match kind {
            PrimitiveKind::Points => v.iter().for_each(|p| self.point(target, p)),
            PrimitiveKind::Lines => {
                for pair in v.chunks_exact(2) {
                    self.line(target, &pair[0], &pair[1], 0);
                }
            }
            PrimitiveKind::LineStrip | PrimitiveKind::LineLoop => {
                let mut offset = 0;
                for i in 1..n {
                    offset += self.line(target, &v[i - 1], &v[i], offset);
                }
                if kind == PrimitiveKind::LineLoop && n > 2 {
                    self.line(target, &v[n - 1], &v[0], offset);
                }
            }
            PrimitiveKind::Triangles => {
                for tri in v.chunks_exact(3) {
                    self.triangle(target, &tri[0], &tri[1], &tri[2]);
                }
            }
            PrimitiveKind::TriangleStrip => {
                for i in 0..n.saturating_sub(2) {
                    if i % 2 == 0 {
                        self.triangle(target, &v[i], &v[i + 1], &v[i + 2]);
                    } else {
                        self.triangle(target, &v[i + 1], &v[i], &v[i + 2]);
                    }
                }
            }
            PrimitiveKind::TriangleFan | PrimitiveKind::Polygon => {
                for i in 1..n.saturating_sub(1) {
                    self.triangle(target, &v[0], &v[i], &v[i + 1]);
                }
            }
            PrimitiveKind::Quads => {
                for q in v.chunks_exact(4) {
                    self.triangle(target, &q[0], &q[1], &q[2]);
                    self.triangle(target, &q[0], &q[2], &q[3]);
                }
            }
        }
    }
}

fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

// A pixel center exactly on an edge belongs to only one of the two triangles sharing it.
fn covers(w: f64, a: (f64, f64), b: (f64, f64)) -> bool {
    if w != 0.0 {
        return w > 0.0;
    }
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    dy < 0.0 || (dy == 0.0 && dx > 0.0)
}

/// CPU implementation of the device interface, used for tests and headless rendering.
pub struct SoftwareDevice {
    info: DeviceInfo,
    next_id: u32,
    textures: HashMap<TextureId, TextureImage>,
    framebuffers: HashMap<FramebufferId, FramebufferObject>,
    current: BackendKind,
    framebuffer: Option<FramebufferId>,
    texture: Option<(TextureId, SamplerState)>,
    program: ProgramId,
    blend: BlendState,
    mask: ColorMask,
    stipple: Stipple,
    smoothing: bool,
    immediate: Option<(PrimitiveKind, Vec<Vertex>)>,
    fence: u64,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::with_caps(GfxCaps::all())
    }

    pub fn with_caps(caps: GfxCaps) -> Self {
        Self {
            info: DeviceInfo {
                name: "software".into(),
                max_texture_size: 16384,
                caps,
            },
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            current: BackendKind::Classic,
            framebuffer: None,
            texture: None,
            program: ProgramId::NONE,
            blend: BlendState::default(),
            mask: ColorMask::default(),
            stipple: Stipple::default(),
            smoothing: false,
            immediate: None,
            fence: 0,
        }
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.info.max_texture_size = size;
        self
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn bound_program(&self) -> ProgramId {
        self.program
    }

    pub fn smoothing(&self) -> bool {
        self.smoothing
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn color_of(&self, framebuffer: FramebufferId) -> Result<TextureId, DeviceError> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| fb.color)
            .ok_or(DeviceError::UnknownFramebuffer(framebuffer))
    }

    fn render(&mut self, kind: PrimitiveKind, vertices: &[Vertex]) -> Result<(), DeviceError> {
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| DeviceError::InvalidState("draw without a bound framebuffer".into()))?;
        let color = self.color_of(framebuffer)?;
        let mut target = self.textures.remove(&color).ok_or(DeviceError::UnknownTexture(color))?;

        let result = (|| {
            let sampler = match self.texture {
                Some((id, _)) if id == color => {
                    return Err(DeviceError::InvalidState(format!(
                        "texture {id:?} is both sampled and rendered into"
                    )))
                }
                Some((id, state)) => Some((
                    self.textures.get(&id).ok_or(DeviceError::UnknownTexture(id))?,
                    state,
                )),
                None => None,
            };
            let pipeline = Pipeline {
                sampler,
                blend: self.blend,
                mask: self.mask,
                stipple: self.stipple,
            };
            pipeline.draw(&mut target, kind, vertices);
            Ok(())
        })();

        self.textures.insert(color, target);
        result
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for SoftwareDevice {
    fn name(&self) -> &str {
        "SoftwareDevice"
    }

    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn make_current(&mut self, backend: BackendKind) {
        self.current = backend;
    }

    fn create_window_surface(&mut self, width: u32, height: u32, multisample: u32) -> Result<FramebufferId, DeviceError> {
        let color = self.create_texture(&TextureDesc {
            width,
            height,
            format: TexelFormat::Rgba8,
        })?;
        let id = FramebufferId(self.alloc_id());
        self.framebuffers.insert(
            id,
            FramebufferObject {
                color,
                multisample,
                window_surface: true,
            },
        );
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError> {
        let max = self.info.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DeviceError::TextureTooLarge {
                width: desc.width,
                height: desc.height,
                max,
            });
        }
        let id = TextureId(self.alloc_id());
        self.textures.insert(id, TextureImage::new(desc.width, desc.height, desc.format));
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<(), DeviceError> {
        let image = self.textures.get_mut(&texture).ok_or(DeviceError::UnknownTexture(texture))?;
        if image.width != pixels.width || image.height != pixels.height {
            return Err(DeviceError::InvalidState(format!(
                "upload of {}x{} pixels into {}x{} texture",
                pixels.width, pixels.height, image.width, image.height
            )));
        }
        let texels: Vec<_> = pixels.to_rgba_f32().into_iter().map(|t| image.quantize(t)).collect();
        image.texels = texels;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            log::debug!("delete of unknown texture {texture:?} ignored");
        }
        if matches!(self.texture, Some((id, _)) if id == texture) {
            self.texture = None;
        }
    }

    fn create_framebuffer(&mut self, color: TextureId, multisample: u32) -> Result<FramebufferId, DeviceError> {
        if !self.textures.contains_key(&color) {
            return Err(DeviceError::UnknownTexture(color));
        }
        let id = FramebufferId(self.alloc_id());
        self.framebuffers.insert(
            id,
            FramebufferObject {
                color,
                multisample,
                window_surface: false,
            },
        );
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        match self.framebuffers.remove(&framebuffer) {
            Some(fb) if fb.window_surface => {
                self.textures.remove(&fb.color);
            }
            Some(_) => {}
            None => log::debug!("delete of unknown framebuffer {framebuffer:?} ignored"),
        }
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<(), DeviceError> {
        if !self.framebuffers.contains_key(&framebuffer) {
            return Err(DeviceError::UnknownFramebuffer(framebuffer));
        }
        self.framebuffer = Some(framebuffer);
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureId>, sampler: SamplerState) -> Result<(), DeviceError> {
        match texture {
            Some(id) if !self.textures.contains_key(&id) => Err(DeviceError::UnknownTexture(id)),
            Some(id) => {
                self.texture = Some((id, sampler));
                Ok(())
            }
            None => {
                self.texture = None;
                Ok(())
            }
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        // Shaders are not executed; the binding is only tracked.
        self.program = program;
    }

    fn set_blend(&mut self, blend: BlendState) {
        self.blend = blend;
    }

    fn set_color_mask(&mut self, mask: ColorMask) {
        self.mask = mask;
    }

    fn set_line_stipple(&mut self, stipple: Stipple) {
        self.stipple = stipple;
    }

    fn set_primitive_smoothing(&mut self, enabled: bool) -> Result<(), DeviceError> {
        if !enabled && self.current == BackendKind::Embedded {
            return Err(DeviceError::Unsupported {
                what: "disabling primitive smoothing",
                backend: self.current,
            });
        }
        self.smoothing = enabled;
        Ok(())
    }

    fn immediate_begin(&mut self, kind: PrimitiveKind) -> Result<(), DeviceError> {
        if self.current != BackendKind::Classic {
            return Err(DeviceError::Unsupported {
                what: "immediate mode",
                backend: self.current,
            });
        }
        if self.immediate.is_some() {
            return Err(DeviceError::InvalidState("immediate_begin inside begin/end".into()));
        }
        self.immediate = Some((kind, Vec::new()));
        Ok(())
    }

    fn immediate_vertex(&mut self, vertex: &Vertex) {
        if let Some((_, vertices)) = self.immediate.as_mut() {
            vertices.push(*vertex);
        }
    }

    fn immediate_end(&mut self) -> Result<(), DeviceError> {
        let (kind, vertices) = self
            .immediate
            .take()
            .ok_or_else(|| DeviceError::InvalidState("immediate_end without begin".into()))?;
        self.render(kind, &vertices)
    }

    fn draw_arrays(&mut self, kind: PrimitiveKind, vertices: &[f32]) -> Result<(), DeviceError> {
        if kind.is_legacy_only() && self.current != BackendKind::Classic {
            return Err(DeviceError::Unsupported {
                what: "quad and polygon primitives",
                backend: self.current,
            });
        }
        let vertices: Vec<Vertex> = vertices.chunks_exact(VERTEX_STRIDE).map(Vertex::from_slice).collect();
        self.render(kind, &vertices)
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| DeviceError::InvalidState("clear without a bound framebuffer".into()))?;
        let id = self.color_of(framebuffer)?;
        let mask = self.mask;
        let image = self.textures.get_mut(&id).ok_or(DeviceError::UnknownTexture(id))?;
        let value = image.quantize(color);
        for texel in image.texels.iter_mut() {
            for c in 0..4 {
                if mask.0[c] {
                    texel[c] = value[c];
                }
            }
        }
        Ok(())
    }

    fn blit_framebuffer(
        &mut self,
        src: FramebufferId,
        dst: FramebufferId,
        src_rect: Rect,
        dst_rect: Rect,
        filter: FilterMode,
    ) -> Result<(), DeviceError> {
        let src_color = self.color_of(src)?;
        let dst_color = self.color_of(dst)?;
        if !self.textures.contains_key(&src_color) {
            return Err(DeviceError::UnknownTexture(src_color));
        }
        let resolving = self.framebuffers.get(&src).map(|fb| fb.multisample).unwrap_or(0) > 0
            && self.framebuffers.get(&dst).map(|fb| fb.multisample).unwrap_or(0) == 0;
        if resolving && !src_rect.same_size(&dst_rect) {
            return Err(DeviceError::InvalidState("multisample resolve blits cannot scale".into()));
        }
        let mut target = self.textures.remove(&dst_color).ok_or(DeviceError::UnknownTexture(dst_color))?;

        let snapshot;
        let source = match self.textures.get(&src_color) {
            Some(texture) => texture,
            None => {
                // Copy within one framebuffer: read from a snapshot.
                snapshot = TextureImage {
                    width: target.width,
                    height: target.height,
                    format: target.format,
                    texels: target.texels.clone(),
                };
                &snapshot
            }
        };

        let sampler = SamplerState {
            filter,
            wrap: WrapMode::ClampToEdge,
        };
        let (dx, dy, dw, dh) = dst_rect.to_pixels();
        let sx_scale = src_rect.width() / dst_rect.width();
        let sy_scale = src_rect.height() / dst_rect.height();
        for y in dy.max(0)..(dy + dh as i32).min(target.height as i32) {
            for x in dx.max(0)..(dx + dw as i32).min(target.width as i32) {
                let u = src_rect.left + (x as f64 + 0.5 - dst_rect.left) * sx_scale;
                let v = src_rect.top + (y as f64 + 0.5 - dst_rect.top) * sy_scale;
                let value = source.sample(sampler, u, v);
                let i = target.index(x as u32, y as u32);
                target.texels[i] = target.quantize(value);
            }
        }

        self.textures.insert(dst_color, target);
        Ok(())
    }

    fn copy_to_texture(&mut self, src: FramebufferId, src_rect: Rect, texture: TextureId) -> Result<(), DeviceError> {
        let src_color = self.color_of(src)?;
        let (sx, sy, w, h) = src_rect.to_pixels();
        let region = {
            let source = self.textures.get(&src_color).ok_or(DeviceError::UnknownTexture(src_color))?;
            let mut out = Vec::with_capacity((w * h) as usize);
            for y in 0..h as i64 {
                for x in 0..w as i64 {
                    out.push(source.fetch(sx as i64 + x, sy as i64 + y, WrapMode::ClampToEdge));
                }
            }
            out
        };
        let image = self.textures.get_mut(&texture).ok_or(DeviceError::UnknownTexture(texture))?;
        if image.width < w || image.height < h {
            return Err(DeviceError::InvalidState(format!(
                "copy of {w}x{h} pixels into {}x{} texture",
                image.width, image.height
            )));
        }
        for y in 0..h {
            for x in 0..w {
                let i = image.index(x, y);
                image.texels[i] = image.quantize(region[(y * w + x) as usize]);
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, framebuffer: FramebufferId, rect: Rect) -> Result<Vec<[f32; 4]>, DeviceError> {
        let id = self.color_of(framebuffer)?;
        let image = self.textures.get(&id).ok_or(DeviceError::UnknownTexture(id))?;
        let (x0, y0, w, h) = rect.to_pixels();
        if x0 < 0 || y0 < 0 || x0 as u32 + w > image.width || y0 as u32 + h > image.height {
            return Err(DeviceError::InvalidState(format!(
                "read of {rect:?} outside of {}x{} framebuffer",
                image.width, image.height
            )));
        }
        let mut out = Vec::with_capacity((w * h) as usize);
        for y in y0 as u32..y0 as u32 + h {
            for x in x0 as u32..x0 as u32 + w {
                out.push(image.texels[image.index(x, y)]);
            }
        }
        Ok(out)
    }

    fn insert_fence(&mut self) -> u64 {
        self.fence += 1;
        self.fence
    }

    fn wait_fence(&mut self, fence: u64, _timeout: Duration) -> Result<bool, DeviceError> {
        // Rendering is synchronous, so every issued fence has signaled.
        Ok(fence <= self.fence)
    }
}
