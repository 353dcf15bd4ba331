use crate::blit::options::{BlitOptions, FilterMode};
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::record::{ResourceRecord, SpecialFlags};
use crate::registry::Handle;
use crate::render::backend::{
    PrimitiveKind, ProgramId, RenderDevice, SamplerState, TextureId, Vertex, WrapMode,
};
use crate::render::color::ColorState;
use crate::render::group::PrimitiveGroup;

/// Everything a blit needs to know about its source, taken from the source record.
#[derive(Clone, Debug)]
pub(crate) struct TextureSource {
    pub handle: Handle,
    pub texture: TextureId,
    pub rect: Rect,
    pub special_flags: SpecialFlags,
    pub filter_shader: ProgramId,
    pub power_of_two: bool,
}

impl TextureSource {
    /// Uploads the source's pixels if they are still on the CPU.
    pub fn prepare(record: &mut ResourceRecord, device: &mut dyn RenderDevice) -> Result<Self> {
        if !record.kind().has_pixels() {
            return Err(ScreenError::WrongKind {
                handle: record.handle(),
                expected: "texture or window",
                actual: record.kind().name(),
            });
        }
        let texture = record.ensure_texture(device)?;
        Ok(Self {
            handle: record.handle(),
            texture,
            rect: record.rect,
            special_flags: record.special_flags,
            filter_shader: record.shaders.texture_filter,
            power_of_two: record.is_power_of_two(),
        })
    }

    pub fn sampler(&self, filter: FilterMode) -> SamplerState {
        SamplerState {
            filter,
            wrap: if self.power_of_two {
                WrapMode::Repeat
            } else {
                WrapMode::ClampToEdge
            },
        }
    }

    /// Program to bind for drawing with `options`, if any replaces the target's own.
    pub fn program(&self, options: &BlitOptions) -> Option<ProgramId> {
        options.shader.or_else(|| {
            (options.filter != FilterMode::Nearest && !self.filter_shader.is_none()).then_some(self.filter_shader)
        })
    }
}

enum Rotation {
    None,
    Quad(f64),
    TexCoords(f64),
}

fn rotation(angle: f64, flags: SpecialFlags) -> Result<Rotation> {
    let by_texcoords = flags.contains(SpecialFlags::USE_TEXTURE_MATRIX_FOR_ROTATION);
    let suppressed = flags.contains(SpecialFlags::DONT_DO_ROTATION);
    if angle != 0.0 && by_texcoords && suppressed {
        return Err(ScreenError::ConflictingRotationMode);
    }
    Ok(match angle {
        a if a == 0.0 || suppressed => Rotation::None,
        a if by_texcoords => Rotation::TexCoords(a),
        a => Rotation::Quad(a),
    })
}

/// Fails early, before any state changes, when a rotation cannot be honored.
pub(crate) fn check_rotation(angle: f64, flags: SpecialFlags) -> Result<()> {
    rotation(angle, flags).map(|_| ())
}

fn rotate(point: (f64, f64), center: (f64, f64), degrees: f64) -> (f64, f64) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (dx, dy) = (point.0 - center.0, point.1 - center.1);
    (center.0 + dx * cos - dy * sin, center.1 + dx * sin + dy * cos)
}

/// The four corners of a blit quad, top-left first, clockwise.
///
/// With y pointing down, positive angles turn the image clockwise on screen.
pub(crate) fn quad_vertices(
    src: Rect,
    dst: Rect,
    angle: f64,
    flags: SpecialFlags,
    color: [f32; 4],
) -> Result<[Vertex; 4]> {
    let positions = [
        (dst.left, dst.top),
        (dst.right, dst.top),
        (dst.right, dst.bottom),
        (dst.left, dst.bottom),
    ];
    let texcoords = [
        (src.left, src.top),
        (src.right, src.top),
        (src.right, src.bottom),
        (src.left, src.bottom),
    ];

    let (positions, texcoords) = match rotation(angle, flags)? {
        Rotation::None => (positions, texcoords),
        Rotation::Quad(a) => (positions.map(|p| rotate(p, dst.center(), a)), texcoords),
        // turning the lookup the other way turns the image the same way as the quad would
        Rotation::TexCoords(a) => (positions, texcoords.map(|t| rotate(t, src.center(), -a))),
    };

    let mut out = [Vertex {
        position: [0.0, 0.0, 0.0, 1.0],
        color,
        texcoord: [0.0, 0.0, 0.0, 1.0],
    }; 4];
    for (i, v) in out.iter_mut().enumerate() {
        v.position[0] = positions[i].0 as f32;
        v.position[1] = positions[i].1 as f32;
        v.texcoord[0] = texcoords[i].0 as f32;
        v.texcoord[1] = texcoords[i].1 as f32;
    }
    Ok(out)
}

/// Vertex color of a blit: the modulation color if given, else white at `global_alpha`.
pub(crate) fn blit_color(options: &BlitOptions, target: &ResourceRecord) -> [f32; 4] {
    match options.modulate_color {
        Some(rgba) => ColorState::from_host(rgba, &target.color_range).clamped,
        None => [1.0, 1.0, 1.0, options.global_alpha as f32],
    }
}

/// Draws `src_rect` of `source` into `dst_rect` of `target`.
///
/// Rects must already be checked against their records. Empty rects draw nothing.
pub(crate) fn blit_texture(
    device: &mut dyn RenderDevice,
    source: &TextureSource,
    target: &mut ResourceRecord,
    src_rect: Rect,
    dst_rect: Rect,
    options: &BlitOptions,
    capacity: usize,
) -> Result<()> {
    options.validate()?;
    let flags = options.flags() | source.special_flags;
    let vertices = quad_vertices(src_rect, dst_rect, options.rotation_deg, flags, blit_color(options, target))?;
    if src_rect.is_empty() || dst_rect.is_empty() {
        return Ok(());
    }
    if target.group.is_some() {
        return Err(ScreenError::AlreadyInGroup { handle: target.handle() });
    }

    target.bind_for_drawing(device)?;
    device.bind_texture(Some(source.texture), source.sampler(options.filter))?;
    let program = source.program(options);
    if let Some(program) = program {
        device.use_program(program);
    }

    let mut group = PrimitiveGroup::new(target.handle(), PrimitiveKind::Quads, ColorState::default(), false, capacity);
    let path = target.path.clone();
    let result = (|| {
        path.begin(device, &mut group)?;
        for v in vertices {
            path.vertex(device, &mut group, v);
        }
        path.end(device, &mut group)
    })();

    device.bind_texture(None, source.sampler(options.filter))?;
    if program.is_some() {
        device.use_program(target.shaders.current);
    }
    result
}
