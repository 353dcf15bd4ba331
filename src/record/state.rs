use serde::Serialize;

use crate::errors::ScreenError;
use crate::render::backend::ProgramId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Parses the host-facing `GL_*` factor names.
    pub fn from_name(name: &str) -> Result<Self, ScreenError> {
        let factor = match name {
            "GL_ZERO" => BlendFactor::Zero,
            "GL_ONE" => BlendFactor::One,
            "GL_SRC_COLOR" => BlendFactor::SrcColor,
            "GL_ONE_MINUS_SRC_COLOR" => BlendFactor::OneMinusSrcColor,
            "GL_DST_COLOR" => BlendFactor::DstColor,
            "GL_ONE_MINUS_DST_COLOR" => BlendFactor::OneMinusDstColor,
            "GL_SRC_ALPHA" => BlendFactor::SrcAlpha,
            "GL_ONE_MINUS_SRC_ALPHA" => BlendFactor::OneMinusSrcAlpha,
            "GL_DST_ALPHA" => BlendFactor::DstAlpha,
            "GL_ONE_MINUS_DST_ALPHA" => BlendFactor::OneMinusDstAlpha,
            other => {
                return Err(ScreenError::invalid_argument(
                    "blendFactor",
                    format!("unknown blend factor '{other}'"),
                ))
            }
        };
        Ok(factor)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendFactor::Zero => "GL_ZERO",
            BlendFactor::One => "GL_ONE",
            BlendFactor::SrcColor => "GL_SRC_COLOR",
            BlendFactor::OneMinusSrcColor => "GL_ONE_MINUS_SRC_COLOR",
            BlendFactor::DstColor => "GL_DST_COLOR",
            BlendFactor::OneMinusDstColor => "GL_ONE_MINUS_DST_COLOR",
            BlendFactor::SrcAlpha => "GL_SRC_ALPHA",
            BlendFactor::OneMinusSrcAlpha => "GL_ONE_MINUS_SRC_ALPHA",
            BlendFactor::DstAlpha => "GL_DST_ALPHA",
            BlendFactor::OneMinusDstAlpha => "GL_ONE_MINUS_DST_ALPHA",
        }
    }

    /// Per-channel weights of this factor for a source and destination color.
    pub fn weights(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        match self {
            BlendFactor::Zero => [0.0; 4],
            BlendFactor::One => [1.0; 4],
            BlendFactor::SrcColor => src,
            BlendFactor::OneMinusSrcColor => src.map(|c| 1.0 - c),
            BlendFactor::DstColor => dst,
            BlendFactor::OneMinusDstColor => dst.map(|c| 1.0 - c),
            BlendFactor::SrcAlpha => [src[3]; 4],
            BlendFactor::OneMinusSrcAlpha => [1.0 - src[3]; 4],
            BlendFactor::DstAlpha => [dst[3]; 4],
            BlendFactor::OneMinusDstAlpha => [1.0 - dst[3]; 4],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlendState {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendState {
    /// `GL_ONE, GL_ZERO` is a plain overwrite and switches blending off.
    pub fn is_enabled(&self) -> bool {
        !(self.src == BlendFactor::One && self.dst == BlendFactor::Zero)
    }

    pub fn overwrite() -> Self {
        Self {
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColorMask(pub [bool; 4]);

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask([true; 4])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Stipple {
    pub enabled: bool,
    pub factor: u32,
    pub pattern: u16,
}

impl Stipple {
    /// Whether the `n`th pixel along a stippled line is drawn.
    pub fn covers(&self, n: u32) -> bool {
        if !self.enabled {
            return true;
        }
        let bit = (n / self.factor.max(1)) % 16;
        (self.pattern >> bit) & 1 == 1
    }
}

impl Default for Stipple {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: 1,
            pattern: 0xAAAA,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum StereoDrawBuffer {
    Left,
    Right,
    #[default]
    None,
}

/// Shader programs attached to a record. `ProgramId::NONE` disables a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ShaderBindings {
    /// Program bound for ordinary drawing into this window.
    pub default_draw: ProgramId,
    /// Program consuming the unclamped color from the texture coordinate slot.
    pub unclamped_draw: ProgramId,
    /// Program applied when this texture is drawn with a filter mode above nearest.
    pub texture_filter: ProgramId,
    /// Program used to look up texels of this texture in special formats.
    pub texture_lookup: ProgramId,
    /// Program currently bound for drawing into this window.
    pub current: ProgramId,
}

bitflags::bitflags! {
    /// Per-record behavior switches, mostly given when a texture is created.
    pub struct SpecialFlags: u32 {
        /// Rotate by rotating texture coordinates instead of the drawn quad.
        const USE_TEXTURE_MATRIX_FOR_ROTATION = 1;
        /// Ignore rotation angles when drawing this texture.
        const DONT_DO_ROTATION = 1 << 1;
        /// Keep the record alive when all windows are closed at once.
        const DONT_CLOSE_ON_CLOSE_ALL = 1 << 17;
    }
}

impl Default for SpecialFlags {
    fn default() -> Self {
        SpecialFlags::empty()
    }
}

/// Gamma table handed over for loading at the next flip.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaTable {
    pub red: Vec<f32>,
    pub green: Vec<f32>,
    pub blue: Vec<f32>,
}

impl GammaTable {
    pub fn new(red: Vec<f32>, green: Vec<f32>, blue: Vec<f32>) -> Result<Self, ScreenError> {
        if red.is_empty() || red.len() != green.len() || red.len() != blue.len() {
            return Err(ScreenError::invalid_argument(
                "gammaTable",
                format!(
                    "channels must be non-empty and of equal length, got {}/{}/{}",
                    red.len(),
                    green.len(),
                    blue.len()
                ),
            ));
        }
        Ok(Self { red, green, blue })
    }

    pub fn len(&self) -> usize {
        self.red.len()
    }

    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }
}
