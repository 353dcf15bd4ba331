use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScreenError};
use crate::record::SpecialFlags;
use crate::render::backend::ProgramId;

/// Texture sampling filter, numbered the way the host passes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest = 0,
    #[default]
    Bilinear = 1,
    MipmapNearest = 2,
    MipmapLinear = 3,
}

impl FilterMode {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(FilterMode::Nearest),
            1 => Ok(FilterMode::Bilinear),
            2 => Ok(FilterMode::MipmapNearest),
            3 => Ok(FilterMode::MipmapLinear),
            other => Err(ScreenError::invalid_argument(
                "filterMode",
                format!("{other} is not one of 0 (nearest), 1 (bilinear), 2 or 3 (mipmapped)"),
            )),
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Parameters of a single texture blit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlitOptions {
    /// Clockwise rotation in degrees around the center of the destination rect.
    pub rotation_deg: f64,
    pub filter: FilterMode,
    /// Opacity, 0.0 to 1.0. Ignored when `modulate_color` is set.
    pub global_alpha: f64,
    /// Color the texture is multiplied with, in the destination's color range.
    pub modulate_color: Option<[f64; 4]>,
    /// Shader to draw with instead of the texture's own filter shader.
    pub shader: Option<ProgramId>,
    pub special_flags: u32,
}

impl Default for BlitOptions {
    fn default() -> Self {
        Self {
            rotation_deg: 0.0,
            filter: FilterMode::Bilinear,
            global_alpha: 1.0,
            modulate_color: None,
            shader: None,
            special_flags: 0,
        }
    }
}

impl BlitOptions {
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_deg = degrees;
        self
    }

    pub fn with_global_alpha(mut self, alpha: f64) -> Self {
        self.global_alpha = alpha;
        self
    }

    pub fn with_modulate_color(mut self, rgba: [f64; 4]) -> Self {
        self.modulate_color = Some(rgba);
        self
    }

    pub fn with_shader(mut self, program: ProgramId) -> Self {
        self.shader = Some(program);
        self
    }

    pub fn with_special_flags(mut self, flags: SpecialFlags) -> Self {
        self.special_flags = flags.bits();
        self
    }

    pub fn flags(&self) -> SpecialFlags {
        SpecialFlags::from_bits_truncate(self.special_flags)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.global_alpha) {
            return Err(ScreenError::invalid_argument(
                "globalAlpha",
                format!("{} is outside of the range 0.0 to 1.0", self.global_alpha),
            ));
        }
        if !self.rotation_deg.is_finite() {
            return Err(ScreenError::invalid_argument("rotationAngle", "must be a finite number"));
        }
        if let Some(color) = self.modulate_color {
            if color.iter().any(|c| !c.is_finite()) {
                return Err(ScreenError::invalid_argument(
                    "modulateColor",
                    format!("{color:?} contains non-finite components"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_mode_parsing_names_the_argument() {
        assert_eq!(FilterMode::from_i32(0).unwrap(), FilterMode::Nearest);
        assert_eq!(FilterMode::from_i32(3).unwrap().as_i32(), 3);

        let err = FilterMode::from_i32(4).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "filterMode", .. }));
        assert!(err.to_string().contains("filterMode"));
        assert!(FilterMode::from_i32(-1).is_err());
    }

    #[test]
    fn global_alpha_must_be_normalized() {
        assert!(BlitOptions::default().with_global_alpha(0.5).validate().is_ok());
        let err = BlitOptions::default().with_global_alpha(1.5).validate().unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "globalAlpha", .. }));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: BlitOptions = serde_json::from_str(r#"{ "filter": "Nearest", "rotation_deg": 90.0 }"#).unwrap();
        assert_eq!(opts.filter, FilterMode::Nearest);
        assert_eq!(opts.global_alpha, 1.0);
        assert!(opts.modulate_color.is_none());
    }
}
