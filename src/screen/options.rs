use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScreenError};
use crate::record::SpecialFlags;
use crate::render::backend::{BackendKind, ProgramId};

/// Parameters of a new onscreen window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWindowOptions {
    pub width: u32,
    pub height: u32,
    /// Backend kind of the window's context. Defaults to the configured backend.
    pub backend: Option<BackendKind>,
    /// Draw into framebuffer objects instead of straight into the system framebuffer.
    pub imaging_pipeline: bool,
    pub multisample: u32,
    pub bpc: u8,
    pub stereo: bool,
    /// Overrides the configured maximum color component value.
    pub color_range: Option<f64>,
}

impl Default for OpenWindowOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            backend: None,
            imaging_pipeline: false,
            multisample: 0,
            bpc: 8,
            stereo: false,
            color_range: None,
        }
    }
}

impl OpenWindowOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_imaging_pipeline(mut self, on: bool) -> Self {
        self.imaging_pipeline = on;
        self
    }

    pub fn with_multisample(mut self, samples: u32) -> Self {
        self.multisample = samples;
        self
    }

    pub fn with_bpc(mut self, bpc: u8) -> Self {
        self.bpc = bpc;
        self
    }

    pub fn with_stereo(mut self, on: bool) -> Self {
        self.stereo = on;
        self
    }

    pub fn with_color_range(mut self, max: f64) -> Self {
        self.color_range = Some(max);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScreenError::invalid_argument(
                "rect",
                format!("window size {}x{} must not be empty", self.width, self.height),
            ));
        }
        check_bpc(self.bpc)
    }
}

/// Parameters of a new offscreen window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffscreenOptions {
    /// Bits per pixel: 32 for 8 bit, 64 for 16 bit float and 128 for 32 bit float channels.
    pub depth: u32,
    pub multisample: u32,
    pub special_flags: SpecialFlags,
}

impl Default for OffscreenOptions {
    fn default() -> Self {
        Self {
            depth: 32,
            multisample: 0,
            special_flags: SpecialFlags::empty(),
        }
    }
}

impl OffscreenOptions {
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Bits per channel of the requested pixel depth.
    pub fn bpc(&self) -> Result<u8> {
        match self.depth {
            8 | 16 | 24 | 32 => Ok(8),
            48 | 64 => Ok(16),
            96 | 128 => Ok(32),
            other => Err(ScreenError::invalid_argument(
                "pixelSize",
                format!("{other} bits per pixel is not supported"),
            )),
        }
    }
}

/// Parameters of a new texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureOptions {
    /// Precision of the GPU texture. Pixels always come in as 8 bit.
    pub bpc: u8,
    pub special_flags: SpecialFlags,
    /// Program applied when the texture is drawn with a filter above nearest.
    pub filter_shader: ProgramId,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            bpc: 8,
            special_flags: SpecialFlags::empty(),
            filter_shader: ProgramId::NONE,
        }
    }
}

impl TextureOptions {
    pub fn with_bpc(mut self, bpc: u8) -> Self {
        self.bpc = bpc;
        self
    }

    pub fn with_special_flags(mut self, flags: SpecialFlags) -> Self {
        self.special_flags = flags;
        self
    }

    pub fn with_filter_shader(mut self, program: ProgramId) -> Self {
        self.filter_shader = program;
        self
    }
}

pub(crate) fn check_bpc(bpc: u8) -> Result<()> {
    match bpc {
        8 | 16 | 32 => Ok(()),
        other => Err(ScreenError::invalid_argument(
            "bpc",
            format!("{other} bits per channel requested, only 8, 16 and 32 are supported"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offscreen_depth_maps_to_channel_precision() {
        assert_eq!(OffscreenOptions::default().bpc().unwrap(), 8);
        assert_eq!(OffscreenOptions::default().with_depth(64).bpc().unwrap(), 16);
        assert_eq!(OffscreenOptions::default().with_depth(128).bpc().unwrap(), 32);
        assert!(matches!(
            OffscreenOptions::default().with_depth(12).bpc(),
            Err(ScreenError::InvalidArgument { name: "pixelSize", .. })
        ));
    }

    #[test]
    fn window_options_are_validated() {
        assert!(OpenWindowOptions::default().validate().is_ok());
        assert!(OpenWindowOptions::new(0, 10).validate().is_err());
        assert!(matches!(
            OpenWindowOptions::new(10, 10).with_bpc(12).validate(),
            Err(ScreenError::InvalidArgument { name: "bpc", .. })
        ));
    }

    #[test]
    fn window_options_from_json() {
        let opts: OpenWindowOptions =
            serde_json::from_str(r#"{"width": 320, "height": 200, "backend": "embedded"}"#).unwrap();
        assert_eq!(opts.width, 320);
        assert_eq!(opts.backend, Some(BackendKind::Embedded));
        assert_eq!(opts.bpc, 8);
    }
}
