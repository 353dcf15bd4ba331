use serde::Serialize;

use crate::errors::ScreenError;

/// Host-facing color scale of a window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ColorRange {
    /// Component value that maps to full intensity.
    pub max: f64,
    /// Clamp colors to the displayable range also on the unclamped path.
    pub clamp: bool,
}

impl ColorRange {
    pub fn new(max: f64, clamp: bool) -> Result<Self, ScreenError> {
        if !(max.is_finite() && max > 0.0) {
            return Err(ScreenError::invalid_argument(
                "maxColorValue",
                format!("{max} must be a positive number"),
            ));
        }
        Ok(Self { max, clamp })
    }

    pub fn normalize(&self, value: f64) -> f64 {
        value / self.max
    }
}

impl Default for ColorRange {
    fn default() -> Self {
        Self { max: 1.0, clamp: true }
    }
}

/// Current drawing color in both of its representations.
///
/// The clamped value feeds the fixed-function color attribute, which saturates at 1.0 on
/// most hardware. The unclamped value keeps full precision and is handed to shaders through
/// the texture coordinate slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorState {
    pub clamped: [f32; 4],
    pub unclamped: [f64; 4],
}

impl Default for ColorState {
    fn default() -> Self {
        Self {
            clamped: [1.0; 4],
            unclamped: [1.0; 4],
        }
    }
}

impl ColorState {
    /// Converts a color given in `range` units.
    pub fn from_host(rgba: [f64; 4], range: &ColorRange) -> Self {
        let normalized = rgba.map(|c| range.normalize(c));
        let clamped = normalized.map(|c| c.clamp(0.0, 1.0) as f32);
        let unclamped = if range.clamp {
            normalized.map(|c| c.clamp(0.0, 1.0))
        } else {
            normalized
        };
        Self { clamped, unclamped }
    }

    /// Color attribute, and the texture coordinate override carrying the unclamped color
    /// when a shader is bound to consume it.
    pub fn vertex_attributes(&self, shader_bound: bool) -> ([f32; 4], Option<[f32; 4]>) {
        if shader_bound {
            (self.clamped, Some(self.unclamped.map(|c| c as f32)))
        } else {
            (self.clamped, None)
        }
    }
}
