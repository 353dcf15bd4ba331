use crate::render::backend::{BackendKind, DeviceInfo};

bitflags::bitflags! {
    /// Graphics capabilities detected when a window is opened. Children inherit them.
    pub struct GfxCaps: u32 {
        const FBO = 1;
        const FP_TEX16 = 1 << 1;
        const FP_TEX32 = 1 << 2;
        const FP_FBO16 = 1 << 3;
        const FP_FBO32 = 1 << 4;
        const FP_FILTER16 = 1 << 5;
        const FP_FILTER32 = 1 << 6;
        const FP_BLEND16 = 1 << 7;
        const FP_BLEND32 = 1 << 8;
        const FP32_SHADING = 1 << 9;
        /// Vertex colors are passed on at full precision.
        const GOOD_VERTEX_COLORS = 1 << 10;
        const FBO_MULTISAMPLE = 1 << 11;
        const FBO_BLIT = 1 << 12;
        const NATIVE_STEREO = 1 << 17;
        const NPOT_TEXTURES = 1 << 18;
        const FBO_SCALED_RESOLVE_BLIT = 1 << 20;
        /// Primitive smoothing can be switched on and off.
        const SMOOTH_PRIMITIVES = 1 << 21;
    }
}

const NAMES: &[(GfxCaps, &str)] = &[
    (GfxCaps::FBO, "fbo"),
    (GfxCaps::FP_TEX16, "fp-tex16"),
    (GfxCaps::FP_TEX32, "fp-tex32"),
    (GfxCaps::FP_FBO16, "fp-fbo16"),
    (GfxCaps::FP_FBO32, "fp-fbo32"),
    (GfxCaps::FP_FILTER16, "fp-filter16"),
    (GfxCaps::FP_FILTER32, "fp-filter32"),
    (GfxCaps::FP_BLEND16, "fp-blend16"),
    (GfxCaps::FP_BLEND32, "fp-blend32"),
    (GfxCaps::FP32_SHADING, "fp32-shading"),
    (GfxCaps::GOOD_VERTEX_COLORS, "good-vertex-colors"),
    (GfxCaps::FBO_MULTISAMPLE, "fbo-multisample"),
    (GfxCaps::FBO_BLIT, "fbo-blit"),
    (GfxCaps::NATIVE_STEREO, "native-stereo"),
    (GfxCaps::NPOT_TEXTURES, "npot-textures"),
    (GfxCaps::FBO_SCALED_RESOLVE_BLIT, "fbo-scaled-resolve-blit"),
    (GfxCaps::SMOOTH_PRIMITIVES, "smooth-primitives"),
];

impl Default for GfxCaps {
    fn default() -> Self {
        GfxCaps::empty()
    }
}

impl GfxCaps {
    /// Determines what a new window of the given backend kind may use on `info`'s device.
    pub fn probe(info: &DeviceInfo, backend: BackendKind) -> GfxCaps {
        let mut caps = info.caps;
        match backend {
            BackendKind::Classic | BackendKind::ModernDesktop => {}
            BackendKind::Embedded => {
                // Embedded contexts lack 32 bit float filtering and blending, quad-buffered
                // stereo, and the switch for primitive smoothing.
                caps.remove(
                    GfxCaps::FP_FILTER32
                        | GfxCaps::FP_BLEND32
                        | GfxCaps::NATIVE_STEREO
                        | GfxCaps::SMOOTH_PRIMITIVES,
                );
            }
        }
        if !caps.contains(GfxCaps::FBO) {
            caps.remove(
                GfxCaps::FBO_BLIT
                    | GfxCaps::FBO_MULTISAMPLE
                    | GfxCaps::FBO_SCALED_RESOLVE_BLIT
                    | GfxCaps::FP_FBO16
                    | GfxCaps::FP_FBO32,
            );
        }
        log::debug!("Capabilities for {} context on {}: {:?}", backend, info.name, caps.names());
        caps
    }

    pub fn names(&self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Whether a framebuffer with `bpc` bits per channel can be rendered into.
    pub fn supports_fbo_bpc(&self, bpc: u8) -> bool {
        match bpc {
            8 => self.contains(GfxCaps::FBO),
            16 => self.contains(GfxCaps::FP_FBO16),
            32 => self.contains(GfxCaps::FP_FBO32),
            _ => false,
        }
    }
}
