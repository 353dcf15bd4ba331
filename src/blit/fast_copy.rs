use crate::blit::options::FilterMode;
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::record::ResourceRecord;
use crate::render::backend::{FramebufferId, RenderDevice};
use crate::render::caps::GfxCaps;

/// Whether a copy between these two records can go framebuffer to framebuffer.
///
/// Both sides need framebuffer blit support and must render into framebuffer objects, and
/// the copy must not be forced through the texture path by configuration.
pub(crate) fn can_fast_copy(src: &ResourceRecord, dst: &ResourceRecord, avoid_framebuffer_blit: bool) -> bool {
    !avoid_framebuffer_blit
        && src.caps.contains(GfxCaps::FBO_BLIT)
        && dst.caps.contains(GfxCaps::FBO_BLIT)
        && src.is_fbo_backed()
        && dst.is_fbo_backed()
}

/// Framebuffer side of a copy.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CopyEnd {
    pub fbo: FramebufferId,
    pub multisample: u32,
}

impl CopyEnd {
    pub fn of(record: &mut ResourceRecord, device: &mut dyn RenderDevice) -> Result<Self> {
        Ok(Self {
            fbo: record.drawing_framebuffer(device)?,
            multisample: record.multisample,
        })
    }
}

/// Copies `src_rect` of one framebuffer into `dst_rect` of another, resolving
/// multisampling on the way.
pub(crate) fn fast_copy(
    device: &mut dyn RenderDevice,
    src: CopyEnd,
    dst: CopyEnd,
    src_rect: Rect,
    dst_rect: Rect,
) -> Result<()> {
    if src.multisample > 0 && dst.multisample == 0 && !src_rect.same_size(&dst_rect) {
        return Err(ScreenError::invalid_argument(
            "targetRect",
            format!(
                "sourceRect {src_rect:?} and targetRect {dst_rect:?} must have the same size when \
                 copying from a multisampled window into a non-multisampled one"
            ),
        ));
    }
    let filter = if src_rect.same_size(&dst_rect) {
        FilterMode::Nearest
    } else {
        FilterMode::Bilinear
    };
    device.blit_framebuffer(src.fbo, dst.fbo, src_rect, dst_rect, filter)?;
    Ok(())
}
