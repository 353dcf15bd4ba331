use crate::blit::options::{BlitOptions, FilterMode};
use crate::blit::texture::TextureSource;
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::record::ResourceRecord;
use crate::registry::Handle;
use crate::render::backend::{PrimitiveKind, RenderDevice, Vertex};
use crate::render::color::ColorState;
use crate::render::group::PrimitiveGroup;

#[derive(Clone, Debug, PartialEq)]
pub struct BatchItem {
    pub source: Handle,
    /// Defaults to the whole source.
    pub src_rect: Option<Rect>,
    /// Defaults to the source rect centered in the target.
    pub dst_rect: Option<Rect>,
    pub options: BlitOptions,
}

/// Blits collected for one destination and submitted together.
///
/// Start a batch with [`BatchBlit::new`], add draws, then hand it to
/// [`Screen::finish_batch`](crate::screen::Screen::finish_batch).
#[derive(Clone, Debug)]
pub struct BatchBlit {
    target: Handle,
    items: Vec<BatchItem>,
}

impl BatchBlit {
    pub fn new(target: Handle) -> Self {
        Self {
            target,
            items: Vec::new(),
        }
    }

    pub fn target(&self) -> Handle {
        self.target
    }

    pub fn add(&mut self, source: Handle, src_rect: Option<Rect>, dst_rect: Option<Rect>, options: BlitOptions) -> &mut Self {
        self.items.push(BatchItem {
            source,
            src_rect,
            dst_rect,
            options,
        });
        self
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The one source and filter shared by all items, if there is such a pair.
    ///
    /// Items that pick their own shader are never merged.
    pub fn common_source(&self) -> Option<(Handle, FilterMode)> {
        let first = self.items.first()?;
        let shared = self.items.iter().all(|item| {
            item.source == first.source && item.options.filter == first.options.filter && item.options.shader.is_none()
        });
        shared.then_some((first.source, first.options.filter))
    }
}

/// Draws all `quads` of one source as a single primitive group.
pub(crate) fn draw_merged(
    device: &mut dyn RenderDevice,
    source: &TextureSource,
    target: &mut ResourceRecord,
    quads: &[[Vertex; 4]],
    filter: FilterMode,
    capacity: usize,
) -> Result<()> {
    if quads.is_empty() {
        return Ok(());
    }
    if target.group.is_some() {
        return Err(ScreenError::AlreadyInGroup { handle: target.handle() });
    }

    target.bind_for_drawing(device)?;
    let sampler = source.sampler(filter);
    device.bind_texture(Some(source.texture), sampler)?;
    let program = source.program(&BlitOptions::default().with_filter(filter));
    if let Some(program) = program {
        device.use_program(program);
    }

    let mut group = PrimitiveGroup::new(target.handle(), PrimitiveKind::Quads, ColorState::default(), false, capacity);
    let path = target.path.clone();
    let result = (|| {
        path.begin(device, &mut group)?;
        for quad in quads {
            for v in quad {
                path.vertex(device, &mut group, *v);
            }
        }
        path.end(device, &mut group)
    })();
    log::debug!(
        "Window[{}]: {} blits of {} merged into one group",
        target.handle(),
        quads.len(),
        source.handle
    );

    device.bind_texture(None, sampler)?;
    if program.is_some() {
        device.use_program(target.shaders.current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_source_requires_one_source_and_one_filter() {
        let (a, b) = (Handle::new(1, 0), Handle::new(2, 0));
        let nearest = BlitOptions::default().with_filter(FilterMode::Nearest);

        let mut batch = BatchBlit::new(Handle::new(0, 0));
        assert_eq!(batch.common_source(), None);

        batch.add(a, None, None, nearest.clone()).add(a, None, None, nearest.clone());
        assert_eq!(batch.common_source(), Some((a, FilterMode::Nearest)));

        let mut mixed_filter = batch.clone();
        mixed_filter.add(a, None, None, BlitOptions::default());
        assert_eq!(mixed_filter.common_source(), None);

        let mut mixed_source = batch.clone();
        mixed_source.add(b, None, None, nearest);
        assert_eq!(mixed_source.common_source(), None);
        assert_eq!(mixed_source.len(), 3);
    }
}
