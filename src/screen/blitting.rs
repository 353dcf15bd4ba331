use std::time::Duration;

use crate::blit::{
    blit_color, blit_texture, can_fast_copy, check_rotation, draw_merged, fast_copy, quad_vertices, BatchBlit,
    BlitOptions, CopyEnd, FilterMode, TextureSource,
};
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::{BlendState, FboRole, KindFilter, ResourceRecord, SpecialFlags, TextureStore, WindowKind};
use crate::registry::Handle;
use crate::render::backend::{BackendKind, ProgramId, RenderDevice, TextureDesc};
use crate::screen::{check_inside, owned_framebuffer, Screen};

impl Screen {
    /// Draws `src_rect` of a texture or offscreen window into `dst_rect` of `window`.
    ///
    /// The source rect defaults to the whole texture and the destination to the source rect
    /// centered in the window.
    pub fn draw_texture(
        &mut self,
        window: Handle,
        texture: Handle,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
        options: &BlitOptions,
    ) -> Result<()> {
        options.validate()?;
        self.check_device_free()?;
        let (src_rect, dst_rect) = self.blit_rects(texture, window, src_rect, dst_rect)?;
        let flags = options.flags() | self.registry.lookup(texture)?.special_flags;
        check_rotation(options.rotation_deg, flags)?;
        if src_rect.is_empty() || dst_rect.is_empty() {
            return Ok(());
        }

        let capacity = self.config.vertex_buffer_capacity;
        let source = self.prepare_source(texture)?;
        let target = self.registry.lookup_mut(window)?;
        blit_texture(self.device.as_mut(), &source, target, src_rect, dst_rect, options, capacity)
    }

    /// Draws all items of a batch.
    ///
    /// Every item is checked before anything is drawn. On classic windows, items sharing one
    /// source and filter go out as a single primitive group.
    pub fn finish_batch(&mut self, batch: BatchBlit) -> Result<()> {
        self.check_device_free()?;
        let target = batch.target();
        let mut resolved = Vec::with_capacity(batch.len());
        for item in batch.items() {
            item.options.validate()?;
            let (src_rect, dst_rect) = self.blit_rects(item.source, target, item.src_rect, item.dst_rect)?;
            let flags = item.options.flags() | self.registry.lookup(item.source)?.special_flags;
            check_rotation(item.options.rotation_deg, flags)?;
            if !src_rect.is_empty() && !dst_rect.is_empty() {
                resolved.push((item, src_rect, dst_rect));
            }
        }
        if resolved.is_empty() {
            return Ok(());
        }

        let capacity = self.config.vertex_buffer_capacity;
        let classic = self.registry.lookup(target)?.backend == BackendKind::Classic;
        match batch.common_source() {
            Some((source, filter)) if classic => {
                let source = self.prepare_source(source)?;
                let record = self.registry.lookup(target)?;
                let quads = resolved
                    .iter()
                    .map(|(item, src_rect, dst_rect)| {
                        quad_vertices(
                            *src_rect,
                            *dst_rect,
                            item.options.rotation_deg,
                            item.options.flags() | source.special_flags,
                            blit_color(&item.options, record),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                let record = self.registry.lookup_mut(target)?;
                draw_merged(self.device.as_mut(), &source, record, &quads, filter, capacity)
            }
            _ => {
                for (item, src_rect, dst_rect) in resolved {
                    let source = self.prepare_source(item.source)?;
                    let record = self.registry.lookup_mut(target)?;
                    blit_texture(self.device.as_mut(), &source, record, src_rect, dst_rect, &item.options, capacity)?;
                }
                Ok(())
            }
        }
    }

    /// Copies `src_rect` of one window into `dst_rect` of another, or of the same, window.
    ///
    /// Both rects default to the whole window. Copies between framebuffer-backed windows are
    /// done by a framebuffer blit unless the configuration forbids it; everything else is
    /// drawn as a texture.
    pub fn copy_window(&mut self, src: Handle, dst: Handle, src_rect: Option<Rect>, dst_rect: Option<Rect>) -> Result<()> {
        self.check_device_free()?;
        let source = self.copy_endpoint(src)?;
        let target = self.copy_endpoint(dst)?;
        let src_rect = src_rect.unwrap_or(source.rect);
        let dst_rect = dst_rect.unwrap_or(target.rect);
        if src_rect.is_empty() || dst_rect.is_empty() {
            return Ok(());
        }
        check_inside("sourceRect", src_rect, source.rect)?;
        check_inside("targetRect", dst_rect, target.rect)?;

        if can_fast_copy(source, target, self.config.avoid_framebuffer_blit) {
            log::debug!("Window[{src}]: copy to {dst} by framebuffer blit");
            return self.copy_by_framebuffer_blit(src, dst, src_rect, dst_rect);
        }
        let texture_backed = src != dst && !matches!(source.store, TextureStore::Unallocated);
        if texture_backed {
            log::debug!("Window[{src}]: copy to {dst} by texture blit");
            let capacity = self.config.vertex_buffer_capacity;
            let texture = self.prepare_source(src)?;
            let record = self.registry.lookup_mut(dst)?;
            return blit_overwriting(self.device.as_mut(), &texture, record, src_rect, dst_rect, capacity);
        }
        log::debug!("Window[{src}]: copy to {dst} through a scratch texture");
        self.copy_through_scratch(src, dst, src_rect, dst_rect)
    }

    fn copy_endpoint(&self, handle: Handle) -> Result<&ResourceRecord> {
        let record = self.registry.lookup(handle)?;
        if record.kind() == WindowKind::Proxy {
            return Err(ScreenError::WrongKind {
                handle,
                expected: "window or texture",
                actual: record.kind().name(),
            });
        }
        Ok(record)
    }

    fn copy_by_framebuffer_blit(&mut self, src: Handle, dst: Handle, src_rect: Rect, dst_rect: Rect) -> Result<()> {
        let device = self.device.as_mut();
        let from = CopyEnd::of(self.registry.lookup_mut(src)?, device)?;
        if src == dst {
            // overlapping copies go through a bounce buffer the size of the window
            let record = self.registry.lookup_mut(src)?;
            let bounce = match record.fbos.get(FboRole::Bounce).copied() {
                Some(desc) => CopyEnd {
                    fbo: desc.fbo,
                    multisample: desc.multisample,
                },
                None => {
                    let (_, _, width, height) = record.rect.to_pixels();
                    let desc = owned_framebuffer(device, width, height, record.texel_format(), 0)?;
                    record.fbos.insert(FboRole::Bounce, desc);
                    CopyEnd {
                        fbo: desc.fbo,
                        multisample: 0,
                    }
                }
            };
            fast_copy(device, from, bounce, src_rect, src_rect)?;
            return fast_copy(device, bounce, from, src_rect, dst_rect);
        }
        let to = CopyEnd::of(self.registry.lookup_mut(dst)?, device)?;
        fast_copy(device, from, to, src_rect, dst_rect)
    }

    fn copy_through_scratch(&mut self, src: Handle, dst: Handle, src_rect: Rect, dst_rect: Rect) -> Result<()> {
        let onscreen_source = self.registry.lookup(src)?.kind() == WindowKind::Onscreen;
        let onscreen_target = self.registry.lookup(dst)?.kind() == WindowKind::Onscreen;
        if onscreen_source && !onscreen_target && !src_rect.same_size(&dst_rect) {
            return Err(ScreenError::invalid_argument(
                "targetRect",
                format!(
                    "sourceRect {src_rect:?} and targetRect {dst_rect:?} must have the same size for \
                     onscreen to offscreen copies"
                ),
            ));
        }

        let capacity = self.config.vertex_buffer_capacity;
        let device = self.device.as_mut();
        let record = self.registry.lookup_mut(src)?;
        device.make_current(record.backend);
        let fbo = record.drawing_framebuffer(device)?;
        let (_, _, width, height) = src_rect.to_pixels();
        let scratch = device.create_texture(&TextureDesc {
            width,
            height,
            format: record.texel_format(),
        })?;

        let source = TextureSource {
            handle: src,
            texture: scratch,
            rect: Rect::from_size(width as f64, height as f64),
            special_flags: SpecialFlags::empty(),
            filter_shader: ProgramId::NONE,
            power_of_two: false,
        };
        let result = device
            .copy_to_texture(fbo, src_rect, scratch)
            .map_err(ScreenError::from)
            .and_then(|()| {
                let target = self.registry.lookup_mut(dst)?;
                blit_overwriting(device, &source, target, source.rect, dst_rect, capacity)
            });
        device.delete_texture(scratch);
        result
    }

    /// Uploads CPU-backed textures; all textures when `handles` is empty.
    ///
    /// Returns how many textures were uploaded by this call.
    pub fn preload_textures(&mut self, handles: &[Handle]) -> Result<usize> {
        self.check_device_free()?;
        let handles = if handles.is_empty() {
            self.registry.enumerate(KindFilter::Textures)
        } else {
            handles.to_vec()
        };
        let mut uploaded = 0;
        for handle in handles {
            let record = self.registry.lookup_mut(handle)?;
            if record.kind() != WindowKind::Texture {
                return Err(ScreenError::WrongKind {
                    handle,
                    expected: "texture",
                    actual: record.kind().name(),
                });
            }
            if !record.store.is_resident() {
                record.ensure_texture(self.device.as_mut())?;
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }

    /// Reads back `rect`, the whole record by default, from a window or texture.
    pub fn read_pixels(&mut self, handle: Handle, rect: Option<Rect>) -> Result<PixelBuffer> {
        self.check_device_free()?;
        let device = self.device.as_mut();
        let record = self.registry.lookup_mut(handle)?;
        let rect = rect.unwrap_or(record.rect);
        check_inside("rect", rect, record.rect)?;
        let (_, _, width, height) = rect.to_pixels();
        if width == 0 || height == 0 {
            return Err(ScreenError::invalid_argument("rect", format!("{rect:?} covers no pixels")));
        }
        device.make_current(record.backend);
        let fbo = record.drawing_framebuffer(device)?;
        let texels = device.read_pixels(fbo, rect)?;
        Ok(PixelBuffer::from_rgba_f32(width, height, &texels))
    }

    /// Waits until the device has executed everything submitted so far.
    pub fn finish(&mut self, handle: Handle, timeout: Option<Duration>) -> Result<()> {
        self.check_device_free()?;
        let timeout = timeout.unwrap_or_else(|| self.config.finish_timeout());
        let record = self.registry.lookup(handle)?;
        self.device.make_current(record.backend);
        let fence = self.device.insert_fence();
        if !self.device.wait_fence(fence, timeout)? {
            log::warn!("Window[{handle}]: device did not finish within {timeout:?}");
            return Err(ScreenError::Timeout(timeout));
        }
        Ok(())
    }

    fn blit_rects(
        &self,
        source: Handle,
        target: Handle,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
    ) -> Result<(Rect, Rect)> {
        if source == target {
            return Err(ScreenError::invalid_argument(
                "texture",
                format!("{source} cannot be drawn into itself"),
            ));
        }
        let src = self.registry.lookup(source)?;
        if !src.kind().has_pixels() {
            return Err(ScreenError::WrongKind {
                handle: source,
                expected: "texture or offscreen window",
                actual: src.kind().name(),
            });
        }
        let dst = self.copy_endpoint(target)?;

        let src_rect = src_rect.unwrap_or(src.rect);
        check_inside("sourceRect", src_rect, src.rect)?;
        let dst_rect = dst_rect.unwrap_or_else(|| src_rect.normalized().center_in(&dst.rect));
        check_inside("destinationRect", dst_rect, dst.rect)?;
        Ok((src_rect, dst_rect))
    }

    fn prepare_source(&mut self, handle: Handle) -> Result<TextureSource> {
        let record = self.registry.lookup_mut(handle)?;
        TextureSource::prepare(record, self.device.as_mut())
    }
}

/// Texture blit that replaces the destination pixels, like a framebuffer copy does.
fn blit_overwriting(
    device: &mut dyn RenderDevice,
    source: &TextureSource,
    target: &mut ResourceRecord,
    src_rect: Rect,
    dst_rect: Rect,
    capacity: usize,
) -> Result<()> {
    let filter = if src_rect.same_size(&dst_rect) {
        FilterMode::Nearest
    } else {
        FilterMode::Bilinear
    };
    let options = BlitOptions::default().with_filter(filter);
    let blend = std::mem::replace(&mut target.blend, BlendState::overwrite());
    let result = blit_texture(device, source, target, src_rect, dst_rect, &options, capacity);
    target.blend = blend;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenConfig;
    use crate::errors::InvalidHandleReason;
    use crate::render::backends::null::{DeviceCall, NullDevice};
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::caps::GfxCaps;
    use crate::screen::tests::{classic, null_device, software_screen};
    use crate::screen::OpenWindowOptions;

    fn checkerboard(size: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let v = if (x + y) % 2 == 0 { 255 } else { 40 };
                data.extend_from_slice(&[v, 255 - v, (x * 16) as u8, 255]);
            }
        }
        PixelBuffer::from_raw(data, size, size, 4, size * 4).unwrap()
    }

    fn nearest() -> BlitOptions {
        BlitOptions::default().with_filter(FilterMode::Nearest)
    }

    #[test]
    fn red_texture_scenario() {
        let mut screen = software_screen();
        let a = screen.open_window(classic(800, 600)).unwrap();
        let t = screen.make_texture(a, PixelBuffer::solid(64, 64, [255, 0, 0, 255])).unwrap();
        screen
            .draw_texture(a, t, None, Some(Rect::from_size(64.0, 64.0)), &nearest())
            .unwrap();

        let px = screen.read_pixels(a, Some(Rect::new(32.0, 32.0, 33.0, 33.0))).unwrap();
        assert_eq!(px.pixel(0, 0), [255, 0, 0, 255]);

        screen.close(t).unwrap();
        screen.close(a).unwrap();
        for h in [t, a] {
            assert!(matches!(screen.lookup(h), Err(ScreenError::InvalidHandle { .. })));
        }
    }

    #[test]
    fn one_to_one_nearest_blit_is_lossless() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(40, 30)).unwrap();
        let pixels = checkerboard(8);
        let tex = screen.make_texture(win, pixels.clone()).unwrap();
        let dst = Rect::new(5.0, 7.0, 13.0, 15.0);
        screen.draw_texture(win, tex, None, Some(dst), &nearest()).unwrap();

        assert_eq!(screen.read_pixels(win, Some(dst)).unwrap(), pixels);
        // the texture left the CPU on first use
        assert!(screen.lookup(tex).unwrap().store.is_resident());
    }

    #[test]
    fn default_destination_is_centered() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(20, 20)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(4, 4, [0, 0, 255, 255])).unwrap();
        screen.draw_texture(win, tex, None, None, &nearest()).unwrap();
        let centered = screen.read_pixels(win, Some(Rect::new(8.0, 8.0, 12.0, 12.0))).unwrap();
        assert_eq!(centered, PixelBuffer::solid(4, 4, [0, 0, 255, 255]));
        let corner = screen.read_pixels(win, Some(Rect::new(7.0, 7.0, 8.0, 8.0))).unwrap();
        assert_eq!(corner.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn rects_outside_their_records_are_rejected() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(20, 20)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(4, 4, [0; 4])).unwrap();

        let err = screen
            .draw_texture(win, tex, Some(Rect::from_size(5.0, 4.0)), None, &nearest())
            .unwrap_err();
        assert!(matches!(err, ScreenError::OutOfBoundsRect { arg: "sourceRect", .. }));
        let err = screen
            .draw_texture(win, tex, None, Some(Rect::new(18.0, 0.0, 22.0, 4.0)), &nearest())
            .unwrap_err();
        assert!(matches!(err, ScreenError::OutOfBoundsRect { arg: "destinationRect", .. }));

        // nothing was uploaded for the failed calls
        assert!(!screen.lookup(tex).unwrap().store.is_resident());
    }

    #[test]
    fn conflicting_rotation_fails_before_any_drawing() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(20, 20)).unwrap();
        let flags = SpecialFlags::USE_TEXTURE_MATRIX_FOR_ROTATION | SpecialFlags::DONT_DO_ROTATION;
        let tex = screen
            .make_texture_with(
                win,
                PixelBuffer::solid(4, 4, [0; 4]),
                crate::screen::TextureOptions::default().with_special_flags(flags),
            )
            .unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();

        let err = screen
            .draw_texture(win, tex, None, None, &nearest().with_rotation(30.0))
            .unwrap_err();
        assert!(matches!(err, ScreenError::ConflictingRotationMode));
        assert!(null_device(&screen).calls().is_empty());
        screen.draw_texture(win, tex, None, None, &nearest()).unwrap();
    }

    #[test]
    fn batched_blits_match_single_blits() {
        let mut screen = software_screen();
        let batched = screen.open_window(classic(32, 32)).unwrap();
        let single = screen.open_window(classic(32, 32)).unwrap();
        let tex = screen.make_texture(batched, checkerboard(8)).unwrap();
        let dsts = [
            Rect::new(0.0, 0.0, 8.0, 8.0),
            Rect::new(8.0, 0.0, 16.0, 8.0),
            Rect::new(4.0, 12.0, 20.0, 28.0),
        ];

        let mut batch = BatchBlit::new(batched);
        for dst in dsts {
            batch.add(tex, None, Some(dst), nearest());
        }
        assert!(batch.common_source().is_some());
        screen.finish_batch(batch).unwrap();
        for dst in dsts {
            screen.draw_texture(single, tex, None, Some(dst), &nearest()).unwrap();
        }

        assert_eq!(
            screen.read_pixels(batched, None).unwrap(),
            screen.read_pixels(single, None).unwrap()
        );
    }

    #[test]
    fn batches_are_merged_only_on_classic_windows() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(32, 32)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(4, 4, [0; 4])).unwrap();
        let mut batch = BatchBlit::new(win);
        batch
            .add(tex, None, Some(Rect::from_size(4.0, 4.0)), nearest())
            .add(tex, None, Some(Rect::new(4.0, 0.0, 8.0, 4.0)), nearest());
        screen.finish_batch(batch).unwrap();
        let dev = null_device(&screen);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::ImmediateBegin(_))), 1);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::ImmediateVertex)), 8);

        let modern = screen
            .open_window(OpenWindowOptions::new(32, 32).with_backend(BackendKind::ModernDesktop))
            .unwrap();
        let tex2 = screen.make_texture(modern, PixelBuffer::solid(4, 4, [0; 4])).unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();
        let mut batch = BatchBlit::new(modern);
        batch.add(tex2, None, None, nearest()).add(tex2, None, None, nearest());
        screen.finish_batch(batch).unwrap();
        assert_eq!(null_device(&screen).count(|c| matches!(c, DeviceCall::DrawArrays { .. })), 2);
    }

    #[test]
    fn invalid_batch_items_draw_nothing() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(32, 32)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(4, 4, [0; 4])).unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();

        let mut batch = BatchBlit::new(win);
        batch
            .add(tex, None, None, nearest())
            .add(tex, None, Some(Rect::new(30.0, 30.0, 40.0, 40.0)), nearest());
        assert!(matches!(
            screen.finish_batch(batch),
            Err(ScreenError::OutOfBoundsRect { .. })
        ));
        assert!(null_device(&screen).calls().is_empty());
    }

    fn copy_scene(config: ScreenConfig) -> PixelBuffer {
        let mut screen = Screen::new(Some(config), Box::new(SoftwareDevice::new()));
        let win = screen.open_window(classic(24, 24).with_imaging_pipeline(true)).unwrap();
        let src = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        let dst = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        let tex = screen.make_texture(win, checkerboard(8)).unwrap();
        screen.draw_texture(src, tex, None, Some(Rect::new(4.0, 4.0, 12.0, 12.0)), &nearest()).unwrap();
        screen.fill_rect(src, Some(Rect::new(0.0, 0.0, 16.0, 2.0)), Some([0.2, 0.4, 0.6, 0.5])).unwrap();

        screen
            .copy_window(src, dst, Some(Rect::new(2.0, 2.0, 14.0, 14.0)), Some(Rect::new(0.0, 0.0, 12.0, 12.0)))
            .unwrap();
        screen.read_pixels(dst, None).unwrap()
    }

    #[test]
    fn framebuffer_copy_matches_texture_copy() {
        let fast = copy_scene(ScreenConfig::default());
        let config = ScreenConfig::builder().avoid_framebuffer_blit(true).build().unwrap();
        let slow = copy_scene(config);
        assert_eq!(fast, slow);
    }

    #[test]
    fn copy_paths_are_picked_by_capability() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(16, 16).with_imaging_pipeline(true)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();
        screen.copy_window(off, win, None, None).unwrap();
        assert_eq!(null_device(&screen).count(|c| matches!(c, DeviceCall::BlitFramebuffer { .. })), 1);

        let caps = GfxCaps::all() - GfxCaps::FBO_BLIT;
        let mut screen = Screen::new(None, Box::new(NullDevice::with_caps(caps)));
        let win = screen.open_window(classic(16, 16)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();
        screen.copy_window(win, off, None, None).unwrap();
        let dev = null_device(&screen);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::BlitFramebuffer { .. })), 0);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::CopyToTexture { .. })), 1);
        // the scratch texture is gone again
        let created = dev.count(|c| matches!(c, DeviceCall::CreateTexture(_)));
        let deleted = dev.count(|c| matches!(c, DeviceCall::DeleteTexture(_)));
        assert_eq!((created, deleted), (1, 1));

        assert!(matches!(
            screen.copy_window(win, off, None, Some(Rect::from_size(8.0, 8.0))),
            Err(ScreenError::InvalidArgument { name: "targetRect", .. })
        ));
    }

    #[test]
    fn self_copy_goes_through_a_bounce_buffer() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(16, 16)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        screen.fill_rect(off, Some(Rect::from_size(8.0, 8.0)), Some([1.0, 0.0, 0.0, 1.0])).unwrap();
        screen
            .copy_window(off, off, Some(Rect::from_size(8.0, 8.0)), Some(Rect::new(4.0, 4.0, 12.0, 12.0)))
            .unwrap();

        assert!(screen.lookup(off).unwrap().fbos.contains(FboRole::Bounce));
        let px = screen.read_pixels(off, None).unwrap();
        assert_eq!(px.pixel(10, 10), [255, 0, 0, 255]);
        assert_eq!(px.pixel(13, 13), [255, 255, 255, 255]);
    }

    #[test]
    fn multisampled_copies_cannot_scale_into_plain_windows() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(16, 16).with_imaging_pipeline(true)).unwrap();
        let ms = screen
            .open_offscreen_with(
                win,
                Rect::from_size(16.0, 16.0),
                crate::screen::OffscreenOptions {
                    multisample: 4,
                    ..Default::default()
                },
            )
            .unwrap();
        let err = screen
            .copy_window(ms, win, None, Some(Rect::from_size(8.0, 8.0)))
            .unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "targetRect", .. }));
        screen.copy_window(ms, win, None, None).unwrap();
    }

    #[test]
    fn preloading_uploads_cpu_textures_once() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(16, 16)).unwrap();
        let a = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        let _b = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        assert_eq!(screen.preload_textures(&[a]).unwrap(), 1);
        assert_eq!(screen.preload_textures(&[]).unwrap(), 1);
        assert_eq!(screen.preload_textures(&[]).unwrap(), 0);
        assert!(matches!(
            screen.preload_textures(&[win]),
            Err(ScreenError::WrongKind { .. })
        ));
    }

    #[test]
    fn finish_times_out_on_a_stalled_device() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new().stalled()));
        let win = screen.open_window(classic(8, 8)).unwrap();
        let err = screen.finish(win, Some(Duration::from_millis(5))).unwrap_err();
        assert!(matches!(err, ScreenError::Timeout(_)));

        let mut screen = software_screen();
        let win = screen.open_window(classic(8, 8)).unwrap();
        screen.finish(win, None).unwrap();
        screen.close(win).unwrap();
        assert!(matches!(
            screen.finish(win, None),
            Err(ScreenError::InvalidHandle {
                reason: InvalidHandleReason::Stale,
                ..
            })
        ));
    }

    #[test]
    fn read_back_png_round_trips_through_a_file() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(6, 4)).unwrap();
        screen.fill_rect(win, Some(Rect::from_size(3.0, 4.0)), Some([0.0, 1.0, 0.0, 1.0])).unwrap();
        let pixels = screen.read_pixels(win, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        pixels.write_png(std::fs::File::create(&path).unwrap()).unwrap();
        let decoded = PixelBuffer::from_png(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(decoded.pixel(1, 1), [0, 255, 0, 255]);
        assert_eq!(decoded.pixel(4, 1), [255, 255, 255, 255]);
    }
}
