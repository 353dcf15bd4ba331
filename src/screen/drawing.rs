use std::sync::Arc;

use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::record::{
    BlendFactor, BlendState, ColorMask, GammaTable, ShaderBindings, StereoDrawBuffer, Stipple, WindowKind,
};
use crate::registry::Handle;
use crate::render::backend::{BackendKind, DeviceError, PrimitiveKind};
use crate::render::color::{ColorRange, ColorState};
use crate::render::group::PrimitiveGroup;
use crate::screen::Screen;

impl Screen {
    /// Sets the drawing color, given in the window's color range units.
    pub fn set_color(&mut self, handle: Handle, rgba: [f64; 4]) -> Result<()> {
        let record = self.registry.lookup_mut(handle)?;
        let color = ColorState::from_host(rgba, &record.color_range);
        record.color = color;
        if let Some(group) = record.group.as_mut() {
            group.set_color(color);
        }
        Ok(())
    }

    /// Sets blending from `GL_*` factor names and returns the previous setting.
    pub fn blend_function(&mut self, handle: Handle, src: &str, dst: &str) -> Result<BlendState> {
        let blend = BlendState {
            src: BlendFactor::from_name(src)?,
            dst: BlendFactor::from_name(dst)?,
        };
        let record = self.registry.lookup_mut(handle)?;
        Ok(std::mem::replace(&mut record.blend, blend))
    }

    pub fn color_mask(&mut self, handle: Handle, mask: [bool; 4]) -> Result<ColorMask> {
        let record = self.registry.lookup_mut(handle)?;
        Ok(std::mem::replace(&mut record.color_mask, ColorMask(mask)))
    }

    pub fn line_stipple(&mut self, handle: Handle, enabled: bool, factor: u32, pattern: u16) -> Result<Stipple> {
        if !(1..=256).contains(&factor) {
            return Err(ScreenError::invalid_argument(
                "stippleFactor",
                format!("{factor} is outside of 1 to 256"),
            ));
        }
        let record = self.registry.lookup_mut(handle)?;
        Ok(std::mem::replace(
            &mut record.stipple,
            Stipple {
                enabled,
                factor,
                pattern,
            },
        ))
    }

    /// Picks the eye that following drawing commands go to.
    pub fn select_stereo_draw_buffer(&mut self, handle: Handle, buffer: StereoDrawBuffer) -> Result<StereoDrawBuffer> {
        let record = self.registry.lookup_mut(handle)?;
        if record.kind() != WindowKind::Onscreen {
            return Err(ScreenError::WrongKind {
                handle,
                expected: "onscreen window",
                actual: record.kind().name(),
            });
        }
        if buffer == StereoDrawBuffer::Right && !record.stereo {
            return Err(ScreenError::invalid_argument(
                "bufferid",
                format!("window {handle} is not a stereo window"),
            ));
        }
        Ok(std::mem::replace(&mut record.stereo_draw_buffer, buffer))
    }

    /// Changes the maximum color component value of a window. Colors set later use it.
    pub fn color_range(&mut self, handle: Handle, max: f64, clamp: bool) -> Result<ColorRange> {
        let range = ColorRange::new(max, clamp)?;
        let record = self.registry.lookup_mut(handle)?;
        Ok(std::mem::replace(&mut record.color_range, range))
    }

    /// Replaces the shader bindings of a record. The default draw program becomes current.
    pub fn set_shaders(&mut self, handle: Handle, shaders: ShaderBindings) -> Result<ShaderBindings> {
        let record = self.registry.lookup_mut(handle)?;
        let shaders = ShaderBindings {
            current: shaders.default_draw,
            ..shaders
        };
        Ok(std::mem::replace(&mut record.shaders, shaders))
    }

    /// Switches primitive smoothing.
    ///
    /// Contexts that cannot turn smoothing off keep drawing antialiased; the first such
    /// request per window logs a warning.
    pub fn set_antialiasing(&mut self, handle: Handle, on: bool) -> Result<()> {
        self.check_device_free()?;
        let record = self.registry.lookup_mut(handle)?;
        self.device.make_current(record.backend);
        match self.device.set_primitive_smoothing(on) {
            Ok(()) => {
                record.antialiasing = on;
                Ok(())
            }
            Err(DeviceError::Unsupported { what, backend }) => {
                if !record.smoothing_warned {
                    log::warn!(
                        "Window[{handle}]: {what} is not supported on the {backend} backend, primitives stay antialiased"
                    );
                    record.smoothing_warned = true;
                }
                record.antialiasing = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Starts a primitive group on `handle`.
    pub fn begin_group(&mut self, handle: Handle, kind: PrimitiveKind) -> Result<()> {
        if self.registry.lookup(handle)?.group.is_some() {
            return Err(ScreenError::AlreadyInGroup { handle });
        }
        self.check_device_free()?;

        let capacity = self.config.vertex_buffer_capacity;
        let device = self.device.as_mut();
        let record = self.registry.lookup_mut(handle)?;
        record.bind_for_drawing(device)?;
        let shader_bound = !record.shaders.current.is_none();
        let mut group = PrimitiveGroup::new(handle, kind, record.color, shader_bound, capacity);
        Arc::clone(&record.path).begin(device, &mut group)?;
        let classic = record.backend == BackendKind::Classic;
        record.group = Some(group);
        if classic {
            self.classic_group = Some(handle);
        }
        Ok(())
    }

    pub fn vertex4(&mut self, handle: Handle, x: f64, y: f64, z: f64, w: f64) -> Result<()> {
        let record = self.registry.lookup_mut(handle)?;
        let path = Arc::clone(&record.path);
        let group = record.group.as_mut().ok_or(ScreenError::NotInGroup { handle })?;
        let vertex = group.make_vertex([x as f32, y as f32, z as f32, w as f32]);
        path.vertex(self.device.as_mut(), group, vertex);
        Ok(())
    }

    /// Color of the following vertices of the current group.
    pub fn color(&mut self, handle: Handle, rgba: [f64; 4]) -> Result<()> {
        let record = self.registry.lookup_mut(handle)?;
        let color = ColorState::from_host(rgba, &record.color_range);
        let group = record.group.as_mut().ok_or(ScreenError::NotInGroup { handle })?;
        group.set_color(color);
        Ok(())
    }

    pub fn texcoord(&mut self, handle: Handle, strq: [f64; 4]) -> Result<()> {
        let record = self.registry.lookup_mut(handle)?;
        let group = record.group.as_mut().ok_or(ScreenError::NotInGroup { handle })?;
        group.set_texcoord(strq.map(|c| c as f32));
        Ok(())
    }

    /// Ends the current group and submits whatever the draw path still holds.
    pub fn end_group(&mut self, handle: Handle) -> Result<()> {
        let record = self.registry.lookup(handle)?;
        if record.group.is_none() {
            return Err(ScreenError::NotInGroup { handle });
        }
        if self.classic_group != Some(handle) {
            self.check_device_free()?;
        }
        self.classic_group = None;

        let device = self.device.as_mut();
        let record = self.registry.lookup_mut(handle)?;
        let mut group = record.group.take().ok_or(ScreenError::NotInGroup { handle })?;
        // another window may have been drawn to since the group began
        record.bind_for_drawing(device)?;
        Arc::clone(&record.path).end(device, &mut group)?;
        if group.dropped() > 0 {
            log::debug!(
                "Window[{handle}]: group of {} vertices ended, {} dropped",
                group.vertex_count(),
                group.dropped()
            );
        }
        Ok(())
    }

    /// Fills `rect`, the whole window by default, with the current color or `rgba`.
    pub fn fill_rect(&mut self, handle: Handle, rect: Option<Rect>, rgba: Option<[f64; 4]>) -> Result<()> {
        self.check_device_free()?;
        let rect = match rect {
            Some(r) => r,
            None => self.registry.lookup(handle)?.rect,
        };
        if !rect.is_valid() {
            return Err(ScreenError::invalid_argument("rect", format!("{rect:?} is inverted")));
        }
        if let Some(rgba) = rgba {
            self.set_color(handle, rgba)?;
        }
        if rect.is_empty() {
            return Ok(());
        }
        self.begin_group(handle, PrimitiveKind::Quads)?;
        for (x, y) in [
            (rect.left, rect.top),
            (rect.right, rect.top),
            (rect.right, rect.bottom),
            (rect.left, rect.bottom),
        ] {
            self.vertex4(handle, x, y, 0.0, 1.0)?;
        }
        self.end_group(handle)
    }

    /// Clears the drawing target of a window to `rgba`, or to the configured clear color.
    pub fn clear(&mut self, handle: Handle, rgba: Option<[f64; 4]>) -> Result<()> {
        if self.registry.lookup(handle)?.group.is_some() {
            return Err(ScreenError::AlreadyInGroup { handle });
        }
        self.check_device_free()?;

        let default = self.config.clear_color;
        let device = self.device.as_mut();
        let record = self.registry.lookup_mut(handle)?;
        let color = match rgba {
            Some(rgba) => ColorState::from_host(rgba, &record.color_range).clamped,
            None => default.map(|c| c as f32),
        };
        record.bind_for_drawing(device)?;
        device.clear(color)?;
        Ok(())
    }

    /// Stores a gamma table for the display collaborator to load at the next flip.
    pub fn defer_gamma_table(&mut self, handle: Handle, table: GammaTable) -> Result<()> {
        let record = self.registry.lookup_mut(handle)?;
        if record.kind() != WindowKind::Onscreen {
            return Err(ScreenError::WrongKind {
                handle,
                expected: "onscreen window",
                actual: record.kind().name(),
            });
        }
        if let Some(old) = record.pending_gamma.replace(Box::new(table)) {
            log::debug!("Window[{handle}]: pending gamma table of {} entries replaced", old.len());
        }
        Ok(())
    }

    pub fn take_deferred_gamma_table(&mut self, handle: Handle) -> Result<Option<GammaTable>> {
        let record = self.registry.lookup_mut(handle)?;
        Ok(record.pending_gamma.take().map(|table| *table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::PixelBuffer;
    use crate::render::backend::ProgramId;
    use crate::render::backends::null::{DeviceCall, NullDevice};
    use crate::render::backends::software::SoftwareDevice;
    use crate::screen::tests::{classic, null_device, software_screen};
    use crate::screen::OpenWindowOptions;

    fn pixel(screen: &mut Screen, win: Handle, x: u32, y: u32) -> [u8; 4] {
        let rect = Rect::new(x as f64, y as f64, x as f64 + 1.0, y as f64 + 1.0);
        screen.read_pixels(win, Some(rect)).unwrap().pixel(0, 0)
    }

    #[test]
    fn groups_do_not_nest() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(16, 16)).unwrap();
        assert!(matches!(screen.vertex4(win, 0.0, 0.0, 0.0, 1.0), Err(ScreenError::NotInGroup { .. })));
        assert!(matches!(screen.end_group(win), Err(ScreenError::NotInGroup { .. })));

        screen.begin_group(win, PrimitiveKind::Points).unwrap();
        assert!(matches!(
            screen.begin_group(win, PrimitiveKind::Lines),
            Err(ScreenError::AlreadyInGroup { .. })
        ));
        screen.end_group(win).unwrap();
    }

    #[test]
    fn classic_group_keeps_the_device_until_it_ends() {
        let mut screen = software_screen();
        let a = screen.open_window(classic(8, 8)).unwrap();
        let b = screen.open_window(classic(8, 8)).unwrap();
        let tex = screen.make_texture(b, PixelBuffer::solid(2, 2, [0, 255, 0, 255])).unwrap();
        let before = pixel(&mut screen, b, 1, 1);

        screen.set_color(a, [1.0, 0.0, 0.0, 1.0]).unwrap();
        screen.begin_group(a, PrimitiveKind::Points).unwrap();

        let busy = |r: Result<()>| matches!(r, Err(ScreenError::AlreadyInGroup { handle }) if handle == a);
        assert!(busy(screen.fill_rect(b, None, Some([0.0, 0.0, 1.0, 1.0]))));
        assert!(busy(screen.begin_group(b, PrimitiveKind::Lines)));
        assert!(busy(screen.clear(b, None)));
        assert!(busy(screen.draw_texture(b, tex, None, None, &Default::default())));
        assert!(busy(screen.copy_window(b, a, None, None)));
        assert!(busy(screen.read_pixels(b, None).map(|_| ())));
        assert!(busy(screen.close(tex)));
        // the rejected fill left b's color alone
        assert_eq!(screen.lookup(b).unwrap().color, ColorState::default());

        screen.vertex4(a, 1.5, 1.5, 0.0, 1.0).unwrap();
        screen.end_group(a).unwrap();

        assert_eq!(pixel(&mut screen, a, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&mut screen, b, 1, 1), before);
        screen.fill_rect(b, None, Some([0.0, 0.0, 1.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, b, 1, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn closing_the_window_of_a_classic_group_frees_the_device() {
        let mut screen = software_screen();
        let a = screen.open_window(classic(8, 8)).unwrap();
        let b = screen.open_window(classic(8, 8)).unwrap();
        screen.begin_group(a, PrimitiveKind::Points).unwrap();
        assert!(matches!(screen.close_all(), Err(ScreenError::AlreadyInGroup { .. })));

        screen.close(a).unwrap();
        screen.fill_rect(b, None, Some([0.0, 1.0, 0.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, b, 4, 4), [0, 255, 0, 255]);
    }

    #[test]
    fn batched_points_match_single_point_groups() {
        let points = [(1.5, 1.5), (4.5, 2.5), (7.5, 7.5), (2.5, 6.5)];
        let colors = [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0], [1.0, 1.0, 0.0, 1.0]];

        let mut screen = software_screen();
        let opts = OpenWindowOptions::new(10, 10).with_backend(BackendKind::Embedded);
        let batched = screen.open_window(opts.clone()).unwrap();
        let single = screen.open_window(opts).unwrap();

        screen.begin_group(batched, PrimitiveKind::Points).unwrap();
        for ((x, y), c) in points.iter().zip(colors) {
            screen.color(batched, c).unwrap();
            screen.vertex4(batched, *x, *y, 0.0, 1.0).unwrap();
        }
        screen.end_group(batched).unwrap();

        for ((x, y), c) in points.iter().zip(colors) {
            screen.set_color(single, c).unwrap();
            screen.begin_group(single, PrimitiveKind::Points).unwrap();
            screen.vertex4(single, *x, *y, 0.0, 1.0).unwrap();
            screen.end_group(single).unwrap();
        }

        let a = screen.read_pixels(batched, None).unwrap();
        let b = screen.read_pixels(single, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pixel(4, 2), [0, 255, 0, 255]);
    }

    #[test]
    fn buffered_path_issues_one_draw_per_group() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen
            .open_window(OpenWindowOptions::new(32, 32).with_backend(BackendKind::Embedded))
            .unwrap();
        screen.device_mut().as_any_mut().downcast_mut::<NullDevice>().unwrap().clear_calls();

        screen.fill_rect(win, Some(Rect::new(2.0, 2.0, 10.0, 10.0)), None).unwrap();
        let dev = null_device(&screen);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::ImmediateBegin(_))), 0);
        assert_eq!(
            dev.count(|c| matches!(
                c,
                DeviceCall::DrawArrays {
                    kind: PrimitiveKind::Triangles,
                    vertices: 6
                }
            )),
            1
        );
    }

    #[test]
    fn classic_path_uses_immediate_mode() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(32, 32)).unwrap();
        screen.fill_rect(win, None, Some([0.0, 0.0, 0.0, 1.0])).unwrap();
        let dev = null_device(&screen);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::ImmediateBegin(PrimitiveKind::Quads))), 1);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::ImmediateVertex)), 4);
        assert_eq!(dev.count(|c| matches!(c, DeviceCall::DrawArrays { .. })), 0);
    }

    #[test]
    fn vertex_buffer_overflow_drops_vertices() {
        let config = crate::config::ScreenConfig::builder().vertex_buffer_capacity(3).build().unwrap();
        let mut screen = Screen::new(Some(config), Box::new(NullDevice::new()));
        let win = screen
            .open_window(OpenWindowOptions::new(32, 32).with_backend(BackendKind::ModernDesktop))
            .unwrap();
        screen.begin_group(win, PrimitiveKind::Points).unwrap();
        for i in 0..5 {
            screen.vertex4(win, i as f64, 0.0, 0.0, 1.0).unwrap();
        }
        assert_eq!(screen.lookup(win).unwrap().group.as_ref().unwrap().dropped(), 2);
        screen.end_group(win).unwrap();
        let dev = null_device(&screen);
        assert_eq!(
            dev.count(|c| matches!(
                c,
                DeviceCall::DrawArrays {
                    kind: PrimitiveKind::Points,
                    vertices: 3
                }
            )),
            1
        );
    }

    #[test]
    fn fill_rect_uses_color_range() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(8, 8).with_color_range(255.0)).unwrap();
        screen.fill_rect(win, None, Some([0.0, 0.0, 255.0, 255.0])).unwrap();
        assert_eq!(pixel(&mut screen, win, 3, 3), [0, 0, 255, 255]);

        screen.color_range(win, 1.0, true).unwrap();
        screen.fill_rect(win, Some(Rect::new(0.0, 0.0, 4.0, 8.0)), Some([1.0, 0.0, 0.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, win, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&mut screen, win, 6, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn color_mask_and_blending_reach_the_device() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(4, 4)).unwrap();
        screen.clear(win, Some([0.0, 0.0, 0.0, 1.0])).unwrap();

        let old = screen.color_mask(win, [true, false, true, true]).unwrap();
        assert_eq!(old, ColorMask([true; 4]));
        screen.fill_rect(win, None, Some([1.0, 1.0, 1.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, win, 0, 0), [255, 0, 255, 255]);

        screen.color_mask(win, [true; 4]).unwrap();
        let old = screen.blend_function(win, "GL_ONE", "GL_ONE").unwrap();
        assert_eq!(old, BlendState::default());
        screen.fill_rect(win, None, Some([0.0, 0.5, 0.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, win, 0, 0), [255, 128, 255, 255]);

        assert!(matches!(
            screen.blend_function(win, "GL_ONE", "GL_NOPE"),
            Err(ScreenError::InvalidArgument { name: "blendFactor", .. })
        ));
    }

    #[test]
    fn smoothing_falls_back_once_on_embedded() {
        let mut screen = software_screen();
        let win = screen
            .open_window(OpenWindowOptions::new(8, 8).with_backend(BackendKind::Embedded))
            .unwrap();
        screen.set_antialiasing(win, false).unwrap();
        assert!(screen.lookup(win).unwrap().smoothing_warned);
        assert!(screen.lookup(win).unwrap().antialiasing);
        screen.set_antialiasing(win, false).unwrap();
        screen.set_antialiasing(win, true).unwrap();
        assert!(screen.lookup(win).unwrap().antialiasing);

        let dev = screen.device().as_any().downcast_ref::<SoftwareDevice>().unwrap();
        assert!(dev.smoothing());
    }

    #[test]
    fn stereo_buffers_need_a_stereo_window() {
        let mut screen = software_screen();
        let mono = screen.open_window(classic(8, 8)).unwrap();
        assert!(screen.select_stereo_draw_buffer(mono, StereoDrawBuffer::Right).is_err());

        let stereo = screen
            .open_window(classic(8, 8).with_stereo(true).with_imaging_pipeline(true))
            .unwrap();
        screen.select_stereo_draw_buffer(stereo, StereoDrawBuffer::Right).unwrap();
        screen.fill_rect(stereo, None, Some([1.0, 0.0, 0.0, 1.0])).unwrap();
        assert_eq!(pixel(&mut screen, stereo, 0, 0), [255, 0, 0, 255]);

        screen.select_stereo_draw_buffer(stereo, StereoDrawBuffer::Left).unwrap();
        assert_eq!(pixel(&mut screen, stereo, 0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn shaders_route_the_unclamped_color() {
        let mut screen = Screen::new(None, Box::new(NullDevice::new()));
        let win = screen.open_window(classic(8, 8)).unwrap();
        screen.color_range(win, 1.0, false).unwrap();
        screen
            .set_shaders(
                win,
                ShaderBindings {
                    default_draw: ProgramId(3),
                    ..ShaderBindings::default()
                },
            )
            .unwrap();
        assert_eq!(screen.lookup(win).unwrap().shaders.current, ProgramId(3));

        screen.set_color(win, [2.0, 0.5, 0.0, 1.0]).unwrap();
        screen.begin_group(win, PrimitiveKind::Points).unwrap();
        let v = screen.lookup(win).unwrap().group.as_ref().unwrap().make_vertex([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(v.color, [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(v.texcoord, [2.0, 0.5, 0.0, 1.0]);
        screen.end_group(win).unwrap();
    }

    #[test]
    fn gamma_tables_wait_for_the_display() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(8, 8)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        let table = GammaTable::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();

        assert!(screen.defer_gamma_table(tex, table.clone()).is_err());
        screen.defer_gamma_table(win, table.clone()).unwrap();
        assert_eq!(screen.take_deferred_gamma_table(win).unwrap(), Some(table));
        assert_eq!(screen.take_deferred_gamma_table(win).unwrap(), None);
    }
}
