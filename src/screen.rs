//! The screen: registry of windows and textures bound to one render device.
//!
//! [`Screen`] is what the command-dispatch layer of a scripting host talks to. It opens and
//! closes onscreen windows, offscreen windows, textures and proxies, keeps their drawing state
//! and forwards drawing and blitting to the device through each window's draw path.
//!
//! ```
//! use stimgl::geometry::Rect;
//! use stimgl::pixels::PixelBuffer;
//! use stimgl::render::SoftwareDevice;
//! use stimgl::screen::{OpenWindowOptions, Screen};
//! use stimgl::blit::{BlitOptions, FilterMode};
//!
//! # fn main() -> Result<(), stimgl::errors::ScreenError> {
//! let mut screen = Screen::new(None, Box::new(SoftwareDevice::new()));
//! let win = screen.open_window(OpenWindowOptions::new(800, 600))?;
//! let tex = screen.make_texture(win, PixelBuffer::solid(64, 64, [255, 0, 0, 255]))?;
//!
//! let opts = BlitOptions::default().with_filter(FilterMode::Nearest);
//! screen.draw_texture(win, tex, None, Some(Rect::from_size(64.0, 64.0)), &opts)?;
//!
//! let pixels = screen.read_pixels(win, Some(Rect::new(32.0, 32.0, 33.0, 33.0)))?;
//! assert_eq!(pixels.pixel(0, 0), [255, 0, 0, 255]);
//! # Ok(()) }
//! ```

mod blitting;
mod drawing;
mod loader;
mod options;
mod query;

pub use loader::{LoadJob, LoadTicket, TextureLoader};
pub use options::{OffscreenOptions, OpenWindowOptions, TextureOptions};
pub use query::{QueryField, QueryValue};

use crate::config::ScreenConfig;
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::record::{FboDescriptor, FboRole, KindFilter, ResourceRecord, SharedState, SpecialFlags, TextureStore, WindowKind};
use crate::registry::{Handle, Registry};
use crate::render::backend::{
    note_onscreen_closed, note_onscreen_opened, BackendKind, ContextDomain, FallbackBackend, FramebufferId,
    RenderDevice, TexelFormat, TextureDesc,
};
use crate::render::caps::GfxCaps;
use crate::render::color::ColorRange;

pub struct Screen {
    config: ScreenConfig,
    registry: Registry,
    device: Box<dyn RenderDevice>,
    loader: Option<TextureLoader>,
    fallback: FallbackBackend,
    // window whose classic group holds the device's native immediate mode
    classic_group: Option<Handle>,
}

impl Screen {
    /// Creates a screen drawing through `device`. Without a config the defaults are used.
    pub fn new(config: Option<ScreenConfig>, device: Box<dyn RenderDevice>) -> Self {
        let config = config.unwrap_or_default();
        log::debug!("Screen: created on {} device", device.name());
        Self {
            registry: Registry::from_config(&config),
            config,
            device,
            loader: None,
            fallback: FallbackBackend::default(),
            classic_group: None,
        }
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn device(&self) -> &dyn RenderDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn RenderDevice {
        self.device.as_mut()
    }

    pub fn lookup(&self, handle: Handle) -> Result<&ResourceRecord> {
        self.registry.lookup(handle)
    }

    /// Backend kind of `handle`'s window.
    ///
    /// Without a live record this is the backend of the first onscreen window this screen
    /// opened, for as long as it has onscreen windows open, then the configured default.
    pub fn backend_of(&self, handle: Option<Handle>) -> BackendKind {
        handle
            .and_then(|h| self.registry.lookup(h).ok())
            .map(|r| r.backend)
            .or(self.fallback.get())
            .or(self.config.default_backend)
            .unwrap_or(BackendKind::Classic)
    }

    pub fn is_classic(&self, handle: Option<Handle>) -> bool {
        self.backend_of(handle) == BackendKind::Classic
    }

    pub fn is_embedded(&self, handle: Option<Handle>) -> bool {
        self.backend_of(handle) == BackendKind::Embedded
    }

    /// Opens an onscreen window. Either the window opens completely or nothing is left behind.
    pub fn open_window(&mut self, options: OpenWindowOptions) -> Result<Handle> {
        options.validate()?;
        self.check_device_free()?;
        let backend = options
            .backend
            .or(self.config.default_backend)
            .unwrap_or(BackendKind::Classic);

        let handle = self.registry.allocate(WindowKind::Onscreen)?;
        if let Err(e) = self.populate_window(handle, &options, backend) {
            log::warn!("Window[{handle}]: open failed: {e}");
            self.discard(handle);
            return Err(e);
        }
        self.registry.mark_valid(handle)?;
        self.fallback.window_opened(backend);
        note_onscreen_opened(backend);
        log::debug!(
            "Window[{handle}]: opened {}x{} {backend} window",
            options.width,
            options.height
        );
        Ok(handle)
    }

    fn populate_window(&mut self, handle: Handle, options: &OpenWindowOptions, backend: BackendKind) -> Result<()> {
        let info = self.device.info();
        let caps = GfxCaps::probe(&info, backend);
        let color_range = ColorRange::new(options.color_range.unwrap_or(self.config.default_color_range), true)?;
        let clear = self.clear_color();
        let device = self.device.as_mut();
        let record = self.registry.construct_mut(handle)?;

        record.rect = Rect::from_size(options.width as f64, options.height as f64);
        record.bpc = options.bpc;
        record.depth = options.bpc as u32 * 4;
        record.multisample = options.multisample;
        record.stereo = options.stereo;
        record.caps = caps;
        record.max_texture_size = info.max_texture_size;
        record.color_range = color_range;
        record.domain = ContextDomain::new();
        record.set_backend(backend);

        if options.imaging_pipeline && options.multisample > 0 && !caps.contains(GfxCaps::FBO_MULTISAMPLE) {
            log::warn!("Window[{handle}]: multisampled framebuffers are unsupported, multisampling disabled");
            record.multisample = 0;
        }

        device.make_current(backend);
        record.system_framebuffer = Some(device.create_window_surface(options.width, options.height, record.multisample)?);

        if options.imaging_pipeline {
            if !caps.contains(GfxCaps::FBO) {
                return Err(ScreenError::UnsupportedOnBackend {
                    what: "the framebuffer imaging pipeline",
                    backend,
                });
            }
            if !caps.supports_fbo_bpc(options.bpc) {
                return Err(ScreenError::UnsupportedOnBackend {
                    what: "floating point framebuffers",
                    backend,
                });
            }
            let roles: &[FboRole] = if options.stereo {
                &[FboRole::LeftEye, FboRole::RightEye]
            } else {
                &[FboRole::LeftEye]
            };
            for &role in roles {
                let desc = owned_framebuffer(device, options.width, options.height, record.texel_format(), record.multisample)?;
                record.fbos.insert(role, desc);
            }
        }

        let mut targets: Vec<FramebufferId> = record.system_framebuffer.into_iter().collect();
        targets.extend(
            [FboRole::LeftEye, FboRole::RightEye]
                .iter()
                .filter_map(|role| record.fbos.get(*role).map(|d| d.fbo)),
        );
        clear_framebuffers(device, record, &targets, clear)
    }

    /// Opens an offscreen window with the given pixel depth, sharing `parent`'s context.
    pub fn open_offscreen(&mut self, parent: Handle, rect: Rect, depth: u32) -> Result<Handle> {
        self.open_offscreen_with(parent, rect, OffscreenOptions::default().with_depth(depth))
    }

    pub fn open_offscreen_with(&mut self, parent: Handle, rect: Rect, options: OffscreenOptions) -> Result<Handle> {
        check_size("rect", rect)?;
        self.check_device_free()?;
        let bpc = options.bpc()?;
        let shared = self.parent_state(parent)?;

        let handle = self.registry.allocate(WindowKind::Offscreen)?;
        if let Err(e) = self.populate_offscreen(handle, shared, rect, bpc, options) {
            log::warn!("Window[{handle}]: open of offscreen window failed: {e}");
            self.discard(handle);
            return Err(e);
        }
        self.registry.mark_valid(handle)?;
        log::debug!("Window[{handle}]: opened offscreen window {rect:?} on {parent}");
        Ok(handle)
    }

    fn populate_offscreen(
        &mut self,
        handle: Handle,
        shared: SharedState,
        rect: Rect,
        bpc: u8,
        options: OffscreenOptions,
    ) -> Result<()> {
        let clear = self.clear_color();
        let device = self.device.as_mut();
        let record = self.registry.construct_mut(handle)?;
        record.inherit(shared);
        record.rect = rect.normalized();
        record.special_flags = options.special_flags;

        let caps = record.caps;
        if !caps.contains(GfxCaps::FBO) {
            return Err(ScreenError::UnsupportedOnBackend {
                what: "offscreen windows without framebuffer objects",
                backend: record.backend,
            });
        }
        record.bpc = match bpc {
            8 => 8,
            b if caps.supports_fbo_bpc(b) => b,
            32 if caps.supports_fbo_bpc(16) => {
                log::warn!("Window[{handle}]: 32 bit float framebuffers unsupported, using 16 bit");
                16
            }
            b => {
                log::warn!("Window[{handle}]: {b} bit float framebuffers unsupported, using 8 bit");
                8
            }
        };
        record.depth = record.bpc as u32 * 4;
        record.multisample = options.multisample;
        if record.multisample > 0 && !caps.contains(GfxCaps::FBO_MULTISAMPLE) {
            log::warn!("Window[{handle}]: multisampled framebuffers are unsupported, multisampling disabled");
            record.multisample = 0;
        }

        let (_, _, width, height) = record.rect.to_pixels();
        device.make_current(record.backend);
        let color = device.create_texture(&TextureDesc {
            width,
            height,
            format: record.texel_format(),
        })?;
        // the color attachment doubles as the texture the window is drawn from
        record.store = TextureStore::Gpu(color);
        let fbo = device.create_framebuffer(color, record.multisample)?;
        record.fbos.insert(
            FboRole::LeftEye,
            FboDescriptor {
                fbo,
                color,
                owns_color: false,
                width,
                height,
                multisample: record.multisample,
            },
        );
        clear_framebuffers(device, record, &[fbo], clear)
    }

    /// Creates a texture from collaborator pixels, sharing `parent`'s context.
    pub fn make_texture(&mut self, parent: Handle, pixels: PixelBuffer) -> Result<Handle> {
        self.make_texture_with(parent, pixels, TextureOptions::default())
    }

    /// The pixels stay on the CPU until the texture is first drawn or preloaded.
    pub fn make_texture_with(&mut self, parent: Handle, pixels: PixelBuffer, options: TextureOptions) -> Result<Handle> {
        options::check_bpc(options.bpc)?;
        let shared = self.parent_state(parent)?;
        let max = shared.max_texture_size;
        if max > 0 && (pixels.width > max || pixels.height > max) {
            return Err(ScreenError::invalid_argument(
                "image",
                format!("{}x{} exceeds the maximum texture size {max}", pixels.width, pixels.height),
            ));
        }
        let bpc = match options.bpc {
            16 if !shared.caps.contains(GfxCaps::FP_TEX16) => {
                log::warn!("Window[{parent}]: 16 bit float textures unsupported, using 8 bit");
                8
            }
            32 if !shared.caps.contains(GfxCaps::FP_TEX32) => {
                log::warn!("Window[{parent}]: 32 bit float textures unsupported, using 8 bit");
                8
            }
            b => b,
        };

        let handle = self.registry.allocate(WindowKind::Texture)?;
        let record = self.registry.construct_mut(handle)?;
        record.inherit(shared);
        record.rect = Rect::from_size(pixels.width as f64, pixels.height as f64);
        record.channels = pixels.channels;
        record.bpc = bpc;
        record.depth = pixels.channels as u32 * bpc as u32;
        record.special_flags = options.special_flags;
        record.shaders.texture_filter = options.filter_shader;
        record.store = TextureStore::Cpu(pixels);
        self.registry.mark_valid(handle)?;
        log::debug!("Window[{handle}]: created texture on {parent}");
        Ok(handle)
    }

    /// Opens a proxy: a record with geometry and drawing state but no pixels.
    pub fn open_proxy(&mut self, parent: Handle, rect: Rect) -> Result<Handle> {
        check_size("rect", rect)?;
        let shared = self.parent_state(parent)?;
        let handle = self.registry.allocate(WindowKind::Proxy)?;
        let record = self.registry.construct_mut(handle)?;
        record.inherit(shared);
        record.rect = rect.normalized();
        self.registry.mark_valid(handle)?;
        Ok(handle)
    }

    /// Closes one record. Windows that still have open children cannot be closed.
    pub fn close(&mut self, handle: Handle) -> Result<()> {
        self.registry.lookup(handle)?;
        if self.classic_group != Some(handle) {
            self.check_device_free()?;
        }
        let children = self.children_of(handle);
        if !children.is_empty() {
            return Err(ScreenError::HasChildren {
                handle,
                children: children.len(),
            });
        }
        self.destroy(handle)
    }

    /// Closes every record, children before their parents, and returns how many were closed.
    ///
    /// Records flagged [`SpecialFlags::DONT_CLOSE_ON_CLOSE_ALL`] stay open, and so do their
    /// parents.
    pub fn close_all(&mut self) -> Result<usize> {
        self.check_device_free()?;
        self.close_many(false)
    }

    fn close_many(&mut self, force: bool) -> Result<usize> {
        self.abort_classic_group();
        let mut order: Vec<(usize, Handle)> = self
            .registry
            .enumerate(KindFilter::Any)
            .into_iter()
            .map(|h| (self.depth_of(h), h))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.index().cmp(&b.1.index())));

        let mut closed = 0;
        for (_, handle) in order {
            let Ok(record) = self.registry.lookup(handle) else {
                continue;
            };
            if !force {
                if record.special_flags.contains(SpecialFlags::DONT_CLOSE_ON_CLOSE_ALL) {
                    log::debug!("Window[{handle}]: kept open on close all");
                    continue;
                }
                let children = self.children_of(handle).len();
                if children > 0 {
                    log::warn!("Window[{handle}]: kept open, {children} children are still open");
                    continue;
                }
            }
            self.destroy(handle)?;
            closed += 1;
        }
        Ok(closed)
    }

    fn destroy(&mut self, handle: Handle) -> Result<()> {
        if self.classic_group == Some(handle) {
            self.abort_classic_group();
        }
        let record = self.registry.lookup_mut(handle)?;
        if let Some(group) = record.group.take() {
            log::warn!(
                "Window[{handle}]: closed inside a primitive group, {} vertices discarded",
                group.vertex_count()
            );
        }
        let kind = record.kind();
        record.release_gpu_objects(self.device.as_mut());
        self.registry.release(handle)?;

        if kind == WindowKind::Onscreen {
            self.fallback.window_closed();
            note_onscreen_closed();
        }
        log::debug!("Window[{handle}]: closed {}", kind.name());
        Ok(())
    }

    /// Fails while a classic group holds the device.
    ///
    /// Native immediate mode belongs to the device, so nothing may bind or draw until the
    /// group that started it has ended.
    fn check_device_free(&self) -> Result<()> {
        match self.classic_group {
            Some(owner) => Err(ScreenError::AlreadyInGroup { handle: owner }),
            None => Ok(()),
        }
    }

    /// Ends the device's immediate mode for a classic group whose window goes away.
    fn abort_classic_group(&mut self) {
        let Some(owner) = self.classic_group.take() else {
            return;
        };
        let device = self.device.as_mut();
        if let Ok(record) = self.registry.lookup_mut(owner) {
            if let Some(group) = record.group.take() {
                log::warn!(
                    "Window[{owner}]: classic group of {} vertices abandoned",
                    group.vertex_count()
                );
            }
        }
        if let Err(e) = device.immediate_end() {
            log::error!("Window[{owner}]: cannot leave immediate mode: {e}");
        }
    }

    /// Drops a record that failed to populate, with whatever GPU objects it got so far.
    fn discard(&mut self, handle: Handle) {
        if let Ok(record) = self.registry.construct_mut(handle) {
            record.release_gpu_objects(self.device.as_mut());
        }
        if let Err(e) = self.registry.release(handle) {
            log::error!("Window[{handle}]: cannot release partially opened record: {e}");
        }
    }

    /// Live records whose parent is `handle`.
    pub fn children_of(&self, handle: Handle) -> Vec<Handle> {
        self.registry
            .enumerate(KindFilter::Any)
            .into_iter()
            .filter(|h| {
                self.registry
                    .lookup(*h)
                    .map(|r| r.parent == Some(handle))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn depth_of(&self, handle: Handle) -> usize {
        let mut depth = 0;
        let mut next = self.registry.lookup(handle).ok().and_then(|r| r.parent);
        while let Some(parent) = next {
            match self.registry.lookup(parent) {
                Ok(record) => next = record.parent,
                Err(_) => break,
            }
            depth += 1;
            if depth > self.registry.live() {
                break;
            }
        }
        depth
    }

    fn parent_state(&self, parent: Handle) -> Result<SharedState> {
        let record = self.registry.lookup(parent)?;
        if !record.kind().is_window() {
            return Err(ScreenError::WrongKind {
                handle: parent,
                expected: "onscreen or offscreen window",
                actual: record.kind().name(),
            });
        }
        Ok(record.shared_state())
    }

    fn clear_color(&self) -> [f32; 4] {
        self.config.clear_color.map(|c| c as f32)
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        if self.registry.live() == 0 {
            return;
        }
        match self.close_many(true) {
            Ok(n) => log::debug!("Screen: closed {n} remaining windows and textures"),
            Err(e) => log::error!("Screen: shutdown failed: {e}"),
        }
    }
}

/// Creates a color texture with a framebuffer object rendering into it.
pub(crate) fn owned_framebuffer(
    device: &mut dyn RenderDevice,
    width: u32,
    height: u32,
    format: TexelFormat,
    multisample: u32,
) -> Result<FboDescriptor> {
    let color = device.create_texture(&TextureDesc { width, height, format })?;
    match device.create_framebuffer(color, multisample) {
        Ok(fbo) => Ok(FboDescriptor {
            fbo,
            color,
            owns_color: true,
            width,
            height,
            multisample,
        }),
        Err(e) => {
            device.delete_texture(color);
            Err(e.into())
        }
    }
}

fn clear_framebuffers(
    device: &mut dyn RenderDevice,
    record: &ResourceRecord,
    targets: &[FramebufferId],
    color: [f32; 4],
) -> Result<()> {
    device.set_color_mask(record.color_mask);
    for fbo in targets {
        device.bind_framebuffer(*fbo)?;
        device.clear(color)?;
    }
    Ok(())
}

fn check_size(name: &'static str, rect: Rect) -> Result<()> {
    if !rect.is_valid() || rect.is_empty() {
        return Err(ScreenError::invalid_argument(name, format!("{rect:?} is empty or inverted")));
    }
    Ok(())
}

/// `rect` must lie inside `bounds`.
pub(crate) fn check_inside(arg: &'static str, rect: Rect, bounds: Rect) -> Result<()> {
    if !rect.is_valid() || !bounds.contains(&rect) {
        return Err(ScreenError::OutOfBoundsRect { arg, rect, bounds });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvalidHandleReason;
    use crate::render::backends::null::{DeviceCall, NullDevice};
    use crate::render::backends::software::SoftwareDevice;

    pub(super) fn software_screen() -> Screen {
        Screen::new(None, Box::new(SoftwareDevice::new()))
    }

    pub(super) fn classic(width: u32, height: u32) -> OpenWindowOptions {
        OpenWindowOptions::new(width, height).with_backend(BackendKind::Classic)
    }

    pub(super) fn null_device(screen: &Screen) -> &NullDevice {
        screen.device().as_any().downcast_ref::<NullDevice>().unwrap()
    }

    #[test]
    fn live_count_follows_opens_and_closes() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(64, 64)).unwrap();
        let mut open = vec![];
        for i in 0..5 {
            open.push(screen.make_texture(win, PixelBuffer::solid(4, 4, [i, 0, 0, 255])).unwrap());
            assert_eq!(screen.registry().count(KindFilter::Any), open.len() + 1);
        }
        while let Some(tex) = open.pop() {
            screen.close(tex).unwrap();
            assert_eq!(screen.registry().count(KindFilter::Any), open.len() + 1);
        }
        screen.close(win).unwrap();
        assert_eq!(screen.registry().count(KindFilter::Any), 0);
    }

    #[test]
    fn backend_without_a_record_follows_this_screens_windows() {
        let modern = ScreenConfig::builder()
            .default_backend(BackendKind::ModernDesktop)
            .build()
            .unwrap();
        let mut first = Screen::new(Some(modern.clone()), Box::new(SoftwareDevice::new()));
        let mut second = Screen::new(Some(modern), Box::new(SoftwareDevice::new()));
        assert_eq!(second.backend_of(None), BackendKind::ModernDesktop);

        let embedded = first
            .open_window(OpenWindowOptions::new(8, 8).with_backend(BackendKind::Embedded))
            .unwrap();
        let classic_win = second.open_window(classic(8, 8)).unwrap();
        assert!(first.is_embedded(None));
        assert!(second.is_classic(None));

        // the first window decides until the last one closes
        let later = second
            .open_window(OpenWindowOptions::new(8, 8).with_backend(BackendKind::Embedded))
            .unwrap();
        second.close(classic_win).unwrap();
        assert!(second.is_classic(None));

        first.close(embedded).unwrap();
        assert_eq!(first.backend_of(None), BackendKind::ModernDesktop);
        assert!(second.is_classic(None));

        second.close(later).unwrap();
        assert_eq!(second.backend_of(None), BackendKind::ModernDesktop);
        // a stale handle falls back like no handle
        assert_eq!(second.backend_of(Some(later)), BackendKind::ModernDesktop);
    }

    #[test]
    fn closed_handles_are_rejected() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(64, 64)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        screen.close(tex).unwrap();
        assert!(matches!(
            screen.lookup(tex),
            Err(ScreenError::InvalidHandle {
                reason: InvalidHandleReason::Stale,
                ..
            })
        ));
        assert!(matches!(
            screen.lookup(Handle::from_raw(100)),
            Err(ScreenError::InvalidHandle {
                reason: InvalidHandleReason::Empty,
                ..
            })
        ));

        // the slot is reused, the old handle stays invalid
        let again = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        assert_eq!(again.index(), tex.index());
        assert!(matches!(
            screen.close(tex),
            Err(ScreenError::InvalidHandle {
                reason: InvalidHandleReason::Stale,
                ..
            })
        ));
    }

    #[test]
    fn windows_with_children_cannot_be_closed() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(64, 64)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        let tex = screen.make_texture(off, PixelBuffer::solid(2, 2, [0; 4])).unwrap();

        assert!(matches!(screen.close(win), Err(ScreenError::HasChildren { children: 1, .. })));
        assert!(matches!(screen.close(off), Err(ScreenError::HasChildren { .. })));
        screen.close(tex).unwrap();
        screen.close(off).unwrap();
        screen.close(win).unwrap();
    }

    #[test]
    fn close_all_goes_children_first_and_keeps_flagged_records() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(64, 64)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(16.0, 16.0), 32).unwrap();
        let _tex = screen.make_texture(off, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        let kept = screen
            .make_texture_with(
                win,
                PixelBuffer::solid(2, 2, [0; 4]),
                TextureOptions::default().with_special_flags(SpecialFlags::DONT_CLOSE_ON_CLOSE_ALL),
            )
            .unwrap();

        // the kept texture also keeps its parent window alive
        assert_eq!(screen.close_all().unwrap(), 2);
        assert!(screen.lookup(kept).is_ok());
        assert!(screen.lookup(win).is_ok());
        assert!(screen.lookup(off).is_err());

        screen.close(kept).unwrap();
        assert_eq!(screen.close_all().unwrap(), 1);
        assert_eq!(screen.registry().count(KindFilter::Any), 0);
    }

    #[test]
    fn children_inherit_context_state_once() {
        let mut screen = software_screen();
        let win = screen
            .open_window(OpenWindowOptions::new(32, 32).with_backend(BackendKind::ModernDesktop))
            .unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        let parent = screen.lookup(win).unwrap();
        let child = screen.lookup(tex).unwrap();
        assert_eq!(child.parent, Some(win));
        assert_eq!(child.domain, parent.domain);
        assert!(child.domain.is_assigned());
        assert_eq!(child.backend, BackendKind::ModernDesktop);
        assert_eq!(child.caps, parent.caps);
        assert!(!screen.is_classic(Some(tex)));
    }

    #[test]
    fn closing_parent_of_closed_child_leaves_registry_intact() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(32, 32)).unwrap();
        let other = screen.open_window(classic(32, 32)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        screen.close(tex).unwrap();
        screen.close(win).unwrap();

        assert_eq!(screen.registry().enumerate(KindFilter::Any), vec![other]);
        assert_eq!(screen.lookup(other).unwrap().resolve_root(screen.registry()), other);
    }

    #[test]
    fn failed_open_leaves_nothing_behind() {
        let caps = GfxCaps::all() - GfxCaps::FBO;
        let mut screen = Screen::new(None, Box::new(NullDevice::with_caps(caps)));
        let err = screen
            .open_window(classic(32, 32).with_imaging_pipeline(true))
            .unwrap_err();
        assert!(matches!(err, ScreenError::UnsupportedOnBackend { .. }));
        assert_eq!(screen.registry().live(), 0);

        let dev = null_device(&screen);
        let created = dev.count(|c| matches!(c, DeviceCall::CreateWindowSurface { .. }));
        let deleted = dev.count(|c| matches!(c, DeviceCall::DeleteFramebuffer(_)));
        assert_eq!((created, deleted), (1, 1));
    }

    #[test]
    fn imaging_pipeline_windows_render_into_fbos() {
        let mut screen = software_screen();
        let win = screen
            .open_window(classic(32, 32).with_imaging_pipeline(true).with_stereo(true))
            .unwrap();
        let record = screen.lookup(win).unwrap();
        assert!(record.is_fbo_backed());
        assert!(record.fbos.contains(FboRole::RightEye));
        assert!(record.system_framebuffer.is_some());
    }

    #[test]
    fn offscreen_windows_fall_back_to_supported_precision() {
        let caps = GfxCaps::all() - GfxCaps::FP_FBO32;
        let mut screen = Screen::new(None, Box::new(SoftwareDevice::with_caps(caps)));
        let win = screen.open_window(classic(32, 32)).unwrap();
        let off = screen.open_offscreen(win, Rect::new(10.0, 10.0, 26.0, 26.0), 128).unwrap();
        let record = screen.lookup(off).unwrap();
        assert_eq!(record.bpc, 16);
        assert_eq!(record.rect, Rect::from_size(16.0, 16.0));
        assert!(record.store.is_resident());

        assert!(matches!(
            screen.open_offscreen(win, Rect::from_size(8.0, 8.0), 7),
            Err(ScreenError::InvalidArgument { name: "pixelSize", .. })
        ));
    }

    #[test]
    fn textures_need_a_window_parent() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(32, 32)).unwrap();
        let tex = screen.make_texture(win, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        assert!(matches!(
            screen.make_texture(tex, PixelBuffer::solid(2, 2, [0; 4])),
            Err(ScreenError::WrongKind { actual: "texture", .. })
        ));
        let proxy = screen.open_proxy(win, Rect::from_size(10.0, 10.0)).unwrap();
        assert!(matches!(screen.lookup(proxy).unwrap().store, TextureStore::Unallocated));
    }

    #[test]
    fn oversized_textures_are_rejected() {
        let mut screen = Screen::new(None, Box::new(SoftwareDevice::new().with_max_texture_size(8)));
        let win = screen.open_window(classic(8, 8)).unwrap();
        assert!(matches!(
            screen.make_texture(win, PixelBuffer::solid(16, 4, [0; 4])),
            Err(ScreenError::InvalidArgument { name: "image", .. })
        ));
        assert_eq!(screen.registry().count(KindFilter::Textures), 0);
    }

    #[test]
    fn dropping_the_screen_releases_all_gpu_objects() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(16, 16).with_imaging_pipeline(true)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(8.0, 8.0), 32).unwrap();
        let tex = screen.make_texture(off, PixelBuffer::solid(2, 2, [0; 4])).unwrap();
        screen.preload_textures(&[tex]).unwrap();

        let count = screen.close_many(true).unwrap();
        assert_eq!(count, 3);
        let dev = screen.device().as_any().downcast_ref::<SoftwareDevice>().unwrap();
        assert_eq!(dev.texture_count(), 0);
        assert_eq!(dev.framebuffer_count(), 0);
    }
}
