//! C interface for the scripting host.
//!
//! Handles cross the boundary as their raw 64 bit value. Functions that create a record return
//! the raw handle, or a negative [`ScreenError::code`] on failure. Status returning functions
//! return 0 on success.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::blit::{BlitOptions, FilterMode};
use crate::config::ScreenConfig;
use crate::errors::{Result, ScreenError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;
use crate::registry::Handle;
use crate::render::backend::BackendKind;
use crate::render::SoftwareDevice;
use crate::screen::{OpenWindowOptions, QueryField, Screen};

#[repr(C)]
pub struct StimglScreenHandle(*mut Screen);

impl StimglScreenHandle {
    fn null() -> Self {
        StimglScreenHandle(ptr::null_mut())
    }

    fn screen(&self) -> Result<&mut Screen> {
        if self.0.is_null() {
            return Err(ScreenError::invalid_argument("screen", "null screen handle"));
        }
        // SAFETY: non-null handles come from `Box::into_raw` and stay valid until freed
        Ok(unsafe { &mut *self.0 })
    }
}

fn handle_arg(raw: i64) -> Result<Handle> {
    if raw < 0 {
        return Err(ScreenError::invalid_argument("handle", format!("{raw} is not a handle")));
    }
    Ok(Handle::from_raw(raw as u64))
}

fn str_arg<'a>(name: &'static str, s: *const c_char) -> Result<Option<&'a str>> {
    if s.is_null() {
        return Ok(None);
    }
    // SAFETY: the caller passes a NUL terminated string
    let s = unsafe { CStr::from_ptr(s) };
    s.to_str()
        .map(Some)
        .map_err(|e| ScreenError::invalid_argument(name, format!("not UTF-8: {e}")))
}

/// Reads left, top, right, bottom from a nullable pointer.
fn rect_arg(r: *const f64) -> Option<Rect> {
    if r.is_null() {
        return None;
    }
    // SAFETY: a non-null rect points to four doubles
    let r = unsafe { std::slice::from_raw_parts(r, 4) };
    Some(Rect::new(r[0], r[1], r[2], r[3]))
}

fn color_arg(c: *const f64) -> Option<[f64; 4]> {
    if c.is_null() {
        return None;
    }
    // SAFETY: a non-null color points to four doubles
    let c = unsafe { std::slice::from_raw_parts(c, 4) };
    Some([c[0], c[1], c[2], c[3]])
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("ffi: {e}");
            e.code()
        }
    }
}

fn handle_or_code(result: Result<Handle>) -> i64 {
    match result {
        Ok(h) => h.to_raw() as i64,
        Err(e) => {
            log::error!("ffi: {e}");
            e.code() as i64
        }
    }
}

/// Creates a screen with default configuration on the software device.
#[no_mangle]
pub extern "C" fn stimgl_screen_new() -> StimglScreenHandle {
    let screen = Box::new(Screen::new(None, Box::new(SoftwareDevice::new())));
    StimglScreenHandle(Box::into_raw(screen))
}

/// Like [`stimgl_screen_new`], configured from a JSON document. Returns a null handle when
/// the configuration is invalid.
#[no_mangle]
pub extern "C" fn stimgl_screen_new_with_config(json: *const c_char) -> StimglScreenHandle {
    let config = match str_arg("config", json) {
        Ok(Some(json)) => ScreenConfig::from_json_str(json),
        Ok(None) => Ok(ScreenConfig::default()),
        Err(e) => Err(e.into()),
    };
    match config {
        Ok(config) => {
            let screen = Box::new(Screen::new(Some(config), Box::new(SoftwareDevice::new())));
            StimglScreenHandle(Box::into_raw(screen))
        }
        Err(e) => {
            log::error!("ffi: invalid screen configuration: {e:#}");
            StimglScreenHandle::null()
        }
    }
}

#[no_mangle]
pub extern "C" fn stimgl_screen_free(handle: StimglScreenHandle) {
    if !handle.0.is_null() {
        unsafe {
            let _ = Box::from_raw(handle.0);
        }
    }
}

/// Opens an onscreen window. `backend` may be null for the configured default.
#[no_mangle]
pub extern "C" fn stimgl_open_window(
    handle: StimglScreenHandle,
    width: u32,
    height: u32,
    backend: *const c_char,
) -> i64 {
    handle_or_code((|| -> Result<Handle> {
        let screen = handle.screen()?;
        let mut options = OpenWindowOptions::new(width, height);
        if let Some(name) = str_arg("backend", backend)? {
            let kind = name
                .parse::<BackendKind>()
                .map_err(|e| ScreenError::invalid_argument("backend", e))?;
            options = options.with_backend(kind);
        }
        screen.open_window(options)
    })())
}

/// Creates a texture from `height` rows of `stride` bytes each.
#[no_mangle]
pub extern "C" fn stimgl_make_texture(
    handle: StimglScreenHandle,
    parent: i64,
    data: *const u8,
    width: u32,
    height: u32,
    channels: u8,
    stride: u32,
) -> i64 {
    handle_or_code((|| -> Result<Handle> {
        let screen = handle.screen()?;
        let parent = handle_arg(parent)?;
        if data.is_null() {
            return Err(ScreenError::invalid_argument("data", "null pixel pointer"));
        }
        let len = stride as usize * height as usize;
        // SAFETY: the caller owns `len` readable bytes at `data` for the duration of the call
        let bytes = unsafe { std::slice::from_raw_parts(data, len) }.to_vec();
        let pixels = PixelBuffer::from_raw(bytes, width, height, channels, stride)?;
        screen.make_texture(parent, pixels)
    })())
}

#[no_mangle]
pub extern "C" fn stimgl_close(handle: StimglScreenHandle, record: i64) -> i32 {
    status((|| -> Result<()> { handle.screen()?.close(handle_arg(record)?) })())
}

/// Draws a texture into a window.
///
/// Rects point to left, top, right, bottom. A null `src` is the whole texture and a null
/// `dst` centers the source in the window. A non-null `modulate` is an RGBA color that
/// replaces `global_alpha`.
#[no_mangle]
pub extern "C" fn stimgl_draw_texture(
    handle: StimglScreenHandle,
    window: i64,
    texture: i64,
    src: *const f64,
    dst: *const f64,
    filter: i32,
    rotation: f64,
    global_alpha: f64,
    modulate: *const f64,
) -> i32 {
    status((|| -> Result<()> {
        let screen = handle.screen()?;
        let mut options = BlitOptions::default()
            .with_filter(FilterMode::from_i32(filter)?)
            .with_rotation(rotation)
            .with_global_alpha(global_alpha);
        if let Some(rgba) = color_arg(modulate) {
            options = options.with_modulate_color(rgba);
        }
        screen.draw_texture(handle_arg(window)?, handle_arg(texture)?, rect_arg(src), rect_arg(dst), &options)
    })())
}

/// Copies `src_rect` of one window into `dst_rect` of another. Null rects cover the whole
/// window.
#[no_mangle]
pub extern "C" fn stimgl_copy_window(
    handle: StimglScreenHandle,
    src: i64,
    dst: i64,
    src_rect: *const f64,
    dst_rect: *const f64,
) -> i32 {
    status((|| -> Result<()> {
        handle
            .screen()?
            .copy_window(handle_arg(src)?, handle_arg(dst)?, rect_arg(src_rect), rect_arg(dst_rect))
    })())
}

/// Answers a query as JSON. With a null `field` all fields are reported as one object.
///
/// Returns null on error. Release the string with [`stimgl_string_free`].
#[no_mangle]
pub extern "C" fn stimgl_query_json(handle: StimglScreenHandle, record: i64, field: *const c_char) -> *mut c_char {
    let json = (|| -> Result<String> {
        let screen = handle.screen()?;
        let record = handle_arg(record)?;
        let value = match str_arg("field", field)? {
            Some(name) => serde_json::to_string(&screen.query(record, name.parse::<QueryField>()?)?),
            None => serde_json::to_string(&screen.query_all(record)?),
        };
        value.map_err(|e| ScreenError::invalid_argument("field", e.to_string()))
    })();

    match json.map(CString::new) {
        Ok(Ok(s)) => s.into_raw(),
        Ok(Err(e)) => {
            log::error!("ffi: query answer contains NUL: {e}");
            ptr::null_mut()
        }
        Err(e) => {
            log::error!("ffi: {e}");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn stimgl_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            let _ = CString::from_raw(s);
        }
    }
}

/// Whether `window` uses the classic backend. A negative `window` asks about the backend of
/// the screen's first open onscreen window.
#[no_mangle]
pub extern "C" fn stimgl_is_classic(handle: StimglScreenHandle, window: i64) -> bool {
    match handle.screen() {
        Ok(screen) => screen.is_classic(handle_arg(window).ok()),
        Err(_) => false,
    }
}
