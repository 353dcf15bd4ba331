use std::fs::File;
use std::time::Duration;

use stimgl::blit::{BatchBlit, BlitOptions, FilterMode};
use stimgl::config::ScreenConfig;
use stimgl::geometry::Rect;
use stimgl::pixels::PixelBuffer;
use stimgl::render::backend::PrimitiveKind;
use stimgl::render::{BackendKind, SoftwareDevice};
use stimgl::screen::{OpenWindowOptions, QueryField, Screen};
use stimgl::ScreenError;

fn main() -> Result<(), ScreenError> {
    env_logger::init();

    // Configure the screen through the config builder. Most values only matter when windows
    // are opened, so set them up front.
    let config = ScreenConfig::builder()
        .vertex_buffer_capacity(4096)
        .finish_timeout_ms(1000)
        .build()
        .expect("Configuration is not valid");

    // The software device rasterizes on the CPU, so everything drawn here can be read back.
    let mut screen = Screen::new(Some(config), Box::new(SoftwareDevice::new()));

    // An onscreen window on an embedded context. Drawing on it goes through the emulated
    // immediate mode.
    let win = screen.open_window(
        OpenWindowOptions::new(800, 600)
            .with_backend(BackendKind::Embedded)
            .with_imaging_pipeline(true),
    )?;
    println!("Opened window {win} on the {} backend", screen.backend_of(Some(win)));

    // A red texture, drawn 1:1 into the top left corner.
    let red = screen.make_texture(win, PixelBuffer::solid(64, 64, [255, 0, 0, 255]))?;
    let nearest = BlitOptions::default().with_filter(FilterMode::Nearest);
    screen.draw_texture(win, red, None, Some(Rect::from_size(64.0, 64.0)), &nearest)?;

    // Some rotated copies of it, submitted as one batch.
    let mut batch = BatchBlit::new(win);
    for i in 0..8 {
        let x = 100.0 + i as f64 * 80.0;
        batch.add(
            red,
            None,
            Some(Rect::new(x, 200.0, x + 64.0, 264.0)),
            BlitOptions::default().with_rotation(i as f64 * 11.25),
        );
    }
    screen.finish_batch(batch)?;

    // A few points in a primitive group, the way a scripting host would draw dots.
    screen.set_color(win, [0.0, 0.0, 1.0, 1.0])?;
    screen.begin_group(win, PrimitiveKind::Points)?;
    for i in 0..100 {
        screen.vertex4(win, 400.0 + i as f64 * 2.0, 400.0, 0.0, 1.0)?;
    }
    screen.end_group(win)?;

    // Render into an offscreen window and copy it over.
    let off = screen.open_offscreen(win, Rect::from_size(200.0, 100.0), 32)?;
    screen.fill_rect(off, None, Some([0.0, 0.6, 0.0, 1.0]))?;
    screen.copy_window(off, win, None, Some(Rect::new(500.0, 450.0, 700.0, 550.0)))?;
    screen.finish(win, Some(Duration::from_millis(500)))?;

    println!("Window state: {}", serde_json::to_string_pretty(&screen.query_all(win)?).unwrap_or_default());
    println!("Caps: {:?}", screen.query(win, QueryField::Caps)?);

    // Dump the frame when asked to.
    if let Some(path) = std::env::args().nth(1) {
        let frame = screen.read_pixels(win, None)?;
        let file = File::create(&path).map_err(|e| ScreenError::Loader(e.into()))?;
        frame.write_png(file).map_err(ScreenError::Loader)?;
        println!("Wrote {path}");
    }

    let closed = screen.close_all()?;
    println!("Closed {closed} records. Done.");
    Ok(())
}
