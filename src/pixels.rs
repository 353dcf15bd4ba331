//! Raw pixel buffers exchanged with collaborators.
//!
//! Font rasterizers, movie decoders and image loaders hand over plain 8 bit pixel
//! buffers described by width, height, channel count and row stride. A [`PixelBuffer`]
//! owns such a buffer; it becomes the CPU-side backing store of a texture record until
//! the texture is uploaded to the device.

use std::io::{Read, Write};

use anyhow::{anyhow, bail};

use crate::errors::ScreenError;

#[derive(Clone, PartialEq)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1 = luminance, 2 = luminance + alpha, 3 = RGB, 4 = RGBA.
    pub channels: u8,
    /// Bytes per row, at least `width * channels`.
    pub stride: u32,
}

impl PixelBuffer {
    /// Wraps a raw buffer, validating that its description is consistent.
    pub fn from_raw(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        stride: u32,
    ) -> Result<Self, ScreenError> {
        if width == 0 || height == 0 {
            return Err(ScreenError::invalid_argument(
                "size",
                format!("image size {width}x{height} must not be empty"),
            ));
        }
        if !(1..=4).contains(&channels) {
            return Err(ScreenError::invalid_argument(
                "channels",
                format!("{channels} channels requested, only 1 to 4 are supported"),
            ));
        }
        if (stride as u64) < width as u64 * channels as u64 {
            return Err(ScreenError::invalid_argument(
                "stride",
                format!("row stride {stride} is smaller than {width} pixels of {channels} bytes"),
            ));
        }
        let needed = stride as u64 * (height as u64 - 1) + width as u64 * channels as u64;
        if (data.len() as u64) < needed {
            return Err(ScreenError::invalid_argument(
                "data",
                format!("pixel buffer holds {} bytes, {} needed", data.len(), needed),
            ));
        }

        Ok(Self {
            data,
            width,
            height,
            channels,
            stride,
        })
    }

    /// Creates a tightly packed RGBA buffer filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
            channels: 4,
            stride: width * 4,
        }
    }

    /// Returns the pixel at `(x, y)` expanded to RGBA.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let off = (y * self.stride + x * self.channels as u32) as usize;
        let p = &self.data[off..off + self.channels as usize];
        match self.channels {
            1 => [p[0], p[0], p[0], 255],
            2 => [p[0], p[0], p[0], p[1]],
            3 => [p[0], p[1], p[2], 255],
            _ => [p[0], p[1], p[2], p[3]],
        }
    }

    /// Converts the buffer into normalized RGBA texels, row by row from the top.
    pub fn to_rgba_f32(&self) -> Vec<[f32; 4]> {
        let mut out = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let p = self.pixel(x, y);
                out.push([
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]);
            }
        }
        out
    }

    /// Builds a tightly packed RGBA buffer from normalized texels.
    pub fn from_rgba_f32(width: u32, height: u32, texels: &[[f32; 4]]) -> Self {
        let mut data = Vec::with_capacity(texels.len() * 4);
        for t in texels {
            for c in t {
                data.push((c.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        Self {
            data,
            width,
            height,
            channels: 4,
            stride: width * 4,
        }
    }

    /// Number of bytes occupied by the image rows.
    pub fn size_bytes(&self) -> usize {
        (self.stride * self.height) as usize
    }

    /// Decodes an 8 bit PNG image.
    pub fn from_png<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut decoder = png::Decoder::new(reader);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;
        buf.truncate(info.buffer_size());

        let channels = match info.color_type {
            png::ColorType::Grayscale => 1,
            png::ColorType::GrayscaleAlpha => 2,
            png::ColorType::Rgb => 3,
            png::ColorType::Rgba => 4,
            other => bail!("unsupported png color type {other:?}"),
        };

        PixelBuffer::from_raw(buf, info.width, info.height, channels, info.line_size as u32)
            .map_err(|e| anyhow!("invalid png image: {e}"))
    }

    /// Encodes the buffer as an 8 bit PNG image.
    pub fn write_png<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let color = match self.channels {
            1 => png::ColorType::Grayscale,
            2 => png::ColorType::GrayscaleAlpha,
            3 => png::ColorType::Rgb,
            _ => png::ColorType::Rgba,
        };
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;

        let row = (self.width * self.channels as u32) as usize;
        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let off = y * self.stride as usize;
            packed.extend_from_slice(&self.data[off..off + row]);
        }
        writer.write_image_data(&packed)?;
        Ok(())
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("stride", &self.stride)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inconsistent_descriptions() {
        let err = PixelBuffer::from_raw(vec![0; 10], 4, 4, 1, 4).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "data", .. }));

        let err = PixelBuffer::from_raw(vec![0; 64], 4, 4, 4, 8).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "stride", .. }));

        let err = PixelBuffer::from_raw(vec![0; 64], 4, 4, 5, 20).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidArgument { name: "channels", .. }));
    }

    #[test]
    fn padded_rows_expand_to_rgba() {
        // 2x2 RGB with 2 bytes of row padding
        let data = vec![
            1, 2, 3, 4, 5, 6, 0, 0, //
            7, 8, 9, 10, 11, 12, 0, 0,
        ];
        let buf = PixelBuffer::from_raw(data, 2, 2, 3, 8).unwrap();
        assert_eq!(buf.pixel(1, 0), [4, 5, 6, 255]);
        assert_eq!(buf.pixel(0, 1), [7, 8, 9, 255]);

        let lum = PixelBuffer::from_raw(vec![9, 200], 1, 1, 2, 2).unwrap();
        assert_eq!(lum.pixel(0, 0), [9, 9, 9, 200]);
    }

    #[test]
    fn png_export_and_reload() {
        let buf = PixelBuffer::solid(3, 2, [10, 20, 30, 255]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solid.png");

        buf.write_png(std::fs::File::create(&path).unwrap()).unwrap();
        let loaded = PixelBuffer::from_png(std::fs::File::open(&path).unwrap()).unwrap();

        assert_eq!(loaded.width, 3);
        assert_eq!(loaded.height, 2);
        assert_eq!(loaded.pixel(2, 1), [10, 20, 30, 255]);
    }
}
