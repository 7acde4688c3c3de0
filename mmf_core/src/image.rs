use serde::Serialize;

use crate::error::FormatError;

/// Sample layout of a stored or decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    Gray8,
    /// Little-endian 16-bit samples.
    Gray16,
    /// Interleaved 8-bit R, G, B.
    Rgb24,
}

impl PixelFormat {
    /// Resolve the `(depth, channels)` pair recorded in image headers.
    pub fn from_header(depth: u32, channels: u32) -> Result<Self, FormatError> {
        match (depth, channels) {
            (8, 1) => Ok(Self::Gray8),
            (16, 1) => Ok(Self::Gray16),
            (8, 3) => Ok(Self::Rgb24),
            _ => Err(FormatError::UnsupportedPixelFormat { depth, channels }),
        }
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Gray16 => 2,
            Self::Rgb24 => 3,
        }
    }

    /// Bits per pixel as a display host counts them (RGB reports 24).
    #[inline]
    pub fn bit_depth(self) -> u32 {
        self.bytes_per_pixel() as u32 * 8
    }

    /// Bits per sample, as written in image headers.
    pub fn sample_depth(self) -> u32 {
        match self {
            Self::Gray8 | Self::Rgb24 => 8,
            Self::Gray16 => 16,
        }
    }

    pub fn channels(self) -> u32 {
        match self {
            Self::Gray8 | Self::Gray16 => 1,
            Self::Rgb24 => 3,
        }
    }
}

/// A full 2D pixel buffer: packed rows, no padding between them.
///
/// Decoded frames are handed to the caller as standalone `Image`s; nothing
/// inside the cache keeps a reference to them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "data length must equal width * height * bytes_per_pixel"
        );
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bit_depth(&self) -> u32 {
        self.format.bit_depth()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Value at `(x, y)`: the gray level, or `0xRRGGBB` for RGB images.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let at = (y as usize * self.width as usize + x as usize) * bpp;
        let p = &self.data[at..at + bpp];
        Some(match self.format {
            PixelFormat::Gray8 => p[0] as u32,
            PixelFormat::Gray16 => u16::from_le_bytes([p[0], p[1]]) as u32,
            PixelFormat::Rgb24 => (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32,
        })
    }

    /// Overwrite the `width` x `height` rectangle at `(x, y)` with packed rows
    /// from `src`. The caller has already bounds-checked the rectangle.
    pub(crate) fn paste(&mut self, x: u32, y: u32, width: u32, height: u32, src: &[u8]) {
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = width as usize * bpp;
        let stride = self.width as usize * bpp;
        for row in 0..height as usize {
            let dst_start = (y as usize + row) * stride + x as usize * bpp;
            let src_start = row * row_bytes;
            self.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }
    }
}
