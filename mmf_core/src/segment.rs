use std::ops::Range;

use crate::error::DecodeError;
use crate::format::{
    ByteReader, BACKGROUND_HEADER_SIZE, BACKGROUND_ID_CODE, FRAME_HEADER_SIZE, FRAME_ID_CODE,
    SEGMENT_HEADER_SIZE, SEGMENT_ID_CODE,
};
use crate::image::{Image, PixelFormat};
use crate::index::SegmentDescriptor;

/// A rectangle of foreground pixels that replaces the background.
#[derive(Debug, Clone)]
struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    /// Packed rows inside the segment payload.
    pixels: Range<usize>,
}

/// One frame's delta against the shared background.
#[derive(Debug, Clone)]
struct DeltaFrame {
    timestamp: f64,
    regions: Vec<Region>,
}

/// The decoded form of one segment: a background image plus one delta
/// record per frame in the descriptor's range.
///
/// The background is never modified; every [`ResidentSegment::materialize`]
/// starts from a fresh copy of it.
#[derive(Debug)]
pub struct ResidentSegment {
    descriptor: SegmentDescriptor,
    background: Image,
    frames: Vec<DeltaFrame>,
    /// Raw segment bytes; region pixel ranges point into this.
    payload: Vec<u8>,
}

impl ResidentSegment {
    /// Parse the raw bytes of `descriptor`'s segment.
    ///
    /// Fails if the frame count disagrees with the descriptor, if a frame's
    /// pixel format differs from the background's, if a region falls outside
    /// the background, or if any structure is truncated.
    pub fn decode(raw: Vec<u8>, descriptor: &SegmentDescriptor) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(&raw);

        // ── Segment header ─────────────────────────────────────────────────
        r.id_code(SEGMENT_ID_CODE, "segment header")?;
        let header_size = r.header_size(SEGMENT_HEADER_SIZE, "segment header")?;
        let segment_size = r.u32("segment header")?;
        let frame_count = r.u32("segment header")?;
        if segment_size as u64 != descriptor.len {
            return Err(DecodeError::SizeMismatch {
                expected: descriptor.len,
                found: segment_size,
            });
        }
        if frame_count != descriptor.frame_count() {
            return Err(DecodeError::FrameCountMismatch {
                expected: descriptor.frame_count(),
                found: frame_count,
            });
        }
        r.seek(header_size as usize, "segment header padding")?;

        // ── Background ─────────────────────────────────────────────────────
        let start = r.position();
        r.id_code(BACKGROUND_ID_CODE, "background header")?;
        let header_size = r.header_size(BACKGROUND_HEADER_SIZE, "background header")?;
        let width = r.u32("background header")?;
        let height = r.u32("background header")?;
        let depth = r.u32("background header")?;
        let channels = r.u32("background header")?;
        let format = PixelFormat::from_header(depth, channels)?;
        r.seek(start + header_size as usize, "background header padding")?;
        let len = pixel_bytes(width, height, format)?;
        let background = Image::new(
            width,
            height,
            format,
            r.take(len, "background pixels")?.to_vec(),
        );

        // ── Delta records ──────────────────────────────────────────────────
        let mut frames = Vec::with_capacity(frame_count as usize);
        for i in 0..frame_count {
            let frame = descriptor.first_frame + i;
            let start = r.position();
            r.id_code(FRAME_ID_CODE, "frame header")?;
            let header_size = r.header_size(FRAME_HEADER_SIZE, "frame header")?;
            let depth = r.u32("frame header")?;
            let channels = r.u32("frame header")?;
            let region_count = r.u32("frame header")?;
            let timestamp = r.f64("frame header")?;
            if (depth, channels) != (format.sample_depth(), format.channels()) {
                return Err(DecodeError::PixelFormatMismatch {
                    frame,
                    depth,
                    channels,
                    background_depth: format.sample_depth(),
                    background_channels: format.channels(),
                });
            }
            r.seek(start + header_size as usize, "frame header padding")?;

            let mut regions = Vec::new();
            for _ in 0..region_count {
                let x = r.u32("region header")?;
                let y = r.u32("region header")?;
                let w = r.u32("region header")?;
                let h = r.u32("region header")?;
                if x as u64 + w as u64 > width as u64 || y as u64 + h as u64 > height as u64 {
                    return Err(DecodeError::RegionOutOfBounds {
                        frame,
                        x,
                        y,
                        width: w,
                        height: h,
                        bg_width: width,
                        bg_height: height,
                    });
                }
                let at = r.position();
                let len = pixel_bytes(w, h, format)?;
                r.take(len, "region pixels")?;
                regions.push(Region {
                    x,
                    y,
                    width: w,
                    height: h,
                    pixels: at..at + len,
                });
            }
            frames.push(DeltaFrame { timestamp, regions });
        }

        Ok(Self {
            descriptor: *descriptor,
            background,
            frames,
            payload: raw,
        })
    }

    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn contains_frame(&self, frame: u32) -> bool {
        self.descriptor.contains(frame)
    }

    pub fn bit_depth(&self) -> u32 {
        self.background.bit_depth()
    }

    pub fn format(&self) -> PixelFormat {
        self.background.format()
    }

    pub fn background(&self) -> &Image {
        &self.background
    }

    /// Recording timestamp of `frame`, if it belongs to this segment.
    pub fn timestamp(&self, frame: u32) -> Option<f64> {
        self.delta(frame).map(|d| d.timestamp)
    }

    /// Reconstruct `frame` as a standalone image: the background with that
    /// frame's regions pasted on top.
    pub fn materialize(&self, frame: u32) -> Result<Image, DecodeError> {
        let delta = self.delta(frame).ok_or(DecodeError::FrameNotInSegment {
            frame,
            first: self.descriptor.first_frame,
            last: self.descriptor.last_frame,
        })?;
        let mut image = self.background.clone();
        for region in &delta.regions {
            image.paste(
                region.x,
                region.y,
                region.width,
                region.height,
                &self.payload[region.pixels.clone()],
            );
        }
        Ok(image)
    }

    fn delta(&self, frame: u32) -> Option<&DeltaFrame> {
        if !self.contains_frame(frame) {
            return None;
        }
        self.frames
            .get((frame - self.descriptor.first_frame) as usize)
    }
}

/// Bytes of packed pixel data for a `width` x `height` image, failing when
/// the header dimensions cannot be addressed.
fn pixel_bytes(width: u32, height: u32, format: PixelFormat) -> Result<usize, DecodeError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
        .ok_or(DecodeError::ImageTooLarge { width, height })
}
