//! Writes small MMF movies for tests.
//!
//! Layout written (little-endian):
//! ```text
//! [FILE HEADER: id, header_size, key_frame_interval, thresholds, description]
//! [SEGMENT: id, header_size, segment_size, frame_count]
//!     [BACKGROUND: id, header_size, width, height, depth, channels, pixels]
//!     [FRAME: id, header_size, depth, channels, region_count, timestamp]
//!         [REGION: x, y, width, height, pixels] ...
//! [SEGMENT] ...
//! ```
#![allow(dead_code)]

use std::io::Write;

use mmf_core::format::{
    BACKGROUND_HEADER_SIZE, BACKGROUND_ID_CODE, FILE_HEADER_FIXED_SIZE, FILE_ID_CODE,
    FRAME_HEADER_SIZE, FRAME_ID_CODE, SEGMENT_HEADER_SIZE, SEGMENT_ID_CODE,
};
use mmf_core::PixelFormat;

fn put(buf: &mut Vec<u8>, values: &[u32]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub struct SegmentBuilder {
    width: u32,
    height: u32,
    format: PixelFormat,
    background: Vec<u8>,
    frames: Vec<(f64, Vec<Region>)>,
}

impl SegmentBuilder {
    /// Background filled with `sample` repeated for every byte.
    pub fn filled(width: u32, height: u32, format: PixelFormat, sample: u8) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            background: vec![sample; len],
            frames: Vec::new(),
        }
    }

    pub fn frame(mut self, timestamp: f64, regions: Vec<Region>) -> Self {
        self.frames.push((timestamp, regions));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        put(
            &mut body,
            &[
                BACKGROUND_ID_CODE,
                BACKGROUND_HEADER_SIZE,
                self.width,
                self.height,
                self.format.sample_depth(),
                self.format.channels(),
            ],
        );
        body.extend_from_slice(&self.background);

        for (timestamp, regions) in &self.frames {
            put(
                &mut body,
                &[
                    FRAME_ID_CODE,
                    FRAME_HEADER_SIZE,
                    self.format.sample_depth(),
                    self.format.channels(),
                    regions.len() as u32,
                ],
            );
            body.extend_from_slice(&timestamp.to_le_bytes());
            for r in regions {
                put(&mut body, &[r.x, r.y, r.width, r.height]);
                body.extend_from_slice(&r.pixels);
            }
        }

        let mut out = Vec::new();
        let size = SEGMENT_HEADER_SIZE + body.len() as u32;
        put(
            &mut out,
            &[SEGMENT_ID_CODE, SEGMENT_HEADER_SIZE, size, self.frames.len() as u32],
        );
        out.extend_from_slice(&body);
        out
    }
}

pub struct MovieBuilder {
    header_size: u32,
    description: String,
    segments: Vec<Vec<u8>>,
}

impl MovieBuilder {
    pub fn new() -> Self {
        Self {
            header_size: 256,
            description: "test movie".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn segment(mut self, segment: &SegmentBuilder) -> Self {
        self.segments.push(segment.to_bytes());
        self
    }

    /// Append already-encoded segment bytes (for corrupt payloads).
    pub fn raw_segment(mut self, bytes: Vec<u8>) -> Self {
        self.segments.push(bytes);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put(&mut out, &[FILE_ID_CODE, self.header_size, 5]);
        out.extend_from_slice(&(-8i32).to_le_bytes());
        out.extend_from_slice(&8i32.to_le_bytes());
        assert_eq!(out.len(), FILE_HEADER_FIXED_SIZE as usize);
        out.extend_from_slice(self.description.as_bytes());
        out.resize(self.header_size as usize, 0);
        for s in &self.segments {
            out.extend_from_slice(s);
        }
        out
    }

    pub fn write(&self) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".mmf")
            .tempfile()
            .unwrap();
        f.write_all(&self.to_bytes()).unwrap();
        f.flush().unwrap();
        f
    }
}

/// Background sample used by segment `index` of [`numbered_movie`].
pub fn background_sample(index: usize) -> u8 {
    17 * (index as u8 + 1)
}

/// An 8x4 gray movie whose segments hold `frame_counts` frames each.
///
/// Every segment has its own flat background ([`background_sample`]); every
/// frame `n` writes `[n & 0xff, n >> 8]` into the 2x1 region at (0, 0) and
/// carries timestamp `n / 10`.
pub fn numbered_movie(frame_counts: &[u32]) -> MovieBuilder {
    let mut movie = MovieBuilder::new();
    let mut first = 1u32;
    for (i, &count) in frame_counts.iter().enumerate() {
        movie = movie.segment(&numbered_segment(i, first, count));
        first += count;
    }
    movie
}

/// Segment `index` of a [`numbered_movie`], holding frames `first..first + count`.
pub fn numbered_segment(index: usize, first: u32, count: u32) -> SegmentBuilder {
    let mut seg = SegmentBuilder::filled(8, 4, PixelFormat::Gray8, background_sample(index));
    for frame in first..first + count {
        seg = seg.frame(
            frame as f64 / 10.0,
            vec![Region {
                x: 0,
                y: 0,
                width: 2,
                height: 1,
                pixels: vec![(frame & 0xff) as u8, (frame >> 8) as u8],
            }],
        );
    }
    seg
}

/// Check that `image` is frame `n` of a [`numbered_movie`] drawn over the
/// background of segment `segment`.
pub fn assert_numbered_frame(image: &mmf_core::Image, n: u32, segment: usize) {
    assert_eq!(image.pixel(0, 0), Some(n & 0xff), "low byte of frame {n}");
    assert_eq!(image.pixel(1, 0), Some(n >> 8), "high byte of frame {n}");
    let bg = background_sample(segment) as u32;
    assert_eq!(image.pixel(2, 0), Some(bg), "background of frame {n}");
    assert_eq!(image.pixel(7, 3), Some(bg), "background of frame {n}");
}

/// Break a segment's background id code while keeping its declared size.
pub fn corrupt_background(mut segment: Vec<u8>) -> Vec<u8> {
    segment[SEGMENT_HEADER_SIZE as usize] ^= 0xff;
    segment
}

/// A segment whose background header claims `u32::MAX` x `u32::MAX` RGB
/// pixels. The segment table stays valid; only decoding can notice.
pub fn unaddressable_segment(frame_count: u32) -> Vec<u8> {
    let mut body = Vec::new();
    put(
        &mut body,
        &[BACKGROUND_ID_CODE, BACKGROUND_HEADER_SIZE, u32::MAX, u32::MAX, 8, 3],
    );
    body.resize(body.len() + (frame_count * FRAME_HEADER_SIZE) as usize, 0);

    let mut out = Vec::new();
    let size = SEGMENT_HEADER_SIZE + body.len() as u32;
    put(
        &mut out,
        &[SEGMENT_ID_CODE, SEGMENT_HEADER_SIZE, size, frame_count],
    );
    out.extend_from_slice(&body);
    out
}
