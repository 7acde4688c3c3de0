use serde::Serialize;

use crate::error::DecodeError;
use crate::image::Image;
use crate::index::{Container, SegmentDescriptor};
use crate::segment::ResidentSegment;

/// What the cache currently holds. At most one segment is ever resident.
#[derive(Debug, Default)]
pub enum Residency {
    #[default]
    Empty,
    Loaded(ResidentSegment),
}

/// Counters describing how requests were served.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Segments read and decoded successfully.
    pub loads: u64,
    /// Requests served by the segment already resident.
    pub hits: u64,
    /// Segment reads or decodes that failed and left the cache empty.
    pub failures: u64,
}

/// Single-slot segment cache.
///
/// A request for a frame inside the resident segment costs one
/// materialization. A request anywhere else evicts the resident segment and
/// reads and decodes the one covering the frame; there is no partial reuse.
#[derive(Debug, Default)]
pub struct SegmentCache {
    state: Residency,
    stats: CacheStats,
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &Residency {
        &self.state
    }

    /// Descriptor of the resident segment, if any.
    pub fn resident(&self) -> Option<&SegmentDescriptor> {
        match &self.state {
            Residency::Loaded(segment) => Some(segment.descriptor()),
            Residency::Empty => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Make the segment covering `frame` resident and return it.
    ///
    /// Returns `None` without touching the cache when `frame` is outside
    /// `1..=container.total_frames()`. Returns `None` and leaves the cache
    /// empty when the covering segment cannot be read or decoded.
    pub fn segment_for(&mut self, container: &mut Container, frame: u32) -> Option<&ResidentSegment> {
        if frame < 1 || frame > container.total_frames() {
            return None;
        }

        let hit = matches!(&self.state, Residency::Loaded(s) if s.contains_frame(frame));
        if hit {
            self.stats.hits += 1;
        } else {
            let descriptor = *container.segment_for(frame)?;

            // Evict first: a failed load leaves the cache empty.
            self.state = Residency::Empty;
            match load(container, &descriptor) {
                Ok(segment) => {
                    log::debug!(
                        "loaded segment {} (frames {}..={}, {} bytes)",
                        descriptor.index,
                        descriptor.first_frame,
                        descriptor.last_frame,
                        descriptor.len
                    );
                    self.stats.loads += 1;
                    self.state = Residency::Loaded(segment);
                }
                Err(e) => {
                    log::warn!(
                        "segment {} (frames {}..={}) is unusable: {e}",
                        descriptor.index,
                        descriptor.first_frame,
                        descriptor.last_frame
                    );
                    self.stats.failures += 1;
                    return None;
                }
            }
        }

        match &self.state {
            Residency::Loaded(segment) => Some(segment),
            Residency::Empty => None,
        }
    }

    /// Decoded image of `frame`, loading its segment if needed.
    pub fn ensure_contains(&mut self, container: &mut Container, frame: u32) -> Option<Image> {
        let segment = self.segment_for(container, frame)?;
        match segment.materialize(frame) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("frame {frame}: {e}");
                None
            }
        }
    }
}

fn load(container: &mut Container, descriptor: &SegmentDescriptor) -> Result<ResidentSegment, DecodeError> {
    let raw = container.read_segment(descriptor)?;
    ResidentSegment::decode(raw, descriptor)
}
