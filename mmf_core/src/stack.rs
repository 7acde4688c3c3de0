use std::path::{Path, PathBuf};

use crate::cache::{CacheStats, SegmentCache};
use crate::error::{OpenError, StackError};
use crate::format::FileHeader;
use crate::image::Image;
use crate::index::{Container, SegmentDescriptor};
use crate::segment::ResidentSegment;

/// What an image-display host needs from a frame source.
///
/// Frame numbers are 1-based. The mutators exist because hosts call them on
/// every stack; read-only sources accept and ignore them.
pub trait VirtualStack {
    /// Number of frames.
    fn size(&self) -> u32;

    /// Bits per pixel of the frames, or 0 if no frame can be decoded.
    fn bit_depth(&mut self) -> u32;

    fn directory(&self) -> Option<&Path>;

    fn file_name(&self) -> Option<&str>;

    fn slice_label(&self, n: u32) -> String;

    /// The image for frame `n`, or `None` if it is out of range or unreadable.
    fn processor(&mut self, n: u32) -> Option<Image>;

    fn add_slice(&mut self, label: &str) -> bool;

    fn delete_slice(&mut self, n: u32) -> bool;

    fn delete_last_slice(&mut self) -> bool;

    fn set_pixels(&mut self, n: u32, pixels: &[u8]) -> bool;
}

/// Frame-indexed, read-only view of an MMF movie that keeps a single
/// decoded segment resident.
///
/// Opening never panics or propagates: a file that cannot be opened yields a
/// stack that reports zero frames and fails [`MmfStack::validate`].
pub struct MmfStack {
    path: PathBuf,
    container: Option<Container>,
    open_error: Option<OpenError>,
    cache: SegmentCache,
    /// First-write-wins: set from the first segment decoded, never re-derived.
    bit_depth: Option<u32>,
}

impl MmfStack {
    /// Open `path`, logging and retaining the failure instead of returning it.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_open(path) {
            Ok(stack) => stack,
            Err(e) => {
                log::error!("opening {} was unsuccessful: {e}", path.display());
                Self {
                    path: path.to_path_buf(),
                    container: None,
                    open_error: Some(e),
                    cache: SegmentCache::new(),
                    bit_depth: None,
                }
            }
        }
    }

    /// Open `path`, returning the failure to the caller.
    ///
    /// No segment is read until the first frame request.
    pub fn try_open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let container = Container::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            container: Some(container),
            open_error: None,
            cache: SegmentCache::new(),
            bit_depth: None,
        })
    }

    pub fn open_error(&self) -> Option<&OpenError> {
        self.open_error.as_ref()
    }

    /// Check that the container opened, has frames, and that frame 1 decodes.
    pub fn validate(&mut self) -> Result<(), StackError> {
        if let Some(e) = &self.open_error {
            return Err(StackError::NotOpened {
                reason: e.to_string(),
            });
        }
        if self.frame_count() == 0 || self.get_image(1).is_none() {
            return Err(StackError::EmptyContainer);
        }
        Ok(())
    }

    pub fn is_valid(&mut self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: {e}", self.path.display());
                false
            }
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.container.as_ref().map_or(0, Container::total_frames)
    }

    /// Bits per pixel, fixed by the first segment this stack decoded.
    ///
    /// Decodes the segment holding frame 1 if nothing has been decoded yet.
    /// Returns 0 when no segment can be decoded.
    pub fn bit_depth(&mut self) -> u32 {
        if let Some(depth) = self.bit_depth {
            return depth;
        }
        let frame = self.cache.resident().map_or(1, |d| d.first_frame);
        self.resident_for(frame).map_or(0, ResidentSegment::bit_depth)
    }

    /// Decoded image of `frame`, or `None` outside `1..=frame_count()` or
    /// when its segment cannot be decoded.
    pub fn get_image(&mut self, frame: u32) -> Option<Image> {
        if frame < 1 || frame > self.frame_count() {
            return None;
        }
        let container = self.container.as_mut()?;
        let image = self.cache.ensure_contains(container, frame)?;
        self.bit_depth.get_or_insert(image.bit_depth());
        Some(image)
    }

    /// Recording timestamp of `frame` in seconds.
    pub fn frame_timestamp(&mut self, frame: u32) -> Option<f64> {
        self.resident_for(frame)?.timestamp(frame)
    }

    pub fn label_for(frame: u32) -> String {
        format!("MMF_Frame_{frame}")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.container.as_ref().map(Container::header)
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        self.container
            .as_ref()
            .map(Container::segments)
            .unwrap_or_default()
    }

    /// Descriptor of the segment currently held in memory.
    pub fn resident(&self) -> Option<&SegmentDescriptor> {
        self.cache.resident()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Segment payloads read from disk since open.
    pub fn segment_reads(&self) -> u64 {
        self.container.as_ref().map_or(0, Container::segment_reads)
    }

    fn resident_for(&mut self, frame: u32) -> Option<&ResidentSegment> {
        let container = self.container.as_mut()?;
        let segment = self.cache.segment_for(container, frame)?;
        self.bit_depth.get_or_insert(segment.bit_depth());
        Some(segment)
    }
}

impl VirtualStack for MmfStack {
    fn size(&self) -> u32 {
        self.frame_count()
    }

    fn bit_depth(&mut self) -> u32 {
        MmfStack::bit_depth(self)
    }

    fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    fn slice_label(&self, n: u32) -> String {
        Self::label_for(n)
    }

    fn processor(&mut self, n: u32) -> Option<Image> {
        self.get_image(n)
    }

    // The movie is read-only; these accept and ignore the request.

    fn add_slice(&mut self, _label: &str) -> bool {
        true
    }

    fn delete_slice(&mut self, _n: u32) -> bool {
        true
    }

    fn delete_last_slice(&mut self) -> bool {
        true
    }

    fn set_pixels(&mut self, _n: u32, _pixels: &[u8]) -> bool {
        true
    }
}
