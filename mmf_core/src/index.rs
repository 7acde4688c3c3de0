use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DecodeError, FormatError, OpenError};
use crate::format::{FileHeader, SegmentHeader, FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};

/// Locates one contiguous run of frames that share a background.
///
/// Frame numbers are 1-based and inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentDescriptor {
    /// Position of this descriptor in the container's segment table.
    pub index: usize,
    pub first_frame: u32,
    pub last_frame: u32,
    /// Byte offset of the segment header from the start of the file.
    pub offset: u64,
    /// Bytes occupied by the segment, header included.
    pub len: u64,
}

impl SegmentDescriptor {
    #[inline]
    pub fn contains(&self, frame: u32) -> bool {
        (self.first_frame..=self.last_frame).contains(&frame)
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.last_frame - self.first_frame + 1
    }
}

/// An opened MMF file: its header, its segment table, and the read-only
/// handle segments are fetched through.
///
/// # Open sequence
/// 1. Read the id code and declared size, then the whole file header.
/// 2. Walk segment headers from the end of the file header to end of file,
///    jumping `segment_size` bytes each time. Pixel payload is never read.
/// 3. Assign each non-empty segment the next run of frame numbers.
///
/// The table is immutable after open. The handle is closed when the
/// container is dropped.
pub struct Container {
    file: File,
    path: PathBuf,
    header: FileHeader,
    segments: Vec<SegmentDescriptor>,
    total_frames: u32,
    segment_reads: u64,
}

impl Container {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| OpenError::Io {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();

        // ── File header ─────────────────────────────────────────────────────
        if file_len < 8 {
            return Err(OpenError::Header(FormatError::Truncated {
                what: "file header",
                offset: 0,
                needed: 8,
                available: file_len as usize,
            }));
        }
        let mut prefix = [0u8; 8];
        file.read_exact(&mut prefix).map_err(io_err)?;
        let header_size = FileHeader::declared_size(&prefix).map_err(OpenError::Header)?;
        if header_size as u64 > file_len {
            return Err(OpenError::Header(FormatError::Truncated {
                what: "file header",
                offset: 0,
                needed: header_size as usize,
                available: file_len as usize,
            }));
        }
        let mut header_buf = vec![0u8; header_size as usize];
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        file.read_exact(&mut header_buf).map_err(io_err)?;
        let header = FileHeader::from_bytes(&header_buf).map_err(OpenError::Header)?;

        // ── Segment table scan ──────────────────────────────────────────────
        let (segments, total_frames) = scan_segments(&mut file, header_size as u64, file_len)?;

        log::debug!(
            "indexed {} segments, {} frames in {}",
            segments.len(),
            total_frames,
            path.display()
        );

        Ok(Self {
            file,
            path,
            header,
            segments,
            total_frames,
            segment_reads: 0,
        })
    }

    /// Total frames in the movie. Zero means there is nothing to show.
    #[inline]
    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The ordered, non-overlapping segment table.
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    /// Number of segment payloads read from disk since open.
    pub fn segment_reads(&self) -> u64 {
        self.segment_reads
    }

    /// The descriptor covering `frame`, or `None` outside `1..=total_frames`.
    ///
    /// Binary search on the ordered ranges: O(log segments).
    pub fn segment_for(&self, frame: u32) -> Option<&SegmentDescriptor> {
        if frame < 1 || frame > self.total_frames {
            return None;
        }
        let i = self.segments.partition_point(|s| s.last_frame < frame);
        self.segments.get(i).filter(|s| s.contains(frame))
    }

    /// Read the full byte range of `segment` from disk.
    ///
    /// Only that range is touched; neighbouring segments are not read.
    pub fn read_segment(&mut self, segment: &SegmentDescriptor) -> Result<Vec<u8>, DecodeError> {
        let io_err = |source| DecodeError::Io {
            index: segment.index,
            offset: segment.offset,
            source,
        };
        self.file
            .seek(SeekFrom::Start(segment.offset))
            .map_err(io_err)?;
        let mut raw = vec![0u8; segment.len as usize];
        self.file.read_exact(&mut raw).map_err(io_err)?;
        self.segment_reads += 1;
        Ok(raw)
    }
}

fn scan_segments(
    file: &mut File,
    start: u64,
    file_len: u64,
) -> Result<(Vec<SegmentDescriptor>, u32), OpenError> {
    let mut segments = Vec::new();
    let mut total_frames = 0u32;
    let mut offset = start;
    let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];

    while offset < file_len {
        let remaining = file_len - offset;
        let table_err = |source| OpenError::SegmentTable { offset, source };

        if remaining < SEGMENT_HEADER_SIZE as u64 {
            return Err(table_err(FormatError::Truncated {
                what: "segment header",
                offset: 0,
                needed: SEGMENT_HEADER_SIZE as usize,
                available: remaining as usize,
            }));
        }

        let scan_err = |source| OpenError::Scan { offset, source };
        file.seek(SeekFrom::Start(offset)).map_err(scan_err)?;
        file.read_exact(&mut buf).map_err(scan_err)?;
        let seg = SegmentHeader::from_bytes(&buf).map_err(table_err)?;

        if seg.segment_size < seg.header_size {
            return Err(table_err(FormatError::HeaderTooSmall {
                what: "segment size",
                declared: seg.segment_size,
                minimum: seg.header_size,
            }));
        }
        if seg.segment_size as u64 > remaining {
            return Err(OpenError::SegmentOverrun {
                offset,
                declared: seg.segment_size as u64,
                available: remaining,
            });
        }
        // Every frame record needs at least its fixed header.
        let frame_floor = seg.frame_count as u64 * FRAME_HEADER_SIZE as u64;
        if frame_floor > seg.segment_size as u64 {
            return Err(table_err(FormatError::Truncated {
                what: "segment frame records",
                offset: seg.header_size as usize,
                needed: frame_floor as usize,
                available: seg.segment_size as usize,
            }));
        }

        if seg.frame_count == 0 {
            log::debug!("skipping empty segment at offset {offset}");
        } else {
            let first_frame = total_frames + 1;
            total_frames = total_frames
                .checked_add(seg.frame_count)
                .ok_or(OpenError::TooManyFrames { offset })?;
            segments.push(SegmentDescriptor {
                index: segments.len(),
                first_frame,
                last_frame: total_frames,
                offset,
                len: seg.segment_size as u64,
            });
        }

        offset += seg.segment_size as u64;
    }

    Ok((segments, total_frames))
}
