use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Structural problems found while parsing any MMF header or payload.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("bad {what} id code: expected {expected:#010x}, found {found:#010x}")]
    BadIdCode {
        what: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("truncated {what}: needed {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{what} declares header size {declared}, below the minimum of {minimum}")]
    HeaderTooSmall {
        what: &'static str,
        declared: u32,
        minimum: u32,
    },

    #[error("unsupported pixel format: {depth}-bit samples, {channels} channel(s)")]
    UnsupportedPixelFormat { depth: u32, channels: u32 },
}

/// Failure to open a container. Terminal: the container is never usable.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("cannot open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file header: {0}")]
    Header(#[source] FormatError),

    #[error("unreadable segment table entry at offset {offset}: {source}")]
    SegmentTable {
        offset: u64,
        #[source]
        source: FormatError,
    },

    #[error("segment at offset {offset} declares {declared} bytes but only {available} remain in the file")]
    SegmentOverrun {
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("segment at offset {offset} pushes the frame count past u32::MAX")]
    TooManyFrames { offset: u64 },

    #[error("I/O error while scanning segment table at offset {offset}: {source}")]
    Scan {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

/// Failure to turn one segment's bytes into a resident segment.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("reading segment {index} at offset {offset}: {source}")]
    Io {
        index: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("malformed segment payload: {0}")]
    Format(#[from] FormatError),

    #[error("segment declares {found} frames but its descriptor covers {expected}")]
    FrameCountMismatch { expected: u32, found: u32 },

    #[error("segment declares {found} bytes but its descriptor covers {expected}")]
    SizeMismatch { expected: u64, found: u32 },

    #[error("image of {width}x{height} pixels is too large to address")]
    ImageTooLarge { width: u32, height: u32 },

    #[error("frame {frame} stores {depth}-bit/{channels}ch pixels, background is {background_depth}-bit/{background_channels}ch")]
    PixelFormatMismatch {
        frame: u32,
        depth: u32,
        channels: u32,
        background_depth: u32,
        background_channels: u32,
    },

    #[error("region at ({x}, {y}) sized {width}x{height} in frame {frame} falls outside the {bg_width}x{bg_height} background")]
    RegionOutOfBounds {
        frame: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bg_width: u32,
        bg_height: u32,
    },

    #[error("frame {frame} is not in the resident segment (frames {first}..={last})")]
    FrameNotInSegment { frame: u32, first: u32, last: u32 },
}

/// Facade-level failures reported to the operator.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("container was not opened: {reason}")]
    NotOpened { reason: String },

    #[error("frames missing or empty")]
    EmptyContainer,
}
