pub mod cache;
pub mod error;
pub mod format;
pub mod image;
pub mod index;
pub mod segment;
pub mod stack;

pub use cache::{CacheStats, Residency, SegmentCache};
pub use error::{DecodeError, FormatError, OpenError, StackError};
pub use format::FileHeader;
pub use image::{Image, PixelFormat};
pub use index::{Container, SegmentDescriptor};
pub use segment::ResidentSegment;
pub use stack::{MmfStack, VirtualStack};
