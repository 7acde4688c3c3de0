use serde::Serialize;

use crate::error::FormatError;

/// Id code opening every MMF file header.
pub const FILE_ID_CODE: u32 = 0xa3d2_d45d;

/// Id code opening every segment (common-background stack) header.
pub const SEGMENT_ID_CODE: u32 = 0xbb67_ca20;

/// Id code opening the background image stored at the start of a segment.
pub const BACKGROUND_ID_CODE: u32 = 0x2a4b_6b3c;

/// Id code opening each per-frame delta record.
pub const FRAME_ID_CODE: u32 = 0xf809_21af;

/// Fixed fields of the file header:
///   id:u32 + header_size:u32 + key_frame_interval:u32
///   + threshold_below:i32 + threshold_above:i32
///   = 4 + 4 + 4 + 4 + 4 = 20
/// The NUL-terminated description follows, padded out to `header_size`.
pub const FILE_HEADER_FIXED_SIZE: u32 = 20;

/// id:u32 + header_size:u32 + segment_size:u32 + frame_count:u32 = 16
pub const SEGMENT_HEADER_SIZE: u32 = 16;

/// id:u32 + header_size:u32 + width:u32 + height:u32 + depth:u32 + channels:u32 = 24
pub const BACKGROUND_HEADER_SIZE: u32 = 24;

/// id:u32 + header_size:u32 + depth:u32 + channels:u32 + region_count:u32
/// + timestamp:f64 = 28
pub const FRAME_HEADER_SIZE: u32 = 28;

/// x:u32 + y:u32 + width:u32 + height:u32 = 16
pub const REGION_HEADER_SIZE: u32 = 16;

// ── Cursor ─────────────────────────────────────────────────────────────────

/// Bounds-checked little-endian reader over an in-memory byte slice.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(FormatError::Truncated {
                what,
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Jump to absolute position `pos`, which may be the end of the buffer.
    pub(crate) fn seek(&mut self, pos: usize, what: &'static str) -> Result<(), FormatError> {
        if pos > self.buf.len() {
            return Err(FormatError::Truncated {
                what,
                offset: self.pos,
                needed: pos - self.pos,
                available: self.buf.len() - self.pos,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i32(&mut self, what: &'static str) -> Result<i32, FormatError> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn f64(&mut self, what: &'static str) -> Result<f64, FormatError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(f64::from_le_bytes(raw))
    }

    /// Read an id code and fail unless it equals `expected`.
    pub(crate) fn id_code(&mut self, expected: u32, what: &'static str) -> Result<(), FormatError> {
        let found = self.u32(what)?;
        if found != expected {
            return Err(FormatError::BadIdCode {
                what,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Read a declared header size and fail if it is below `minimum`.
    pub(crate) fn header_size(&mut self, minimum: u32, what: &'static str) -> Result<u32, FormatError> {
        let declared = self.u32(what)?;
        if declared < minimum {
            return Err(FormatError::HeaderTooSmall {
                what,
                declared,
                minimum,
            });
        }
        Ok(declared)
    }
}

// ── File header ────────────────────────────────────────────────────────────

/// Decoded MMF file header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    /// Bytes occupied by the header; the first segment starts here.
    pub header_size: u32,
    /// Frames between background refreshes used when the movie was recorded.
    pub key_frame_interval: u32,
    /// Pixels darker than background minus this were kept as foreground.
    pub threshold_below_background: i32,
    /// Pixels brighter than background plus this were kept as foreground.
    pub threshold_above_background: i32,
    /// Free-text description recorded by the acquisition software.
    pub description: String,
}

impl FileHeader {
    /// Peek the id code and declared size from the first 8 bytes, so the
    /// caller knows how much to read before calling [`FileHeader::from_bytes`].
    pub fn declared_size(prefix: &[u8; 8]) -> Result<u32, FormatError> {
        let mut r = ByteReader::new(prefix);
        r.id_code(FILE_ID_CODE, "file header")?;
        r.header_size(FILE_HEADER_FIXED_SIZE, "file header")
    }

    /// Deserialize from the complete `header_size` bytes of the header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FormatError> {
        let mut r = ByteReader::new(buf);
        r.id_code(FILE_ID_CODE, "file header")?;
        let header_size = r.header_size(FILE_HEADER_FIXED_SIZE, "file header")?;
        let key_frame_interval = r.u32("file header")?;
        let threshold_below_background = r.i32("file header")?;
        let threshold_above_background = r.i32("file header")?;

        let text_len = (header_size - FILE_HEADER_FIXED_SIZE) as usize;
        let text = r.take(text_len, "file header description")?;
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        let description = String::from_utf8_lossy(&text[..end]).into_owned();

        Ok(Self {
            header_size,
            key_frame_interval,
            threshold_below_background,
            threshold_above_background,
            description,
        })
    }
}

// ── Segment header ─────────────────────────────────────────────────────────

/// The fixed prefix of one segment, read during the index scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub header_size: u32,
    /// Total bytes of the segment, header included.
    pub segment_size: u32,
    pub frame_count: u32,
}

impl SegmentHeader {
    pub fn from_bytes(buf: &[u8; SEGMENT_HEADER_SIZE as usize]) -> Result<Self, FormatError> {
        let mut r = ByteReader::new(buf);
        r.id_code(SEGMENT_ID_CODE, "segment header")?;
        let header_size = r.header_size(SEGMENT_HEADER_SIZE, "segment header")?;
        let segment_size = r.u32("segment header")?;
        let frame_count = r.u32("segment header")?;
        Ok(Self {
            header_size,
            segment_size,
            frame_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_header_bytes(header_size: u32, description: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&FILE_ID_CODE.to_le_bytes());
        buf.extend_from_slice(&header_size.to_le_bytes());
        buf.extend_from_slice(&5u32.to_le_bytes());
        buf.extend_from_slice(&(-10i32).to_le_bytes());
        buf.extend_from_slice(&12i32.to_le_bytes());
        buf.extend_from_slice(description.as_bytes());
        buf.resize(header_size as usize, 0);
        buf
    }

    #[test]
    fn test_file_header_parses_fields_and_description() {
        let buf = file_header_bytes(128, "larva tracking rig 3");
        let prefix: [u8; 8] = buf[..8].try_into().unwrap();
        assert_eq!(FileHeader::declared_size(&prefix).unwrap(), 128);

        let header = FileHeader::from_bytes(&buf).unwrap();
        assert_eq!(header.header_size, 128);
        assert_eq!(header.key_frame_interval, 5);
        assert_eq!(header.threshold_below_background, -10);
        assert_eq!(header.threshold_above_background, 12);
        assert_eq!(header.description, "larva tracking rig 3");
    }

    #[test]
    fn test_file_header_rejects_wrong_id() {
        let mut buf = file_header_bytes(64, "");
        buf[0] ^= 0xff;
        let err = FileHeader::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, FormatError::BadIdCode { .. }), "got {err:?}");
    }

    #[test]
    fn test_file_header_rejects_undersized_header() {
        let mut buf = file_header_bytes(64, "");
        buf[4..8].copy_from_slice(&8u32.to_le_bytes());
        let err = FileHeader::from_bytes(&buf).unwrap_err();
        assert!(matches!(
            err,
            FormatError::HeaderTooSmall { declared: 8, .. }
        ));
    }

    #[test]
    fn test_file_header_truncated_description() {
        let buf = file_header_bytes(64, "abc");
        let err = FileHeader::from_bytes(&buf[..40]).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }), "got {err:?}");
    }

    #[test]
    fn test_segment_header_roundtrip_fields() {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&SEGMENT_ID_CODE.to_le_bytes());
        buf[4..8].copy_from_slice(&512u32.to_le_bytes());
        buf[8..12].copy_from_slice(&90_000u32.to_le_bytes());
        buf[12..16].copy_from_slice(&50u32.to_le_bytes());
        let header = SegmentHeader::from_bytes(&buf).unwrap();
        assert_eq!(
            header,
            SegmentHeader {
                header_size: 512,
                segment_size: 90_000,
                frame_count: 50
            }
        );
    }

    #[test]
    fn test_byte_reader_reports_truncation_offset() {
        let data = [1u8, 0, 0, 0, 7];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u32("x").unwrap(), 1);
        match r.u32("tail").unwrap_err() {
            FormatError::Truncated {
                what,
                offset,
                needed,
                available,
            } => {
                assert_eq!(what, "tail");
                assert_eq!(offset, 4);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
