use super::header::{is_valid_header, FrameHeader};

/// A header located by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    pub raw: u32,
    pub offset: usize,
}

/// Search rules for one scan
#[derive(Debug, Clone, Copy)]
pub struct ScanRules<'a> {
    pub allow_free: bool,
    /// When set, candidates must agree with this header on version, layer,
    /// sample rate and channel mode
    pub reference: Option<&'a FrameHeader>,
}

impl<'a> ScanRules<'a> {
    pub fn open(allow_free: bool) -> Self {
        Self { allow_free, reference: None }
    }

    pub fn following(reference: &'a FrameHeader) -> Self {
        Self { allow_free: true, reference: Some(reference) }
    }

    /// Whether a raw 32-bit word satisfies these rules
    pub fn accepts(&self, raw: u32) -> bool {
        if !is_valid_header(raw, self.allow_free) {
            return false;
        }
        match self.reference {
            Some(reference) => reference.matches(raw),
            None => true,
        }
    }
}

/// Scan `data[from..limit]` byte by byte for the next header accepted by
/// `rules`. A header is only reported when all four of its bytes lie
/// before `limit`.
pub fn find_next_frame(data: &[u8], from: usize, limit: usize, rules: &ScanRules) -> Option<SyncPoint> {
    let end = limit.min(data.len());
    if end < 4 || from > end - 4 {
        return None;
    }

    let mut pos = from;
    while pos + 4 <= end {
        // cheap first-byte filter before assembling the word
        if data[pos] == 0xFF {
            let raw = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            if rules.accepts(raw) {
                return Some(SyncPoint { raw, offset: pos });
            }
        }
        pos += 1;
    }
    None
}

/// Read and check the frame header at exactly `pos`
pub fn frame_at(data: &[u8], pos: usize, rules: &ScanRules) -> Option<FrameHeader> {
    let raw = FrameHeader::read_raw(data.get(pos..)?)?;
    if !rules.accepts(raw) {
        return None;
    }
    FrameHeader::parse(raw)
}

/// Length of a trailing ID3v1 block, if the view ends with one
pub fn trailing_tag_len(data: &[u8]) -> usize {
    const ID3V1_LEN: usize = 128;
    if data.len() >= ID3V1_LEN + 4 && &data[data.len() - ID3V1_LEN..data.len() - ID3V1_LEN + 3] == b"TAG" {
        ID3V1_LEN
    } else {
        0
    }
}
