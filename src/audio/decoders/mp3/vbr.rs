use log::debug;
use serde::{Deserialize, Serialize};

use super::header::FrameHeader;

const XING_FRAMES_FLAG: u8 = 0x01;
const XING_BYTES_FLAG: u8 = 0x02;
const XING_TOC_FLAG: u8 = 0x04;
const XING_QUALITY_FLAG: u8 = 0x08;

/// Bytes between the end of the optional Xing fields and the LAME
/// delay/padding triplet
const LAME_DELAY_OFFSET: usize = 21;
const MAX_ENCODER_DELAY: u32 = 1152;
const MAX_ENCODER_PADDING: u32 = 2 * 1152;

/// The VBRI tag always sits 32 bytes after the frame header
const VBRI_OFFSET: usize = 4 + 32;

/// Contents of a Xing or Info frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XingHeader {
    /// "Xing" marks VBR, "Info" marks a CBR stream written by LAME
    pub is_vbr: bool,
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
    pub toc: Option<Vec<u8>>,
    pub quality: Option<u32>,
    pub encoder_delay: Option<u32>,
    pub encoder_padding: Option<u32>,
}

/// Contents of a Fraunhofer VBRI frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VbriHeader {
    pub version: u16,
    pub delay: u16,
    pub quality: u16,
    pub bytes: u32,
    pub frames: u32,
    pub frames_per_entry: u16,
    /// Scaled byte distances between TOC points, not resolved to offsets
    pub toc: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VbrHeader {
    Xing(XingHeader),
    Vbri(VbriHeader),
}

impl VbrHeader {
    pub fn is_vbr(&self) -> bool {
        match self {
            VbrHeader::Xing(xing) => xing.is_vbr,
            VbrHeader::Vbri(_) => true,
        }
    }

    pub fn frame_count(&self) -> Option<u32> {
        match self {
            VbrHeader::Xing(xing) => xing.frames,
            VbrHeader::Vbri(vbri) => Some(vbri.frames),
        }
    }

    pub fn byte_count(&self) -> Option<u32> {
        match self {
            VbrHeader::Xing(xing) => xing.bytes,
            VbrHeader::Vbri(vbri) => Some(vbri.bytes),
        }
    }
}

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    let b: [u8; 2] = data.get(pos..pos + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(b))
}

fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    let b: [u8; 4] = data.get(pos..pos + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(b))
}

/// Inspect a complete first frame (header included) for an index block
pub fn parse_vbr_header(frame: &[u8], header: &FrameHeader) -> Option<VbrHeader> {
    let xing_pos = header.xing_offset();
    match frame.get(xing_pos..xing_pos + 4) {
        Some(b"Xing") | Some(b"Info") => {
            return parse_xing(&frame[xing_pos..]).map(VbrHeader::Xing);
        }
        _ => {}
    }

    if frame.get(VBRI_OFFSET..VBRI_OFFSET + 4) == Some(&b"VBRI"[..]) {
        return parse_vbri(&frame[VBRI_OFFSET..]).map(VbrHeader::Vbri);
    }

    None
}

/// `tag` starts at the "Xing"/"Info" marker
fn parse_xing(tag: &[u8]) -> Option<XingHeader> {
    let flags = *tag.get(7)?;
    let mut pos = 8;

    let mut xing = XingHeader {
        is_vbr: &tag[..4] == b"Xing",
        frames: None,
        bytes: None,
        toc: None,
        quality: None,
        encoder_delay: None,
        encoder_padding: None,
    };

    if flags & XING_FRAMES_FLAG != 0 {
        xing.frames = be_u32(tag, pos);
        pos += 4;
    }
    if flags & XING_BYTES_FLAG != 0 {
        xing.bytes = be_u32(tag, pos);
        pos += 4;
    }
    if flags & XING_TOC_FLAG != 0 {
        xing.toc = tag.get(pos..pos + 100).map(|toc| toc.to_vec());
        pos += 100;
    }
    if flags & XING_QUALITY_FLAG != 0 {
        xing.quality = be_u32(tag, pos);
        pos += 4;
    }

    pos += LAME_DELAY_OFFSET;
    if let Some(packed) = tag.get(pos..pos + 3) {
        let delay = (packed[0] as u32) << 4 | (packed[1] as u32) >> 4;
        let padding = ((packed[1] & 0x0f) as u32) << 8 | packed[2] as u32;
        if delay <= MAX_ENCODER_DELAY && padding <= MAX_ENCODER_PADDING {
            xing.encoder_delay = Some(delay);
            xing.encoder_padding = Some(padding);
        } else {
            debug!("Ignoring out-of-range encoder delay {} / padding {}", delay, padding);
        }
    }

    Some(xing)
}

/// `tag` starts at the "VBRI" marker
fn parse_vbri(tag: &[u8]) -> Option<VbriHeader> {
    let version = be_u16(tag, 4)?;
    let delay = be_u16(tag, 6)?;
    let quality = be_u16(tag, 8)?;
    let bytes = be_u32(tag, 10)?;
    let frames = be_u32(tag, 14)?;
    let entries = be_u16(tag, 18)? as usize;
    let scale = be_u16(tag, 20)? as u32;
    let entry_size = be_u16(tag, 22)? as usize;
    let frames_per_entry = be_u16(tag, 24)?;

    let mut toc = Vec::with_capacity(entries);
    for i in 0..entries {
        let pos = 26 + i * entry_size;
        let raw = match entry_size {
            1 => tag.get(pos).map(|b| *b as u32),
            2 => be_u16(tag, pos).map(u32::from),
            3 => tag.get(pos..pos + 3).map(|b| (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32),
            4 => be_u32(tag, pos),
            _ => None,
        };
        match raw {
            Some(distance) => toc.push(distance.saturating_mul(scale.max(1))),
            // truncated inside the frame; keep what was read
            None => break,
        }
    }

    Some(VbriHeader {
        version,
        delay,
        quality,
        bytes,
        frames,
        frames_per_entry,
        toc,
    })
}
