use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::header::FrameHeader;
use super::scanner::{find_next_frame, ScanRules};
use super::vbr::{parse_vbr_header, VbrHeader};
use crate::config::EngineConfig;
use crate::error::DecodeError;
use crate::logging::EngineLogger;
use crate::models::BitrateMode;

/// Whole-stream parameters established once at open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Header of the first audio frame
    pub header: FrameHeader,
    /// Byte offset of the first audio frame, after any index frame
    pub start_offset: u64,
    /// Byte offset of the Xing/Info/VBRI frame, if present
    pub vbr_header_offset: Option<u64>,
    pub file_size: u64,
    /// Stream frame size; measured between headers for free format
    pub frame_size: usize,
    /// Declared by an index frame, 0 when unknown
    pub frame_count: u64,
    /// Declared by an index frame, 0 when unknown
    pub byte_count: u64,
    pub total_samples: u64,
    /// Average bitrate in bits per second
    pub bitrate: u32,
    pub bitrate_mode: BitrateMode,
    pub encoder_delay: Option<u32>,
    pub encoder_padding: Option<u32>,
    pub vbr_header: Option<VbrHeader>,
}

impl StreamInfo {
    /// Where decoding begins. The index frame is fed to the decoder too,
    /// which yields one silent frame that gapless trimming accounts for.
    pub fn decode_start(&self) -> u64 {
        self.vbr_header_offset.unwrap_or(self.start_offset)
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.header.channels()
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.header.samples_per_frame
    }

    pub fn is_vbr(&self) -> bool {
        self.bitrate_mode == BitrateMode::Variable
    }

    pub fn format_description(&self) -> String {
        self.header.format_description()
    }

    /// Audio frames between the first audio frame and end of file, for
    /// index spacing
    pub fn estimated_frames(&self) -> u64 {
        if self.is_vbr() && self.frame_count > 0 {
            return self.frame_count;
        }
        if self.frame_size == 0 {
            return 0;
        }
        self.file_size.saturating_sub(self.start_offset) / self.frame_size as u64
    }
}

/// Probe a complete byte view starting at `audio_start` (the first byte
/// after any leading tag block).
///
/// A stream whose free-format frame size cannot be confirmed is probed a
/// second time with free format disallowed.
pub fn probe_stream(
    data: &[u8],
    audio_start: usize,
    config: &EngineConfig,
    logger: &EngineLogger,
) -> Result<StreamInfo, DecodeError> {
    match probe_pass(data, audio_start, config, true) {
        Err(DecodeError::CorruptStream(reason)) => {
            logger.log_format_fallback(&reason);
            probe_pass(data, audio_start, config, false)
        }
        result => result,
    }
}

fn probe_pass(
    data: &[u8],
    audio_start: usize,
    config: &EngineConfig,
    allow_free: bool,
) -> Result<StreamInfo, DecodeError> {
    let file_size = data.len() as u64;
    let limit = audio_start.saturating_add(config.probe_window_bytes);

    let first = find_next_frame(data, audio_start, limit, &ScanRules::open(allow_free)).ok_or_else(|| {
        DecodeError::UnsupportedFormat {
            format: format!("no MPEG frame header within {} bytes", config.probe_window_bytes),
        }
    })?;
    let header = FrameHeader::parse(first.raw).ok_or_else(|| DecodeError::UnsupportedFormat {
        format: format!("invalid frame header {:08x}", first.raw),
    })?;
    debug!(
        "First frame header {:08x} at {} ({} {}, {} kbps, {} Hz)",
        first.raw,
        first.offset,
        header.version.name(),
        header.layer.name(),
        header.bitrate,
        header.sample_rate
    );

    if header.is_free_format() {
        let frame_size = measure_free_format(data, first.offset, &header, config)?;
        return Ok(free_format_info(header, first.offset as u64, frame_size, file_size));
    }

    let frame_end = (first.offset + header.frame_size).min(data.len());
    let vbr_header = parse_vbr_header(&data[first.offset..frame_end], &header);

    let Some(vbr_header) = vbr_header else {
        return Ok(constant_info(header, first.offset as u64, file_size, None, None));
    };

    // the index frame carries no audio; the real parameters come from the next one
    let mut resync_from = first.offset + header.frame_size;
    if header.padding {
        // some encoders set the padding bit on an unpadded index frame
        resync_from -= 1;
    }
    let next = find_next_frame(
        data,
        resync_from,
        resync_from.saturating_add(config.resync_window_bytes),
        &ScanRules::open(allow_free),
    )
    .ok_or_else(|| DecodeError::UnsupportedFormat {
        format: "no audio frame after VBR header".to_string(),
    })?;
    let audio_header = FrameHeader::parse(next.raw).ok_or_else(|| DecodeError::UnsupportedFormat {
        format: format!("invalid frame header {:08x}", next.raw),
    })?;

    let (encoder_delay, encoder_padding) = match &vbr_header {
        VbrHeader::Xing(xing) => (xing.encoder_delay, xing.encoder_padding),
        VbrHeader::Vbri(_) => (None, None),
    };
    debug!(
        "VBR index frame at {} ({}), audio starts at {}",
        first.offset,
        if vbr_header.is_vbr() { "variable" } else { "constant" },
        next.offset
    );

    let frame_count = vbr_header.frame_count().unwrap_or(0) as u64;
    let byte_count = vbr_header.byte_count().unwrap_or(0) as u64;

    if !vbr_header.is_vbr() || frame_count == 0 {
        if vbr_header.is_vbr() {
            warn!("VBR header without a frame count, estimating length from file size");
        }
        let mut info = constant_info(audio_header, next.offset as u64, file_size, encoder_delay, encoder_padding);
        info.vbr_header_offset = Some(first.offset as u64);
        info.frame_count = frame_count;
        info.byte_count = byte_count;
        info.vbr_header = Some(vbr_header);
        return Ok(info);
    }

    let duration = audio_header.duration;
    let file_time_ms = duration.total_millis(frame_count);
    let total_samples = (frame_count as u128 * duration.num as u128 * audio_header.sample_rate as u128
        / (duration.den as u128 * 1000)) as u64;
    let bitrate = if file_time_ms > 0 && byte_count > 0 {
        // bytes * 8 / ms is kbit/s
        u32::try_from((byte_count.saturating_mul(8) / file_time_ms).saturating_mul(1000)).unwrap_or(u32::MAX)
    } else {
        audio_header.bitrate * 1000
    };

    Ok(StreamInfo {
        header: audio_header,
        start_offset: next.offset as u64,
        vbr_header_offset: Some(first.offset as u64),
        file_size,
        frame_size: audio_header.frame_size,
        frame_count,
        byte_count,
        total_samples,
        bitrate,
        bitrate_mode: BitrateMode::Variable,
        encoder_delay,
        encoder_padding,
        vbr_header: Some(vbr_header),
    })
}

/// Find the header that follows a free-format frame and return the
/// distance to it
fn measure_free_format(
    data: &[u8],
    first_offset: usize,
    header: &FrameHeader,
    config: &EngineConfig,
) -> Result<usize, DecodeError> {
    let rules = ScanRules::open(true);
    let mut from = first_offset + 4;

    for _ in 0..config.free_format_candidates {
        let limit = from.saturating_add(config.free_format_window_bytes);
        let Some(candidate) = find_next_frame(data, from, limit, &rules) else {
            return Err(DecodeError::CorruptStream(format!(
                "no second free-format frame within {} bytes",
                config.free_format_window_bytes
            )));
        };
        if header.matches(candidate.raw) {
            debug!("Free-format frame size {} bytes", candidate.offset - first_offset);
            return Ok(candidate.offset - first_offset);
        }
        from = candidate.offset + 1;
    }

    Err(DecodeError::CorruptStream(format!(
        "none of {} candidate frames match the first free-format header",
        config.free_format_candidates
    )))
}

fn free_format_info(header: FrameHeader, start: u64, frame_size: usize, file_size: u64) -> StreamInfo {
    let payload = file_size.saturating_sub(start);
    let total_samples = payload * header.samples_per_frame as u64 / frame_size as u64;
    let bitrate = if total_samples > 0 {
        u32::try_from(8 * payload as u128 * header.sample_rate as u128 / total_samples as u128).unwrap_or(u32::MAX)
    } else {
        0
    };

    StreamInfo {
        header,
        start_offset: start,
        vbr_header_offset: None,
        file_size,
        frame_size,
        frame_count: 0,
        byte_count: 0,
        total_samples,
        bitrate,
        bitrate_mode: BitrateMode::Unspecified,
        encoder_delay: None,
        encoder_padding: None,
        vbr_header: None,
    }
}

fn constant_info(
    header: FrameHeader,
    start: u64,
    file_size: u64,
    encoder_delay: Option<u32>,
    encoder_padding: Option<u32>,
) -> StreamInfo {
    let bitrate = header.bitrate * 1000;
    let payload = file_size.saturating_sub(start);
    let total_samples = (payload as u128 * 8 * header.sample_rate as u128 / bitrate.max(1) as u128) as u64;

    StreamInfo {
        header,
        start_offset: start,
        vbr_header_offset: None,
        file_size,
        frame_size: header.frame_size,
        frame_count: 0,
        byte_count: 0,
        total_samples,
        bitrate,
        bitrate_mode: BitrateMode::Constant,
        encoder_delay,
        encoder_padding,
        vbr_header: None,
    }
}
