use std::ops::Range;

/// Lookahead of the MPEG synthesis stage, in samples
pub const DECODER_DELAY: u32 = 528;

/// Byte offsets of the physically last two frames, known once the seek
/// index has been built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailMarks {
    pub last: Option<u64>,
    pub second_last: Option<u64>,
}

/// Removes encoder delay from the start and encoder padding from the end
/// of a decoded stream, one frame at a time
#[derive(Debug, Clone)]
pub struct GaplessWindow {
    /// Samples to drop from the start, decoder lookahead included
    effective_delay: u64,
    padding: usize,
    skip_remaining: u64,
}

impl GaplessWindow {
    /// Create a window from encoder-reported delay and padding.
    ///
    /// The effective delay also covers the decoder lookahead and the
    /// silent index frame that precedes the audio.
    pub fn new(encoder_delay: Option<u32>, encoder_padding: Option<u32>, samples_per_frame: u32) -> Self {
        let effective_delay = match encoder_delay {
            Some(delay) if delay > 0 => (delay + DECODER_DELAY + samples_per_frame) as u64,
            _ => 0,
        };
        Self {
            effective_delay,
            padding: encoder_padding.unwrap_or(0) as usize,
            skip_remaining: effective_delay,
        }
    }

    /// A window that passes every sample through
    pub fn disabled() -> Self {
        Self {
            effective_delay: 0,
            padding: 0,
            skip_remaining: 0,
        }
    }

    pub fn effective_delay(&self) -> u64 {
        self.effective_delay
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Start trimming the delay again (playback restarted from the top)
    pub fn rearm(&mut self) {
        self.skip_remaining = self.effective_delay;
    }

    /// Stop trimming the delay (playback continues from the middle)
    pub fn disarm(&mut self) {
        self.skip_remaining = 0;
    }

    /// Range of sample frames to keep from a decoded frame of `frames`
    /// samples that started at byte `frame_offset`. `None` drops the frame.
    pub fn trim(&mut self, frames: usize, frame_offset: u64, tail: &TailMarks) -> Option<Range<usize>> {
        let mut start = 0;
        if self.skip_remaining > frames as u64 {
            self.skip_remaining -= frames as u64;
            return None;
        } else if self.skip_remaining > 0 {
            start = self.skip_remaining as usize;
            self.skip_remaining = 0;
        }

        let mut end = frames;
        let pad = self.padding;
        if pad > 0 {
            match (tail.last, tail.second_last) {
                (Some(last), _) if frame_offset >= last => {
                    if pad > frames {
                        return None;
                    }
                    end = frames - pad;
                }
                (_, Some(second_last)) if frame_offset >= second_last && pad > frames => {
                    // the last frame was too short for all of the padding
                    end = frames.saturating_sub(pad - frames);
                }
                _ => {}
            }
        }

        Some(start.min(end)..end)
    }
}
