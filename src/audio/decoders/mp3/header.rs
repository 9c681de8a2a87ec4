use serde::{Deserialize, Serialize};

pub const SYNC_MASK: u32 = 0x7ff << 21;
pub const VERSION_MASK: u32 = 3 << 19;
pub const LAYER_MASK: u32 = 3 << 17;
pub const PROTECTION_MASK: u32 = 1 << 16;
pub const BITRATE_MASK: u32 = 0xf << 12;
pub const SAMPLERATE_MASK: u32 = 3 << 10;
pub const PADDING_MASK: u32 = 1 << 9;
pub const PRIVATE_MASK: u32 = 1 << 8;
pub const CHANNELMODE_MASK: u32 = 3 << 6;
pub const MODE_EXT_MASK: u32 = 3 << 4;
pub const COPYRIGHT_MASK: u32 = 1 << 3;
pub const ORIGINAL_MASK: u32 = 1 << 2;
pub const EMPHASIS_MASK: u32 = 3;

/// Fields that must agree between frames of one stream
const REFERENCE_MASK: u32 = VERSION_MASK | LAYER_MASK | SAMPLERATE_MASK | CHANNELMODE_MASK;

// kbps, indexed by [row][bitrate index]
const BITRATES: [[u32; 15]; 5] = [
    // MPEG-1 Layer I
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    // MPEG-1 Layer II
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    // MPEG-1 Layer III
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    // MPEG-2/2.5 Layer I
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    // MPEG-2/2.5 Layer II and III
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpegVersion {
    V1,
    V2,
    V2_5,
}

impl MpegVersion {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(MpegVersion::V2_5),
            2 => Some(MpegVersion::V2),
            3 => Some(MpegVersion::V1),
            _ => None,
        }
    }

    fn rate_row(&self) -> usize {
        match self {
            MpegVersion::V1 => 0,
            MpegVersion::V2 => 1,
            MpegVersion::V2_5 => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MpegVersion::V1 => "MPEG-1",
            MpegVersion::V2 => "MPEG-2",
            MpegVersion::V2_5 => "MPEG-2.5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    I,
    II,
    III,
}

impl Layer {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            3 => Some(Layer::I),
            2 => Some(Layer::II),
            1 => Some(Layer::III),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layer::I => "Layer I",
            Layer::II => "Layer II",
            Layer::III => "Layer III",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelMode::Stereo => "Stereo",
            ChannelMode::JointStereo => "Joint stereo",
            ChannelMode::DualChannel => "Dual channel",
            ChannelMode::Mono => "Single channel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Emphasis {
    None,
    Ms50_15,
    Reserved,
    CcittJ17,
}

impl Emphasis {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Emphasis::None,
            1 => Emphasis::Ms50_15,
            2 => Emphasis::Reserved,
            _ => Emphasis::CcittJ17,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Emphasis::None => "Emphasis: none",
            Emphasis::Ms50_15 => "Emphasis: 50/15 us",
            Emphasis::Reserved => "Emphasis: reserved",
            Emphasis::CcittJ17 => "Emphasis: CCITT J.17",
        }
    }
}

/// Duration of one frame in milliseconds as `num / den`.
///
/// 44.1 kHz family rates do not divide into whole milliseconds, so the
/// denominator absorbs the factor (49 or 147) that makes the numerator exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDuration {
    pub num: u64,
    pub den: u64,
}

impl FrameDuration {
    fn for_rate(freq_index: usize, sample_rate: u32, layer: Layer, spf: u32) -> Self {
        let rate = sample_rate as u64;
        let spf = spf as u64;
        if freq_index != 0 {
            FrameDuration { num: 1000 * spf / rate, den: 1 }
        } else if layer == Layer::I {
            FrameDuration { num: 147_000 * 384 / rate, den: 147 }
        } else {
            FrameDuration { num: 49_000 * spf / rate, den: 49 }
        }
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Total milliseconds covered by `frames` frames.
    ///
    /// Multiplies first for accuracy; when that would overflow, divides
    /// first and accepts the truncation.
    pub fn total_millis(&self, frames: u64) -> u64 {
        match frames.checked_mul(self.num) {
            Some(product) => product / self.den,
            None => frames / self.den * self.num,
        }
    }
}

/// A decoded 32-bit frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub raw: u32,
    pub version: MpegVersion,
    pub layer: Layer,
    pub protected: bool,
    /// kbps, 0 for free format
    pub bitrate: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub private: bool,
    pub channel_mode: ChannelMode,
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: Emphasis,
    /// Bytes including the header, 0 for free format
    pub frame_size: usize,
    pub samples_per_frame: u32,
    pub duration: FrameDuration,
}

/// Header-validity predicate.
///
/// Rejects a bad sync, the reserved version, the reserved layer, the
/// forbidden bitrate index and the reserved sample rate. A zero bitrate
/// index (free format) passes only when `allow_free` is set.
pub fn is_valid_header(raw: u32, allow_free: bool) -> bool {
    if raw & SYNC_MASK != SYNC_MASK {
        return false;
    }
    if raw & VERSION_MASK == 1 << 19 {
        return false;
    }
    if raw & LAYER_MASK == 0 {
        return false;
    }
    if raw & BITRATE_MASK == BITRATE_MASK {
        return false;
    }
    if raw & BITRATE_MASK == 0 && !allow_free {
        return false;
    }
    if raw & SAMPLERATE_MASK == SAMPLERATE_MASK {
        return false;
    }
    true
}

impl FrameHeader {
    /// Decode a header that already passed [`is_valid_header`]. Returns
    /// `None` for anything else.
    pub fn parse(raw: u32) -> Option<Self> {
        if !is_valid_header(raw, true) {
            return None;
        }

        let version = MpegVersion::from_bits((raw & VERSION_MASK) >> 19)?;
        let layer = Layer::from_bits((raw & LAYER_MASK) >> 17)?;
        let bitrate_index = ((raw & BITRATE_MASK) >> 12) as usize;
        let freq_index = ((raw & SAMPLERATE_MASK) >> 10) as usize;

        let row = match (version, layer) {
            (MpegVersion::V1, Layer::I) => 0,
            (MpegVersion::V1, Layer::II) => 1,
            (MpegVersion::V1, Layer::III) => 2,
            (_, Layer::I) => 3,
            _ => 4,
        };
        let bitrate = BITRATES[row][bitrate_index];
        let sample_rate = SAMPLE_RATES[version.rate_row()][freq_index];
        let padding = raw & PADDING_MASK != 0;

        let samples_per_frame = match layer {
            Layer::I => 384,
            Layer::III if version != MpegVersion::V1 => 576,
            _ => 1152,
        };

        let frame_size = if bitrate == 0 {
            0
        } else if layer == Layer::I {
            ((12_000 * bitrate / sample_rate + padding as u32) * 4) as usize
        } else {
            (125 * samples_per_frame * bitrate / sample_rate + padding as u32) as usize
        };

        Some(FrameHeader {
            raw,
            version,
            layer,
            protected: raw & PROTECTION_MASK != 0,
            bitrate,
            sample_rate,
            padding,
            private: raw & PRIVATE_MASK != 0,
            channel_mode: ChannelMode::from_bits((raw & CHANNELMODE_MASK) >> 6),
            mode_extension: ((raw & MODE_EXT_MASK) >> 4) as u8,
            copyright: raw & COPYRIGHT_MASK != 0,
            original: raw & ORIGINAL_MASK != 0,
            emphasis: Emphasis::from_bits(raw & EMPHASIS_MASK),
            frame_size,
            samples_per_frame,
            duration: FrameDuration::for_rate(freq_index, sample_rate, layer, samples_per_frame),
        })
    }

    /// Read a header from the first four bytes of `bytes`
    pub fn read_raw(bytes: &[u8]) -> Option<u32> {
        let b: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(b))
    }

    /// Whether `raw` belongs to the same stream as this header: same
    /// version, layer, sample rate and channel mode.
    pub fn matches(&self, raw: u32) -> bool {
        raw & REFERENCE_MASK == self.raw & REFERENCE_MASK
    }

    pub fn is_free_format(&self) -> bool {
        self.bitrate == 0
    }

    pub fn channels(&self) -> u16 {
        self.channel_mode.channels()
    }

    /// Offset of the Xing/Info tag from the start of the frame
    pub fn xing_offset(&self) -> usize {
        let side_info = match (self.version, self.channel_mode) {
            (MpegVersion::V1, ChannelMode::Mono) => 17,
            (MpegVersion::V1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            _ => 17,
        };
        4 + side_info
    }

    /// Human-readable description such as
    /// "MPEG Audio (Layer III, Joint stereo, Emphasis: none)"
    pub fn format_description(&self) -> String {
        format!(
            "MPEG Audio ({}, {}, {})",
            self.layer.name(),
            self.channel_mode.name(),
            self.emphasis.name()
        )
    }
}
