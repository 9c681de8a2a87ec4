use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File extensions routed to the MPEG engine
pub const MPEG_EXTENSIONS: &[&str] = &[
    "mp3", "mpa", "mpga", "mpega", "abs", "mp2", "mp2a", "mpa2", "mp1",
];

/// Check whether a path carries one of the MPEG audio extensions
pub fn is_mpeg_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MPEG_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Result of opening a stream through the decoder contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenStatus {
    Success,
    BadFormat,
    FileError,
}

impl OpenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenStatus::Success => "success",
            OpenStatus::BadFormat => "bad format",
            OpenStatus::FileError => "file error",
        }
    }
}

/// Bitrate classification of an MPEG audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitrateMode {
    /// Every frame uses the bitrate of the first header
    Constant,
    /// A Xing or VBRI index frame declared the stream variable
    Variable,
    /// No index frame and no declared bitrate (free format)
    Unspecified,
}

impl BitrateMode {
    pub fn name(&self) -> &'static str {
        match self {
            BitrateMode::Constant => "CBR",
            BitrateMode::Variable => "VBR",
            BitrateMode::Unspecified => "UBR",
        }
    }
}

/// Stream parameters reported to the player core after a successful open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub sample_rate: u32,
    /// Output channel count (1 or 2)
    pub channels: u16,
    pub total_samples: u64,
    /// Average bitrate in bits per second
    pub bitrate: u32,
    pub bitrate_mode: BitrateMode,
    pub file_size: u64,
    pub format_description: String,
    pub encoder_delay: Option<u32>,
    pub encoder_padding: Option<u32>,
}

impl FileInfo {
    /// Playback duration derived from the total sample estimate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_samples * 1000 / self.sample_rate as u64)
    }

    /// Human-readable duration in MM:SS format
    pub fn duration_string(&self) -> String {
        let total_seconds = self.duration().as_secs();
        format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        format!(
            "{} - {} kbps {} - {} Hz - {} channel{}",
            self.format_description,
            self.bitrate / 1000,
            self.bitrate_mode.name(),
            self.sample_rate,
            self.channels,
            if self.channels == 1 { "" } else { "s" }
        )
    }
}

/// Tag and encoder information pushed by `send_metadata`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub format_description: String,
    pub encoder_delay: Option<u32>,
    pub encoder_padding: Option<u32>,
}

impl TrackMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any tag field was found
    pub fn has_tags(&self) -> bool {
        self.title.is_some()
            || self.artist.is_some()
            || self.album.is_some()
            || self.track_number.is_some()
            || self.year.is_some()
            || self.genre.is_some()
    }

    /// Get the artist name or "Unknown Artist"
    pub fn artist_name(&self) -> String {
        self.artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }
}
