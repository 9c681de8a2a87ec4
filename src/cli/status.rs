use std::time::Duration;

use crate::audio::decoders::mp3::probe::StreamInfo;
use crate::audio::decoders::mp3::seek_index::{BuildOutcome, SeekIndexEntry};
use crate::audio::decoders::mp3::vbr::VbrHeader;
use crate::config::EngineConfig;
use crate::error::{DecodeError, EngineError, ErrorSeverity};
use crate::models::{FileInfo, TrackMetadata};

/// Report formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Everything `probe` learned about a file
    pub fn display_probe(file: &FileInfo, stream: Option<&StreamInfo>, metadata: &TrackMetadata) {
        println!("┌─ Stream ────────────────────────────────────────────────┐");
        println!("│ Format: {}", Self::truncate(&file.format_description, 48));
        println!("│ Sample Rate: {} Hz", file.sample_rate);
        println!("│ Channels: {}", Self::channel_description(file.channels));
        println!(
            "│ Bitrate: {} kbps ({})",
            file.bitrate / 1000,
            file.bitrate_mode.name()
        );
        println!(
            "│ Duration: {} ({} samples)",
            file.duration_string(),
            file.total_samples
        );
        println!("│ File Size: {}", Self::format_file_size(file.file_size));
        if let Some(delay) = file.encoder_delay {
            println!("│ Encoder Delay: {} samples", delay);
        }
        if let Some(padding) = file.encoder_padding {
            println!("│ Encoder Padding: {} samples", padding);
        }

        if let Some(stream) = stream {
            Self::display_stream_layout(stream);
        }

        if metadata.has_tags() {
            println!("│");
            if let Some(title) = &metadata.title {
                println!("│ Title: {}", Self::truncate(title, 50));
            }
            println!("│ Artist: {}", Self::truncate(&metadata.artist_name(), 49));
            if let Some(album) = &metadata.album {
                println!("│ Album: {}", Self::truncate(album, 50));
            }
            if let Some(track_num) = metadata.track_number {
                println!("│ Track: {}", track_num);
            }
            if let Some(year) = metadata.year {
                println!("│ Year: {}", year);
            }
            if let Some(genre) = &metadata.genre {
                println!("│ Genre: {}", Self::truncate(genre, 50));
            }
        }
        println!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_stream_layout(stream: &StreamInfo) {
        println!("│");
        println!("│ First Frame: byte {}", stream.start_offset);
        match (&stream.vbr_header, stream.vbr_header_offset) {
            (Some(VbrHeader::Xing(xing)), Some(offset)) => {
                let tag = if xing.is_vbr { "Xing" } else { "Info" };
                println!("│ Index Frame: {} at byte {}", tag, offset);
                if let Some(quality) = xing.quality {
                    println!("│ Quality: {}", quality);
                }
                if xing.toc.is_some() {
                    println!("│ TOC: 100 entries");
                }
            }
            (Some(VbrHeader::Vbri(vbri)), Some(offset)) => {
                println!("│ Index Frame: VBRI v{} at byte {}", vbri.version, offset);
                println!("│ TOC: {} entries", vbri.toc.len());
            }
            _ => println!("│ Index Frame: none"),
        }
        if stream.frame_count > 0 {
            println!("│ Declared Frames: {}", stream.frame_count);
        }
        if stream.header.is_free_format() {
            println!("│ Free Format: {} byte frames", stream.frame_size);
        }
    }

    /// Result of a seek index build and the table it produced
    pub fn display_index(outcome: Option<BuildOutcome>, entries: &[SeekIndexEntry], sample_rate: u32) {
        match outcome {
            Some(BuildOutcome::Completed { frames, entries: count }) => {
                println!("Indexed {} frames into {} checkpoints", frames, count)
            }
            Some(BuildOutcome::Cancelled { frames }) => {
                println!("Index build cancelled after {} frames", frames)
            }
            Some(BuildOutcome::TooShort) => {
                println!("Stream too short to index, seeks will walk from the start")
            }
            None => println!("No index was built"),
        }

        if entries.is_empty() {
            return;
        }
        println!("{:>5}  {:>10}  {:>12}  {:>10}  {:>8}", "slot", "frame", "sample", "offset", "time");
        for (slot, entry) in entries.iter().enumerate() {
            let time = if sample_rate == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(entry.sample * 1000 / sample_rate as u64)
            };
            println!(
                "{:>5}  {:>10}  {:>12}  {:>10}  {:>8}",
                slot,
                entry.frame,
                entry.sample,
                entry.offset,
                Self::format_duration(time)
            );
        }
    }

    /// Closing line of a `decode` run
    pub fn display_decode_summary(frames: u64, sample_rate: u32, interrupted: bool, errors: usize) {
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(frames * 1000 / sample_rate as u64)
        };
        println!(
            "{} {} sample frames ({})",
            if interrupted { "Stopped after" } else { "Decoded" },
            frames,
            Self::format_duration(duration)
        );
        if errors > 0 {
            println!("  Ended early after {} decode or stream error(s), see the log", errors);
        }
    }

    pub fn display_config(config: &EngineConfig, path: &std::path::Path) {
        println!("Configuration: {}", path.display());
        println!("  ring_buffer_frames       = {}", config.ring_buffer_frames);
        println!("  probe_window_bytes       = {}", config.probe_window_bytes);
        println!("  free_format_window_bytes = {}", config.free_format_window_bytes);
        println!("  free_format_candidates   = {}", config.free_format_candidates);
        println!("  resync_window_bytes      = {}", config.resync_window_bytes);
        println!("  build_seek_index         = {}", config.build_seek_index);
        println!("  gapless                  = {}", config.gapless);
    }

    /// Error with its severity, message and suggestions
    pub fn display_error(error: &EngineError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        if let EngineError::Decode(DecodeError::UnsupportedFormat { .. }) = error {
            eprintln!("│");
            eprintln!("│ Supported: MPEG-1/2/2.5 audio, Layers I, II and III");
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// One or two plain lines, for when the boxed form is unwanted
    pub fn display_simple_error(error: &EngineError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("Suggestion: {}", suggestions[0]);
        }
    }

    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    /// MM:SS, or H:MM:SS past the hour
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let mut size_f = size as f64;
        let mut unit_index = 0;

        while size_f >= 1024.0 && unit_index < UNITS.len() - 1 {
            size_f /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size_f, UNITS[unit_index])
        }
    }

    pub fn channel_description(channels: u16) -> &'static str {
        match channels {
            1 => "Mono",
            2 => "Stereo",
            _ => "Unsupported",
        }
    }

    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }
}
