use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use crate::audio::decoders::mp3::probe::StreamInfo;
use crate::audio::Mp3Decoder;
use crate::config::{ConfigManager, EngineConfig};
use crate::error::EngineError;
use crate::logging::EngineLogger;
use crate::models::{is_mpeg_extension, FileInfo, TrackMetadata};

pub mod status;
pub use status::StatusDisplay;

/// Sample frames requested per read while decoding
const DECODE_CHUNK_FRAMES: usize = 4096;

/// MPEG audio decoding engine CLI
#[derive(Debug, Parser)]
#[command(name = "mpegplay")]
#[command(about = "Probe, index and decode MPEG audio files")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Configuration file to use instead of the per-user one
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open a file and print its stream parameters
    Probe {
        file: String,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a file to raw little-endian f32 samples
    Decode {
        file: String,
        /// Where to write the samples; they are only counted when absent
        #[arg(short, long, value_name = "PATH")]
        output: Option<String>,
        /// Start at this sample frame
        #[arg(long, value_name = "SAMPLE")]
        seek: Option<u64>,
        /// Stop after this many sample frames
        #[arg(long, value_name = "N")]
        max_frames: Option<u64>,
        /// Keep encoder delay and padding in the output
        #[arg(long)]
        no_gapless: bool,
    },
    /// Build the seek index for a file and print it
    Index { file: String },
    /// Show or reset the configuration
    Config {
        #[arg(long)]
        reset: bool,
    },
}

/// Everything `probe --json` prints
#[derive(Debug, Serialize)]
pub struct ProbeReport<'a> {
    pub file: &'a FileInfo,
    pub stream: Option<&'a StreamInfo>,
    pub metadata: &'a TrackMetadata,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(rest)
            } else {
                PathBuf::from(path)
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// The `--config` file when given, the per-user one otherwise
    pub fn config_manager(&self) -> Result<ConfigManager, EngineError> {
        let manager = match &self.config {
            Some(path) => ConfigManager::load_from(Self::expand_path(path))?,
            None => ConfigManager::new()?,
        };
        Ok(manager)
    }

    pub fn run(self) -> Result<(), EngineError> {
        let mut manager = self.config_manager()?;

        match self.command {
            Commands::Probe { file, json } => Self::run_probe(&file, json, manager.get_config()),
            Commands::Decode { file, output, seek, max_frames, no_gapless } => {
                let mut config = manager.get_config().clone();
                if no_gapless {
                    config.gapless = false;
                }
                Self::run_decode(&file, output.as_deref(), seek, max_frames, &config)
            }
            Commands::Index { file } => Self::run_index(&file, manager.get_config()),
            Commands::Config { reset } => {
                if reset {
                    manager.reset_to_defaults()?;
                    println!("Configuration reset to defaults");
                }
                StatusDisplay::display_config(manager.get_config(), manager.config_path());
                Ok(())
            }
        }
    }

    fn open(file: &str, config: &EngineConfig, logger: EngineLogger) -> Result<Mp3Decoder, EngineError> {
        let path = Self::expand_path(file);
        if !is_mpeg_extension(&path) {
            warn!("{} does not have an MPEG audio extension, probing it anyway", path.display());
        }
        Ok(Mp3Decoder::open_with_config(&path, config, logger)?)
    }

    fn run_probe(file: &str, json: bool, config: &EngineConfig) -> Result<(), EngineError> {
        // the table is not needed for a probe
        let config = EngineConfig { build_seek_index: false, ..config.clone() };
        let mut decoder = Self::open(file, &config, EngineLogger::new())?;

        if json {
            let report = ProbeReport {
                file: decoder.file_info(),
                stream: decoder.stream_info(),
                metadata: decoder.metadata(),
            };
            let text = serde_json::to_string_pretty(&report).map_err(io::Error::from)?;
            println!("{}", text);
        } else {
            StatusDisplay::display_probe(decoder.file_info(), decoder.stream_info(), decoder.metadata());
        }

        decoder.close();
        Ok(())
    }

    fn run_decode(
        file: &str,
        output: Option<&str>,
        seek: Option<u64>,
        max_frames: Option<u64>,
        config: &EngineConfig,
    ) -> Result<(), EngineError> {
        let logger = EngineLogger::new();
        let mut decoder = Self::open(file, config, logger.clone())?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            warn!("Ctrl-C handler not installed: {}", e);
        }

        if let Some(target) = seek {
            decoder.seek(target)?;
        }

        let mut writer = match output {
            Some(path) => Some(BufWriter::new(File::create(Self::expand_path(path))?)),
            None => None,
        };

        let channels = decoder.channels().max(1) as usize;
        let mut buffer = vec![0.0f32; DECODE_CHUNK_FRAMES * channels];
        let mut frames: u64 = 0;

        let result = loop {
            if stop.load(Ordering::SeqCst) {
                break Ok(());
            }
            let wanted = match max_frames {
                Some(limit) if frames >= limit => break Ok(()),
                Some(limit) => ((limit - frames) as usize).min(DECODE_CHUNK_FRAMES) * channels,
                None => buffer.len(),
            };
            let count = match decoder.read(&mut buffer[..wanted]) {
                Ok(0) => break Ok(()),
                Ok(count) => count,
                Err(e) => break Err(EngineError::from(e)),
            };
            if let Some(writer) = writer.as_mut() {
                if let Err(e) = Self::write_samples(writer, &buffer[..count]) {
                    break Err(e.into());
                }
            }
            frames += (count / channels) as u64;
        };

        let flushed = match writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        };
        let interrupted = stop.load(Ordering::SeqCst);
        let sample_rate = decoder.file_info().sample_rate;
        decoder.close();

        result?;
        flushed?;
        if interrupted {
            info!("Decode of {} interrupted", file);
        }
        let stats = logger.get_event_statistics();
        StatusDisplay::display_decode_summary(
            frames,
            sample_rate,
            interrupted,
            stats.decode_errors + stats.stream_errors,
        );
        Ok(())
    }

    fn write_samples<W: Write>(writer: &mut W, samples: &[f32]) -> io::Result<()> {
        for sample in samples {
            writer.write_all(&sample.to_le_bytes())?;
        }
        Ok(())
    }

    fn run_index(file: &str, config: &EngineConfig) -> Result<(), EngineError> {
        let config = EngineConfig { build_seek_index: true, ..config.clone() };
        let mut decoder = Self::open(file, &config, EngineLogger::new())?;

        let outcome = decoder.wait_for_index();
        let entries = decoder.seek_table().entries();
        StatusDisplay::display_index(outcome, &entries, decoder.file_info().sample_rate);

        decoder.close();
        Ok(())
    }

    /// Display error message with formatting
    pub fn display_error(error: &EngineError) {
        StatusDisplay::display_error(error);
    }
}

#[cfg(test)]
mod tests;
