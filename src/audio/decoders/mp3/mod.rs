pub mod decode_loop;
pub mod header;
pub mod primitive;
pub mod probe;
pub mod scanner;
pub mod seek_index;
pub mod vbr;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use self::decode_loop::{DecodeLoop, StreamInput};
use self::header::FrameHeader;
use self::primitive::{FramePrimitive, SymphoniaPrimitive};
use self::probe::{probe_stream, StreamInfo};
use self::scanner::{find_next_frame, frame_at, trailing_tag_len, ScanRules};
use self::seek_index::{BuildOutcome, SeekIndexBuilder, SeekIndexEntry, SeekTable};
use crate::audio::metadata::MetadataExtractor;
use crate::audio::source::{ByteView, StreamTransport};
use crate::audio::AudioDecoder;
use crate::config::EngineConfig;
use crate::error::DecodeError;
use crate::logging::{EngineLogger, OperationTimer};
use crate::models::{BitrateMode, FileInfo, OpenStatus, TrackMetadata};

/// Callback receiving tag information from `send_metadata`
pub type MetadataCallback = Box<dyn FnMut(&TrackMetadata) + Send>;

/// Lifecycle of an opened decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Probed, nothing read yet
    Open,
    Reading,
    /// Paused or at end of stream
    Idle,
    Closed,
}

impl DecoderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderState::Open => "open",
            DecoderState::Reading => "reading",
            DecoderState::Idle => "idle",
            DecoderState::Closed => "closed",
        }
    }
}

/// Where a seek put the cursor
struct SeekLanding {
    offset: usize,
    sample: u64,
    indexed: bool,
}

/// MPEG audio (Layer I/II/III) decoder over a memory-mapped file or a
/// network stream
pub struct Mp3Decoder {
    source_name: String,
    /// File mode only
    view: Option<ByteView>,
    /// File mode only
    info: Option<StreamInfo>,
    file_info: FileInfo,
    metadata: TrackMetadata,
    decode: Option<DecodeLoop>,
    table: Arc<SeekTable>,
    cancel: Arc<AtomicBool>,
    builder: Option<JoinHandle<BuildOutcome>>,
    builder_started: bool,
    config: EngineConfig,
    logger: EngineLogger,
    state: DecoderState,
    metadata_callback: Option<MetadataCallback>,
}

impl Mp3Decoder {
    /// Open a file with the default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        Self::open_with_config(path, &EngineConfig::default(), EngineLogger::new())
    }

    /// Open a file, mapping it read-only and reading its tags
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: &EngineConfig,
        logger: EngineLogger,
    ) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let view = ByteView::map_file(path)?;
        let name = path.display().to_string();

        let mut decoder = Self::open_source(view, &name, config, logger, Box::new(SymphoniaPrimitive::new()))?;

        match MetadataExtractor::read_tags(path) {
            Ok(tags) => decoder.metadata = Self::merge_tags(tags, &decoder.metadata),
            Err(e) => debug!("No tags read from {}: {}", name, e),
        }
        Ok(decoder)
    }

    /// Map the outcome of opening `path` onto the decoder contract's status
    pub fn open_status<P: AsRef<Path>>(path: P) -> OpenStatus {
        match Self::open(path) {
            Ok(_) => OpenStatus::Success,
            Err(e) => e.open_status(),
        }
    }

    /// Open an in-memory or mapped view with an explicit frame primitive
    pub fn open_source(
        view: ByteView,
        source_name: &str,
        config: &EngineConfig,
        logger: EngineLogger,
        primitive: Box<dyn FramePrimitive>,
    ) -> Result<Self, DecodeError> {
        let timer = OperationTimer::new(format!("open {}", source_name));
        let config = config.validated();

        let audio_start = MetadataExtractor::audio_start(&view);
        let info = probe_stream(&view, audio_start, &config, &logger)?;
        if info.channels() > 2 {
            return Err(DecodeError::UnsupportedChannels { channels: info.channels() });
        }

        let file_info = FileInfo {
            sample_rate: info.sample_rate(),
            channels: info.channels(),
            total_samples: info.total_samples,
            bitrate: info.bitrate,
            bitrate_mode: info.bitrate_mode,
            file_size: info.file_size,
            format_description: info.format_description(),
            encoder_delay: info.encoder_delay,
            encoder_padding: info.encoder_padding,
        };
        let metadata = TrackMetadata {
            format_description: file_info.format_description.clone(),
            encoder_delay: info.encoder_delay,
            encoder_padding: info.encoder_padding,
            ..TrackMetadata::new()
        };

        let table = Arc::new(SeekTable::new());
        let decode = DecodeLoop::for_file(
            view.clone(),
            &info,
            primitive,
            Arc::clone(&table),
            &config,
            logger.clone(),
            source_name.to_string(),
        );

        let summary = file_info.summary();
        info!("Opened {}: {}", source_name, summary);
        logger.log_stream_opened(source_name, &summary, timer.finish());

        Ok(Self {
            source_name: source_name.to_string(),
            view: Some(view),
            info: Some(info),
            file_info,
            metadata,
            decode: Some(decode),
            table,
            cancel: Arc::new(AtomicBool::new(false)),
            builder: None,
            builder_started: false,
            config,
            logger,
            state: DecoderState::Open,
            metadata_callback: None,
        })
    }

    /// Open a sequential stream. The first frame header fixes the sample
    /// rate; output is always stereo and seeking is unavailable.
    pub fn open_stream(
        transport: Box<dyn StreamTransport>,
        source_name: &str,
        config: &EngineConfig,
        logger: EngineLogger,
        primitive: Box<dyn FramePrimitive>,
    ) -> Result<Self, DecodeError> {
        let timer = OperationTimer::new(format!("open stream {}", source_name));
        let config = config.validated();
        let mut input = StreamInput::new(transport);

        let rules = ScanRules::open(false);
        let window = config.probe_window_bytes;
        let mut want = 4096.min(window);
        let sync = loop {
            let buffered = input.fill(want)?;
            if let Some(sync) = find_next_frame(input.available(), 0, buffered, &rules) {
                break sync;
            }
            if buffered < want || buffered >= window {
                return Err(DecodeError::UnsupportedFormat {
                    format: format!("no MPEG frame header in the first {} stream bytes", buffered),
                });
            }
            want = (want * 2).min(window);
        };
        input.advance(sync.offset);

        let reference = FrameHeader::parse(sync.raw).ok_or_else(|| DecodeError::UnsupportedFormat {
            format: format!("invalid frame header {:08x}", sync.raw),
        })?;

        let file_info = FileInfo {
            sample_rate: reference.sample_rate,
            channels: 2,
            total_samples: 0,
            bitrate: reference.bitrate * 1000,
            bitrate_mode: BitrateMode::Unspecified,
            file_size: 0,
            format_description: reference.format_description(),
            encoder_delay: None,
            encoder_padding: None,
        };
        let metadata = TrackMetadata {
            format_description: file_info.format_description.clone(),
            ..TrackMetadata::new()
        };

        let decode = DecodeLoop::for_stream(input, reference, primitive, &config, logger.clone(), source_name.to_string());

        let summary = file_info.summary();
        info!("Opened stream {}: {}", source_name, summary);
        logger.log_stream_opened(source_name, &summary, timer.finish());

        Ok(Self {
            source_name: source_name.to_string(),
            view: None,
            info: None,
            file_info,
            metadata,
            decode: Some(decode),
            table: Arc::new(SeekTable::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            builder: None,
            builder_started: false,
            config,
            logger,
            state: DecoderState::Open,
            metadata_callback: None,
        })
    }

    /// Tags from the file take precedence; engine fields are kept
    fn merge_tags(tags: TrackMetadata, engine: &TrackMetadata) -> TrackMetadata {
        TrackMetadata {
            format_description: engine.format_description.clone(),
            encoder_delay: engine.encoder_delay,
            encoder_padding: engine.encoder_padding,
            ..tags
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }

    pub fn is_stream(&self) -> bool {
        self.view.is_none() && self.state != DecoderState::Closed
    }

    /// Output channel count
    pub fn channels(&self) -> u16 {
        self.file_info.channels
    }

    /// Sample frames since the start of the stream, as far as the last
    /// read or seek knows
    pub fn position(&self) -> u64 {
        self.decode.as_ref().map(|d| d.position()).unwrap_or(0)
    }

    /// The shared checkpoint table, possibly still filling
    pub fn seek_table(&self) -> &SeekTable {
        &self.table
    }

    pub fn set_metadata_callback(&mut self, callback: MetadataCallback) {
        self.metadata_callback = Some(callback);
    }

    fn start_index_builder(&mut self) {
        if self.builder_started || !self.config.build_seek_index {
            return;
        }
        let (Some(view), Some(info)) = (self.view.as_ref(), self.info.as_ref()) else {
            return;
        };
        self.builder_started = true;

        let builder = SeekIndexBuilder::new(
            view.clone(),
            info,
            Arc::clone(&self.table),
            Arc::clone(&self.cancel),
            self.logger.clone(),
        );
        match builder.spawn() {
            Ok(handle) => self.builder = Some(handle),
            Err(e) => warn!("Seek index thread failed to start, seeking will be approximate: {}", e),
        }
    }

    /// Start the index builder if needed and block until it finishes.
    /// `None` for streams, when indexing is disabled, or when the
    /// builder was already joined.
    pub fn wait_for_index(&mut self) -> Option<BuildOutcome> {
        if self.state == DecoderState::Closed {
            return None;
        }
        self.start_index_builder();
        let handle = self.builder.take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                error!("Seek index thread for {} panicked", self.source_name);
                None
            }
        }
    }

    /// Read decoded samples into `buffer` (interleaved, whole frames).
    /// Returns the number of samples written; 0 at end of stream.
    pub fn read(&mut self, buffer: &mut [f32]) -> Result<usize, DecodeError> {
        if self.state == DecoderState::Closed {
            return Err(DecodeError::Closed);
        }
        self.start_index_builder();

        let decode = self.decode.as_mut().ok_or(DecodeError::Closed)?;
        let written = decode.fill(buffer);
        self.state = if decode.is_end_of_stream() && decode.buffered_frames() == 0 {
            DecoderState::Idle
        } else {
            DecoderState::Reading
        };
        Ok(written)
    }

    /// Reposition to `target` sample frames from the start
    pub fn seek(&mut self, target: u64) -> Result<(), DecodeError> {
        if self.state == DecoderState::Closed {
            return Err(DecodeError::Closed);
        }
        let (Some(view), Some(info)) = (self.view.as_ref(), self.info.as_ref()) else {
            return Err(DecodeError::SeekError("streams cannot be repositioned".to_string()));
        };
        let decode = self.decode.as_mut().ok_or(DecodeError::Closed)?;

        let timer = OperationTimer::new(format!("seek to {}", target));
        let spf = info.samples_per_frame() as u64;
        let target = target.min(info.total_samples);

        let landing = if target < spf {
            SeekLanding {
                offset: info.decode_start() as usize,
                sample: 0,
                indexed: true,
            }
        } else {
            match self.table.lookup(target) {
                Some(entry) => walk_to_sample(view, info, entry, target),
                None => approximate_landing(view, info, target),
            }
        };

        decode.reposition(landing.offset, landing.sample);
        if target < spf {
            decode.gapless_mut().rearm();
        } else {
            decode.gapless_mut().disarm();
        }
        self.state = DecoderState::Reading;

        debug!(
            "Seek to {} landed at sample {} (byte {})",
            target, landing.sample, landing.offset
        );
        self.logger
            .log_seek_operation(target, landing.sample, landing.indexed, timer.finish());
        Ok(())
    }

    /// Sample frames still to come, by the stream's total estimate
    pub fn samples_left(&self) -> u64 {
        self.file_info.total_samples.saturating_sub(self.position())
    }

    /// Streams disconnect their transport; queued samples are dropped
    pub fn pause(&mut self) -> Result<(), DecodeError> {
        if self.state == DecoderState::Closed {
            return Err(DecodeError::Closed);
        }
        if self.view.is_none() {
            if let Some(decode) = self.decode.as_mut() {
                decode.pause();
            }
        }
        self.state = DecoderState::Idle;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), DecodeError> {
        if self.state == DecoderState::Closed {
            return Err(DecodeError::Closed);
        }
        if let Some(decode) = self.decode.as_mut() {
            if let Err(e) = decode.resume() {
                self.logger.log_stream_error(&e.to_string());
                return Err(DecodeError::Io(e));
            }
        }
        self.state = DecoderState::Reading;
        Ok(())
    }

    /// Cancel and join the index builder, then release the byte source.
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == DecoderState::Closed {
            return;
        }

        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.builder.take() {
            match handle.join() {
                Ok(outcome) => debug!("Seek index builder stopped: {:?}", outcome),
                Err(_) => error!("Seek index thread for {} panicked", self.source_name),
            }
        }

        self.decode = None;
        self.view = None;
        self.state = DecoderState::Closed;
        self.logger.log_stream_closed(&self.source_name);
        info!("Closed {}", self.source_name);
    }

    /// Push the parsed tag information to the registered callback
    pub fn send_metadata(&mut self) {
        match self.metadata_callback.as_mut() {
            Some(callback) => callback(&self.metadata),
            None => debug!("No metadata callback registered for {}", self.source_name),
        }
    }

    pub fn file_info(&self) -> &FileInfo {
        &self.file_info
    }
}

/// From a checkpoint, step whole frames until the next one would pass
/// `target`
fn walk_to_sample(data: &[u8], info: &StreamInfo, entry: SeekIndexEntry, target: u64) -> SeekLanding {
    let limit = data.len().saturating_sub(4);
    let rules = ScanRules::following(&info.header);
    let free_size = info.frame_size.max(1);

    let mut pos = entry.offset as usize;
    let mut sample = entry.sample;
    while pos < limit {
        match frame_at(data, pos, &rules) {
            Some(frame) => {
                let spf = frame.samples_per_frame as u64;
                if sample + spf > target {
                    break;
                }
                sample += spf;
                pos += if frame.frame_size == 0 { free_size } else { frame.frame_size };
            }
            None => pos += 1,
        }
    }

    SeekLanding { offset: pos, sample, indexed: true }
}

/// Jump by byte ratio and resynchronize; the reported sample comes from
/// where the cursor physically landed
fn approximate_landing(data: &[u8], info: &StreamInfo, target: u64) -> SeekLanding {
    let start = info.start_offset;
    let payload = info.file_size.saturating_sub(start);
    let guess = start + (payload as u128 * target as u128 / info.total_samples.max(1) as u128) as u64;
    let end = data.len().saturating_sub(trailing_tag_len(data));

    let offset = find_next_frame(data, guess as usize, end, &ScanRules::following(&info.header))
        .map(|sync| sync.offset)
        .unwrap_or(end);

    let sample = if info.bitrate > 0 {
        ((offset as u64).saturating_sub(start) as u128 * 8 * info.sample_rate() as u128 / info.bitrate as u128) as u64
    } else {
        target
    };

    SeekLanding { offset, sample, indexed: false }
}

impl AudioDecoder for Mp3Decoder {
    fn read(&mut self, buffer: &mut [f32]) -> Result<usize, DecodeError> {
        Mp3Decoder::read(self, buffer)
    }

    fn seek(&mut self, sample: u64) -> Result<(), DecodeError> {
        Mp3Decoder::seek(self, sample)
    }

    fn close(&mut self) {
        Mp3Decoder::close(self)
    }

    fn send_metadata(&mut self) {
        Mp3Decoder::send_metadata(self)
    }

    fn file_info(&self) -> &FileInfo {
        Mp3Decoder::file_info(self)
    }

    fn samples_left(&self) -> u64 {
        Mp3Decoder::samples_left(self)
    }
}

impl Drop for Mp3Decoder {
    fn drop(&mut self) {
        self.close();
    }
}
