use std::io::{self, Read};
use std::sync::Arc;

use log::{debug, warn};

use super::header::FrameHeader;
use super::primitive::{DecodeStep, FramePrimitive};
use super::probe::StreamInfo;
use super::scanner::{find_next_frame, frame_at, trailing_tag_len, ScanRules};
use super::seek_index::SeekTable;
use crate::audio::buffer::RingBuffer;
use crate::audio::gapless::GaplessWindow;
use crate::audio::source::{ByteView, StreamTransport};
use crate::config::EngineConfig;
use crate::logging::EngineLogger;

const STREAM_CHUNK: usize = 4096;
const STREAM_COMPACT_AT: usize = 64 * 1024;

/// Buffered sequential input from a network transport
pub struct StreamInput {
    transport: Box<dyn StreamTransport>,
    buffer: Vec<u8>,
    cursor: usize,
    exhausted: bool,
}

impl StreamInput {
    pub fn new(transport: Box<dyn StreamTransport>) -> Self {
        Self {
            transport,
            buffer: Vec::with_capacity(STREAM_COMPACT_AT),
            cursor: 0,
            exhausted: false,
        }
    }

    /// Bytes buffered past the cursor
    pub fn available(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    /// Read until `want` bytes are buffered past the cursor or the
    /// transport runs dry. Returns the number of bytes available.
    pub fn fill(&mut self, want: usize) -> io::Result<usize> {
        let mut chunk = [0u8; STREAM_CHUNK];
        while self.available().len() < want && !self.exhausted {
            match self.transport.read(&mut chunk) {
                Ok(0) => self.exhausted = true,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.available().len())
    }

    pub fn advance(&mut self, bytes: usize) {
        self.cursor = (self.cursor + bytes).min(self.buffer.len());
        if self.cursor >= STREAM_COMPACT_AT {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn disconnect(&mut self) {
        self.transport.disconnect();
        self.buffer.clear();
        self.cursor = 0;
    }

    fn reconnect(&mut self) -> io::Result<()> {
        self.transport.reconnect()?;
        self.exhausted = false;
        Ok(())
    }
}

enum Input {
    Mapped { view: ByteView, cursor: usize, end: usize },
    Streamed(StreamInput),
}

/// A located frame, ready to decode
struct NextFrame {
    header: FrameHeader,
    offset: u64,
    bytes: Vec<u8>,
}

/// The synchronous decode loop: locate the next frame, hand it to the
/// primitive, trim it and queue the PCM for the caller
pub struct DecodeLoop {
    input: Input,
    reference: FrameHeader,
    /// Offsets of the VBR index frame and of the audio frame after it
    index_frame: Option<(usize, usize)>,
    /// Frame size for free-format streams, where headers carry none
    stream_frame_size: usize,
    primitive: Box<dyn FramePrimitive>,
    gapless: GaplessWindow,
    table: Option<Arc<SeekTable>>,
    ring: RingBuffer,
    channels: u16,
    end_of_stream: bool,
    position: u64,
    logger: EngineLogger,
    source_name: String,
}

impl DecodeLoop {
    /// Decode loop over a whole-file view, starting at the stream's
    /// decode start
    pub fn for_file(
        view: ByteView,
        info: &StreamInfo,
        primitive: Box<dyn FramePrimitive>,
        table: Arc<SeekTable>,
        config: &EngineConfig,
        logger: EngineLogger,
        source_name: String,
    ) -> Self {
        let end = view.len().saturating_sub(trailing_tag_len(&view));
        let gapless = if config.gapless {
            GaplessWindow::new(info.encoder_delay, info.encoder_padding, info.samples_per_frame())
        } else {
            GaplessWindow::disabled()
        };
        let channels = info.channels();

        Self {
            input: Input::Mapped {
                view,
                cursor: info.decode_start() as usize,
                end,
            },
            reference: info.header,
            index_frame: info
                .vbr_header_offset
                .map(|at| (at as usize, info.start_offset as usize)),
            stream_frame_size: info.frame_size,
            primitive,
            gapless,
            table: Some(table),
            ring: RingBuffer::new(config.ring_buffer_frames, channels),
            channels,
            end_of_stream: false,
            position: 0,
            logger,
            source_name,
        }
    }

    /// Decode loop over a sequential transport. Output is always stereo.
    pub fn for_stream(
        input: StreamInput,
        reference: FrameHeader,
        primitive: Box<dyn FramePrimitive>,
        config: &EngineConfig,
        logger: EngineLogger,
        source_name: String,
    ) -> Self {
        Self {
            input: Input::Streamed(input),
            reference,
            index_frame: None,
            stream_frame_size: reference.frame_size,
            primitive,
            gapless: GaplessWindow::disabled(),
            table: None,
            ring: RingBuffer::new(config.ring_buffer_frames, 2),
            channels: 2,
            end_of_stream: false,
            position: 0,
            logger,
            source_name,
        }
    }

    /// Interleaved channel count of the output
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample frames handed to the caller since the last reposition
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Byte cursor in file mode
    pub fn cursor(&self) -> Option<usize> {
        match &self.input {
            Input::Mapped { cursor, .. } => Some(*cursor),
            Input::Streamed(_) => None,
        }
    }

    pub fn buffered_frames(&self) -> usize {
        self.ring.available_read_frames()
    }

    pub fn gapless_mut(&mut self) -> &mut GaplessWindow {
        &mut self.gapless
    }

    /// Move the file cursor and drop everything decoded from the old
    /// position. `position` is the sample the new cursor corresponds to.
    pub fn reposition(&mut self, byte_offset: usize, position: u64) {
        if let Input::Mapped { cursor, .. } = &mut self.input {
            *cursor = byte_offset;
        }
        self.primitive.reset();
        self.ring.flush();
        self.end_of_stream = false;
        self.position = position;
    }

    /// Disconnect a streamed transport and discard queued samples
    pub fn pause(&mut self) {
        if let Input::Streamed(input) = &mut self.input {
            input.disconnect();
        }
        debug!(
            "Pausing {}, dropping a {:.0}% full ring",
            self.source_name,
            self.ring.fill_level() * 100.0
        );
        self.ring.flush();
        self.primitive.reset();
    }

    pub fn resume(&mut self) -> io::Result<()> {
        if let Input::Streamed(input) = &mut self.input {
            input.reconnect()?;
            self.end_of_stream = false;
        }
        Ok(())
    }

    /// Fill `dest` with whole interleaved frames, decoding as needed.
    /// Returns the number of samples written; fewer than requested only at
    /// end of stream.
    pub fn fill(&mut self, dest: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let wanted = dest.len() / channels * channels;
        let mut written = 0;

        loop {
            written += self.ring.read(&mut dest[written..wanted]);
            if written >= wanted || self.end_of_stream {
                break;
            }
            // ring is drained here, so a whole frame always fits
            self.decode_one();
        }

        self.position += (written / channels) as u64;
        written
    }

    fn decode_one(&mut self) {
        let next = match self.next_frame() {
            Ok(Some(next)) => next,
            Ok(None) => {
                self.end_of_stream = true;
                return;
            }
            Err(e) => {
                self.logger.log_stream_error(&format!("read failed on {}: {}", self.source_name, e));
                self.end_of_stream = true;
                return;
            }
        };

        let header = next.header;
        let frame_channels = header.channels() as usize;
        let samples = match self.primitive.decode(&next.bytes, &header) {
            DecodeStep::Pcm(samples) => samples,
            DecodeStep::RecoverableError => {
                warn!("Damaged frame at byte {} replaced with silence", next.offset);
                vec![0.0; header.samples_per_frame as usize * frame_channels]
            }
            DecodeStep::UnrecoverableError(reason) => {
                self.logger.log_decode_error(&self.source_name, &reason);
                self.end_of_stream = true;
                return;
            }
            DecodeStep::NeedMoreInput => {
                debug!("Truncated final frame at byte {}", next.offset);
                self.end_of_stream = true;
                return;
            }
        };

        let frames = samples.len() / frame_channels;
        let tail = self.table.as_ref().map(|t| t.tail_marks()).unwrap_or_default();
        let Some(keep) = self.gapless.trim(frames, next.offset, &tail) else {
            return;
        };
        let kept = &samples[keep.start * frame_channels..keep.end * frame_channels];

        if frame_channels == 1 && self.channels == 2 {
            let doubled: Vec<f32> = kept.iter().flat_map(|s| [*s, *s]).collect();
            self.ring.write(&doubled);
        } else {
            self.ring.write(kept);
        }
    }

    fn next_frame(&mut self) -> io::Result<Option<NextFrame>> {
        let reference = self.reference;
        let free_size = self.stream_frame_size;
        let index_frame = self.index_frame;

        match &mut self.input {
            Input::Mapped { view, cursor, end } => {
                let data = view.as_slice();
                let rules = ScanRules::following(&reference);
                let header = match frame_at(data, *cursor, &rules) {
                    Some(header) if *cursor + 4 <= *end => header,
                    _ => match find_next_frame(data, *cursor + 1, *end, &rules) {
                        Some(sync) => {
                            debug!("Resynchronized at byte {} after {}", sync.offset, *cursor);
                            *cursor = sync.offset;
                            match FrameHeader::parse(sync.raw) {
                                Some(header) => header,
                                None => return Ok(None),
                            }
                        }
                        None => return Ok(None),
                    },
                };

                let size = if header.frame_size == 0 { free_size.max(4) } else { header.frame_size };
                let offset = *cursor;
                let frame_end = (offset + size).min(data.len());
                let bytes = data[offset..frame_end].to_vec();
                // an index frame may claim padding it does not have; the
                // audio starts where the stream info measured it
                *cursor = match index_frame {
                    Some((at, audio)) if offset == at && audio > at => audio,
                    _ => offset + size,
                };

                Ok(Some(NextFrame { header, offset: offset as u64, bytes }))
            }
            Input::Streamed(input) => {
                let rules = ScanRules::open(false);
                loop {
                    if input.fill(4)? < 4 {
                        return Ok(None);
                    }
                    let available = input.available();
                    let len = available.len();
                    let Some(header) = frame_at(available, 0, &rules) else {
                        let skip = find_next_frame(available, 1, len, &rules)
                            .map(|sync| sync.offset)
                            .unwrap_or_else(|| len.saturating_sub(3).max(1));
                        input.advance(skip);
                        continue;
                    };

                    let size = header.frame_size;
                    let buffered = input.fill(size)?;
                    let take = size.min(buffered);
                    let bytes = input.available()[..take].to_vec();
                    input.advance(take);
                    return Ok(Some(NextFrame { header, offset: 0, bytes }));
                }
            }
        }
    }
}
