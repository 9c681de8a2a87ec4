use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::synth::{MockPrimitive, StreamBuilder, FRAME_SIZE, SPF};
use crate::audio::decoders::mp3::seek_index::BuildOutcome;
use crate::audio::source::{ByteView, ReadTransport, StreamTransport};
use crate::audio::{AudioDecoder, DecoderState, Mp3Decoder};
use crate::config::EngineConfig;
use crate::error::DecodeError;
use crate::logging::{EngineEventType, EngineLogger};
use crate::models::{BitrateMode, OpenStatus};

fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn open_view(view: ByteView, logger: EngineLogger) -> Mp3Decoder {
    Mp3Decoder::open_source(view, "synthetic.mp3", &EngineConfig::default(), logger, Box::new(MockPrimitive::new()))
        .unwrap()
}

fn open_bytes(data: Vec<u8>) -> Mp3Decoder {
    open_view(ByteView::from_vec(data), EngineLogger::new())
}

/// Read until end of stream, in uneven chunks
fn read_all(decoder: &mut Mp3Decoder) -> Vec<f32> {
    let mut out = Vec::new();
    let mut chunk = vec![0.0f32; 3000];
    loop {
        let n = decoder.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    out
}

#[test]
fn test_cbr_stream_of_300_frames() {
    let file = write_temp(&StreamBuilder::cbr().frames(300).build());
    let view = ByteView::map_file(file.path()).unwrap();
    assert!(view.is_mapped());

    let decoder = open_view(view, EngineLogger::new());
    let info = decoder.file_info();
    assert_eq!(info.bitrate_mode, BitrateMode::Constant);
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.channels, 2);
    assert_eq!(info.bitrate, 128_000);

    let expected = 300 * SPF as u64;
    assert!(info.total_samples.abs_diff(expected) <= SPF as u64, "total {}", info.total_samples);
    assert!(decoder.stream_info().unwrap().vbr_header.is_none());
}

#[test]
fn test_xing_stream_reports_vbr() {
    let decoder = open_bytes(StreamBuilder::cbr().frames(150).xing(576, 1000).build());
    let stream = decoder.stream_info().unwrap();

    assert_eq!(stream.bitrate_mode, BitrateMode::Variable);
    assert_eq!(stream.frame_count, 150);
    assert_eq!(stream.byte_count, 150 * FRAME_SIZE as u64);
    assert_eq!(stream.vbr_header_offset, Some(0));
    assert_eq!(stream.start_offset, FRAME_SIZE as u64);
    assert_eq!(stream.total_samples, 150 * SPF as u64);

    let info = decoder.file_info();
    assert_eq!(info.encoder_delay, Some(576));
    assert_eq!(info.encoder_padding, Some(1000));
    assert_eq!(decoder.metadata().encoder_delay, Some(576));
}

#[test]
fn test_gapless_trim_is_exact() {
    let (delay, padding) = (576usize, 1000usize);
    let frames = 150usize;
    let mut decoder = open_bytes(StreamBuilder::cbr().frames(frames).xing(delay as u32, padding as u32).build());

    // the tail marks come from the index, so let it finish first
    assert!(matches!(decoder.wait_for_index(), Some(BuildOutcome::Completed { .. })));
    let samples = read_all(&mut decoder);

    let expected_frames = frames * SPF - delay - 528 - padding;
    assert_eq!(samples.len(), expected_frames * 2);
    assert_eq!(decoder.state(), DecoderState::Idle);

    // the first kept sample belongs to the first audio frame, the last to the last
    assert_eq!(samples[0], 0.0);
    assert_eq!(samples[samples.len() - 1], (frames - 1) as f32);
}

#[test]
fn test_gapless_disabled_keeps_everything() {
    let config = EngineConfig {
        gapless: false,
        ..EngineConfig::default()
    };
    let mut decoder = Mp3Decoder::open_source(
        ByteView::from_vec(StreamBuilder::cbr().frames(120).xing(576, 1000).build()),
        "synthetic.mp3",
        &config,
        EngineLogger::new(),
        Box::new(MockPrimitive::new()),
    )
    .unwrap();

    decoder.wait_for_index();
    // index frame plus every audio frame
    assert_eq!(read_all(&mut decoder).len(), 121 * SPF * 2);
}

/// A Xing frame whose header claims a padding byte it does not carry
fn padded_xing_stream(frames: usize) -> Vec<u8> {
    let mut data = StreamBuilder::cbr().frames(frames).xing(576, 1000).build();
    data[2] |= 0x02;
    data
}

#[test]
fn test_padded_index_frame_keeps_first_audio_frame() {
    let frames = 150usize;
    let mut decoder = open_bytes(padded_xing_stream(frames));
    assert_eq!(decoder.stream_info().unwrap().start_offset, FRAME_SIZE as u64);
    assert!(matches!(
        decoder.wait_for_index(),
        Some(BuildOutcome::Completed { frames: 150, .. })
    ));

    let samples = read_all(&mut decoder);
    assert_eq!(samples.len(), (frames * SPF - 576 - 528 - 1000) * 2);
    assert_eq!(samples[samples.len() - 1], (frames - 1) as f32);

    let config = EngineConfig {
        gapless: false,
        ..EngineConfig::default()
    };
    let mut decoder = Mp3Decoder::open_source(
        ByteView::from_vec(padded_xing_stream(frames)),
        "synthetic.mp3",
        &config,
        EngineLogger::new(),
        Box::new(MockPrimitive::new()),
    )
    .unwrap();
    let samples = read_all(&mut decoder);
    assert_eq!(samples.len(), (frames + 1) * SPF * 2);
    // index frame, then audio frames 0 and 1
    assert_eq!(samples[2 * SPF * 2], 1.0);
    assert_eq!(samples[samples.len() - 1], (frames - 1) as f32);
}

#[test]
fn test_short_stream_gapless_trim_is_exact() {
    let frames = 60usize;
    let mut decoder = open_bytes(StreamBuilder::cbr().frames(frames).xing(576, 1000).build());

    // no index for a stream this short, but the tail marks are still found
    assert_eq!(decoder.wait_for_index(), Some(BuildOutcome::TooShort));
    let samples = read_all(&mut decoder);

    assert_eq!(samples.len(), (frames * SPF - 576 - 528 - 1000) * 2);
    assert_eq!(samples[samples.len() - 1], (frames - 1) as f32);
}

#[test]
fn test_seek_to_zero_restarts_exactly() {
    let data = StreamBuilder::cbr().frames(150).xing(576, 1000).build();

    let mut reference = open_bytes(data.clone());
    reference.wait_for_index();
    let expected = read_all(&mut reference);

    let mut decoder = open_bytes(data);
    decoder.wait_for_index();
    let mut scratch = vec![0.0f32; 50_000];
    decoder.read(&mut scratch).unwrap();

    decoder.seek(0).unwrap();
    assert_eq!(decoder.position(), 0);
    assert_eq!(decoder.samples_left(), decoder.file_info().total_samples);
    assert_eq!(read_all(&mut decoder), expected);
}

#[test]
fn test_seek_to_zero_without_index() {
    let mut decoder = open_bytes(StreamBuilder::cbr().frames(40).build());
    let mut scratch = vec![0.0f32; 20_000];
    decoder.read(&mut scratch).unwrap();

    decoder.seek(0).unwrap();
    let mut first = vec![0.0f32; 2 * SPF];
    assert_eq!(decoder.read(&mut first).unwrap(), 2 * SPF);
    assert!(first.iter().all(|s| *s == 0.0));
    assert_eq!(decoder.read(&mut first).unwrap(), 2 * SPF);
    assert!(first.iter().all(|s| *s == 1.0));
}

#[test]
fn test_indexed_seek_lands_on_frame() {
    let logger = EngineLogger::new();
    let mut decoder = open_view(ByteView::from_vec(StreamBuilder::cbr().frames(300).build()), logger.clone());
    assert!(matches!(
        decoder.wait_for_index(),
        Some(BuildOutcome::Completed { frames: 300, .. })
    ));

    let target = 150 * SPF as u64 + 500;
    decoder.seek(target).unwrap();

    assert_eq!(decoder.position(), 150 * SPF as u64);
    assert!(target - decoder.position() < SPF as u64);
    assert_eq!(
        decoder.samples_left(),
        decoder.file_info().total_samples - 150 * SPF as u64
    );

    let mut out = vec![0.0f32; 4];
    decoder.read(&mut out).unwrap();
    assert_eq!(out[0], 150.0);

    let seek_event = logger
        .get_recent_events(10)
        .into_iter()
        .find(|e| e.event_type == EngineEventType::SeekOperation)
        .unwrap();
    assert!(seek_event.details.contains("indexed"));
}

#[test]
fn test_approximate_seek_without_index() {
    let logger = EngineLogger::new();
    let mut decoder = open_view(ByteView::from_vec(StreamBuilder::cbr().frames(300).build()), logger.clone());

    // no read yet, so the index builder has not run
    let target = 150 * SPF as u64;
    decoder.seek(target).unwrap();

    let landed = decoder.position();
    assert!(landed.abs_diff(target) < SPF as u64, "landed at {}", landed);
    assert_eq!(decoder.samples_left(), decoder.file_info().total_samples - landed);

    let mut out = vec![0.0f32; 4];
    decoder.read(&mut out).unwrap();
    assert_eq!(out[0], 151.0);

    let seek_event = logger
        .get_recent_events(10)
        .into_iter()
        .find(|e| e.event_type == EngineEventType::SeekOperation)
        .unwrap();
    assert!(seek_event.details.contains("approximate"));
}

#[test]
fn test_seek_past_end_reaches_end_of_stream() {
    let mut decoder = open_bytes(StreamBuilder::cbr().frames(120).build());
    decoder.wait_for_index();

    decoder.seek(u64::MAX).unwrap();
    let remaining = read_all(&mut decoder);
    assert!(remaining.len() <= 2 * SPF);
}

#[test]
fn test_close_releases_bytes_while_indexing() {
    let logger = EngineLogger::new();
    let view = ByteView::from_vec(StreamBuilder::cbr().frames(20_000).build());
    let mut decoder = open_view(view.clone(), logger.clone());

    let mut out = vec![0.0f32; 16];
    decoder.read(&mut out).unwrap();
    decoder.close();

    // builder and decode loop have both let go of the bytes
    assert_eq!(view.handle_count(), 1);
    assert_eq!(decoder.state(), DecoderState::Closed);
    assert!(logger.has_event(EngineEventType::StreamClosed));
}

#[test]
fn test_drop_closes_decoder() {
    let view = ByteView::from_vec(StreamBuilder::cbr().frames(5_000).build());
    {
        let mut decoder = open_view(view.clone(), EngineLogger::new());
        let mut out = vec![0.0f32; 16];
        decoder.read(&mut out).unwrap();
    }
    assert_eq!(view.handle_count(), 1);
}

#[test]
fn test_tags_around_stream_are_skipped() {
    let mut id3 = b"ID3\x03\x00\x00\x00\x00\x01\x00".to_vec();
    id3.extend(std::iter::repeat(0xFFu8).take(128));
    let data = StreamBuilder::cbr().leading(&id3).frames(30).damaged(4).id3v1().build();

    let file = write_temp(&data);
    let mut decoder = open_view(ByteView::map_file(file.path()).unwrap(), EngineLogger::new());
    assert_eq!(decoder.stream_info().unwrap().start_offset, 138);

    let samples = read_all(&mut decoder);
    assert_eq!(samples.len(), 30 * SPF * 2);
    assert!(samples[4 * SPF * 2..5 * SPF * 2].iter().all(|s| *s == 0.0));
}

#[test]
fn test_open_status_mapping() {
    assert_eq!(Mp3Decoder::open_status("/nonexistent/missing.mp3"), OpenStatus::FileError);

    let garbage = write_temp(&vec![0x11u8; 10_000]);
    assert_eq!(Mp3Decoder::open_status(garbage.path()), OpenStatus::BadFormat);

    let empty = write_temp(&[]);
    assert_eq!(Mp3Decoder::open_status(empty.path()), OpenStatus::BadFormat);

    let good = write_temp(&StreamBuilder::cbr().frames(10).build());
    assert_eq!(Mp3Decoder::open_status(good.path()), OpenStatus::Success);
}

#[test]
fn test_decoder_behind_trait_object() {
    let mut decoder: Box<dyn AudioDecoder> = Box::new(open_bytes(StreamBuilder::mono().frames(3).build()));
    assert_eq!(decoder.file_info().channels, 1);

    let mut out = vec![0.0f32; 4 * SPF];
    assert_eq!(decoder.read(&mut out).unwrap(), 3 * SPF);
    assert_eq!(out[2 * SPF], 2.0);
    decoder.close();
    assert!(matches!(decoder.read(&mut out), Err(DecodeError::Closed)));
}

#[test]
fn test_stream_mode_decodes_stereo() {
    let mut data = vec![0x00, 0x12, 0xFF, 0x00];
    data.extend(StreamBuilder::mono().frames(5).build());

    let transport = ReadTransport::new(Cursor::new(data));
    let mut decoder = Mp3Decoder::open_stream(
        Box::new(transport),
        "http://radio.example/stream",
        &EngineConfig::default(),
        EngineLogger::new(),
        Box::new(MockPrimitive::new()),
    )
    .unwrap();

    assert!(decoder.is_stream());
    assert_eq!(decoder.file_info().channels, 2);
    assert_eq!(decoder.file_info().sample_rate, 44100);
    assert!(matches!(decoder.seek(1000), Err(DecodeError::SeekError(_))));
    assert!(decoder.wait_for_index().is_none());

    let samples = read_all(&mut decoder);
    assert_eq!(samples.len(), 5 * SPF * 2);
    assert_eq!(samples[4 * SPF * 2], 4.0);
    assert_eq!(samples[4 * SPF * 2 + 1], 4.0);
}

#[test]
fn test_stream_without_header_is_bad_format() {
    let transport = ReadTransport::new(Cursor::new(vec![0x20u8; 9000]));
    let result = Mp3Decoder::open_stream(
        Box::new(transport),
        "stream",
        &EngineConfig::default(),
        EngineLogger::new(),
        Box::new(MockPrimitive::new()),
    );
    assert_eq!(result.err().unwrap().open_status(), OpenStatus::BadFormat);
}

/// Transport whose connection state is visible to the test
struct WatchedTransport {
    inner: Cursor<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

impl Read for WatchedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "paused"));
        }
        // trickle so pausing leaves data on the wire
        let len = buf.len().min(1000);
        self.inner.read(&mut buf[..len])
    }
}

impl StreamTransport for WatchedTransport {
    fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    fn reconnect(&mut self) -> io::Result<()> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_pause_disconnects_and_resume_continues() {
    let connected = Arc::new(AtomicBool::new(true));
    let transport = WatchedTransport {
        inner: Cursor::new(StreamBuilder::cbr().frames(40).build()),
        connected: Arc::clone(&connected),
    };
    let mut decoder = Mp3Decoder::open_stream(
        Box::new(transport),
        "stream",
        &EngineConfig::default(),
        EngineLogger::new(),
        Box::new(MockPrimitive::new()),
    )
    .unwrap();

    let mut out = vec![0.0f32; 100];
    assert_eq!(decoder.read(&mut out).unwrap(), 100);

    decoder.pause().unwrap();
    assert!(!connected.load(Ordering::Relaxed));
    assert_eq!(decoder.state(), DecoderState::Idle);

    decoder.resume().unwrap();
    assert!(connected.load(Ordering::Relaxed));

    let rest = read_all(&mut decoder);
    assert!(!rest.is_empty());
    // samples queued at pause time are gone
    assert!(rest.len() < 40 * SPF * 2 - 100);
}
