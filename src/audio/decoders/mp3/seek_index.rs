use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use super::header::FrameHeader;
use super::probe::StreamInfo;
use super::scanner::{frame_at, trailing_tag_len, ScanRules};
use crate::audio::gapless::TailMarks;
use crate::audio::source::ByteView;
use crate::logging::EngineLogger;

pub const SEEK_TABLE_SIZE: usize = 100;

const UNSET: i64 = -1;

/// One checkpoint: frame ordinal, samples before that frame, byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekIndexEntry {
    pub frame: u64,
    pub sample: u64,
    pub offset: u64,
}

#[derive(Debug)]
struct Slot {
    frame: AtomicI64,
    sample: AtomicU64,
    offset: AtomicU64,
}

/// Fixed-size checkpoint table shared between the decoder and the builder.
///
/// Each slot is published by storing its frame ordinal last with release
/// ordering; a reader that sees the ordinal also sees sample and offset.
#[derive(Debug)]
pub struct SeekTable {
    slots: Vec<Slot>,
    last_frames: [AtomicI64; 2],
    finished: AtomicBool,
}

impl Default for SeekTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekTable {
    pub fn new() -> Self {
        Self {
            slots: (0..SEEK_TABLE_SIZE)
                .map(|_| Slot {
                    frame: AtomicI64::new(UNSET),
                    sample: AtomicU64::new(0),
                    offset: AtomicU64::new(0),
                })
                .collect(),
            last_frames: [AtomicI64::new(UNSET), AtomicI64::new(UNSET)],
            finished: AtomicBool::new(false),
        }
    }

    /// Entry at `index`, or `None` while it is still unset
    pub fn entry(&self, index: usize) -> Option<SeekIndexEntry> {
        let slot = self.slots.get(index)?;
        let frame = slot.frame.load(Ordering::Acquire);
        if frame < 0 {
            return None;
        }
        Some(SeekIndexEntry {
            frame: frame as u64,
            sample: slot.sample.load(Ordering::Relaxed),
            offset: slot.offset.load(Ordering::Relaxed),
        })
    }

    fn store(&self, index: usize, entry: SeekIndexEntry) {
        let slot = &self.slots[index];
        slot.sample.store(entry.sample, Ordering::Relaxed);
        slot.offset.store(entry.offset, Ordering::Relaxed);
        slot.frame.store(entry.frame as i64, Ordering::Release);
    }

    /// The populated prefix of the table
    pub fn entries(&self) -> Vec<SeekIndexEntry> {
        (0..SEEK_TABLE_SIZE).map_while(|i| self.entry(i)).collect()
    }

    pub fn populated(&self) -> usize {
        (0..SEEK_TABLE_SIZE).take_while(|i| self.entry(*i).is_some()).count()
    }

    /// Last checkpoint at or before `target`.
    ///
    /// `None` when the table has not been filled that far; callers fall
    /// back to an approximate jump.
    pub fn lookup(&self, target: u64) -> Option<SeekIndexEntry> {
        let mut index = 0;
        while index < SEEK_TABLE_SIZE - 1 {
            self.entry(index)?;
            if let Some(next) = self.entry(index + 1) {
                if next.sample > target {
                    break;
                }
            }
            index += 1;
        }
        self.entry(index)
    }

    fn set_tail(&self, last: Option<u64>, second_last: Option<u64>) {
        let encode = |v: Option<u64>| v.map(|o| o as i64).unwrap_or(UNSET);
        self.last_frames[1].store(encode(second_last), Ordering::Release);
        self.last_frames[0].store(encode(last), Ordering::Release);
    }

    pub fn tail_marks(&self) -> TailMarks {
        let decode = |v: i64| if v < 0 { None } else { Some(v as u64) };
        TailMarks {
            last: decode(self.last_frames[0].load(Ordering::Acquire)),
            second_last: decode(self.last_frames[1].load(Ordering::Acquire)),
        }
    }

    /// Whether the builder scanned the whole stream
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// How a build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed { frames: u64, entries: usize },
    Cancelled { frames: u64 },
    /// Fewer than one checkpoint's worth of frames
    TooShort,
}

/// One-shot scan of a whole stream that fills a [`SeekTable`].
///
/// Sample positions count from the first audio frame; an index frame
/// ahead of it is not part of the table.
pub struct SeekIndexBuilder {
    view: ByteView,
    reference: FrameHeader,
    start: usize,
    frame_size: usize,
    step: u64,
    table: Arc<SeekTable>,
    cancel: Arc<AtomicBool>,
    logger: EngineLogger,
}

impl SeekIndexBuilder {
    pub fn new(
        view: ByteView,
        info: &StreamInfo,
        table: Arc<SeekTable>,
        cancel: Arc<AtomicBool>,
        logger: EngineLogger,
    ) -> Self {
        Self {
            view,
            reference: info.header,
            start: info.start_offset as usize,
            frame_size: info.frame_size.max(1),
            step: info.estimated_frames() / SEEK_TABLE_SIZE as u64,
            table,
            cancel,
            logger,
        }
    }

    /// Frames between two checkpoints
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Run the scan on a named background thread
    pub fn spawn(self) -> io::Result<JoinHandle<BuildOutcome>> {
        thread::Builder::new()
            .name("seek-index".to_string())
            .spawn(move || self.run())
    }

    /// Scan the stream on the calling thread.
    ///
    /// Streams too short for one checkpoint get no entries, but their
    /// last two frame positions are still recorded for tail trimming.
    pub fn run(self) -> BuildOutcome {
        let indexing = self.step >= 1;
        let started = Instant::now();
        if indexing {
            self.logger.log_index_started(self.step);
        } else {
            debug!("Stream too short for a seek index, locating the last frames only");
        }

        let data = self.view.as_slice();
        let limit = data
            .len()
            .saturating_sub(4)
            .saturating_sub(trailing_tag_len(data));
        let rules = ScanRules::following(&self.reference);

        let mut pos = self.start;
        let mut frames = 0u64;
        let mut sample = 0u64;
        let mut index = 0usize;
        let mut last = None;
        let mut second_last = None;

        while pos < limit {
            if self.cancel.load(Ordering::Acquire) {
                self.logger.log_index_cancelled(frames);
                return BuildOutcome::Cancelled { frames };
            }

            match frame_at(data, pos, &rules) {
                Some(frame) => {
                    second_last = last;
                    last = Some(pos as u64);

                    if indexing && frames % self.step == 0 && index < SEEK_TABLE_SIZE {
                        self.table.store(index, SeekIndexEntry { frame: frames, sample, offset: pos as u64 });
                        index += 1;
                    }

                    sample += frame.samples_per_frame as u64;
                    pos += if frame.frame_size == 0 { self.frame_size } else { frame.frame_size };
                    frames += 1;
                }
                None => pos += 1,
            }
        }

        if index > 0 {
            if let Some(tail) = self.table.entry(index - 1) {
                for i in index..SEEK_TABLE_SIZE {
                    self.table.store(i, tail);
                }
            }
        }

        self.table.set_tail(last, second_last);
        self.table.finished.store(true, Ordering::Release);

        if !indexing {
            return BuildOutcome::TooShort;
        }
        self.logger.log_index_finished(frames, index, started.elapsed());
        BuildOutcome::Completed { frames, entries: index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::audio::decoders::mp3::probe::probe_stream;
    use crate::audio::tests::synth::{StreamBuilder, FRAME_SIZE};
    use crate::logging::EngineEventType;

    fn cbr_stream(frames: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(frames * 417);
        for _ in 0..frames {
            data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            data.extend_from_slice(&[0u8; 413]);
        }
        data
    }

    fn builder_for(data: Vec<u8>) -> (SeekIndexBuilder, Arc<SeekTable>, Arc<AtomicBool>, StreamInfo) {
        let logger = EngineLogger::new();
        let info = probe_stream(&data, 0, &EngineConfig::default(), &logger).unwrap();
        let table = Arc::new(SeekTable::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let builder = SeekIndexBuilder::new(
            ByteView::from_vec(data),
            &info,
            Arc::clone(&table),
            Arc::clone(&cancel),
            logger,
        );
        (builder, table, cancel, info)
    }

    #[test]
    fn test_new_table_is_unset() {
        let table = SeekTable::new();
        assert_eq!(table.populated(), 0);
        assert!(table.entry(0).is_none());
        assert!(table.entry(SEEK_TABLE_SIZE).is_none());
        assert!(table.lookup(5000).is_none());
        assert_eq!(table.tail_marks(), TailMarks::default());
        assert!(!table.is_finished());
    }

    #[test]
    fn test_full_build() {
        let (builder, table, _cancel, info) = builder_for(cbr_stream(300));
        assert_eq!(builder.step(), 3);

        let outcome = builder.run();
        assert_eq!(outcome, BuildOutcome::Completed { frames: 300, entries: 100 });
        assert!(table.is_finished());

        let entries = table.entries();
        assert_eq!(entries.len(), SEEK_TABLE_SIZE);
        assert_eq!(entries[0], SeekIndexEntry { frame: 0, sample: 0, offset: 0 });
        assert_eq!(entries[1], SeekIndexEntry { frame: 3, sample: 3 * 1152, offset: 3 * 417 });
        assert_eq!(entries[99].sample, 297 * 1152);

        for pair in entries.windows(2) {
            assert!(pair[0].sample <= pair[1].sample);
            assert!(pair[0].offset <= pair[1].offset);
        }
        assert!(entries[99].sample <= info.total_samples);

        let tail = table.tail_marks();
        assert_eq!(tail.last, Some(299 * 417));
        assert_eq!(tail.second_last, Some(298 * 417));
    }

    #[test]
    fn test_partial_table_is_padded() {
        // half the file is junk, so the size-based estimate is twice the
        // real frame count and only 50 checkpoints get filled
        let mut data = cbr_stream(200);
        data.extend_from_slice(&vec![0u8; 417 * 200]);
        let (builder, table, _cancel, _info) = builder_for(data);
        assert_eq!(builder.step(), 4);

        match builder.run() {
            BuildOutcome::Completed { frames, entries } => {
                assert_eq!(frames, 200);
                assert_eq!(entries, 50);
            }
            other => panic!("Unexpected outcome {:?}", other),
        }

        assert_eq!(table.populated(), SEEK_TABLE_SIZE);
        let last_real = table.entry(49).unwrap();
        assert_eq!(table.entry(99), Some(last_real));
        assert_eq!(table.lookup(u64::MAX), Some(last_real));
    }

    #[test]
    fn test_too_short_stream() {
        let (builder, table, _cancel, _info) = builder_for(cbr_stream(50));
        assert_eq!(builder.step(), 0);
        assert_eq!(builder.run(), BuildOutcome::TooShort);
        assert_eq!(table.populated(), 0);
        assert!(table.is_finished());

        // no checkpoints, but the tail is still known
        let tail = table.tail_marks();
        assert_eq!(tail.last, Some(49 * 417));
        assert_eq!(tail.second_last, Some(48 * 417));
    }

    #[test]
    fn test_index_starts_after_padded_xing_frame() {
        // the index frame's header claims padding it does not have
        let mut data = StreamBuilder::cbr().frames(150).xing(576, 1000).build();
        data[2] |= 0x02;
        let (builder, table, _cancel, info) = builder_for(data);
        assert_eq!(info.start_offset, FRAME_SIZE as u64);
        assert_eq!(builder.step(), 1);

        assert_eq!(builder.run(), BuildOutcome::Completed { frames: 150, entries: 100 });
        let entries = table.entries();
        assert_eq!(entries[0], SeekIndexEntry { frame: 0, sample: 0, offset: FRAME_SIZE as u64 });
        assert_eq!(entries[1], SeekIndexEntry { frame: 1, sample: 1152, offset: 2 * FRAME_SIZE as u64 });
        assert_eq!(table.tail_marks().last, Some(150 * FRAME_SIZE as u64));
    }

    #[test]
    fn test_cancel_before_scan() {
        let logger = EngineLogger::new();
        let data = cbr_stream(300);
        let info = probe_stream(&data, 0, &EngineConfig::default(), &logger).unwrap();
        let table = Arc::new(SeekTable::new());
        let cancel = Arc::new(AtomicBool::new(true));
        let builder = SeekIndexBuilder::new(
            ByteView::from_vec(data),
            &info,
            Arc::clone(&table),
            cancel,
            logger.clone(),
        );

        assert_eq!(builder.run(), BuildOutcome::Cancelled { frames: 0 });
        assert!(!table.is_finished());
        assert_eq!(table.populated(), 0);
        assert!(logger.has_event(EngineEventType::IndexBuildCancelled));
    }

    #[test]
    fn test_spawned_builder_joins() {
        let (builder, table, _cancel, _info) = builder_for(cbr_stream(300));
        let handle = builder.spawn().unwrap();
        assert_eq!(handle.thread().name(), Some("seek-index"));

        let outcome = handle.join().unwrap();
        assert!(matches!(outcome, BuildOutcome::Completed { .. }));
        assert_eq!(table.populated(), SEEK_TABLE_SIZE);
    }

    #[test]
    fn test_resync_skips_garbage() {
        let mut data = cbr_stream(150);
        // corrupt frame 10 with a false sync and a byte of junk
        let at = 10 * 417;
        data.splice(at..at, [0xFF, 0xFB, 0x9C].iter().copied());

        let (builder, table, _cancel, _info) = builder_for(data);
        builder.run();

        let entries = table.entries();
        assert_eq!(entries[10].offset, 10 * 417 + 3);
        assert_eq!(entries[11].offset, 11 * 417 + 3);
        assert_eq!(table.tail_marks().last, Some(149 * 417 + 3));
    }

    #[test]
    fn test_lookup_picks_preceding_entry() {
        let (builder, table, _cancel, _info) = builder_for(cbr_stream(300));
        builder.run();

        assert_eq!(table.lookup(0).unwrap().frame, 0);
        assert_eq!(table.lookup(3 * 1152 - 1).unwrap().frame, 0);
        assert_eq!(table.lookup(3 * 1152).unwrap().frame, 3);
        assert_eq!(table.lookup(100 * 1152 + 5).unwrap().frame, 99);
    }

    #[test]
    fn test_lookup_stops_at_unset_slot() {
        let table = SeekTable::new();
        table.store(0, SeekIndexEntry { frame: 0, sample: 0, offset: 0 });
        table.store(1, SeekIndexEntry { frame: 3, sample: 3456, offset: 1251 });

        assert_eq!(table.lookup(100).unwrap().frame, 0);
        // past the filled prefix the table cannot answer
        assert!(table.lookup(10_000).is_none());
    }
}
