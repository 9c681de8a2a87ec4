use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Single-producer/single-consumer ring of interleaved f32 samples.
///
/// Samples are stored as raw bits in atomics so both sides can share the
/// buffer through `&self`. Read and write cursors are independent; one
/// slot stays free to tell a full buffer from an empty one.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<AtomicU32>,
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    channels: u16,
}

impl RingBuffer {
    /// Create a new ring buffer holding `capacity_frames` sample frames
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1);
        let capacity = capacity_frames * channels as usize + 1;
        Self {
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            channels,
        }
    }

    /// Get the capacity in frames
    pub fn capacity_frames(&self) -> usize {
        (self.capacity - 1) / self.channels as usize
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the number of samples available for reading
    pub fn available_read(&self) -> usize {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        if write_pos >= read_pos {
            write_pos - read_pos
        } else {
            self.capacity - read_pos + write_pos
        }
    }

    /// Get the number of samples available for writing
    pub fn available_write(&self) -> usize {
        self.capacity - self.available_read() - 1
    }

    /// Get the number of frames available for reading
    pub fn available_read_frames(&self) -> usize {
        self.available_read() / self.channels as usize
    }

    /// Get the number of frames available for writing
    pub fn available_write_frames(&self) -> usize {
        self.available_write() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    pub fn is_full(&self) -> bool {
        self.available_write_frames() == 0
    }

    /// Fraction of the capacity currently holding samples
    pub fn fill_level(&self) -> f32 {
        self.available_read() as f32 / (self.capacity - 1) as f32
    }

    /// Write whole frames of interleaved samples.
    /// Returns the number of samples actually written.
    pub fn write(&self, data: &[f32]) -> usize {
        let channels = self.channels as usize;
        let to_write = data.len().min(self.available_write()) / channels * channels;
        if to_write == 0 {
            return 0;
        }

        let write_pos = self.write_pos.load(Ordering::Relaxed);
        for (i, sample) in data[..to_write].iter().enumerate() {
            self.buffer[(write_pos + i) % self.capacity].store(sample.to_bits(), Ordering::Relaxed);
        }

        // publish the samples to the consumer
        self.write_pos.store((write_pos + to_write) % self.capacity, Ordering::Release);
        to_write
    }

    /// Read whole frames into `output`.
    /// Returns the number of samples actually read.
    pub fn read(&self, output: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let to_read = output.len().min(self.available_read()) / channels * channels;
        if to_read == 0 {
            return 0;
        }

        let read_pos = self.read_pos.load(Ordering::Relaxed);
        for (i, slot) in output[..to_read].iter_mut().enumerate() {
            *slot = f32::from_bits(self.buffer[(read_pos + i) % self.capacity].load(Ordering::Relaxed));
        }

        self.read_pos.store((read_pos + to_read) % self.capacity, Ordering::Release);
        to_read
    }

    /// Discard everything buffered. Consumer side only.
    pub fn flush(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}
