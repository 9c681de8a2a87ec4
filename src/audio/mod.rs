pub mod buffer;
pub mod decoders;
pub mod gapless;
pub mod metadata;
pub mod source;

#[cfg(test)]
pub mod tests;

use crate::error::DecodeError;
use crate::models::FileInfo;

pub use buffer::RingBuffer;
pub use decoders::{DecoderState, Mp3Decoder};
pub use gapless::GaplessWindow;
pub use metadata::MetadataExtractor;
pub use source::{ByteView, ReadTransport, StreamTransport};

/// Contract the player core uses for every codec backend.
///
/// Samples cross this boundary as interleaved `f32` PCM at the channel
/// count reported by `file_info`.
pub trait AudioDecoder: Send {
    /// Fill `buffer` with whole frames of samples. Returns the number of
    /// samples written, fewer than requested only at end of stream.
    fn read(&mut self, buffer: &mut [f32]) -> Result<usize, DecodeError>;

    /// Reposition to a sample frame counted from the start of the stream
    fn seek(&mut self, sample: u64) -> Result<(), DecodeError>;

    /// Release the stream; further reads fail
    fn close(&mut self);

    /// Push tag information to the registered metadata callback
    fn send_metadata(&mut self);

    fn file_info(&self) -> &FileInfo;

    /// Sample frames remaining by the stream's total estimate
    fn samples_left(&self) -> u64;
}
