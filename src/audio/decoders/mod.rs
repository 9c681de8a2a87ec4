pub mod mp3;

pub use mp3::{DecoderState, MetadataCallback, Mp3Decoder};
