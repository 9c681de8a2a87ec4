use log::{debug, warn};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use super::header::{FrameHeader, Layer};

/// Result of handing one frame to the primitive
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStep {
    /// Interleaved samples for the whole frame
    Pcm(Vec<f32>),
    /// The frame was damaged; the stream can continue
    RecoverableError,
    /// The decoder cannot continue
    UnrecoverableError(String),
    /// The frame slice is shorter than the header says
    NeedMoreInput,
}

/// Turns one well-formed frame into PCM
pub trait FramePrimitive: Send {
    /// `frame` starts at the header and spans the whole frame
    fn decode(&mut self, frame: &[u8], header: &FrameHeader) -> DecodeStep;

    /// Forget inter-frame state (bit reservoir, overlap) after a seek
    fn reset(&mut self);
}

/// Frame decoding through symphonia's MPEG audio codecs
pub struct SymphoniaPrimitive {
    decoder: Option<Box<dyn Decoder>>,
    sample_buf: Option<SampleBuffer<f32>>,
    timestamp: u64,
}

impl Default for SymphoniaPrimitive {
    fn default() -> Self {
        Self::new()
    }
}

impl SymphoniaPrimitive {
    pub fn new() -> Self {
        Self {
            decoder: None,
            sample_buf: None,
            timestamp: 0,
        }
    }

    fn codec_for(layer: Layer) -> CodecType {
        match layer {
            Layer::I => CODEC_TYPE_MP1,
            Layer::II => CODEC_TYPE_MP2,
            Layer::III => CODEC_TYPE_MP3,
        }
    }

    fn make_decoder(header: &FrameHeader) -> Result<Box<dyn Decoder>, SymphoniaError> {
        let channels = if header.channels() == 1 {
            Channels::FRONT_LEFT
        } else {
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT
        };

        let mut params = CodecParameters::new();
        params
            .for_codec(Self::codec_for(header.layer))
            .with_sample_rate(header.sample_rate)
            .with_channels(channels);

        symphonia::default::get_codecs().make(&params, &DecoderOptions::default())
    }
}

impl FramePrimitive for SymphoniaPrimitive {
    fn decode(&mut self, frame: &[u8], header: &FrameHeader) -> DecodeStep {
        if header.frame_size > 0 && frame.len() < header.frame_size {
            return DecodeStep::NeedMoreInput;
        }

        if self.decoder.is_none() {
            match Self::make_decoder(header) {
                Ok(decoder) => {
                    debug!("Created {} decoder for {} Hz", header.layer.name(), header.sample_rate);
                    self.decoder = Some(decoder);
                }
                Err(e) => return DecodeStep::UnrecoverableError(format!("Failed to create decoder: {}", e)),
            }
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return DecodeStep::UnrecoverableError("decoder unavailable".to_string());
        };

        let duration = header.samples_per_frame as u64;
        let packet = Packet::new_from_slice(0, self.timestamp, duration, frame);
        self.timestamp += duration;

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frames = decoded.capacity() as u64;
                let fits = self
                    .sample_buf
                    .as_ref()
                    .map(|buf| buf.capacity() as u64 >= frames * spec.channels.count() as u64)
                    .unwrap_or(false);
                if !fits {
                    self.sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
                }
                match self.sample_buf.as_mut() {
                    Some(buf) => {
                        buf.copy_interleaved_ref(decoded);
                        DecodeStep::Pcm(buf.samples().to_vec())
                    }
                    None => DecodeStep::RecoverableError,
                }
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!("Damaged frame: {}", msg);
                DecodeStep::RecoverableError
            }
            Err(SymphoniaError::IoError(e)) => {
                debug!("Short frame: {}", e);
                DecodeStep::RecoverableError
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder requested a reset");
                decoder.reset();
                DecodeStep::RecoverableError
            }
            Err(e) => DecodeStep::UnrecoverableError(e.to_string()),
        }
    }

    fn reset(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
    }
}
