use std::path::Path;

use log::debug;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;

use crate::error::DecodeError;
use crate::models::TrackMetadata;

const ID3V2_HEADER_LEN: usize = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// Tag handling for MPEG audio files: where the bitstream starts and what
/// the tags say
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Offset of the first byte after any leading ID3v2 blocks.
    ///
    /// Blocks may be chained; each one is skipped in turn. A truncated or
    /// malformed block ends the search at its own start.
    pub fn audio_start(data: &[u8]) -> usize {
        let mut pos = 0;
        while let Some(len) = Self::id3v2_len(&data[pos..]) {
            if pos + len > data.len() {
                break;
            }
            debug!("Skipping {} byte ID3v2 block at {}", len, pos);
            pos += len;
        }
        pos
    }

    /// Total length of an ID3v2 block at the start of `data`, header and
    /// optional footer included
    fn id3v2_len(data: &[u8]) -> Option<usize> {
        let header = data.get(..ID3V2_HEADER_LEN)?;
        if &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
            return None;
        }
        // sizes are synchsafe: 7 bits per byte, top bit clear
        if header[6..10].iter().any(|b| b & 0x80 != 0) {
            return None;
        }
        let size = (header[6] as usize & 0x7F) << 21
            | (header[7] as usize & 0x7F) << 14
            | (header[8] as usize & 0x7F) << 7
            | (header[9] as usize & 0x7F);
        let footer = if header[5] & ID3V2_FOOTER_FLAG != 0 { ID3V2_HEADER_LEN } else { 0 };
        Some(ID3V2_HEADER_LEN + size + footer)
    }

    /// Read the tags of a file through symphonia's probe
    pub fn read_tags<P: AsRef<Path>>(path: P) -> Result<TrackMetadata, DecodeError> {
        let file = std::fs::File::open(&path)?;
        let media_source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.as_ref().extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("Tag probe failed: {}", e),
            })?;

        let mut metadata = TrackMetadata::new();

        // tags found ahead of the stream (ID3v2)
        if let Some(probed_meta) = probed.metadata.get() {
            if let Some(revision) = probed_meta.current() {
                Self::extract_from_revision(revision, &mut metadata);
            }
        }

        // tags the format reader found itself (ID3v1, APE)
        if let Some(revision) = probed.format.metadata().current() {
            Self::extract_from_revision(revision, &mut metadata);
        }

        Ok(metadata)
    }

    /// Copy the tags we display out of a metadata revision
    fn extract_from_revision(revision: &MetadataRevision, metadata: &mut TrackMetadata) {
        for tag in revision.tags() {
            let key = match tag.std_key {
                Some(key) => key,
                None => match Self::key_from_name(&tag.key) {
                    Some(key) => key,
                    None => continue,
                },
            };

            match key {
                StandardTagKey::TrackTitle => {
                    if let Value::String(title) = &tag.value {
                        metadata.title = Some(title.clone());
                    }
                }
                StandardTagKey::Artist => {
                    if let Value::String(artist) = &tag.value {
                        metadata.artist = Some(artist.clone());
                    }
                }
                StandardTagKey::AlbumArtist => {
                    if let Value::String(album_artist) = &tag.value {
                        if metadata.artist.is_none() {
                            metadata.artist = Some(album_artist.clone());
                        }
                    }
                }
                StandardTagKey::Album => {
                    if let Value::String(album) = &tag.value {
                        metadata.album = Some(album.clone());
                    }
                }
                StandardTagKey::TrackNumber => match &tag.value {
                    Value::UnsignedInt(track_num) => metadata.track_number = Some(*track_num as u32),
                    Value::String(track_str) => metadata.track_number = Self::parse_track_number(track_str),
                    _ => {}
                },
                StandardTagKey::Date => match &tag.value {
                    Value::UnsignedInt(year) => metadata.year = Some(*year as u32),
                    Value::String(date_str) => metadata.year = Self::parse_year(date_str),
                    _ => {}
                },
                StandardTagKey::Genre => {
                    if let Value::String(genre) = &tag.value {
                        metadata.genre = Some(genre.clone());
                    }
                }
                _ => {}
            }
        }
    }

    /// Map raw frame ids and common field names onto standard keys
    fn key_from_name(name: &str) -> Option<StandardTagKey> {
        match name.to_lowercase().as_str() {
            "title" | "tit2" => Some(StandardTagKey::TrackTitle),
            "artist" | "tpe1" => Some(StandardTagKey::Artist),
            "album" | "talb" => Some(StandardTagKey::Album),
            "date" | "tyer" | "tdrc" => Some(StandardTagKey::Date),
            "genre" | "tcon" => Some(StandardTagKey::Genre),
            "tracknumber" | "trck" => Some(StandardTagKey::TrackNumber),
            _ => None,
        }
    }

    /// "7" and "7/12" both mean track 7
    fn parse_track_number(value: &str) -> Option<u32> {
        value.split('/').next()?.trim().parse().ok()
    }

    /// Year from "2023" or "2023-01-01"
    fn parse_year(value: &str) -> Option<u32> {
        value.split('-').next()?.trim().parse().ok()
    }
}
