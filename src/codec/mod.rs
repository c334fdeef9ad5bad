//! Decoding of the binary track descriptors returned by Lavalink's REST API.
//!
//! A descriptor is a compact, versioned record of track metadata. Nodes hand
//! these out base64-encoded, and expect the same string back when asked to
//! play a track.

mod error;

pub use self::error::DecodeError;

use crate::{constants::MAX_DESCRIPTOR_VERSION, model::TrackInfo};
use base64::{engine::general_purpose::STANDARD, Engine};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use tracing::trace;

/// Flag bit marking a descriptor as carrying an explicit version byte.
const TRACK_INFO_VERSIONED: u64 = 1;

/// Mask applied to the leading flag byte.
///
/// This is wider than the byte it is applied to, so the versioned bit can
/// never be observed and the version always defaults to `1`. Descriptors in
/// the wild are laid out to match this reading, so it must stay as-is.
const FLAG_MASK: u64 = 0xC_0000_0000;

/// Decodes a base64 (standard alphabet) track descriptor.
///
/// Invalid base64 is reported as [`DecodeError::Base64`], distinct from
/// structural faults in the decoded bytes.
pub fn decode_base64(data: &str) -> Result<TrackInfo, DecodeError> {
    let bytes = STANDARD.decode(data)?;

    decode(&bytes[..])
}

/// Decodes a binary track descriptor from a byte stream.
///
/// Running out of input at any point fails with [`DecodeError::Truncated`].
pub fn decode<R: Read>(mut reader: R) -> Result<TrackInfo, DecodeError> {
    let flags = u64::from(reader.read_u8()?) & FLAG_MASK;

    skip(&mut reader, 2)?;

    let version = if flags & TRACK_INFO_VERSIONED == 0 {
        1
    } else {
        // Unreachable while FLAG_MASK hides the versioned bit.
        let version = reader.read_u8()?;
        if version == 0 || version > MAX_DESCRIPTOR_VERSION {
            return Err(DecodeError::Unsupported(version));
        }
        version
    };

    skip(&mut reader, 2)?;

    let title = read_string(&mut reader)?;
    let author = read_string(&mut reader)?;
    let length = reader.read_u64::<BigEndian>()?;
    let identifier = read_string(&mut reader)?;
    let stream = reader.read_u8()? == 1;

    let uri = if reader.read_u8()? == 1 {
        Some(read_string(&mut reader)?)
    } else {
        // Reserved field: single-byte length, then opaque bytes.
        let size = reader.read_u8()?;
        skip(&mut reader, size.into())?;
        None
    };

    trace!("Decoded v{} descriptor for {:?}.", version, identifier);

    Ok(TrackInfo {
        identifier,
        title,
        author,
        uri,
        seekable: !stream,
        stream,
        length,
        position: 0,
    })
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, DecodeError> {
    let len = reader.read_u16::<BigEndian>()?;
    let mut buf = vec![0u8; len.into()];
    reader.read_exact(&mut buf)?;

    Ok(match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn skip<R: Read>(reader: &mut R, len: u64) -> Result<(), DecodeError> {
    let skipped = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;

    if skipped == len {
        Ok(())
    } else {
        Err(DecodeError::Truncated)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use utils::DescriptorBuilder;

    const VERSIONED_SAMPLE: &str = "QAAAkAIALGxvZmkgaGlwIGhvcCByYWRpbyAtIGJlYXRzIHRvIHJlbGF4L3N0dWR5IHRvAApDaGlsbGVkQ293f/////////8AC2hIVzFvWTI2a3hRAQEAK2h0dHBzOi8vd3d3LnlvdXR1YmUuY29tL3dhdGNoP3Y9aEhXMW9ZMjZreFEAB3lvdXR1YmUAAAAAAAAAAA==";

    fn unversioned_sample() -> Vec<u8> {
        DescriptorBuilder::new()
            .title("Never Gonna Give You Up")
            .author("Rick Astley")
            .length(212_000)
            .identifier("dQw4w9WgXcQ")
            .reserved(b"youtube")
            .build()
    }

    #[test]
    fn decodes_versioned_sample() {
        let info = decode_base64(VERSIONED_SAMPLE).unwrap();

        assert_eq!(info.identifier, "hHW1oY26kxQ");
        assert_eq!(info.title, "lofi hip hop radio - beats to relax/study to");
        assert_eq!(info.author, "ChilledCow");
        assert!(info.stream);
        assert!(!info.seekable);
        assert_eq!(info.length, i64::MAX as u64);
        assert_eq!(
            info.uri.as_deref(),
            Some("https://www.youtube.com/watch?v=hHW1oY26kxQ")
        );
        assert_eq!(info.position, 0);
    }

    #[test]
    fn decodes_unversioned_sample() {
        let bytes = unversioned_sample();
        let info = decode(&bytes[..]).unwrap();

        assert_eq!(info.identifier, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Never Gonna Give You Up");
        assert_eq!(info.author, "Rick Astley");
        assert!(!info.stream);
        assert!(info.seekable);
        assert_eq!(info.length, 212_000);
        assert_eq!(info.uri, None);
    }

    #[test]
    fn flag_byte_never_selects_explicit_version() {
        // Even with the high bits set, the byte after the padding is
        // consumed as padding rather than a version.
        let bytes = DescriptorBuilder::new()
            .flags(0xC0)
            .title("a")
            .author("b")
            .identifier("c")
            .build();

        let info = decode(&bytes[..]).unwrap();
        assert_eq!(info.title, "a");
        assert_eq!(info.identifier, "c");
    }

    #[test]
    fn versioned_bit_is_masked_out() {
        // A version byte of 0 would be rejected if it were read as one.
        let bytes = DescriptorBuilder::new()
            .flags(0xFF)
            .title("a")
            .author("b")
            .identifier("c")
            .build();

        let info = decode(&bytes[..]).unwrap();
        assert_eq!(info.title, "a");
        assert_eq!(info.author, "b");
    }

    #[test]
    fn every_truncation_fails_as_truncated() {
        let full = STANDARD.decode(VERSIONED_SAMPLE).unwrap();

        // The sample carries trailing fields this decoder never reads.
        let consumed = {
            let mut cursor = std::io::Cursor::new(&full[..]);
            decode(&mut cursor).unwrap();
            cursor.position() as usize
        };

        for cut in 0..consumed {
            let out = decode(&full[..cut]);
            assert!(
                matches!(out, Err(DecodeError::Truncated)),
                "prefix of {} bytes gave {:?}",
                cut,
                out
            );
        }

        let other = unversioned_sample();
        for cut in 0..other.len() {
            assert!(matches!(
                decode(&other[..cut]),
                Err(DecodeError::Truncated)
            ));
        }
    }

    #[test]
    fn bad_base64_is_distinct_from_bad_structure() {
        assert!(matches!(
            decode_base64("not*base64!"),
            Err(DecodeError::Base64(_))
        ));
        assert!(matches!(decode_base64("QAAA"), Err(DecodeError::Truncated)));
    }

    #[test]
    fn invalid_utf8_is_not_fatal() {
        let bytes = DescriptorBuilder::new()
            .title_bytes(&[0x66, 0xff, 0x6f])
            .author("b")
            .identifier("c")
            .build();

        let info = decode(&bytes[..]).unwrap();
        assert_eq!(info.title, "f\u{fffd}o");
    }
}
