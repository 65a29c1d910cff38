//! Sony Wave64 header codec.
//!
//! Structurally a RIFF/WAVE clone with 16-byte GUID tags instead of FourCCs,
//! 64-bit length fields that include the 24-byte chunk header, and 8-byte
//! chunk alignment. Shares the `fmt ` payload codec with the WAV module.

use std::io::SeekFrom;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AudioFileError, AudioFileResult, ErrorPosition};
use crate::formats::{wave, PatchField, PatchWidth, ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, SampleFormat};

/// GUID 66666972-912E-11CF-A5D6-28DB04C10000 ("riff")
pub(crate) const RIFF_GUID: [u8; 16] = [
    0x72, 0x69, 0x66, 0x66, 0x2e, 0x91, 0xcf, 0x11, 0xa5, 0xd6, 0x28, 0xdb, 0x04, 0xc1, 0x00, 0x00,
];
/// GUID 65766177-ACF3-11D3-8CD1-00C04F8EDB8A ("wave")
const WAVE_GUID: [u8; 16] = [
    0x77, 0x61, 0x76, 0x65, 0xf3, 0xac, 0xd3, 0x11, 0x8c, 0xd1, 0x00, 0xc0, 0x4f, 0x8e, 0xdb, 0x8a,
];
/// GUID 20746D66-ACF3-11D3-8CD1-00C04F8EDB8A ("fmt ")
const FMT_GUID: [u8; 16] = [
    0x66, 0x6d, 0x74, 0x20, 0xf3, 0xac, 0xd3, 0x11, 0x8c, 0xd1, 0x00, 0xc0, 0x4f, 0x8e, 0xdb, 0x8a,
];
/// GUID 61746164-ACF3-11D3-8CD1-00C04F8EDB8A ("data")
const DATA_GUID: [u8; 16] = [
    0x64, 0x61, 0x74, 0x61, 0xf3, 0xac, 0xd3, 0x11, 0x8c, 0xd1, 0x00, 0xc0, 0x4f, 0x8e, 0xdb, 0x8a,
];

/// Chunk header: 16-byte GUID + 64-bit size including this header
const CHUNK_HEADER: u64 = 24;

const fn align8(len: u64) -> u64 {
    len.saturating_add(7) & !7
}

pub(crate) fn matches(probe: &[u8]) -> bool {
    probe.len() >= 16 && probe[..16] == RIFF_GUID
}

pub(crate) fn read_header(source: &mut dyn ReadSeek) -> AudioFileResult<ReadHeader> {
    let mut guid = [0u8; 16];
    source.read_exact(&mut guid)?;
    if guid != RIFF_GUID {
        return Err(AudioFileError::malformed_header(
            "not a Wave64 stream",
            format!("{:02x?}", guid),
            ErrorPosition::new(0).with_description("riff GUID"),
        ));
    }
    let _riff_size = source.read_u64::<LittleEndian>()?;
    source.read_exact(&mut guid)?;
    if guid != WAVE_GUID {
        return Err(AudioFileError::malformed_header(
            "Wave64 stream is not WAVE",
            format!("{:02x?}", guid),
            ErrorPosition::new(24).with_description("wave GUID"),
        ));
    }

    let mut fmt: Option<(SampleFormat, u32, u32)> = None;
    loop {
        let chunk_offset = source.stream_position()?;
        source.read_exact(&mut guid)?;
        let size = source.read_u64::<LittleEndian>()?;
        // the all-ones sentinel is only meaningful on the data chunk
        if size < CHUNK_HEADER || (size == u64::MAX && guid != DATA_GUID) {
            return Err(AudioFileError::malformed_header(
                "Wave64 chunk size smaller than its header",
                size.to_string(),
                ErrorPosition::new(chunk_offset + 16).with_description("chunk size"),
            ));
        }

        if guid == FMT_GUID {
            let payload_len = (size - CHUNK_HEADER).min(64) as usize;
            let mut payload = vec![0u8; payload_len];
            source.read_exact(&mut payload)?;
            fmt = Some(wave::parse_fmt(&payload, chunk_offset + CHUNK_HEADER)?);
            let skip = align8(size) - CHUNK_HEADER - payload_len as u64;
            source.seek(SeekFrom::Current(skip as i64))?;
        } else if guid == DATA_GUID {
            let (sample_format, channels, rate) = fmt.ok_or_else(|| {
                AudioFileError::malformed_header(
                    "data chunk precedes fmt chunk",
                    "fmt chunk not found",
                    ErrorPosition::new(chunk_offset).with_description("data chunk"),
                )
            })?;
            let data_offset = source.stream_position()?;
            let mut spec =
                AudioFileSpec::new(AudioFileType::Wave64, sample_format, channels, f64::from(rate));
            spec.byte_order = Some(ByteOrder::Little);
            return Ok(ReadHeader {
                spec,
                byte_order: ByteOrder::Little,
                data_offset,
                declared_payload: (size != u64::MAX).then(|| size - CHUNK_HEADER),
            });
        } else {
            source.seek(SeekFrom::Current((align8(size) - CHUNK_HEADER) as i64))?;
        }
    }
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    if matches!(spec.byte_order, Some(ByteOrder::Big)) {
        return Err(AudioFileError::unsupported_format(
            "Wave64 sample data is little-endian",
        ));
    }
    let fmt = wave::fmt_payload(spec)?;
    debug_assert!((CHUNK_HEADER + fmt.len() as u64) % 8 == 0);

    sink.write_all(&RIFF_GUID)?;
    sink.write_u64::<LittleEndian>(0)?; // patched on flush
    sink.write_all(&WAVE_GUID)?;

    sink.write_all(&FMT_GUID)?;
    sink.write_u64::<LittleEndian>(CHUNK_HEADER + fmt.len() as u64)?;
    sink.write_all(&fmt)?;

    sink.write_all(&DATA_GUID)?;
    let data_size_offset = sink.stream_position()?;
    sink.write_u64::<LittleEndian>(0)?; // patched on flush
    let data_offset = sink.stream_position()?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Wave64;
    out_spec.byte_order = Some(ByteOrder::Little);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order: ByteOrder::Little,
        data_offset,
        patches: vec![
            PatchField {
                offset: 16,
                width: PatchWidth::U64Le,
                // the riff size spans the whole file including its own header
                value: |ctx| ctx.data_offset + align8(ctx.payload),
            },
            PatchField {
                offset: data_size_offset,
                width: PatchWidth::U64Le,
                value: |ctx| ctx.payload + CHUNK_HEADER,
            },
        ],
        pad_align: 8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::parse_header;
    use std::io::{Cursor, Seek};

    #[test]
    fn test_written_header_parses_back() {
        let spec = AudioFileSpec::new(AudioFileType::Wave64, SampleFormat::Int24, 2, 96_000.0);
        let mut cursor = Cursor::new(Vec::new());
        let written = write_header(&mut cursor, &spec).unwrap();

        // append two frames and patch the lengths the way a facade would
        let payload = [0u8; 12];
        cursor.get_mut().extend_from_slice(&payload);
        cursor.get_mut().extend_from_slice(&[0u8; 4]); // 8-byte alignment pad
        let ctx = crate::formats::PatchContext {
            num_frames: 2,
            payload: payload.len() as u64,
            data_offset: written.data_offset,
        };
        for patch in &written.patches {
            let (bytes, len) = patch.encoded(&ctx).unwrap();
            let at = patch.offset as usize;
            cursor.get_mut()[at..at + len].copy_from_slice(&bytes[..len]);
        }

        cursor.rewind().unwrap();
        assert!(matches(cursor.get_ref()));
        let header = parse_header(&mut cursor, AudioFileType::Wave64).unwrap();
        assert_eq!(header.spec.sample_format, SampleFormat::Int24);
        assert_eq!(header.spec.num_channels, 2);
        assert_eq!(header.spec.num_frames, 2);
        assert_eq!(header.data_offset, written.data_offset);
    }

    #[test]
    fn test_chunk_layout_is_eight_byte_aligned() {
        // Int16 stereo keeps the compact 16-byte fmt payload
        let spec = AudioFileSpec::new(AudioFileType::Wave64, SampleFormat::Int16, 2, 44_100.0);
        let mut cursor = Cursor::new(Vec::new());
        let written = write_header(&mut cursor, &spec).unwrap();
        assert_eq!(written.data_offset % 8, 0);
        assert_eq!(written.pad_align, 8);

        let bytes = cursor.into_inner();
        assert_eq!(&bytes[..16], &RIFF_GUID);
        assert_eq!(&bytes[24..40], &WAVE_GUID);
        assert_eq!(&bytes[40..56], &FMT_GUID);
        // fmt chunk size includes its 24-byte header
        assert_eq!(
            u64::from_le_bytes(bytes[56..64].try_into().unwrap()),
            24 + 16
        );
    }

    #[test]
    fn test_riff_size_spans_whole_file() {
        let spec = AudioFileSpec::new(AudioFileType::Wave64, SampleFormat::Int16, 1, 8_000.0);
        let mut cursor = Cursor::new(Vec::new());
        let written = write_header(&mut cursor, &spec).unwrap();

        let ctx = crate::formats::PatchContext {
            num_frames: 3,
            payload: 6,
            data_offset: written.data_offset,
        };
        let (bytes, _) = written.patches[0].encoded(&ctx).unwrap();
        // 6 payload bytes round up to 8 under the alignment rule
        assert_eq!(u64::from_le_bytes(bytes), written.data_offset + 8);
    }
}
