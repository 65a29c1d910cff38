//! NeXT/Sun AU (`.snd`) header codec.
//!
//! Fixed 24-byte big-endian header: magic, data offset, data size, encoding,
//! sample rate, channel count. A data size of `0xFFFFFFFF` means "derive the
//! payload from the physical file length".

use std::io::SeekFrom;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AudioFileError, AudioFileResult, ErrorPosition};
use crate::formats::{PatchField, PatchWidth, ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, SampleFormat};

const MAGIC: [u8; 4] = *b".snd";
const UNKNOWN_DATA_SIZE: u32 = 0xffff_ffff;
/// Minimum header (24 bytes) plus the mandatory 4-byte description field
const WRITTEN_DATA_OFFSET: u32 = 28;

pub(crate) fn matches(probe: &[u8]) -> bool {
    probe.len() >= 4 && probe[..4] == MAGIC
}

fn encoding_to_format(encoding: u32) -> AudioFileResult<SampleFormat> {
    match encoding {
        2 => Ok(SampleFormat::Int8),
        3 => Ok(SampleFormat::Int16),
        4 => Ok(SampleFormat::Int24),
        5 => Ok(SampleFormat::Int32),
        6 => Ok(SampleFormat::Float32),
        7 => Ok(SampleFormat::Float64),
        other => Err(AudioFileError::unsupported_format(format!(
            "AU encoding {} is not uncompressed PCM",
            other
        ))),
    }
}

fn format_to_encoding(format: SampleFormat) -> AudioFileResult<u32> {
    match format {
        SampleFormat::Int8 => Ok(2),
        SampleFormat::Int16 => Ok(3),
        SampleFormat::Int24 => Ok(4),
        SampleFormat::Int32 => Ok(5),
        SampleFormat::Float32 => Ok(6),
        SampleFormat::Float64 => Ok(7),
        SampleFormat::UInt8 => Err(AudioFileError::unsupported_format(
            "AU stores 8-bit audio signed, use Int8",
        )),
    }
}

pub(crate) fn read_header(source: &mut dyn ReadSeek) -> AudioFileResult<ReadHeader> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(AudioFileError::malformed_header(
            "not an AU stream",
            format!("{:02x?}", magic),
            ErrorPosition::new(0).with_description("magic at start of file"),
        ));
    }

    let data_offset = source.read_u32::<BigEndian>()?;
    let data_size = source.read_u32::<BigEndian>()?;
    let encoding = source.read_u32::<BigEndian>()?;
    let sample_rate = source.read_u32::<BigEndian>()?;
    let num_channels = source.read_u32::<BigEndian>()?;

    if data_offset < 24 {
        return Err(AudioFileError::malformed_header(
            "AU data offset points inside the header",
            data_offset.to_string(),
            ErrorPosition::new(4).with_description("data offset field"),
        ));
    }
    if num_channels == 0 {
        return Err(AudioFileError::malformed_header(
            "AU channel count is zero",
            num_channels.to_string(),
            ErrorPosition::new(20).with_description("channel count field"),
        ));
    }
    if sample_rate == 0 {
        return Err(AudioFileError::malformed_header(
            "AU sample rate is zero",
            sample_rate.to_string(),
            ErrorPosition::new(16).with_description("sample rate field"),
        ));
    }
    let sample_format = encoding_to_format(encoding)?;

    // anything between the fixed header and the payload is comment text
    source.seek(SeekFrom::Start(u64::from(data_offset)))?;

    let mut spec = AudioFileSpec::new(
        AudioFileType::Next,
        sample_format,
        num_channels,
        f64::from(sample_rate),
    );
    spec.byte_order = Some(ByteOrder::Big);

    Ok(ReadHeader {
        spec,
        byte_order: ByteOrder::Big,
        data_offset: u64::from(data_offset),
        declared_payload: (data_size != UNKNOWN_DATA_SIZE).then_some(u64::from(data_size)),
    })
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    if matches!(spec.byte_order, Some(ByteOrder::Little)) {
        return Err(AudioFileError::unsupported_format(
            "AU sample data is big-endian",
        ));
    }
    let encoding = format_to_encoding(spec.sample_format)?;

    sink.write_all(&MAGIC)?;
    sink.write_u32::<BigEndian>(WRITTEN_DATA_OFFSET)?;
    sink.write_u32::<BigEndian>(0)?; // patched on flush
    sink.write_u32::<BigEndian>(encoding)?;
    sink.write_u32::<BigEndian>((spec.sample_rate + 0.5).floor() as u32)?;
    sink.write_u32::<BigEndian>(spec.num_channels)?;
    sink.write_u32::<BigEndian>(0)?; // empty description field

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Next;
    out_spec.byte_order = Some(ByteOrder::Big);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order: ByteOrder::Big,
        data_offset: u64::from(WRITTEN_DATA_OFFSET),
        patches: vec![PatchField {
            offset: 8,
            width: PatchWidth::U32Be,
            value: |ctx| ctx.payload,
        }],
        pad_align: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::parse_header;
    use std::io::Cursor;

    fn au_header(data_offset: u32, data_size: u32, encoding: u32, rate: u32, channels: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        for field in [data_offset, data_size, encoding, rate, channels] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.resize(data_offset as usize, 0);
        bytes
    }

    #[test]
    fn test_parse_basic_header() {
        let mut bytes = au_header(28, 400, 3, 44_100, 2);
        bytes.extend_from_slice(&vec![0u8; 400]);

        let header = parse_header(&mut Cursor::new(bytes), AudioFileType::Next).unwrap();
        assert_eq!(header.spec.sample_format, SampleFormat::Int16);
        assert_eq!(header.spec.num_channels, 2);
        assert_eq!(header.spec.sample_rate, 44_100.0);
        assert_eq!(header.data_offset, 28);
        assert_eq!(header.spec.num_frames, 100);
        assert_eq!(header.byte_order, ByteOrder::Big);
    }

    #[test]
    fn test_sentinel_data_size_derives_from_length() {
        // dataSize = 0xFFFFFFFF, physical payload of 7 frames
        let frame_size = 4; // i16 stereo
        let mut bytes = au_header(28, UNKNOWN_DATA_SIZE, 3, 8_000, 2);
        bytes.extend_from_slice(&vec![0u8; 7 * frame_size]);

        let header = parse_header(&mut Cursor::new(bytes), AudioFileType::Next).unwrap();
        assert_eq!(header.spec.num_frames, 7);
    }

    #[test]
    fn test_declared_size_clamped_by_file_length() {
        // header promises 1000 bytes but only 6 frames are present
        let mut bytes = au_header(28, 1000, 3, 8_000, 1);
        bytes.extend_from_slice(&vec![0u8; 12]);

        let header = parse_header(&mut Cursor::new(bytes), AudioFileType::Next).unwrap();
        assert_eq!(header.spec.num_frames, 6);
    }

    #[test]
    fn test_compressed_encoding_rejected() {
        let bytes = au_header(28, 100, 1, 8_000, 1); // 1 = mu-law
        let err = parse_header(&mut Cursor::new(bytes), AudioFileType::Next).unwrap_err();
        assert!(matches!(err, AudioFileError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_bad_data_offset_rejected() {
        let bytes = au_header(28, 100, 3, 8_000, 1);
        let mut truncated = bytes.clone();
        truncated[4..8].copy_from_slice(&16u32.to_be_bytes());
        let err = parse_header(&mut Cursor::new(truncated), AudioFileType::Next).unwrap_err();
        assert!(matches!(err, AudioFileError::MalformedHeader { .. }));
    }

    #[test]
    fn test_written_header_bytes() {
        let spec = AudioFileSpec::new(AudioFileType::Next, SampleFormat::Int16, 2, 44_100.0);
        let mut cursor = Cursor::new(Vec::new());
        let header = write_header(&mut cursor, &spec).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[0..4], &[0x2e, 0x73, 0x6e, 0x64]);
        assert_eq!(&bytes[4..8], &28u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &0u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_be_bytes());
        assert_eq!(&bytes[16..20], &44_100u32.to_be_bytes());
        assert_eq!(&bytes[20..24], &2u32.to_be_bytes());
        assert_eq!(&bytes[24..28], &[0, 0, 0, 0]);

        assert_eq!(header.data_offset, 28);
        assert_eq!(header.patches.len(), 1);
        assert_eq!(header.patches[0].offset, 8);
    }

    #[test]
    fn test_write_rejects_little_endian_and_u8() {
        let le = AudioFileSpec::new(AudioFileType::Next, SampleFormat::Int16, 1, 8_000.0)
            .with_byte_order(ByteOrder::Little);
        assert!(write_header(&mut Cursor::new(Vec::new()), &le).is_err());

        let u8_spec = AudioFileSpec::new(AudioFileType::Next, SampleFormat::UInt8, 1, 8_000.0);
        assert!(write_header(&mut Cursor::new(Vec::new()), &u8_spec).is_err());
    }
}
