//! IRCAM / Berkeley BICSF header codec.
//!
//! Fixed-layout header zero-filled to 1024 bytes: magic word, f32 sample
//! rate, u32 channel count, u32 encoding code. The magic word is
//! `0x0001A364` or `0x0002A364` stored in either byte order, and the byte
//! order of the magic governs every following field including the sample
//! bytes. There is no in-header payload length.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AudioFileError, AudioFileResult, ErrorPosition};
use crate::formats::{ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, SampleFormat};

const MAGIC_V1: u32 = 0x0001_a364;
const MAGIC_V2: u32 = 0x0002_a364;
/// Sample data starts here; the gap after the fields is zero-filled
const DATA_OFFSET: u64 = 1024;

pub(crate) fn matches(probe: &[u8]) -> bool {
    if probe.len() < 4 {
        return false;
    }
    let word: [u8; 4] = [probe[0], probe[1], probe[2], probe[3]];
    let be = u32::from_be_bytes(word);
    let le = u32::from_le_bytes(word);
    matches!(be, MAGIC_V1 | MAGIC_V2) || matches!(le, MAGIC_V1 | MAGIC_V2)
}

fn encoding_to_format(encoding: u32) -> AudioFileResult<SampleFormat> {
    match encoding {
        0x0000_0001 => Ok(SampleFormat::Int16),
        0x0000_0002 => Ok(SampleFormat::Float32),
        0x0004_0003 => Ok(SampleFormat::Int32),
        0x0004_0004 => Ok(SampleFormat::Int8),
        0x0004_0006 => Ok(SampleFormat::Int24),
        other => Err(AudioFileError::unsupported_format(format!(
            "IRCAM encoding 0x{:x}",
            other
        ))),
    }
}

fn format_to_encoding(format: SampleFormat) -> AudioFileResult<u32> {
    match format {
        SampleFormat::Int16 => Ok(0x0000_0001),
        SampleFormat::Float32 => Ok(0x0000_0002),
        SampleFormat::Int32 => Ok(0x0004_0003),
        SampleFormat::Int8 => Ok(0x0004_0004),
        SampleFormat::Int24 => Ok(0x0004_0006),
        SampleFormat::UInt8 | SampleFormat::Float64 => Err(AudioFileError::unsupported_format(
            format!("IRCAM has no encoding for {}", format),
        )),
    }
}

pub(crate) fn read_header(source: &mut dyn ReadSeek) -> AudioFileResult<ReadHeader> {
    let raw = source.read_u32::<BigEndian>()?;
    let byte_order = if matches!(raw, MAGIC_V1 | MAGIC_V2) {
        ByteOrder::Big
    } else if matches!(raw.swap_bytes(), MAGIC_V1 | MAGIC_V2) {
        ByteOrder::Little
    } else {
        return Err(AudioFileError::malformed_header(
            "not an IRCAM stream",
            format!("0x{:08x}", raw),
            ErrorPosition::new(0).with_description("magic at start of file"),
        ));
    };

    let (sample_rate, num_channels, encoding) = match byte_order {
        ByteOrder::Big => (
            source.read_f32::<BigEndian>()?,
            source.read_u32::<BigEndian>()?,
            source.read_u32::<BigEndian>()?,
        ),
        ByteOrder::Little => (
            source.read_f32::<LittleEndian>()?,
            source.read_u32::<LittleEndian>()?,
            source.read_u32::<LittleEndian>()?,
        ),
    };

    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(AudioFileError::malformed_header(
            "IRCAM sample rate is not positive",
            sample_rate.to_string(),
            ErrorPosition::new(4).with_description("sample rate field"),
        ));
    }
    if num_channels == 0 {
        return Err(AudioFileError::malformed_header(
            "IRCAM channel count is zero",
            num_channels.to_string(),
            ErrorPosition::new(8).with_description("channel count field"),
        ));
    }
    let sample_format = encoding_to_format(encoding)?;

    let mut spec = AudioFileSpec::new(
        AudioFileType::Ircam,
        sample_format,
        num_channels,
        f64::from(sample_rate),
    );
    spec.byte_order = Some(byte_order);

    Ok(ReadHeader {
        spec,
        byte_order,
        data_offset: DATA_OFFSET,
        declared_payload: None,
    })
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    let byte_order = spec.byte_order.unwrap_or(ByteOrder::Big);
    let encoding = format_to_encoding(spec.sample_format)?;

    match byte_order {
        ByteOrder::Big => {
            sink.write_u32::<BigEndian>(MAGIC_V1)?;
            sink.write_f32::<BigEndian>(spec.sample_rate as f32)?;
            sink.write_u32::<BigEndian>(spec.num_channels)?;
            sink.write_u32::<BigEndian>(encoding)?;
        }
        ByteOrder::Little => {
            sink.write_u32::<LittleEndian>(MAGIC_V1)?;
            sink.write_f32::<LittleEndian>(spec.sample_rate as f32)?;
            sink.write_u32::<LittleEndian>(spec.num_channels)?;
            sink.write_u32::<LittleEndian>(encoding)?;
        }
    }
    // zero-fill the remainder of the 1024-byte header
    sink.write_all(&[0u8; DATA_OFFSET as usize - 16])?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Ircam;
    out_spec.byte_order = Some(byte_order);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order,
        data_offset: DATA_OFFSET,
        patches: Vec::new(),
        pad_align: 1,
    })
}
