//! AIFF / AIFF-C header codec.
//!
//! Big-endian chunked container: an outer `FORM` holds `COMM` (channel
//! count, frame count, bit width, 80-bit sample rate and, for AIFC, a
//! compression code) and `SSND` (payload). Chunks are padded to even length.
//! Back-patched fields: the outer `FORM` length, COMM `numSampleFrames` and
//! the `SSND` length.

use std::io::SeekFrom;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::extended;
use crate::error::{AudioFileError, AudioFileResult, ErrorPosition};
use crate::formats::{skip_even_padded, PatchField, PatchWidth, ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, SampleFormat};

const FORM: [u8; 4] = *b"FORM";
const FORM_AIFF: [u8; 4] = *b"AIFF";
const FORM_AIFC: [u8; 4] = *b"AIFC";
const CHUNK_COMM: [u8; 4] = *b"COMM";
const CHUNK_SSND: [u8; 4] = *b"SSND";
const CHUNK_FVER: [u8; 4] = *b"FVER";

/// AIFC version 1 timestamp, the only version ever defined
const AIFC_VERSION: u32 = 0xa280_5140;

const CODE_NONE: [u8; 4] = *b"NONE";
const CODE_TWOS: [u8; 4] = *b"twos";
const CODE_SOWT: [u8; 4] = *b"sowt";
const CODE_FL32: [u8; 4] = *b"fl32";
const CODE_FL32_UPPER: [u8; 4] = *b"FL32";
const CODE_FL64: [u8; 4] = *b"fl64";
const CODE_FL64_UPPER: [u8; 4] = *b"FL64";

pub(crate) fn matches(probe: &[u8]) -> bool {
    probe.len() >= 12
        && probe[..4] == FORM
        && (probe[8..12] == FORM_AIFF || probe[8..12] == FORM_AIFC)
}

fn int_format_for_bits(bits: u16, chunk_offset: u64) -> AudioFileResult<SampleFormat> {
    match bits {
        8 => Ok(SampleFormat::Int8),
        16 => Ok(SampleFormat::Int16),
        24 => Ok(SampleFormat::Int24),
        32 => Ok(SampleFormat::Int32),
        other => Err(AudioFileError::malformed_header(
            "COMM declares an unsupported bit width",
            other.to_string(),
            ErrorPosition::new(chunk_offset).with_description("COMM chunk"),
        )),
    }
}

struct CommInfo {
    sample_format: SampleFormat,
    byte_order: ByteOrder,
    num_channels: u32,
    sample_rate: f64,
}

fn parse_comm(bytes: &[u8], is_aifc: bool, chunk_offset: u64) -> AudioFileResult<CommInfo> {
    let required = if is_aifc { 22 } else { 18 };
    if bytes.len() < required {
        return Err(AudioFileError::malformed_header(
            "COMM chunk too small",
            format!("{} bytes", bytes.len()),
            ErrorPosition::new(chunk_offset).with_description("COMM chunk"),
        ));
    }

    let num_channels = i16::from_be_bytes([bytes[0], bytes[1]]);
    // bytes[2..6] hold numSampleFrames; the SSND byte length is authoritative
    let bits = i16::from_be_bytes([bytes[6], bytes[7]]);
    let mut rate_bytes = [0u8; 10];
    rate_bytes.copy_from_slice(&bytes[8..18]);
    let sample_rate = extended::decode(&rate_bytes)?;

    if num_channels < 1 {
        return Err(AudioFileError::malformed_header(
            "COMM declares no channels",
            num_channels.to_string(),
            ErrorPosition::new(chunk_offset).with_description("COMM chunk"),
        ));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(AudioFileError::malformed_header(
            "COMM declares a non-positive sample rate",
            sample_rate.to_string(),
            ErrorPosition::new(chunk_offset + 8).with_description("COMM sample rate"),
        ));
    }
    let bits = u16::try_from(bits).map_err(|_| {
        AudioFileError::malformed_header(
            "COMM declares a negative bit width",
            bits.to_string(),
            ErrorPosition::new(chunk_offset + 6).with_description("COMM bit width"),
        )
    })?;

    let (sample_format, byte_order) = if is_aifc {
        let code: [u8; 4] = [bytes[18], bytes[19], bytes[20], bytes[21]];
        match code {
            CODE_NONE | CODE_TWOS => (int_format_for_bits(bits, chunk_offset)?, ByteOrder::Big),
            CODE_SOWT => (int_format_for_bits(bits, chunk_offset)?, ByteOrder::Little),
            CODE_FL32 | CODE_FL32_UPPER => (SampleFormat::Float32, ByteOrder::Big),
            CODE_FL64 | CODE_FL64_UPPER => (SampleFormat::Float64, ByteOrder::Big),
            other => {
                return Err(AudioFileError::unsupported_format(format!(
                    "AIFC compression type {:?}",
                    String::from_utf8_lossy(&other)
                )));
            }
        }
    } else {
        (int_format_for_bits(bits, chunk_offset)?, ByteOrder::Big)
    };

    Ok(CommInfo {
        sample_format,
        byte_order,
        num_channels: num_channels as u32,
        sample_rate,
    })
}

pub(crate) fn read_header(source: &mut dyn ReadSeek) -> AudioFileResult<ReadHeader> {
    let mut id = [0u8; 4];
    source.read_exact(&mut id)?;
    if id != FORM {
        return Err(AudioFileError::malformed_header(
            "not an IFF stream",
            format!("{:02x?}", id),
            ErrorPosition::new(0).with_description("FORM tag"),
        ));
    }
    let _form_size = source.read_u32::<BigEndian>()?;
    source.read_exact(&mut id)?;
    let is_aifc = match id {
        FORM_AIFF => false,
        FORM_AIFC => true,
        _ => {
            return Err(AudioFileError::malformed_header(
                "FORM type is neither AIFF nor AIFC",
                format!("{:02x?}", id),
                ErrorPosition::new(8).with_description("form type"),
            ));
        }
    };

    let mut comm: Option<CommInfo> = None;
    let mut ssnd: Option<(u64, u64)> = None; // (data offset, payload bytes)

    while comm.is_none() || ssnd.is_none() {
        let chunk_offset = source.stream_position()?;
        source.read_exact(&mut id)?;
        let size = source.read_u32::<BigEndian>()?;

        match id {
            CHUNK_COMM => {
                let mut payload = vec![0u8; size.min(128) as usize];
                source.read_exact(&mut payload)?;
                comm = Some(parse_comm(&payload, is_aifc, chunk_offset + 8)?);
                let consumed = payload.len() as u64;
                let rest = u64::from(size) - consumed + u64::from(size & 1);
                source.seek(SeekFrom::Current(rest as i64))?;
            }
            CHUNK_SSND => {
                if size < 8 {
                    return Err(AudioFileError::malformed_header(
                        "SSND chunk smaller than its offset fields",
                        size.to_string(),
                        ErrorPosition::new(chunk_offset).with_description("SSND chunk"),
                    ));
                }
                let offset = source.read_u32::<BigEndian>()?;
                let block_size = source.read_u32::<BigEndian>()?;
                if offset != 0 || block_size != 0 {
                    return Err(AudioFileError::unsupported_format(format!(
                        "SSND with block-aligned layout (offset {}, blockSize {})",
                        offset, block_size
                    )));
                }
                let data_offset = source.stream_position()?;
                ssnd = Some((data_offset, u64::from(size) - 8));
                if comm.is_none() {
                    // COMM may legally follow the sample data
                    skip_even_padded(source, u64::from(size) - 8)?;
                }
            }
            _ => {
                skip_even_padded(source, u64::from(size))?;
            }
        }
    }

    // the loop leaves both populated
    let comm = comm.ok_or_else(|| {
        AudioFileError::malformed_header_simple("COMM chunk not found", "required chunk absent")
    })?;
    let (data_offset, payload) = ssnd.ok_or_else(|| {
        AudioFileError::malformed_header_simple("SSND chunk not found", "required chunk absent")
    })?;

    let mut spec = AudioFileSpec::new(
        AudioFileType::Aiff,
        comm.sample_format,
        comm.num_channels,
        comm.sample_rate,
    );
    spec.byte_order = Some(comm.byte_order);

    Ok(ReadHeader {
        spec,
        byte_order: comm.byte_order,
        data_offset,
        declared_payload: Some(payload),
    })
}

/// Compression code and name for the encoding `spec` requests, or `None`
/// when plain AIFF suffices.
fn compression_for(spec: &AudioFileSpec) -> AudioFileResult<Option<([u8; 4], &'static str)>> {
    let byte_order = spec.byte_order.unwrap_or(ByteOrder::Big);
    match (spec.sample_format, byte_order) {
        (SampleFormat::UInt8, _) => Err(AudioFileError::unsupported_format(
            "AIFF stores 8-bit audio signed, use Int8",
        )),
        (SampleFormat::Float32, ByteOrder::Big) => Ok(Some((CODE_FL32, "32-bit floating point"))),
        (SampleFormat::Float64, ByteOrder::Big) => Ok(Some((CODE_FL64, "64-bit floating point"))),
        (f, ByteOrder::Little) if f.is_float() => Err(AudioFileError::unsupported_format(
            "AIFC float samples are big-endian",
        )),
        (_, ByteOrder::Little) => Ok(Some((CODE_SOWT, ""))),
        (_, ByteOrder::Big) => Ok(None),
    }
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    let compression = compression_for(spec)?;
    let byte_order = spec.byte_order.unwrap_or(ByteOrder::Big);
    let num_channels = i16::try_from(spec.num_channels).map_err(|_| {
        AudioFileError::unsupported_format(format!(
            "AIFF supports at most {} channels, got {}",
            i16::MAX,
            spec.num_channels
        ))
    })?;
    let rate_bytes = extended::encode(spec.sample_rate)?;

    sink.write_all(&FORM)?;
    sink.write_u32::<BigEndian>(0)?; // patched on flush
    sink.write_all(if compression.is_some() { &FORM_AIFC } else { &FORM_AIFF })?;

    if compression.is_some() {
        sink.write_all(&CHUNK_FVER)?;
        sink.write_u32::<BigEndian>(4)?;
        sink.write_u32::<BigEndian>(AIFC_VERSION)?;
    }

    // COMM: channels, numSampleFrames (patched), bits, 80-bit rate, and for
    // AIFC the compression code plus an even-padded pascal string name
    let comm_size = match compression {
        Some((_, name)) => {
            let pascal = 1 + name.len();
            18 + 4 + pascal + (pascal & 1)
        }
        None => 18,
    };
    sink.write_all(&CHUNK_COMM)?;
    sink.write_u32::<BigEndian>(comm_size as u32)?;
    sink.write_i16::<BigEndian>(num_channels)?;
    let frames_offset = sink.stream_position()?;
    sink.write_u32::<BigEndian>(0)?; // patched on flush
    sink.write_i16::<BigEndian>(spec.sample_format.bits_per_sample() as i16)?;
    sink.write_all(&rate_bytes)?;
    if let Some((code, name)) = compression {
        sink.write_all(&code)?;
        sink.write_u8(name.len() as u8)?;
        sink.write_all(name.as_bytes())?;
        if (1 + name.len()) & 1 == 1 {
            sink.write_u8(0)?;
        }
    }

    sink.write_all(&CHUNK_SSND)?;
    let ssnd_size_offset = sink.stream_position()?;
    sink.write_u32::<BigEndian>(0)?; // patched on flush
    sink.write_u32::<BigEndian>(0)?; // offset
    sink.write_u32::<BigEndian>(0)?; // blockSize
    let data_offset = sink.stream_position()?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Aiff;
    out_spec.byte_order = Some(byte_order);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order,
        data_offset,
        patches: vec![
            PatchField {
                offset: 4,
                width: PatchWidth::U32Be,
                value: |ctx| ctx.data_offset + ctx.payload + (ctx.payload & 1) - 8,
            },
            PatchField {
                offset: frames_offset,
                width: PatchWidth::U32Be,
                value: |ctx| ctx.num_frames,
            },
            PatchField {
                offset: ssnd_size_offset,
                width: PatchWidth::U32Be,
                value: |ctx| ctx.payload + 8,
            },
        ],
        pad_align: 2,
    })
}
