//! RIFF/WAVE header codec.
//!
//! Chunk-based little-endian container. The `fmt ` chunk carries the sample
//! description; samples wider than 16 bits or more than two channels are
//! emitted as `WAVE_FORMAT_EXTENSIBLE`. The `RIFF` and `data` length fields
//! are back-patched once the payload size is known.

use std::io::SeekFrom;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AudioFileError, AudioFileResult, ErrorPosition};
use crate::formats::{PatchField, PatchWidth, ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, SampleFormat};

pub(crate) const TAG_PCM: u16 = 0x0001;
pub(crate) const TAG_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const TAG_EXTENSIBLE: u16 = 0xfffe;

/// GUID tail shared by every WAV extensible subformat; the leading four
/// bytes are the format tag as a little-endian u32.
pub(crate) const SUBFORMAT_GUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

const DATA_SIZE_SENTINEL: u32 = 0xffff_ffff;

pub(crate) fn matches(probe: &[u8]) -> bool {
    probe.len() >= 12 && &probe[..4] == b"RIFF" && &probe[8..12] == b"WAVE"
}

/// Decode a `fmt ` chunk payload of 16, 18 or 40 bytes into
/// `(sample_format, channels, sample_rate)`.
pub(crate) fn parse_fmt(bytes: &[u8], chunk_offset: u64) -> AudioFileResult<(SampleFormat, u32, u32)> {
    if bytes.len() < 16 {
        return Err(AudioFileError::malformed_header(
            "fmt chunk too small",
            format!("{} bytes", bytes.len()),
            ErrorPosition::new(chunk_offset).with_description("fmt chunk"),
        ));
    }

    let tag = u16::from_le_bytes([bytes[0], bytes[1]]);
    let channels = u16::from_le_bytes([bytes[2], bytes[3]]);
    let sample_rate = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let bits = u16::from_le_bytes([bytes[14], bytes[15]]);

    let effective_tag = if tag == TAG_EXTENSIBLE {
        if bytes.len() < 40 {
            return Err(AudioFileError::malformed_header(
                "extensible fmt chunk too small",
                format!("{} bytes", bytes.len()),
                ErrorPosition::new(chunk_offset).with_description("fmt chunk"),
            ));
        }
        // the subformat GUID's first two bytes are the real format tag
        u16::from_le_bytes([bytes[24], bytes[25]])
    } else {
        tag
    };

    if channels == 0 {
        return Err(AudioFileError::malformed_header(
            "fmt chunk declares zero channels",
            channels.to_string(),
            ErrorPosition::new(chunk_offset + 2).with_description("channel count"),
        ));
    }
    if sample_rate == 0 {
        return Err(AudioFileError::malformed_header(
            "fmt chunk declares a zero sample rate",
            sample_rate.to_string(),
            ErrorPosition::new(chunk_offset + 4).with_description("sample rate"),
        ));
    }

    let sample_format = match (effective_tag, bits) {
        (TAG_PCM, 8) => SampleFormat::UInt8,
        (TAG_PCM, 16) => SampleFormat::Int16,
        (TAG_PCM, 24) => SampleFormat::Int24,
        (TAG_PCM, 32) => SampleFormat::Int32,
        (TAG_IEEE_FLOAT, 32) => SampleFormat::Float32,
        (TAG_IEEE_FLOAT, 64) => SampleFormat::Float64,
        (tag, bits) => {
            return Err(AudioFileError::unsupported_format(format!(
                "WAV format tag 0x{:04x} with {} bits per sample",
                tag, bits
            )));
        }
    };

    Ok((sample_format, u32::from(channels), sample_rate))
}

/// True when the fmt chunk must be emitted as `WAVE_FORMAT_EXTENSIBLE`
pub(crate) const fn needs_extensible(spec: &AudioFileSpec) -> bool {
    spec.sample_format.bits_per_sample() > 16 || spec.num_channels > 2
}

/// Emit a `fmt ` chunk (without the chunk header) for `spec`
pub(crate) fn fmt_payload(spec: &AudioFileSpec) -> AudioFileResult<Vec<u8>> {
    let tag = if spec.sample_format.is_float() {
        TAG_IEEE_FLOAT
    } else if spec.sample_format == SampleFormat::Int8 {
        return Err(AudioFileError::unsupported_format(
            "WAV stores 8-bit audio unsigned, use UInt8",
        ));
    } else {
        TAG_PCM
    };

    let bits = spec.sample_format.bits_per_sample();
    let block_align = spec.frame_size() as u16;
    let byte_rate = (spec.sample_rate + 0.5).floor() as u32 * u32::from(block_align);
    let channels = u16::try_from(spec.num_channels).map_err(|_| {
        AudioFileError::unsupported_format(format!(
            "WAV supports at most 65535 channels, got {}",
            spec.num_channels
        ))
    })?;

    let mut out = Vec::with_capacity(40);
    let extensible = needs_extensible(spec);
    let written_tag = if extensible { TAG_EXTENSIBLE } else { tag };
    out.write_u16::<LittleEndian>(written_tag)?;
    out.write_u16::<LittleEndian>(channels)?;
    out.write_u32::<LittleEndian>((spec.sample_rate + 0.5).floor() as u32)?;
    out.write_u32::<LittleEndian>(byte_rate)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(bits)?;

    if extensible {
        out.write_u16::<LittleEndian>(22)?; // extension size
        out.write_u16::<LittleEndian>(bits)?; // valid bits per sample
        out.write_u32::<LittleEndian>(0)?; // channel mask: callers assign placement
        out.write_u32::<LittleEndian>(u32::from(tag))?;
        out.extend_from_slice(&SUBFORMAT_GUID_TAIL);
    }
    Ok(out)
}

pub(crate) fn read_header(source: &mut dyn ReadSeek) -> AudioFileResult<ReadHeader> {
    let mut riff = [0u8; 4];
    source.read_exact(&mut riff)?;
    if &riff != b"RIFF" {
        return Err(AudioFileError::malformed_header(
            "not a RIFF stream",
            format!("{:02x?}", riff),
            ErrorPosition::new(0).with_description("RIFF tag"),
        ));
    }
    let _riff_size = source.read_u32::<LittleEndian>()?;
    let mut wave = [0u8; 4];
    source.read_exact(&mut wave)?;
    if &wave != b"WAVE" {
        return Err(AudioFileError::malformed_header(
            "RIFF stream is not WAVE",
            format!("{:02x?}", wave),
            ErrorPosition::new(8).with_description("WAVE form type"),
        ));
    }

    let mut fmt: Option<(SampleFormat, u32, u32)> = None;
    loop {
        let chunk_offset = source.stream_position()?;
        let mut id = [0u8; 4];
        source.read_exact(&mut id)?;
        let size = source.read_u32::<LittleEndian>()?;

        match &id {
            b"fmt " => {
                let mut payload = vec![0u8; size.min(64) as usize];
                source.read_exact(&mut payload)?;
                fmt = Some(parse_fmt(&payload, chunk_offset + 8)?);
                // skip any trailing extension bytes plus the pad byte
                let consumed = payload.len() as u64;
                let remaining = u64::from(size) - consumed + u64::from(size & 1);
                source.seek(SeekFrom::Current(remaining as i64))?;
            }
            b"data" => {
                let (sample_format, channels, rate) = fmt.ok_or_else(|| {
                    AudioFileError::malformed_header(
                        "data chunk precedes fmt chunk",
                        "fmt chunk not found",
                        ErrorPosition::new(chunk_offset).with_description("data chunk"),
                    )
                })?;
                let data_offset = source.stream_position()?;
                let mut spec =
                    AudioFileSpec::new(AudioFileType::Wave, sample_format, channels, f64::from(rate));
                spec.byte_order = Some(ByteOrder::Little);
                return Ok(ReadHeader {
                    spec,
                    byte_order: ByteOrder::Little,
                    data_offset,
                    declared_payload: (size != DATA_SIZE_SENTINEL).then_some(u64::from(size)),
                });
            }
            _ => {
                crate::formats::skip_even_padded(source, u64::from(size))?;
            }
        }
    }
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    if matches!(spec.byte_order, Some(ByteOrder::Big)) {
        return Err(AudioFileError::unsupported_format(
            "WAV sample data is little-endian",
        ));
    }
    let fmt = fmt_payload(spec)?;

    sink.write_all(b"RIFF")?;
    sink.write_u32::<LittleEndian>(0)?; // patched on flush
    sink.write_all(b"WAVE")?;

    sink.write_all(b"fmt ")?;
    sink.write_u32::<LittleEndian>(fmt.len() as u32)?;
    sink.write_all(&fmt)?;

    sink.write_all(b"data")?;
    let data_size_offset = sink.stream_position()?;
    sink.write_u32::<LittleEndian>(0)?; // patched on flush
    let data_offset = sink.stream_position()?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Wave;
    out_spec.byte_order = Some(ByteOrder::Little);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order: ByteOrder::Little,
        data_offset,
        patches: vec![
            PatchField {
                offset: 4,
                width: PatchWidth::U32Le,
                value: |ctx| ctx.data_offset + ctx.payload + (ctx.payload & 1) - 8,
            },
            PatchField {
                offset: data_size_offset,
                width: PatchWidth::U32Le,
                value: |ctx| ctx.payload,
            },
        ],
        pad_align: 2,
    })
}
