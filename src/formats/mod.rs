//! Per-format header codecs and the file-type registry.
//!
//! Each format module supplies up to three capabilities: a magic-number
//! matcher over a probe slice, a header parser returning a [`ReadHeader`],
//! and a header emitter returning a [`WriteHeader`] whose patch list carries
//! all the format's back-patching knowledge.

pub(crate) mod aiff;
pub(crate) mod ircam;
pub(crate) mod next;
pub(crate) mod raw;
pub(crate) mod wave;
pub(crate) mod wave64;

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::ByteOrder as _;
use byteorder::{BigEndian, LittleEndian};
use tracing::debug;

use crate::error::{AudioFileError, AudioFileResult};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder};

/// Number of bytes the identifier may inspect
pub(crate) const PROBE_LEN: usize = 1024;

/// Largest payload a 32-bit RIFF container can carry once header overhead is
/// budgeted; anything bigger is promoted to Wave64 at open time.
const WAVE_MAX_PAYLOAD: u64 = u32::MAX as u64 - 1024;

/// Inputs available to a length-field patch function
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatchContext {
    pub num_frames: u64,
    /// `num_frames * frame_size`, without any trailing pad bytes
    pub payload: u64,
    pub data_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatchWidth {
    U32Be,
    U32Le,
    U64Le,
}

/// One length field to rewrite in place once the payload size is known
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatchField {
    /// Absolute byte offset of the field
    pub offset: u64,
    pub width: PatchWidth,
    pub value: fn(&PatchContext) -> u64,
}

impl PatchField {
    /// Compute the field value and its wire encoding
    pub(crate) fn encoded(&self, ctx: &PatchContext) -> AudioFileResult<([u8; 8], usize)> {
        let v = (self.value)(ctx);
        if matches!(self.width, PatchWidth::U32Be | PatchWidth::U32Le) && v > u64::from(u32::MAX) {
            return Err(AudioFileError::unsupported_format(format!(
                "payload of {} bytes exceeds the container's 32-bit length field",
                ctx.payload
            )));
        }
        let mut buf = [0u8; 8];
        let len = match self.width {
            PatchWidth::U32Be => {
                BigEndian::write_u32(&mut buf, v as u32);
                4
            }
            PatchWidth::U32Le => {
                LittleEndian::write_u32(&mut buf, v as u32);
                4
            }
            PatchWidth::U64Le => {
                LittleEndian::write_u64(&mut buf, v);
                8
            }
        };
        Ok((buf, len))
    }
}

/// Result of parsing a header: spec, resolved byte order and payload location
#[derive(Debug, Clone)]
pub(crate) struct ReadHeader {
    pub spec: AudioFileSpec,
    pub byte_order: ByteOrder,
    /// Absolute byte offset at which interleaved sample data begins
    pub data_offset: u64,
    /// Payload length the header declares; `None` means the sentinel was
    /// present (or the format has no length field) and the physical stream
    /// length is authoritative
    pub declared_payload: Option<u64>,
}

impl ReadHeader {
    /// Fill in `spec.num_frames` from the physical stream length.
    ///
    /// The payload is the smaller of the declared length and
    /// `stream_len - data_offset`.
    pub(crate) fn resolve_num_frames(&mut self, stream_len: u64) {
        let frame = self.spec.frame_size() as u64;
        let available = stream_len.saturating_sub(self.data_offset);
        let payload = match self.declared_payload {
            Some(declared) => declared.min(available),
            None => available,
        };
        self.spec.num_frames = payload / frame;
    }
}

/// Result of emitting a header: payload location plus the back-patch list
#[derive(Debug)]
pub(crate) struct WriteHeader {
    pub spec: AudioFileSpec,
    pub byte_order: ByteOrder,
    pub data_offset: u64,
    pub patches: Vec<PatchField>,
    /// Payload alignment the container requires (pad bytes added on close)
    pub pad_align: u64,
}

type MatchFn = fn(&[u8]) -> bool;
type ReadHeaderFn = fn(&mut dyn ReadSeek) -> AudioFileResult<ReadHeader>;
type WriteHeaderFn = fn(&mut dyn WriteSeek, &AudioFileSpec) -> AudioFileResult<WriteHeader>;

/// One registry row; capabilities a format lacks are `None`
pub(crate) struct FormatCodec {
    pub file_type: AudioFileType,
    pub matches: Option<MatchFn>,
    pub read: Option<ReadHeaderFn>,
    pub write: Option<WriteHeaderFn>,
}

/// The registry, in identification order
pub(crate) const CODECS: &[FormatCodec] = &[
    FormatCodec {
        file_type: AudioFileType::Aiff,
        matches: Some(aiff::matches),
        read: Some(aiff::read_header),
        write: Some(aiff::write_header),
    },
    FormatCodec {
        file_type: AudioFileType::Wave,
        matches: Some(wave::matches),
        read: Some(wave::read_header),
        write: Some(wave::write_header),
    },
    FormatCodec {
        file_type: AudioFileType::Wave64,
        matches: Some(wave64::matches),
        read: Some(wave64::read_header),
        write: Some(wave64::write_header),
    },
    FormatCodec {
        file_type: AudioFileType::Next,
        matches: Some(next::matches),
        read: Some(next::read_header),
        write: Some(next::write_header),
    },
    FormatCodec {
        file_type: AudioFileType::Ircam,
        matches: Some(ircam::matches),
        read: Some(ircam::read_header),
        write: Some(ircam::write_header),
    },
    FormatCodec {
        file_type: AudioFileType::Raw,
        matches: None,
        read: None, // reading raw requires a caller-supplied spec
        write: Some(raw::write_header),
    },
];

fn codec_for(file_type: AudioFileType) -> &'static FormatCodec {
    // the registry covers every AudioFileType variant
    CODECS
        .iter()
        .find(|c| c.file_type == file_type)
        .unwrap_or(&CODECS[0])
}

/// Probe an input against every registered identifier.
///
/// Reads at most [`PROBE_LEN`] bytes, restores the stream position, and
/// returns the first match in registration order.
pub(crate) fn identify<R: Read + Seek + ?Sized>(
    source: &mut R,
) -> AudioFileResult<Option<AudioFileType>> {
    let start = source.stream_position()?;
    let mut probe = [0u8; PROBE_LEN];
    let mut filled = 0;
    while filled < PROBE_LEN {
        let n = source.read(&mut probe[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    source.seek(SeekFrom::Start(start))?;

    for codec in CODECS {
        if let Some(matches) = codec.matches {
            if matches(&probe[..filled]) {
                return Ok(Some(codec.file_type));
            }
        }
    }
    Ok(None)
}

/// Identify the input and parse its header, leaving the stream positioned at
/// the start of sample data with `num_frames` resolved.
pub(crate) fn read_header<R: ReadSeek>(source: &mut R) -> AudioFileResult<ReadHeader> {
    let Some(file_type) = identify(source)? else {
        return Err(AudioFileError::unrecognized_format(
            "no registered identifier matched the input",
        ));
    };
    let header = match parse_header(source, file_type) {
        Err(AudioFileError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(AudioFileError::malformed_header_simple(
                "header ran past the end of the input",
                e.to_string(),
            ));
        }
        other => other?,
    };
    debug!(
        file_type = %header.spec.file_type,
        sample_format = %header.spec.sample_format,
        data_offset = header.data_offset,
        num_frames = header.spec.num_frames,
        "parsed header"
    );
    Ok(header)
}

/// Parse a header of a known type. `Io(UnexpectedEof)` is passed through so
/// callers replaying over partial buffers can fetch more bytes and retry.
pub(crate) fn parse_header<R: ReadSeek>(
    source: &mut R,
    file_type: AudioFileType,
) -> AudioFileResult<ReadHeader> {
    let codec = codec_for(file_type);
    let Some(read) = codec.read else {
        return Err(AudioFileError::unsupported_operation(format!(
            "{:#} requires a caller-supplied spec",
            file_type
        )));
    };
    let mut header = read(source)?;
    let data_offset = header.data_offset;
    let end = source.seek(SeekFrom::End(0))?;
    header.resolve_num_frames(end);
    source.seek(SeekFrom::Start(data_offset))?;
    Ok(header)
}

/// Parse a header of a known type without touching the physical stream
/// length; the caller resolves `num_frames` and repositions the stream.
#[cfg(feature = "async")]
pub(crate) fn parse_header_unresolved<R: ReadSeek>(
    source: &mut R,
    file_type: AudioFileType,
) -> AudioFileResult<ReadHeader> {
    let codec = codec_for(file_type);
    let Some(read) = codec.read else {
        return Err(AudioFileError::unsupported_operation(format!(
            "{:#} requires a caller-supplied spec",
            file_type
        )));
    };
    read(source)
}

/// Emit an initial header for `spec`, promoting Wave to Wave64 when the
/// expected payload cannot fit a 32-bit length field.
pub(crate) fn write_header<W: WriteSeek>(
    sink: &mut W,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    spec.validate()?;
    let mut file_type = spec.file_type;
    if file_type == AudioFileType::Wave {
        let projected = spec.num_frames.saturating_mul(spec.frame_size() as u64);
        if projected > WAVE_MAX_PAYLOAD {
            debug!(projected, "promoting Wave to Wave64");
            file_type = AudioFileType::Wave64;
        }
    }
    let codec = codec_for(file_type);
    let Some(write) = codec.write else {
        return Err(AudioFileError::unsupported_operation(format!(
            "{:#} has no header to emit",
            file_type
        )));
    };
    write(sink, spec)
}

/// Skip `len` bytes plus the container's pad byte if `len` is odd
pub(crate) fn skip_even_padded<R: ReadSeek + ?Sized>(source: &mut R, len: u64) -> io::Result<u64> {
    source.seek(SeekFrom::Current((len + (len & 1)) as i64))
}
