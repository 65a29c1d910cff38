//! Headerless PCM streams.
//!
//! Raw streams carry no self-description, so both reading and writing
//! require a caller-supplied [`AudioFileSpec`]. The reader's frame count
//! derives from the remaining stream length; the writer has no length
//! fields, so its patch list is empty and `flush` is a plain flush.

use crate::error::AudioFileResult;
use crate::formats::{ReadHeader, WriteHeader};
use crate::traits::{ReadSeek, WriteSeek};
use crate::types::{AudioFileType, AudioFileSpec, ByteOrder};

fn default_byte_order(spec: &AudioFileSpec) -> ByteOrder {
    spec.byte_order.unwrap_or(ByteOrder::Little)
}

pub(crate) fn read_header(
    source: &mut dyn ReadSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<ReadHeader> {
    spec.validate()?;
    let byte_order = default_byte_order(spec);
    let data_offset = source.stream_position()?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Raw;
    out_spec.byte_order = Some(byte_order);

    Ok(ReadHeader {
        spec: out_spec,
        byte_order,
        data_offset,
        declared_payload: None,
    })
}

pub(crate) fn write_header(
    sink: &mut dyn WriteSeek,
    spec: &AudioFileSpec,
) -> AudioFileResult<WriteHeader> {
    spec.validate()?;
    let byte_order = default_byte_order(spec);
    let data_offset = sink.stream_position()?;

    let mut out_spec = *spec;
    out_spec.file_type = AudioFileType::Raw;
    out_spec.byte_order = Some(byte_order);
    out_spec.num_frames = 0;

    Ok(WriteHeader {
        spec: out_spec,
        byte_order,
        data_offset,
        patches: Vec::new(),
        pad_align: 1,
    })
}
