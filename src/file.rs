//! Synchronous audio file facades.
//!
//! [`AudioFileReader`] owns a seekable source, the parsed header and a
//! buffer handler; [`AudioFileWriter`] owns a seekable sink and the header's
//! back-patch list. The writer's frame-count watermark only grows, and its
//! length fields are rewritten on `flush` and on `close`.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::buffer::BufferHandler;
use crate::error::{AudioFileError, AudioFileResult};
use crate::formats::{self, PatchContext, PatchField, ReadHeader, WriteHeader};
use crate::traits::{AudioFileInfo, FrameRead, FrameWrite};
use crate::types::{AudioFileSpec, ByteOrder, Frames};

/// Scratch plane size used by `copy_to`
const COPY_CHUNK_FRAMES: u64 = 8192;

/// Frame-granular reader over any `Read + Seek` source.
#[derive(Debug)]
pub struct AudioFileReader<R: Read + Seek> {
    source: R,
    spec: AudioFileSpec,
    byte_order: ByteOrder,
    data_offset: u64,
    position: u64,
    handler: BufferHandler,
}

impl<R: Read + Seek> AudioFileReader<R> {
    /// Probe the source, parse its header and position it at frame 0.
    pub fn open(mut source: R) -> AudioFileResult<Self> {
        let header = formats::read_header(&mut source)?;
        Ok(Self::from_header(source, header))
    }

    /// Open a headerless stream described by a caller-supplied spec.
    pub fn open_raw(mut source: R, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        let mut header = formats::raw::read_header(&mut source, spec)?;
        let end = source.seek(SeekFrom::End(0))?;
        header.resolve_num_frames(end);
        source.seek(SeekFrom::Start(header.data_offset))?;
        Ok(Self::from_header(source, header))
    }

    fn from_header(source: R, header: ReadHeader) -> Self {
        let handler = BufferHandler::new(
            header.spec.sample_format,
            header.byte_order,
            header.spec.num_channels,
        );
        AudioFileReader {
            source,
            spec: header.spec,
            byte_order: header.byte_order,
            data_offset: header.data_offset,
            position: 0,
            handler,
        }
    }

    /// Frames remaining between the current position and the end
    pub const fn remaining_frames(&self) -> u64 {
        self.spec.num_frames.saturating_sub(self.position)
    }

    /// Read `len` frames into `frames[..][offset..offset + len]`.
    pub fn read_frames(
        &mut self,
        frames: &mut Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        if len as u64 > self.remaining_frames() {
            return Err(AudioFileError::end_of_file(format!(
                "{} frames requested, {} remain",
                len,
                self.remaining_frames()
            )));
        }
        self.handler
            .read_frames(&mut self.source, frames, offset, len)?;
        self.position += len as u64;
        Ok(())
    }

    /// Seek to an absolute frame position in `[0, num_frames]`.
    pub fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        if frame > self.spec.num_frames {
            return Err(AudioFileError::invalid_argument(format!(
                "frame {} is beyond the end ({} frames)",
                frame, self.spec.num_frames
            )));
        }
        let byte_offset = self.data_offset + frame * self.handler.frame_size() as u64;
        self.source.seek(SeekFrom::Start(byte_offset))?;
        self.position = frame;
        Ok(())
    }

    /// Copy `num_frames` frames from the current position into `target`,
    /// looping over a bounded scratch plane.
    pub fn copy_to<W: Write + Seek>(
        &mut self,
        target: &mut AudioFileWriter<W>,
        num_frames: u64,
    ) -> AudioFileResult<()> {
        if target.spec.num_channels != self.spec.num_channels {
            return Err(AudioFileError::invalid_argument(format!(
                "cannot copy {} channels into a {}-channel writer",
                self.spec.num_channels, target.spec.num_channels
            )));
        }
        let chunk = num_frames.min(COPY_CHUNK_FRAMES) as usize;
        let mut scratch = Frames::new(self.spec.num_channels as usize, chunk);
        let mut remaining = num_frames;
        while remaining > 0 {
            let n = remaining.min(chunk as u64) as usize;
            self.read_frames(&mut scratch, 0, n)?;
            target.write_frames(&scratch, 0, n)?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Close the reader, releasing the source.
    pub fn close(self) -> AudioFileResult<()> {
        Ok(())
    }

    /// Swallow-errors variant of [`close`](Self::close).
    pub fn cleanup(self) {}

    /// Give back the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read + Seek> AudioFileInfo for AudioFileReader<R> {
    fn spec(&self) -> AudioFileSpec {
        self.spec
    }

    fn num_frames(&self) -> u64 {
        self.spec.num_frames
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn sample_data_offset(&self) -> u64 {
        self.data_offset
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl<R: Read + Seek> FrameRead for AudioFileReader<R> {
    fn read_frames(
        &mut self,
        frames: &mut Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        AudioFileReader::read_frames(self, frames, offset, len)
    }

    fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        AudioFileReader::seek(self, frame)
    }
}

/// Frame-granular writer over any `Write + Seek` sink.
///
/// When the sink also implements `Read`, [`read_frames`](Self::read_frames)
/// provides read-back over the frames written so far.
#[derive(Debug)]
pub struct AudioFileWriter<W: Write + Seek> {
    sink: W,
    spec: AudioFileSpec,
    byte_order: ByteOrder,
    data_offset: u64,
    position: u64,
    num_frames: u64,
    patched_frames: u64,
    patches: Vec<PatchField>,
    pad_align: u64,
    handler: BufferHandler,
    finalized: bool,
}

impl<W: Write + Seek> AudioFileWriter<W> {
    /// Emit an initial header for `spec` and position the sink at frame 0.
    pub fn create(mut sink: W, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        let header = formats::write_header(&mut sink, spec)?;
        Ok(Self::from_header(sink, header))
    }

    /// Open a headerless sink described by a caller-supplied spec.
    pub fn create_raw(mut sink: W, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        let header = formats::raw::write_header(&mut sink, spec)?;
        Ok(Self::from_header(sink, header))
    }

    fn from_header(sink: W, header: WriteHeader) -> Self {
        let handler = BufferHandler::new(
            header.spec.sample_format,
            header.byte_order,
            header.spec.num_channels,
        );
        debug!(
            file_type = %header.spec.file_type,
            sample_format = %header.spec.sample_format,
            data_offset = header.data_offset,
            "emitted header"
        );
        AudioFileWriter {
            sink,
            spec: header.spec,
            byte_order: header.byte_order,
            data_offset: header.data_offset,
            position: 0,
            num_frames: 0,
            // u64::MAX marks "no patch written yet", so the first flush
            // always rewrites the placeholder lengths
            patched_frames: u64::MAX,
            patches: header.patches,
            pad_align: header.pad_align,
            handler,
            finalized: false,
        }
    }

    /// Write `len` frames from `frames[..][offset..offset + len]`.
    ///
    /// After a successful write `num_frames == max(num_frames, position)`.
    pub fn write_frames(&mut self, frames: &Frames, offset: usize, len: usize) -> AudioFileResult<()> {
        if self.finalized {
            return Err(AudioFileError::unsupported_operation(
                "cannot write after close",
            ));
        }
        self.handler
            .write_frames(&mut self.sink, frames, offset, len)?;
        self.position += len as u64;
        self.num_frames = self.num_frames.max(self.position);
        Ok(())
    }

    /// Seek to an absolute frame position in `[0, num_frames]`.
    pub fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        if frame > self.num_frames {
            return Err(AudioFileError::invalid_argument(format!(
                "frame {} is beyond the watermark ({} frames)",
                frame, self.num_frames
            )));
        }
        let byte_offset = self.data_offset + frame * self.handler.frame_size() as u64;
        self.sink.seek(SeekFrom::Start(byte_offset))?;
        self.position = frame;
        Ok(())
    }

    /// Rewrite the header's length fields for the current frame count.
    ///
    /// A no-op when the watermark is already on disk; raw sinks have no
    /// length fields and only flush the underlying writer.
    pub fn flush(&mut self) -> AudioFileResult<()> {
        if self.patches.is_empty() || self.patched_frames == self.num_frames {
            self.sink.flush()?;
            return Ok(());
        }

        let ctx = PatchContext {
            num_frames: self.num_frames,
            payload: self.num_frames * self.handler.frame_size() as u64,
            data_offset: self.data_offset,
        };
        let saved = self.sink.stream_position()?;
        for patch in &self.patches {
            let (bytes, len) = patch.encoded(&ctx)?;
            self.sink.seek(SeekFrom::Start(patch.offset))?;
            self.sink.write_all(&bytes[..len])?;
        }
        self.sink.seek(SeekFrom::Start(saved))?;
        self.sink.flush()?;
        self.patched_frames = self.num_frames;
        debug!(num_frames = self.num_frames, "patched header length fields");
        Ok(())
    }

    /// Pad the payload to the container's alignment, patch the header and
    /// flush the sink. The writer is unusable afterwards.
    pub fn close(mut self) -> AudioFileResult<()> {
        self.finish()
    }

    /// Swallow-errors variant of [`close`](Self::close).
    pub fn cleanup(mut self) {
        if let Err(e) = self.finish() {
            warn!(error = %e, "cleanup discarded a close error");
        }
    }

    fn finish(&mut self) -> AudioFileResult<()> {
        if self.finalized {
            return Ok(());
        }
        let payload = self.num_frames * self.handler.frame_size() as u64;
        let pad = (self.pad_align - payload % self.pad_align) % self.pad_align;
        if pad > 0 {
            // the patch formulas already budget for these bytes
            self.sink.seek(SeekFrom::Start(self.data_offset + payload))?;
            self.sink.write_all(&[0u8; 8][..pad as usize])?;
        }
        self.flush()?;
        self.finalized = true;
        Ok(())
    }

    /// Frame-count watermark written so far
    pub const fn num_frames(&self) -> u64 {
        self.num_frames
    }
}

impl<W: Read + Write + Seek> AudioFileWriter<W> {
    /// Read back `len` frames from the current position.
    ///
    /// Only frames below the watermark can be read.
    pub fn read_frames(
        &mut self,
        frames: &mut Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        if self.position + len as u64 > self.num_frames {
            return Err(AudioFileError::end_of_file(format!(
                "{} frames requested, {} remain below the watermark",
                len,
                self.num_frames - self.position
            )));
        }
        self.handler
            .read_frames(&mut self.sink, frames, offset, len)?;
        self.position += len as u64;
        Ok(())
    }
}

impl<W: Write + Seek> AudioFileInfo for AudioFileWriter<W> {
    fn spec(&self) -> AudioFileSpec {
        AudioFileSpec {
            num_frames: self.num_frames,
            ..self.spec
        }
    }

    fn num_frames(&self) -> u64 {
        self.num_frames
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn sample_data_offset(&self) -> u64 {
        self.data_offset
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl<W: Write + Seek> FrameWrite for AudioFileWriter<W> {
    fn write_frames(&mut self, frames: &Frames, offset: usize, len: usize) -> AudioFileResult<()> {
        AudioFileWriter::write_frames(self, frames, offset, len)
    }

    fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        AudioFileWriter::seek(self, frame)
    }

    fn flush(&mut self) -> AudioFileResult<()> {
        AudioFileWriter::flush(self)
    }
}

impl<W: Write + Seek> Drop for AudioFileWriter<W> {
    fn drop(&mut self) {
        // close() can fail and drop cannot report it, so dropping an
        // unfinalized writer only warns
        if !self.finalized && self.num_frames > 0 {
            warn!(
                num_frames = self.num_frames,
                "writer dropped without close(), header lengths may be stale"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioFileType, SampleFormat};
    use std::io::Cursor;

    /// Deterministic sample generator in [-1, 1)
    struct Lcg(u64);

    impl Lcg {
        fn new(seed: u64) -> Self {
            Lcg(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(1))
        }

        fn next_sample(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        }
    }

    fn generated(seed: u64, channels: usize, frames: usize) -> Frames {
        let mut lcg = Lcg::new(seed);
        let mut out = Frames::new(channels, frames);
        for i in 0..frames {
            for ch in 0..channels {
                out.channel_mut(ch).unwrap()[i] = lcg.next_sample();
            }
        }
        out
    }

    fn assert_frames_close(a: &Frames, b: &Frames, tolerance: f64) {
        assert_eq!(a.num_channels(), b.num_channels());
        for ch in 0..a.num_channels() {
            let (pa, pb) = (a.channel(ch).unwrap(), b.channel(ch).unwrap());
            assert_eq!(pa.len(), pb.len());
            for (i, (x, y)) in pa.iter().zip(pb).enumerate() {
                assert!(
                    (x - y).abs() <= tolerance,
                    "channel {} frame {}: {} vs {}",
                    ch,
                    i,
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_next_round_trip_with_seeded_frames() {
        // 10_000 stereo i16 frames at 44100 Hz, seeds 0 then 1
        let spec = AudioFileSpec::new(AudioFileType::Next, SampleFormat::Int16, 2, 44_100.0);
        let head = generated(0, 2, 8192);
        let tail = generated(1, 2, 1808);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&head, 0, 8192).unwrap();
        writer.write_frames(&tail, 0, 1808).unwrap();
        assert_eq!(writer.num_frames(), 10_000);
        writer.close().unwrap();

        assert_eq!(&bytes[0..4], &[0x2e, 0x73, 0x6e, 0x64]);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 28);
        assert_eq!(u32::from_be_bytes(bytes[8..12].try_into().unwrap()), 40_000);
        assert_eq!(u32::from_be_bytes(bytes[12..16].try_into().unwrap()), 3);
        assert_eq!(u32::from_be_bytes(bytes[16..20].try_into().unwrap()), 44_100);
        assert_eq!(u32::from_be_bytes(bytes[20..24].try_into().unwrap()), 2);
        assert_eq!(bytes.len(), 28 + 40_000);

        let mut reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.spec().file_type, AudioFileType::Next);
        assert_eq!(reader.num_frames(), 10_000);
        assert_eq!(reader.sample_rate(), 44_100.0);

        let tolerance = 2.02 / 65_536.0;
        let mut got = Frames::new(2, 8192);
        reader.read_frames(&mut got, 0, 8192).unwrap();
        assert_frames_close(&got, &head, tolerance);
        let mut got_tail = Frames::new(2, 1808);
        reader.read_frames(&mut got_tail, 0, 1808).unwrap();
        assert_frames_close(&got_tail, &tail, tolerance);
    }

    #[test]
    fn test_wave_float_round_trip_is_bit_exact() {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Float64, 2, 48_000.0);
        let plane = generated(7, 2, 500);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&plane, 0, 500).unwrap();
        writer.close().unwrap();

        let mut reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.spec().sample_format, SampleFormat::Float64);
        let mut got = Frames::new(2, 500);
        reader.read_frames(&mut got, 0, 500).unwrap();
        assert_eq!(got, plane);
    }

    #[test]
    fn test_aifc_sowt_payload_bytes() {
        // little-endian Int24 mono goes out as AIFC with the sowt code
        let spec = AudioFileSpec::new(AudioFileType::Aiff, SampleFormat::Int24, 1, 96_000.0)
            .with_byte_order(ByteOrder::Little);
        let mut plane = Frames::new(1, 5);
        let values = [0.0, 0.25, -0.25, 0.5, -1.0];
        plane.channel_mut(0).unwrap().copy_from_slice(&values);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        let data_offset = writer.sample_data_offset() as usize;
        writer.write_frames(&plane, 0, 5).unwrap();
        writer.close().unwrap();

        let mut expected = Vec::new();
        for v in values {
            let q = (v * 8_388_608.0) as i32;
            let q = q.min(8_388_607);
            expected.extend_from_slice(&q.to_le_bytes()[..3]);
        }
        assert_eq!(&bytes[data_offset..data_offset + 15], &expected[..]);
        // 15 payload bytes get one pad byte, and the FORM length covers it
        assert_eq!(bytes.len() % 2, 0);
        let form_size = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(form_size as usize, bytes.len() - 8);

        let mut reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.spec().sample_format, SampleFormat::Int24);
        assert_eq!(reader.byte_order(), ByteOrder::Little);
        assert_eq!(reader.num_frames(), 5);
        let mut got = Frames::new(1, 5);
        reader.read_frames(&mut got, 0, 5).unwrap();
        assert_frames_close(&got, &plane, 2.02 / 16_777_216.0);
    }

    #[test]
    fn test_length_coherence_after_reopen() {
        for (file_type, pad_align) in [
            (AudioFileType::Wave, 2u64),
            (AudioFileType::Aiff, 2),
            (AudioFileType::Next, 1),
            (AudioFileType::Ircam, 1),
        ] {
            let spec = AudioFileSpec::new(file_type, SampleFormat::Int16, 1, 22_050.0);
            let plane = generated(3, 1, 333);

            let mut bytes = Vec::new();
            let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
            let data_offset = writer.sample_data_offset();
            writer.write_frames(&plane, 0, 333).unwrap();
            writer.close().unwrap();

            let payload = 333 * 2;
            let padded = payload + (pad_align - payload % pad_align) % pad_align;
            assert_eq!(
                bytes.len() as u64,
                data_offset + padded,
                "{file_type}: file size"
            );

            let reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
            assert_eq!(reader.num_frames(), 333, "{file_type}: frame count");
        }
    }

    #[test]
    fn test_seek_read_equivalence() {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Int16, 2, 44_100.0);
        let plane = generated(11, 2, 1000);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&plane, 0, 1000).unwrap();
        writer.close().unwrap();

        let mut reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();

        // read from a seek target
        reader.seek(250).unwrap();
        assert_eq!(reader.position(), 250);
        let mut direct = Frames::new(2, 100);
        reader.read_frames(&mut direct, 0, 100).unwrap();
        assert_eq!(reader.position(), 350);

        // same range via a skip read from the start
        reader.seek(0).unwrap();
        let mut skipped = Frames::new(2, 250);
        reader.read_frames(&mut skipped, 0, 250).unwrap();
        let mut indirect = Frames::new(2, 100);
        reader.read_frames(&mut indirect, 0, 100).unwrap();
        assert_eq!(direct, indirect);

        // seeking past the end is rejected
        assert!(matches!(
            reader.seek(1001),
            Err(AudioFileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_past_end_is_end_of_file() {
        let spec = AudioFileSpec::new(AudioFileType::Next, SampleFormat::Int16, 1, 8_000.0);
        let plane = generated(5, 1, 10);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&plane, 0, 10).unwrap();
        writer.close().unwrap();

        let mut reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        let mut buf = Frames::new(1, 16);
        assert!(matches!(
            reader.read_frames(&mut buf, 0, 16),
            Err(AudioFileError::EndOfFile(_))
        ));
    }

    #[test]
    fn test_copy_to_between_formats() {
        let src_spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Float32, 2, 48_000.0);
        let plane = generated(21, 2, 9000); // spans two copy chunks

        let mut src_bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut src_bytes), &src_spec).unwrap();
        writer.write_frames(&plane, 0, 9000).unwrap();
        writer.close().unwrap();

        let mut reader = AudioFileReader::open(Cursor::new(&src_bytes)).unwrap();
        let dst_spec = AudioFileSpec::new(AudioFileType::Aiff, SampleFormat::Float32, 2, 48_000.0);
        let mut dst_bytes = Vec::new();
        let mut target = AudioFileWriter::create(Cursor::new(&mut dst_bytes), &dst_spec).unwrap();
        reader.copy_to(&mut target, 9000).unwrap();
        assert_eq!(target.num_frames(), 9000);
        target.close().unwrap();

        let mut back = AudioFileReader::open(Cursor::new(&dst_bytes)).unwrap();
        assert_eq!(back.spec().file_type, AudioFileType::Aiff);
        let mut got = Frames::new(2, 9000);
        back.read_frames(&mut got, 0, 9000).unwrap();
        for ch in 0..2 {
            for i in 0..9000 {
                assert_eq!(
                    got.channel(ch).unwrap()[i],
                    plane.channel(ch).unwrap()[i] as f32 as f64
                );
            }
        }
    }

    #[test]
    fn test_raw_round_trip_requires_spec() {
        let spec = AudioFileSpec::new(AudioFileType::Raw, SampleFormat::Int32, 1, 44_100.0)
            .with_byte_order(ByteOrder::Big);
        let plane = generated(13, 1, 64);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create_raw(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&plane, 0, 64).unwrap();
        writer.flush().unwrap(); // no length fields, must still succeed
        writer.close().unwrap();
        assert_eq!(bytes.len(), 64 * 4);

        let mut reader = AudioFileReader::open_raw(Cursor::new(&bytes), &spec).unwrap();
        assert_eq!(reader.num_frames(), 64);
        let mut got = Frames::new(1, 64);
        reader.read_frames(&mut got, 0, 64).unwrap();
        assert_frames_close(&got, &plane, 2.02 / 4_294_967_296.0);
    }

    #[test]
    fn test_bidi_writer_reads_back_written_frames() {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Int16, 1, 8_000.0);
        let plane = generated(17, 1, 50);

        let mut bytes = Vec::new();
        let mut writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.write_frames(&plane, 0, 50).unwrap();

        writer.seek(10).unwrap();
        let mut got = Frames::new(1, 20);
        writer.read_frames(&mut got, 0, 20).unwrap();
        assert_eq!(writer.position(), 30);
        for i in 0..20 {
            let want = plane.channel(0).unwrap()[10 + i];
            assert!((got.channel(0).unwrap()[i] - want).abs() <= 2.02 / 65_536.0);
        }

        // reading beyond the watermark fails
        writer.seek(40).unwrap();
        let mut over = Frames::new(1, 20);
        assert!(matches!(
            writer.read_frames(&mut over, 0, 20),
            Err(AudioFileError::EndOfFile(_))
        ));

        // overwrite inside the payload, watermark stays at 50
        writer.seek(0).unwrap();
        writer.write_frames(&plane, 0, 5).unwrap();
        assert_eq!(writer.num_frames(), 50);
        writer.close().unwrap();

        let reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.num_frames(), 50);
    }

    #[test]
    fn test_write_after_close_semantics() {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Int16, 1, 8_000.0);
        let mut bytes = Vec::new();
        let writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        writer.close().unwrap();

        // an empty file still gets coherent header lengths
        let reader = AudioFileReader::open(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.num_frames(), 0);
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size as usize, bytes.len() - 8);
    }

    #[test]
    fn test_wave_promotion_to_wave64() {
        // an expected payload beyond 4 GiB promotes the container
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Float64, 2, 48_000.0)
            .with_num_frames(300_000_000);
        let mut bytes = Vec::new();
        let writer = AudioFileWriter::create(Cursor::new(&mut bytes), &spec).unwrap();
        assert_eq!(writer.spec().file_type, AudioFileType::Wave64);
        writer.cleanup();
        assert_eq!(&bytes[..4], &crate::formats::wave64::RIFF_GUID[..4]);
    }
}
