use std::io::{Read, Seek, Write};
use std::time::Duration;

use crate::error::AudioFileResult;
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, Frames, SampleFormat};

/// Convenience trait for types that implement both Read and Seek
pub trait ReadSeek: Read + Seek {}

impl<RS: Read + Seek + ?Sized> ReadSeek for RS {}

/// Convenience trait for types that implement both Write and Seek
pub trait WriteSeek: Write + Seek {}

impl<WS: Write + Seek + ?Sized> WriteSeek for WS {}

/// Metadata common to every facade, sync or async.
pub trait AudioFileInfo {
    /// The file's spec, with `num_frames` reflecting the current state
    fn spec(&self) -> AudioFileSpec;

    /// Total frame count (authoritative for readers, watermark for writers)
    fn num_frames(&self) -> u64;

    /// Current frame position
    fn position(&self) -> u64;

    /// Byte offset at which interleaved sample data begins
    fn sample_data_offset(&self) -> u64;

    /// On-disk byte order actually in use
    fn byte_order(&self) -> ByteOrder;

    fn file_type(&self) -> AudioFileType {
        self.spec().file_type
    }

    fn sample_format(&self) -> SampleFormat {
        self.spec().sample_format
    }

    fn num_channels(&self) -> u32 {
        self.spec().num_channels
    }

    fn sample_rate(&self) -> f64 {
        self.spec().sample_rate
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.num_frames() as f64 / self.sample_rate())
    }
}

/// Frame-granular reading over a synchronous facade.
pub trait FrameRead: AudioFileInfo {
    /// Fill `frames[..][offset..offset + len]` from the current position.
    ///
    /// Absent channel planes are skipped. Fails with `EndOfFile` when fewer
    /// than `len` frames remain.
    fn read_frames(&mut self, frames: &mut Frames, offset: usize, len: usize)
        -> AudioFileResult<()>;

    /// Seek to an absolute frame position in `[0, num_frames]`
    fn seek(&mut self, frame: u64) -> AudioFileResult<()>;
}

/// Frame-granular writing over a synchronous facade.
pub trait FrameWrite: AudioFileInfo {
    /// Append or overwrite `frames[..][offset..offset + len]` at the current
    /// position. Every channel plane must be present.
    fn write_frames(&mut self, frames: &Frames, offset: usize, len: usize) -> AudioFileResult<()>;

    /// Seek to an absolute frame position in `[0, num_frames]`
    fn seek(&mut self, frame: u64) -> AudioFileResult<()>;

    /// Rewrite the header's length fields for the current frame count
    fn flush(&mut self) -> AudioFileResult<()>;
}
