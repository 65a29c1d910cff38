//! Frame transcoding between de-interleaved `f64` planes and interleaved
//! on-disk samples, through one bounded reusable byte window.

use std::io::{self, Read, Write};

use crate::codec::{sample_codec, DecodeFn, EncodeFn};
use crate::error::{AudioFileError, AudioFileResult};
use crate::types::{ByteOrder, Frames, SampleFormat};

/// Target size of the reusable byte window
const BUFFER_BYTES: usize = 65_536;

/// Transcodes frames for one facade.
///
/// Owns a byte window of `buf_frames * frame_size` bytes with
/// `buf_frames = max(1, 65536 / frame_size)`; reads and writes move through
/// it in chunks of at most `buf_frames` frames.
#[derive(Debug)]
pub(crate) struct BufferHandler {
    channels: usize,
    bytes_per_sample: usize,
    frame_size: usize,
    buf_frames: usize,
    buf: Vec<u8>,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl BufferHandler {
    pub(crate) fn new(format: SampleFormat, order: ByteOrder, channels: u32) -> Self {
        let channels = channels as usize;
        let bytes_per_sample = format.bytes_per_sample() as usize;
        let frame_size = bytes_per_sample * channels;
        let buf_frames = (BUFFER_BYTES / frame_size).max(1);
        let (decode, encode) = sample_codec(format, order);
        BufferHandler {
            channels,
            bytes_per_sample,
            frame_size,
            buf_frames,
            buf: vec![0; buf_frames * frame_size],
            decode,
            encode,
        }
    }

    #[inline]
    pub(crate) const fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub(crate) const fn buf_frames(&self) -> usize {
        self.buf_frames
    }

    /// The byte window, for callers that perform the I/O themselves
    #[inline]
    pub(crate) fn window(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable byte window, for callers that perform the I/O themselves
    #[inline]
    pub(crate) fn window_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Read `len` frames into `frames[..][offset..offset + len]`.
    ///
    /// Absent channel planes are skipped (their samples are discarded).
    /// Fails with `EndOfFile` if the source yields fewer bytes.
    pub(crate) fn read_frames<R: Read + ?Sized>(
        &mut self,
        source: &mut R,
        frames: &mut Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        self.check_bounds(frames, offset, len)?;

        let mut done = 0;
        while done < len {
            let n = (len - done).min(self.buf_frames);
            let byte_len = n * self.frame_size;
            source
                .read_exact(&mut self.buf[..byte_len])
                .map_err(map_eof)?;
            self.decode_into(frames, offset + done, n);
            done += n;
        }
        Ok(())
    }

    /// Write `len` frames from `frames[..][offset..offset + len]`.
    ///
    /// Every channel plane must be present.
    pub(crate) fn write_frames<W: Write + ?Sized>(
        &mut self,
        sink: &mut W,
        frames: &Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        self.check_bounds(frames, offset, len)?;

        let mut done = 0;
        while done < len {
            let n = (len - done).min(self.buf_frames);
            self.encode_from(frames, offset + done, n)?;
            sink.write_all(&self.buf[..n * self.frame_size])?;
            done += n;
        }
        Ok(())
    }

    /// De-interleave and decode `n` frames from the byte window
    pub(crate) fn decode_into(&mut self, frames: &mut Frames, offset: usize, n: usize) {
        let decode = self.decode;
        let channels = self.channels;
        let bps = self.bytes_per_sample;
        for ch in 0..channels {
            let Some(plane) = frames.channel_mut(ch) else {
                continue;
            };
            for i in 0..n {
                let at = (i * channels + ch) * bps;
                plane[offset + i] = decode(&self.buf[at..at + bps]);
            }
        }
    }

    /// Encode and interleave `n` frames into the byte window
    pub(crate) fn encode_from(
        &mut self,
        frames: &Frames,
        offset: usize,
        n: usize,
    ) -> AudioFileResult<()> {
        let encode = self.encode;
        let channels = self.channels;
        let bps = self.bytes_per_sample;
        for ch in 0..channels {
            let plane = frames.channel(ch).ok_or_else(|| {
                AudioFileError::invalid_argument(format!(
                    "channel {} is absent, all planes are required for writing",
                    ch
                ))
            })?;
            for i in 0..n {
                let at = (i * channels + ch) * bps;
                encode(plane[offset + i], &mut self.buf[at..at + bps]);
            }
        }
        Ok(())
    }

    fn check_bounds(&self, frames: &Frames, offset: usize, len: usize) -> AudioFileResult<()> {
        if frames.num_channels() != self.channels {
            return Err(AudioFileError::invalid_argument(format!(
                "buffer has {} channels, file has {}",
                frames.num_channels(),
                self.channels
            )));
        }
        let end = offset.checked_add(len).ok_or_else(|| {
            AudioFileError::invalid_argument(format!("offset {} + len {} overflows", offset, len))
        })?;
        if end > frames.len() {
            return Err(AudioFileError::invalid_argument(format!(
                "range {}..{} exceeds buffer capacity {}",
                offset,
                end,
                frames.len()
            )));
        }
        Ok(())
    }
}

fn map_eof(e: io::Error) -> AudioFileError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        AudioFileError::end_of_file("source ended mid-sample")
    } else {
        AudioFileError::Io(e)
    }
}
