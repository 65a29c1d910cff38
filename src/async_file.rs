//! Asynchronous audio file facades over positioned non-blocking channels.
//!
//! Header parsing and emission reuse the synchronous codecs over in-memory
//! buffers: reads replay the parser over a growing prefix until it no longer
//! runs out of bytes, writes emit the header image first and send it in one
//! piece. `&mut self` receivers serialize operations per facade, so at most
//! one I/O operation is ever in flight.
//!
//! The writer's back-patch protocol snapshots the frame-count watermark
//! under a mutex, rewrites the length fields at their absolute offsets with
//! the channel position saved and restored around the patch, then verifies
//! the watermark generation; a mismatch surfaces `ConcurrentModification`.

use std::io::{Cursor, SeekFrom};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::buffer::BufferHandler;
use crate::error::{AudioFileError, AudioFileResult};
use crate::formats::{self, PatchContext, PatchField, ReadHeader, WriteHeader};
use crate::types::{AudioFileSpec, AudioFileType, ByteOrder, Frames};

/// Growth step for the header replay buffer
const HEADER_CHUNK: usize = 4096;
/// Upper bound on the bytes a header may occupy before parsing fails
const MAX_HEADER_BYTES: usize = 16 * 1024 * 1024;

/// Asynchronous frame-granular reader.
#[derive(Debug)]
pub struct AsyncAudioFileReader<R: AsyncRead + AsyncSeek + Unpin> {
    source: R,
    spec: AudioFileSpec,
    byte_order: ByteOrder,
    data_offset: u64,
    position: u64,
    handler: BufferHandler,
}

impl<R: AsyncRead + AsyncSeek + Unpin> AsyncAudioFileReader<R> {
    /// Probe the channel, parse its header and position it at frame 0.
    pub async fn open(mut source: R) -> AudioFileResult<Self> {
        let header = read_header_async(&mut source).await?;
        Self::from_header(source, header).await
    }

    /// Open a headerless channel described by a caller-supplied spec.
    pub async fn open_raw(mut source: R, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        spec.validate()?;
        let data_offset = source.stream_position().await?;
        let mut out_spec = *spec;
        out_spec.file_type = AudioFileType::Raw;
        let byte_order = spec.byte_order.unwrap_or(ByteOrder::Little);
        out_spec.byte_order = Some(byte_order);
        let header = ReadHeader {
            spec: out_spec,
            byte_order,
            data_offset,
            declared_payload: None,
        };
        Self::from_header(source, header).await
    }

    async fn from_header(mut source: R, mut header: ReadHeader) -> AudioFileResult<Self> {
        let end = source.seek(SeekFrom::End(0)).await?;
        header.resolve_num_frames(end);
        source.seek(SeekFrom::Start(header.data_offset)).await?;
        let handler = BufferHandler::new(
            header.spec.sample_format,
            header.byte_order,
            header.spec.num_channels,
        );
        Ok(AsyncAudioFileReader {
            source,
            spec: header.spec,
            byte_order: header.byte_order,
            data_offset: header.data_offset,
            position: 0,
            handler,
        })
    }

    pub const fn spec(&self) -> AudioFileSpec {
        self.spec
    }

    pub const fn num_frames(&self) -> u64 {
        self.spec.num_frames
    }

    pub const fn position(&self) -> u64 {
        self.position
    }

    pub const fn sample_data_offset(&self) -> u64 {
        self.data_offset
    }

    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub const fn remaining_frames(&self) -> u64 {
        self.spec.num_frames.saturating_sub(self.position)
    }

    /// Read `len` frames into `frames[..][offset..offset + len]`.
    pub async fn read_frames(
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
        let frame_size = self.handler.frame_size();
        let mut done = 0;
        while done < len {
            let n = (len - done).min(self.handler.buf_frames());
            let byte_len = n * frame_size;
            self.source
                .read_exact(&mut self.handler.window_mut()[..byte_len])
                .await
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        AudioFileError::end_of_file("channel ended mid-sample")
                    } else {
                        AudioFileError::Io(e)
                    }
                })?;
            self.handler.decode_into(frames, offset + done, n);
            done += n;
        }
        self.position += len as u64;
        Ok(())
    }

    /// Seek to an absolute frame position in `[0, num_frames]`.
    pub async fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        if frame > self.spec.num_frames {
            return Err(AudioFileError::invalid_argument(format!(
                "frame {} is beyond the end ({} frames)",
                frame, self.spec.num_frames
            )));
        }
        let byte_offset = self.data_offset + frame * self.handler.frame_size() as u64;
        self.source.seek(SeekFrom::Start(byte_offset)).await?;
        self.position = frame;
        Ok(())
    }

    /// Close the reader, releasing the channel.
    pub async fn close(self) -> AudioFileResult<()> {
        Ok(())
    }
}

/// Watermark state guarded by the writer's patch mutex
#[derive(Debug)]
struct LengthWatermark {
    /// Frames written so far
    frames: u64,
    /// Frames covered by the last successful patch
    patched: u64,
    /// Bumped on every watermark advance; patch commits verify it
    generation: u64,
}

/// Snapshot taken at the start of an update
#[derive(Debug, Clone, Copy)]
struct UpdateTicket {
    frames: u64,
    generation: u64,
}

/// Asynchronous frame-granular writer.
#[derive(Debug)]
pub struct AsyncAudioFileWriter<W: AsyncWrite + AsyncSeek + Unpin> {
    sink: W,
    spec: AudioFileSpec,
    byte_order: ByteOrder,
    data_offset: u64,
    position: u64,
    num_frames: u64,
    patches: Vec<PatchField>,
    pad_align: u64,
    handler: BufferHandler,
    watermark: Arc<Mutex<LengthWatermark>>,
    finalized: bool,
}

impl<W: AsyncWrite + AsyncSeek + Unpin> AsyncAudioFileWriter<W> {
    /// Emit an initial header for `spec` and position the channel at frame 0.
    pub async fn create(mut sink: W, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        let mut image = Cursor::new(Vec::new());
        let header = formats::write_header(&mut image, spec)?;
        let image = image.into_inner();
        debug_assert_eq!(image.len() as u64, header.data_offset);
        sink.write_all(&image).await?;
        Ok(Self::from_header(sink, header))
    }

    /// Open a headerless channel described by a caller-supplied spec.
    pub async fn create_raw(mut sink: W, spec: &AudioFileSpec) -> AudioFileResult<Self> {
        spec.validate()?;
        let mut image = Cursor::new(Vec::new());
        let mut header = formats::raw::write_header(&mut image, spec)?;
        header.data_offset = sink.stream_position().await?;
        Ok(Self::from_header(sink, header))
    }

    fn from_header(sink: W, header: WriteHeader) -> Self {
        let handler = BufferHandler::new(
            header.spec.sample_format,
            header.byte_order,
            header.spec.num_channels,
        );
        AsyncAudioFileWriter {
            sink,
            spec: header.spec,
            byte_order: header.byte_order,
            data_offset: header.data_offset,
            position: 0,
            num_frames: 0,
            patches: header.patches,
            pad_align: header.pad_align,
            handler,
            watermark: Arc::new(Mutex::new(LengthWatermark {
                frames: 0,
                patched: u64::MAX,
                generation: 0,
            })),
            finalized: false,
        }
    }

    pub fn spec(&self) -> AudioFileSpec {
        AudioFileSpec {
            num_frames: self.num_frames,
            ..self.spec
        }
    }

    pub const fn num_frames(&self) -> u64 {
        self.num_frames
    }

    pub const fn position(&self) -> u64 {
        self.position
    }

    pub const fn sample_data_offset(&self) -> u64 {
        self.data_offset
    }

    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Write `len` frames from `frames[..][offset..offset + len]`.
    pub async fn write_frames(
        &mut self,
        frames: &Frames,
        offset: usize,
        len: usize,
    ) -> AudioFileResult<()> {
        if self.finalized {
            return Err(AudioFileError::unsupported_operation(
                "cannot write after close",
            ));
        }
        let frame_size = self.handler.frame_size();
        let mut done = 0;
        while done < len {
            let n = (len - done).min(self.handler.buf_frames());
            self.handler.encode_from(frames, offset + done, n)?;
            let byte_len = n * frame_size;
            let window = &self.handler.window()[..byte_len];
            // borrow of the window ends before the next encode
            self.sink.write_all(window).await?;
            done += n;
        }
        self.position += len as u64;
        if self.position > self.num_frames {
            self.num_frames = self.position;
            let mut guard = self.watermark.lock().await;
            guard.frames = self.num_frames;
            guard.generation += 1;
        }
        Ok(())
    }

    /// Seek to an absolute frame position in `[0, num_frames]`.
    pub async fn seek(&mut self, frame: u64) -> AudioFileResult<()> {
        if frame > self.num_frames {
            return Err(AudioFileError::invalid_argument(format!(
                "frame {} is beyond the watermark ({} frames)",
                frame, self.num_frames
            )));
        }
        let byte_offset = self.data_offset + frame * self.handler.frame_size() as u64;
        self.sink.seek(SeekFrom::Start(byte_offset)).await?;
        self.position = frame;
        Ok(())
    }

    /// Rewrite the header's length fields for the current watermark.
    ///
    /// Completes immediately when the watermark is already on disk. Fails
    /// with `ConcurrentModification` when the watermark advanced while the
    /// patch write was in flight; the on-disk fields then describe the
    /// snapshot that was patched, never a torn value.
    pub async fn flush(&mut self) -> AudioFileResult<()> {
        let Some(ticket) = self.begin_update().await else {
            self.sink.flush().await?;
            return Ok(());
        };
        self.apply_patches(ticket.frames).await?;
        self.commit_update(ticket).await
    }

    /// Snapshot the watermark; `None` when the header is already current.
    async fn begin_update(&self) -> Option<UpdateTicket> {
        if self.patches.is_empty() {
            return None;
        }
        let guard = self.watermark.lock().await;
        if guard.patched == guard.frames {
            return None;
        }
        Some(UpdateTicket {
            frames: guard.frames,
            generation: guard.generation,
        })
    }

    /// Rewrite every patch field for a frame-count snapshot, saving and
    /// restoring the channel position around the writes.
    async fn apply_patches(&mut self, frames: u64) -> AudioFileResult<()> {
        let ctx = PatchContext {
            num_frames: frames,
            payload: frames * self.handler.frame_size() as u64,
            data_offset: self.data_offset,
        };
        let saved = self.sink.stream_position().await?;
        for patch in &self.patches {
            let (bytes, len) = patch.encoded(&ctx)?;
            self.sink.seek(SeekFrom::Start(patch.offset)).await?;
            self.sink.write_all(&bytes[..len]).await?;
        }
        self.sink.seek(SeekFrom::Start(saved)).await?;
        self.sink.flush().await?;
        Ok(())
    }

    /// Verify the watermark generation and record the patched snapshot.
    async fn commit_update(&mut self, ticket: UpdateTicket) -> AudioFileResult<()> {
        let mut guard = self.watermark.lock().await;
        if guard.generation != ticket.generation {
            return Err(AudioFileError::concurrent_modification(format!(
                "frame count advanced past {} during the header patch",
                ticket.frames
            )));
        }
        guard.patched = ticket.frames;
        debug!(num_frames = ticket.frames, "patched header length fields");
        Ok(())
    }

    /// Pad the payload, run the update chain and shut the channel down.
    pub async fn close(mut self) -> AudioFileResult<()> {
        self.finish().await?;
        self.sink.shutdown().await?;
        Ok(())
    }

    /// Swallow-errors variant of [`close`](Self::close).
    pub async fn cleanup(mut self) {
        if let Err(e) = self.finish().await {
            warn!(error = %e, "cleanup discarded a close error");
        }
        let _ = self.sink.shutdown().await;
    }

    async fn finish(&mut self) -> AudioFileResult<()> {
        if self.finalized {
            return Ok(());
        }
        let payload = self.num_frames * self.handler.frame_size() as u64;
        let pad = (self.pad_align - payload % self.pad_align) % self.pad_align;
        if pad > 0 {
            self.sink
                .seek(SeekFrom::Start(self.data_offset + payload))
                .await?;
            self.sink.write_all(&[0u8; 8][..pad as usize]).await?;
        }
        self.flush().await?;
        self.finalized = true;
        Ok(())
    }
}

/// Parse a header from an async channel by replaying the synchronous parser
/// over a growing prefix buffer.
async fn read_header_async<R: AsyncRead + AsyncSeek + Unpin>(
    source: &mut R,
) -> AudioFileResult<ReadHeader> {
    let start = source.stream_position().await?;
    let mut buf: Vec<u8> = Vec::with_capacity(HEADER_CHUNK);

    loop {
        let mut cursor = Cursor::new(buf.as_slice());
        let attempt = match formats::identify(&mut cursor)? {
            Some(file_type) => formats::parse_header_unresolved(&mut cursor, file_type),
            None if buf.len() >= formats::PROBE_LEN => {
                return Err(AudioFileError::unrecognized_format(
                    "no registered identifier matched the input",
                ));
            }
            // a short probe may still grow into a recognizable magic
            None => Err(AudioFileError::Io(std::io::ErrorKind::UnexpectedEof.into())),
        };

        match attempt {
            Ok(header) => {
                debug!(
                    file_type = %header.spec.file_type,
                    data_offset = header.data_offset,
                    "parsed header"
                );
                return Ok(header);
            }
            Err(AudioFileError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if buf.len() >= MAX_HEADER_BYTES {
                    return Err(AudioFileError::malformed_header_simple(
                        "header larger than the replay limit",
                        format!("{} bytes", buf.len()),
                    ));
                }
                let old_len = buf.len();
                buf.resize(old_len + HEADER_CHUNK, 0);
                source
                    .seek(SeekFrom::Start(start + old_len as u64))
                    .await?;
                let n = source.read(&mut buf[old_len..]).await?;
                buf.truncate(old_len + n);
                if n == 0 {
                    // channel exhausted: a matched magic means a truncated
                    // header, anything else was never one of our formats
                    let mut cursor = Cursor::new(buf.as_slice());
                    return if formats::identify(&mut cursor)?.is_some() {
                        Err(AudioFileError::malformed_header_simple(
                            "header ran past the end of the input",
                            format!("{} bytes available", old_len),
                        ))
                    } else {
                        Err(AudioFileError::unrecognized_format(
                            "no registered identifier matched the input",
                        ))
                    };
                }
            }
            Err(other) => return Err(other),
        }
    }
}
