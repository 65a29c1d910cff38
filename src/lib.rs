//! Uncompressed PCM audio file I/O.
//!
//! Reads and writes AIFF/AIFF-C, RIFF/WAVE, Wave64, NeXT/Sun AU, IRCAM and
//! headerless raw streams through one frame-granular interface: samples move
//! between on-disk interleaved encodings and de-interleaved `f64` planes
//! ([`Frames`]), headers are identified, parsed and back-patched bit-exactly
//! per format, and every facade exists in a synchronous and (behind the
//! default-on `async` feature) an asynchronous flavor.
//!
//! # Example
//!
//! ```no_run
//! use audiofile_io::{AudioFileSpec, AudioFileType, SampleFormat};
//!
//! // write a second of silence, then read it back
//! let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Int16, 2, 44_100.0);
//! let mut writer = audiofile_io::open_write_path("out.wav", &spec)?;
//! let silence = audiofile_io::buffer_with(2, 44_100);
//! writer.write_frames(&silence, 0, 44_100)?;
//! writer.close()?;
//!
//! let mut reader = audiofile_io::open_read_path("out.wav")?;
//! let mut frames = audiofile_io::buffer(2);
//! reader.read_frames(&mut frames, 0, 8192)?;
//! # Ok::<(), audiofile_io::AudioFileError>(())
//! ```

// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)] // Duplicate match arms
#![allow(clippy::collapsible_if)] // Sometimes clearer to have separate conditions
#![allow(clippy::unnecessary_cast)] // Explicit casts for clarity
#![allow(clippy::identity_op)] // Explicit operations for clarity
//
// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::box_collection)] // Warns on boxed `Vec`, `String`, etc.
#![warn(clippy::vec_box)] // Avoids using `Vec<Box<T>>` when unnecessary
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains
//
// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`
#![warn(clippy::panic)] // Avoids using `panic!` in production code
//
// Maintainability
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions

pub mod error;
pub mod traits;
pub mod types;

pub(crate) mod buffer;
pub(crate) mod codec;
pub(crate) mod formats;

pub mod file;

#[cfg(feature = "async")]
pub mod async_file;

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek};
use std::path::Path;

use memmap2::Mmap;

pub use crate::error::{AudioFileError, AudioFileResult};
pub use crate::file::{AudioFileReader, AudioFileWriter};
pub use crate::traits::{AudioFileInfo, FrameRead, FrameWrite, ReadSeek, WriteSeek};
pub use crate::types::{
    AudioFileSpec, AudioFileType, ByteOrder, Frames, OpenOptions, SampleFormat,
};

#[cfg(feature = "async")]
pub use crate::async_file::{AsyncAudioFileReader, AsyncAudioFileWriter};

/// Default frame capacity of [`buffer`]
pub const DEFAULT_BUFFER_FRAMES: usize = 8192;

/// Files larger than this are never memory-mapped
pub(crate) const MAX_MMAP_SIZE: u64 = 512 * 1024 * 1024;

/// Probe an input against every registered format identifier.
///
/// Non-destructive: the stream position is restored before returning.
/// Returns `None` when no identifier matches.
pub fn identify<R: Read + Seek>(source: &mut R) -> AudioFileResult<Option<AudioFileType>> {
    formats::identify(source)
}

/// Parse the header of an input and return its spec.
///
/// The stream position is restored before returning.
pub fn read_spec<R: Read + Seek>(source: &mut R) -> AudioFileResult<AudioFileSpec> {
    let start = source.stream_position()?;
    let header = formats::read_header(source)?;
    source.seek(std::io::SeekFrom::Start(start))?;
    Ok(header.spec)
}

/// Open any `Read + Seek` source for frame-granular reading.
pub fn open_read<R: Read + Seek>(source: R) -> AudioFileResult<AudioFileReader<R>> {
    AudioFileReader::open(source)
}

/// Open a headerless `Read + Seek` source described by `spec`.
pub fn open_raw_read<R: Read + Seek>(
    source: R,
    spec: &AudioFileSpec,
) -> AudioFileResult<AudioFileReader<R>> {
    AudioFileReader::open_raw(source, spec)
}

/// Open a file path for reading with default options.
pub fn open_read_path<P: AsRef<Path>>(
    path: P,
) -> AudioFileResult<AudioFileReader<Box<dyn ReadSeek>>> {
    open_read_path_with(path, OpenOptions::default())
}

/// Open a file path for reading.
///
/// With `use_memory_map` set, files up to 512 MiB are memory-mapped and read
/// through the mapping; everything else goes through a buffered reader.
pub fn open_read_path_with<P: AsRef<Path>>(
    path: P,
    options: OpenOptions,
) -> AudioFileResult<AudioFileReader<Box<dyn ReadSeek>>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let source: Box<dyn ReadSeek> = if options.use_memory_map && len <= MAX_MMAP_SIZE {
        // SAFETY: the mapping is dropped with the reader and the file is
        // opened read-only here; concurrent truncation by another process is
        // outside this crate's contract, as with any mmap-backed reader
        let mmap = unsafe { Mmap::map(&file)? };
        Box::new(Cursor::new(mmap))
    } else {
        Box::new(BufReader::new(file))
    };
    AudioFileReader::open(source)
}

/// Open any `Write + Seek` sink for frame-granular writing.
pub fn open_write<W: std::io::Write + Seek>(
    sink: W,
    spec: &AudioFileSpec,
) -> AudioFileResult<AudioFileWriter<W>> {
    AudioFileWriter::create(sink, spec)
}

/// Open a headerless `Write + Seek` sink described by `spec`.
pub fn open_raw_write<W: std::io::Write + Seek>(
    sink: W,
    spec: &AudioFileSpec,
) -> AudioFileResult<AudioFileWriter<W>> {
    AudioFileWriter::create_raw(sink, spec)
}

/// Create a file at `path` and open it for writing.
pub fn open_write_path<P: AsRef<Path>>(
    path: P,
    spec: &AudioFileSpec,
) -> AudioFileResult<AudioFileWriter<BufWriter<File>>> {
    let file = File::create(path)?;
    AudioFileWriter::create(BufWriter::new(file), spec)
}

/// Open a file path for asynchronous reading.
#[cfg(feature = "async")]
pub async fn open_read_async<P: AsRef<Path>>(
    path: P,
) -> AudioFileResult<AsyncAudioFileReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path).await?;
    AsyncAudioFileReader::open(file).await
}

/// Create a file at `path` and open it for asynchronous writing.
#[cfg(feature = "async")]
pub async fn open_write_async<P: AsRef<Path>>(
    path: P,
    spec: &AudioFileSpec,
) -> AudioFileResult<AsyncAudioFileWriter<tokio::fs::File>> {
    let file = tokio::fs::File::create(path).await?;
    AsyncAudioFileWriter::create(file, spec).await
}

/// Allocate a frame buffer with the default capacity of 8192 frames.
pub fn buffer(num_channels: u32) -> Frames {
    buffer_with(num_channels, DEFAULT_BUFFER_FRAMES)
}

/// Allocate a frame buffer with an explicit frame capacity.
pub fn buffer_with(num_channels: u32, num_frames: usize) -> Frames {
    Frames::new(num_channels as usize, num_frames)
}

#[cfg(test)]
mod lib_tests {
    use super::*;
    use std::io::Cursor;

    fn tiny_wave() -> Vec<u8> {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Int16, 1, 8_000.0);
        let mut bytes = Vec::new();
        let mut writer = open_write(Cursor::new(&mut bytes), &spec).unwrap();
        let mut frames = buffer_with(1, 32);
        for i in 0..32 {
            frames.channel_mut(0).unwrap()[i] = (i as f64 - 16.0) / 32.0;
        }
        writer.write_frames(&frames, 0, 32).unwrap();
        writer.close().unwrap();
        bytes
    }

    #[test]
    fn test_identify_is_non_destructive() {
        let bytes = tiny_wave();
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(identify(&mut cursor).unwrap(), Some(AudioFileType::Wave));

        // the identify call must not change what a subsequent open sees
        let mut reader = open_read(cursor).unwrap();
        assert_eq!(reader.num_frames(), 32);
        let mut frames = buffer_with(1, 32);
        reader.read_frames(&mut frames, 0, 32).unwrap();
        assert!((frames.channel(0).unwrap()[0] - (-0.5)).abs() < 1e-3);
    }

    #[test]
    fn test_read_spec_restores_position() {
        let bytes = tiny_wave();
        let mut cursor = Cursor::new(&bytes);
        let spec = read_spec(&mut cursor).unwrap();
        assert_eq!(spec.file_type, AudioFileType::Wave);
        assert_eq!(spec.sample_format, SampleFormat::Int16);
        assert_eq!(spec.num_frames, 32);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_path_round_trip_with_mmap_option() {
        let spec = AudioFileSpec::new(AudioFileType::Aiff, SampleFormat::Int16, 2, 44_100.0);
        let path = std::env::temp_dir().join("audiofile_io_mmap_test.aiff");

        let mut writer = open_write_path(&path, &spec).unwrap();
        let mut frames = buffer_with(2, 100);
        for i in 0..100 {
            frames.channel_mut(0).unwrap()[i] = (i as f64 / 100.0) - 0.5;
            frames.channel_mut(1).unwrap()[i] = 0.5 - (i as f64 / 100.0);
        }
        writer.write_frames(&frames, 0, 100).unwrap();
        writer.close().unwrap();

        for use_memory_map in [false, true] {
            let mut reader =
                open_read_path_with(&path, OpenOptions { use_memory_map }).unwrap();
            assert_eq!(reader.num_frames(), 100, "mmap={use_memory_map}");
            let mut got = buffer_with(2, 100);
            reader.read_frames(&mut got, 0, 100).unwrap();
            for i in 0..100 {
                let want = frames.channel(0).unwrap()[i];
                assert!((got.channel(0).unwrap()[i] - want).abs() <= 2.02 / 65_536.0);
            }
        }

        std::fs::remove_file(&path).ok();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_path_round_trip() {
        let spec = AudioFileSpec::new(AudioFileType::Wave, SampleFormat::Float32, 1, 48_000.0);
        let path = std::env::temp_dir().join("audiofile_io_async_test.wav");

        let mut writer = open_write_async(&path, &spec).await.unwrap();
        let mut frames = buffer_with(1, 64);
        for i in 0..64 {
            frames.channel_mut(0).unwrap()[i] = (i as f64 / 64.0).sin();
        }
        writer.write_frames(&frames, 0, 64).await.unwrap();
        writer.close().await.unwrap();

        let mut reader = open_read_async(&path).await.unwrap();
        assert_eq!(reader.num_frames(), 64);
        let mut got = buffer_with(1, 64);
        reader.read_frames(&mut got, 0, 64).await.unwrap();
        for i in 0..64 {
            assert_eq!(
                got.channel(0).unwrap()[i],
                frames.channel(0).unwrap()[i] as f32 as f64
            );
        }

        std::fs::remove_file(&path).ok();
    }
}
