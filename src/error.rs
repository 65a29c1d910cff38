use core::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use thiserror::Error;

/// Result type for audiofile_io operations
pub type AudioFileResult<T> = Result<T, AudioFileError>;

/// Comprehensive error type for audiofile_io operations
#[derive(Debug, Error)]
pub enum AudioFileError {
    /// File I/O errors (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No registered identifier matched the input
    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    #[error("Malformed header at {position}: {description} - {details}")]
    /// Magic mismatched mid-parse, chunk ran past its container, a required
    /// chunk was absent, or a reserved field held an illegal value
    MalformedHeader {
        description: String,
        details: String,
        position: ErrorPosition,
    },

    /// Header parsed but requests an encoding, byte order or codec tag the
    /// crate does not implement
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Operation not available on this facade (e.g. seek on a stream)
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Ran out of input mid-sample
    #[error("End of file: {0}")]
    EndOfFile(String),

    /// Bad offsets or lengths, or a required channel row was absent on write
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The frame-count watermark changed while a header patch was in flight
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
}

/// Position information for errors that occur during header parsing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPosition {
    /// Byte offset in the file where the error occurred
    pub offset: u64,
    /// Human-readable description of the position
    pub description: String,
}

impl ErrorPosition {
    /// Create a new error position at the given byte offset
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            description: format!("byte offset {}", offset),
        }
    }

    /// Set a custom description for the error position
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Display for ErrorPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.description)
    }
}

impl AudioFileError {
    /// Create an UnrecognizedFormat error with a custom message
    pub fn unrecognized_format(message: impl Into<String>) -> Self {
        AudioFileError::UnrecognizedFormat(message.into())
    }

    /// Create a MalformedHeader error with position information
    pub fn malformed_header(
        description: impl Into<String>,
        details: impl Into<String>,
        position: ErrorPosition,
    ) -> Self {
        AudioFileError::MalformedHeader {
            description: description.into(),
            details: details.into(),
            position,
        }
    }

    /// Create a MalformedHeader error without position information
    pub fn malformed_header_simple(
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        AudioFileError::MalformedHeader {
            description: description.into(),
            details: details.into(),
            position: ErrorPosition::default(),
        }
    }

    /// Create an UnsupportedFormat error with a custom message
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        AudioFileError::UnsupportedFormat(message.into())
    }

    /// Create an UnsupportedOperation error with a custom message
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        AudioFileError::UnsupportedOperation(message.into())
    }

    /// Create an EndOfFile error with a custom message
    pub fn end_of_file(message: impl Into<String>) -> Self {
        AudioFileError::EndOfFile(message.into())
    }

    /// Create an InvalidArgument error with a custom message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AudioFileError::InvalidArgument(message.into())
    }

    /// Create a ConcurrentModification error with a custom message
    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        AudioFileError::ConcurrentModification(message.into())
    }
}
