//! Error types for the QOV codec

use thiserror::Error;

/// Result type alias for QOV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for QOV encoding and decoding
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Illegal argument or API misuse (bad dimensions, zero fps_den,
    /// unknown colorspace, encoding after finish, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File header is not a valid QOV header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Input ends before a chunk header or payload is complete
    #[error("Truncated input: {0}")]
    TruncatedInput(String),

    /// Bitstream violates the format (unknown opcode, bad LZ4 offset,
    /// misplaced end marker, ...)
    #[error("Corrupted stream: {0}")]
    CorruptedStream(String),

    /// Output buffer could not grow
    #[error("Writer exhausted: {0}")]
    WriterExhausted(String),

    /// Data source has not delivered enough bytes yet (transient)
    #[error("Data not yet available")]
    NotYetAvailable,
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an invalid header error
    pub fn invalid_header<S: Into<String>>(msg: S) -> Self {
        Error::InvalidHeader(msg.into())
    }

    /// Create a truncated input error
    pub fn truncated<S: Into<String>>(msg: S) -> Self {
        Error::TruncatedInput(msg.into())
    }

    /// Create a corrupted stream error
    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        Error::CorruptedStream(msg.into())
    }

    /// Whether the error is transient and the operation may be retried
    /// once more data has arrived
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NotYetAvailable)
    }
}
