//! Error types for detdecode.

use thiserror::Error;

/// Result alias for detdecode operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Errors that can occur while decoding predictions or driving a device.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The tensor shape is not representable.
    #[error("invalid dimensions: rows={rows}, cols={cols}")]
    InvalidDimensions { rows: usize, cols: usize },
    /// Rows must carry the 5-field geometry header plus at least one class.
    #[error("too few columns: got {cols}, need at least {min}")]
    TooFewColumns { cols: usize, min: usize },
    /// The provided buffer is too small for the requested layout.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// A memory pool could not satisfy an allocation.
    #[error("out of {pool} memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        pool: &'static str,
        requested: usize,
        available: usize,
    },
    /// The stream worker could not be started.
    #[error("stream creation failed: {reason}")]
    StreamCreate { reason: String },
    /// An operation was enqueued on a stream that is no longer running.
    #[error("stream closed during {op}")]
    StreamClosed { op: &'static str },
    /// The stream worker terminated abnormally.
    #[error("stream worker panicked")]
    StreamPanicked,
    /// The decode kernel rejected its launch arguments.
    #[error("kernel failed: {reason}")]
    KernelFailed { reason: String },
    /// Reading prediction data failed.
    #[error("io error: {reason}")]
    Io { reason: String },
}
