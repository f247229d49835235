//! I/O error types.

use thiserror::Error;

/// Result type for container I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error (covers missing files and permission problems).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid container contents.
    #[error("invalid container layout: {0}")]
    InvalidFormat(String),

    /// The pixel-transfer collaborator moved a different number of samples
    /// than the image dimensions require.
    #[error("pixel transfer moved {actual} samples, expected {expected}")]
    PixelTransferMismatch {
        /// Samples required by `x * y`.
        expected: usize,
        /// Samples actually transferred.
        actual: usize,
    },

    /// Codec error from mar345-core.
    #[error("codec error: {0}")]
    Core(#[from] mar345_core::Error),
}
