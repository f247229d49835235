//! Error types for mar345-core.

use thiserror::Error;

/// Result type alias for mar345 codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for mar345 codec operations.
#[derive(Error, Debug)]
pub enum Error {
    /// First header integer is not the mar345 magic number, even after
    /// byte swapping. The file is not a mar345 container.
    #[error("invalid magic number {found} (expected 1234): not a mar345 image")]
    InvalidMagic {
        /// The value actually found in the first header word.
        found: u32,
    },

    /// Fewer than 4096 header bytes available.
    #[error("truncated header: got {len} bytes, need {expected}")]
    TruncatedHeader {
        /// Number of bytes available.
        len: usize,
        /// Number of bytes required.
        expected: usize,
    },

    /// An overflow record points outside the pixel grid.
    #[error("corrupt overflow record: index {index} out of bounds for {len} pixels")]
    CorruptOverflowRecord {
        /// Linear pixel index stored in the record.
        index: u32,
        /// Length of the grid being restored.
        len: usize,
    },
}
