//! mar345-core: header and overflow codec for the mar345 image container.
//!
//! The mar345 container stores a rectangular detector image as a 4096-byte
//! self-describing header (binary prologue + fixed-width keyword lines),
//! an optional list of high-intensity overflow records, and a 16-bit pixel
//! stream. This crate implements the header and overflow layers; the pixel
//! stream compression is an external collaborator (see `mar345-io`).
//!

pub mod codec;
pub mod error;
pub mod header;
pub mod overflow;

pub use codec::{
    decode_header, encode_header, ByteOrder, RawHeader, HEADER_SIZE, HIGH_LINE_OFFSET, LINE_SIZE,
    MAGIC, PROLOGUE_SIZE,
};
pub use error::{Error, Result};
pub use header::{ExposureMode, Mar345Header};
pub use overflow::{
    extract, patch_high_count, restore, OverflowRecord, OVERFLOW_THRESHOLD, RECORD_SIZE,
};
