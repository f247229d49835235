//! mar345-io: container file I/O for mar345 images.
//!
//! Orchestrates the mar345-core codec against memory-mapped container
//! files and a pluggable pixel-transfer collaborator.
//!

mod error;
pub mod image;
pub mod reader;
pub mod transfer;

pub use error::{Error, Result};
pub use image::{HeaderSource, ImageState, Mar345Image};
pub use reader::MappedContainer;
pub use transfer::{PixelTransfer, RawPixelTransfer};
