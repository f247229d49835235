//! Memory-mapped container access.
//!

use crate::{Error, Result};
use mar345_core::{ByteOrder, OverflowRecord, RawHeader, HEADER_SIZE, RECORD_SIZE};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped mar345 container.
///
/// Uses memmap2 to access the file without loading the pixel stream into
/// memory; the mapping is dropped (and the descriptor closed) when this
/// value goes out of scope, on every exit path.
pub struct MappedContainer {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedContainer {
    /// Opens a container file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Returns the path this container was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies out the verbatim 4096-byte header block.
    ///
    /// # Errors
    /// Returns [`mar345_core::Error::TruncatedHeader`] (wrapped) when the
    /// file is shorter than one header.
    pub fn raw_header(&self) -> Result<RawHeader> {
        Ok(RawHeader::from_bytes(&self.mmap[..])?)
    }

    /// Reads the `high` overflow records stored after the header.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] when the file ends inside the
    /// record region.
    pub fn overflow_records(&self, high: usize, order: ByteOrder) -> Result<Vec<OverflowRecord>> {
        let end = HEADER_SIZE + high * RECORD_SIZE;
        if self.mmap.len() < end {
            return Err(Error::InvalidFormat(format!(
                "file ends at {} bytes, {high} overflow records need {end}",
                self.mmap.len()
            )));
        }
        let records = self.mmap[HEADER_SIZE..end]
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let mut buf = [0u8; RECORD_SIZE];
                buf.copy_from_slice(chunk);
                OverflowRecord::from_bytes(&buf, order)
            })
            .collect();
        Ok(records)
    }

    /// Byte offset where the transferred pixel stream begins.
    #[must_use]
    pub fn pixel_stream_offset(high: usize) -> usize {
        HEADER_SIZE + high * RECORD_SIZE
    }
}
