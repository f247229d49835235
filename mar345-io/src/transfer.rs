//! The pixel-transfer seam.
//!
//! The compressed pixel stream of a mar345 container is produced and
//! consumed by an external codec that this crate treats as an opaque
//! collaborator. [`PixelTransfer`] is that seam: it moves the clamped
//! 16-bit grid to and from a named container, reporting how many samples
//! actually crossed. [`RawPixelTransfer`] is an uncompressed stand-in used
//! by the tests and the CLI.

use crate::{Error, Result};
use mar345_core::{ByteOrder, HEADER_SIZE, RECORD_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Moves the clamped pixel grid in and out of a container file.
///
/// Implementations must be reentrant per distinct file name; the
/// orchestration layer never shares one container between operations.
pub trait PixelTransfer {
    /// Reads `count` clamped samples from the container at `path`.
    ///
    /// Returns the samples actually recovered; the caller treats a length
    /// different from `count` as a failed transfer.
    ///
    /// # Errors
    /// Returns an error when the container cannot be opened or read.
    fn transfer_read(&self, path: &Path, count: usize) -> Result<Vec<u32>>;

    /// Appends the clamped `x * y` grid to the container at `path`.
    ///
    /// Returns the number of samples written.
    ///
    /// # Errors
    /// Returns an error when the container cannot be opened or written.
    fn transfer_write(&self, path: &Path, x: usize, y: usize, samples: &[u16]) -> Result<usize>;
}

/// Uncompressed pixel transfer: little-endian `u16` samples appended
/// directly after the header and overflow records.
///
/// This is not the native PCK compression; it exists so containers can be
/// round-tripped end to end without the external codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPixelTransfer;

impl RawPixelTransfer {
    /// Locates the pixel stream by probing the header for the overflow
    /// record count.
    fn stream_offset(file: &mut File) -> Result<u64> {
        let mut prefix = [0u8; 12];
        file.read_exact(&mut prefix)?;
        let first = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let order = ByteOrder::probe(first).map_err(Error::Core)?;
        let high = order.decode(u32::from_le_bytes([
            prefix[8], prefix[9], prefix[10], prefix[11],
        ]));
        Ok((HEADER_SIZE + high as usize * RECORD_SIZE) as u64)
    }
}

impl PixelTransfer for RawPixelTransfer {
    fn transfer_read(&self, path: &Path, count: usize) -> Result<Vec<u32>> {
        let mut file = File::open(path)?;
        let offset = Self::stream_offset(&mut file)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut bytes = Vec::with_capacity(count * 2);
        file.take((count * 2) as u64).read_to_end(&mut bytes)?;

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| u32::from(u16::from_le_bytes([pair[0], pair[1]])))
            .collect();
        Ok(samples)
    }

    fn transfer_write(&self, path: &Path, _x: usize, _y: usize, samples: &[u16]) -> Result<usize> {
        let file = OpenOptions::new().append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for sample in samples {
            writer.write_all(&sample.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mar345_core::{encode_header, Mar345Header};
    use tempfile::NamedTempFile;

    #[test]
    fn raw_stream_round_trip() {
        let h = Mar345Header {
            x: 2,
            y: 3,
            pixels: 6,
            ..Default::default()
        };
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(encode_header(&h).as_bytes()).unwrap();
        file.flush().unwrap();

        let samples: Vec<u16> = vec![0, 1, 500, 65_535, 2, 3];
        let transfer = RawPixelTransfer;
        let written = transfer
            .transfer_write(file.path(), 2, 3, &samples)
            .unwrap();
        assert_eq!(written, 6);

        let read = transfer.transfer_read(file.path(), 6).unwrap();
        assert_eq!(read, vec![0, 1, 500, 65_535, 2, 3]);
    }

    #[test]
    fn short_stream_reports_fewer_samples() {
        let h = Mar345Header::default();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(encode_header(&h).as_bytes()).unwrap();
        file.flush().unwrap();

        let transfer = RawPixelTransfer;
        transfer.transfer_write(file.path(), 2, 2, &[1, 2]).unwrap();
        // Asking for 4 samples when only 2 exist must not fail, just come
        // up short; the caller turns that into PixelTransferMismatch.
        let read = transfer.transfer_read(file.path(), 4).unwrap();
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let transfer = RawPixelTransfer;
        let err = transfer
            .transfer_read(Path::new("/nonexistent/image.mar2300"), 4)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
