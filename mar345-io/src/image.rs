//! Full-container read/write orchestration.

use crate::reader::MappedContainer;
use crate::transfer::PixelTransfer;
use crate::{Error, Result};
use mar345_core::{
    decode_header, encode_header, extract, patch_high_count, restore, Mar345Header, RawHeader,
    OVERFLOW_THRESHOLD,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Where the header for a write comes from.
///
/// Resolved once at the start of [`Mar345Image::write`].
#[derive(Debug, Clone)]
pub enum HeaderSource {
    /// Build a header from the documented defaults and the grid dimensions.
    Defaults,
    /// Encode the given header dictionary.
    FromHeader(Mar345Header),
    /// Reuse a verbatim 4096-byte header, e.g. from a previously read
    /// container. Dimensions are taken from its prologue, never from a
    /// square-root guess.
    FromRawBytes(RawHeader),
}

/// Lifecycle of a container image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageState {
    /// Nothing loaded or built yet.
    #[default]
    Empty,
    /// Header decoded, pixel data not yet transferred.
    HeaderLoaded,
    /// Header and pixel data loaded from disk.
    DataLoaded,
    /// Header encoded and written, pixel data not yet transferred.
    HeaderBuilt,
    /// Header, overflow records and pixel data written.
    DataWritten,
    /// A fatal error occurred; fields hold safe defaults.
    Failed,
}

/// A mar345 image with its header, raw header bytes and pixel grid.
///
/// Owns all of its data; independent instances can process different files
/// concurrently without synchronization.
#[derive(Debug, Default)]
pub struct Mar345Image {
    /// Image width in pixels.
    pub x: u32,
    /// Image height in pixels.
    pub y: u32,
    /// Total pixel count.
    pub pixels: u32,
    /// Number of overflow records.
    pub high: u32,
    /// Decoded header dictionary.
    pub header: Mar345Header,
    /// Verbatim header bytes from the last read or write.
    pub raw_header: Option<RawHeader>,
    /// Row-major pixel grid with overflow values restored.
    pub data: Vec<u32>,
    /// Whether the last operation completed fully.
    pub success: bool,
    state: ImageState,
}

impl Mar345Image {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ImageState {
        self.state
    }

    /// Reads a full container: header, overflow records, pixel data.
    ///
    /// On any failure the image is left in the `Failed` state with safe
    /// defaults (`x = y = 1`, empty grid) and the error is returned.
    ///
    /// # Errors
    /// `InvalidMagic` / `TruncatedHeader` for a malformed header, I/O
    /// errors for unreadable files, `PixelTransferMismatch` when the
    /// collaborator comes up short, `CorruptOverflowRecord` for records
    /// pointing outside the grid.
    pub fn read<P, T>(&mut self, path: P, transfer: &T) -> Result<()>
    where
        P: AsRef<Path>,
        T: PixelTransfer,
    {
        self.read_inner(path.as_ref(), transfer)
            .inspect_err(|_| self.fail())
    }

    /// Reads and decodes only the header, keeping the verbatim raw bytes.
    ///
    /// # Errors
    /// Same header-level failures as [`Mar345Image::read`].
    pub fn read_header<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.read_header_inner(path.as_ref())
            .inspect_err(|_| self.fail())
    }

    /// Writes a full container under `path`.
    ///
    /// The header source is resolved first; overflow pixels are extracted
    /// and clamped; header bytes and records are written and the clamped
    /// grid is handed to the collaborator. Success requires the
    /// collaborator to report exactly `x * y` samples written.
    ///
    /// # Errors
    /// I/O errors, header decode errors for `FromRawBytes` input, and
    /// `PixelTransferMismatch`.
    pub fn write<P, T>(
        &mut self,
        path: P,
        data: &[u32],
        source: HeaderSource,
        transfer: &T,
    ) -> Result<()>
    where
        P: AsRef<Path>,
        T: PixelTransfer,
    {
        self.write_inner(path.as_ref(), data, source, transfer)
            .inspect_err(|_| self.fail())
    }

    /// Writes only the 4096-byte header block.
    ///
    /// # Errors
    /// I/O errors and header decode errors for `FromRawBytes` input.
    pub fn write_header_only<P: AsRef<Path>>(
        &mut self,
        path: P,
        source: HeaderSource,
    ) -> Result<()> {
        let result = (|| {
            let (header, raw) = self.resolve_header(source, 0)?;
            let mut file = File::create(path.as_ref())?;
            file.write_all(raw.as_bytes())?;
            self.adopt(header, raw);
            self.state = ImageState::HeaderBuilt;
            self.success = true;
            Ok(())
        })();
        result.inspect_err(|_| self.fail())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_inner(&mut self, path: &Path, transfer: &impl PixelTransfer) -> Result<()> {
        let container = MappedContainer::open(path)?;
        let raw = container.raw_header()?;
        let (header, order) = decode_header(&raw)?;
        debug!(
            x = header.x,
            y = header.y,
            high = header.high,
            ?order,
            "decoded container header"
        );
        self.adopt(header, raw);
        self.state = ImageState::HeaderLoaded;

        let records = container.overflow_records(self.high as usize, order)?;
        drop(container);

        let expected = (u64::from(self.x) * u64::from(self.y)) as usize;
        let mut grid = transfer.transfer_read(path, expected)?;
        if grid.len() != expected {
            return Err(Error::PixelTransferMismatch {
                expected,
                actual: grid.len(),
            });
        }
        restore(&mut grid, &records)?;

        self.data = grid;
        self.state = ImageState::DataLoaded;
        self.success = true;
        Ok(())
    }

    fn read_header_inner(&mut self, path: &Path) -> Result<()> {
        let container = MappedContainer::open(path)?;
        let raw = container.raw_header()?;
        let (header, _) = decode_header(&raw)?;
        self.adopt(header, raw);
        self.state = ImageState::HeaderLoaded;
        self.success = true;
        Ok(())
    }

    fn write_inner(
        &mut self,
        path: &Path,
        data: &[u32],
        source: HeaderSource,
        transfer: &impl PixelTransfer,
    ) -> Result<()> {
        let (mut header, mut raw) = self.resolve_header(source, data.len())?;

        let mut grid = data.to_vec();
        let records = extract(&mut grid, OVERFLOW_THRESHOLD);
        let count = u32::try_from(records.len()).unwrap_or(u32::MAX);
        header.high = count;
        patch_high_count(&mut raw, count);
        debug!(
            x = header.x,
            y = header.y,
            high = count,
            "writing container"
        );

        {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(raw.as_bytes())?;
            for record in &records {
                writer.write_all(&record.to_bytes())?;
            }
            writer.flush()?;
        } // the collaborator reopens the file by name

        #[allow(clippy::cast_possible_truncation)]
        let expected = (u64::from(header.x) * u64::from(header.y)) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let clamped: Vec<u16> = grid.iter().map(|&v| v as u16).collect();

        self.adopt(header, raw);
        self.data = data.to_vec();
        self.state = ImageState::HeaderBuilt;

        let written =
            transfer.transfer_write(path, self.x as usize, self.y as usize, &clamped)?;
        if written != expected {
            return Err(Error::PixelTransferMismatch {
                expected,
                actual: written,
            });
        }

        self.state = ImageState::DataWritten;
        self.success = true;
        Ok(())
    }

    /// Resolves the three accepted header shapes into a dictionary plus
    /// encoded raw bytes. `grid_len` fills in unknown dimensions; a square
    /// image is assumed only when the header itself carries none.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn resolve_header(
        &self,
        source: HeaderSource,
        grid_len: usize,
    ) -> Result<(Mar345Header, RawHeader)> {
        match source {
            HeaderSource::FromRawBytes(raw) => {
                let (mut header, order) = decode_header(&raw)?;
                // The stored geometry is authoritative for pass-through
                // headers: width from prologue word 1, pixel count from
                // word 5, height by division. No square-image guess.
                let bytes = raw.as_bytes();
                let word = |slot: usize| {
                    let o = slot * 4;
                    order.decode(u32::from_le_bytes([
                        bytes[o],
                        bytes[o + 1],
                        bytes[o + 2],
                        bytes[o + 3],
                    ]))
                };
                let x = word(1);
                let pixels = word(5);
                header.x = x;
                header.pixels = pixels;
                header.y = if x > 0 { pixels / x } else { 0 };
                Ok((header, raw))
            }
            HeaderSource::Defaults | HeaderSource::FromHeader(_) => {
                let mut header = match source {
                    HeaderSource::FromHeader(h) => h,
                    _ => Mar345Header::default(),
                };
                if header.x == 0 && header.y == 0 && grid_len > 0 {
                    let side = (grid_len as f64).sqrt().floor() as u32;
                    header.x = side;
                    header.y = side;
                }
                if header.y == 0 {
                    header.y = header.x;
                }
                if header.pixels == 0 {
                    header.pixels = header.x.saturating_mul(header.y);
                }
                let raw = encode_header(&header);
                Ok((header, raw))
            }
        }
    }

    fn adopt(&mut self, header: Mar345Header, raw: RawHeader) {
        self.x = header.x;
        self.y = header.y;
        self.pixels = header.pixels;
        self.high = header.high;
        self.header = header;
        self.raw_header = Some(raw);
    }

    fn fail(&mut self) {
        self.x = 1;
        self.y = 1;
        self.pixels = 0;
        self.high = 0;
        self.data.clear();
        self.success = false;
        self.state = ImageState::Failed;
    }
}
