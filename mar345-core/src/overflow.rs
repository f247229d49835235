//! High-intensity overflow encoding.
//!
//! The transferred pixel stream is 16-bit. Pixels above the transfer range
//! are clamped in the grid and stored as (index, value) records between the
//! header and the pixel stream. The record count lives in three places that
//! must agree: the `high` header field, prologue word 2, and the textual
//! HIGH line; [`patch_high_count`] rewrites the latter two in place.

use crate::codec::{keyword_line, line_cell, ByteOrder, RawHeader, HIGH_LINE_OFFSET, LINE_SIZE};
use crate::{Error, Result};
use tracing::debug;

/// Largest value representable in the 16-bit transfer stream.
pub const OVERFLOW_THRESHOLD: u32 = 65_535;

/// Size of one overflow record on disk: two 32-bit integers.
pub const RECORD_SIZE: usize = 8;

/// One pixel whose true value exceeds the transfer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRecord {
    /// Linear index into the row-major pixel grid.
    pub index: u32,
    /// The unclamped pixel value.
    pub value: u32,
}

impl OverflowRecord {
    /// Serializes the record as two little-endian words.
    #[must_use]
    pub fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[..4].copy_from_slice(&self.index.to_le_bytes());
        buf[4..].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    /// Reads a record honoring the container's byte order.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE], order: ByteOrder) -> Self {
        let index = order.decode(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        let value = order.decode(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
        Self { index, value }
    }
}

/// Clamps over-threshold pixels in place and returns their records.
///
/// The grid is scanned in index order, so the record list comes out sorted
/// by ascending index, matching the on-disk storage order.
#[allow(clippy::cast_possible_truncation)]
pub fn extract(grid: &mut [u32], threshold: u32) -> Vec<OverflowRecord> {
    let mut records = Vec::new();
    for (i, value) in grid.iter_mut().enumerate() {
        if *value > threshold {
            records.push(OverflowRecord {
                index: i as u32,
                value: *value,
            });
            *value = threshold;
        }
    }
    if !records.is_empty() {
        debug!(count = records.len(), "pixels above 16-bit range");
    }
    records
}

/// Writes back the true values of previously clamped pixels.
///
/// Exact inverse of [`extract`] for matching threshold and grid length.
///
/// # Errors
/// Returns [`Error::CorruptOverflowRecord`] when a record points outside
/// the grid; the grid is left untouched in that case.
pub fn restore(grid: &mut [u32], records: &[OverflowRecord]) -> Result<()> {
    if let Some(bad) = records.iter().find(|r| r.index as usize >= grid.len()) {
        return Err(Error::CorruptOverflowRecord {
            index: bad.index,
            len: grid.len(),
        });
    }
    for record in records {
        grid[record.index as usize] = record.value;
    }
    Ok(())
}

/// Rewrites the overflow count in the binary prologue (byte offset 8) and
/// the textual HIGH line (byte offset 448) without re-encoding the rest of
/// the header.
#[allow(clippy::cast_possible_wrap)]
pub fn patch_high_count(raw: &mut RawHeader, count: u32) {
    let bytes = raw.as_mut_bytes();
    bytes[8..12].copy_from_slice(&(count as i32).to_le_bytes());
    let cell = line_cell(&keyword_line("HIGH", &count.to_string()));
    bytes[HIGH_LINE_OFFSET..HIGH_LINE_OFFSET + LINE_SIZE].copy_from_slice(&cell);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_header, encode_header};
    use crate::header::Mar345Header;

    #[test]
    fn nine_sample_scenario() {
        let mut grid = vec![10, 70_000, 5, 5, 5, 5, 5, 5, 5];
        let records = extract(&mut grid, OVERFLOW_THRESHOLD);
        assert_eq!(
            records,
            vec![OverflowRecord {
                index: 1,
                value: 70_000
            }]
        );
        assert_eq!(grid, vec![10, 65_535, 5, 5, 5, 5, 5, 5, 5]);

        restore(&mut grid, &records).unwrap();
        assert_eq!(grid[1], 70_000);
    }

    #[test]
    fn no_overflow_yields_no_records() {
        let original = vec![0, 1, 65_535];
        let mut grid = original.clone();
        let records = extract(&mut grid, OVERFLOW_THRESHOLD);
        assert!(records.is_empty());
        assert_eq!(grid, original);
    }

    #[test]
    fn every_pixel_overflowing() {
        let original: Vec<u32> = (0..16).map(|i| 65_536 + i * 1000).collect();
        let mut grid = original.clone();
        let records = extract(&mut grid, OVERFLOW_THRESHOLD);
        assert_eq!(records.len(), grid.len());
        assert!(grid.iter().all(|&v| v == OVERFLOW_THRESHOLD));
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index as usize, i);
            assert_eq!(record.value, original[i]);
        }

        restore(&mut grid, &records).unwrap();
        assert_eq!(grid, original);
    }

    #[test]
    fn extreme_values_survive_round_trip() {
        let mut grid = vec![u32::MAX, 65_536, 7];
        let original = grid.clone();
        let records = extract(&mut grid, OVERFLOW_THRESHOLD);
        assert!(grid.iter().all(|&v| v <= OVERFLOW_THRESHOLD));
        restore(&mut grid, &records).unwrap();
        assert_eq!(grid, original);
    }

    #[test]
    fn out_of_bounds_record_is_rejected() {
        let mut grid = vec![1, 2, 3];
        let records = vec![OverflowRecord {
            index: 3,
            value: 99,
        }];
        let err = restore(&mut grid, &records).unwrap_err();
        assert!(matches!(
            err,
            Error::CorruptOverflowRecord { index: 3, len: 3 }
        ));
        assert_eq!(grid, vec![1, 2, 3]);
    }

    #[test]
    fn record_bytes_round_trip_both_orders() {
        let record = OverflowRecord {
            index: 42,
            value: 100_000,
        };
        let bytes = record.to_bytes();
        assert_eq!(
            OverflowRecord::from_bytes(&bytes, ByteOrder::Native),
            record
        );

        let mut swapped = [0u8; RECORD_SIZE];
        for (dst, src) in swapped.chunks_exact_mut(4).zip(bytes.chunks_exact(4)) {
            dst.copy_from_slice(src);
            dst.reverse();
        }
        assert_eq!(
            OverflowRecord::from_bytes(&swapped, ByteOrder::Swapped),
            record
        );
    }

    #[test]
    fn patch_updates_count_in_both_places() {
        let h = Mar345Header {
            x: 3,
            y: 3,
            pixels: 9,
            ..Default::default()
        };
        let mut raw = encode_header(&h);
        let before = raw.clone();
        patch_high_count(&mut raw, 7);

        let bytes = raw.as_bytes();
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 7);
        assert!(bytes[HIGH_LINE_OFFSET..].starts_with(b"HIGH           7"));
        assert_eq!(bytes[HIGH_LINE_OFFSET + LINE_SIZE - 1], b'\n');

        let (decoded, _) = decode_header(&raw).unwrap();
        assert_eq!(decoded.high, 7);

        // Only the prologue word and the HIGH line changed.
        for (i, (a, b)) in before.as_bytes().iter().zip(bytes).enumerate() {
            let in_word = (8..12).contains(&i);
            let in_line = (HIGH_LINE_OFFSET..HIGH_LINE_OFFSET + LINE_SIZE).contains(&i);
            if !in_word && !in_line {
                assert_eq!(a, b, "byte {i} changed unexpectedly");
            }
        }
    }
}
