//! Encoder and decoder for the 4096-byte mar345 header block.
//!
//! The header is a 128-byte binary prologue of 32 little-endian integers
//! followed by 64-byte, newline-terminated text lines. Decoding is
//! best-effort: unknown keywords and unparseable lines are skipped so that
//! headers written by newer or older programs still load.

use crate::header::{ExposureMode, Mar345Header};
use crate::{Error, Result};
use chrono::Utc;
use std::fmt;
use tracing::{trace, warn};

/// Size of the full header block in bytes.
pub const HEADER_SIZE: usize = 4096;
/// Size of the binary integer prologue in bytes.
pub const PROLOGUE_SIZE: usize = 128;
/// Width of one text line in bytes.
pub const LINE_SIZE: usize = 64;
/// Magic number stored in the first prologue word.
pub const MAGIC: u32 = 1234;
/// ASCII signature at byte 128.
pub const SIGNATURE: &[u8] = b"mar research";
/// Byte offset of the HIGH keyword line, rewritable in place.
pub const HIGH_LINE_OFFSET: usize = 448;

/// Detected byte order of a container.
///
/// Decided once per read from the first prologue word; all subsequent
/// 32-bit integer reads must honor it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// File was written with this machine's (little-endian) layout.
    Native,
    /// Every 32-bit integer must be byte-reversed.
    Swapped,
}

impl ByteOrder {
    /// Probes the first prologue word.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMagic`] if the word is not 1234 in either
    /// byte order: the file is not a mar345 container.
    pub fn probe(first_word: u32) -> Result<Self> {
        if first_word == MAGIC {
            Ok(ByteOrder::Native)
        } else if first_word.swap_bytes() == MAGIC {
            Ok(ByteOrder::Swapped)
        } else {
            Err(Error::InvalidMagic { found: first_word })
        }
    }

    /// Applies the byte order to a word read as little-endian.
    #[inline]
    #[must_use]
    pub fn decode(self, word: u32) -> u32 {
        match self {
            ByteOrder::Native => word,
            ByteOrder::Swapped => word.swap_bytes(),
        }
    }
}

/// The verbatim 4096-byte header block.
///
/// Kept around after a read for pass-through writes and debugging even when
/// decoding was only partially successful.
#[derive(Clone, PartialEq, Eq)]
pub struct RawHeader(Box<[u8; HEADER_SIZE]>);

impl RawHeader {
    /// Wraps the first 4096 bytes of `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::TruncatedHeader`] when fewer than 4096 bytes are
    /// available.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::TruncatedHeader {
                len: bytes.len(),
                expected: HEADER_SIZE,
            });
        }
        let mut buf = Box::new([0u8; HEADER_SIZE]);
        buf.copy_from_slice(&bytes[..HEADER_SIZE]);
        Ok(Self(buf))
    }

    /// Returns the header bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// Returns the header bytes mutably, for in-place patching.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}

impl fmt::Debug for RawHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHeader({HEADER_SIZE} bytes)")
    }
}

/// Formats one text line: a 15-column keyword field followed by the value.
pub(crate) fn keyword_line(key: &str, rest: &str) -> String {
    format!("{key:<15}{rest}")
}

/// Renders a line into its fixed 64-byte cell: content, space padding,
/// trailing newline. Content longer than 63 bytes is truncated to keep the
/// line stride intact.
pub(crate) fn line_cell(content: &str) -> [u8; LINE_SIZE] {
    let mut cell = [b' '; LINE_SIZE];
    let src = content.as_bytes();
    let n = src.len().min(LINE_SIZE - 1);
    cell[..n].copy_from_slice(&src[..n]);
    cell[LINE_SIZE - 1] = b'\n';
    cell
}

fn le_word(bytes: &[u8], slot: usize) -> u32 {
    let o = slot * 4;
    u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
}

fn put_word(bytes: &mut [u8], slot: usize, value: i32) {
    bytes[slot * 4..slot * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

/// Encodes a header dictionary into the 4096-byte block.
///
/// Missing information is already present as defaults on the struct, so the
/// result is always a complete, parseable header. Field formats are fixed
/// for interoperability with existing readers; see the format table in the
/// crate docs.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::too_many_lines
)]
pub fn encode_header(h: &Mar345Header) -> RawHeader {
    let mut bytes = Box::new([0u8; HEADER_SIZE]);
    bytes[PROLOGUE_SIZE..].fill(b' ');

    // Prologue: magic, x, high, format id, mode id, pixels, then scaled
    // physical quantities. Slots 16..31 stay zero.
    put_word(&mut bytes[..], 0, MAGIC as i32);
    put_word(&mut bytes[..], 1, h.x as i32);
    put_word(&mut bytes[..], 2, h.high as i32);
    put_word(&mut bytes[..], 3, 1);
    put_word(&mut bytes[..], 4, 1);
    put_word(&mut bytes[..], 5, h.pixels as i32);
    put_word(&mut bytes[..], 6, (h.pixel_size[0] * 1000.0) as i32);
    put_word(&mut bytes[..], 7, (h.pixel_size[1] * 1000.0) as i32);
    put_word(&mut bytes[..], 8, (h.wavelength * 1_000_000.0) as i32);
    put_word(&mut bytes[..], 9, (h.distance * 1000.0) as i32);
    put_word(&mut bytes[..], 10, (h.phi_begin * 1000.0) as i32);
    put_word(&mut bytes[..], 11, (h.phi_end * 1000.0) as i32);
    put_word(&mut bytes[..], 12, (h.ome_begin * 1000.0) as i32);
    put_word(&mut bytes[..], 13, (h.ome_end * 1000.0) as i32);
    put_word(&mut bytes[..], 14, (h.chi * 1000.0) as i32);
    put_word(&mut bytes[..], 15, (h.theta * 1000.0) as i32);

    let date = if h.date.is_empty() {
        Utc::now().format("%a %b %e %H:%M:%S %Y").to_string()
    } else {
        h.date.clone()
    };

    let mut lines: Vec<String> = Vec::with_capacity(32 + h.remarks.len());
    lines.push("mar research".to_string());
    lines.push(keyword_line(
        "PROGRAM",
        &format!("{} Version {}", h.program, h.version),
    ));
    lines.push(keyword_line("DATE", &date));
    lines.push(keyword_line("FORMAT", &format!("{}  PCK {}", h.x, h.pixels)));
    lines.push(keyword_line("SCANNER", &format!("{:03}", h.serial)));
    lines.push(keyword_line("HIGH", &h.high.to_string()));
    lines.push(keyword_line(
        "PIXEL",
        &format!(
            "LENGTH {:.0} HEIGHT {:.0}",
            h.pixel_size[0] * 1000.0,
            h.pixel_size[1] * 1000.0
        ),
    ));
    lines.push(keyword_line(
        "OFFSET",
        &format!("ROFF {} TOFF {}", h.roff, h.toff),
    ));
    let gaps = h
        .gaps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(keyword_line("GAPS", &gaps));
    lines.push(keyword_line(
        "ADC",
        &format!(
            "A {} B {} ADD_A {} ADD_B {}",
            h.adc[0], h.adc[1], h.adc_add[0], h.adc_add[1]
        ),
    ));
    lines.push(keyword_line("MULTIPLIER", &format!("{:.3}", h.multiplier)));
    lines.push(keyword_line("GAIN", &format!("{:.3}", h.gain)));
    lines.push(keyword_line("WAVELENGTH", &format!("{:.6}", h.wavelength)));
    lines.push(keyword_line("DISTANCE", &format!("{:.3}", h.distance)));
    lines.push(keyword_line("RESOLUTION", &format!("{:.3}", h.resolution)));
    lines.push(keyword_line(
        "PHI",
        &format!(
            "START {:.3} END {:.3}  OSC {}",
            h.phi_begin, h.phi_end, h.phi_osc
        ),
    ));
    lines.push(keyword_line(
        "OMEGA",
        &format!(
            "START {:.3} END {:.3}  OSC {}",
            h.ome_begin, h.ome_end, h.ome_osc
        ),
    ));
    lines.push(keyword_line("CHI", &format!("{:.3}", h.chi)));
    lines.push(keyword_line("TWOTHETA", &format!("{:.3}", h.theta)));
    lines.push(keyword_line(
        "CENTER",
        &format!("X {:.3} Y {:.3}", h.center[0], h.center[1]),
    ));
    lines.push(keyword_line("MODE", h.mode.as_str()));
    lines.push(keyword_line(
        "COUNTS",
        &format!(
            "START {:.1} END {:.1} NMEAS {}",
            h.dose_begin, h.dose_end, h.dose_n
        ),
    ));
    lines.push(keyword_line(
        "COUNTS",
        &format!("MIN {} MAX {}", h.dose_min, h.dose_max),
    ));
    lines.push(keyword_line(
        "COUNTS",
        &format!("AVE {:.1} SIG {:.1}", h.dose_avg, h.dose_sig),
    ));
    lines.push(keyword_line(
        "INTENSITY",
        &format!(
            "MIN {} MAX {} AVE {:.1} SIG {:.1}",
            h.value_min, h.value_max, h.value_avg, h.value_sig
        ),
    ));
    lines.push(keyword_line(
        "HISTOGRAM",
        &format!(
            "START {} END {} MAX {}",
            h.hist_begin, h.hist_end, h.hist_max
        ),
    ));
    lines.push(keyword_line(
        "GENERATOR",
        &format!("{} kV {:.1} mA {:.1}", h.source, h.kilovolts, h.milliamps),
    ));
    lines.push(keyword_line(
        "MONOCHROMATOR",
        &format!("{} POLAR {:.1}", h.filter, h.polarization),
    ));
    lines.push(keyword_line(
        "COLLIMATOR",
        &format!("WIDTH {:.1} HEIGHT {:.1}", h.slits[0], h.slits[1]),
    ));

    // The text area holds 62 lines; always leave room for the terminator.
    let max_lines = (HEADER_SIZE - PROLOGUE_SIZE) / LINE_SIZE - 1;
    let room = max_lines.saturating_sub(lines.len());
    if h.remarks.len() > room {
        warn!(
            dropped = h.remarks.len() - room,
            "header full, dropping remarks"
        );
    }
    for remark in h.remarks.iter().take(room) {
        lines.push(keyword_line("REMARK", remark));
    }
    lines.push("END OF HEADER\n".to_string());

    let mut off = PROLOGUE_SIZE;
    for line in &lines {
        bytes[off..off + LINE_SIZE].copy_from_slice(&line_cell(line));
        off += LINE_SIZE;
    }

    RawHeader(bytes)
}

/// Decodes a raw header block into a header dictionary.
///
/// Runs the byte-order probe first, seeds `x`, `high` and `pixels` from the
/// prologue, then scans the keyword lines. Individual lines that fail to
/// parse are skipped; decoding fails only on a bad magic number.
///
/// # Errors
/// Returns [`Error::InvalidMagic`] when the first word is not 1234 in
/// either byte order.
pub fn decode_header(raw: &RawHeader) -> Result<(Mar345Header, ByteOrder)> {
    let bytes = raw.as_bytes();
    let order = ByteOrder::probe(le_word(bytes, 0))?;

    let x = order.decode(le_word(bytes, 1));
    let mut h = Mar345Header {
        x,
        y: x,
        high: order.decode(le_word(bytes, 2)),
        pixels: order.decode(le_word(bytes, 5)),
        ..Mar345Header::default()
    };

    if &bytes[PROLOGUE_SIZE..PROLOGUE_SIZE + SIGNATURE.len()] != SIGNATURE {
        warn!("byte 128 does not start with 'mar research'");
    }

    let mut off = PROLOGUE_SIZE + LINE_SIZE;
    while off + LINE_SIZE <= HEADER_SIZE {
        let cell = &bytes[off..off + LINE_SIZE];
        off += LINE_SIZE;
        if cell.starts_with(b"END OF HEADER") {
            break;
        }
        let Ok(text) = std::str::from_utf8(cell) else {
            continue;
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if apply_line(&mut h, &tokens).is_none() {
            trace!(line = tokens[0], "skipped unparseable header line");
        }
    }

    h.extract_version();
    h.reconcile_dimensions();
    h.normalize_pixel_size();
    Ok((h, order))
}

fn parse_f64(tok: &str) -> Option<f64> {
    tok.parse().ok()
}

fn parse_i32(tok: &str) -> Option<i32> {
    tok.parse().ok()
}

fn parse_u32(tok: &str) -> Option<u32> {
    tok.parse().ok()
}

/// Applies one tokenized keyword line to the header.
///
/// Returns `None` when a required token is missing or fails to parse; the
/// caller then skips the line. Unknown keywords are accepted and ignored
/// for forward compatibility.
#[allow(clippy::too_many_lines)]
fn apply_line(h: &mut Mar345Header, tokens: &[&str]) -> Option<()> {
    let rest = &tokens[1..];
    match tokens[0] {
        "PROGRAM" => h.program = rest.join(" "),
        "DATE" => h.date = rest.join(" "),
        "REMARK" => h.remarks.push(rest.join(" ")),
        "DETECTOR" => h.detector = rest.join(" "),
        "SCANNER" => h.serial = parse_i32(rest.first()?)?,
        "FORMAT" => {
            h.x = parse_u32(rest.first()?)?;
            h.y = h.x;
            for pair in rest.windows(2) {
                if pair[0] == "PCK" || pair[0] == "IMAGE" {
                    h.pixels = parse_u32(pair[1])?;
                }
            }
        }
        "HIGH" => h.high = parse_u32(rest.first()?)?,
        "DISTANCE" => h.distance = parse_f64(rest.first()?)?,
        "WAVELENGTH" => h.wavelength = parse_f64(rest.first()?)?,
        "RESOLUTION" => h.resolution = parse_f64(rest.first()?)?,
        "CHI" => h.chi = parse_f64(rest.first()?)?,
        "TWOTHETA" | "THETA" => h.theta = parse_f64(rest.first()?)?,
        "TIME" => h.time = parse_f64(rest.first()?)?,
        "GAIN" => h.gain = parse_f64(rest.first()?)?,
        "MULTIPLIER" => h.multiplier = parse_f64(rest.first()?)?,
        "POLARIZATION" => h.polarization = parse_f64(rest.first()?)?,
        "PIXEL" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "LENGTH" => h.pixel_size[0] = parse_f64(pair[1])?,
                    "HEIGHT" => h.pixel_size[1] = parse_f64(pair[1])?,
                    _ => {}
                }
            }
        }
        "OFFSET" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "ROFF" => h.roff = parse_f64(pair[1])?,
                    "TOFF" => h.toff = parse_f64(pair[1])?,
                    _ => {}
                }
            }
        }
        "GAPS" => {
            for (slot, tok) in h.gaps.iter_mut().zip(rest) {
                *slot = parse_i32(tok)?;
            }
        }
        "ADC" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "A" => h.adc[0] = parse_i32(pair[1])?,
                    "B" => h.adc[1] = parse_i32(pair[1])?,
                    "ADD_A" => h.adc_add[0] = parse_i32(pair[1])?,
                    "ADD_B" => h.adc_add[1] = parse_i32(pair[1])?,
                    _ => {}
                }
            }
        }
        "CENTER" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "X" => h.center[0] = parse_f64(pair[1])?,
                    "Y" => h.center[1] = parse_f64(pair[1])?,
                    _ => {}
                }
            }
        }
        "PHI" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "START" => h.phi_begin = parse_f64(pair[1])?,
                    "END" => h.phi_end = parse_f64(pair[1])?,
                    "OSC" => h.phi_osc = parse_i32(pair[1])?,
                    _ => {}
                }
            }
        }
        "OMEGA" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "START" => h.ome_begin = parse_f64(pair[1])?,
                    "END" => h.ome_end = parse_f64(pair[1])?,
                    "OSC" => h.ome_osc = parse_i32(pair[1])?,
                    _ => {}
                }
            }
        }
        "MODE" => {
            h.mode = match *rest.first()? {
                "TIME" => ExposureMode::Time,
                "DOSE" => ExposureMode::Dose,
                _ => return None,
            };
        }
        "COUNTS" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "START" => h.dose_begin = parse_f64(pair[1])?,
                    "END" => h.dose_end = parse_f64(pair[1])?,
                    "MIN" => h.dose_min = parse_f64(pair[1])?,
                    "MAX" => h.dose_max = parse_f64(pair[1])?,
                    "AVE" => h.dose_avg = parse_f64(pair[1])?,
                    "SIG" => h.dose_sig = parse_f64(pair[1])?,
                    "NMEAS" => h.dose_n = parse_i32(pair[1])?,
                    _ => {}
                }
            }
        }
        "INTENSITY" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "MIN" => h.value_min = parse_i32(pair[1])?,
                    "MAX" => h.value_max = parse_i32(pair[1])?,
                    "AVE" => h.value_avg = parse_f64(pair[1])?,
                    "SIG" => h.value_sig = parse_f64(pair[1])?,
                    _ => {}
                }
            }
        }
        "HISTOGRAM" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "START" => h.hist_begin = parse_i32(pair[1])?,
                    "END" => h.hist_end = parse_i32(pair[1])?,
                    "MAX" => h.hist_max = parse_i32(pair[1])?,
                    _ => {}
                }
            }
        }
        "GENERATOR" => {
            if let Some(kv) = rest.iter().position(|t| *t == "kV") {
                h.source = rest[..kv].join(" ");
                h.kilovolts = parse_f64(rest.get(kv + 1)?)?;
                if let Some(ma) = rest.iter().position(|t| *t == "mA") {
                    h.milliamps = parse_f64(rest.get(ma + 1)?)?;
                }
            } else {
                h.source = rest.join(" ");
            }
        }
        "MONOCHROMATOR" => {
            if let Some(pol) = rest.iter().position(|t| *t == "POLAR") {
                h.filter = rest[..pol].join(" ");
                h.polarization = parse_f64(rest.get(pol + 1)?)?;
            } else {
                h.filter = rest.join(" ");
            }
        }
        "COLLIMATOR" => {
            for pair in rest.windows(2) {
                match pair[0] {
                    "WIDTH" => h.slits[0] = parse_f64(pair[1])?,
                    "HEIGHT" => h.slits[1] = parse_f64(pair[1])?,
                    _ => {}
                }
            }
        }
        other => {
            trace!(keyword = other, "ignoring unknown header keyword");
        }
    }
    Some(())
}
