//! The mar345 header dictionary.
//!
//! Every field stored in the 4096-byte header has a hard-coded default so
//! that a partially specified header always encodes to a complete,
//! parseable block. Angles are in degrees, distances in millimetres,
//! wavelength in Angstrom, pixel sizes in millimetres once normalized.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detector widths (pixels) scanned with 0.15 mm pixels; everything else
/// defaults to 0.10 mm.
pub const COARSE_SCAN_WIDTHS: [u32; 4] = [1200, 1600, 2000, 2300];

/// Exposure mode recorded in the MODE header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExposureMode {
    /// Exposure terminated after a fixed time.
    #[default]
    Time,
    /// Exposure terminated after a fixed dose.
    Dose,
}

impl ExposureMode {
    /// Keyword token used in the header text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExposureMode::Time => "TIME",
            ExposureMode::Dose => "DOSE",
        }
    }
}

/// In-memory representation of a mar345 image header.
///
/// Field names follow the keyword lines of the on-disk format. `x` may
/// differ from `y` on non-square detectors; `pixels == x * y` holds after
/// [`Mar345Header::reconcile_dimensions`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mar345Header {
    /// Name of the program that wrote the image.
    pub program: String,
    /// Version of the writing program.
    pub version: String,
    /// Scanner serial number (SCANNER line).
    pub serial: i32,
    /// Acquisition date; encoded as UTC ctime when left empty.
    pub date: String,
    /// Detector model name.
    pub detector: String,

    /// Image width in pixels.
    pub x: u32,
    /// Image height in pixels.
    pub y: u32,
    /// Total pixel count.
    pub pixels: u32,
    /// Number of pixels above the 16-bit transfer range.
    pub high: u32,

    /// ADC offsets for channels A and B.
    pub adc: [i32; 2],
    /// Additive ADC corrections for channels A and B.
    pub adc_add: [i32; 2],
    /// Up to eight detector gap positions.
    pub gaps: [i32; 8],
    /// Pixel size in mm (x, y).
    pub pixel_size: [f64; 2],
    /// Beam center in pixels (x, y).
    pub center: [f64; 2],
    /// Radial offset.
    pub roff: f64,
    /// Tangential offset.
    pub toff: f64,
    /// Detector gain.
    pub gain: f64,
    /// Intensity multiplier.
    pub multiplier: f64,

    /// Exposure mode (time or dose controlled).
    pub mode: ExposureMode,
    /// Exposure time in seconds.
    pub time: f64,
    /// Number of dose measurements.
    pub dose_n: i32,
    /// Dose reading at exposure start.
    pub dose_begin: f64,
    /// Dose reading at exposure end.
    pub dose_end: f64,
    /// Minimum dose reading.
    pub dose_min: f64,
    /// Maximum dose reading.
    pub dose_max: f64,
    /// Mean dose reading.
    pub dose_avg: f64,
    /// Standard deviation of dose readings.
    pub dose_sig: f64,

    /// Wavelength in Angstrom.
    pub wavelength: f64,
    /// Crystal-to-detector distance in mm.
    pub distance: f64,
    /// Resolution limit in Angstrom.
    pub resolution: f64,
    /// Phi at exposure start, degrees.
    pub phi_begin: f64,
    /// Phi at exposure end, degrees.
    pub phi_end: f64,
    /// Number of phi oscillations.
    pub phi_osc: i32,
    /// Omega at exposure start, degrees.
    pub ome_begin: f64,
    /// Omega at exposure end, degrees.
    pub ome_end: f64,
    /// Number of omega oscillations.
    pub ome_osc: i32,
    /// Two-theta angle, degrees.
    pub theta: f64,
    /// Chi angle, degrees.
    pub chi: f64,

    /// X-ray source description (GENERATOR line).
    pub source: String,
    /// Generator voltage in kV.
    pub kilovolts: f64,
    /// Generator current in mA.
    pub milliamps: f64,

    /// Monochromator / filter description.
    pub filter: String,
    /// Beam polarization factor.
    pub polarization: f64,
    /// Collimator slit width and height in mm.
    pub slits: [f64; 2],

    /// Minimum pixel value.
    pub value_min: i32,
    /// Maximum pixel value.
    pub value_max: i32,
    /// Mean pixel value.
    pub value_avg: f64,
    /// Standard deviation of pixel values.
    pub value_sig: f64,
    /// First bin of the intensity histogram.
    pub hist_begin: i32,
    /// Last bin of the intensity histogram.
    pub hist_end: i32,
    /// Peak bin of the intensity histogram.
    pub hist_max: i32,

    /// Free-form remark lines, in storage order.
    pub remarks: Vec<String>,
}

impl Default for Mar345Header {
    fn default() -> Self {
        Self {
            program: "xxx".to_string(),
            version: "x.x".to_string(),
            serial: 0,
            date: String::new(),
            detector: "mar345".to_string(),
            x: 0,
            y: 0,
            pixels: 0,
            high: 0,
            adc: [0, 0],
            adc_add: [0, 0],
            gaps: [0; 8],
            pixel_size: [0.15, 0.15],
            center: [0.0, 0.0],
            roff: 0.0,
            toff: 0.0,
            gain: 0.0,
            multiplier: 0.0,
            mode: ExposureMode::Time,
            time: 0.0,
            dose_n: 0,
            dose_begin: 0.0,
            dose_end: 0.0,
            dose_min: 0.0,
            dose_max: 0.0,
            dose_avg: 0.0,
            dose_sig: 0.0,
            wavelength: 1.541_789,
            distance: 100.0,
            resolution: 0.0,
            phi_begin: 0.0,
            phi_end: 0.0,
            phi_osc: 1,
            ome_begin: 0.0,
            ome_end: 0.0,
            ome_osc: 0,
            theta: 0.0,
            chi: 0.0,
            source: "Rotating_anode".to_string(),
            kilovolts: 50.0,
            milliamps: 40.0,
            filter: "Mirrors".to_string(),
            polarization: 0.0,
            slits: [0.0, 0.0],
            value_min: 0,
            value_max: 0,
            value_avg: 0.0,
            value_sig: 0.0,
            hist_begin: 0,
            hist_end: 0,
            hist_max: 0,
            remarks: Vec::new(),
        }
    }
}

impl Mar345Header {
    /// Creates a header with all fields at their documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repairs mutually inconsistent `x`, `y` and `pixels`.
    ///
    /// If `x` and `y` are both zero but `pixels` is known, the image is
    /// assumed square. Otherwise `x` is authoritative and `y` is recomputed
    /// by integer division; when `pixels` is not divisible by `x` the
    /// remainder pixels are dropped, matching existing readers.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn reconcile_dimensions(&mut self) {
        if self.x == 0 && self.y == 0 && self.pixels > 0 {
            let side = f64::from(self.pixels).sqrt().floor() as u32;
            self.x = side;
            self.y = side;
        } else if self.x > 0
            && self.pixels > 0
            && u64::from(self.x) * u64::from(self.y) != u64::from(self.pixels)
        {
            self.y = self.pixels / self.x;
        }
    }

    /// Normalizes the pixel size to millimetres and fills in defaults.
    ///
    /// A non-positive x size becomes 0.15 mm for the canonical coarse scan
    /// widths and 0.10 mm otherwise; the y size inherits the x size; any
    /// value above 1.0 is taken to be micrometres and divided by 1000.
    pub fn normalize_pixel_size(&mut self) {
        if self.pixel_size[0] <= 0.0 {
            self.pixel_size[0] = if COARSE_SCAN_WIDTHS.contains(&self.x) {
                150.0
            } else {
                100.0
            };
        }
        if self.pixel_size[1] <= 0.0 {
            self.pixel_size[1] = self.pixel_size[0];
        }
        for size in &mut self.pixel_size {
            if *size > 1.0 {
                *size /= 1000.0;
            }
        }
    }

    /// Splits a trailing `Version <v>` suffix out of the program field.
    pub fn extract_version(&mut self) {
        if let Some(pos) = self.program.find(" Version ") {
            self.version = self.program[pos + " Version ".len()..].to_string();
            self.program.truncate(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_h345_table() {
        let h = Mar345Header::default();
        assert_eq!(h.detector, "mar345");
        assert_eq!(h.pixel_size, [0.15, 0.15]);
        assert_eq!(h.wavelength, 1.541_789);
        assert_eq!(h.distance, 100.0);
        assert_eq!(h.phi_osc, 1);
        assert_eq!(h.ome_osc, 0);
        assert_eq!(h.source, "Rotating_anode");
        assert_eq!(h.filter, "Mirrors");
        assert!(h.remarks.is_empty());
    }

    #[test]
    fn square_reconciliation_from_pixel_count() {
        let mut h = Mar345Header {
            pixels: 1_440_000,
            ..Default::default()
        };
        h.reconcile_dimensions();
        assert_eq!((h.x, h.y), (1200, 1200));
    }

    #[test]
    fn non_square_reconciliation_keeps_x_authoritative() {
        let mut h = Mar345Header {
            x: 1200,
            y: 1200,
            pixels: 1200 * 1500,
            ..Default::default()
        };
        h.reconcile_dimensions();
        assert_eq!((h.x, h.y), (1200, 1500));
    }

    #[test]
    fn lossy_division_drops_remainder_pixels() {
        // 1000 is not divisible by 300; the original reader truncates and
        // so do we.
        let mut h = Mar345Header {
            x: 300,
            y: 1,
            pixels: 1000,
            ..Default::default()
        };
        h.reconcile_dimensions();
        assert_eq!(h.y, 3);
        assert_ne!(h.x * h.y, h.pixels);
    }

    #[test]
    fn huge_claimed_dimensions_reconcile_without_overflow() {
        // x * y does not fit in u32; the consistency check must not wrap
        // or panic before x gets a chance to repair y.
        let mut h = Mar345Header {
            x: 100_000,
            y: 100_000,
            pixels: 1000,
            ..Default::default()
        };
        h.reconcile_dimensions();
        assert_eq!((h.x, h.y), (100_000, 0));
    }

    #[test]
    fn pixel_size_defaults_by_detector_width() {
        let mut h = Mar345Header {
            x: 1600,
            pixel_size: [0.0, 0.0],
            ..Default::default()
        };
        h.normalize_pixel_size();
        assert_eq!(h.pixel_size, [0.15, 0.15]);

        let mut h = Mar345Header {
            x: 2400,
            pixel_size: [0.0, 0.0],
            ..Default::default()
        };
        h.normalize_pixel_size();
        assert_eq!(h.pixel_size, [0.1, 0.1]);
    }

    #[test]
    fn micrometre_pixel_size_converted_to_mm() {
        let mut h = Mar345Header {
            pixel_size: [150.0, 150.0],
            ..Default::default()
        };
        h.normalize_pixel_size();
        assert_eq!(h.pixel_size, [0.15, 0.15]);
    }

    #[test]
    fn version_suffix_split_from_program() {
        let mut h = Mar345Header {
            program: "mar345 Version 2.1".to_string(),
            ..Default::default()
        };
        h.extract_version();
        assert_eq!(h.program, "mar345");
        assert_eq!(h.version, "2.1");
    }
}
