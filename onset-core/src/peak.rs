//! # Band Peak Validation
//!
//! Converts a spectrum frame plus a band's bin range into a single energy
//! value. Energy is only passed on when the band's loudest bin sits strictly
//! inside the band; a peak on a boundary bin is almost always leakage from a
//! neighbouring note and is discarded.

use crate::band::Band;

/// Result of validating one band against one spectrum frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandReading {
    /// Energy passed downstream: the accumulated sum for an interior peak,
    /// `0.0` otherwise.
    pub energy: f32,
    /// Sum of all magnitudes in the band, regardless of peak position.
    pub accumulated: f32,
    /// Bin holding the largest magnitude (first one wins on ties).
    pub peak_bin: usize,
    pub peak_value: f32,
    /// Whether `lower < peak_bin < upper` held.
    pub interior: bool,
}

/// Validates the inclusive bin range `[lower, upper]` of `spectrum`.
///
/// Bands narrower than three bins (`upper - lower < 2`) have no interior bin
/// and always report `0.0` energy. Bounds reaching past the end of the frame
/// are cut at the last bin; the function never indexes out of bounds.
pub fn validate_band(spectrum: &[f32], lower: usize, upper: usize) -> BandReading {
    let Some(last_bin) = spectrum.len().checked_sub(1) else {
        return BandReading::default();
    };
    let upper = upper.min(last_bin);
    if lower > upper {
        return BandReading::default();
    }

    let mut accumulated = 0.0;
    let mut peak_bin = lower;
    let mut peak_value = spectrum[lower];
    for (offset, &magnitude) in spectrum[lower..=upper].iter().enumerate() {
        accumulated += magnitude;
        if magnitude > peak_value {
            peak_value = magnitude;
            peak_bin = lower + offset;
        }
    }

    let interior = lower < peak_bin && peak_bin < upper;
    BandReading {
        energy: if interior { accumulated } else { 0.0 },
        accumulated,
        peak_bin,
        peak_value,
        interior,
    }
}

/// Convenience wrapper around [`validate_band`] for a registered band.
pub fn validate(spectrum: &[f32], band: &Band) -> BandReading {
    validate_band(spectrum, band.lower_bound(), band.upper_bound())
}
