//! # Range Mapping Module
//!
//! Pure numeric helpers for mapping a value from one linear range onto
//! another. Used to place band bounds on screen, to turn a raw band level
//! into a meter fill, and to colorize spectrum magnitudes.

use crate::error::{OnsetError, Result};

/// Number of spectrum bins shown by the default spectrum display.
pub const DEFAULT_DISPLAY_BINS: usize = 512;

/// Maps `value` from `[in_from, in_to]` onto `[out_from, out_to]`.
///
/// No clamping is applied, so values outside the input range extrapolate
/// linearly. Callers must guarantee `in_from != in_to`; a degenerate input
/// range yields `NaN` or an infinity. Use [`try_map_range`] to get an error
/// instead.
pub fn map_range(value: f32, in_from: f32, in_to: f32, out_from: f32, out_to: f32) -> f32 {
    (value - in_from) * (out_to - out_from) / (in_to - in_from) + out_from
}

/// Same as [`map_range`], but rejects a degenerate input range.
///
/// # Returns
/// * `Ok(mapped)` - The mapped value
/// * `Err(OnsetError::InvalidRangeMapping)` - `in_from == in_to`
pub fn try_map_range(value: f32, in_from: f32, in_to: f32, out_from: f32, out_to: f32) -> Result<f32> {
    if in_from == in_to {
        return Err(OnsetError::InvalidRangeMapping { from: in_from, to: in_to });
    }
    Ok(map_range(value, in_from, in_to, out_from, out_to))
}

/// Returns the horizontal center of a band, in pixels, for a display that
/// shows `display_bins` spectrum bins across `width` pixels.
///
/// This is where a band's threshold control gets anchored.
pub fn band_center(lower: usize, upper: usize, display_bins: usize, width: f32) -> f32 {
    let bins = display_bins.max(1) as f32;
    let lower_pos = map_range(lower as f32, 0.0, bins, 0.0, width);
    let upper_pos = map_range(upper as f32, 0.0, bins, 0.0, width);
    lower_pos + (upper_pos - lower_pos) / 2.0
}

/// Maps a spectrum magnitude to an RGB color for the spectrum display.
///
/// The input is clamped to `[0, 0.02]`. The lower half fades from black to
/// green and the upper half from green to red.
pub fn level_to_color(value: f32) -> [f32; 3] {
    const MID: f32 = 0.01;
    const MAX: f32 = 0.02;

    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, MAX) };
    if value <= MID {
        let t = map_range(value, 0.0, MID, 0.0, 1.0);
        [0.0, t, 0.0]
    } else {
        let t = map_range(value, MID, MAX, 0.0, 1.0);
        [t, 1.0 - t, 0.0]
    }
}
