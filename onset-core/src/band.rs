//! # Band Module
//!
//! A band (a "note") is a contiguous, inclusive range of spectrum bins with a
//! trigger threshold. Bounds are kept ordered and inside the spectrum at all
//! times: edits that would cross or leave the range are clamped, never
//! rejected.

use crate::error::OnsetError;
use tracing::warn;

/// Ratio applied to the post-trigger minimum when none is configured.
pub const DEFAULT_MIN_RETRIGGER_LEVEL: f32 = 1.2;

/// Configuration of a single detectable note.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// Display label. Not used by the detection logic.
    pub caption: String,
    lower_bound: usize,
    upper_bound: usize,
    /// Energy level above which a rising edge may trigger.
    pub threshold_value: f32,
    /// Ratio (intended `>= 1.0`) over the minimum since the last trigger that
    /// a new rise must exceed to count as a retrigger. Values below 1.0 are
    /// accepted but make the band chatter.
    pub min_retrigger_level: f32,
}

impl Band {
    /// Creates a band with the default retrigger level.
    ///
    /// The bounds are stored as given; they are brought into a valid range
    /// when the band is registered with an engine.
    pub fn new(caption: impl Into<String>, lower_bound: usize, upper_bound: usize, threshold_value: f32) -> Self {
        Self {
            caption: caption.into(),
            lower_bound,
            upper_bound,
            threshold_value,
            min_retrigger_level: DEFAULT_MIN_RETRIGGER_LEVEL,
        }
    }

    pub fn with_retrigger_level(mut self, level: f32) -> Self {
        self.min_retrigger_level = level;
        self
    }

    pub fn lower_bound(&self) -> usize {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> usize {
        self.upper_bound
    }

    /// Number of bins strictly between the two bounds. A band without any
    /// interior bin can never see a valid peak and therefore never fires.
    pub fn interior_bins(&self) -> usize {
        self.upper_bound.saturating_sub(self.lower_bound).saturating_sub(1)
    }

    /// Applies a bound edit, clamping one bound against the other.
    ///
    /// The lower bound is applied first and may not exceed the current upper
    /// bound; the upper bound is applied second and may not drop below the
    /// new lower bound. For example, `[_, 30]` edited to `(50, 10)` becomes
    /// `[30, 30]`.
    pub fn set_bounds(&mut self, new_lower: usize, new_upper: usize, spectrum_len: usize) {
        self.lower_bound = new_lower.min(self.upper_bound);
        self.upper_bound = new_upper.max(self.lower_bound);
        self.clamp_to_spectrum(spectrum_len);
    }

    /// Brings the bounds inside `[0, spectrum_len)` and restores
    /// `lower <= upper`. Returns `true` if anything had to be corrected.
    pub fn clamp_to_spectrum(&mut self, spectrum_len: usize) -> bool {
        let last_bin = spectrum_len.saturating_sub(1);
        let original = (self.lower_bound, self.upper_bound);

        self.upper_bound = self.upper_bound.min(last_bin);
        self.lower_bound = self.lower_bound.min(self.upper_bound);

        let corrected = original != (self.lower_bound, self.upper_bound);
        if corrected {
            let err = OnsetError::InvalidBandBounds {
                lower: original.0,
                upper: original.1,
                len: spectrum_len,
            };
            self.report_correction(&err);
        }
        corrected
    }

    /// Logs a bound correction together with the bounds now in effect.
    pub(crate) fn report_correction(&self, err: &OnsetError) {
        warn!(
            "{} (band '{}'), clamped to [{}, {}]",
            err, self.caption, self.lower_bound, self.upper_bound
        );
    }
}
