//! # Error Types
//!
//! Every fallible operation in the core reports an [`OnsetError`]. None of
//! these errors are fatal to the engine: audio problems are recovered by the
//! synchronizer, bad band bounds are clamped, and a degenerate range mapping
//! only fails the single call that produced it.

use crate::engine::BandId;

/// Result type alias for onset-core operations.
pub type Result<T> = std::result::Result<T, OnsetError>;

/// Error type for the note onset engine and its audio plumbing.
#[derive(Debug, thiserror::Error)]
pub enum OnsetError {
    /// The requested input device is not in the enumerated device list.
    #[error("Device not found: '{0}'")]
    DeviceNotFound(String),

    /// The audio host reported no input devices at all.
    #[error("No input devices available")]
    NoInputDevices,

    /// The capture position never became valid within the polling budget.
    #[error("Device '{device}' did not start producing samples after {attempts} polls")]
    DeviceStartTimeout { device: String, attempts: u32 },

    /// A device reported (or a caller supplied) a zero sample rate.
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Band bounds crossed each other or left the spectrum range.
    #[error("Invalid band bounds [{lower}, {upper}] for a spectrum of {len} bins")]
    InvalidBandBounds { lower: usize, upper: usize, len: usize },

    /// A persisted note carried a negative bin index.
    #[error("Negative band bounds [{lower}, {upper}]")]
    NegativeBandBounds { lower: i32, upper: i32 },

    /// A range mapping was requested with identical input endpoints.
    #[error("Degenerate input range: {from} == {to}")]
    InvalidRangeMapping { from: f32, to: f32 },

    /// Spectrum sizes must be a power of two between 128 and 8192.
    #[error("Invalid spectrum size: {0}")]
    InvalidSpectrumSize(usize),

    /// No band is registered under this id.
    #[error("Unknown band: {0}")]
    UnknownBand(BandId),

    /// Failure reported by the audio backend.
    #[error("Audio backend error: {0}")]
    Audio(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<anyhow::Error> for OnsetError {
    fn from(err: anyhow::Error) -> Self {
        OnsetError::Audio(format!("{err:#}"))
    }
}
