//! # Session Configuration
//!
//! The persisted session: the note layout, the retrigger level and the
//! selected input device. Field names match the JSON written by earlier
//! versions, so existing session files load unchanged.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::band::{Band, DEFAULT_MIN_RETRIGGER_LEVEL};
use crate::error::{OnsetError, Result};

/// Note layout for a 17-key kalimba, measured on an 8192-bin spectrum.
const KALIMBA_SETUP: &str = r#"{"selectedAudioDevice":null,"selectedAudioDeviceFrequency":0,"notes":[
{"caption":"C","lowerBound":85,"upperBound":93,"thresholdValue":0.025245806202292444},
{"caption":"D","lowerBound":95,"upperBound":105,"thresholdValue":0.024791114032268525},
{"caption":"E","lowerBound":107,"upperBound":117,"thresholdValue":0.03157658874988556},
{"caption":"F","lowerBound":118,"upperBound":124,"thresholdValue":0.026818973943591119},
{"caption":"G","lowerBound":128,"upperBound":139,"thresholdValue":0.03247590363025665},
{"caption":"A","lowerBound":146,"upperBound":156,"thresholdValue":0.05438023433089256},
{"caption":"B","lowerBound":164,"upperBound":174,"thresholdValue":0.0694345161318779},
{"caption":"C*","lowerBound":176,"upperBound":185,"thresholdValue":0.06816878169775009},
{"caption":"D*","lowerBound":196,"upperBound":206,"thresholdValue":0.07993388175964356},
{"caption":"E*","lowerBound":222,"upperBound":231,"thresholdValue":0.155356302857399},
{"caption":"F*","lowerBound":233,"upperBound":243,"thresholdValue":0.05957638472318649},
{"caption":"G*","lowerBound":264,"upperBound":275,"thresholdValue":0.10083159804344177},
{"caption":"A*","lowerBound":295,"upperBound":309,"thresholdValue":0.013621526770293713},
{"caption":"B*","lowerBound":331,"upperBound":342,"thresholdValue":0.009923440404236317},
{"caption":"C**","lowerBound":353,"upperBound":365,"thresholdValue":0.015800992026925088},
{"caption":"D**","lowerBound":392,"upperBound":404,"thresholdValue":0.02569706365466118},
{"caption":"E**","lowerBound":451,"upperBound":469,"thresholdValue":0.039687380194664}
]}"#;

fn default_retrigger_level() -> f32 {
    DEFAULT_MIN_RETRIGGER_LEVEL
}

/// Reads an optional value whose key must still be present (as `null` when
/// unset). Plain `Option` fields would silently accept a missing key.
fn required_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// A persisted note. Bounds are signed so that hand-edited files with
/// negative values still load; they are clamped when turned into a [`Band`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteConfig {
    pub caption: String,
    pub lower_bound: i32,
    pub upper_bound: i32,
    pub threshold_value: f32,
}

impl NoteConfig {
    /// Converts to a band, clamping negative bounds to bin 0. The
    /// correction is logged like every other bound correction.
    pub fn to_band(&self) -> Band {
        let band = Band::new(
            self.caption.clone(),
            self.lower_bound.max(0) as usize,
            self.upper_bound.max(0) as usize,
            self.threshold_value,
        );
        if let Some(err) = self.bounds_error() {
            band.report_correction(&err);
        }
        band
    }

    /// The error describing this note's bounds, if any of them is negative.
    pub fn bounds_error(&self) -> Option<OnsetError> {
        (self.lower_bound < 0 || self.upper_bound < 0).then(|| OnsetError::NegativeBandBounds {
            lower: self.lower_bound,
            upper: self.upper_bound,
        })
    }

    pub fn from_band(band: &Band) -> Self {
        Self {
            caption: band.caption.clone(),
            lower_bound: i32::try_from(band.lower_bound()).unwrap_or(i32::MAX),
            upper_bound: i32::try_from(band.upper_bound()).unwrap_or(i32::MAX),
            threshold_value: band.threshold_value,
        }
    }
}

/// The whole persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_retrigger_level")]
    pub retrigger_minimum_level: f32,
    /// `null` selects the first available device.
    #[serde(deserialize_with = "required_option")]
    pub selected_audio_device: Option<String>,
    /// Sample rate the device was last opened with; `0` when unknown.
    pub selected_audio_device_frequency: u32,
    pub notes: Vec<NoteConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retrigger_minimum_level: DEFAULT_MIN_RETRIGGER_LEVEL,
            selected_audio_device: None,
            selected_audio_device_frequency: 0,
            notes: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// The built-in kalimba layout.
    pub fn kalimba_preset() -> Result<Self> {
        Self::from_json(KALIMBA_SETUP)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a session from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        Self::from_json(&data)
    }

    /// Saves the session as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}
