//! # Note Onset Engine
//!
//! Owns the registered bands and their runtime state, and runs the per-tick
//! detection step: peak validation followed by the trigger state machine,
//! band by band in insertion order.
//!
//! Bands never hold a reference back to whoever consumes their triggers.
//! [`NoteOnsetEngine::tick`] returns the events and the caller dispatches them.

use std::fmt;

use tracing::{debug, info, warn};

use crate::band::{Band, DEFAULT_MIN_RETRIGGER_LEVEL};
use crate::config::{NoteConfig, SessionConfig};
use crate::error::{OnsetError, Result};
use crate::peak::{self, BandReading};
use crate::range::map_range;
use crate::trigger::{BandRuntimeState, NoteState, TriggerInput};

/// Headroom of the level meter over the threshold before any signal is seen.
const METER_HEADROOM: f32 = 1.5;

/// Stable identifier of a registered band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BandId(u64);

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A band entering a triggered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub band_id: BandId,
    pub timestamp_ms: u64,
}

/// Everything the engine tracks for one registered band.
#[derive(Debug, Clone)]
struct BandSlot {
    id: BandId,
    band: Band,
    runtime: BandRuntimeState,
    reading: BandReading,
    /// Largest energy seen so far; the level meter's full-scale value.
    peak_level: f32,
}

impl BandSlot {
    fn new(id: BandId, band: Band) -> Self {
        let peak_level = band.threshold_value * METER_HEADROOM;
        Self {
            id,
            band,
            runtime: BandRuntimeState::new(),
            reading: BandReading::default(),
            peak_level,
        }
    }
}

/// A band without an interior bin can never see a valid peak.
fn warn_if_silent(band: &Band) {
    if band.interior_bins() == 0 {
        warn!(
            "Band '{}' [{}, {}] has no interior bin and will never trigger",
            band.caption,
            band.lower_bound(),
            band.upper_bound()
        );
    }
}

/// The note onset detector.
#[derive(Debug, Clone)]
pub struct NoteOnsetEngine {
    spectrum_len: usize,
    slots: Vec<BandSlot>,
    next_id: u64,
}

impl NoteOnsetEngine {
    /// Creates an empty engine for spectrum frames of `spectrum_len` bins.
    pub fn new(spectrum_len: usize) -> Self {
        Self {
            spectrum_len,
            slots: Vec::new(),
            next_id: 0,
        }
    }

    /// Builds an engine from a persisted session, registering its notes in
    /// order. The session's retrigger level applies to every band.
    pub fn from_config(config: &SessionConfig, spectrum_len: usize) -> Self {
        let mut engine = Self::new(spectrum_len);
        for note in &config.notes {
            let band = note.to_band().with_retrigger_level(config.retrigger_minimum_level);
            engine.register_band(band);
        }
        info!(
            "Loaded {} bands (retrigger level {})",
            engine.len(),
            config.retrigger_minimum_level
        );
        engine
    }

    /// Writes the current bands into `config`, replacing its note list and
    /// retrigger level. Device fields are left alone.
    pub fn write_config(&self, config: &mut SessionConfig) {
        config.notes = self.slots.iter().map(|slot| NoteConfig::from_band(&slot.band)).collect();
        config.retrigger_minimum_level = self
            .slots
            .first()
            .map_or(DEFAULT_MIN_RETRIGGER_LEVEL, |slot| slot.band.min_retrigger_level);
    }

    pub fn spectrum_len(&self) -> usize {
        self.spectrum_len
    }

    /// Changes the expected spectrum length and re-clamps every band into
    /// the new range.
    pub fn set_spectrum_len(&mut self, spectrum_len: usize) {
        if spectrum_len == self.spectrum_len {
            return;
        }
        debug!("Spectrum length {} -> {}", self.spectrum_len, spectrum_len);
        self.spectrum_len = spectrum_len;
        for slot in &mut self.slots {
            if slot.band.clamp_to_spectrum(spectrum_len) {
                slot.runtime.reset();
            }
        }
    }

    /// Registers a band and returns its id. Out-of-range or crossed bounds
    /// are clamped (and logged) rather than rejected.
    pub fn register_band(&mut self, mut band: Band) -> BandId {
        band.clamp_to_spectrum(self.spectrum_len);
        let id = BandId(self.next_id);
        self.next_id += 1;
        debug!(
            "Registered band {} '{}' [{}, {}] threshold {}",
            id,
            band.caption,
            band.lower_bound(),
            band.upper_bound(),
            band.threshold_value
        );
        warn_if_silent(&band);
        self.slots.push(BandSlot::new(id, band));
        id
    }

    /// Removes a band and its runtime state.
    pub fn remove_band(&mut self, id: BandId) -> Result<Band> {
        let index = self.index_of(id)?;
        Ok(self.slots.remove(index).band)
    }

    /// Removes every band.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Edits a band's bounds (see [`Band::set_bounds`] for the clamp order)
    /// and resets its runtime state. Returns the effective bounds.
    pub fn update_bounds(&mut self, id: BandId, lower: usize, upper: usize) -> Result<(usize, usize)> {
        let spectrum_len = self.spectrum_len;
        let slot = self.slot_mut(id)?;
        slot.band.set_bounds(lower, upper, spectrum_len);
        warn_if_silent(&slot.band);
        slot.runtime.reset();
        slot.reading = BandReading::default();
        Ok((slot.band.lower_bound(), slot.band.upper_bound()))
    }

    pub fn set_threshold(&mut self, id: BandId, threshold: f32) -> Result<()> {
        self.slot_mut(id)?.band.threshold_value = threshold;
        Ok(())
    }

    /// Applies one retrigger level to every band.
    pub fn set_min_retrigger_level(&mut self, level: f32) {
        for slot in &mut self.slots {
            slot.band.min_retrigger_level = level;
        }
    }

    /// Runs one detection step over `spectrum`.
    ///
    /// Bands are processed in insertion order and each one only reads the
    /// frame and its own state. The returned events keep that order; an empty
    /// list is the common case.
    pub fn tick(&mut self, spectrum: &[f32], timestamp_ms: u64) -> Vec<TriggerEvent> {
        let mut events = Vec::new();
        for slot in &mut self.slots {
            let reading = peak::validate(spectrum, &slot.band);
            if reading.energy > slot.peak_level {
                slot.peak_level = reading.energy;
            }
            slot.reading = reading;

            let fired = slot.runtime.update(TriggerInput {
                energy: reading.energy,
                interior: reading.interior,
                threshold: slot.band.threshold_value,
                min_retrigger_level: slot.band.min_retrigger_level,
                timestamp_ms,
            });
            if fired {
                debug!("Band {} '{}' triggered at {}ms", slot.id, slot.band.caption, timestamp_ms);
                events.push(TriggerEvent {
                    band_id: slot.id,
                    timestamp_ms,
                });
            }
        }
        events
    }

    /// Validated energy of the band on the last tick.
    pub fn current_energy(&self, id: BandId) -> Result<f32> {
        Ok(self.slot(id)?.reading.energy)
    }

    /// Full peak-validation result of the band on the last tick.
    pub fn current_reading(&self, id: BandId) -> Result<BandReading> {
        Ok(self.slot(id)?.reading)
    }

    pub fn current_state(&self, id: BandId) -> Result<NoteState> {
        Ok(self.slot(id)?.runtime.state)
    }

    pub fn runtime_state(&self, id: BandId) -> Result<&BandRuntimeState> {
        Ok(&self.slot(id)?.runtime)
    }

    pub fn frames_since_triggered(&self, id: BandId) -> Result<u32> {
        Ok(self.slot(id)?.runtime.frames_since_triggered)
    }

    /// Fill level of the band's meter: the current energy mapped from
    /// `[0, peak_level]` onto `[0, 1]`.
    pub fn meter_fill(&self, id: BandId) -> Result<f32> {
        let slot = self.slot(id)?;
        if slot.peak_level <= 0.0 {
            return Ok(0.0);
        }
        Ok(map_range(slot.reading.energy, 0.0, slot.peak_level, 0.0, 1.0))
    }

    pub fn band(&self, id: BandId) -> Result<&Band> {
        Ok(&self.slot(id)?.band)
    }

    /// Registered bands in insertion order.
    pub fn bands(&self) -> impl Iterator<Item = (BandId, &Band)> {
        self.slots.iter().map(|slot| (slot.id, &slot.band))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn index_of(&self, id: BandId) -> Result<usize> {
        self.slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(OnsetError::UnknownBand(id))
    }

    fn slot(&self, id: BandId) -> Result<&BandSlot> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or(OnsetError::UnknownBand(id))
    }

    fn slot_mut(&mut self, id: BandId) -> Result<&mut BandSlot> {
        self.slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(OnsetError::UnknownBand(id))
    }
}
