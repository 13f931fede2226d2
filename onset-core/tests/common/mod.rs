#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use onset_core::audio::{AudioSubsystem, SpectrumSource};
use onset_core::error::{OnsetError, Result};

pub const SAMPLE_RATE: u32 = 48_000;

/// Calls the synchronizer made on the audio subsystem, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(String),
    Stop,
    Seek(f32),
    Play,
    Unload,
    Dispose,
}

/// In-memory audio subsystem with fully scripted positions.
///
/// Playback does not advance on its own: tests move `playback` and
/// `capture_pos` by hand to create drift.
#[derive(Debug)]
pub struct ScriptedAudio {
    pub devices: Vec<String>,
    pub sample_rates: HashMap<String, u32>,
    pub capture: Option<String>,
    /// Capture position in samples once the device is running.
    pub capture_pos: u64,
    /// Polls that report "not started" after a capture starts.
    pub start_delay_polls: u32,
    pub pending_polls: u32,
    pub playback: f32,
    pub playing: bool,
    pub calls: Vec<Call>,
    pub spectra: VecDeque<Vec<f32>>,
}

impl ScriptedAudio {
    pub fn new(devices: &[&str]) -> Self {
        Self {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            sample_rates: HashMap::new(),
            capture: None,
            capture_pos: 0,
            start_delay_polls: 0,
            pending_polls: 0,
            playback: 0.0,
            playing: false,
            calls: Vec::new(),
            spectra: VecDeque::new(),
        }
    }

    /// Sets the capture to `capture_s` and playback to `capture_s + offset`.
    pub fn set_positions(&mut self, capture_s: f32, offset: f32) {
        self.capture_pos = (capture_s * SAMPLE_RATE as f32) as u64;
        self.playback = capture_s + offset;
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl AudioSubsystem for ScriptedAudio {
    fn list_devices(&self) -> Vec<String> {
        self.devices.clone()
    }

    fn device_sample_rate(&self, device: &str) -> Result<u32> {
        if !self.devices.iter().any(|d| d == device) {
            return Err(OnsetError::DeviceNotFound(device.to_string()));
        }
        Ok(*self.sample_rates.get(device).unwrap_or(&SAMPLE_RATE))
    }

    fn start_capture(&mut self, device: &str, _looping: bool, _duration_s: u32, _sample_rate: u32) -> Result<()> {
        self.calls.push(Call::Start(device.to_string()));
        self.capture = Some(device.to_string());
        self.pending_polls = self.start_delay_polls;
        Ok(())
    }

    fn capture_position(&mut self, device: &str) -> Option<u64> {
        if self.capture.as_deref() != Some(device) {
            return None;
        }
        if self.pending_polls > 0 {
            self.pending_polls -= 1;
            return None;
        }
        Some(self.capture_pos)
    }

    fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    fn playback_position(&self) -> f32 {
        self.playback
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn stop(&mut self) {
        self.calls.push(Call::Stop);
        self.playing = false;
    }

    fn seek(&mut self, seconds: f32) {
        self.calls.push(Call::Seek(seconds));
        self.playback = seconds;
    }

    fn play(&mut self) {
        self.calls.push(Call::Play);
        self.playing = true;
    }

    fn unload_capture(&mut self) {
        self.calls.push(Call::Unload);
    }

    fn dispose_capture(&mut self) {
        self.calls.push(Call::Dispose);
        self.capture = None;
        self.playing = false;
    }
}

impl SpectrumSource for ScriptedAudio {
    fn spectrum_tick(&mut self, frame: &mut [f32]) {
        match self.spectra.pop_front() {
            Some(spectrum) => {
                frame.fill(0.0);
                let n = spectrum.len().min(frame.len());
                frame[..n].copy_from_slice(&spectrum[..n]);
            }
            None => frame.fill(0.0),
        }
    }
}

/// A spectrum of `len` bins whose only energy is `energy` at `bin`.
pub fn spike(len: usize, bin: usize, energy: f32) -> Vec<f32> {
    let mut spectrum = vec![0.0; len];
    spectrum[bin] = energy;
    spectrum
}
