//! # Onset Pipeline
//!
//! Wires the synchronizer, a spectrum source and the onset engine into the
//! per-tick data flow: align capture and playback, pull one spectrum frame,
//! then run every band over it.

use tracing::{info, warn};

use crate::audio::{AudioSubsystem, SpectrumSource};
use crate::config::SessionConfig;
use crate::engine::{NoteOnsetEngine, TriggerEvent};
use crate::error::Result;
use crate::fft::SpectrumSize;
use crate::sync::{DeviceSelection, SyncNotice, SyncSettings, Synchronizer};

pub struct OnsetPipeline<A> {
    audio: A,
    sync: Synchronizer,
    engine: NoteOnsetEngine,
    /// Reused spectrum frame; written by the source, then only read.
    frame: Vec<f32>,
    last_notice: Option<SyncNotice>,
}

impl<A: AudioSubsystem + SpectrumSource> OnsetPipeline<A> {
    pub fn new(audio: A, size: SpectrumSize, settings: SyncSettings) -> Self {
        Self {
            audio,
            sync: Synchronizer::new(settings),
            engine: NoteOnsetEngine::new(size.bins()),
            frame: vec![0.0; size.bins()],
            last_notice: None,
        }
    }

    /// Builds a pipeline from a persisted session and selects its device
    /// (or the first available one).
    pub fn from_config(audio: A, config: &SessionConfig, size: SpectrumSize, settings: SyncSettings) -> Result<Self> {
        let mut pipeline = Self::new(audio, size, settings);
        pipeline.engine = NoteOnsetEngine::from_config(config, size.bins());
        let requested = match &config.selected_audio_device {
            Some(device) => device.clone(),
            None => pipeline
                .audio
                .list_devices()
                .into_iter()
                .next()
                .unwrap_or_default(),
        };
        pipeline.select_device(&requested)?;
        Ok(pipeline)
    }

    /// Runs one tick and returns the triggers it produced.
    pub fn tick(&mut self, now_ms: u64) -> Vec<TriggerEvent> {
        if let Some(notice) = self.sync.tick(&mut self.audio, now_ms) {
            match &notice {
                SyncNotice::CaptureFailed(err) | SyncNotice::DeviceStartTimeout(err) => {
                    warn!("Audio degraded: {}", err)
                }
                other => info!("{:?}", other),
            }
            self.last_notice = Some(notice);
        }
        self.audio.spectrum_tick(&mut self.frame);
        self.engine.tick(&self.frame, now_ms)
    }

    pub fn select_device(&mut self, requested: &str) -> Result<DeviceSelection> {
        self.sync.select_device(&mut self.audio, requested)
    }

    pub fn request_resync(&mut self) {
        self.sync.request_resync();
    }

    /// Changes the spectrum size. Band bounds are re-clamped to fit.
    pub fn set_spectrum_size(&mut self, size: SpectrumSize) {
        if size.bins() != self.frame.len() {
            self.frame = vec![0.0; size.bins()];
            self.engine.set_spectrum_len(size.bins());
        }
    }

    /// Session snapshot of the current bands and device.
    pub fn session(&self) -> SessionConfig {
        let mut config = SessionConfig {
            selected_audio_device: self.sync.device().map(str::to_string),
            selected_audio_device_frequency: self.sync.state().capture_sample_rate,
            ..SessionConfig::default()
        };
        self.engine.write_config(&mut config);
        config
    }

    /// The spectrum frame of the last tick.
    pub fn spectrum(&self) -> &[f32] {
        &self.frame
    }

    /// Most recent status reported by the synchronizer.
    pub fn last_notice(&self) -> Option<&SyncNotice> {
        self.last_notice.as_ref()
    }

    pub fn engine(&self) -> &NoteOnsetEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut NoteOnsetEngine {
        &mut self.engine
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }
}
