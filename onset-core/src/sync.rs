//! # Capture/Playback Synchronizer
//!
//! Keeps the playback cursor within a bounded distance of the live capture
//! position. Capture and playback run on independent clocks and drift apart;
//! once the offset grows past `max_allowed_offset` (or a resync is forced)
//! the cursor is moved back onto the capture position.
//!
//! Audio backends need time to apply each state change, so device switches
//! and resyncs are multi-step sequences that advance by exactly one step
//! per [`Synchronizer::tick`]:
//!
//! ```text
//! switch_device:  teardown (stop, unload, dispose) | start capture
//!                 | poll until samples arrive (bounded) | settle
//!                 | stop | seek | play
//! drift resync:   stop | seek | play
//! ```

use tracing::{debug, info, warn};

use crate::audio::AudioSubsystem;
use crate::error::{OnsetError, Result};

/// Tuning knobs of the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Largest tolerated `|playback - capture|`, in seconds.
    pub max_allowed_offset: f32,
    /// Length of the looping capture clip, in seconds.
    pub capture_duration_s: u32,
    /// Ticks to wait for a new device to produce samples.
    pub max_start_polls: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_allowed_offset: 0.25,
            capture_duration_s: 10,
            max_start_polls: 100,
        }
    }
}

/// Observable synchronizer state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// Tick timestamp at which the current capture was started.
    pub capture_start_timestamp: Option<u64>,
    pub capture_sample_rate: u32,
    /// Playback position minus capture position, in seconds.
    pub current_playback_offset: f32,
    pub max_allowed_offset: f32,
    pub force_resync_requested: bool,
}

/// Step of the in-flight sequence, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    /// Old capture torn down; the new one starts on the next tick.
    AwaitingRelease,
    /// Capture started; waiting for the first samples.
    WaitingForDevice { polls: u32 },
    /// Device is running; the resync starts on the next tick.
    Settling,
    /// Playback stopped; the seek happens on the next tick.
    Stopped { target: f32 },
    /// Playback cursor moved; playback resumes on the next tick.
    Seeked,
}

/// Status reported by [`Synchronizer::tick`].
#[derive(Debug)]
pub enum SyncNotice {
    CaptureStarted { device: String, sample_rate: u32 },
    /// Starting the capture failed outright; the spectrum stays silent.
    CaptureFailed(OnsetError),
    /// The device never produced samples within the polling budget.
    /// Processing continues; a later resync picks the device up once it runs.
    DeviceStartTimeout(OnsetError),
    ResyncStarted { offset: f32 },
    ResyncComplete,
}

/// Outcome of a forgiving device selection.
#[derive(Debug)]
pub struct DeviceSelection {
    pub device: String,
    /// Set when the requested device was missing and the first available
    /// device was used instead.
    pub fallback: Option<OnsetError>,
}

/// Owns the current device selection and drives capture/playback alignment.
#[derive(Debug)]
pub struct Synchronizer {
    settings: SyncSettings,
    state: SyncState,
    phase: SyncPhase,
    device: Option<String>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        let state = SyncState {
            max_allowed_offset: settings.max_allowed_offset,
            ..SyncState::default()
        };
        Self {
            settings,
            state,
            phase: SyncPhase::Idle,
            device: None,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn phase(&self) -> &SyncPhase {
        &self.phase
    }

    /// Currently selected input device.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn set_max_allowed_offset(&mut self, seconds: f32) {
        self.settings.max_allowed_offset = seconds;
        self.state.max_allowed_offset = seconds;
    }

    /// Asks for a resync on the next tick, regardless of the offset. The
    /// flag is consumed by the resync it causes.
    pub fn request_resync(&mut self) {
        self.state.force_resync_requested = true;
    }

    /// Selects `requested`, falling back to the first available device when
    /// it is missing. Only fails when there is no input device at all (or
    /// the fallback device itself is unusable).
    pub fn select_device<A: AudioSubsystem>(&mut self, audio: &mut A, requested: &str) -> Result<DeviceSelection> {
        match self.switch_device(audio, requested) {
            Ok(()) => Ok(DeviceSelection {
                device: requested.to_string(),
                fallback: None,
            }),
            Err(err @ OnsetError::DeviceNotFound(_)) => {
                let first = audio.list_devices().into_iter().next().ok_or(OnsetError::NoInputDevices)?;
                warn!("{}, falling back to '{}'", err, first);
                self.switch_device(audio, &first)?;
                Ok(DeviceSelection {
                    device: first,
                    fallback: Some(err),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Switches to `device`, cancelling any sequence in flight.
    ///
    /// The previous capture (if any) is torn down immediately; the new
    /// capture starts on the next tick. An unknown device or a zero sample
    /// rate is rejected without touching the current state.
    pub fn switch_device<A: AudioSubsystem>(&mut self, audio: &mut A, device: &str) -> Result<()> {
        if !audio.list_devices().iter().any(|name| name == device) {
            return Err(OnsetError::DeviceNotFound(device.to_string()));
        }
        let sample_rate = audio.device_sample_rate(device)?;
        if sample_rate == 0 {
            return Err(OnsetError::InvalidSampleRate(sample_rate));
        }

        if self.phase != SyncPhase::Idle {
            debug!("Cancelling {:?} for device switch", self.phase);
        }
        if audio.has_capture() {
            audio.stop();
            audio.unload_capture();
            audio.dispose_capture();
        }

        info!("Switching input device to '{}' ({} Hz)", device, sample_rate);
        self.device = Some(device.to_string());
        self.state.capture_sample_rate = sample_rate;
        self.state.capture_start_timestamp = None;
        self.state.current_playback_offset = 0.0;
        self.phase = SyncPhase::AwaitingRelease;
        Ok(())
    }

    /// Advances the synchronizer by one tick.
    ///
    /// Runs the next step of an in-flight sequence, then updates the playback
    /// offset (also on ticks that report a notice). Starts a resync when
    /// playback is running and the offset is out of tolerance or a resync
    /// was requested.
    pub fn tick<A: AudioSubsystem>(&mut self, audio: &mut A, now_ms: u64) -> Option<SyncNotice> {
        let device = self.device.clone()?;

        let notice = self.advance(audio, &device, now_ms);

        let capture_seconds = self.capture_seconds(audio, &device);
        if let Some(capture_seconds) = capture_seconds {
            self.state.current_playback_offset = audio.playback_position() - capture_seconds;
        }
        if notice.is_some() {
            return notice;
        }
        let capture_seconds = capture_seconds?;

        let out_of_tolerance = self.state.current_playback_offset.abs() > self.state.max_allowed_offset;
        if self.phase == SyncPhase::Idle
            && audio.is_playing()
            && (self.state.force_resync_requested || out_of_tolerance)
        {
            self.state.force_resync_requested = false;
            info!(
                "Resyncing: playback {:.3}s, capture {:.3}s, offset {:.3}s",
                audio.playback_position(),
                capture_seconds,
                self.state.current_playback_offset
            );
            audio.stop();
            self.phase = SyncPhase::Stopped { target: capture_seconds };
            return Some(SyncNotice::ResyncStarted {
                offset: self.state.current_playback_offset,
            });
        }
        None
    }

    /// Runs the pending step of the current sequence.
    fn advance<A: AudioSubsystem>(&mut self, audio: &mut A, device: &str, now_ms: u64) -> Option<SyncNotice> {
        match self.phase.clone() {
            SyncPhase::Idle => None,
            SyncPhase::AwaitingRelease => {
                let sample_rate = self.state.capture_sample_rate;
                match audio.start_capture(device, true, self.settings.capture_duration_s, sample_rate) {
                    Ok(()) => {
                        self.state.capture_start_timestamp = Some(now_ms);
                        self.phase = SyncPhase::WaitingForDevice { polls: 0 };
                        Some(SyncNotice::CaptureStarted {
                            device: device.to_string(),
                            sample_rate,
                        })
                    }
                    Err(err) => {
                        warn!("Could not start capture on '{}': {}", device, err);
                        self.phase = SyncPhase::Idle;
                        Some(SyncNotice::CaptureFailed(err))
                    }
                }
            }
            SyncPhase::WaitingForDevice { polls } => {
                if audio.capture_position(device).is_some() {
                    debug!("'{}' produced samples after {} polls", device, polls);
                    self.phase = SyncPhase::Settling;
                    None
                } else if polls >= self.settings.max_start_polls {
                    let err = OnsetError::DeviceStartTimeout {
                        device: device.to_string(),
                        attempts: polls,
                    };
                    warn!("{}", err);
                    self.phase = SyncPhase::Settling;
                    Some(SyncNotice::DeviceStartTimeout(err))
                } else {
                    self.phase = SyncPhase::WaitingForDevice { polls: polls + 1 };
                    None
                }
            }
            SyncPhase::Settling => {
                let target = self.capture_seconds(audio, device).unwrap_or(0.0);
                audio.stop();
                self.phase = SyncPhase::Stopped { target };
                None
            }
            SyncPhase::Stopped { target } => {
                audio.seek(target);
                self.phase = SyncPhase::Seeked;
                None
            }
            SyncPhase::Seeked => {
                audio.play();
                self.phase = SyncPhase::Idle;
                Some(SyncNotice::ResyncComplete)
            }
        }
    }

    /// Capture position in seconds, or `None` while the device is silent.
    fn capture_seconds<A: AudioSubsystem>(&self, audio: &mut A, device: &str) -> Option<f32> {
        let sample_rate = self.state.capture_sample_rate;
        if sample_rate == 0 {
            return None;
        }
        audio
            .capture_position(device)
            .map(|samples| samples as f32 / sample_rate as f32)
    }
}
