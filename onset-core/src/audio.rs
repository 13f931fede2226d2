//! # Audio Capture Module
//!
//! The audio subsystem the synchronizer drives: a looping capture clip filled
//! from an input device, and a playback cursor that replays that clip a
//! little behind the live capture. Spectrum frames are taken at the playback
//! cursor, so keeping the two aligned keeps the analysis in real time.
//!
//! ## Features
//! - Device enumeration and lookup by name
//! - f32 capture at the device's sample rate, multichannel down-mixed to mono
//! - Looping clip buffer fed through a crossbeam channel
//! - Wall-clock playback cursor with stop / seek / play

use std::time::Instant;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::{OnsetError, Result};
use crate::fft::{FftWindow, SpectrumAnalyzer, SpectrumSize};

/// Number of captured chunks that may queue up between two ticks.
const CHANNEL_CAPACITY: usize = 256;

/// Capture and playback operations the synchronizer relies on.
///
/// Implementations own the capture resource; nothing outside the
/// synchronizer should call the mutating methods directly.
pub trait AudioSubsystem {
    /// Names of the available input devices.
    fn list_devices(&self) -> Vec<String>;

    /// Native sample rate of an input device, in Hz.
    fn device_sample_rate(&self, device: &str) -> Result<u32>;

    /// Starts capturing `device` into a clip of `duration_s` seconds.
    fn start_capture(&mut self, device: &str, looping: bool, duration_s: u32, sample_rate: u32) -> Result<()>;

    /// Write position of the capture clip, in samples. `None` until the
    /// device has produced its first samples.
    fn capture_position(&mut self, device: &str) -> Option<u64>;

    /// Whether a capture clip currently exists.
    fn has_capture(&self) -> bool;

    /// Playback cursor, in seconds since the start of the clip.
    fn playback_position(&self) -> f32;

    fn is_playing(&self) -> bool;

    fn stop(&mut self);

    fn seek(&mut self, seconds: f32);

    fn play(&mut self);

    /// Drops the captured audio data.
    fn unload_capture(&mut self);

    /// Releases the capture device itself.
    fn dispose_capture(&mut self);
}

/// Produces one spectrum frame per tick.
pub trait SpectrumSource {
    /// Fills `frame` with non-negative magnitudes. The frame length is the
    /// spectrum size; sources must follow it if it changes.
    fn spectrum_tick(&mut self, frame: &mut [f32]);
}

/// Playback cursor over the capture clip, driven by the wall clock.
///
/// Its clock runs independently from the device's sample clock, which is
/// exactly the drift the synchronizer corrects.
#[derive(Debug, Default)]
struct PlaybackCursor {
    playing: bool,
    /// Position at the moment `started` was taken (or the frozen position).
    base: f32,
    started: Option<Instant>,
    clip_len_s: f32,
}

impl PlaybackCursor {
    fn position(&self) -> f32 {
        let elapsed = match (self.playing, self.started) {
            (true, Some(started)) => started.elapsed().as_secs_f32(),
            _ => 0.0,
        };
        self.wrap(self.base + elapsed)
    }

    fn wrap(&self, seconds: f32) -> f32 {
        if self.clip_len_s > 0.0 {
            seconds.rem_euclid(self.clip_len_s)
        } else {
            seconds.max(0.0)
        }
    }

    fn stop(&mut self) {
        self.base = self.position();
        self.playing = false;
        self.started = None;
    }

    fn seek(&mut self, seconds: f32) {
        self.base = self.wrap(seconds);
        if self.playing {
            self.started = Some(Instant::now());
        }
    }

    fn play(&mut self) {
        if !self.playing {
            self.playing = true;
            self.started = Some(Instant::now());
        }
    }
}

/// An open capture: the device stream plus the looping clip it fills.
struct CaptureClip {
    device: String,
    sample_rate: u32,
    looping: bool,
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<f32>>,
    samples: Vec<f32>,
    write_pos: usize,
    received: u64,
}

impl CaptureClip {
    /// Moves every chunk the callback queued into the clip.
    fn pump(&mut self) {
        while let Ok(chunk) = self.receiver.try_recv() {
            self.received += chunk.len() as u64;
            for sample in chunk {
                if self.write_pos >= self.samples.len() {
                    if !self.looping || self.samples.is_empty() {
                        break;
                    }
                    self.write_pos = 0;
                }
                self.samples[self.write_pos] = sample;
                self.write_pos += 1;
            }
        }
        if self.looping && self.write_pos >= self.samples.len() {
            self.write_pos = 0;
        }
    }

    /// Copies the `out.len()` samples that end at `end_seconds` into `out`,
    /// wrapping around the start of the clip.
    fn read_window(&self, end_seconds: f32, out: &mut [f32]) {
        let len = self.samples.len();
        if len == 0 {
            out.fill(0.0);
            return;
        }
        let end = ((end_seconds * self.sample_rate as f32) as usize).min(len);
        let start = (end + len * out.len().div_ceil(len) - out.len()) % len;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[(start + i) % len];
        }
    }
}

/// [`AudioSubsystem`] and [`SpectrumSource`] backed by cpal.
pub struct CpalAudio {
    host: cpal::Host,
    capture: Option<CaptureClip>,
    playback: PlaybackCursor,
    analyzer: SpectrumAnalyzer,
    window_buf: Vec<f32>,
}

impl CpalAudio {
    /// Uses the platform's default audio host.
    pub fn new(window: FftWindow) -> Self {
        Self {
            host: cpal::default_host(),
            capture: None,
            playback: PlaybackCursor::default(),
            analyzer: SpectrumAnalyzer::new(SpectrumSize::default(), window),
            window_buf: Vec::new(),
        }
    }

    fn find_device(&self, name: &str) -> anyhow::Result<cpal::Device> {
        self.host
            .input_devices()?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device '{}' disappeared", name))
    }
}

impl AudioSubsystem for CpalAudio {
    fn list_devices(&self) -> Vec<String> {
        match self.host.input_devices() {
            Ok(devices) => devices.filter_map(|device| device.name().ok()).collect(),
            Err(e) => {
                warn!("Could not enumerate input devices: {}", e);
                Vec::new()
            }
        }
    }

    fn device_sample_rate(&self, device: &str) -> Result<u32> {
        let device = self
            .find_device(device)
            .map_err(|_| OnsetError::DeviceNotFound(device.to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| OnsetError::Audio(e.to_string()))?;
        Ok(config.sample_rate().0)
    }

    fn start_capture(&mut self, device_name: &str, looping: bool, duration_s: u32, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(OnsetError::InvalidSampleRate(sample_rate));
        }
        let device = self.find_device(device_name)?;
        let (sender, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let stream = open_input_stream(&device, sample_rate, sender)?;

        let clip_len = sample_rate as usize * duration_s as usize;
        info!(
            "Capturing '{}' at {} Hz into a {} s clip (loop: {})",
            device_name, sample_rate, duration_s, looping
        );
        self.capture = Some(CaptureClip {
            device: device_name.to_string(),
            sample_rate,
            looping,
            stream: Some(stream),
            receiver,
            samples: vec![0.0; clip_len],
            write_pos: 0,
            received: 0,
        });
        self.playback = PlaybackCursor {
            clip_len_s: duration_s as f32,
            ..PlaybackCursor::default()
        };
        Ok(())
    }

    fn capture_position(&mut self, device: &str) -> Option<u64> {
        let clip = self.capture.as_mut().filter(|clip| clip.device == device)?;
        clip.pump();
        (clip.received > 0).then_some(clip.write_pos as u64)
    }

    fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    fn playback_position(&self) -> f32 {
        self.playback.position()
    }

    fn is_playing(&self) -> bool {
        self.playback.playing
    }

    fn stop(&mut self) {
        self.playback.stop();
    }

    fn seek(&mut self, seconds: f32) {
        self.playback.seek(seconds);
    }

    fn play(&mut self) {
        self.playback.play();
    }

    fn unload_capture(&mut self) {
        if let Some(clip) = self.capture.as_mut() {
            debug!("Unloading capture data for '{}'", clip.device);
            clip.samples = Vec::new();
            clip.write_pos = 0;
        }
    }

    fn dispose_capture(&mut self) {
        if let Some(mut clip) = self.capture.take() {
            if let Some(stream) = clip.stream.take() {
                if let Err(e) = stream.pause() {
                    warn!("Error pausing stream for '{}': {}", clip.device, e);
                }
            }
            debug!("Disposed capture for '{}'", clip.device);
        }
        self.playback = PlaybackCursor::default();
    }
}

impl SpectrumSource for CpalAudio {
    fn spectrum_tick(&mut self, frame: &mut [f32]) {
        let Some(clip) = self.capture.as_mut() else {
            frame.fill(0.0);
            return;
        };
        clip.pump();

        self.window_buf.resize(frame.len() * 2, 0.0);
        clip.read_window(self.playback.position(), &mut self.window_buf);
        self.analyzer.analyze(&self.window_buf, frame);
    }
}

/// Opens and starts an f32 input stream that forwards mono chunks to `sender`.
fn open_input_stream(device: &cpal::Device, sample_rate: u32, sender: Sender<Vec<f32>>) -> anyhow::Result<cpal::Stream> {
    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, sample_rate)
        .ok_or_else(|| anyhow!("No f32 input format supports {} Hz", sample_rate))?;

    let config: cpal::StreamConfig = supported_config.with_sample_rate(cpal::SampleRate(sample_rate)).into();
    let channels = config.channels.max(1) as usize;

    let err_fn = |err: cpal::StreamError| error!("An error occurred on the audio stream: {}", err);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                    .collect()
            };
            // Drop the chunk if the consumer fell behind
            let _ = sender.try_send(mono);
        },
        err_fn,
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

/// Picks an f32 configuration that supports `sample_rate`, preferring the
/// fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_with(samples: Vec<f32>, sample_rate: u32) -> (CaptureClip, Sender<Vec<f32>>) {
        let (sender, receiver) = crossbeam_channel::bounded(8);
        let clip = CaptureClip {
            device: "test".into(),
            sample_rate,
            looping: true,
            stream: None,
            receiver,
            samples,
            write_pos: 0,
            received: 0,
        };
        (clip, sender)
    }

    #[test]
    fn test_pump_wraps_looping_clip() {
        let (mut clip, sender) = clip_with(vec![0.0; 4], 4);
        sender.send(vec![1.0, 2.0, 3.0]).unwrap();
        sender.send(vec![4.0, 5.0]).unwrap();
        clip.pump();
        assert_eq!(clip.samples, vec![5.0, 2.0, 3.0, 4.0]);
        assert_eq!(clip.write_pos, 1);
        assert_eq!(clip.received, 5);
    }

    #[test]
    fn test_pump_stops_when_not_looping() {
        let (mut clip, sender) = clip_with(vec![0.0; 3], 3);
        clip.looping = false;
        sender.send(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        clip.pump();
        assert_eq!(clip.samples, vec![1.0, 2.0, 3.0]);
        assert_eq!(clip.write_pos, 3);
    }

    #[test]
    fn test_read_window_wraps_backwards() {
        let (clip, _sender) = clip_with(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 8);
        let mut out = vec![0.0; 3];
        // 0.25 s at 8 Hz ends at sample 2
        clip.read_window(0.25, &mut out);
        assert_eq!(out, vec![7.0, 0.0, 1.0]);

        clip.read_window(0.75, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_playback_cursor_stop_seek_play() {
        let mut cursor = PlaybackCursor {
            clip_len_s: 10.0,
            ..PlaybackCursor::default()
        };
        assert!(!cursor.playing);
        cursor.seek(12.5);
        assert_eq!(cursor.position(), 2.5);

        cursor.play();
        assert!(cursor.playing);
        assert!(cursor.position() >= 2.5);

        cursor.stop();
        let frozen = cursor.position();
        assert!(!cursor.playing);
        assert_eq!(cursor.position(), frozen);
    }
}
