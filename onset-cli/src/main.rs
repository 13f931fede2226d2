//! # Onset - Headless Note Onset Runner
//!
//! Wires a real input device through the onset core and prints every
//! detected note as it happens.
//!
//! ## Architecture
//! - **Processing Thread**: owns the cpal capture and runs the pipeline tick loop
//! - **Main Thread**: prints triggers and keeps the session transcript; Ctrl+C
//!   ends the loop and the transcript and session are still written
//! - **Communication**: Crossbeam channel carrying `(caption, timestamp)` pairs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use crossbeam_channel::Sender;
use onset_core::audio::{AudioSubsystem, CpalAudio};
use onset_core::fft::{FftWindow, SpectrumSize};
use onset_core::sink::TriggerLog;
use onset_core::sync::SyncSettings;
use onset_core::{OnsetPipeline, SessionConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One processing tick, roughly a display frame at 60 Hz.
const TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "onset", version, about = "Real-time note onset detection from a live input device")]
struct Cli {
    /// Print the available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Input device name (overrides the session file)
    #[arg(short, long)]
    device: Option<String>,

    /// Session file with the note layout
    #[arg(short, long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in note layout
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Spectrum size in bins (power of two, 128 to 8192)
    #[arg(long, default_value_t = 8192)]
    spectrum_size: usize,

    /// Analysis window applied before the FFT
    #[arg(long, value_enum, default_value_t = WindowArg::BlackmanHarris)]
    window: WindowArg,

    /// Largest tolerated capture/playback offset in seconds
    #[arg(long, default_value_t = 0.25)]
    max_offset: f32,

    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(long)]
    duration: Option<u64>,

    /// Write the final session (bands and device) to this file on exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Kalimba,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WindowArg {
    Rectangular,
    Triangle,
    Hamming,
    Hanning,
    Blackman,
    BlackmanHarris,
}

impl From<WindowArg> for FftWindow {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::Rectangular => FftWindow::Rectangular,
            WindowArg::Triangle => FftWindow::Triangle,
            WindowArg::Hamming => FftWindow::Hamming,
            WindowArg::Hanning => FftWindow::Hanning,
            WindowArg::Blackman => FftWindow::Blackman,
            WindowArg::BlackmanHarris => FftWindow::BlackmanHarris,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let audio = CpalAudio::new(cli.window.into());
        let devices = audio.list_devices();
        if devices.is_empty() {
            println!("No input devices found");
        }
        for (i, name) in devices.iter().enumerate() {
            println!("{:>2}: {}", i, name);
        }
        return Ok(());
    }

    let mut session = load_session(&cli)?;
    if let Some(device) = &cli.device {
        session.selected_audio_device = Some(device.clone());
    }
    if session.notes.is_empty() {
        warn!("Session has no notes; nothing will trigger (try --preset kalimba)");
    }

    let size = SpectrumSize::try_from(cli.spectrum_size)?;
    let settings = SyncSettings {
        max_allowed_offset: cli.max_offset,
        ..SyncSettings::default()
    };
    let run_for = cli.duration.map(Duration::from_secs);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, finishing session");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Could not install Ctrl+C handler")?;
    }

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let processing =
        spawn_processing_thread(session, size, cli.window.into(), settings, run_for, shutdown, event_tx)?;

    // Ends once the processing thread drops its sender
    let mut log = TriggerLog::new();
    for (caption, timestamp_ms) in event_rx {
        println!("{:>9} ms  {}", timestamp_ms, caption);
        log.record(&caption, timestamp_ms);
    }

    let final_session = processing
        .join()
        .map_err(|_| anyhow!("Processing thread panicked"))??;

    info!("{} notes detected", log.entries().len());
    if !log.is_empty() {
        println!("{}", log.transcript());
    }

    if let Some(path) = &cli.save_config {
        final_session
            .save(path)
            .with_context(|| format!("Could not save session to {}", path.display()))?;
        info!("Session saved to {}", path.display());
    }
    Ok(())
}

fn load_session(cli: &Cli) -> anyhow::Result<SessionConfig> {
    if let Some(path) = &cli.config {
        let session =
            SessionConfig::load(path).with_context(|| format!("Could not load session from {}", path.display()))?;
        info!("Loaded {} notes from {}", session.notes.len(), path.display());
        return Ok(session);
    }
    match cli.preset {
        Some(Preset::Kalimba) => Ok(SessionConfig::kalimba_preset()?),
        None => Ok(SessionConfig::default()),
    }
}

/// Whether the tick loop should end: the time limit ran out or a shutdown was
/// requested.
fn should_stop(run_for: Option<Duration>, elapsed: Duration, shutdown: &AtomicBool) -> bool {
    shutdown.load(Ordering::SeqCst) || run_for.is_some_and(|limit| elapsed >= limit)
}

/// Starts the thread that owns the audio device and runs the tick loop.
///
/// The cpal stream is created on this thread and never leaves it. The thread
/// returns the final session snapshot.
fn spawn_processing_thread(
    session: SessionConfig,
    size: SpectrumSize,
    window: FftWindow,
    settings: SyncSettings,
    run_for: Option<Duration>,
    shutdown: Arc<AtomicBool>,
    events: Sender<(String, u64)>,
) -> anyhow::Result<JoinHandle<anyhow::Result<SessionConfig>>> {
    let handle = thread::Builder::new()
        .name("onset-processing".into())
        .spawn(move || -> anyhow::Result<SessionConfig> {
            let audio = CpalAudio::new(window);
            let mut pipeline = OnsetPipeline::from_config(audio, &session, size, settings)?;
            if let Some(device) = pipeline.sync().device() {
                info!("Listening on '{}'", device);
            }

            let start = Instant::now();
            loop {
                let elapsed = start.elapsed();
                if should_stop(run_for, elapsed, &shutdown) {
                    break;
                }

                let now_ms = elapsed.as_millis() as u64;
                for event in pipeline.tick(now_ms) {
                    let caption = pipeline
                        .engine()
                        .band(event.band_id)
                        .map(|band| band.caption.clone())
                        .unwrap_or_else(|_| event.band_id.to_string());
                    if events.send((caption, event.timestamp_ms)).is_err() {
                        return Ok(pipeline.session());
                    }
                }

                thread::sleep(TICK_INTERVAL.saturating_sub(start.elapsed() - elapsed));
            }
            Ok(pipeline.session())
        })?;
    Ok(handle)
}
