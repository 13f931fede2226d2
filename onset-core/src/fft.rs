//! # Spectrum Analysis Module
//!
//! Turns the most recent audio samples into the magnitude spectrum consumed
//! by the onset engine.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per spectrum size
//! - Selectable analysis window (Blackman-Harris by default)
//! - DC offset removal before windowing
//! - Spectrum sizes from 128 to 8192 bins

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use crate::error::OnsetError;

/// Number of bins in a spectrum frame. The FFT itself runs over twice as
/// many samples, and only the bins below Nyquist are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumSize {
    S128 = 128,
    S256 = 256,
    S512 = 512,
    S1024 = 1024,
    S2048 = 2048,
    S4096 = 4096,
    #[default]
    S8192 = 8192,
}

impl SpectrumSize {
    pub fn bins(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for SpectrumSize {
    type Error = OnsetError;

    fn try_from(bins: usize) -> Result<Self, Self::Error> {
        match bins {
            128 => Ok(Self::S128),
            256 => Ok(Self::S256),
            512 => Ok(Self::S512),
            1024 => Ok(Self::S1024),
            2048 => Ok(Self::S2048),
            4096 => Ok(Self::S4096),
            8192 => Ok(Self::S8192),
            other => Err(OnsetError::InvalidSpectrumSize(other)),
        }
    }
}

/// Analysis window applied before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftWindow {
    Rectangular,
    Triangle,
    Hamming,
    Hanning,
    Blackman,
    #[default]
    BlackmanHarris,
}

impl FftWindow {
    /// Window coefficient for sample `i` of `n`.
    fn coefficient(self, i: usize, n: usize) -> f32 {
        if n < 2 {
            return 1.0;
        }
        let x = i as f32 / (n - 1) as f32;
        match self {
            FftWindow::Rectangular => 1.0,
            FftWindow::Triangle => 1.0 - (2.0 * x - 1.0).abs(),
            FftWindow::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
            FftWindow::Hanning => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            FftWindow::Blackman => 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos(),
            FftWindow::BlackmanHarris => {
                0.35875 - 0.48829 * (2.0 * PI * x).cos() + 0.14128 * (4.0 * PI * x).cos()
                    - 0.01168 * (6.0 * PI * x).cos()
            }
        }
    }

    /// Precomputes the `n` coefficients of this window.
    pub fn coefficients(self, n: usize) -> Vec<f32> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Reusable FFT state for one spectrum size and window.
pub struct SpectrumAnalyzer {
    bins: usize,
    window: FftWindow,
    coefficients: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    planner: FftPlanner<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("bins", &self.bins)
            .field("window", &self.window)
            .finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(size: SpectrumSize, window: FftWindow) -> Self {
        let bins = size.bins();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(bins * 2);
        Self {
            bins,
            window,
            coefficients: window.coefficients(bins * 2),
            fft,
            planner,
            buffer: vec![Complex::new(0.0, 0.0); bins * 2],
            scratch: vec![0.0; bins * 2],
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of audio samples consumed per analysis.
    pub fn window_len(&self) -> usize {
        self.bins * 2
    }

    /// Re-plans the FFT for a new number of bins. Does nothing if the size
    /// is unchanged.
    pub fn resize(&mut self, bins: usize) {
        if bins == self.bins || bins == 0 {
            return;
        }
        debug!("Re-planning FFT: {} -> {} bins", self.bins, bins);
        self.bins = bins;
        self.fft = self.planner.plan_fft_forward(bins * 2);
        self.coefficients = self.window.coefficients(bins * 2);
        self.buffer = vec![Complex::new(0.0, 0.0); bins * 2];
        self.scratch = vec![0.0; bins * 2];
    }

    /// Analyzes `samples` (oldest first) and writes magnitudes into `out`.
    ///
    /// Only the last [`window_len`](Self::window_len) samples are used; a
    /// shorter input is zero-padded at the front. The analyzer follows the
    /// length of `out`, re-planning if it changed. Magnitudes are scaled by
    /// `1 / window_len` so a full-scale sine lands near `0.5 * window gain`.
    pub fn analyze(&mut self, samples: &[f32], out: &mut [f32]) {
        self.resize(out.len());
        let n = self.window_len();

        self.scratch.fill(0.0);
        let take = samples.len().min(n);
        self.scratch[n - take..].copy_from_slice(&samples[samples.len() - take..]);

        remove_dc_offset(&mut self.scratch);
        for ((slot, sample), coefficient) in self.buffer.iter_mut().zip(&self.scratch).zip(&self.coefficients) {
            *slot = Complex::new(sample * coefficient, 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        for (magnitude, bin) in out.iter_mut().zip(&self.buffer) {
            *magnitude = bin.norm() * scale;
        }
    }
}
