//! # Spectral Analysis Module
//!
//! Turns one fixed-size audio frame into a dominant-frequency estimate and a
//! magnitude spectrum in dB.
//!
//! ## Pipeline
//! 1. Hann windowing for reduced spectral leakage
//! 2. Forward FFT (RustFFT), keeping the first N/2 bins
//! 3. Magnitude to dB with a numeric floor
//! 4. Peak search restricted to the musical band (A0..C8 by default)
//! 5. Parabolic interpolation around the peak for sub-bin accuracy
//! 6. Noise gate on the peak magnitude
//!
//! The full spectrum is always returned, gated or not, so callers can keep
//! drawing it between notes.
//!
//! Interpolation is least reliable within the first two bins: the Hann main
//! lobe of a tone that close to DC overlaps its own negative-frequency image,
//! so the estimate can land further off than the raw bin. With 1024-point
//! frames at 44.1 kHz that is everything below about 45 Hz; use a longer
//! frame for the bottom octave.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{TunerError, TunerResult};

/// Linear magnitude floor; keeps dB values finite.
pub const MAGNITUDE_FLOOR: f32 = 1e-10;
/// Peaks at or below this level are treated as noise.
pub const DEFAULT_NOISE_FLOOR_DB: f32 = -60.0;
/// A0
pub const DEFAULT_MIN_FREQUENCY: f32 = 27.5;
/// C8
pub const DEFAULT_MAX_FREQUENCY: f32 = 4186.0;

/// Interpolation is skipped when the parabola is this flat.
const MIN_DENOMINATOR: f32 = 1e-10;

/// One bin of the magnitude spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumPoint {
    /// Bin centre frequency in Hz
    pub frequency: f32,
    /// Magnitude in dB
    pub magnitude_db: f32,
}

/// Result of analysing a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnalysis {
    /// Interpolated peak frequency, `None` when gated or no band bins exist
    pub frequency: Option<f32>,
    /// N/2 points ordered by frequency
    pub spectrum: Vec<SpectrumPoint>,
}

/// Converts a linear magnitude to dB, clamped at [`MAGNITUDE_FLOOR`].
pub fn magnitude_to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(MAGNITUDE_FLOOR).log10()
}

/// Converts dB back to a linear magnitude.
pub fn db_to_magnitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Builds a Hann window of length `n`.
///
/// The window tapers the frame to zero at both edges, which is essential
/// for a clean peak on a sustained tone.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Sub-bin offset of a parabola through three magnitudes, in [-0.5, 0.5].
///
/// Returns `None` when the three points are (numerically) collinear.
pub fn parabolic_offset(left: f32, peak: f32, right: f32) -> Option<f32> {
    let denominator = left - 2.0 * peak + right;
    if denominator.abs() <= MIN_DENOMINATOR {
        return None;
    }
    let offset = 0.5 * (left - right) / denominator;
    offset.is_finite().then(|| offset.clamp(-0.5, 0.5))
}

/// FFT-based peak analyzer for one (sample rate, frame size) pair.
///
/// Owns its FFT plan, window and working buffers; build a new one when the
/// device format changes. Not shared between streams.
pub struct SpectralAnalyzer {
    sample_rate: f32,
    frame_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    noise_floor_db: f32,
    min_bin: usize,
    max_bin: usize,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("frame_size", &self.frame_size)
            .field("noise_floor_db", &self.noise_floor_db)
            .field("min_bin", &self.min_bin)
            .field("max_bin", &self.max_bin)
            .finish()
    }
}

impl SpectralAnalyzer {
    /// Plans an FFT for `frame_size` samples at `sample_rate` Hz.
    ///
    /// # Errors
    /// * `InvalidSampleRate` if the rate is not a positive finite number
    /// * `InvalidFrameSize` if the size is not a power of two >= 2
    pub fn new(sample_rate: f32, frame_size: usize) -> TunerResult<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TunerError::InvalidSampleRate(sample_rate));
        }
        if frame_size < 2 || !frame_size.is_power_of_two() {
            return Err(TunerError::InvalidFrameSize(frame_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let mut analyzer = Self {
            sample_rate,
            frame_size,
            window: hann_window(frame_size),
            fft,
            buffer: vec![Complex::default(); frame_size],
            scratch,
            noise_floor_db: DEFAULT_NOISE_FLOOR_DB,
            min_bin: 0,
            max_bin: 0,
        };
        analyzer.set_band(DEFAULT_MIN_FREQUENCY, DEFAULT_MAX_FREQUENCY);

        log::debug!(
            "Planned {}-point FFT at {} Hz ({:.2} Hz per bin)",
            frame_size,
            sample_rate,
            analyzer.bin_spacing()
        );
        Ok(analyzer)
    }

    /// Replaces the noise gate threshold.
    pub fn with_noise_floor(mut self, noise_floor_db: f32) -> Self {
        self.noise_floor_db = noise_floor_db;
        self
    }

    /// Replaces the peak search band.
    pub fn with_band(mut self, min_frequency: f32, max_frequency: f32) -> Self {
        self.set_band(min_frequency, max_frequency);
        self
    }

    fn set_band(&mut self, min_frequency: f32, max_frequency: f32) {
        let spacing = self.bin_spacing();
        let last = self.frame_size / 2 - 1;
        self.min_bin = (min_frequency.max(0.0) / spacing).ceil() as usize;
        self.max_bin = ((max_frequency.max(0.0) / spacing).floor() as usize).min(last);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn noise_floor_db(&self) -> f32 {
        self.noise_floor_db
    }

    /// Frequency distance between adjacent bins, R / N.
    pub fn bin_spacing(&self) -> f32 {
        self.sample_rate / self.frame_size as f32
    }

    /// Inclusive bin range searched for the peak, `None` if empty.
    pub fn search_bins(&self) -> Option<(usize, usize)> {
        (self.min_bin <= self.max_bin).then_some((self.min_bin, self.max_bin))
    }

    /// Analyses one frame.
    ///
    /// # Errors
    /// * `FrameLengthMismatch` if `frame.len()` differs from the planned size.
    ///   Frames are never truncated or padded.
    pub fn analyze(&mut self, frame: &[f32]) -> TunerResult<FrameAnalysis> {
        if frame.len() != self.frame_size {
            return Err(TunerError::FrameLengthMismatch {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex { re: sample * w, im: 0.0 };
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // A real input's spectrum is conjugate symmetric; only the first half is distinct.
        let spacing = self.bin_spacing();
        let spectrum: Vec<SpectrumPoint> = self.buffer[..self.frame_size / 2]
            .iter()
            .enumerate()
            .map(|(i, c)| SpectrumPoint {
                frequency: i as f32 * spacing,
                magnitude_db: magnitude_to_db(c.norm()),
            })
            .collect();

        let frequency = self.estimate_frequency(&spectrum);
        log::trace!("Frame analysed: {:?}", frequency);
        Ok(FrameAnalysis { frequency, spectrum })
    }

    fn estimate_frequency(&self, spectrum: &[SpectrumPoint]) -> Option<f32> {
        let (start, end) = self.search_bins()?;

        let mut peak_bin = start;
        for bin in start..=end {
            if spectrum[bin].magnitude_db > spectrum[peak_bin].magnitude_db {
                peak_bin = bin;
            }
        }

        let peak_db = spectrum[peak_bin].magnitude_db;
        if peak_db <= self.noise_floor_db {
            return None;
        }

        let raw = spectrum[peak_bin].frequency;
        if peak_bin == 0 || peak_bin + 1 >= spectrum.len() {
            return Some(raw);
        }

        // The parabola fits better on linear magnitude than on dB
        let left = db_to_magnitude(spectrum[peak_bin - 1].magnitude_db);
        let peak = db_to_magnitude(peak_db);
        let right = db_to_magnitude(spectrum[peak_bin + 1].magnitude_db);

        match parabolic_offset(left, peak, right) {
            Some(offset) => Some(raw + offset * self.bin_spacing()),
            None => Some(raw),
        }
    }
}
