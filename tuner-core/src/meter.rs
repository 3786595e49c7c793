//! Loudness metering for the level display.
//!
//! RMS is smoothed across frames with an exponential moving average in the
//! dB domain; peak is the current frame's transient and is not smoothed.
//! Any peak-hold or decay animation belongs to the presentation layer.

use serde::{Deserialize, Serialize};

use crate::error::{TunerError, TunerResult};
use crate::fft::magnitude_to_db;

/// Default meter floor in dBFS.
pub const DEFAULT_FLOOR_DB: f32 = -80.0;
/// Default EMA factor.
pub const DEFAULT_SMOOTHING: f32 = 0.1;

/// One meter update, both values in [floor, 0] dBFS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReading {
    /// Smoothed RMS level
    pub rms_db: f32,
    /// Instantaneous peak level of the frame
    pub peak_db: f32,
}

/// Meter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Lowest reported level, dBFS
    pub floor_db: f32,
    /// EMA factor in (0, 1]; higher follows faster
    pub smoothing: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            floor_db: DEFAULT_FLOOR_DB,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

/// RMS / peak meter with a persistent smoothed RMS.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    floor_db: f32,
    smoothing: f32,
    smoothed_rms_db: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self {
            floor_db: DEFAULT_FLOOR_DB,
            smoothing: DEFAULT_SMOOTHING,
            smoothed_rms_db: DEFAULT_FLOOR_DB,
        }
    }
}

impl LevelMeter {
    /// Creates a meter; the smoothed RMS starts at the floor.
    ///
    /// # Errors
    /// * `InvalidSmoothing` if `config.smoothing` is outside (0, 1]
    pub fn new(config: MeterConfig) -> TunerResult<Self> {
        if !(config.smoothing > 0.0 && config.smoothing <= 1.0) {
            return Err(TunerError::InvalidSmoothing(config.smoothing));
        }
        let floor_db = config.floor_db.min(0.0);
        Ok(Self {
            floor_db,
            smoothing: config.smoothing,
            smoothed_rms_db: floor_db,
        })
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Current smoothed RMS without taking a new reading. Not clamped, so
    /// it can sit below the floor after silence.
    pub fn smoothed_rms_db(&self) -> f32 {
        self.smoothed_rms_db
    }

    /// Measures one frame.
    ///
    /// An empty frame reads as (floor, floor) and leaves the smoothing
    /// state untouched.
    pub fn measure(&mut self, frame: &[f32]) -> LevelReading {
        if frame.is_empty() {
            return LevelReading {
                rms_db: self.floor_db,
                peak_db: self.floor_db,
            };
        }

        let rms = calculate_rms(frame);
        let peak = calculate_peak(frame);

        // The average runs on the unclamped level; only the outputs are clamped.
        let raw_rms_db = magnitude_to_db(rms);
        self.smoothed_rms_db =
            (1.0 - self.smoothing) * self.smoothed_rms_db + self.smoothing * raw_rms_db;

        LevelReading {
            rms_db: self.clamp(self.smoothed_rms_db),
            peak_db: self.clamp(magnitude_to_db(peak)),
        }
    }

    /// Drops the smoothing history back to the floor.
    pub fn reset(&mut self) {
        self.smoothed_rms_db = self.floor_db;
    }

    fn clamp(&self, db: f32) -> f32 {
        db.clamp(self.floor_db, 0.0)
    }
}

/// Linear RMS of a buffer
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Largest absolute sample value
pub fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_empty_frame_reads_floor() {
        let mut meter = LevelMeter::default();
        let level = meter.measure(&[]);
        assert_eq!(level.rms_db, -80.0);
        assert_eq!(level.peak_db, -80.0);
    }

    #[test]
    fn test_silence_stays_at_floor() {
        let mut meter = LevelMeter::default();
        for _ in 0..10 {
            let level = meter.measure(&[0.0; 512]);
            assert_abs_diff_eq!(level.rms_db, -80.0, epsilon = 1e-4);
            assert_eq!(level.peak_db, -80.0);
        }
    }

    #[test]
    fn test_peak_is_not_smoothed() {
        let mut meter = LevelMeter::default();
        let level = meter.measure(&[0.1, -0.5, 0.3, 0.2]);
        assert_abs_diff_eq!(level.peak_db, -6.0206, epsilon = 1e-3);
        // RMS has only moved 10% of the way up from the floor
        assert!(level.rms_db < -60.0);
    }

    #[test]
    fn test_first_update_is_one_ema_step() {
        let mut meter = LevelMeter::default();
        let level = meter.measure(&[0.5; 256]);
        let raw = 20.0 * 0.5f32.log10();
        assert_abs_diff_eq!(level.rms_db, 0.9 * -80.0 + 0.1 * raw, epsilon = 1e-3);
    }

    #[test]
    fn test_smoothing_converges_without_overshoot() {
        let mut meter = LevelMeter::default();
        let loud = vec![0.5f32; 1024];
        let raw = 20.0 * 0.5f32.log10();

        let mut previous = meter.smoothed_rms_db();
        for _ in 0..200 {
            let level = meter.measure(&loud);
            assert!(level.rms_db >= previous - 1e-5, "{} fell below {}", level.rms_db, previous);
            assert!(level.rms_db <= raw + 1e-4, "{} overshot {}", level.rms_db, raw);
            previous = level.rms_db;
        }
        assert_abs_diff_eq!(previous, raw, epsilon = 1e-3);
    }

    #[test]
    fn test_full_scale_clamps_to_zero() {
        let mut meter = LevelMeter::new(MeterConfig { floor_db: -60.0, smoothing: 1.0 }).unwrap();
        let level = meter.measure(&[1.0, -1.0, 1.0, -1.0]);
        assert_abs_diff_eq!(level.rms_db, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(level.peak_db, 0.0, epsilon = 1e-5);

        // Over-range input is still reported at 0 dBFS
        let hot = meter.measure(&[2.0; 8]);
        assert_eq!(hot.rms_db, 0.0);
        assert_eq!(hot.peak_db, 0.0);
    }

    #[test]
    fn test_silence_pulls_average_below_floor() {
        let mut meter = LevelMeter::default();
        let loud = [0.5f32; 64];
        let raw = 20.0 * 0.5f32.log10();

        // Silence reads as -200 dB before clamping
        assert_eq!(meter.measure(&[0.0; 64]).rms_db, -80.0);
        assert_abs_diff_eq!(meter.smoothed_rms_db(), -92.0, epsilon = 1e-3);

        // 0.9 * -92 + 0.1 * -6.02 is still below the floor
        let level = meter.measure(&loud);
        assert_abs_diff_eq!(meter.smoothed_rms_db(), 0.9 * -92.0 + 0.1 * raw, epsilon = 1e-3);
        assert_eq!(level.rms_db, -80.0);

        let level = meter.measure(&loud);
        let expected = 0.9 * (0.9 * -92.0 + 0.1 * raw) + 0.1 * raw;
        assert_abs_diff_eq!(level.rms_db, expected, epsilon = 1e-3);
        assert!(level.rms_db > -80.0);
    }

    #[test]
    fn test_reset() {
        let mut meter = LevelMeter::default();
        meter.measure(&[0.9f32; 512]);
        assert!(meter.smoothed_rms_db() > -80.0);
        meter.reset();
        assert_eq!(meter.smoothed_rms_db(), -80.0);
    }

    #[test]
    fn test_rejects_bad_smoothing() {
        for smoothing in [0.0, -0.1, 1.5, f32::NAN] {
            assert!(LevelMeter::new(MeterConfig { floor_db: -80.0, smoothing }).is_err());
        }
    }

    #[test]
    fn test_calculate_rms_and_peak() {
        assert_abs_diff_eq!(calculate_rms(&[0.5f32; 100]), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(calculate_peak(&[0.1, -0.8, 0.3]), 0.8, epsilon = 1e-6);
        assert_eq!(calculate_rms(&[]), 0.0);
    }
}
