//! # Configuration
//!
//! All tunable knobs of the detection path in one serde-friendly struct.
//! Missing fields fall back to their defaults, so a config file only needs
//! the values it changes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::fft::{DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_FREQUENCY, DEFAULT_NOISE_FLOOR_DB};
use crate::meter::MeterConfig;
use crate::tuning::{ReferenceRange, TuningModel, TuningSettings};

/// Default analysis frame size in samples (~93ms at 44.1 kHz).
pub const DEFAULT_FRAME_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Samples per analysis frame, power of two
    pub frame_size: usize,
    /// Noise gate threshold for the spectral peak, dB
    pub noise_floor_db: f32,
    /// Lower edge of the peak search band, Hz
    pub min_frequency: f32,
    /// Upper edge of the peak search band, Hz
    pub max_frequency: f32,
    pub meter: MeterConfig,
    pub tuning: TuningSettings,
    /// Allowed range for the reference frequency
    pub a4_range: ReferenceRange,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            noise_floor_db: DEFAULT_NOISE_FLOOR_DB,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            meter: MeterConfig::default(),
            tuning: TuningSettings::default(),
            a4_range: ReferenceRange::default(),
        }
    }
}

impl TunerConfig {
    /// Loads a config from a JSON file.
    ///
    /// # Returns
    /// * `Ok(TunerConfig)` - Parsed config, defaults for missing fields
    /// * `Err(io::Error)` - File I/O error or JSON deserialization error
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        serde_json::from_str(&data).map_err(std::io::Error::other)
    }

    /// Saves the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json_string = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    /// Builds the shared tuning handle described by this config.
    pub fn tuning_model(&self) -> TuningModel {
        TuningModel::new(self.tuning, self.a4_range)
    }
}
