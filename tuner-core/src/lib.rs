// tuner-core/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate is responsible for spectral pitch detection, level metering
//! and mapping frequencies to notes under a chosen temperament. It is
//! completely headless; audio capture is behind the `capture` feature.

#[cfg(feature = "capture")]
pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod meter;
pub mod pitch;
pub mod temperament;
pub mod tuning;

pub use config::TunerConfig;
pub use error::{TunerError, TunerResult};
pub use fft::{FrameAnalysis, SpectralAnalyzer, SpectrumPoint};
pub use meter::{LevelMeter, LevelReading, MeterConfig};
pub use pitch::{DetectionResult, FrameChunker, PitchDetectionPipeline};
pub use temperament::Temperament;
pub use tuning::{Note, PitchClass, ReferenceRange, TuningModel, TuningSettings};
