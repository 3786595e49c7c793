//! Error types for the tuner core.
//!
//! Only configuration and input-shape problems are errors. Silence, a gated
//! peak or an out-of-range note are ordinary `None` results.

use thiserror::Error;

/// Errors raised by analyzer construction and frame validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TunerError {
    /// Frame size is not a power of two (or is smaller than two samples)
    #[error("Invalid frame size: {0}, must be a power of two >= 2")]
    InvalidFrameSize(usize),

    /// Sample rate is zero, negative or not finite
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(f32),

    /// A frame handed to the analyzer has the wrong length
    #[error("Frame length mismatch: expected {expected} samples, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// Note name could not be parsed into a pitch class
    #[error("Unknown note name: {0:?}")]
    UnknownNoteName(String),

    /// Temperament identifier is not in the table
    #[error("Unknown temperament: {0:?}")]
    UnknownTemperament(String),

    /// Level meter smoothing factor outside (0, 1]
    #[error("Invalid smoothing factor: {0}")]
    InvalidSmoothing(f32),
}

/// Result type for tuner core operations
pub type TunerResult<T> = Result<T, TunerError>;
