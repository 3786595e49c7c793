//! # Pitch Detection Module
//!
//! Reshapes incoming audio blocks into analysis frames and runs each frame
//! through the spectral analyzer and the level meter.
//!
//! ## Block policy
//! - Blocks are cut into `floor(len / N)` contiguous frames; the remainder is
//!   dropped, nothing is carried into the next block
//! - The first frame with a detected frequency wins and the rest of the
//!   block is skipped
//! - Without any detection, the last frame's spectrum and levels are
//!   returned so displays keep updating
//! - A block shorter than one frame yields nothing; the first such block
//!   logs a warning, since a source that never fills a frame never reports

use serde::Serialize;
use std::slice::ChunksExact;

use crate::config::TunerConfig;
use crate::error::{TunerError, TunerResult};
use crate::fft::{SpectralAnalyzer, SpectrumPoint};
use crate::meter::{LevelMeter, LevelReading};
use crate::tuning::{Note, TuningModel};

/// Splits blocks into fixed-size, non-overlapping frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChunker {
    frame_size: usize,
}

impl FrameChunker {
    /// # Errors
    /// * `InvalidFrameSize` for a zero frame size
    pub fn new(frame_size: usize) -> TunerResult<Self> {
        if frame_size == 0 {
            return Err(TunerError::InvalidFrameSize(frame_size));
        }
        Ok(Self { frame_size })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Frames of `block`, front to back. The trailing partial frame is
    /// not yielded.
    pub fn frames<'a>(&self, block: &'a [f32]) -> ChunksExact<'a, f32> {
        block.chunks_exact(self.frame_size)
    }

    /// How many frames a block of `len` samples produces.
    pub fn frame_count(&self, len: usize) -> usize {
        len / self.frame_size
    }
}

/// One emitted result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Position of the frame within its block, 0-based
    pub frame: usize,
    /// Dominant frequency in Hz, `None` when nothing cleared the noise gate
    pub frequency: Option<f32>,
    /// Magnitude spectrum of the frame
    pub spectrum: Vec<SpectrumPoint>,
    /// RMS / peak levels of the frame
    pub levels: LevelReading,
}

impl DetectionResult {
    /// Nearest note under the current tuning settings.
    pub fn note(&self, tuning: &TuningModel) -> Option<Note> {
        self.frequency.and_then(|freq| tuning.frequency_to_note(freq))
    }
}

/// Chunker, analyzer and meter for a single audio stream.
///
/// Build one per stream and rebuild it when the sample rate or frame size
/// changes.
#[derive(Debug)]
pub struct PitchDetectionPipeline {
    chunker: FrameChunker,
    analyzer: SpectralAnalyzer,
    meter: LevelMeter,
    warned_short_block: bool,
}

impl PitchDetectionPipeline {
    /// Builds a pipeline for `sample_rate` from a config.
    ///
    /// # Errors
    /// Any construction error from the analyzer or meter.
    pub fn new(sample_rate: f32, config: &TunerConfig) -> TunerResult<Self> {
        let analyzer = SpectralAnalyzer::new(sample_rate, config.frame_size)?
            .with_noise_floor(config.noise_floor_db)
            .with_band(config.min_frequency, config.max_frequency);
        let meter = LevelMeter::new(config.meter)?;
        Self::from_parts(analyzer, meter)
    }

    /// Builds a pipeline around an existing analyzer and meter.
    pub fn from_parts(analyzer: SpectralAnalyzer, meter: LevelMeter) -> TunerResult<Self> {
        let chunker = FrameChunker::new(analyzer.frame_size())?;
        log::debug!(
            "Pitch pipeline ready: {} samples per frame at {} Hz",
            chunker.frame_size(),
            analyzer.sample_rate()
        );
        Ok(Self {
            chunker,
            analyzer,
            meter,
            warned_short_block: false,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.analyzer.sample_rate()
    }

    pub fn frame_size(&self) -> usize {
        self.chunker.frame_size()
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    /// Processes one incoming block, first-valid-wins.
    ///
    /// # Returns
    /// * `Ok(Some(result))` - First frame with a frequency, or the last
    ///   frame when none had one
    /// * `Ok(None)` - Block too short for a single frame
    pub fn process_block(&mut self, block: &[f32]) -> TunerResult<Option<DetectionResult>> {
        let mut last = None;
        for (index, frame) in self.chunker.frames(block).enumerate() {
            let result = self.process_frame(index, frame)?;
            if result.frequency.is_some() {
                return Ok(Some(result));
            }
            last = Some(result);
        }

        if last.is_none() {
            if self.warned_short_block {
                log::trace!(
                    "Block of {} samples is shorter than one {}-sample frame",
                    block.len(),
                    self.frame_size()
                );
            } else {
                self.warned_short_block = true;
                log::warn!(
                    "Block of {} samples is shorter than one {}-sample frame; nothing is reported for such blocks",
                    block.len(),
                    self.frame_size()
                );
            }
        }
        Ok(last)
    }

    /// Processes every frame of a block, one result each.
    pub fn process_block_all(&mut self, block: &[f32]) -> TunerResult<Vec<DetectionResult>> {
        self.chunker
            .frames(block)
            .enumerate()
            .map(|(index, frame)| self.process_frame(index, frame))
            .collect()
    }

    fn process_frame(&mut self, index: usize, frame: &[f32]) -> TunerResult<DetectionResult> {
        let analysis = self.analyzer.analyze(frame)?;
        let levels = self.meter.measure(frame);
        Ok(DetectionResult {
            frame: index,
            frequency: analysis.frequency,
            spectrum: analysis.spectrum,
            levels,
        })
    }
}
