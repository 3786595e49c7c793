//! Formatting of detection results for the terminal.

use serde::Serialize;
use tuner_core::{DetectionResult, LevelReading, Note, TuningModel};

/// Start of a frame in seconds, from the sample offset of its block.
pub fn frame_time(block_start: usize, frame: usize, frame_size: usize, sample_rate: f64) -> f64 {
    (block_start + frame * frame_size) as f64 / sample_rate
}

/// One printed result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Offset of the source block from the start of the stream, seconds
    pub time: f64,
    pub frequency: Option<f32>,
    pub note: Option<Note>,
    pub levels: LevelReading,
}

impl Report {
    pub fn new(time: f64, result: &DetectionResult, tuning: &TuningModel) -> Self {
        Self {
            time,
            frequency: result.frequency,
            note: result.note(tuning),
            levels: result.levels,
        }
    }

    pub fn to_line(&self) -> String {
        let levels = format!(
            "rms {:6.1} dB  peak {:6.1} dB",
            self.levels.rms_db, self.levels.peak_db
        );
        match (&self.note, self.frequency) {
            (Some(note), Some(freq)) => format!(
                "{:8.3}s  {:<10} {:9.2} Hz (target {:9.2} Hz)  {}",
                self.time,
                note.to_string(),
                freq,
                note.expected_frequency,
                levels
            ),
            (None, Some(freq)) => {
                format!("{:8.3}s  {:<10} {:9.2} Hz  {}", self.time, "?", freq, levels)
            }
            _ => format!("{:8.3}s  {:<10} {:>12}  {}", self.time, "--", "", levels),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
