//! WAV file input.
//!
//! Samples are converted to f32 in [-1, 1]; multichannel files keep only
//! channel 0, the same channel live capture takes.

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;

/// Decoded mono signal.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub fn read_wav(path: &Path) -> Result<MonoSignal> {
    let reader =
        WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    decode(reader).with_context(|| format!("Failed to decode {}", path.display()))
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<MonoSignal> {
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV file declares zero channels");
    }
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    log::debug!(
        "Decoded {} frames at {} Hz, {} channel(s), {} bit {:?}",
        interleaved.len() / channels,
        spec.sample_rate,
        channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    Ok(MonoSignal {
        samples: interleaved.into_iter().step_by(channels).collect(),
        sample_rate: spec.sample_rate,
    })
}
