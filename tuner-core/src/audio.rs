//! # Audio Capture Module
//!
//! Live input from the default capture device via CPAL. Device callbacks
//! arrive in whatever size the host picks, so samples are re-blocked here
//! and forwarded one full analysis frame at a time.
//!
//! ## Features
//! - Default input device selection
//! - Sample rate negotiation around 44.1 kHz
//! - Channel 0 taken from multichannel devices
//! - Fixed hardware buffer size when the device allows it
//! - Re-blocking to the frame size when it does not

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfigRange};
use crossbeam_channel::Sender;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Collects callback samples into fixed-size mono blocks.
#[derive(Debug, Clone)]
pub struct BlockAssembler {
    block_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    /// `channels` is the interleave stride of incoming data; only channel 0
    /// is kept.
    pub fn new(block_size: usize, channels: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            channels: channels.max(1),
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for the next full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Appends one interleaved callback buffer and hands every completed
    /// block to `emit`, oldest first.
    pub fn push(&mut self, data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.pending.extend(data.iter().step_by(self.channels));
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            emit(std::mem::replace(&mut self.pending, rest));
        }
    }
}

/// Running capture session. Dropping it stops the stream.
pub struct CaptureSession {
    stream: cpal::Stream,
    sample_rate: u32,
    device_name: String,
}

impl CaptureSession {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Pauses the stream ahead of dropping it.
    pub fn stop(self) -> Result<()> {
        self.stream.pause().context("Failed to pause input stream")?;
        log::info!("Capture from {} stopped", self.device_name);
        Ok(())
    }
}

/// Starts capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel receiving mono blocks of exactly `frame_size`
///   samples at the session's sample rate
/// * `frame_size` - Block size to forward, also requested as the hardware
///   buffer size when the device supports it
///
/// # Returns
/// * `Ok(CaptureSession)` - Playing stream and its negotiated sample rate
/// * `Err(e)` - No device, no f32 format, or the stream failed to start
pub fn start_audio_capture(sender: Sender<Vec<f32>>, frame_size: usize) -> Result<CaptureSession> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let device_name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    log::info!("Using audio input device: {}", device_name);

    let configs = device
        .supported_input_configs()
        .context("Failed to query input configs")?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let supported_config = if supports_rate(&supported, TARGET_SAMPLE_RATE) {
        supported.with_sample_rate(SampleRate(TARGET_SAMPLE_RATE))
    } else {
        supported.with_max_sample_rate()
    };
    let buffer_size = match supported_config.buffer_size() {
        SupportedBufferSize::Range { min, max }
            if (*min as usize..=*max as usize).contains(&frame_size) =>
        {
            BufferSize::Fixed(frame_size as u32)
        }
        _ => {
            log::warn!(
                "Device cannot deliver {}-sample buffers; re-blocking host-sized callbacks",
                frame_size
            );
            BufferSize::Default
        }
    };

    let sample_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels().max(1) as usize;
    let mut config: cpal::StreamConfig = supported_config.into();
    config.buffer_size = buffer_size;

    log::info!(
        "Selected {} Hz, {} channel(s), buffer {:?}",
        sample_rate,
        channels,
        config.buffer_size
    );

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);
    let mut assembler = BlockAssembler::new(frame_size, channels);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                assembler.push(data, |block| {
                    // Never block the device thread; a full or closed channel drops the block.
                    if sender.try_send(block).is_err() {
                        log::trace!("Dropped input block");
                    }
                });
            },
            err_fn,
            None,
        )
        .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;

    Ok(CaptureSession {
        stream,
        sample_rate,
        device_name,
    })
}

fn supports_rate(config: &SupportedStreamConfigRange, rate: u32) -> bool {
    (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
}

/// Picks the f32 input configuration closest to `target_rate`, preferring
/// fewer channels on ties.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let distance = if supports_rate(c, target_rate) {
                0
            } else {
                let min_diff = c.min_sample_rate().0.abs_diff(target_rate);
                let max_diff = c.max_sample_rate().0.abs_diff(target_rate);
                min_diff.min(max_diff)
            };
            (distance, c.channels())
        })
}
