//! # Tuner - Command Line Front End
//!
//! Runs the pitch detection pipeline over a WAV file or, with the `capture`
//! feature, the default input device, and prints the nearest note for each
//! processed block.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, input setup, shutdown
//! - **Analysis Thread**: owns the pipeline, drains incoming blocks
//! - **Communication**: crossbeam channels for blocks and shutdown

mod input;
mod report;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::io::Write;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tuner_core::{
    PitchClass, PitchDetectionPipeline, Temperament, TunerConfig, TuningModel, TuningSettings,
};

use report::Report;

#[derive(Debug, Parser)]
#[command(name = "tuner", version, about = "Chromatic tuner with historical temperaments")]
struct Cli {
    /// WAV file to analyse
    input: Option<PathBuf>,

    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Temperament identifier, e.g. "equal", "werckmeister-iii", "quarter-comma-meantone"
    #[arg(long)]
    temperament: Option<Temperament>,

    /// Reference frequency in Hz
    #[arg(long)]
    a4: Option<f32>,

    /// MIDI note the reference frequency belongs to (69 = A4)
    #[arg(long)]
    a4_note: Option<u8>,

    /// Samples per analysis frame (power of two)
    #[arg(long)]
    frame_size: Option<usize>,

    /// Samples per block fed to the pipeline when reading a file
    #[arg(long)]
    block_size: Option<usize>,

    /// Print one JSON object per result
    #[arg(long)]
    json: bool,

    /// Report every frame instead of the first detection per block
    #[arg(long)]
    all_frames: bool,

    /// Read from the default input device until Enter is pressed
    #[cfg(feature = "capture")]
    #[arg(long, conflicts_with = "input")]
    live: bool,

    /// List temperaments with their deviation from equal temperament
    #[arg(long)]
    list_temperaments: bool,
}

impl Cli {
    #[cfg(feature = "capture")]
    fn live(&self) -> bool {
        self.live
    }

    #[cfg(not(feature = "capture"))]
    fn live(&self) -> bool {
        false
    }

    fn build_config(&self) -> Result<TunerConfig> {
        let mut config = match &self.config {
            Some(path) => TunerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TunerConfig::default(),
        };
        if let Some(temperament) = self.temperament {
            config.tuning.temperament = temperament;
        }
        if let Some(a4) = self.a4 {
            config.tuning.a4_frequency = a4;
        }
        if let Some(note) = self.a4_note {
            config.tuning.a4_midi_note = note;
        }
        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
        Ok(config)
    }
}

/// How the analysis thread prints.
#[derive(Debug, Clone, Copy)]
struct OutputOptions {
    json: bool,
    all_frames: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.build_config()?;
    let tuning = config.tuning_model();
    log::info!(
        "Tuning: {} at A4 = {} Hz (MIDI {})",
        tuning.temperament(),
        tuning.a4_frequency(),
        tuning.a4_midi_note()
    );

    if cli.list_temperaments {
        return list_temperaments(&tuning);
    }

    let options = OutputOptions {
        json: cli.json,
        all_frames: cli.all_frames,
    };

    if cli.live() {
        return run_live(&config, tuning, options);
    }

    let path = cli
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("No input file given (pass a WAV path or --live)"))?;
    run_file(path, cli.block_size, &config, tuning, options)
}

/// Prints each temperament's per-note bend in cents.
fn list_temperaments(tuning: &TuningModel) -> Result<()> {
    let mut out = std::io::stdout().lock();
    let tonic = PitchClass::from_index(tuning.a4_midi_note() as i32);
    writeln!(
        out,
        "Cents from equal temperament, tables read from C. Live targets use the \
         reference note ({}) as tonic: a note n semitones above {} takes the column \
         n semitones above C.",
        tonic, tonic
    )?;
    write!(out, "{:<24}", "")?;
    for class in PitchClass::ALL {
        write!(out, "{:>7}", class.name())?;
    }
    writeln!(out)?;

    for temperament in Temperament::ALL {
        let model = TuningModel::new(
            TuningSettings {
                temperament,
                ..tuning.settings()
            },
            tuning.range(),
        );
        write!(out, "{:<24}", format!("{} ({})", temperament.display_name(), temperament.id()))?;
        for (_, cents) in model.temperament_deviations() {
            write!(out, "{:>7.1}", cents)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn run_file(
    path: &std::path::Path,
    block_size: Option<usize>,
    config: &TunerConfig,
    tuning: TuningModel,
    options: OutputOptions,
) -> Result<()> {
    let signal = input::read_wav(path)?;
    let block_size = block_size.unwrap_or(config.frame_size);
    if block_size == 0 {
        bail!("Block size must be positive");
    }
    let pipeline = PitchDetectionPipeline::new(signal.sample_rate as f32, config)?;
    log::info!(
        "Analysing {} ({} samples at {} Hz, {}-sample blocks)",
        path.display(),
        signal.samples.len(),
        signal.sample_rate,
        block_size
    );

    let (block_tx, block_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
    let (_shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let worker = spawn_analysis(pipeline, tuning, options, block_rx, shutdown_rx);

    for block in signal.samples.chunks(block_size) {
        if block_tx.send(block.to_vec()).is_err() {
            break;
        }
    }
    // Closing the channel lets the worker drain and exit
    drop(block_tx);

    let reported = join_analysis(worker)?;
    log::info!("Reported {} result(s)", reported);
    Ok(())
}

#[cfg(feature = "capture")]
fn run_live(config: &TunerConfig, tuning: TuningModel, options: OutputOptions) -> Result<()> {
    use tuner_core::audio;

    let (block_tx, block_rx) = crossbeam_channel::bounded::<Vec<f32>>(64);
    let session = audio::start_audio_capture(block_tx, config.frame_size)?;
    let pipeline = PitchDetectionPipeline::new(session.sample_rate() as f32, config)?;
    log::info!("Listening on {}; press Enter to stop", session.device_name());

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let worker = spawn_analysis(pipeline, tuning, options, block_rx, shutdown_rx);

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let _ = shutdown_tx.send(());

    let reported = join_analysis(worker)?;
    session.stop()?;
    log::info!("Reported {} result(s)", reported);
    Ok(())
}

#[cfg(not(feature = "capture"))]
fn run_live(_config: &TunerConfig, _tuning: TuningModel, _options: OutputOptions) -> Result<()> {
    bail!("Live input requires the `capture` feature")
}

/// Spawns the analysis thread.
///
/// The thread runs until the block channel closes or a shutdown signal
/// arrives, and returns how many results it printed.
fn spawn_analysis(
    mut pipeline: PitchDetectionPipeline,
    tuning: TuningModel,
    options: OutputOptions,
    blocks: Receiver<Vec<f32>>,
    shutdown: Receiver<()>,
) -> JoinHandle<Result<usize>> {
    thread::spawn(move || {
        log::debug!("Analysis thread started");
        let sample_rate = pipeline.sample_rate() as f64;
        let frame_size = pipeline.frame_size();
        let mut out = std::io::stdout().lock();
        let mut position = 0usize;
        let mut reported = 0usize;

        loop {
            crossbeam_channel::select! {
                recv(blocks) -> msg => match msg {
                    Ok(block) => {
                        let block_start = position;
                        position += block.len();

                        let results = if options.all_frames {
                            pipeline.process_block_all(&block)?
                        } else {
                            pipeline.process_block(&block)?.into_iter().collect()
                        };
                        for result in &results {
                            let time = report::frame_time(
                                block_start,
                                result.frame,
                                frame_size,
                                sample_rate,
                            );
                            let report = Report::new(time, result, &tuning);
                            emit(&mut out, &report, options)?;
                            reported += 1;
                        }
                    }
                    Err(_) => {
                        log::debug!("Block channel closed");
                        break;
                    }
                },
                recv(shutdown) -> _ => {
                    log::debug!("Received shutdown signal");
                    break;
                },
            }
        }

        log::debug!("Analysis thread finished");
        Ok(reported)
    })
}

fn join_analysis(worker: JoinHandle<Result<usize>>) -> Result<usize> {
    worker
        .join()
        .map_err(|_| anyhow!("Analysis thread panicked"))?
}

fn emit(out: &mut impl Write, report: &Report, options: OutputOptions) -> Result<()> {
    if options.json {
        writeln!(out, "{}", report.to_json()?)?;
    } else {
        writeln!(out, "{}", report.to_line())?;
    }
    Ok(())
}
