//! catrack CLI.
//!
//! Generates synthetic timeslices and runs the time-sliced track finder on
//! them, either once with a full monitor report or repeatedly over a set of
//! thread counts.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use catrack_algorithms::{FindTracksOutput, LineFollowConfig, LineFollowKernel, TrackFinder};
use catrack_core::simulate::{simulate_timeslice, SimulatedTimeslice, SimulationConfig};
use catrack_core::{
    FinderConfig, InputData, Parameters, TimesliceHeader, TrackingMode, WindowConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] catrack_core::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Tracking mode selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Silicon tracker only
    Sts,
    /// Full setup with all tracking detectors
    Global,
    /// High-rate triggerless setup (adaptive window, pile-up ceiling)
    Mcbm,
}

impl From<Mode> for TrackingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sts => TrackingMode::Sts,
            Mode::Global => TrackingMode::Global,
            Mode::Mcbm => TrackingMode::Mcbm,
        }
    }
}

/// Time-sliced, multi-threaded track finding.
#[derive(Parser)]
#[command(name = "catrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Detector setup: equidistant stations downstream of the target.
#[derive(Args, Debug, Clone)]
struct DetectorArgs {
    /// Number of stations
    #[arg(long, default_value = "4")]
    stations: usize,

    /// Position of the first station along the beam (cm)
    #[arg(long, default_value = "20.0")]
    first_z: f64,

    /// Distance between stations (cm)
    #[arg(long, default_value = "10.0")]
    station_spacing: f64,
}

impl DetectorArgs {
    fn parameters(&self) -> Parameters {
        Parameters::uniform(self.stations, self.first_z, self.station_spacing)
    }
}

/// Synthetic timeslice settings.
#[derive(Args, Debug, Clone)]
struct SimulationArgs {
    /// Number of events
    #[arg(long, default_value = "1000")]
    events: usize,

    /// Mean time between events (ns)
    #[arg(long, default_value = "1000.0")]
    event_interval: f64,

    /// Maximum tracks per event
    #[arg(long, default_value = "5")]
    max_tracks: usize,

    /// Uniform noise hits per station
    #[arg(long, default_value = "0")]
    noise: usize,

    /// Hits with an unphysical timestamp
    #[arg(long, default_value = "0")]
    bogus: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl SimulationArgs {
    fn config(&self) -> SimulationConfig {
        SimulationConfig::default()
            .with_events(self.events)
            .with_event_interval(self.event_interval)
            .with_tracks_per_event(1, self.max_tracks)
            .with_noise(self.noise)
            .with_bogus_hits(self.bogus)
            .with_seed(self.seed)
    }
}

/// Track finder settings.
#[derive(Args, Debug, Clone)]
struct FinderArgs {
    /// Tracking mode
    #[arg(short, long, value_enum, default_value = "sts")]
    mode: Mode,

    /// Sub-window length (ns); defaults to the mode's window
    #[arg(long)]
    window: Option<f64>,

    /// Hits per station per window treated as pile-up
    #[arg(long)]
    max_station_hits: Option<usize>,
}

impl FinderArgs {
    fn config(&self, n_threads: usize) -> FinderConfig {
        let mode = TrackingMode::from(self.mode);
        let mut window = WindowConfig::for_mode(mode);
        if let Some(length) = self.window {
            window = window.with_window_length(length);
        }
        if self.max_station_hits.is_some() {
            window = window.with_max_station_hits(self.max_station_hits);
        }
        FinderConfig::for_mode(mode)
            .with_window(window)
            .with_threads(n_threads)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic timeslice and write it as JSON
    Simulate {
        #[command(flatten)]
        detector: DetectorArgs,

        #[command(flatten)]
        simulation: SimulationArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run the track finder on one timeslice
    Run {
        #[command(flatten)]
        detector: DetectorArgs,

        #[command(flatten)]
        simulation: SimulationArgs,

        #[command(flatten)]
        finder: FinderArgs,

        /// Read the hits from a JSON file instead of simulating them
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Number of worker threads
        #[arg(short = 'j', long, default_value = "1")]
        threads: usize,

        /// Number of calls on the same timeslice
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Print a JSON summary instead of the monitor table
        #[arg(long)]
        json: bool,
    },

    /// Benchmark the track finder over several thread counts
    Benchmark {
        #[command(flatten)]
        detector: DetectorArgs,

        #[command(flatten)]
        simulation: SimulationArgs,

        #[command(flatten)]
        finder: FinderArgs,

        /// Thread counts to compare
        #[arg(short = 'j', long, value_delimiter = ',', default_value = "1,2,4,8")]
        threads: Vec<usize>,

        /// Number of iterations per thread count
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn simulate(detector: &DetectorArgs, simulation: &SimulationArgs) -> Result<SimulatedTimeslice> {
    let params = detector.parameters();
    let start = Instant::now();
    let timeslice = simulate_timeslice(&params, &simulation.config())?;
    log::info!(
        "Simulated {} hits of {} tracks in {:.2?}",
        timeslice.input.hit_count(),
        timeslice.n_true_tracks,
        start.elapsed()
    );
    Ok(timeslice)
}

fn read_input(path: &Path) -> Result<InputData> {
    let reader = BufReader::new(File::open(path)?);
    let input: InputData = serde_json::from_reader(reader)?;
    log::info!("Read {} hits from {}", input.hit_count(), path.display());
    Ok(input)
}

fn make_finder(
    params: &Parameters,
    config: FinderConfig,
) -> Result<TrackFinder<LineFollowKernel>> {
    let kernel = LineFollowKernel::new(params, LineFollowConfig::default());
    Ok(TrackFinder::new(params.clone(), config, kernel)?)
}

/// Found tracks whose hits all come from one true track.
fn count_pure_tracks(timeslice: &SimulatedTimeslice, output: &FindTracksOutput) -> usize {
    output
        .tracks
        .iter()
        .filter(|track| {
            let truth: HashSet<Option<u32>> = output
                .track_hits(track)
                .iter()
                .map(|&i| timeslice.true_track_of(timeslice.input.hit(i)))
                .collect();
            truth.len() == 1 && !truth.contains(&None)
        })
        .count()
}

fn summary_json(
    output: &FindTracksOutput,
    header: &TimesliceHeader,
    config: &FinderConfig,
    n_hits: usize,
    truth: Option<(usize, usize)>,
) -> serde_json::Value {
    let mut summary = serde_json::json!({
        "config": config,
        "header": header,
        "n_hits": n_hits,
        "n_tracks": output.n_tracks(),
        "n_hits_used": output.hit_indices.len(),
        "n_bogus_hits": output.bogus_hits.len(),
        "reco_time_ms": output.reco_time.as_secs_f64() * 1000.0,
        "stats": output.stats,
    });
    if let Some((n_true_tracks, n_pure_tracks)) = truth {
        summary["n_true_tracks"] = n_true_tracks.into();
        summary["n_pure_tracks"] = n_pure_tracks.into();
    }
    summary
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Simulate {
            detector,
            simulation,
            output,
        } => {
            let timeslice = simulate(&detector, &simulation)?;
            let writer = BufWriter::new(File::create(&output)?);
            serde_json::to_writer(writer, &timeslice.input)?;

            println!(
                "Wrote {} hits in {} streams to {}",
                timeslice.input.hit_count(),
                timeslice.input.n_streams(),
                output.display()
            );
            println!("True tracks: {}", timeslice.n_true_tracks);
        }

        Commands::Run {
            detector,
            simulation,
            finder,
            input,
            threads,
            repeat,
            json,
        } => {
            if repeat == 0 {
                return Err(CliError::InvalidArgument(
                    "--repeat must be at least 1".to_string(),
                ));
            }

            let params = detector.parameters();
            let (input, timeslice) = match &input {
                Some(path) => (read_input(path)?, None),
                None => {
                    let timeslice = simulate(&detector, &simulation)?;
                    (timeslice.input.clone(), Some(timeslice))
                }
            };

            let config = finder.config(threads);
            let mut track_finder = make_finder(&params, config.clone())?;
            let mut header = TimesliceHeader::default();
            let mut output = track_finder.find_tracks(&input, &mut header);
            for _ in 1..repeat {
                header = TimesliceHeader::default();
                output = track_finder.find_tracks(&input, &mut header);
            }

            let truth = timeslice
                .as_ref()
                .map(|ts| (ts.n_true_tracks, count_pure_tracks(ts, &output)));

            if json {
                let summary = summary_json(&output, &header, &config, input.hit_count(), truth);
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Timeslice [{:.1}, {:.1}] ns, {} hits",
                    header.start,
                    header.end,
                    input.hit_count()
                );
                println!(
                    "Tracks: {} ({} hits used, {} bogus hits)",
                    output.n_tracks(),
                    output.hit_indices.len(),
                    output.bogus_hits.len()
                );
                if let Some((n_true_tracks, n_pure_tracks)) = truth {
                    println!("True tracks: {}", n_true_tracks);
                    println!("Pure tracks: {}", n_pure_tracks);
                }
                println!(
                    "Sub-windows: {} over {} thread(s), merge conflicts: {}",
                    output.stats.n_sub_windows(),
                    output.stats.threads.len(),
                    output.stats.n_merge_conflicts
                );
                println!("Reconstruction time: {:.2?}", output.reco_time);
                println!();
                print!("{}", track_finder.monitor());
            }
        }

        Commands::Benchmark {
            detector,
            simulation,
            finder,
            threads,
            iterations,
        } => {
            if iterations == 0 {
                return Err(CliError::InvalidArgument(
                    "--iterations must be at least 1".to_string(),
                ));
            }

            let params = detector.parameters();
            let timeslice = simulate(&detector, &simulation)?;

            println!(
                "Benchmarking with {} hits, {} iterations",
                timeslice.input.hit_count(),
                iterations
            );
            println!(
                "{:<8} | {:<8} | {:<15} | {:<15} | {:<15}",
                "Threads", "Tracks", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<72}", "");

            for n_threads in threads {
                let mut track_finder = make_finder(&params, finder.config(n_threads))?;

                // Warmup
                let mut header = TimesliceHeader::default();
                let n_tracks = track_finder
                    .find_tracks(&timeslice.input, &mut header)
                    .n_tracks();

                let mut times = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let mut header = TimesliceHeader::default();
                    let output = track_finder.find_tracks(&timeslice.input, &mut header);
                    times.push(output.reco_time.as_secs_f64() * 1000.0);
                }

                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len() as f64;

                println!(
                    "{:<8} | {:<8} | {:<15.2} | {:<15.2} | {:<15.2}",
                    n_threads, n_tracks, mean_time, min_time, max_time
                );
            }
        }
    }

    Ok(())
}
