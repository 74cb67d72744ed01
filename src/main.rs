use anyhow::{Context, Result};
use clap::Parser;
use dla_common::{RecordReader, RecordWriter, SimulationConfig};
use dla_engine::export::{positions_path, save_particles_csv, save_snapshots, StatsRecorder};
use dla_engine::RoundCoordinator;
use log::{debug, error, info, trace};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Seconds between progress lines in the log.
const PRINT_INTERVAL_SECS: f64 = 5.0;

/// Command-line arguments for the DLA engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML config file (built-in defaults if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed particle records; "-" reads stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Ignore seed input and start from a single particle at the origin
    #[arg(long)]
    no_seed: bool,

    /// Destination for accepted particle records; "-" writes stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Number of walker threads (overrides the config)
    #[arg(long)]
    threads: Option<usize>,

    /// Candidates collected per round (overrides the config)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop once the aggregate holds this many particles (overrides the config)
    #[arg(long)]
    max_particles: Option<u64>,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the particle stream
    env_logger::init();
    let args = Args::parse();
    run_with_args(args)
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(threads) = args.threads {
        config.engine.num_threads = threads;
    }
    if let Some(batch_size) = args.batch_size {
        config.engine.batch_size = batch_size;
    }
    if args.max_particles.is_some() {
        config.engine.max_particles = args.max_particles;
    }
    config.validate()?;
    Ok(config)
}

fn run_with_args(args: Args) -> Result<()> {
    info!("Starting DLA engine...");
    let config = load_config(&args)?;
    let params = config.get_sim_params()?;
    debug!("Simulation Parameters: {:#?}", params);

    let mut coordinator = RoundCoordinator::new(params)?;

    let writer: Box<dyn Write> = if args.output == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("Failed to create output file '{}'", args.output))?;
        Box::new(BufWriter::new(file))
    };
    let mut sink = RecordWriter::new(writer);

    // --- Seed the aggregate ---
    if args.no_seed {
        coordinator.seed(RecordReader::new(io::empty()), &mut sink)?;
    } else if args.input == "-" {
        coordinator.seed(RecordReader::new(io::stdin().lock()), &mut sink)?;
    } else {
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open seed file '{}'", args.input))?;
        coordinator.seed(RecordReader::new(BufReader::new(file)), &mut sink)?;
    }

    // --- Round loop ---
    let mut recorder = StatsRecorder::new(config.output.stats_interval_rounds);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    let result = coordinator.run(&mut sink, |snapshot| {
        recorder.observe(snapshot);

        let now = Instant::now();
        if now.duration_since(previous_print_time).as_secs_f64() >= PRINT_INTERVAL_SECS {
            info!(
                "Round {} | Particles: {} | Radius: {:.2} | Round Time: {:6.2} ms | Elapsed: {:.2} s",
                snapshot.round + 1,
                snapshot.total_particles,
                snapshot.bounding_radius,
                snapshot.round_time_ms,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = now;
        } else {
            trace!("Round {} completed in {:.2} ms", snapshot.round + 1, snapshot.round_time_ms);
        }
    });

    match result {
        Ok(()) => {}
        // A closed downstream pipe ends the run like a shutdown request
        Err(e) if is_broken_pipe(&e) => info!("Output stream closed; stopping."),
        Err(e) => return Err(e),
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds with {} particles ({} records written, RNG seed {}).",
        total_duration.as_secs_f64(),
        coordinator.model().len(),
        sink.records_written(),
        coordinator.rng_seed()
    );

    // --- Save side outputs ---
    if config.output.save_stats {
        if let Err(e) = save_snapshots(&config.output, &recorder.finish()) {
            error!("Error saving round statistics: {:#}", e);
        }
    } else {
        info!("Skipping round statistics as per config (save_stats is false).");
    }

    if config.output.save_positions {
        let path = positions_path(&config.output);
        if let Err(e) = save_particles_csv(&path, coordinator.model().particles()) {
            error!("Error saving particle positions: {:#}", e);
        }
    }

    Ok(())
}

fn is_broken_pipe(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io_err| io_err.kind() == io::ErrorKind::BrokenPipe)
}
