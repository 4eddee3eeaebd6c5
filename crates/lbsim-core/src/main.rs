//! lbsim CLI: simulate request dispatch and worker autoscaling.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lbsim_core::config::{ScaleDownMode, SimConfig};
use lbsim_core::metrics;
use lbsim_core::report::{ConsoleSink, CsvLogSink, FanOut};
use lbsim_core::trace::JsonlTraceSink;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "lbsim",
    about = "Simulate request dispatch and worker autoscaling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the base configuration comes from.
#[derive(Args)]
struct SimArgs {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Initial number of workers (prompted for when missing).
    #[arg(short, long)]
    workers: Option<u32>,
    /// Ticks to simulate (prompted for when missing).
    #[arg(short, long)]
    ticks: Option<u64>,
    /// Random seed; omit to seed from the clock.
    #[arg(short, long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single simulation.
    Run {
        #[command(flatten)]
        sim: SimArgs,
        /// Scaling policy name.
        #[arg(short, long)]
        policy: Option<String>,
        /// Scale-down behavior when the newest worker is busy.
        #[arg(long, value_parser = parse_scale_down)]
        scale_down: Option<ScaleDownMode>,
        /// Write a CSV log of every tick.
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Write a JSONL trace of every tick.
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Output the run summary to a JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Suppress console output.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Compare scaling policies on the same arrivals.
    Compare {
        #[command(flatten)]
        sim: SimArgs,
        /// Comma-separated list of policy names (default: all).
        #[arg(short = 'P', long, value_delimiter = ',')]
        policies: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep initial pool sizes.
    Sweep {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Comma-separated list of initial worker counts.
        #[arg(short, long, value_delimiter = ',', required = true)]
        workers: Vec<u32>,
        /// Ticks to simulate (prompted for when missing).
        #[arg(short, long)]
        ticks: Option<u64>,
        /// Random seed; omit to seed from the clock.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available scaling policies.
    ListPolicies,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sim,
            policy,
            scale_down,
            log_file,
            trace,
            output,
            quiet,
        } => {
            let mut config = load_config(&sim)?;
            if let Some(policy) = policy {
                config.scaling.policy = policy;
            }
            if let Some(mode) = scale_down {
                config.scaling.scale_down = mode;
            }
            if log_file.is_some() {
                config.report.log_file = log_file;
            }
            if trace.is_some() {
                config.report.trace_file = trace;
            }
            config.validate()?;

            let mut sink = FanOut::new();
            if !quiet {
                sink.push(Box::new(ConsoleSink::new(config.report.console_interval)));
            }
            if let Some(path) = &config.report.log_file {
                let log = CsvLogSink::create(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                sink.push(Box::new(log));
            }
            if let Some(path) = &config.report.trace_file {
                let trace = JsonlTraceSink::create(path)
                    .with_context(|| format!("opening trace file {}", path.display()))?;
                sink.push(Box::new(trace));
            }

            let (summary, _) = lbsim_core::run_with_sink(config, sink)?;
            if let Some(path) = output {
                write_json(&path, &summary)?;
                if !quiet {
                    println!("Results written to {}", path.display());
                }
            }
        }
        Commands::Compare {
            sim,
            policies,
            output,
        } => {
            let config = load_config(&sim)?;
            let names: Vec<&str> = if policies.is_empty() {
                lbsim_policy::available_policies()
            } else {
                policies.iter().map(String::as_str).collect()
            };

            let results = lbsim_core::compare_policies(&config, &names)?;
            println!("{}", metrics::format_comparison_table(&results));
            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(path) = output {
                write_json(&path, &results)?;
                println!("Results written to {}", path.display());
            }
        }
        Commands::Sweep {
            config,
            workers,
            ticks,
            seed,
            output,
        } => {
            let sim = SimArgs {
                config,
                workers: workers.first().copied(),
                ticks,
                seed,
            };
            let config = load_config(&sim)?;
            let results = lbsim_core::sweep_workers(&config, &workers)?;
            for result in &results {
                println!(
                    "Workers {:>3}: final={} peak={} processed={} queue p50={:.1} wait p99={:.1} | {:.1}% busy",
                    result.initial_workers,
                    result.final_workers,
                    result.peak_workers,
                    result.counters.processed,
                    result.queue_length.p50,
                    result.queue_wait.p99,
                    result.utilization * 100.0
                );
            }

            if let Some(path) = output {
                write_json(&path, &results)?;
                println!("Sweep results written to {}", path.display());
            }
        }
        Commands::ListPolicies => {
            println!("Available scaling policies:");
            for name in lbsim_policy::available_policies() {
                println!("  - {}", name);
            }
        }
    }
    Ok(())
}

/// Build the base config from a file or from flags, prompting on stdin for
/// whatever is still missing.
fn load_config(sim: &SimArgs) -> anyhow::Result<SimConfig> {
    let mut config = match &sim.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut out = io::stdout();
            let workers = match sim.workers {
                Some(n) => n,
                None => prompt_positive(&mut input, &mut out, "Enter number of servers: ")?,
            };
            let ticks = match sim.ticks {
                Some(n) => n,
                None => prompt_positive(&mut input, &mut out, "Enter number of cycles: ")?,
            };
            SimConfig::new(workers, ticks)
        }
    };
    if let Some(workers) = sim.workers {
        config.simulation.initial_workers = workers;
    }
    if let Some(ticks) = sim.ticks {
        config.simulation.run_ticks = ticks;
    }
    if sim.seed.is_some() {
        config.simulation.seed = sim.seed;
    }
    config.validate()?;
    Ok(config)
}

/// Ask until the answer parses as a number of at least 1.
fn prompt_positive<T, R, W>(input: &mut R, out: &mut W, prompt: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(out, "{}", prompt)?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            bail!("input closed before a value was entered");
        }
        match line.trim().parse::<T>() {
            Ok(value) if value >= T::from(1) => return Ok(value),
            _ => writeln!(out, "Please enter a whole number of at least 1.")?,
        }
    }
}

fn parse_scale_down(s: &str) -> Result<ScaleDownMode, String> {
    match s {
        "require_idle" | "require-idle" => Ok(ScaleDownMode::RequireIdle),
        "drop_in_flight" | "drop-in-flight" => Ok(ScaleDownMode::DropInFlight),
        other => Err(format!(
            "unknown scale-down mode {:?} (expected require_idle or drop_in_flight)",
            other
        )),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
