//! gblur - GPU Gaussian blur driver
//!
//! Blurs PNG images with the direct or separable pipeline, benchmarks both
//! strategies with device timestamps, and drives radius sweeps through the
//! request coalescer.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gblur")]
#[command(author, version, about = "GPU Gaussian blur: direct and separable pipelines")]
#[command(long_about = "
Gaussian blur on the GPU via wgpu, with a CPU reference for comparison.

Examples:
  gblur formats                              # List supported pixel formats
  gblur blur in.png -o out.png -r 8          # Separable blur, radius 8
  gblur blur in.png -o out.png -r 8 --method direct --timing
  gblur blur in.png -o out.png -r 3 --cpu    # CPU reference
  gblur bench --size 1024 --radii 1,2,4,8,16
  gblur sweep in.png -o out.png --radii 1,5,9,13,17

Environment:
  GBLUR_BACKEND=vulkan|metal|dx12|gl|all     # Restrict wgpu backends
  RUST_LOG=gblur_gpu=debug                   # Override log filter
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of threads for the CPU reference (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pixel formats
    #[command(visible_alias = "f")]
    Formats,

    /// Blur a PNG image
    #[command(visible_alias = "b")]
    Blur(BlurArgs),

    /// Time direct vs separable across radii
    Bench(BenchArgs),

    /// Fire concurrent radius updates through the request coalescer
    Sweep(SweepArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Method {
    Direct,
    Separable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Edge {
    Zero,
    Clamp,
}

impl From<Edge> for gblur_core::EdgeMode {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Zero => Self::Zero,
            Edge::Clamp => Self::Clamp,
        }
    }
}

#[derive(Args)]
struct BlurArgs {
    /// Input PNG
    input: PathBuf,

    /// Output PNG
    #[arg(short, long)]
    output: PathBuf,

    /// Kernel radius in pixels (0 = copy)
    #[arg(short, long, default_value = "4")]
    radius: u32,

    /// Convolution strategy
    #[arg(short, long, value_enum, default_value = "separable")]
    method: Method,

    /// Edge handling
    #[arg(short, long, value_enum, default_value = "zero")]
    edge: Edge,

    /// Report device time of the blur
    #[arg(short, long)]
    timing: bool,

    /// Use the CPU reference instead of the GPU
    #[arg(long)]
    cpu: bool,
}

#[derive(Args)]
struct BenchArgs {
    /// Square image size in pixels
    #[arg(short, long, default_value = "512")]
    size: u32,

    /// Radii to measure
    #[arg(short, long, value_delimiter = ',', default_value = "1,2,4,8,16")]
    radii: Vec<u32>,

    /// Pixel format id
    #[arg(short, long, default_value = "rgba8unorm")]
    format: String,

    /// Runs per radius and method; the mean is reported
    #[arg(short = 'n', long, default_value = "5")]
    iterations: u32,

    /// Benchmark the CPU reference instead of the GPU
    #[arg(long)]
    cpu: bool,
}

#[derive(Args)]
struct SweepArgs {
    /// Input PNG
    input: PathBuf,

    /// Output PNG (result of the last execution)
    #[arg(short, long)]
    output: PathBuf,

    /// Radii to request, one thread each, in order
    #[arg(short, long, value_delimiter = ',', required = true)]
    radii: Vec<u32>,

    /// Delay between successive requests in milliseconds
    #[arg(long, default_value = "2")]
    stagger_ms: u64,

    /// Use the CPU reference instead of the GPU
    #[arg(long)]
    cpu: bool,
}

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,gblur={level},gblur_core={level},gblur_gpu={level}"))
    });

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Formats => commands::formats::run(cli.verbose),
        Commands::Blur(args) => commands::blur::run(args, cli.verbose),
        Commands::Bench(args) => commands::bench::run(args, cli.verbose),
        Commands::Sweep(args) => commands::sweep::run(args, cli.verbose),
    }
}
