//! geofocal CLI - Gaussian focal filter for single-band rasters

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use geofocal_algorithms::filter::{focal_filter, GaussianParams, Kernel, KernelAnchor, OutputSpec};
use geofocal_core::io::{CreationOptions, DefaultStore};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geofocal")]
#[command(author, version, about = "Gaussian focal filter for single-band rasters", long_about = None)]
struct Cli {
    /// Input raster file (band 1 is filtered)
    input: PathBuf,

    /// Output raster file
    output: PathBuf,

    /// Kernel height in cells
    #[arg(long, default_value = "3")]
    height: usize,

    /// Kernel width in cells
    #[arg(long, default_value = "3")]
    width: usize,

    /// Gaussian standard deviation, in cells
    #[arg(short, long, default_value = "10.0")]
    sigma: f64,

    /// Centre the Gaussian in the window instead of on its top-left cell
    #[arg(long)]
    centered: bool,

    /// Output format
    #[arg(short, long, default_value = "GTiff")]
    format: String,

    /// Output compression: DEFLATE, LZW, PACKBITS, NONE
    #[arg(short, long, default_value = "DEFLATE")]
    compress: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Wait for Enter before exiting
    #[arg(long)]
    pause: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Attach the failing stage to a library error
fn staged(err: geofocal_core::Error) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("{} failed", stage))
}

fn wait_for_enter() {
    eprintln!("Press Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn run(cli: &Cli) -> Result<()> {
    let anchor = if cli.centered {
        KernelAnchor::Center
    } else {
        KernelAnchor::Corner
    };
    let kernel = Kernel::gaussian_with(GaussianParams {
        height: cli.height,
        width: cli.width,
        sigma: cli.sigma,
        anchor,
    })
    .map_err(staged)?;
    debug!(
        "Kernel {}x{}, sigma = {}, anchor = {:?}",
        kernel.height(),
        kernel.width(),
        cli.sigma,
        anchor
    );

    let spec = OutputSpec::new(
        cli.format.as_str(),
        CreationOptions::empty().with(CreationOptions::COMPRESS, &cli.compress),
    );

    let pb = spinner("Filtering...");
    let start = Instant::now();
    let result = focal_filter(&DefaultStore::default(), &kernel, &cli.input, &cli.output, &spec);
    pb.finish_and_clear();
    let report = result.map_err(staged)?;

    info!(
        "{}x{} -> {}x{} in {:.2?}",
        report.input_shape.0,
        report.input_shape.1,
        report.stats.out_rows,
        report.stats.out_cols,
        start.elapsed()
    );
    println!("geofocal: process completed on: {}", cli.input.display());
    println!("geofocal: your output image {} is ready!", cli.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("warning: {:#}", e);
    }

    let code = match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    };

    if cli.pause {
        wait_for_enter();
    }
    code
}
