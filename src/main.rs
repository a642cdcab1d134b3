use clap::{Parser, Subcommand};
use clipshrink::batch::{self, BatchOptions};
use clipshrink::planner::{CancelFlag, FfmpegBackend, plan_video, probe_video};
use clipshrink::{config, output, scan};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that produce files.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the export cache: re-encode every video
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "clipshrink")]
#[command(about = "Shrink videos by a percentage of their pixel area")]
#[command(long_about = "\
Shrink videos by a percentage of their pixel area

A reduction of P percent removes P percent of the frame's pixels: both sides
are scaled by sqrt((100 - P) / 100), keeping the aspect ratio. Sizes are
computed in display orientation, so portrait phone clips stay portrait.

Before encoding anything, clipshrink predicts the output size:

  predicted = original_bytes * pixel_ratio * compression_efficiency

Commands:

  plan      show target sizes and predictions for a batch
  estimate  table of predictions across the reduction range for one video
  shrink    transcode a batch into the output directory (needs ffmpeg)

Run 'clipshrink gen-config' to generate a documented clipshrink.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "clipshrink.toml", global = true)]
    config: PathBuf,

    /// Show debug diagnostics (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Predict target sizes and output bytes without encoding
    Plan {
        /// Video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Percent of pixel area to remove
        #[arg(long)]
        reduce: Option<f64>,
    },
    /// Table of predictions across the configured reduction range
    Estimate {
        /// Video file
        input: PathBuf,
    },
    /// Transcode videos into the output directory
    Shrink {
        /// Video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Percent of pixel area to remove
        #[arg(long)]
        reduce: Option<f64>,
        /// Output directory
        #[arg(long = "output", default_value = "shrunk")]
        output_dir: PathBuf,
        /// Write a JSON report of the batch to this file
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Print a stock clipshrink.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let backend = FfmpegBackend::new();

    match cli.command {
        Command::Plan { inputs, reduce } => {
            let shrink_config = config::load_config(&cli.config)?;
            let sources = scan::collect_inputs(&inputs, None)?;
            let reduction = shrink_config.reduction.resolve(reduce);
            init_thread_pool(&shrink_config.processing);
            let settings = shrink_config.plan_settings();
            let preview = batch::preview_batch(&backend, &sources, reduction, &settings);
            output::print_preview(&preview);
        }
        Command::Estimate { input } => {
            let shrink_config = config::load_config(&cli.config)?;
            let info = probe_video(&backend, &input)?;
            let settings = shrink_config.plan_settings();
            let rows: Vec<_> = shrink_config
                .reduction
                .steps()
                .into_iter()
                .map(|p| (p, plan_video(&info, p, &settings)))
                .collect();
            output::print_estimate_table(&input, &info, &rows);
        }
        Command::Shrink {
            inputs,
            reduce,
            output_dir,
            report,
            cache,
        } => {
            let shrink_config = config::load_config(&cli.config)?;
            let sources = scan::collect_inputs(&inputs, Some(output_dir.as_path()))?;
            let reduction = shrink_config.reduction.resolve(reduce);
            init_thread_pool(&shrink_config.processing);

            let jobs = batch::jobs_from_sources(&sources);
            let options =
                BatchOptions::from_config(&shrink_config, reduction, &output_dir, !cache.no_cache);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = batch::run_batch(&backend, &jobs, &options, Some(tx), &CancelFlag::new());
            // run_batch drops the sender on return, which ends the printer loop.
            if printer.join().is_err() {
                tracing::warn!("progress printer panicked");
            }
            let result = result?;

            output::print_batch_summary(&result);
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, json)?;
                info!(path = %path.display(), "wrote batch report");
            }
            if result.failed() > 0 {
                let failed = result.failed();
                return Err(format!("{failed} of {} videos failed", result.items.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Diagnostics go to stderr so stdout stays the command's result.
fn init_logging(verbose: bool) {
    let default = if verbose { "clipshrink=debug" } else { "clipshrink=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
