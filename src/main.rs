//! # Media Captioner CLI (`captioner`)
//!
//! ## Usage
//!
//! ```bash
//! captioner --config ./config/captioner.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `captioner scan` | List the media discovery finds |
//! | `captioner images` | Convert HEIC photos and caption every image |
//! | `captioner videos` | Caption every distinct video |
//! | `captioner compare [FILES...]` | Caption images with two models side by side |
//!
//! Logging goes through `tracing`; set `RUST_LOG=media_captioner=debug` to
//! see every request.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use media_captioner::backend::GeminiBackend;
use media_captioner::config;
use media_captioner::models::RunSummary;
use media_captioner::normalize::CommandConverter;
use media_captioner::pipeline::{self, RunContext, RunOptions};
use media_captioner::progress::ProgressMode;

/// Auto-caption gallery photos and videos with a multimodal model.
#[derive(Parser)]
#[command(name = "captioner", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/captioner.toml")]
    config: PathBuf,

    /// Override `[content].dir` from the config file.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List images, HEIC files, and videos found in the content directory.
    Scan,

    /// Caption every still image (HEIC files are converted to JPEG first).
    Images {
        /// Show what would be processed without converting or calling the API.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of images to caption.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Caption every distinct video.
    Videos {
        /// Show what would be processed without calling the API.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of videos to caption.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Caption images with `[compare].model_a` and `model_b` concurrently.
    Compare {
        /// Image file names inside the content directory. Defaults to `[compare].files`.
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(dir) = cli.dir {
        cfg.content.dir = dir;
        config::validate(&cfg)?;
    }

    let job = match cli.command {
        Commands::Scan => return pipeline::run_scan(&cfg),
        Commands::Images { dry_run: true, .. } => return pipeline::plan_images(&cfg),
        Commands::Videos { dry_run: true, .. } => return pipeline::plan_videos(&cfg),
        Commands::Images { limit, .. } => Job::Images { limit },
        Commands::Videos { limit, .. } => Job::Videos { limit },
        Commands::Compare { files } => Job::Compare { files },
    };

    run_job(&cfg, cli.progress, job).await
}

/// Commands that call the inference API.
enum Job {
    Images { limit: Option<usize> },
    Videos { limit: Option<usize> },
    Compare { files: Vec<String> },
}

async fn run_job(
    cfg: &config::Config,
    progress: Option<ProgressMode>,
    job: Job,
) -> anyhow::Result<()> {
    let reporter = progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let backend = GeminiBackend::new(&cfg.api, cfg.api.resolve_key()?)?;
    let converter = CommandConverter::new(&cfg.normalizer);
    let ctx = RunContext {
        config: cfg,
        backend: &backend,
        converter: &converter,
        reporter: reporter.as_ref(),
    };

    match job {
        Job::Images { limit } => {
            let opts = RunOptions { dry_run: false, limit };
            let summary = pipeline::run_images(&ctx, opts).await?;
            print_summary("images", &summary);
        }
        Job::Videos { limit } => {
            let opts = RunOptions { dry_run: false, limit };
            let summary = pipeline::run_videos(&ctx, opts).await?;
            print_summary("videos", &summary);
        }
        Job::Compare { files } => {
            let backend_b = GeminiBackend::new(&cfg.api, cfg.compare.resolve_key_b(&cfg.api)?)?;
            let run = pipeline::run_compare(&ctx, &backend_b, &files).await?;

            println!("compare {} vs {}", cfg.compare.model_a, cfg.compare.model_b);
            println!("  images compared: {}", run.results.len());
            for (idx, r) in run.results.iter().enumerate() {
                println!("  {}. {}", idx + 1, r.filename);
                println!("     {}: {}", r.result_a.model, preview(r.result_a.outcome.text()));
                println!("     {}: {}", r.result_b.model, preview(r.result_b.outcome.text()));
            }
            println!("  output: {}", run.output.display());
            println!("ok");
        }
    }

    Ok(())
}

fn print_summary(pipeline: &str, summary: &RunSummary) {
    println!("caption {}", pipeline);
    println!("  analyzed: {}", summary.total);
    println!("  successful: {}", summary.successful);
    println!("  failed: {}", summary.failed);
    if let Some(output) = &summary.output {
        println!("  output: {}", output.display());
    }
    println!("ok");
}

/// First 100 characters on one line.
fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(100).collect();
    if flat.chars().count() > 100 {
        out.push_str("...");
    }
    out
}
