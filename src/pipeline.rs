//! Pipeline orchestration.
//!
//! Coordinates a full run: discovery → normalization (HEIC only) →
//! captioning, one item at a time → artifact. Conversion and captioning
//! failures are per-item and never abort the run; failing to list the
//! content directory or to write the artifact does.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::artifact::write_results;
use crate::backend::InferenceBackend;
use crate::caption::{caption_all, caption_outcome, Pacer};
use crate::config::Config;
use crate::discovery::{scan_content_dir, Discovered};
use crate::models::{
    file_name_of, CaptionOutcome, ComparisonResult, MediaItem, MediaKind, ModelAnswer, RunSummary,
};
use crate::normalize::{normalize, Converter};
use crate::progress::{EventSink, PipelineEvent, ProgressReporter};
use crate::prompt::caption_prompt;

/// Collaborators shared by every pipeline run.
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub backend: &'a dyn InferenceBackend,
    pub converter: &'a dyn Converter,
    pub reporter: &'a dyn ProgressReporter,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Discover (and, for images, plan conversions) without converting or calling the API.
    pub dry_run: bool,
    /// Caption at most this many items.
    pub limit: Option<usize>,
}

/// Caption every still image in the content directory.
///
/// Originals come first, then HEIC files converted to JPEG, in discovery
/// order. A converted file that already exists among the originals is not
/// captioned twice.
pub async fn run_images(ctx: &RunContext<'_>, opts: RunOptions) -> Result<RunSummary> {
    let config = ctx.config;
    let found = scan_content_dir(&config.discovery, &config.content.dir)?;
    let mut sink = EventSink::new(config.pipeline.skipped, ctx.reporter);

    sink.notify(PipelineEvent::Discovered {
        pipeline: "images".to_string(),
        count: found.images.len() + found.heic.len(),
        convert: found.heic.len(),
    });

    if opts.dry_run {
        print_image_plan(&found);
        return Ok(RunSummary::from_results(&[], None));
    }

    let Discovered { images, heic, .. } = found;
    let mut work = images;

    for source in &heic {
        if opts.limit.is_some_and(|limit| work.len() >= limit) {
            break;
        }
        let source_name = file_name_of(source);
        match normalize(ctx.converter, source) {
            Ok(converted) => {
                sink.emit(PipelineEvent::Converted {
                    source: source_name,
                    output: file_name_of(&converted),
                });
                if !work.iter().any(|item| item.path == converted) {
                    work.push(MediaItem::new(converted, MediaKind::Image));
                }
            }
            Err(e) => {
                tracing::warn!(file = %source.display(), error = %format!("{:#}", e), "conversion failed");
                sink.emit(PipelineEvent::ConversionFailed {
                    source: source_name,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    if let Some(limit) = opts.limit {
        work.truncate(limit);
    }

    let prompt = caption_prompt(MediaKind::Image, &config.pipeline.gallery_categories);
    let mut pacer = Pacer::from_millis(config.pipeline.inter_item_delay_ms);
    caption_all(
        "images",
        &work,
        ctx.backend,
        &config.api.image_model,
        &prompt,
        &mut pacer,
        &mut sink,
    )
    .await;

    let output = config.content.image_output_path();
    finish(sink, output)
}

/// Caption every distinct video in the content directory.
pub async fn run_videos(ctx: &RunContext<'_>, opts: RunOptions) -> Result<RunSummary> {
    let config = ctx.config;
    let found = scan_content_dir(&config.discovery, &config.content.dir)?;
    let mut sink = EventSink::new(config.pipeline.skipped, ctx.reporter);

    sink.notify(PipelineEvent::Discovered {
        pipeline: "videos".to_string(),
        count: found.videos.len(),
        convert: 0,
    });

    if opts.dry_run {
        print_video_plan(&found);
        return Ok(RunSummary::from_results(&[], None));
    }

    let mut work = found.videos;
    if let Some(limit) = opts.limit {
        work.truncate(limit);
    }

    let prompt = caption_prompt(MediaKind::Video, &config.pipeline.gallery_categories);
    let mut pacer = Pacer::from_millis(config.pipeline.inter_item_delay_ms);
    caption_all(
        "videos",
        &work,
        ctx.backend,
        &config.api.video_model,
        &prompt,
        &mut pacer,
        &mut sink,
    )
    .await;

    let output = config.content.video_output_path();
    finish(sink, output)
}

/// Dry run of [`run_images`] that needs no backend or converter.
pub fn plan_images(config: &Config) -> Result<()> {
    let found = scan_content_dir(&config.discovery, &config.content.dir)?;
    print_image_plan(&found);
    Ok(())
}

/// Dry run of [`run_videos`] that needs no backend.
pub fn plan_videos(config: &Config) -> Result<()> {
    let found = scan_content_dir(&config.discovery, &config.content.dir)?;
    print_video_plan(&found);
    Ok(())
}

fn print_image_plan(found: &Discovered) {
    println!("images (dry-run)");
    println!("  images found: {}", found.images.len());
    println!("  heic to convert: {}", found.heic.len());
    println!("  duplicates skipped: {}", found.duplicates.len());
}

fn print_video_plan(found: &Discovered) {
    println!("videos (dry-run)");
    println!("  videos found: {}", found.videos.len());
    println!("  duplicates skipped: {}", found.duplicates.len());
}

fn finish(sink: EventSink<'_>, output: PathBuf) -> Result<RunSummary> {
    let summary = RunSummary::from_results(sink.collected(), Some(output.clone()));
    write_results(&output, sink.collected())?;
    sink.notify(PipelineEvent::Saved {
        path: output,
        count: summary.total,
    });
    Ok(summary)
}

/// Results of a head-to-head run and where they were written.
#[derive(Debug)]
pub struct ComparisonRun {
    pub results: Vec<ComparisonResult>,
    pub output: PathBuf,
}

/// Caption each named image with two models concurrently.
///
/// `files` defaults to `[compare].files`. Names that don't exist in the
/// content directory are skipped with a warning.
pub async fn run_compare(
    ctx: &RunContext<'_>,
    backend_b: &dyn InferenceBackend,
    files: &[String],
) -> Result<ComparisonRun> {
    let config = ctx.config;
    let compare = &config.compare;
    let files = if files.is_empty() {
        compare.files.as_slice()
    } else {
        files
    };
    if files.is_empty() {
        bail!("No images to compare: pass file names or set [compare].files");
    }

    let items: Vec<MediaItem> = files
        .iter()
        .filter_map(|name| {
            let path = config.content.dir.join(name);
            if path.is_file() {
                Some(MediaItem::new(path, MediaKind::Image))
            } else {
                tracing::warn!(file = %path.display(), "image not found, skipping");
                None
            }
        })
        .collect();

    let prompt = caption_prompt(MediaKind::Image, &config.pipeline.gallery_categories);
    let mut pacer = Pacer::from_millis(compare.delay_ms);
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    for (idx, item) in items.into_iter().enumerate() {
        pacer.wait_turn().await;
        ctx.reporter.report(&PipelineEvent::Captioning {
            pipeline: "compare".to_string(),
            filename: item.filename.clone(),
            n: idx + 1,
            total,
        });

        let (a, b) = tokio::join!(
            caption_outcome(ctx.backend, &compare.model_a, &prompt, &item),
            caption_outcome(backend_b, &compare.model_b, &prompt, &item),
        );

        for (model, outcome) in [(&compare.model_a, &a), (&compare.model_b, &b)] {
            let filename = format!("{} [{}]", item.filename, model);
            ctx.reporter.report(&match outcome {
                CaptionOutcome::Analysis(text) => PipelineEvent::Captioned {
                    filename,
                    text: text.clone(),
                },
                CaptionOutcome::Error(error) => PipelineEvent::CaptionFailed {
                    filename,
                    error: error.clone(),
                },
            });
        }

        results.push(ComparisonResult {
            filename: item.filename,
            result_a: ModelAnswer {
                model: compare.model_a.clone(),
                outcome: a,
            },
            result_b: ModelAnswer {
                model: compare.model_b.clone(),
                outcome: b,
            },
        });
    }

    let output = config.content.compare_output_path();
    write_results(&output, &results)?;
    ctx.reporter.report(&PipelineEvent::Saved {
        path: output.clone(),
        count: results.len(),
    });

    Ok(ComparisonRun { results, output })
}

/// Print what discovery finds, without converting or captioning anything.
pub fn run_scan(config: &Config) -> Result<()> {
    let found = scan_content_dir(&config.discovery, &config.content.dir)?;

    println!("{:<8} {}", "KIND", "FILE");
    for item in &found.images {
        println!("{:<8} {}", "image", item.filename);
    }
    for path in &found.heic {
        println!("{:<8} {}", "heic", file_name_of(path));
    }
    for item in &found.videos {
        println!("{:<8} {}", "video", item.filename);
    }
    for name in &found.duplicates {
        println!("{:<8} {}", "dup", name);
    }
    println!(
        "images: {}  heic: {}  videos: {}  duplicates: {}",
        found.images.len(),
        found.heic.len(),
        found.videos.len(),
        found.duplicates.len()
    );
    Ok(())
}
