//! Library-level tests for the captioning pipelines.
//!
//! A scripted in-memory backend stands in for the remote model and an
//! in-process converter stands in for `sips`, so these run anywhere.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use media_captioner::backend::{InferenceBackend, InlineMedia};
use media_captioner::config::{Config, SkipPolicy};
use media_captioner::models::{CaptionOutcome, CaptionResult};
use media_captioner::normalize::Converter;
use media_captioner::pipeline::{
    plan_images, plan_videos, run_compare, run_images, run_videos, RunContext, RunOptions,
};
use media_captioner::progress::{NoProgress, PipelineEvent, ProgressReporter};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

// ─── Test doubles ───────────────────────────────────────────────────

/// Answers `"ok:<file contents>"`; fails with "quota exceeded" when the
/// file contains `quota`.
struct ScriptedBackend {
    label: String,
    calls: Mutex<Vec<(String, String)>>, // (model, mime)
}

impl ScriptedBackend {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, model: &str, _prompt: &str, media: &InlineMedia) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), media.mime_type.clone()));
        let bytes = STANDARD.decode(&media.data)?;
        let body = String::from_utf8_lossy(&bytes).to_string();
        if body == "quota" {
            bail!("quota exceeded");
        }
        Ok(format!("{}{}", self.label, body))
    }
}

/// Copies the file, or fails for sources whose name contains "corrupt".
struct CopyConverter;

impl Converter for CopyConverter {
    fn name(&self) -> &str {
        "copy"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        if input.to_string_lossy().contains("corrupt") {
            bail!("unsupported HEIC variant");
        }
        fs::copy(input, output)?;
        Ok(())
    }
}

/// Records every event it sees.
#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<PipelineEvent>>,
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn gallery(files: &[(&str, &str)]) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    for (name, body) in files {
        fs::write(tmp.path().join(name), body).unwrap();
    }
    let mut cfg = Config::for_dir(tmp.path());
    cfg.pipeline.inter_item_delay_ms = 0;
    cfg.compare.delay_ms = 0;
    (tmp, cfg)
}

fn read_artifact(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

// ─── Image pipeline ─────────────────────────────────────────────────

#[tokio::test]
async fn images_originals_then_converted() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.heic", "b")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!((summary.total, summary.successful, summary.failed), (2, 2, 0));

    let artifact = read_artifact(&cfg.content.image_output_path());
    assert_eq!(
        artifact,
        json!([
            {"filename": "a.jpg", "analysis": "ok:a"},
            {"filename": "b.jpg", "analysis": "ok:b"}
        ])
    );
    assert!(cfg.content.dir.join("b.jpg").exists());

    let calls = backend.calls();
    assert!(calls.iter().all(|(model, mime)| model == "gemini-2.0-flash-exp" && mime == "image/jpeg"));
}

#[tokio::test]
async fn remote_failure_is_recorded_and_run_continues() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "quota"), ("c.png", "c")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!((summary.successful, summary.failed), (1, 1));

    let artifact = read_artifact(&cfg.content.image_output_path());
    assert_eq!(
        artifact,
        json!([
            {"filename": "a.jpg", "error": "quota exceeded"},
            {"filename": "c.png", "analysis": "ok:c"}
        ])
    );
    assert_eq!(backend.calls()[1].1, "image/png");
}

#[tokio::test]
async fn every_attempted_item_has_exactly_one_outcome() {
    let (_tmp, cfg) = gallery(&[
        ("1.jpg", "x"),
        ("2.jpg", "quota"),
        ("3.jpeg", "y"),
        ("4.heic", "z"),
        ("5.heic", "quota"),
    ]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    run_images(&ctx, RunOptions::default()).await.unwrap();

    let artifact = read_artifact(&cfg.content.image_output_path());
    let entries = artifact.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    for entry in entries {
        let has_analysis = entry.get("analysis").is_some();
        let has_error = entry.get("error").is_some();
        assert!(has_analysis ^ has_error, "{}", entry);
    }
    assert_eq!(backend.calls().len(), 5);
}

#[tokio::test]
async fn conversion_failures_are_omitted_by_default() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("corrupt.heic", "?"), ("d.heic", "d")]);
    let backend = ScriptedBackend::new("ok:");
    let reporter = RecordingReporter::default();
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &reporter,
    };

    let summary = run_images(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!(summary.total, 2);

    let results: Vec<CaptionResult> =
        serde_json::from_value(read_artifact(&cfg.content.image_output_path())).unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "d.jpg"]);

    let events = reporter.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::ConversionFailed { source, .. } if source == "corrupt.heic"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Saved { count: 2, .. })));
}

#[tokio::test]
async fn conversion_failures_recorded_when_configured() {
    let (_tmp, mut cfg) = gallery(&[("a.jpg", "a"), ("corrupt.heic", "?")]);
    cfg.pipeline.skipped = SkipPolicy::Record;
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!((summary.total, summary.failed), (2, 1));

    let artifact = read_artifact(&cfg.content.image_output_path());
    assert_eq!(
        artifact,
        json!([
            {"filename": "corrupt.heic", "error": "conversion failed: unsupported HEIC variant"},
            {"filename": "a.jpg", "analysis": "ok:a"}
        ])
    );
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn converted_file_already_on_disk_is_captioned_once() {
    // A previous run left b.jpg next to b.heic.
    let (_tmp, cfg) = gallery(&[("b.heic", "b"), ("b.jpg", "b")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn marked_heic_duplicates_are_not_converted() {
    let (_tmp, cfg) = gallery(&[("b.heic", "b"), ("b(1).heic", "b")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    run_images(&ctx, RunOptions::default()).await.unwrap();
    assert!(!cfg.content.dir.join("b(1).jpg").exists());
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.heic", "b")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(
        &ctx,
        RunOptions {
            dry_run: true,
            limit: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.total, 0);
    assert!(backend.calls().is_empty());
    assert!(!cfg.content.dir.join("b.jpg").exists());
    assert!(!cfg.content.image_output_path().exists());
}

#[tokio::test]
async fn limit_caps_captioned_items() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.jpg", "b"), ("c.jpg", "c")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(
        &ctx,
        RunOptions {
            dry_run: false,
            limit: Some(2),
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.total, 2);
}

#[test]
fn plans_need_no_backend_and_touch_nothing() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.heic", "b"), ("v.MOV", "v")]);

    plan_images(&cfg).unwrap();
    plan_videos(&cfg).unwrap();

    assert!(!cfg.content.dir.join("b.jpg").exists());
    assert!(!cfg.content.image_output_path().exists());
    assert!(!cfg.content.video_output_path().exists());
}

#[tokio::test]
async fn limit_stops_heic_conversion_once_reached() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.heic", "b"), ("c.heic", "c"), ("d.heic", "d")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(
        &ctx,
        RunOptions {
            dry_run: false,
            limit: Some(2),
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.total, 2);
    assert!(cfg.content.dir.join("b.jpg").exists());
    assert!(!cfg.content.dir.join("c.jpg").exists());
    assert!(!cfg.content.dir.join("d.jpg").exists());

    let artifact = read_artifact(&cfg.content.image_output_path());
    assert_eq!(
        artifact,
        json!([
            {"filename": "a.jpg", "analysis": "ok:a"},
            {"filename": "b.jpg", "analysis": "ok:b"}
        ])
    );
}

#[tokio::test]
async fn limit_reached_by_originals_converts_nothing() {
    let (_tmp, cfg) = gallery(&[("a.jpg", "a"), ("b.heic", "b"), ("c.heic", "c")]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_images(
        &ctx,
        RunOptions {
            dry_run: false,
            limit: Some(1),
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.total, 1);
    assert!(!cfg.content.dir.join("b.jpg").exists());
    assert!(!cfg.content.dir.join("c.jpg").exists());
}

#[tokio::test]
async fn missing_content_dir_aborts_the_run() {
    let (tmp, mut cfg) = gallery(&[]);
    cfg.content.dir = tmp.path().join("not-here");
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    assert!(run_images(&ctx, RunOptions::default()).await.is_err());
    assert!(run_videos(&ctx, RunOptions::default()).await.is_err());
}

// ─── Video pipeline ─────────────────────────────────────────────────

#[tokio::test]
async fn videos_skip_duplicate_takes() {
    let (_tmp, cfg) = gallery(&[
        ("IMG_1(1).MOV", "dup"),
        ("IMG_1.MOV", "one"),
        ("IMG_2.MOV", "two"),
        ("IMG_3(1).MOV", "orphan"),
        ("still.jpg", "s"),
    ]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let summary = run_videos(&ctx, RunOptions::default()).await.unwrap();
    assert_eq!(summary.total, 2);

    let artifact = read_artifact(&cfg.content.video_output_path());
    assert_eq!(
        artifact,
        json!([
            {"filename": "IMG_1.MOV", "analysis": "ok:one"},
            {"filename": "IMG_2.MOV", "analysis": "ok:two"}
        ])
    );
    let calls = backend.calls();
    assert!(calls
        .iter()
        .all(|(model, mime)| model == "gemini-1.5-flash" && mime == "video/quicktime"));
}

// ─── Comparison ─────────────────────────────────────────────────────

#[tokio::test]
async fn compare_runs_both_models_and_skips_missing_files() {
    let (_tmp, mut cfg) = gallery(&[("x.jpg", "x"), ("y.png", "quota")]);
    cfg.compare.files = vec!["x.jpg".into(), "gone.jpg".into(), "y.png".into()];
    cfg.compare.model_a = "model-a".into();
    cfg.compare.model_b = "model-b".into();
    let backend_a = ScriptedBackend::new("A:");
    let backend_b = ScriptedBackend::new("B:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend_a,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let run = run_compare(&ctx, &backend_b, &[]).await.unwrap();
    assert_eq!(run.results.len(), 2);
    assert_eq!(run.output, cfg.content.compare_output_path());
    assert_eq!(run.results[0].result_a.outcome, CaptionOutcome::Analysis("A:x".into()));
    assert_eq!(run.results[0].result_b.outcome, CaptionOutcome::Analysis("B:x".into()));

    let artifact = read_artifact(&run.output);
    assert_eq!(
        artifact[1],
        json!({
            "filename": "y.png",
            "resultA": {"model": "model-a", "error": "quota exceeded"},
            "resultB": {"model": "model-b", "error": "quota exceeded"}
        })
    );
    assert!(backend_a.calls().iter().all(|(m, _)| m == "model-a"));
    assert!(backend_b.calls().iter().all(|(m, _)| m == "model-b"));
}

#[tokio::test]
async fn compare_progress_counts_only_existing_files() {
    let (_tmp, mut cfg) = gallery(&[("x.jpg", "x"), ("y.png", "y")]);
    cfg.compare.files = vec!["x.jpg".into(), "gone.jpg".into(), "y.png".into()];
    let backend = ScriptedBackend::new("ok:");
    let reporter = RecordingReporter::default();
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &reporter,
    };

    run_compare(&ctx, &backend, &[]).await.unwrap();

    let positions: Vec<(String, usize, usize)> = reporter
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Captioning {
                filename, n, total, ..
            } => Some((filename.clone(), *n, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        positions,
        vec![("x.jpg".to_string(), 1, 2), ("y.png".to_string(), 2, 2)]
    );
}

#[tokio::test]
async fn compare_cli_files_override_config() {
    let (_tmp, mut cfg) = gallery(&[("x.jpg", "x"), ("z.jpg", "z")]);
    cfg.compare.files = vec!["x.jpg".into()];
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };

    let run = run_compare(&ctx, &backend, &["z.jpg".to_string()]).await.unwrap();
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].filename, "z.jpg");
}

#[tokio::test]
async fn compare_without_files_is_an_error() {
    let (_tmp, cfg) = gallery(&[]);
    let backend = ScriptedBackend::new("ok:");
    let ctx = RunContext {
        config: &cfg,
        backend: &backend,
        converter: &CopyConverter,
        reporter: &NoProgress,
    };
    assert!(run_compare(&ctx, &backend, &[]).await.is_err());
}
