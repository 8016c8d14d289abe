//! Pipeline events and their subscribers.
//!
//! Every stage transition (discovered, converted, captioned, failed, saved)
//! is emitted once as a [`PipelineEvent`]. Two kinds of subscriber consume
//! them: a [`ProgressReporter`] that tells the operator what is happening,
//! and the [`ResultCollector`] that builds the result set the artifact writer
//! persists. Progress is emitted on **stderr** so stdout stays parseable.

use std::io::Write;
use std::path::PathBuf;

use crate::config::SkipPolicy;
use crate::models::CaptionResult;

/// A single stage transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Discovery finished. `convert` counts files awaiting normalization.
    Discovered {
        pipeline: String,
        count: usize,
        convert: usize,
    },
    Converted {
        source: String,
        output: String,
    },
    ConversionFailed {
        source: String,
        reason: String,
    },
    /// About to call the remote model for item `n` of `total`.
    Captioning {
        pipeline: String,
        filename: String,
        n: usize,
        total: usize,
    },
    Captioned {
        filename: String,
        text: String,
    },
    CaptionFailed {
        filename: String,
        error: String,
    },
    Saved {
        path: PathBuf,
        count: usize,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &PipelineEvent);
}

/// Human-friendly progress on stderr: "caption images  3 / 12  IMG_5217.JPG".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &PipelineEvent) {
        let line = match event {
            PipelineEvent::Discovered {
                pipeline,
                count,
                convert,
            } => {
                if *convert > 0 {
                    format!(
                        "{}  found {} files ({} to convert)\n",
                        pipeline, count, convert
                    )
                } else {
                    format!("{}  found {} files\n", pipeline, count)
                }
            }
            PipelineEvent::Converted { source, output } => {
                format!("convert  {} -> {}\n", source, output)
            }
            PipelineEvent::ConversionFailed { source, reason } => {
                format!("convert  {}  FAILED: {}\n", source, reason)
            }
            PipelineEvent::Captioning {
                pipeline,
                filename,
                n,
                total,
            } => format!("caption {}  {} / {}  {}\n", pipeline, n, total, filename),
            PipelineEvent::Captioned { filename, text } => {
                format!("  ok  {}\n{}\n", filename, text.trim_end())
            }
            PipelineEvent::CaptionFailed { filename, error } => {
                format!("  FAILED  {}: {}\n", filename, error)
            }
            PipelineEvent::Saved { path, count } => {
                format!("saved {} results to {}\n", count, path.display())
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &PipelineEvent) {
        let obj = event_json(event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &PipelineEvent) -> serde_json::Value {
    match event {
        PipelineEvent::Discovered {
            pipeline,
            count,
            convert,
        } => serde_json::json!({
            "event": "discovered",
            "pipeline": pipeline,
            "count": count,
            "convert": convert
        }),
        PipelineEvent::Converted { source, output } => serde_json::json!({
            "event": "converted",
            "source": source,
            "output": output
        }),
        PipelineEvent::ConversionFailed { source, reason } => serde_json::json!({
            "event": "conversion_failed",
            "source": source,
            "reason": reason
        }),
        PipelineEvent::Captioning {
            pipeline,
            filename,
            n,
            total,
        } => serde_json::json!({
            "event": "captioning",
            "pipeline": pipeline,
            "filename": filename,
            "n": n,
            "total": total
        }),
        PipelineEvent::Captioned { filename, text } => serde_json::json!({
            "event": "captioned",
            "filename": filename,
            "analysis": text
        }),
        PipelineEvent::CaptionFailed { filename, error } => serde_json::json!({
            "event": "caption_failed",
            "filename": filename,
            "error": error
        }),
        PipelineEvent::Saved { path, count } => serde_json::json!({
            "event": "saved",
            "path": path.display().to_string(),
            "count": count
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &PipelineEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Builds the ordered result set from caption events.
///
/// Conversion failures become error entries only under [`SkipPolicy::Record`].
#[derive(Debug)]
pub struct ResultCollector {
    policy: SkipPolicy,
    results: Vec<CaptionResult>,
}

impl ResultCollector {
    pub fn new(policy: SkipPolicy) -> Self {
        Self {
            policy,
            results: Vec::new(),
        }
    }

    pub fn observe(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Captioned { filename, text } => {
                self.results.push(CaptionResult::analysis(filename, text));
            }
            PipelineEvent::CaptionFailed { filename, error } => {
                self.results.push(CaptionResult::error(filename, error));
            }
            PipelineEvent::ConversionFailed { source, reason } => {
                if self.policy == SkipPolicy::Record {
                    self.results.push(CaptionResult::error(
                        source,
                        format!("conversion failed: {}", reason),
                    ));
                }
            }
            _ => {}
        }
    }

    pub fn results(&self) -> &[CaptionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CaptionResult> {
        self.results
    }
}

/// Fans one event out to the collector and the reporter.
pub struct EventSink<'a> {
    collector: ResultCollector,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> EventSink<'a> {
    pub fn new(policy: SkipPolicy, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            collector: ResultCollector::new(policy),
            reporter,
        }
    }

    pub fn emit(&mut self, event: PipelineEvent) {
        self.collector.observe(&event);
        self.reporter.report(&event);
    }

    /// Forward to the reporter only; the collector ignores non-result events.
    pub fn notify(&self, event: PipelineEvent) {
        self.reporter.report(&event);
    }

    pub fn collected(&self) -> &[CaptionResult] {
        self.collector.results()
    }

    pub fn finish(self) -> Vec<CaptionResult> {
        self.collector.into_results()
    }
}
