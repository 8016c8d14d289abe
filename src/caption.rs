//! Captioning client: one remote call per media item, paced.

use std::time::Duration;

use crate::backend::{InferenceBackend, InlineMedia};
use crate::models::{CaptionOutcome, CaptionResult, MediaItem};
use crate::progress::{EventSink, PipelineEvent};

/// Spaces remote calls by a fixed delay.
///
/// The first call goes out immediately; each later call waits `delay` first,
/// so nothing sleeps after the final item.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    calls: usize,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, calls: 0 }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub async fn wait_turn(&mut self) {
        if self.calls > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls += 1;
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

/// Ask `model` about one item. Any failure becomes an error outcome.
pub async fn caption_outcome(
    backend: &dyn InferenceBackend,
    model: &str,
    prompt: &str,
    item: &MediaItem,
) -> CaptionOutcome {
    let media = match InlineMedia::load(item) {
        Ok(m) => m,
        Err(e) => return CaptionOutcome::Error(format!("{:#}", e)),
    };
    match backend.generate(model, prompt, &media).await {
        Ok(text) => CaptionOutcome::Analysis(text),
        Err(e) => CaptionOutcome::Error(format!("{:#}", e)),
    }
}

pub async fn caption_item(
    backend: &dyn InferenceBackend,
    model: &str,
    prompt: &str,
    item: &MediaItem,
) -> CaptionResult {
    CaptionResult {
        filename: item.filename.clone(),
        outcome: caption_outcome(backend, model, prompt, item).await,
    }
}

/// Caption `items` in order, one at a time, emitting an event per stage.
///
/// Returns how many items were attempted.
pub async fn caption_all(
    pipeline: &str,
    items: &[MediaItem],
    backend: &dyn InferenceBackend,
    model: &str,
    prompt: &str,
    pacer: &mut Pacer,
    sink: &mut EventSink<'_>,
) -> usize {
    let total = items.len();
    for (idx, item) in items.iter().enumerate() {
        pacer.wait_turn().await;
        sink.notify(PipelineEvent::Captioning {
            pipeline: pipeline.to_string(),
            filename: item.filename.clone(),
            n: idx + 1,
            total,
        });

        let result = caption_item(backend, model, prompt, item).await;
        let event = match result.outcome {
            CaptionOutcome::Analysis(text) => PipelineEvent::Captioned {
                filename: result.filename,
                text,
            },
            CaptionOutcome::Error(error) => {
                tracing::debug!(file = %item.filename, %error, "caption failed");
                PipelineEvent::CaptionFailed {
                    filename: result.filename,
                    error,
                }
            }
        };
        sink.emit(event);
    }
    total
}
