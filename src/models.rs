//! Core data models used throughout the captioning pipeline.
//!
//! A [`MediaItem`] is one file queued for captioning; a [`CaptionResult`] is
//! the recorded outcome for it. The ordered list of results is what ends up
//! in the JSON artifact.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Still image or video. Drives the prompt and the MIME fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// MIME type used when the extension is not in the lookup table.
    pub fn default_mime(self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Look up the MIME type for a file extension (without the dot,
/// any case), falling back to the kind's default.
///
/// ```rust
/// use media_captioner::models::{mime_for_extension, MediaKind};
///
/// assert_eq!(mime_for_extension("PNG", MediaKind::Image), "image/png");
/// assert_eq!(mime_for_extension("MOV", MediaKind::Video), "video/quicktime");
/// assert_eq!(mime_for_extension("tiff", MediaKind::Image), "image/jpeg");
/// ```
pub fn mime_for_extension(ext: &str, kind: MediaKind) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "mov" => "video/quicktime",
        "mp4" => "video/mp4",
        _ => kind.default_mime(),
    }
}

/// One source file queued for captioning. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub filename: String,
    pub kind: MediaKind,
    pub mime_type: &'static str,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        let path = path.into();
        let filename = file_name_of(&path);
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_for_extension(&ext, kind);
        Self {
            path,
            filename,
            kind,
            mime_type,
        }
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Either the model's answer or the reason the call failed. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionOutcome {
    Analysis(String),
    Error(String),
}

impl CaptionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CaptionOutcome::Analysis(_))
    }

    pub fn text(&self) -> &str {
        match self {
            CaptionOutcome::Analysis(t) | CaptionOutcome::Error(t) => t,
        }
    }
}

/// Outcome of captioning one [`MediaItem`].
///
/// Serializes flat: `{"filename": "a.jpg", "analysis": "..."}` or
/// `{"filename": "a.jpg", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: CaptionOutcome,
}

impl CaptionResult {
    pub fn analysis(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            outcome: CaptionOutcome::Analysis(text.into()),
        }
    }

    pub fn error(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            outcome: CaptionOutcome::Error(message.into()),
        }
    }
}

/// One side of a head-to-head comparison: which model, and what it said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAnswer {
    pub model: String,
    #[serde(flatten)]
    pub outcome: CaptionOutcome,
}

/// Result of captioning one image with two competing models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub filename: String,
    pub result_a: ModelAnswer,
    pub result_b: ModelAnswer,
}

/// Totals printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub output: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_results(results: &[CaptionResult], output: Option<PathBuf>) -> Self {
        let successful = results.iter().filter(|r| r.outcome.is_success()).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            output,
        }
    }
}
