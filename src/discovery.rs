//! Media discovery: scan the content directory and sort files into
//! still images, HEIC files awaiting conversion, and videos.
//!
//! Duplicate exports carry a literal `(1)` right before the extension
//! (`IMG_0042(1).MOV`). Marked files are never selected. Videos are further
//! de-duplicated by canonical name so only one take per name is captioned.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::models::{file_name_of, MediaItem, MediaKind};

const DUPLICATE_MARKER: &str = "(1)";

/// Disjoint lists of candidate files, each in file-name order.
#[derive(Debug, Default, Clone)]
pub struct Discovered {
    pub images: Vec<MediaItem>,
    /// HEIC sources that need converting before they can be captioned.
    pub heic: Vec<PathBuf>,
    pub videos: Vec<MediaItem>,
    /// File names dropped as duplicates (marker or repeated canonical name).
    pub duplicates: Vec<String>,
}

/// Non-recursive scan of `dir`. Failing to list the directory is fatal.
pub fn scan_content_dir(config: &DiscoveryConfig, dir: &Path) -> Result<Discovered> {
    if !dir.is_dir() {
        bail!("Content directory does not exist: {}", dir.display());
    }

    let heic_set = build_globset(&config.heic_globs)?;
    let image_set = build_globset(&config.image_globs)?;
    let video_set = build_globset(&config.video_globs)?;

    let mut found = Discovered::default();
    let mut seen_videos: HashSet<String> = HashSet::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to list content directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = file_name_of(path);

        if heic_set.is_match(&name) {
            if has_duplicate_marker(&name) {
                found.duplicates.push(name);
            } else {
                found.heic.push(path.to_path_buf());
            }
        } else if image_set.is_match(&name) {
            if has_duplicate_marker(&name) {
                found.duplicates.push(name);
            } else {
                found.images.push(MediaItem::new(path, MediaKind::Image));
            }
        } else if video_set.is_match(&name) {
            // Marked takes never claim the canonical name, so a plain
            // sibling that sorts after them is still kept.
            if has_duplicate_marker(&name) || !seen_videos.insert(canonical_name(&name)) {
                found.duplicates.push(name);
            } else {
                found.videos.push(MediaItem::new(path, MediaKind::Video));
            }
        }
    }

    Ok(found)
}

/// Splits `name` at its last dot: `("IMG_1", ".jpg")`, or `(name, "")`.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Whether `name` carries the `(1)` duplicate marker before its extension.
pub fn has_duplicate_marker(name: &str) -> bool {
    split_extension(name).0.ends_with(DUPLICATE_MARKER)
}

/// The name with any duplicate marker removed, lower-cased for comparison.
///
/// ```rust
/// use media_captioner::discovery::canonical_name;
///
/// assert_eq!(canonical_name("IMG_7(1).MOV"), "img_7.mov");
/// assert_eq!(canonical_name("IMG_7.MOV"), "img_7.mov");
/// ```
pub fn canonical_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    let stem = stem.strip_suffix(DUPLICATE_MARKER).unwrap_or(stem).trim_end();
    format!("{}{}", stem, ext).to_lowercase()
}

/// Case-insensitive glob set matched against bare file names.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
