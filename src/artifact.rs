//! Write a run's results as a pretty-printed JSON array.
//!
//! This is the only state a run persists. It is written once, at the end,
//! replacing whatever the previous run left at the same path.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub fn write_results<T: Serialize>(path: &Path, results: &[T]) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    Ok(())
}
