//! Format normalizer: turns HEIC photos into JPEG siblings by running an
//! external converter (`sips` on macOS by default).
//!
//! The converter runs synchronously and its own output is discarded. A failed
//! conversion is not fatal; the pipeline decides what to do with the file.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::NormalizerConfig;

/// Converts one file into another format on disk.
pub trait Converter: Send + Sync {
    /// Human-readable converter name for logs.
    fn name(&self) -> &str;

    /// Write the converted form of `input` to `output`.
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs a configured program with `{input}` / `{output}` substituted into
/// its argument template.
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(self.render_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to run {}", self.program))?;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        if !output.exists() {
            bail!("{} produced no output file", self.program);
        }
        Ok(())
    }
}

/// Path of the JPEG sibling: same directory and base name, `.jpg` extension.
///
/// ```rust
/// use media_captioner::normalize::jpeg_sibling;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(jpeg_sibling(Path::new("/g/IMG_1.HEIC")), PathBuf::from("/g/IMG_1.jpg"));
/// ```
pub fn jpeg_sibling(path: &Path) -> PathBuf {
    path.with_extension("jpg")
}

/// Convert `path` to its JPEG sibling and return the new path.
pub fn normalize(converter: &dyn Converter, path: &Path) -> Result<PathBuf> {
    let target = jpeg_sibling(path);
    tracing::debug!(
        converter = converter.name(),
        input = %path.display(),
        output = %target.display(),
        "converting"
    );
    converter.convert(path, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_swaps_extension_any_case() {
        assert_eq!(jpeg_sibling(Path::new("b.heic")), PathBuf::from("b.jpg"));
        assert_eq!(jpeg_sibling(Path::new("/x/b.HEIC")), PathBuf::from("/x/b.jpg"));
        assert_eq!(jpeg_sibling(Path::new("/x/b.HeIc")), PathBuf::from("/x/b.jpg"));
    }

    #[test]
    fn sibling_keeps_base_name_with_dots() {
        assert_eq!(
            jpeg_sibling(Path::new("/x/job.site.2024.heic")),
            PathBuf::from("/x/job.site.2024.jpg")
        );
    }

    #[test]
    fn renders_argument_template() {
        let conv = CommandConverter::new(&NormalizerConfig::default());
        let args = conv.render_args(Path::new("/g/a b.heic"), Path::new("/g/a b.jpg"));
        assert_eq!(
            args,
            vec!["-s", "format", "jpeg", "/g/a b.heic", "--out", "/g/a b.jpg"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn command_converter_copies_with_cp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("photo.heic");
        std::fs::write(&src, b"pixels").unwrap();

        let conv = CommandConverter::new(&NormalizerConfig {
            program: "cp".to_string(),
            args: vec!["{input}".to_string(), "{output}".to_string()],
        });
        let out = normalize(&conv, &src).unwrap();
        assert_eq!(out, tmp.path().join("photo.jpg"));
        assert_eq!(std::fs::read(&out).unwrap(), b"pixels");
    }

    #[cfg(unix)]
    #[test]
    fn failing_converter_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("photo.heic");
        std::fs::write(&src, b"pixels").unwrap();

        let conv = CommandConverter::new(&NormalizerConfig {
            program: "false".to_string(),
            args: vec!["{input}".to_string(), "{output}".to_string()],
        });
        assert!(normalize(&conv, &src).is_err());
        assert!(!tmp.path().join("photo.jpg").exists());
    }

    #[test]
    fn missing_program_is_an_error() {
        let conv = CommandConverter::new(&NormalizerConfig {
            program: "definitely-not-a-converter-binary".to_string(),
            args: vec!["{input}".to_string(), "{output}".to_string()],
        });
        let err = normalize(&conv, Path::new("/nowhere/x.heic")).unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }
}
