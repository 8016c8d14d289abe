use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub content: ContentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub compare: CompareConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub dir: PathBuf,
    #[serde(default = "default_image_output")]
    pub image_output: String,
    #[serde(default = "default_video_output")]
    pub video_output: String,
    #[serde(default = "default_compare_output")]
    pub compare_output: String,
}

fn default_image_output() -> String {
    "image_analysis_results.json".to_string()
}
fn default_video_output() -> String {
    "video_analysis_results.json".to_string()
}
fn default_compare_output() -> String {
    "image_analysis_comparison.json".to_string()
}

impl ContentConfig {
    pub fn image_output_path(&self) -> PathBuf {
        self.dir.join(&self.image_output)
    }
    pub fn video_output_path(&self) -> PathBuf {
        self.dir.join(&self.video_output)
    }
    pub fn compare_output_path(&self) -> PathBuf {
        self.dir.join(&self.compare_output)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline credential. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            max_retries: 0,
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_image_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}
fn default_video_model() -> String {
    "gemini-1.5-flash".to_string()
}

impl ApiConfig {
    /// The credential from the config file, or from the environment.
    pub fn resolve_key(&self) -> Result<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

fn resolve_key(inline: Option<&str>, env_name: &str) -> Result<String> {
    if let Some(key) = inline.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var(env_name) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => bail!(
            "No API credential: set api.api_key in the config or the {} environment variable",
            env_name
        ),
    }
}

/// What to do with files the normalizer could not convert.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    /// Drop them: no trace in the artifact.
    #[default]
    Omit,
    /// Record them as error entries.
    Record,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_delay_ms")]
    pub inter_item_delay_ms: u64,
    #[serde(default)]
    pub skipped: SkipPolicy,
    #[serde(default = "default_gallery_categories")]
    pub gallery_categories: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: default_delay_ms(),
            skipped: SkipPolicy::Omit,
            gallery_categories: default_gallery_categories(),
        }
    }
}

fn default_delay_ms() -> u64 {
    2000
}
fn default_gallery_categories() -> Vec<String> {
    vec![
        "Tree Trimming".to_string(),
        "House Clean Out".to_string(),
        "Landscaping".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_image_globs")]
    pub image_globs: Vec<String>,
    #[serde(default = "default_heic_globs")]
    pub heic_globs: Vec<String>,
    #[serde(default = "default_video_globs")]
    pub video_globs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            image_globs: default_image_globs(),
            heic_globs: default_heic_globs(),
            video_globs: default_video_globs(),
        }
    }
}

fn default_image_globs() -> Vec<String> {
    vec!["*.jpg".to_string(), "*.jpeg".to_string(), "*.png".to_string()]
}
fn default_heic_globs() -> Vec<String> {
    vec!["*.heic".to_string()]
}
fn default_video_globs() -> Vec<String> {
    vec!["*.mov".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizerConfig {
    #[serde(default = "default_converter_program")]
    pub program: String,
    /// Argument template; `{input}` and `{output}` are substituted per file.
    #[serde(default = "default_converter_args")]
    pub args: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            program: default_converter_program(),
            args: default_converter_args(),
        }
    }
}

fn default_converter_program() -> String {
    "sips".to_string()
}
fn default_converter_args() -> Vec<String> {
    ["-s", "format", "jpeg", "{input}", "--out", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompareConfig {
    #[serde(default = "default_image_model")]
    pub model_a: String,
    #[serde(default = "default_compare_model_b")]
    pub model_b: String,
    /// Separate credential for the second model. Falls back to `[api]`.
    #[serde(default)]
    pub api_key_b: Option<String>,
    #[serde(default)]
    pub api_key_env_b: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default = "default_compare_delay_ms")]
    pub delay_ms: u64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            model_a: default_image_model(),
            model_b: default_compare_model_b(),
            api_key_b: None,
            api_key_env_b: None,
            files: Vec::new(),
            delay_ms: default_compare_delay_ms(),
        }
    }
}

fn default_compare_model_b() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_compare_delay_ms() -> u64 {
    3000
}

impl CompareConfig {
    /// Credential for model B: its own if configured, otherwise the primary one.
    pub fn resolve_key_b(&self, api: &ApiConfig) -> Result<String> {
        if self.api_key_b.is_some() || self.api_key_env_b.is_some() {
            let env_name = self
                .api_key_env_b
                .as_deref()
                .unwrap_or(api.api_key_env.as_str());
            return resolve_key(self.api_key_b.as_deref(), env_name);
        }
        api.resolve_key()
    }
}

impl Config {
    /// A configuration with every default, pointed at `dir`.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            content: ContentConfig {
                dir: dir.into(),
                image_output: default_image_output(),
                video_output: default_video_output(),
                compare_output: default_compare_output(),
            },
            api: ApiConfig::default(),
            pipeline: PipelineConfig::default(),
            discovery: DiscoveryConfig::default(),
            normalizer: NormalizerConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.content.dir.as_os_str().is_empty() {
        bail!("content.dir must not be empty");
    }

    for (name, value) in [
        ("api.image_model", &config.api.image_model),
        ("api.video_model", &config.api.video_model),
        ("compare.model_a", &config.compare.model_a),
        ("compare.model_b", &config.compare.model_b),
    ] {
        if value.trim().is_empty() {
            bail!("{} must not be empty", name);
        }
    }

    if config.api.timeout_secs == Some(0) {
        bail!("api.timeout_secs must be > 0 when set");
    }

    // Validate normalizer
    if config.normalizer.program.trim().is_empty() {
        bail!("normalizer.program must not be empty");
    }
    for placeholder in ["{input}", "{output}"] {
        if !config.normalizer.args.iter().any(|a| a.contains(placeholder)) {
            bail!("normalizer.args must contain a {} placeholder", placeholder);
        }
    }

    // Validate discovery
    for patterns in [
        &config.discovery.image_globs,
        &config.discovery.heic_globs,
        &config.discovery.video_globs,
    ] {
        crate::discovery::build_globset(patterns)
            .with_context(|| "Invalid glob pattern in [discovery]")?;
    }

    Ok(())
}
