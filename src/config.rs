//! Configuration file handling.
//!
//! Settings are read from `.newslens.toml` (or the file given with
//! `--config`) and then overridden by explicit command-line flags.

use crate::orchestrator::SplitPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".newslens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Snapshot file holding users, reports and grants.
    #[serde(default = "default_store")]
    pub store: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum concurrent analyzer calls per report.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_store() -> String {
    "newslens.json".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Analyzer model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Deadline for a single analyzer call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Keywords kept per item.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            max_keywords: default_max_keywords(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    60
}

fn default_max_keywords() -> usize {
    10
}

/// How submissions are cut into blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub split: SplitPolicy,

    /// Largest number of blocks accepted in one submission.
    #[serde(default = "default_max_blocks")]
    pub max_blocks: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            split: SplitPolicy::default(),
            max_blocks: default_max_blocks(),
        }
    }
}

fn default_max_blocks() -> usize {
    200
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include per-item excerpts in rendered reports.
    #[serde(default = "default_true")]
    pub include_items: bool,

    /// Characters of item text shown in an excerpt.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_items: true,
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_excerpt_chars() -> usize {
    160
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref store) = args.store {
            self.general.store = store.display().to_string();
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values that serde cannot constrain.
    pub fn validate(&self) -> Result<(), String> {
        if self.general.concurrency == 0 {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.model.timeout_seconds == 0 {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.analysis.max_blocks == 0 {
            return Err("max_blocks must be at least 1".to_string());
        }
        if let SplitPolicy::Marker(ref marker) = self.analysis.split {
            if marker.trim().is_empty() {
                return Err("Split marker cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
