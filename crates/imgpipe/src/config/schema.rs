use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::entry::DEFAULT_STORAGE_DOMAINS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_temp_directory")]
    pub temp_directory: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_true")]
    pub generate_if_missing: bool,
    #[serde(default = "default_storage_domains")]
    pub storage_domains: Vec<String>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn work_directory() -> PathBuf {
    std::env::temp_dir().join("imgpipe")
}

fn default_ledger_path() -> PathBuf {
    work_directory().join("image-tasks.json")
}

fn default_temp_directory() -> PathBuf {
    work_directory().join("scratch")
}

fn default_concurrency() -> usize {
    3
}

fn default_max_retries() -> u32 {
    2
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_storage_domains() -> Vec<String> {
    DEFAULT_STORAGE_DOMAINS
        .iter()
        .map(|d| d.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            ledger_path: default_ledger_path(),
            temp_directory: default_temp_directory(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            chunk_delay_ms: default_chunk_delay_ms(),
            generate_if_missing: true,
            storage_domains: default_storage_domains(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Options forwarded to the image generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_quality")]
    pub quality: String,
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_style() -> String {
    "natural".to_string()
}

fn default_quality() -> String {
    "standard".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            style: default_style(),
            quality: default_quality(),
        }
    }
}

/// Settings for the local-directory storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Prefix for returned URLs. Falls back to `file://` URLs when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_output_directory() -> PathBuf {
    work_directory().join("storage")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
