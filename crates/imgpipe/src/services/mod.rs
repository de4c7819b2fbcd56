//! Boundaries to the external image services.

pub mod download;
pub mod storage;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::entry::ContentEntry;
use crate::error::ServiceError;

pub use download::HttpDownloader;
pub use storage::FileStorage;

/// Options for one generation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub size: String,
    pub style: String,
    pub quality: String,
    /// Where the service may write the image when it produces a local file.
    pub local_path_hint: Option<PathBuf>,
}

impl GenerationOptions {
    pub fn from_config(config: &GenerationConfig, local_path_hint: Option<PathBuf>) -> Self {
        Self {
            size: config.size.clone(),
            style: config.style.clone(),
            quality: config.quality.clone(),
            local_path_hint,
        }
    }
}

/// What a successful generation produced. At least one of `url` and
/// `local_path` is expected to be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedImage {
    pub url: Option<String>,
    pub local_path: Option<PathBuf>,
    pub generation_handle: Option<String>,
}

/// Descriptive metadata sent along with an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl UploadMetadata {
    pub fn for_entry(entry: &ContentEntry, source_url: Option<&str>) -> Self {
        let description = entry
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(entry.title.as_str())
            .to_string();

        let mut tags = entry.tags.clone();
        if let Some(category) = entry.category.as_deref().filter(|c| !c.is_empty()) {
            if !tags.iter().any(|t| t == category) {
                tags.push(category.to_string());
            }
        }

        Self {
            title: entry.title.clone(),
            description,
            alt: format!("Image for {}", entry.title),
            source_url: source_url.map(str::to_string),
            tags,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage, ServiceError>;
}

#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Uploads a local file and returns its public URL.
    async fn upload(
        &self,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ServiceError>;
}
