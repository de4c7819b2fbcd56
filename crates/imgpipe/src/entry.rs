//! Content entries and image provenance.

use serde::{Deserialize, Serialize};

/// Domain fragments recognized as object storage when an entry carries no
/// provenance tag.
pub const DEFAULT_STORAGE_DOMAINS: &[&str] = &["amazonaws.com", "cloudfront.net"];

/// Where an entry's current image URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    /// Anything not produced by the storage collaborator.
    External,
    /// Returned by the storage collaborator.
    Stored,
}

/// A unit of content that needs a representative image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_origin: Option<ImageOrigin>,
}

impl ContentEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            ..Self::default()
        }
    }

    /// The entry id, ignoring blank values.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// The current image URL, ignoring blank values.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Points the entry at an image that now lives in storage.
    pub fn set_stored_image(&mut self, url: impl Into<String>) {
        self.image_url = Some(url.into());
        self.image_origin = Some(ImageOrigin::Stored);
    }
}

/// Decides whether an entry's image is already hosted in storage.
///
/// An explicit `image_origin` always wins. Untagged URLs fall back to a
/// substring match against configured domain fragments, which misses any
/// custom or CDN-fronted storage domain that is not listed.
#[derive(Debug, Clone)]
pub struct StorageMatcher {
    domains: Vec<String>,
}

impl StorageMatcher {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(Into::into)
                .filter(|d: &String| !d.trim().is_empty())
                .collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.domains.iter().any(|domain| url.contains(domain.as_str()))
    }

    pub fn is_stored(&self, entry: &ContentEntry) -> bool {
        let Some(url) = entry.image_url() else {
            return false;
        };

        match entry.image_origin {
            Some(ImageOrigin::Stored) => true,
            Some(ImageOrigin::External) => false,
            None => self.matches_url(url),
        }
    }
}

impl Default for StorageMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DOMAINS.iter().copied())
    }
}
