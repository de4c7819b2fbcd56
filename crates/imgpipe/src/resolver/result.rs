use serde::{Deserialize, Serialize};

/// Outcome of resolving one entry's image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
    /// True when the image was uploaded during this resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_generated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageResult {
    /// The image was already in storage; nothing was uploaded.
    pub fn existing(storage_url: impl Into<String>) -> Self {
        let storage_url = storage_url.into();
        Self {
            success: true,
            image_url: Some(storage_url.clone()),
            storage_url: Some(storage_url),
            is_new: Some(false),
            ..Self::default()
        }
    }

    /// The image was uploaded by this resolution.
    pub fn uploaded(storage_url: impl Into<String>, is_generated: bool) -> Self {
        let storage_url = storage_url.into();
        Self {
            success: true,
            image_url: Some(storage_url.clone()),
            storage_url: Some(storage_url),
            is_new: Some(true),
            is_generated: Some(is_generated),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
