use std::path::Path;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::error::ServiceError;
use crate::services::ImageDownloader;

/// Fetches images over HTTP(S) into a local file.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageDownloader for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ServiceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::Http {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ServiceError::Http {
            url: url.to_string(),
            source: e,
        })?;

        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| ServiceError::Io {
                path: destination.to_path_buf(),
                source: e,
            })?;

        debug!(
            "Downloaded {} bytes from {} to {}",
            bytes.len(),
            url,
            destination.display()
        );
        Ok(())
    }
}
