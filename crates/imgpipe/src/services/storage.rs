use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::ServiceError;
use crate::services::{ImageStorage, UploadMetadata};

/// Sidecar written next to every stored image.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredImageRecord<'a> {
    #[serde(flatten)]
    metadata: &'a UploadMetadata,
    content_type: String,
    stored_at: String,
}

/// Storage backend that keeps images in a local directory tree and derives
/// public URLs from a base URL.
pub struct FileStorage {
    output_directory: PathBuf,
    public_base_url: Option<String>,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P, public_base_url: Option<String>) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
            public_base_url,
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Writes `content` under `relative_directory`, never overwriting an
    /// existing file.
    pub async fn store(
        &self,
        content: &[u8],
        relative_directory: &str,
        filename: &str,
    ) -> Result<PathBuf, ServiceError> {
        let dir_path = self.output_directory.join(relative_directory);
        tokio::fs::create_dir_all(&dir_path)
            .await
            .map_err(|e| ServiceError::Io {
                path: dir_path.clone(),
                source: e,
            })?;

        self.store_with_atomic_creation(&dir_path, filename, content)
            .await
    }

    /// Tries `name.ext`, then `name_2.ext`, `name_3.ext`, ... using
    /// exclusive creation so concurrent uploads never clobber each other.
    async fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, ServiceError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
                .await
            {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(content).await?;
                        file.flush().await
                    }
                    .await;
                    written.map_err(|e| ServiceError::Io {
                        path: try_path.clone(),
                        source: e,
                    })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(ServiceError::Io {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(ServiceError::Rejected(format!(
            "No free file name for '{}' in {}",
            filename,
            dir_path.display()
        )))
    }

    fn public_url(&self, stored: &Path) -> String {
        match &self.public_base_url {
            Some(base) => {
                let relative = stored
                    .strip_prefix(&self.output_directory)
                    .unwrap_or(stored)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{}/{}", base.trim_end_matches('/'), relative)
            }
            None => format!("file://{}", stored.display()),
        }
    }
}

#[async_trait]
impl ImageStorage for FileStorage {
    async fn upload(
        &self,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, ServiceError> {
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| ServiceError::Io {
                path: local_path.to_path_buf(),
                source: e,
            })?;

        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        let now = Utc::now();
        let relative_directory = now.format("%Y/%m").to_string();

        let stored = self.store(&content, &relative_directory, &filename).await?;

        let record = StoredImageRecord {
            metadata,
            content_type: mime_guess::from_path(&stored)
                .first_or_octet_stream()
                .to_string(),
            stored_at: now.to_rfc3339(),
        };
        let sidecar = sidecar_path(&stored);
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| ServiceError::Rejected(format!("Invalid image metadata: {}", e)))?;
        tokio::fs::write(&sidecar, json)
            .await
            .map_err(|e| ServiceError::Io {
                path: sidecar.clone(),
                source: e,
            })?;

        let url = self.public_url(&stored);
        debug!("Stored {} as {}", local_path.display(), stored.display());
        info!("Uploaded image for '{}' to {}", metadata.title, url);
        Ok(url)
    }
}

fn sidecar_path(stored: &Path) -> PathBuf {
    let mut name = stored
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".json");
    stored.with_file_name(name)
}
