//! Recording stand-ins for the external image services.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use imgpipe::{
    GeneratedImage, GenerationOptions, ImageDownloader, ImageGenerator, ImageStorage,
    ServiceError, UploadMetadata,
};

type Behavior =
    Box<dyn Fn(&GenerationOptions, usize) -> Result<GeneratedImage, ServiceError> + Send + Sync>;

/// Generator whose output is decided by a closure receiving the request
/// options and the 1-based call number.
pub struct StubGenerator {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&GenerationOptions, usize) -> Result<GeneratedImage, ServiceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            behavior: Box::new(behavior),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Writes the image to the path hint, like a service saving locally.
    pub fn local_file() -> Self {
        Self::new(|options, call| write_local(options, call))
    }

    /// Always rejects with `message`.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_, _| Err(ServiceError::Rejected(message.clone())))
    }

    /// Rejects the first `failures` calls, then writes a local file.
    pub fn flaky(failures: usize) -> Self {
        Self::new(move |options, call| {
            if call <= failures {
                Err(ServiceError::Rejected(format!("transient failure {}", call)))
            } else {
                write_local(options, call)
            }
        })
    }

    /// Returns only a remote URL.
    pub fn remote(url: &str) -> Self {
        let url = url.to_string();
        Self::new(move |_, _| {
            Ok(GeneratedImage {
                url: Some(url.clone()),
                local_path: None,
                generation_handle: Some("remote-gen".to_string()),
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most generation calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn write_local(options: &GenerationOptions, call: usize) -> Result<GeneratedImage, ServiceError> {
    let path = options
        .local_path_hint
        .clone()
        .ok_or_else(|| ServiceError::Rejected("no local path hint".to_string()))?;
    std::fs::write(&path, b"generated-image").map_err(|e| ServiceError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(GeneratedImage {
        url: Some(format!("https://generator.example.com/images/{}.png", call)),
        local_path: Some(path),
        generation_handle: Some(format!("gen-{}", call)),
    })
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        (self.behavior)(options, call)
    }
}

/// One call to `StubStorage::upload`.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub path: PathBuf,
    pub metadata: UploadMetadata,
    /// Whether the file existed when the upload was requested.
    pub file_existed: bool,
}

#[derive(Default)]
pub struct StubStorage {
    uploads: Mutex<Vec<RecordedUpload>>,
    failure: Option<String>,
}

impl StubStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStorage for StubStorage {
    async fn upload(
        &self,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, ServiceError> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            path: local_path.to_path_buf(),
            metadata: metadata.clone(),
            file_existed: local_path.exists(),
        });

        if let Some(message) = &self.failure {
            return Err(ServiceError::Rejected(message.clone()));
        }

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(format!("https://media.s3.amazonaws.com/{}", name))
    }
}

#[derive(Default)]
pub struct StubDownloader {
    urls: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl StubDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageDownloader for StubDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ServiceError> {
        self.urls.lock().unwrap().push(url.to_string());

        if let Some(message) = &self.failure {
            return Err(ServiceError::Rejected(message.clone()));
        }

        tokio::fs::write(destination, b"downloaded-image")
            .await
            .map_err(|e| ServiceError::Io {
                path: destination.to_path_buf(),
                source: e,
            })
    }
}
