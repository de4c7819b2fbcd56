//! Resolves one entry's image: ledger, in-flight work, existing URL, or
//! generation, followed by upload to storage.

pub mod inflight;
pub mod result;
pub(crate) mod scratch;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};

use crate::config::{Config, GenerationConfig};
use crate::entry::{ContentEntry, StorageMatcher};
use crate::error::ResolveError;
use crate::ledger::TaskLedger;
use crate::services::{
    GenerationOptions, ImageDownloader, ImageGenerator, ImageStorage, UploadMetadata,
};

pub use inflight::{InFlightRegistry, PendingOutcome};
pub use result::ImageResult;

use scratch::ScratchFile;

const MAX_PROMPT_SUMMARY_CHARS: usize = 400;

/// Something that can resolve entries one at a time. Implemented by
/// [`ImageResolver`]; the batch coordinator only depends on this.
#[async_trait]
pub trait EntryResolver: Send + Sync {
    /// Never fails: problems are reported through the returned result.
    async fn resolve(&self, entry: &mut ContentEntry, generate_if_missing: bool) -> ImageResult;

    /// The running attempt for `entry_id`, if any.
    fn pending(&self, entry_id: &str) -> Option<PendingOutcome>;

    /// Whether the entry's current image is already hosted in storage.
    fn is_stored(&self, entry: &ContentEntry) -> bool;
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Where downloads and generation hints are written.
    pub temp_directory: PathBuf,
    pub storage_matcher: StorageMatcher,
    pub generation: GenerationConfig,
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_directory: config.temp_directory.clone(),
            storage_matcher: StorageMatcher::new(config.storage_domains.iter().cloned()),
            generation: config.generation.clone(),
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cheap to clone; clones share the ledger, collaborators and in-flight
/// registry.
#[derive(Clone)]
pub struct ImageResolver {
    ledger: Arc<TaskLedger>,
    generator: Arc<dyn ImageGenerator>,
    storage: Arc<dyn ImageStorage>,
    downloader: Arc<dyn ImageDownloader>,
    inflight: InFlightRegistry,
    options: Arc<ResolverOptions>,
}

impl ImageResolver {
    pub fn new(
        ledger: Arc<TaskLedger>,
        generator: Arc<dyn ImageGenerator>,
        storage: Arc<dyn ImageStorage>,
        downloader: Arc<dyn ImageDownloader>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            ledger,
            generator,
            storage,
            downloader,
            inflight: InFlightRegistry::new(),
            options: Arc::new(options),
        }
    }

    pub fn ledger(&self) -> &Arc<TaskLedger> {
        &self.ledger
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves the entry's image and, on success, points `entry.image_url`
    /// at the stored copy.
    pub async fn resolve(&self, entry: &mut ContentEntry, generate_if_missing: bool) -> ImageResult {
        let Some(entry_id) = entry.id().map(str::to_string) else {
            warn!("Cannot resolve image for '{}': entry has no id", entry.title);
            return ImageResult::failure(ResolveError::MissingId.to_string());
        };

        let result = match self.try_resolve(&entry_id, entry, generate_if_missing).await {
            Ok(result) => result,
            Err(e) => {
                error!("Image resolution failed for entry {}: {}", entry_id, e);
                self.record_failure(&entry_id, &e.to_string()).await;
                ImageResult::failure(e.to_string())
            }
        };

        if result.success {
            if let Some(storage_url) = &result.storage_url {
                entry.set_stored_image(storage_url.clone());
            }
        }
        result
    }

    async fn try_resolve(
        &self,
        entry_id: &str,
        entry: &ContentEntry,
        generate_if_missing: bool,
    ) -> Result<ImageResult, ResolveError> {
        if let Some(storage_url) = self.ledger.get_storage_url(entry_id).await {
            debug!("Entry {} already has a stored image: {}", entry_id, storage_url);
            return Ok(ImageResult::existing(storage_url));
        }

        if let Some(pending) = self.inflight.get(entry_id) {
            debug!("Waiting for in-flight image attempt for entry {}", entry_id);
            return Ok(pending.await);
        }

        if let Some(url) = entry.image_url() {
            if self.options.storage_matcher.is_stored(entry) {
                self.ledger
                    .create_or_update_task(entry_id, &entry.title)
                    .await?;
                self.ledger.complete_task(entry_id, url, url).await?;
                info!("Entry {} image is already in storage", entry_id);
                return Ok(ImageResult::existing(url));
            }

            if let Some(storage_url) = self.open_task(entry_id, &entry.title).await? {
                return Ok(ImageResult::existing(storage_url));
            }
            let metadata = UploadMetadata::for_entry(entry, Some(url));
            let storage_url = self.store_remote(entry_id, url, &metadata).await?;
            info!("Re-hosted image for entry {} at {}", entry_id, storage_url);
            return Ok(ImageResult::uploaded(storage_url, false));
        }

        if !generate_if_missing {
            debug!("Entry {} has no image and generation is off", entry_id);
            return Ok(ImageResult::failure(format!(
                "Entry {} has no image and generation was not requested",
                entry_id
            )));
        }

        let (pending, started) = self
            .inflight
            .join_or_start(entry_id, || self.generation_attempt(entry_id, entry));
        if started {
            info!("Started image generation for entry {}", entry_id);
        }
        Ok(pending.await)
    }

    /// Builds the owned future registered in the in-flight registry. It
    /// records its own failure, since joined callers only see the result.
    fn generation_attempt(
        &self,
        entry_id: &str,
        entry: &ContentEntry,
    ) -> BoxFuture<'static, ImageResult> {
        let resolver = self.clone();
        let entry_id = entry_id.to_string();
        let entry = entry.clone();

        async move {
            match resolver.generate_and_store(&entry_id, &entry).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Image generation failed for entry {}: {}", entry_id, e);
                    resolver.record_failure(&entry_id, &e.to_string()).await;
                    ImageResult::failure(e.to_string())
                }
            }
        }
        .boxed()
    }

    async fn generate_and_store(
        &self,
        entry_id: &str,
        entry: &ContentEntry,
    ) -> Result<ImageResult, ResolveError> {
        if let Some(storage_url) = self.open_task(entry_id, &entry.title).await? {
            return Ok(ImageResult::existing(storage_url));
        }
        self.ensure_temp_directory().await?;

        let prompt = build_prompt(entry);
        let hint = ScratchFile::in_directory(
            &self.options.temp_directory,
            None,
            &format!("generated-{}.png", entry_id),
        );
        let options =
            GenerationOptions::from_config(&self.options.generation, Some(hint.path().to_path_buf()));

        let generated = self
            .generator
            .generate(&prompt, &options)
            .await
            .map_err(ResolveError::Generation)?;

        if let Some(handle) = &generated.generation_handle {
            self.ledger.update_task_with_id(entry_id, handle).await?;
        }

        let metadata = UploadMetadata::for_entry(entry, generated.url.as_deref());

        if let Some(local_path) = generated.local_path {
            let produced = ScratchFile::adopt(local_path);
            let uploaded = self.storage.upload(produced.path(), &metadata).await;
            let source = generated
                .url
                .clone()
                .unwrap_or_else(|| produced.path().display().to_string());
            produced.remove().await;
            hint.remove().await;

            let storage_url = uploaded.map_err(ResolveError::Upload)?;
            self.ledger
                .complete_task(entry_id, &source, &storage_url)
                .await?;
            info!("Stored generated image for entry {} at {}", entry_id, storage_url);
            return Ok(ImageResult::uploaded(storage_url, true));
        }

        hint.remove().await;

        let Some(url) = generated.url else {
            return Err(ResolveError::EmptyGeneration);
        };
        let storage_url = self.store_remote(entry_id, &url, &metadata).await?;
        info!("Stored generated image for entry {} at {}", entry_id, storage_url);
        Ok(ImageResult::uploaded(storage_url, true))
    }

    /// Downloads `url` into a scratch file, uploads it, and records the
    /// completion. The scratch file is gone when this returns.
    async fn store_remote(
        &self,
        entry_id: &str,
        url: &str,
        metadata: &UploadMetadata,
    ) -> Result<String, ResolveError> {
        self.ensure_temp_directory().await?;

        let scratch = ScratchFile::in_directory(
            &self.options.temp_directory,
            Some(url),
            &format!("{}.img", entry_id),
        );

        let outcome = async {
            self.downloader
                .download(url, scratch.path())
                .await
                .map_err(|source| ResolveError::Download {
                    url: url.to_string(),
                    source,
                })?;
            self.storage
                .upload(scratch.path(), metadata)
                .await
                .map_err(ResolveError::Upload)
        }
        .await;
        scratch.remove().await;

        let storage_url = outcome?;
        self.ledger.complete_task(entry_id, url, &storage_url).await?;
        Ok(storage_url)
    }

    /// Creates or refreshes the entry's task. Returns the storage URL when
    /// another attempt completed the task after the ledger was last checked.
    async fn open_task(&self, entry_id: &str, title: &str) -> Result<Option<String>, ResolveError> {
        let task = self.ledger.create_or_update_task(entry_id, title).await?;
        if task.is_completed() {
            debug!("Entry {} was completed concurrently", entry_id);
            return Ok(task.storage_url);
        }
        Ok(None)
    }

    async fn ensure_temp_directory(&self) -> Result<(), ResolveError> {
        let path = &self.options.temp_directory;
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| ResolveError::Scratch {
                path: path.clone(),
                source: e,
            })
    }

    async fn record_failure(&self, entry_id: &str, message: &str) {
        if let Err(e) = self.ledger.fail_task(entry_id, message).await {
            warn!("Failed to record image failure for entry {}: {}", entry_id, e);
        }
    }
}

#[async_trait]
impl EntryResolver for ImageResolver {
    async fn resolve(&self, entry: &mut ContentEntry, generate_if_missing: bool) -> ImageResult {
        ImageResolver::resolve(self, entry, generate_if_missing).await
    }

    fn pending(&self, entry_id: &str) -> Option<PendingOutcome> {
        self.inflight.get(entry_id)
    }

    fn is_stored(&self, entry: &ContentEntry) -> bool {
        self.options.storage_matcher.is_stored(entry)
    }
}

/// Prompt for the generation service, from title, category and summary.
pub fn build_prompt(entry: &ContentEntry) -> String {
    let mut prompt = format!(
        "A representative illustration for the article \"{}\".",
        entry.title.trim()
    );

    if let Some(category) = entry.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!(" Category: {}.", category));
    }

    if let Some(summary) = entry.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let summary: String = summary.chars().take(MAX_PROMPT_SUMMARY_CHARS).collect();
        prompt.push_str(&format!(" Summary: {}", summary));
    }

    prompt.push_str(" No text or lettering in the image.");
    prompt
}
