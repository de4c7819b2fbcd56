//! Isolated resolver environment for integration tests.
//!
//! Each harness owns a temp directory holding the ledger snapshot and the
//! scratch directory, and wires an `ImageResolver` to recording stubs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use imgpipe::{
    BatchCoordinator, BatchOptions, ImageResolver, ResolverOptions, TaskLedger,
};

use super::stubs::{StubDownloader, StubGenerator, StubStorage};

pub struct TestHarness {
    temp_dir: TempDir,
    pub ledger_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub generator: Arc<StubGenerator>,
    pub storage: Arc<StubStorage>,
    pub downloader: Arc<StubDownloader>,
    pub ledger: Arc<TaskLedger>,
    pub resolver: ImageResolver,
}

impl TestHarness {
    /// Harness whose generator writes a local file.
    pub async fn new() -> Self {
        Self::with_services(
            StubGenerator::local_file(),
            StubStorage::new(),
            StubDownloader::new(),
        )
        .await
    }

    pub async fn with_generator(generator: StubGenerator) -> Self {
        Self::with_services(generator, StubStorage::new(), StubDownloader::new()).await
    }

    pub async fn with_services(
        generator: StubGenerator,
        storage: StubStorage,
        downloader: StubDownloader,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger_path = temp_dir.path().join("state").join("image-tasks.json");
        let scratch_dir = temp_dir.path().join("scratch");

        let ledger = Arc::new(TaskLedger::new(&ledger_path));
        ledger.initialize().await;

        let generator = Arc::new(generator);
        let storage = Arc::new(storage);
        let downloader = Arc::new(downloader);

        let resolver = ImageResolver::new(
            ledger.clone(),
            generator.clone(),
            storage.clone(),
            downloader.clone(),
            Self::resolver_options(&scratch_dir),
        );

        Self {
            temp_dir,
            ledger_path,
            scratch_dir,
            generator,
            storage,
            downloader,
            ledger,
            resolver,
        }
    }

    fn resolver_options(scratch_dir: &Path) -> ResolverOptions {
        ResolverOptions {
            temp_directory: scratch_dir.to_path_buf(),
            ..ResolverOptions::default()
        }
    }

    /// A second resolver over a freshly loaded ledger at the same path,
    /// sharing this harness's stubs. Simulates a process restart.
    pub async fn restarted_resolver(&self) -> ImageResolver {
        let ledger = Arc::new(TaskLedger::new(&self.ledger_path));
        ledger.initialize().await;
        ImageResolver::new(
            ledger,
            self.generator.clone(),
            self.storage.clone(),
            self.downloader.clone(),
            Self::resolver_options(&self.scratch_dir),
        )
    }

    /// Coordinator over this harness's resolver with no chunk delay.
    pub fn coordinator(&self, concurrency: usize, max_retries: u32) -> BatchCoordinator {
        BatchCoordinator::new(
            Arc::new(self.resolver.clone()),
            BatchOptions {
                concurrency,
                max_retries,
                chunk_delay: Duration::ZERO,
                ..BatchOptions::default()
            },
        )
    }

    /// Files left behind in the scratch directory.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.scratch_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
