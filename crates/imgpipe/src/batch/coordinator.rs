//! Drives the resolver over many entries with bounded concurrency and
//! retries.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::batch::report::BatchReport;
use crate::config::Config;
use crate::entry::ContentEntry;
use crate::resolver::{EntryResolver, ImageResult, PendingOutcome};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Entries resolved at the same time.
    pub concurrency: usize,
    /// Extra rounds for entries that failed in the previous round.
    pub max_retries: u32,
    /// Pause before each chunk after the first.
    pub chunk_delay: Duration,
    /// Whether `run` asks for generation when an entry has no image.
    pub generate_if_missing: bool,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            generate_if_missing: config.generate_if_missing,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 2,
            chunk_delay: Duration::from_secs(1),
            generate_if_missing: true,
        }
    }
}

/// How the entries of one batch will be handled.
#[derive(Default)]
struct BatchPlan {
    in_progress: Vec<(usize, PendingOutcome)>,
    to_process: Vec<usize>,
}

pub struct BatchCoordinator {
    resolver: Arc<dyn EntryResolver>,
    options: BatchOptions,
}

impl BatchCoordinator {
    pub fn new(resolver: Arc<dyn EntryResolver>, mut options: BatchOptions) -> Self {
        if options.concurrency == 0 {
            warn!("Batch concurrency of 0 requested, using 1");
            options.concurrency = 1;
        }
        Self { resolver, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// `process` with the configured `generate_if_missing`.
    pub async fn run(&self, entries: &mut [ContentEntry]) -> BatchReport {
        self.process(entries, self.options.generate_if_missing).await
    }

    /// Resolves images for `entries`, updating each successful entry's
    /// `image_url` in place. Individual failures never abort the batch.
    pub async fn process(
        &self,
        entries: &mut [ContentEntry],
        generate_if_missing: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let plan = self.classify(entries, &mut report);

        info!(
            "Image batch: {} entries, {} already stored, {} in progress, {} to process, {} skipped",
            entries.len(),
            report.results.len(),
            plan.in_progress.len(),
            plan.to_process.len(),
            report.skipped.len()
        );

        self.await_in_progress(entries, plan.in_progress, &mut report)
            .await;

        let mut queue = plan.to_process;
        let mut first_chunk = true;
        while !queue.is_empty() {
            let round = report.rounds;
            report.rounds += 1;

            let span = info_span!("image_batch_round", round, entries = queue.len());
            let failed = self
                .run_round(
                    entries,
                    &queue,
                    generate_if_missing,
                    &mut first_chunk,
                    &mut report,
                )
                .instrument(span)
                .await;

            if failed.is_empty() {
                break;
            }
            if round >= self.options.max_retries {
                warn!(
                    "Giving up on {} entries after {} retries",
                    failed.len(),
                    self.options.max_retries
                );
                break;
            }

            info!("Retrying {} failed entries", failed.len());
            queue = failed;
        }

        info!(
            "Image batch finished: {} succeeded, {} failed, {} skipped",
            report.success_count(),
            report.failure_count(),
            report.skipped.len()
        );
        report
    }

    fn classify(&self, entries: &[ContentEntry], report: &mut BatchReport) -> BatchPlan {
        let mut plan = BatchPlan::default();

        for (index, entry) in entries.iter().enumerate() {
            let Some(entry_id) = entry.id() else {
                warn!(
                    "Skipping entry '{}' at position {}: missing id",
                    entry.title, index
                );
                report.skipped.push(index);
                continue;
            };

            if self.resolver.is_stored(entry) {
                if let Some(url) = entry.image_url() {
                    debug!("Entry {} image already stored", entry_id);
                    report.record(entry_id, ImageResult::existing(url));
                    continue;
                }
            }

            if let Some(pending) = self.resolver.pending(entry_id) {
                plan.in_progress.push((index, pending));
                continue;
            }

            plan.to_process.push(index);
        }

        plan
    }

    async fn await_in_progress(
        &self,
        entries: &mut [ContentEntry],
        in_progress: Vec<(usize, PendingOutcome)>,
        report: &mut BatchReport,
    ) {
        if in_progress.is_empty() {
            return;
        }

        let outcomes = join_all(
            in_progress
                .into_iter()
                .map(|(index, pending)| async move { (index, pending.await) }),
        )
        .await;

        for (index, result) in outcomes {
            apply_outcome(entries, index, result, report);
        }
    }

    /// One pass over `queue` in chunks. Returns the positions that failed.
    async fn run_round(
        &self,
        entries: &mut [ContentEntry],
        queue: &[usize],
        generate_if_missing: bool,
        first_chunk: &mut bool,
        report: &mut BatchReport,
    ) -> Vec<usize> {
        let mut failed = Vec::new();

        for chunk in queue.chunks(self.options.concurrency) {
            if !std::mem::replace(first_chunk, false) && !self.options.chunk_delay.is_zero() {
                tokio::time::sleep(self.options.chunk_delay).await;
            }

            let members: HashSet<usize> = chunk.iter().copied().collect();
            let resolver = &self.resolver;

            let outcomes = join_all(
                entries
                    .iter_mut()
                    .enumerate()
                    .filter(|(index, _)| members.contains(index))
                    .map(|(index, entry)| async move {
                        let result = AssertUnwindSafe(resolver.resolve(entry, generate_if_missing))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| ImageResult::failure("Image resolver panicked"));
                        (index, result)
                    }),
            )
            .await;

            for (index, result) in outcomes {
                if !result.success {
                    failed.push(index);
                }
                apply_outcome(entries, index, result, report);
            }
        }

        failed
    }
}

fn apply_outcome(
    entries: &mut [ContentEntry],
    index: usize,
    result: ImageResult,
    report: &mut BatchReport,
) {
    let entry = &mut entries[index];
    let Some(entry_id) = entry.id().map(str::to_string) else {
        return;
    };

    if result.success {
        if let Some(url) = &result.storage_url {
            entry.set_stored_image(url.clone());
        }
    } else {
        debug!(
            "Entry {} failed: {}",
            entry_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    report.record(&entry_id, result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Resolver stub that tracks how many calls overlap.
    #[derive(Default)]
    struct CountingResolver {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
        /// Ids that fail this many times before succeeding.
        flaky: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl EntryResolver for CountingResolver {
        async fn resolve(&self, entry: &mut ContentEntry, _generate: bool) -> ImageResult {
            let id = entry.id().unwrap_or_default().to_string();
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(id.clone());

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let mut flaky = self.flaky.lock().unwrap();
            if let Some((_, remaining)) = flaky.iter_mut().find(|(f, _)| *f == id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return ImageResult::failure("transient");
                }
            }
            ImageResult::uploaded(format!("https://cdn.example.com/{}.png", id), true)
        }

        fn pending(&self, _entry_id: &str) -> Option<PendingOutcome> {
            None
        }

        fn is_stored(&self, entry: &ContentEntry) -> bool {
            entry
                .image_url()
                .is_some_and(|url| url.contains("amazonaws.com"))
        }
    }

    fn options(concurrency: usize, max_retries: u32) -> BatchOptions {
        BatchOptions {
            concurrency,
            max_retries,
            chunk_delay: Duration::ZERO,
            ..BatchOptions::default()
        }
    }

    fn entries(ids: &[&str]) -> Vec<ContentEntry> {
        ids.iter()
            .map(|id| ContentEntry::new(*id, format!("Entry {}", id)))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let resolver = Arc::new(CountingResolver::default());
        let coordinator = BatchCoordinator::new(resolver.clone(), options(2, 0));
        let mut batch = entries(&["a", "b", "c", "d", "e"]);

        let report = coordinator.process(&mut batch, true).await;

        assert_eq!(report.success_count(), 5);
        assert_eq!(resolver.peak.load(Ordering::SeqCst), 2);
        assert!(batch
            .iter()
            .all(|e| e.image_url().unwrap().starts_with("https://cdn.example.com/")));
    }

    #[tokio::test]
    async fn test_classification_skips_and_short_circuits() {
        let resolver = Arc::new(CountingResolver::default());
        let coordinator = BatchCoordinator::new(resolver.clone(), options(3, 0));

        let mut batch = entries(&["a", "stored"]);
        batch[1].image_url = Some("https://bucket.s3.amazonaws.com/stored.png".to_string());
        batch.push(ContentEntry {
            id: None,
            title: "No id".to_string(),
            ..ContentEntry::default()
        });

        let report = coordinator.process(&mut batch, true).await;

        assert_eq!(report.skipped, vec![2]);
        assert_eq!(*resolver.calls.lock().unwrap(), vec!["a".to_string()]);
        let stored = report.result_for("stored").unwrap();
        assert!(stored.success);
        assert_eq!(stored.is_new, Some(false));
        assert_eq!(report.results.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_entries_are_retried() {
        let resolver = Arc::new(CountingResolver::default());
        resolver.flaky.lock().unwrap().push(("b".to_string(), 1));
        let coordinator = BatchCoordinator::new(resolver.clone(), options(3, 2));
        let mut batch = entries(&["a", "b", "c"]);

        let report = coordinator.process(&mut batch, true).await;

        assert_eq!(report.rounds, 2);
        assert_eq!(report.success_count(), 3);
        let calls = resolver.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|id| *id == "b").count(), 2);
        assert_eq!(calls.iter().filter(|id| *id == "a").count(), 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let resolver = Arc::new(CountingResolver::default());
        resolver.flaky.lock().unwrap().push(("b".to_string(), 10));
        let coordinator = BatchCoordinator::new(resolver.clone(), options(3, 2));
        let mut batch = entries(&["a", "b"]);

        let report = coordinator.process(&mut batch, true).await;

        assert_eq!(report.rounds, 3);
        assert_eq!(report.failed().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(batch[1].image_url, None);
        let calls = resolver.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|id| *id == "b").count(), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let resolver = Arc::new(CountingResolver::default());
        let coordinator = BatchCoordinator::new(resolver, options(0, 0));
        assert_eq!(coordinator.options().concurrency, 1);
    }
}
