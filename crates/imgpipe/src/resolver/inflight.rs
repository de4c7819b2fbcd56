//! Process-local registry of running generation attempts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};

use crate::resolver::result::ImageResult;

/// An attempt's eventual outcome. Every clone resolves to the same result.
pub type PendingOutcome = Shared<BoxFuture<'static, ImageResult>>;

/// Maps entry ids to the outcome of their running attempt.
///
/// An attempt is spawned onto the runtime when registered, so it runs to
/// completion whether or not anyone awaits it. The spawned task owns a guard
/// that removes the registry entry as the task settles.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    attempts: Arc<Mutex<HashMap<String, PendingOutcome>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingOutcome>> {
        match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("In-flight registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn get(&self, entry_id: &str) -> Option<PendingOutcome> {
        self.lock().get(entry_id).cloned()
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.lock().contains_key(entry_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the running attempt for `entry_id`, or starts `attempt` and
    /// registers it. The flag is true when this call started the attempt.
    ///
    /// Check and registration happen under one lock, so concurrent callers
    /// for the same id always converge on a single attempt. Must be called
    /// from within a tokio runtime.
    pub fn join_or_start<F>(&self, entry_id: &str, attempt: F) -> (PendingOutcome, bool)
    where
        F: FnOnce() -> BoxFuture<'static, ImageResult>,
    {
        let mut attempts = self.lock();
        if let Some(existing) = attempts.get(entry_id) {
            debug!("Joining in-flight image attempt for entry {}", entry_id);
            return (existing.clone(), false);
        }

        let guard = SettleGuard {
            registry: self.clone(),
            entry_id: entry_id.to_string(),
        };
        let future = attempt();
        let handle = tokio::spawn(async move {
            let outcome = future.await;
            drop(guard);
            outcome
        });

        let pending = async move {
            handle.await.unwrap_or_else(|e| {
                ImageResult::failure(format!("Image attempt did not complete: {}", e))
            })
        }
        .boxed()
        .shared();

        attempts.insert(entry_id.to_string(), pending.clone());
        (pending, true)
    }

    fn settle(&self, entry_id: &str) {
        self.lock().remove(entry_id);
        debug!("Image attempt for entry {} settled", entry_id);
    }
}

/// Removes its entry from the registry when dropped, including on panic.
struct SettleGuard {
    registry: InFlightRegistry,
    entry_id: String,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.registry.settle(&self.entry_id);
    }
}
