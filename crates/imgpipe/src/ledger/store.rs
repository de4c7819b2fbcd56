//! Task ledger backed by a single JSON snapshot file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error::LedgerError;
use crate::ledger::task::{LedgerStats, TaskEntry, TaskStatus};

type TaskMap = BTreeMap<String, TaskEntry>;

/// Durable map of `entry_id -> TaskEntry`.
///
/// Every mutation rewrites the whole snapshot before returning. The map lock
/// is held across the write, so writers inside one process are serialized.
/// A failed write rolls the in-memory change back, so memory never runs
/// ahead of disk.
/// Two processes sharing one snapshot path are not coordinated.
pub struct TaskLedger {
    path: PathBuf,
    tasks: Mutex<TaskMap>,
}

impl TaskLedger {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            tasks: Mutex::new(TaskMap::new()),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, creating an empty one if none exists.
    ///
    /// Never fails: on any I/O or parse error the ledger starts empty.
    pub async fn initialize(&self) {
        let mut tasks = self.tasks.lock().await;
        match self.load().await {
            Ok(loaded) => {
                info!(
                    "Loaded {} image tasks from {}",
                    loaded.len(),
                    self.path.display()
                );
                *tasks = loaded;
            }
            Err(e) => {
                warn!("Starting with an empty image task ledger: {}", e);
                tasks.clear();
            }
        }
    }

    async fn load(&self) -> Result<TaskMap, LedgerError> {
        ensure_parent(&self.path).await?;

        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(TaskMap::new()),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| LedgerError::ParseSnapshot {
                    path: self.path.clone(),
                    source: e,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No ledger snapshot at {}, creating one", self.path.display());
                let empty = TaskMap::new();
                write_snapshot(&self.path, &empty).await?;
                Ok(empty)
            }
            Err(e) => Err(LedgerError::ReadSnapshot {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Creates a pending task, or refreshes the title of an existing one.
    ///
    /// A completed task is returned unchanged and nothing is written.
    pub async fn create_or_update_task(
        &self,
        entry_id: &str,
        title: &str,
    ) -> Result<TaskEntry, LedgerError> {
        let mut tasks = self.tasks.lock().await;

        if let Some(existing) = tasks.get(entry_id) {
            if existing.is_completed() {
                return Ok(existing.clone());
            }
        }

        let previous = tasks.get(entry_id).cloned();
        let task = tasks
            .entry(entry_id.to_string())
            .and_modify(|task| task.touch(title))
            .or_insert_with(|| TaskEntry::new(entry_id, title))
            .clone();

        persist_or_restore(&self.path, &mut tasks, entry_id, previous).await?;
        Ok(task)
    }

    /// Records the generation service's task id and moves to `processing`.
    pub async fn update_task_with_id(
        &self,
        entry_id: &str,
        generation_handle: &str,
    ) -> Result<Option<TaskEntry>, LedgerError> {
        self.mutate(entry_id, |task| task.mark_processing(generation_handle))
            .await
    }

    pub async fn complete_task(
        &self,
        entry_id: &str,
        source_url: &str,
        storage_url: &str,
    ) -> Result<Option<TaskEntry>, LedgerError> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(entry_id) else {
            debug!("complete_task: no task for entry {}", entry_id);
            return Ok(None);
        };

        let previous = task.clone();
        task.mark_completed(source_url, storage_url);
        let task = task.clone();
        persist_or_restore(&self.path, &mut tasks, entry_id, Some(previous)).await?;
        Ok(Some(task))
    }

    /// Marks the task failed and bumps its attempt counter.
    pub async fn fail_task(
        &self,
        entry_id: &str,
        message: &str,
    ) -> Result<Option<TaskEntry>, LedgerError> {
        self.mutate(entry_id, |task| task.mark_failed(message)).await
    }

    /// Applies a non-terminal transition. Completed tasks are left alone.
    async fn mutate<F>(&self, entry_id: &str, apply: F) -> Result<Option<TaskEntry>, LedgerError>
    where
        F: FnOnce(&mut TaskEntry),
    {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(entry_id) else {
            debug!("No image task for entry {}, skipping update", entry_id);
            return Ok(None);
        };

        if task.is_completed() {
            debug!(
                "Image task for entry {} is already completed, skipping update",
                entry_id
            );
            return Ok(Some(task.clone()));
        }

        let previous = task.clone();
        apply(task);
        let task = task.clone();
        persist_or_restore(&self.path, &mut tasks, entry_id, Some(previous)).await?;
        Ok(Some(task))
    }

    pub async fn get_task(&self, entry_id: &str) -> Option<TaskEntry> {
        self.tasks.lock().await.get(entry_id).cloned()
    }

    pub async fn has_completed_task(&self, entry_id: &str) -> bool {
        self.tasks
            .lock()
            .await
            .get(entry_id)
            .is_some_and(TaskEntry::is_completed)
    }

    pub async fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<TaskEntry> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect()
    }

    /// Storage URL of a completed task.
    pub async fn get_storage_url(&self, entry_id: &str) -> Option<String> {
        self.tasks
            .lock()
            .await
            .get(entry_id)
            .filter(|task| task.is_completed())
            .and_then(|task| task.storage_url.clone())
    }

    pub async fn get_all_tasks(&self) -> BTreeMap<String, TaskEntry> {
        self.tasks.lock().await.clone()
    }

    pub async fn stats(&self) -> LedgerStats {
        self.tasks.lock().await.values().collect()
    }

    /// Drops every task and persists an empty snapshot.
    pub async fn clear_all_tasks(&self) -> Result<(), LedgerError> {
        let mut tasks = self.tasks.lock().await;
        let previous = std::mem::take(&mut *tasks);
        if let Err(e) = write_snapshot(&self.path, &tasks).await {
            *tasks = previous;
            return Err(e);
        }
        info!("Cleared {} image tasks", previous.len());
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> Result<(), LedgerError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| LedgerError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })
}

/// Writes the snapshot after a change to `entry_id`. If the write fails the
/// entry is put back to `previous`, or removed when it did not exist.
async fn persist_or_restore(
    path: &Path,
    tasks: &mut TaskMap,
    entry_id: &str,
    previous: Option<TaskEntry>,
) -> Result<(), LedgerError> {
    let Err(e) = write_snapshot(path, tasks).await else {
        return Ok(());
    };

    warn!(
        "Rolling back image task {} after failed snapshot write",
        entry_id
    );
    match previous {
        Some(task) => {
            tasks.insert(entry_id.to_string(), task);
        }
        None => {
            tasks.remove(entry_id);
        }
    }
    Err(e)
}

/// Writes the full snapshot next to `path`, then renames it into place.
async fn write_snapshot(path: &Path, tasks: &TaskMap) -> Result<(), LedgerError> {
    let json = serde_json::to_string_pretty(tasks).map_err(LedgerError::Serialize)?;
    ensure_parent(path).await?;

    let staging = staging_path(path);
    tokio::fs::write(&staging, json)
        .await
        .map_err(|e| LedgerError::WriteSnapshot {
            path: staging.clone(),
            source: e,
        })?;

    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| LedgerError::WriteSnapshot {
            path: path.to_path_buf(),
            source: e,
        })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger".into());
    name.push(".tmp");
    path.with_file_name(name)
}
