//! Per-entry acquisition records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acquisition state of one entry.
///
/// `pending -> processing -> completed`, or `pending | processing -> failed`.
/// A failed task re-enters `processing` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one entry's image acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub entry_id: String,
    /// Copied from the entry for diagnostics.
    pub title: String,
    pub status: TaskStatus,
    /// Task id issued by the generation service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_handle: Option<String>,
    /// Where the image came from before upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Set exactly when `status` is `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of failed outcomes. Never decreases.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskEntry {
    pub fn new(entry_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: entry_id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            generation_handle: None,
            source_url: None,
            storage_url: None,
            created_at: now,
            updated_at: now,
            attempts: 0,
            error: None,
        }
    }

    /// True when the task finished and its storage URL is known.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed && self.storage_url.is_some()
    }

    pub(crate) fn touch(&mut self, title: &str) {
        self.title = title.to_string();
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_processing(&mut self, generation_handle: &str) {
        self.generation_handle = Some(generation_handle.to_string());
        self.status = TaskStatus::Processing;
        self.storage_url = None;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_completed(&mut self, source_url: &str, storage_url: &str) {
        self.status = TaskStatus::Completed;
        self.source_url = Some(source_url.to_string());
        self.storage_url = Some(storage_url.to_string());
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_failed(&mut self, message: &str) {
        self.status = TaskStatus::Failed;
        self.storage_url = None;
        self.error = Some(message.to_string());
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// Counts by status across the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Sum of `attempts` over all tasks.
    pub total_attempts: u64,
}

impl LedgerStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl<'a> FromIterator<&'a TaskEntry> for LedgerStats {
    fn from_iter<I: IntoIterator<Item = &'a TaskEntry>>(iter: I) -> Self {
        let mut stats = LedgerStats::default();
        for task in iter {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            stats.total_attempts += u64::from(task.attempts);
        }
        stats
    }
}
