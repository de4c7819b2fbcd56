//! Temporary image files owned by one resolution.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};
use reqwest::Url;

/// A temp file path that is deleted when the guard goes away.
///
/// `remove` deletes asynchronously on the normal path. `Drop` is the last
/// resort for early returns and panics: inside a tokio runtime the delete is
/// handed to the blocking pool, otherwise it runs inline.
#[derive(Debug)]
pub(crate) struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    /// A fresh, unique path in `directory` named after the URL's basename,
    /// or `fallback` when the URL has no usable file name.
    pub(crate) fn in_directory(directory: &Path, source_url: Option<&str>, fallback: &str) -> Self {
        Self {
            path: directory.join(scratch_name(source_url, fallback)),
            removed: false,
        }
    }

    /// Takes ownership of a file created by someone else.
    pub(crate) fn adopt(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove scratch file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_quietly(&path));
            }
            Err(_) => remove_quietly(&path),
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
        }
    }
}

/// `<millis>-<uuid8>-<basename>`.
fn scratch_name(source_url: Option<&str>, fallback: &str) -> String {
    let basename = source_url
        .and_then(url_basename)
        .unwrap_or_else(|| sanitize_file_name(fallback));
    let unique = uuid::Uuid::new_v4().simple().to_string();

    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        &unique[..8],
        basename
    )
}

/// Last path segment of a URL if it looks like a file name.
fn url_basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;

    if !segment.contains('.') {
        return None;
    }
    let sanitized = sanitize_file_name(segment);
    if sanitized.trim_matches(|c| c == '.' || c == '_').is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; replaces everything else.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}
