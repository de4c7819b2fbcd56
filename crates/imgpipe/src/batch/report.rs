use std::collections::BTreeMap;

use serde::Serialize;

use crate::resolver::ImageResult;

/// Outcome of one batch, keyed by entry id.
///
/// Each id appears once: a later round's result replaces an earlier one.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub results: BTreeMap<String, ImageResult>,
    /// Input positions of entries skipped for lack of an id.
    pub skipped: Vec<usize>,
    /// Resolver rounds run, including retries.
    pub rounds: u32,
}

impl BatchReport {
    pub(crate) fn record(&mut self, entry_id: &str, result: ImageResult) {
        self.results.insert(entry_id.to_string(), result);
    }

    pub fn result_for(&self, entry_id: &str) -> Option<&ImageResult> {
        self.results.get(entry_id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, r)| r.success)
            .map(|(id, _)| id.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(id, _)| id.as_str())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }
}
