//! Builders for test data.

#![allow(dead_code)]

use imgpipe::ContentEntry;

/// Builder for `ContentEntry` values.
pub struct EntryBuilder {
    entry: ContentEntry,
}

impl EntryBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            entry: ContentEntry::new(id, format!("Entry {}", id)),
        }
    }

    /// An entry with no id at all.
    pub fn anonymous(title: &str) -> Self {
        Self {
            entry: ContentEntry {
                title: title.to_string(),
                ..ContentEntry::default()
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.entry.title = title.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.entry.category = Some(category.to_string());
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.entry.summary = Some(summary.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.entry.tags.push(tag.to_string());
        self
    }

    pub fn image_url(mut self, url: &str) -> Self {
        self.entry.image_url = Some(url.to_string());
        self
    }

    pub fn build(self) -> ContentEntry {
        self.entry
    }
}
