// Baseline snapshots and change detection.
//
// A snapshot freezes `{title, blocks, cover_image, tags}` at the moment the
// document was last known to match a persistence tier.

use crate::types::{Block, Document};

/// Immutable copy of the persisted content fields of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    title: String,
    blocks: Vec<Block>,
    cover_image: String,
    tags: Vec<String>,
}

impl Snapshot {
    pub fn of(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            blocks: doc.blocks().to_vec(),
            cover_image: doc.cover_image.clone(),
            tags: doc.tags.clone(),
        }
    }

    /// Structural comparison against a live document.
    ///
    /// Cheap scalar fields are compared before the block list so that most
    /// keystroke-driven checks short-circuit without walking the blocks.
    pub fn matches(&self, doc: &Document) -> bool {
        self.title == doc.title
            && self.cover_image == doc.cover_image
            && self.tags == doc.tags
            && self.blocks.as_slice() == doc.blocks()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn cover_image(&self) -> &str {
        &self.cover_image
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// Whether `current` has diverged from `baseline`.
///
/// With no baseline the document is treated as not yet loaded, never dirty.
/// Tags are compared in order.
pub fn is_dirty(current: &Document, baseline: Option<&Snapshot>) -> bool {
    baseline.is_some_and(|baseline| !baseline.matches(current))
}
