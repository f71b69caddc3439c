// folio-common: document model, change detection, normalization, and merging
// shared by the folio sync engine and tooling.

pub mod merge;
pub mod normalize;
pub mod snapshot;
pub mod types;

pub use merge::merge;
pub use normalize::normalize;
pub use snapshot::{is_dirty, Snapshot};
pub use types::{Block, BlockKind, Document, DocumentContent, DocumentStatus, Meta, Visibility};
