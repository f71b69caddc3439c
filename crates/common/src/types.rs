// Core document model shared by the sync engine and tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Id prefix for documents that have never been persisted remotely.
pub const DRAFT_ID_PREFIX: &str = "draft-";
/// Schema tag written into canonical `content` records.
pub const CONTENT_SCHEMA: &str = "blocks";
/// Current version of the canonical `content` structure.
pub const CONTENT_VERSION: u32 = 1;

/// Free-form metadata attached to documents and blocks.
pub type Meta = Map<String, Value>;

/// An article: the unit of persistence and editing.
///
/// Serialized as a flat camelCase record with the block list nested under
/// `content` in the canonical `{blocks, version, schema}` structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: DocumentContent,
    pub cover_image: String,
    pub tags: Vec<String>,
    pub status: DocumentStatus,
    pub visibility: Visibility,
    pub meta: Meta,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            content: DocumentContent::default(),
            cover_image: String::new(),
            tags: Vec::new(),
            status: DocumentStatus::default(),
            visibility: Visibility::default(),
            meta: Meta::new(),
            created_at: None,
            updated_at: None,
            published_at: None,
        }
    }
}

impl Document {
    /// A fresh draft with a `draft-` id and placeholder blocks.
    pub fn new_draft() -> Self {
        Self::draft_with_id(format!("{DRAFT_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// A fresh draft with the given id and placeholder blocks.
    pub fn draft_with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: DocumentContent::with_blocks(vec![
                Block::heading("block-0", 1, ""),
                Block::paragraph("block-1", ""),
            ]),
            ..Self::default()
        }
    }

    /// Whether this document has never been persisted remotely.
    pub fn is_draft(&self) -> bool {
        is_draft_id(&self.id)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.content.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.content.blocks
    }
}

/// Whether `id` names a not-yet-persisted draft.
pub fn is_draft_id(id: &str) -> bool {
    id.is_empty() || id.starts_with(DRAFT_ID_PREFIX)
}

/// Canonical structured content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentContent {
    pub blocks: Vec<Block>,
    pub version: u32,
    pub schema: String,
}

impl Default for DocumentContent {
    fn default() -> Self {
        Self { blocks: Vec::new(), version: CONTENT_VERSION, schema: CONTENT_SCHEMA.to_string() }
    }
}

impl DocumentContent {
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks, ..Self::default() }
    }
}

/// A content unit inside a document. Order within the document is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub content: String,
    /// Type-specific metadata, e.g. heading `level`, image `url`, quote `author`.
    #[serde(default)]
    pub meta: Meta,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind, content: impl Into<String>) -> Self {
        Self { id: id.into(), kind, content: content.into(), meta: Meta::new() }
    }

    pub fn paragraph(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, BlockKind::Paragraph, content)
    }

    pub fn heading(id: impl Into<String>, level: u8, content: impl Into<String>) -> Self {
        Self::new(id, BlockKind::Heading, content).with_meta("level", Value::from(level))
    }

    pub fn image(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, BlockKind::Image, "").with_meta("url", Value::String(url.into()))
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    /// Heading level for heading blocks.
    pub fn heading_level(&self) -> Option<u8> {
        if self.kind != BlockKind::Heading {
            return None;
        }
        self.meta.get("level").and_then(Value::as_u64).and_then(|level| u8::try_from(level).ok())
    }

    /// Image URL for image blocks.
    pub fn image_url(&self) -> Option<&str> {
        if self.kind != BlockKind::Image {
            return None;
        }
        self.meta.get("url").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    Image,
    Quote,
    Code,
    List,
    Divider,
}

impl BlockKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::Image => "image",
            Self::Quote => "quote",
            Self::Code => "code",
            Self::List => "list",
            Self::Divider => "divider",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl DocumentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}
