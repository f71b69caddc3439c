// Document canonicalization: arbitrary or legacy stored shapes → `Document`.
//
// Total and pure. Every missing field is filled from the default template so
// downstream comparisons never have to null-check. Idempotent:
// `normalize(&to_value(normalize(x))) == normalize(x)`.

mod markdown;

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::types::{
    Block, BlockKind, Document, DocumentContent, DocumentStatus, Meta, Visibility,
    CONTENT_SCHEMA, CONTENT_VERSION,
};

pub use markdown::blocks_from_markdown;

const DEFAULT_HEADING_LEVEL: u64 = 2;

/// Map any stored shape onto the canonical document model.
///
/// Non-object input yields the default document (empty id and title).
pub fn normalize(raw: &Value) -> Document {
    let Some(obj) = raw.as_object() else {
        return Document::default();
    };

    Document {
        id: first(obj, &["id", "_id"]).and_then(scalar_text).unwrap_or_default(),
        title: first(obj, &["title"]).and_then(scalar_text).unwrap_or_default(),
        content: normalize_content(obj),
        cover_image: first(obj, &["coverImage", "cover_image", "cover"])
            .and_then(scalar_text)
            .unwrap_or_default(),
        tags: first(obj, &["tags"]).map(normalize_tags).unwrap_or_default(),
        status: normalize_status(obj),
        visibility: normalize_visibility(obj),
        meta: first(obj, &["meta", "metadata"])
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        created_at: first(obj, &["createdAt", "created_at"]).and_then(parse_timestamp),
        updated_at: first(obj, &["updatedAt", "updated_at"]).and_then(parse_timestamp),
        published_at: first(obj, &["publishedAt", "published_at"]).and_then(parse_timestamp),
    }
}

/// Normalize a JSON-encoded document string. Unparseable input yields the
/// default document.
pub fn normalize_str(raw: &str) -> Document {
    serde_json::from_str::<Value>(raw).map(|value| normalize(&value)).unwrap_or_default()
}

// ── Content ─────────────────────────────────────────────────────────

fn normalize_content(obj: &Map<String, Value>) -> DocumentContent {
    match obj.get("content") {
        Some(Value::Object(content)) => structured_content(content, obj),
        Some(Value::Array(blocks)) => DocumentContent::with_blocks(normalize_blocks(blocks)),
        Some(Value::String(blob)) => content_from_blob(blob),
        _ => legacy_content(obj),
    }
}

fn structured_content(content: &Map<String, Value>, obj: &Map<String, Value>) -> DocumentContent {
    let blocks = match content.get("blocks") {
        Some(Value::Array(blocks)) => normalize_blocks(blocks),
        _ => legacy_content(obj).blocks,
    };
    let version = content
        .get("version")
        .and_then(Value::as_u64)
        .filter(|version| *version > 0)
        .and_then(|version| u32::try_from(version).ok())
        .unwrap_or(CONTENT_VERSION);
    let schema = content
        .get("schema")
        .and_then(Value::as_str)
        .filter(|schema| !schema.trim().is_empty())
        .unwrap_or(CONTENT_SCHEMA)
        .to_string();

    DocumentContent { blocks, version, schema }
}

/// Content stored outside the canonical `content` field: a top-level block
/// list or a single text blob under `body`/`markdown`.
fn legacy_content(obj: &Map<String, Value>) -> DocumentContent {
    if let Some(Value::Array(blocks)) = obj.get("blocks") {
        return DocumentContent::with_blocks(normalize_blocks(blocks));
    }
    match first(obj, &["body", "markdown"]) {
        Some(Value::String(blob)) => content_from_blob(blob),
        _ => DocumentContent::default(),
    }
}

/// Reshape a single-blob content field. JSON-encoded block lists are decoded;
/// anything else is treated as Markdown.
fn content_from_blob(blob: &str) -> DocumentContent {
    let trimmed = blob.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(blob) {
            Ok(Value::Array(blocks)) => {
                return DocumentContent::with_blocks(normalize_blocks(&blocks));
            }
            Ok(Value::Object(content)) => {
                let blocks = match content.get("blocks") {
                    Some(Value::Array(blocks)) => normalize_blocks(blocks),
                    _ => Vec::new(),
                };
                return DocumentContent::with_blocks(blocks);
            }
            _ => {}
        }
    }
    DocumentContent::with_blocks(blocks_from_markdown(blob))
}

// ── Blocks ──────────────────────────────────────────────────────────

fn normalize_blocks(raw: &[Value]) -> Vec<Block> {
    let mut blocks: Vec<Block> = raw
        .iter()
        .filter_map(|value| match value {
            Value::Object(obj) => Some(normalize_block(obj)),
            Value::String(text) => Some(Block::paragraph(String::new(), text.clone())),
            _ => None,
        })
        .collect();

    // Fallback ids follow position but never reuse an id stored on another block.
    let mut taken: HashSet<String> =
        blocks.iter().filter(|block| !block.id.is_empty()).map(|block| block.id.clone()).collect();
    for (index, block) in blocks.iter_mut().enumerate() {
        if block.id.is_empty() {
            block.id = unused_block_id(index, &mut taken);
        }
    }
    blocks
}

/// Deterministic fallback id for a block stored without one: `block-<index>`,
/// bumped past ids already in use.
fn unused_block_id(index: usize, taken: &mut HashSet<String>) -> String {
    (index..)
        .map(|n| format!("block-{n}"))
        .find(|id| taken.insert(id.clone()))
        .unwrap_or_default()
}

/// Normalize one block. A missing id is left empty for `normalize_blocks` to
/// fill.
fn normalize_block(obj: &Map<String, Value>) -> Block {
    let id = first(obj, &["id"]).and_then(scalar_text).unwrap_or_default();
    let hint =
        first(obj, &["type", "kind"]).and_then(Value::as_str).map(parse_kind).unwrap_or_default();
    let content = first(obj, &["content", "text"]).and_then(block_text).unwrap_or_default();
    let mut meta: Meta = first(obj, &["meta", "metadata", "data"])
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    match hint.kind {
        BlockKind::Heading => {
            let level = meta
                .get("level")
                .and_then(as_level)
                .or(hint.level)
                .or_else(|| obj.get("level").and_then(as_level))
                .unwrap_or(DEFAULT_HEADING_LEVEL)
                .clamp(1, 6);
            meta.insert("level".into(), Value::from(level));
        }
        BlockKind::Image => {
            let url = meta
                .get("url")
                .and_then(Value::as_str)
                .or_else(|| meta.get("src").and_then(Value::as_str))
                .or_else(|| first(obj, &["url", "src"]).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            meta.insert("url".into(), Value::String(url));
            fill_string(&mut meta, "caption", first(obj, &["caption", "alt"]));
        }
        BlockKind::Quote => fill_string(&mut meta, "author", first(obj, &["author"])),
        BlockKind::Code => fill_string(&mut meta, "language", first(obj, &["language", "lang"])),
        BlockKind::List => {
            let ordered = meta
                .get("ordered")
                .and_then(Value::as_bool)
                .or(hint.ordered)
                .or_else(|| obj.get("ordered").and_then(Value::as_bool))
                .unwrap_or(false);
            meta.insert("ordered".into(), Value::Bool(ordered));
        }
        BlockKind::Paragraph | BlockKind::Divider => {}
    }

    Block { id, kind: hint.kind, content, meta }
}

/// Ensure `meta[key]` holds a string, taking a legacy top-level value if the
/// metadata does not carry one.
fn fill_string(meta: &mut Meta, key: &str, legacy: Option<&Value>) {
    if meta.get(key).is_some_and(Value::is_string) {
        return;
    }
    let value = legacy.and_then(scalar_text).unwrap_or_default();
    meta.insert(key.to_string(), Value::String(value));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KindHint {
    kind: BlockKind,
    level: Option<u64>,
    ordered: Option<bool>,
}

impl Default for KindHint {
    fn default() -> Self {
        Self { kind: BlockKind::Paragraph, level: None, ordered: None }
    }
}

impl KindHint {
    fn of(kind: BlockKind) -> Self {
        Self { kind, ..Self::default() }
    }
}

/// Map canonical and legacy block type tags. Unknown tags become paragraphs
/// so their text survives.
fn parse_kind(tag: &str) -> KindHint {
    let tag = tag.trim().to_ascii_lowercase();
    match tag.as_str() {
        "heading" | "header" => KindHint::of(BlockKind::Heading),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => KindHint {
            kind: BlockKind::Heading,
            level: tag[1..].parse().ok(),
            ordered: None,
        },
        "image" | "img" | "picture" => KindHint::of(BlockKind::Image),
        "quote" | "blockquote" => KindHint::of(BlockKind::Quote),
        "code" | "code_block" | "codeblock" | "pre" => KindHint::of(BlockKind::Code),
        "list" | "ul" | "bulleted_list" | "unordered_list" => KindHint::of(BlockKind::List),
        "ol" | "numbered_list" | "ordered_list" => {
            KindHint { kind: BlockKind::List, level: None, ordered: Some(true) }
        }
        "divider" | "hr" | "separator" | "delimiter" => KindHint::of(BlockKind::Divider),
        _ => KindHint::of(BlockKind::Paragraph),
    }
}

fn as_level(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Block text: strings as-is, string arrays (legacy list items) joined by
/// newlines, other scalars rendered.
fn block_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            Some(items.iter().filter_map(scalar_text).collect::<Vec<_>>().join("\n"))
        }
        other => scalar_text(other),
    }
}

// ── Tags, status, visibility, timestamps ────────────────────────────

fn normalize_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(joined) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag: String = tag.nfkc().collect::<String>().trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn normalize_status(obj: &Map<String, Value>) -> DocumentStatus {
    let parsed = obj.get("status").and_then(Value::as_str).and_then(|status| {
        match status.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(DocumentStatus::Draft),
            "published" => Some(DocumentStatus::Published),
            "archived" => Some(DocumentStatus::Archived),
            _ => None,
        }
    });
    if let Some(status) = parsed {
        return status;
    }
    if obj.get("archived").and_then(Value::as_bool) == Some(true) {
        return DocumentStatus::Archived;
    }
    if obj.get("published").and_then(Value::as_bool) == Some(true) {
        return DocumentStatus::Published;
    }
    DocumentStatus::default()
}

fn normalize_visibility(obj: &Map<String, Value>) -> Visibility {
    let parsed = obj.get("visibility").and_then(Value::as_str).and_then(|visibility| {
        match visibility.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    });
    if let Some(visibility) = parsed {
        return visibility;
    }
    if let Some(is_public) = first(obj, &["isPublic", "is_public"]).and_then(Value::as_bool) {
        return if is_public { Visibility::Public } else { Visibility::Private };
    }
    if obj.get("private").and_then(Value::as_bool) == Some(true) {
        return Visibility::Private;
    }
    Visibility::default()
}

/// RFC 3339 strings or Unix epoch milliseconds. Instants outside the
/// four-digit-year range RFC 3339 can express are dropped.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::String(text) => {
            DateTime::parse_from_rfc3339(text.trim()).ok().map(|parsed| parsed.with_timezone(&Utc))
        }
        Value::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    parsed.filter(|instant| (1..=9999).contains(&instant.year()))
}

// ── Field helpers ───────────────────────────────────────────────────

/// First present, non-null value among `keys`.
fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| obj.get(*key)).find(|value| !value.is_null())
}

/// Strings as-is; numbers and booleans rendered; everything else absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renormalize(doc: &Document) -> Document {
        normalize(&serde_json::to_value(doc).expect("document should serialize"))
    }

    #[test]
    fn non_object_input_yields_default_document() {
        for raw in [json!(null), json!(42), json!("text"), json!([1, 2]), json!(true)] {
            let doc = normalize(&raw);
            assert_eq!(doc, Document::default());
            assert!(doc.id.is_empty());
            assert!(doc.title.is_empty());
        }
    }

    #[test]
    fn empty_object_fills_defaults() {
        let doc = normalize(&json!({}));
        assert_eq!(doc, Document::default());
        assert_eq!(doc.content.schema, CONTENT_SCHEMA);
        assert_eq!(doc.content.version, CONTENT_VERSION);
    }

    #[test]
    fn canonical_document_passes_through() {
        let mut doc = Document::draft_with_id("draft-7");
        doc.title = "Hello".into();
        doc.tags = vec!["rust".into()];
        doc.status = DocumentStatus::Published;
        doc.visibility = Visibility::Private;
        doc.updated_at = DateTime::from_timestamp(1_700_000_000, 0);

        assert_eq!(renormalize(&doc), doc);
    }

    #[test]
    fn numeric_id_becomes_string() {
        let doc = normalize(&json!({ "id": 17, "title": "x" }));
        assert_eq!(doc.id, "17");
    }

    #[test]
    fn snake_case_and_legacy_keys_are_accepted() {
        let doc = normalize(&json!({
            "id": "1",
            "cover_image": "https://img.example/c.png",
            "created_at": "2024-01-02T03:04:05Z",
            "metadata": { "excerpt": "short" },
        }));
        assert_eq!(doc.cover_image, "https://img.example/c.png");
        assert_eq!(doc.created_at, DateTime::from_timestamp(1_704_164_645, 0));
        assert_eq!(doc.meta.get("excerpt"), Some(&json!("short")));
    }

    #[test]
    fn legacy_string_blob_is_reshaped_into_blocks() {
        let doc = normalize(&json!({
            "id": "9",
            "content": "# Title\n\nFirst paragraph.\n\n> quoted\n",
        }));

        assert_eq!(doc.content.schema, CONTENT_SCHEMA);
        assert_eq!(doc.content.version, CONTENT_VERSION);
        let kinds: Vec<BlockKind> = doc.blocks().iter().map(|block| block.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Heading, BlockKind::Paragraph, BlockKind::Quote]);
        assert_eq!(doc.blocks()[0].heading_level(), Some(1));
        assert_eq!(doc.blocks()[1].content, "First paragraph.");
        assert_eq!(renormalize(&doc), doc);
    }

    #[test]
    fn json_encoded_blob_is_decoded() {
        let blob = r#"[{"type":"paragraph","content":"a"},{"type":"h3","content":"b"}]"#;
        let doc = normalize(&json!({ "content": blob }));

        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0].id, "block-0");
        assert_eq!(doc.blocks()[1].heading_level(), Some(3));
    }

    #[test]
    fn top_level_blocks_and_body_are_legacy_content() {
        let with_blocks = normalize(&json!({ "blocks": [{ "type": "text", "text": "hi" }] }));
        assert_eq!(with_blocks.blocks().len(), 1);
        assert_eq!(with_blocks.blocks()[0].kind, BlockKind::Paragraph);
        assert_eq!(with_blocks.blocks()[0].content, "hi");

        let with_body = normalize(&json!({ "body": "plain words" }));
        assert_eq!(with_body.blocks().len(), 1);
        assert_eq!(with_body.blocks()[0].content, "plain words");
    }

    #[test]
    fn block_metadata_defaults_are_filled() {
        let doc = normalize(&json!({
            "content": { "blocks": [
                { "id": "h", "type": "heading", "content": "H" },
                { "id": "big", "type": "heading", "meta": { "level": 12 } },
                { "id": "i", "type": "img", "src": "https://img.example/a.png" },
                { "id": "q", "type": "blockquote", "content": "Q", "author": "Ada" },
                { "id": "c", "type": "code", "lang": "rust" },
                { "id": "l", "type": "ol", "content": ["one", "two"] },
                { "id": "x", "type": "mystery", "content": "kept" },
            ] }
        }));

        let blocks = doc.blocks();
        assert_eq!(blocks[0].heading_level(), Some(2));
        assert_eq!(blocks[1].heading_level(), Some(6));
        assert_eq!(blocks[2].image_url(), Some("https://img.example/a.png"));
        assert_eq!(blocks[2].meta.get("caption"), Some(&json!("")));
        assert_eq!(blocks[3].meta.get("author"), Some(&json!("Ada")));
        assert_eq!(blocks[4].meta.get("language"), Some(&json!("rust")));
        assert_eq!(blocks[5].kind, BlockKind::List);
        assert_eq!(blocks[5].content, "one\ntwo");
        assert_eq!(blocks[5].meta.get("ordered"), Some(&json!(true)));
        assert_eq!(blocks[6].kind, BlockKind::Paragraph);
        assert_eq!(blocks[6].content, "kept");
        assert_eq!(renormalize(&doc), doc);
    }

    #[test]
    fn malformed_blocks_are_skipped_and_ids_filled() {
        let doc = normalize(&json!({ "content": { "blocks": [null, 3, "loose text", { "type": "hr" }] } }));
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0].id, "block-0");
        assert_eq!(doc.blocks()[0].content, "loose text");
        assert_eq!(doc.blocks()[1].id, "block-1");
        assert_eq!(doc.blocks()[1].kind, BlockKind::Divider);
    }

    #[test]
    fn fallback_ids_skip_ids_stored_on_other_blocks() {
        let doc = normalize(&json!({ "content": { "blocks": [
            { "type": "paragraph", "content": "first" },
            { "id": "block-0", "type": "paragraph", "content": "second" },
            "third",
            { "id": "block-2", "type": "hr" },
        ] } }));

        let ids: Vec<&str> = doc.blocks().iter().map(|block| block.id.as_str()).collect();
        assert_eq!(ids, vec!["block-1", "block-0", "block-3", "block-2"]);
        assert_eq!(renormalize(&doc), doc);
    }

    #[test]
    fn tags_are_trimmed_deduplicated_and_nfkc_normalized() {
        let doc = normalize(&json!({ "tags": [" rust ", "rust", "", "ｓｙｎｃ", 7, null] }));
        assert_eq!(doc.tags, vec!["rust", "sync", "7"]);

        let legacy = normalize(&json!({ "tags": "a, b ,,a" }));
        assert_eq!(legacy.tags, vec!["a", "b"]);
    }

    #[test]
    fn status_and_visibility_fall_back_to_legacy_flags() {
        let doc = normalize(&json!({ "status": "PUBLISHED", "visibility": "Private" }));
        assert_eq!(doc.status, DocumentStatus::Published);
        assert_eq!(doc.visibility, Visibility::Private);

        let legacy = normalize(&json!({ "published": true, "isPublic": false }));
        assert_eq!(legacy.status, DocumentStatus::Published);
        assert_eq!(legacy.visibility, Visibility::Private);

        let unknown = normalize(&json!({ "status": "deleted", "visibility": 3 }));
        assert_eq!(unknown.status, DocumentStatus::Draft);
        assert_eq!(unknown.visibility, Visibility::Public);
    }

    #[test]
    fn timestamps_accept_rfc3339_and_epoch_millis() {
        let doc = normalize(&json!({
            "updatedAt": 1_700_000_000_000_i64,
            "publishedAt": "not a date",
        }));
        assert_eq!(doc.updated_at, DateTime::from_timestamp_millis(1_700_000_000_000));
        assert_eq!(doc.published_at, None);
        assert_eq!(renormalize(&doc), doc);
    }

    #[test]
    fn normalize_str_tolerates_garbage() {
        assert_eq!(normalize_str("{not json"), Document::default());
        assert_eq!(normalize_str(r#"{"id":"3"}"#).id, "3");
    }
}
