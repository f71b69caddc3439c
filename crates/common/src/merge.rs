// Reconcile a remote document with a locally cached draft of the same id.
//
// Precedence: local blocks win when non-empty; every other field takes the
// local value when local has an opinion, otherwise the remote value. A field
// equal to the normalizer's default template (empty string, empty list,
// default variant, absent timestamp) carries no opinion. Metadata objects are
// merged key by key.

use serde_json::Value;

use crate::types::{Document, DocumentContent, DocumentStatus, Meta, Visibility};

/// Overlay `local` onto `remote`. Pure and total.
pub fn merge(remote: &Document, local: &Document) -> Document {
    Document {
        id: prefer_text(&local.id, &remote.id),
        title: prefer_text(&local.title, &remote.title),
        content: merge_content(&remote.content, &local.content),
        cover_image: prefer_text(&local.cover_image, &remote.cover_image),
        tags: if local.tags.is_empty() { remote.tags.clone() } else { local.tags.clone() },
        status: if local.status == DocumentStatus::default() { remote.status } else { local.status },
        visibility: if local.visibility == Visibility::default() {
            remote.visibility
        } else {
            local.visibility
        },
        meta: merge_meta(&remote.meta, &local.meta),
        created_at: local.created_at.or(remote.created_at),
        updated_at: local.updated_at.or(remote.updated_at),
        published_at: local.published_at.or(remote.published_at),
    }
}

fn prefer_text(local: &str, remote: &str) -> String {
    if local.is_empty() { remote } else { local }.to_string()
}

fn merge_content(remote: &DocumentContent, local: &DocumentContent) -> DocumentContent {
    if local.blocks.is_empty() {
        remote.clone()
    } else {
        local.clone()
    }
}

/// Key-by-key merge; nested objects recurse, `null` locals defer to remote.
pub fn merge_meta(remote: &Meta, local: &Meta) -> Meta {
    let mut merged = remote.clone();
    for (key, local_value) in local {
        if local_value.is_null() {
            continue;
        }
        let value = match (merged.get(key), local_value) {
            (Some(Value::Object(remote_obj)), Value::Object(local_obj)) => {
                Value::Object(merge_meta(remote_obj, local_obj))
            }
            _ => local_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}
