// `folio normalize`: print the canonical form of a raw document record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use folio_common::{normalize, Document};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Raw JSON record, or `-` to read stdin.
    pub file: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: NormalizeArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match read_input(&args.file).and_then(|raw| normalize_input(&raw)) {
        Ok(doc) => {
            output::print_output(format, &doc, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        return io::read_to_string(io::stdin()).context("failed to read stdin");
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn normalize_input(raw: &str) -> anyhow::Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("input is not a JSON document")?;
    Ok(normalize(&value))
}

fn format_human(doc: &Document) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|e| format!("<unprintable document: {e}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_common::{BlockKind, DocumentStatus};

    #[test]
    fn legacy_record_is_reshaped() {
        let doc = normalize_input(
            r##"{"id": 12, "title": "Notes", "cover": "c.png", "published": true,
                 "tags": "rust, sync, rust", "content": "# Heading\n\nBody text."}"##,
        )
        .unwrap();

        assert_eq!(doc.id, "12");
        assert_eq!(doc.cover_image, "c.png");
        assert_eq!(doc.status, DocumentStatus::Published);
        assert_eq!(doc.tags, vec!["rust".to_string(), "sync".to_string()]);
        let kinds: Vec<_> = doc.blocks().iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Heading, BlockKind::Paragraph]);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = normalize_input("{ not json").unwrap_err();
        assert!(format!("{err:#}").contains("not a JSON document"));
        assert!(err.chain().any(|cause| cause.is::<serde_json::Error>()));
    }

    #[test]
    fn reads_file_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("raw.json");
        fs::write(&path, r#"{"title": "From disk"}"#).unwrap();

        let doc = normalize_input(&read_input(&path).unwrap()).unwrap();
        assert_eq!(doc.title, "From disk");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_input(Path::new("/nonexistent/raw.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/raw.json"));
    }

    #[test]
    fn human_output_is_pretty_json() {
        let doc = normalize_input(r#"{"title": "T"}"#).unwrap();
        let text = format_human(&doc);
        assert!(text.contains("\n  \"title\": \"T\""));
    }
}
